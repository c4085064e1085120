#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vedownloader_lib::run().await
}
