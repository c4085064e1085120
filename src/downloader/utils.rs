// Helper functions for engine implementations

use std::ffi::OsStr;
use std::process::{Output, Stdio};

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration};

use super::errors::EngineError;

/// Run a command to completion, collecting stdout/stderr, with a timeout
pub async fn run_output_with_timeout<I, S>(
    program: &OsStr,
    args: I,
    timeout_secs: u64,
) -> Result<Output, EngineError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::Io("Failed to capture stdout".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Io("Failed to capture stderr".to_string()))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status) => {
            let status = status?;
            let stdout = join_pipe(stdout_task).await?;
            let stderr = join_pipe(stderr_task).await?;
            Ok(Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(EngineError::Timeout(timeout_secs))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, EngineError> {
    task.await
        .map_err(|e| EngineError::Io(format!("pipe reader failed: {}", e)))?
        .map_err(EngineError::from)
}

/// Trim a path-like string to its file name, capped for status lines
pub fn short_name(path: &str, max_chars: usize) -> String {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    if name.chars().count() <= max_chars {
        name.to_string()
    } else {
        let mut cut: String = name.chars().take(max_chars).collect();
        cut.push_str("...");
        cut
    }
}
