// FormatSelector - turns the user's quality/format choice into engine instructions
//
// Handles:
// - Format-selection strings per quality tier
// - Merge/remux target and mp4 fast-start
// - Audio extraction for audio-only and mp3/aac choices
// - Picking a single complete stream when merging is impossible

use std::path::PathBuf;

use super::models::{DownloadRequest, FormatCandidate, OutputFormat, Quality};

/// Output name inside the target directory
pub const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

const AUDIO_QUALITY_KBPS: u32 = 192;
const AUDIO_SAMPLE_RATE: u32 = 44_100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    /// `None` keeps the engine's best codec
    pub codec: Option<&'static str>,
    pub quality_kbps: u32,
    pub sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitleOptions {
    pub languages: Vec<String>,
    /// Also accept auto-generated captions
    pub include_auto: bool,
}

/// Everything the engine needs to run one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPlan {
    pub format_spec: String,
    pub output_dir: PathBuf,
    pub output_template: String,
    pub merge_output_format: Option<&'static str>,
    /// Move the mp4 index to the front of the file
    pub fast_start: bool,
    pub extract_audio: Option<AudioExtraction>,
    pub subtitles: Option<SubtitleOptions>,
    pub no_playlist: bool,
}

impl DownloadPlan {
    /// Single pre-muxed stream, no post-processing at all
    pub fn direct(request: &DownloadRequest, format_id: &str) -> Self {
        Self {
            format_spec: format_id.to_string(),
            output_dir: request.output_dir.clone(),
            output_template: OUTPUT_TEMPLATE.to_string(),
            merge_output_format: None,
            fast_start: false,
            extract_audio: None,
            subtitles: None,
            no_playlist: true,
        }
    }

    pub fn needs_ffmpeg(&self) -> bool {
        self.merge_output_format.is_some()
            || self.fast_start
            || self.extract_audio.is_some()
            || self.format_spec.contains('+')
    }
}

pub struct FormatSelector;

impl FormatSelector {
    /// Format-selection string for a quality tier
    pub fn format_spec(quality: Quality) -> String {
        match quality {
            Quality::Best => "bv*+ba/b".to_string(),
            Quality::AudioOnly => "ba/b".to_string(),
            capped => {
                // max_height is Some for every capped tier
                let h = capped.max_height().unwrap_or(u32::MAX);
                format!("bv*[height<={h}]+ba/b[height<={h}]")
            }
        }
    }

    /// Build the primary plan for a request
    pub fn plan(request: &DownloadRequest) -> DownloadPlan {
        let mut plan = DownloadPlan {
            format_spec: Self::format_spec(request.quality),
            output_dir: request.output_dir.clone(),
            output_template: OUTPUT_TEMPLATE.to_string(),
            merge_output_format: None,
            fast_start: false,
            extract_audio: None,
            subtitles: None,
            no_playlist: true,
        };

        if request.quality.is_audio_only() {
            // Extraction is the primary operation; video containers are ignored
            plan.extract_audio = Some(Self::audio_extraction(request.format.audio_codec()));
        } else {
            match request.format {
                OutputFormat::Auto => {}
                OutputFormat::Mp4 | OutputFormat::Mkv | OutputFormat::Webm => {
                    plan.merge_output_format = request.format.container();
                    plan.fast_start = request.format == OutputFormat::Mp4;
                }
                OutputFormat::Mp3 | OutputFormat::Aac => {
                    plan.extract_audio = Some(Self::audio_extraction(request.format.audio_codec()));
                }
            }
        }

        if request.subtitles {
            plan.subtitles = Some(SubtitleOptions {
                languages: vec!["en".to_string()],
                include_auto: true,
            });
        }

        plan
    }

    fn audio_extraction(codec: Option<&'static str>) -> AudioExtraction {
        AudioExtraction {
            codec,
            quality_kbps: AUDIO_QUALITY_KBPS,
            sample_rate: AUDIO_SAMPLE_RATE,
        }
    }

    /// Pick one stream that plays without merging.
    ///
    /// Audio-only takes the highest-bitrate audio stream. Video takes the
    /// tallest complete (audio+video) stream under the quality's ceiling.
    pub fn select_direct(formats: &[FormatCandidate], quality: Quality) -> Option<&FormatCandidate> {
        if quality.is_audio_only() {
            return first_max(
                formats.iter().filter(|f| f.is_audio_only()),
                |f| f.abr.unwrap_or(0.0),
            );
        }

        let ceiling = quality.max_height().unwrap_or(u32::MAX);
        first_max(
            formats
                .iter()
                .filter(|f| f.is_complete())
                .filter(|f| f.height.unwrap_or(0) <= ceiling),
            |f| f.height.unwrap_or(0),
        )
    }
}

/// Highest key wins; on a tie the earliest listed format is kept
fn first_max<'a, K: PartialOrd>(
    formats: impl Iterator<Item = &'a FormatCandidate>,
    key: impl Fn(&FormatCandidate) -> K,
) -> Option<&'a FormatCandidate> {
    let mut best: Option<(&'a FormatCandidate, K)> = None;
    for format in formats {
        let k = key(format);
        let better = match &best {
            Some((_, best_key)) => k > *best_key,
            None => true,
        };
        if better {
            best = Some((format, k));
        }
    }
    best.map(|(format, _)| format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(id: &str, height: Option<u32>) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            ext: "mp4".to_string(),
            has_audio: true,
            has_video: true,
            height,
            abr: None,
        }
    }

    fn video_only(id: &str, height: u32) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            ext: "webm".to_string(),
            has_audio: false,
            has_video: true,
            height: Some(height),
            abr: None,
        }
    }

    fn audio(id: &str, abr: Option<f32>) -> FormatCandidate {
        FormatCandidate {
            id: id.to_string(),
            ext: "m4a".to_string(),
            has_audio: true,
            has_video: false,
            height: None,
            abr,
        }
    }

    fn request(quality: Quality, format: OutputFormat) -> DownloadRequest {
        DownloadRequest::new("https://example.com/v", "/tmp/out")
            .with_quality(quality)
            .with_format(format)
    }

    #[test]
    fn test_audio_only_always_best_audio() {
        for format in OutputFormat::ALL {
            let plan = FormatSelector::plan(&request(Quality::AudioOnly, format));
            assert_eq!(plan.format_spec, "ba/b");
            assert!(plan.extract_audio.is_some());
            assert_eq!(plan.merge_output_format, None);
            assert!(!plan.fast_start);
        }
    }

    #[test]
    fn test_capped_quality_never_exceeds_ceiling() {
        let spec = FormatSelector::format_spec(Quality::P720);
        for alternative in spec.split('/') {
            assert!(
                alternative.contains("[height<=720]"),
                "uncapped alternative {alternative} in {spec}"
            );
        }
        assert_eq!(spec, "bv*[height<=720]+ba/b[height<=720]");
    }

    #[test]
    fn test_best_spec() {
        assert_eq!(FormatSelector::format_spec(Quality::Best), "bv*+ba/b");
    }

    #[test]
    fn test_mp4_requests_fast_start() {
        let plan = FormatSelector::plan(&request(Quality::P1080, OutputFormat::Mp4));
        assert_eq!(plan.merge_output_format, Some("mp4"));
        assert!(plan.fast_start);

        let plan = FormatSelector::plan(&request(Quality::P1080, OutputFormat::Mkv));
        assert_eq!(plan.merge_output_format, Some("mkv"));
        assert!(!plan.fast_start);
    }

    #[test]
    fn test_auto_has_no_post_processing() {
        let plan = FormatSelector::plan(&request(Quality::Best, OutputFormat::Auto));
        assert_eq!(plan.merge_output_format, None);
        assert_eq!(plan.extract_audio, None);
        assert!(plan.no_playlist);
        assert_eq!(plan.output_template, OUTPUT_TEMPLATE);
    }

    #[test]
    fn test_codec_choice_extracts_audio() {
        let plan = FormatSelector::plan(&request(Quality::P720, OutputFormat::Aac));
        assert_eq!(plan.extract_audio.map(|a| a.codec), Some(Some("aac")));

        let plan = FormatSelector::plan(&request(Quality::AudioOnly, OutputFormat::Auto));
        assert_eq!(plan.extract_audio.map(|a| a.codec), Some(None));
    }

    #[test]
    fn test_subtitles_english_manual_and_auto() {
        let plan = FormatSelector::plan(&request(Quality::Best, OutputFormat::Auto).with_subtitles(true));
        let subs = plan.subtitles.unwrap();
        assert_eq!(subs.languages, vec!["en".to_string()]);
        assert!(subs.include_auto);
    }

    #[test]
    fn test_direct_plan_has_no_post_processing() {
        let plan = DownloadPlan::direct(&request(Quality::P480, OutputFormat::Mp4), "18");
        assert_eq!(plan.format_spec, "18");
        assert!(!plan.needs_ffmpeg());
        assert!(FormatSelector::plan(&request(Quality::Best, OutputFormat::Auto)).needs_ffmpeg());
    }

    #[test]
    fn test_select_direct_video_respects_ceiling() {
        let formats = vec![
            complete("18", Some(360)),
            complete("22", Some(720)),
            complete("37", Some(1080)),
            video_only("137", 1080),
            audio("140", Some(128.0)),
        ];
        assert_eq!(FormatSelector::select_direct(&formats, Quality::P720).unwrap().id, "22");
        assert_eq!(FormatSelector::select_direct(&formats, Quality::Best).unwrap().id, "37");
        assert_eq!(FormatSelector::select_direct(&formats, Quality::P480).unwrap().id, "18");
    }

    #[test]
    fn test_select_direct_missing_height_counts_as_zero() {
        let formats = vec![complete("unknown", None)];
        assert_eq!(FormatSelector::select_direct(&formats, Quality::P360).unwrap().id, "unknown");
    }

    #[test]
    fn test_select_direct_nothing_under_ceiling() {
        let formats = vec![complete("22", Some(720))];
        assert!(FormatSelector::select_direct(&formats, Quality::P480).is_none());
        assert!(FormatSelector::select_direct(&[video_only("137", 1080)], Quality::Best).is_none());
    }

    #[test]
    fn test_select_direct_ties_keep_first_listed() {
        let formats = vec![complete("22", Some(720)), complete("hls-720", Some(720))];
        assert_eq!(FormatSelector::select_direct(&formats, Quality::P720).unwrap().id, "22");

        let audio_tie = vec![audio("140", Some(128.0)), audio("hls-audio", Some(128.0))];
        assert_eq!(
            FormatSelector::select_direct(&audio_tie, Quality::AudioOnly).unwrap().id,
            "140"
        );
    }

    #[test]
    fn test_select_direct_audio_by_bitrate() {
        let formats = vec![
            audio("139", Some(48.0)),
            audio("251", Some(160.0)),
            audio("nobitrate", None),
            complete("22", Some(720)),
        ];
        assert_eq!(FormatSelector::select_direct(&formats, Quality::AudioOnly).unwrap().id, "251");
        assert!(FormatSelector::select_direct(&[complete("22", Some(720))], Quality::AudioOnly).is_none());
    }
}
