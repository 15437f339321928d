use std::{process::Stdio, time::Duration};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::domain::{
    repositories::video_processor::VideoProcessor,
    value_objects::videos::{ProcessOptions, ProcessedVideo},
};

#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub timeout_secs: u64,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            timeout_secs: 1800,
        }
    }
}

pub struct FfmpegProcessor {
    config: FfmpegConfig,
}

impl FfmpegProcessor {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    async fn run(&self, program: &str, args: &[String], what: &str) -> Result<Vec<u8>> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), child)
            .await
            .with_context(|| format!("{} timed out after {}s", what, self.config.timeout_secs))?
            .with_context(|| format!("failed to run {}", program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                program,
                status = %output.status,
                stderr = %tail(&stderr, 2000),
                "{} failed",
                what
            );
            bail!("{} failed with {}", what, output.status);
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl VideoProcessor for FfmpegProcessor {
    async fn probe_duration(&self, path: &str) -> Result<f64> {
        let stdout = self
            .run(&self.config.ffprobe_bin, &probe_args(path), "ffprobe")
            .await?;

        parse_duration(&String::from_utf8_lossy(&stdout))
    }

    async fn process(
        &self,
        input_path: &str,
        output_path: &str,
        thumbnail_path: &str,
        options: ProcessOptions,
    ) -> Result<ProcessedVideo> {
        if let Some(parent) = std::path::Path::new(output_path).parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let args = transcode_args(input_path, output_path, &options);
        self.run(&self.config.ffmpeg_bin, &args, "ffmpeg transcode")
            .await?;

        let duration_seconds = self.probe_duration(output_path).await?;

        // A missing thumbnail never fails the job.
        let thumbnail_path = match self
            .run(
                &self.config.ffmpeg_bin,
                &thumbnail_args(output_path, thumbnail_path, duration_seconds),
                "ffmpeg thumbnail",
            )
            .await
        {
            Ok(_) => Some(thumbnail_path.to_string()),
            Err(err) => {
                warn!(output_path, "ffmpeg: thumbnail generation failed: {err:?}");
                None
            }
        };

        info!(
            input_path,
            output_path,
            duration_seconds,
            "ffmpeg: processed video"
        );

        Ok(ProcessedVideo {
            output_path: output_path.to_string(),
            thumbnail_path,
            duration_seconds,
        })
    }
}

fn probe_args(path: &str) -> Vec<String> {
    [
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        path,
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

pub fn parse_duration(stdout: &str) -> Result<f64> {
    let value = stdout.trim();
    let duration: f64 = value
        .parse()
        .with_context(|| format!("ffprobe returned an unreadable duration: {:?}", value))?;
    if !duration.is_finite() || duration < 0.0 {
        bail!("ffprobe returned an invalid duration: {}", duration);
    }
    Ok(duration)
}

/// Arguments for a trim/scale/mute pass producing a faststart H.264 MP4.
pub fn transcode_args(input_path: &str, output_path: &str, options: &ProcessOptions) -> Vec<String> {
    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into()];

    let start = options.trim_start_seconds.filter(|start| *start > 0.0);
    if let Some(start) = start {
        args.push("-ss".into());
        args.push(format!("{:.3}", start));
    }

    args.push("-i".into());
    args.push(input_path.into());

    if let Some(end) = options.trim_end_seconds {
        // -ss before -i resets timestamps, so the end becomes a length.
        let length = end - start.unwrap_or(0.0);
        if length > 0.0 {
            args.push("-t".into());
            args.push(format!("{:.3}", length));
        }
    }

    if let Some(filter) = scale_filter(options.width, options.height) {
        args.push("-vf".into());
        args.push(filter);
    }

    args.extend(
        ["-c:v", "libx264", "-preset", "veryfast", "-crf", "23", "-pix_fmt", "yuv420p"]
            .iter()
            .map(|arg| arg.to_string()),
    );

    if options.mute {
        args.push("-an".into());
    } else {
        args.extend(["-c:a", "aac", "-b:a", "128k"].iter().map(|arg| arg.to_string()));
    }

    args.push("-movflags".into());
    args.push("+faststart".into());
    args.push(output_path.into());
    args
}

fn scale_filter(width: Option<u32>, height: Option<u32>) -> Option<String> {
    // libx264 needs even dimensions; -2 keeps the aspect ratio and rounds to even.
    match (width, height) {
        (Some(w), Some(h)) => Some(format!("scale={}:{}", even(w), even(h))),
        (Some(w), None) => Some(format!("scale={}:-2", even(w))),
        (None, Some(h)) => Some(format!("scale=-2:{}", even(h))),
        (None, None) => None,
    }
}

fn even(value: u32) -> u32 {
    (value.max(2) / 2) * 2
}

fn thumbnail_args(video_path: &str, thumbnail_path: &str, duration_seconds: f64) -> Vec<String> {
    let at = if duration_seconds > 2.0 { 1.0 } else { 0.0 };
    vec![
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", at),
        "-i".into(),
        video_path.into(),
        "-frames:v".into(),
        "1".into(),
        "-vf".into(),
        "scale=640:-2".into(),
        "-q:v".into(),
        "3".into(),
        thumbnail_path.into(),
    ]
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((index, _)) => &text[index..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> Option<usize> {
        args.iter().position(|arg| arg == flag)
    }

    #[test]
    fn plain_transcode_has_no_trim_or_scale() {
        let args = transcode_args("in.mov", "out.mp4", &ProcessOptions::default());

        assert!(position(&args, "-ss").is_none());
        assert!(position(&args, "-t").is_none());
        assert!(position(&args, "-vf").is_none());
        assert!(position(&args, "-an").is_none());
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn trim_window_seeks_before_input_and_converts_end_to_length() {
        let options = ProcessOptions {
            trim_start_seconds: Some(5.0),
            trim_end_seconds: Some(20.0),
            ..Default::default()
        };
        let args = transcode_args("in.mov", "out.mp4", &options);

        let ss = position(&args, "-ss").unwrap();
        let input = position(&args, "-i").unwrap();
        assert!(ss < input);
        assert_eq!(args[ss + 1], "5.000");
        assert_eq!(args[position(&args, "-t").unwrap() + 1], "15.000");
    }

    #[test]
    fn scale_and_mute_are_applied() {
        let options = ProcessOptions {
            width: Some(1081),
            mute: true,
            ..Default::default()
        };
        let args = transcode_args("in.mov", "out.mp4", &options);

        assert_eq!(args[position(&args, "-vf").unwrap() + 1], "scale=1080:-2");
        assert!(position(&args, "-an").is_some());
        assert!(position(&args, "-c:a").is_none());
    }

    #[test]
    fn parses_ffprobe_output() {
        assert_eq!(parse_duration("12.345000\n").unwrap(), 12.345);
        assert!(parse_duration("N/A").is_err());
        assert!(parse_duration("-1").is_err());
    }
}
