//! Frame extraction transform.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use framesift_core::error::FramesiftError;

/// File name pattern of extracted frames.
pub const FRAME_PATTERN: &str = "frame-%05d.jpg";

/// Turns a video into zero-padded, sequentially named frame files.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Sample `video_uri` at `sampling_rate` frames per second into
    /// `output_dir`, returning the number of frames written.
    async fn extract(
        &self,
        video_uri: &str,
        sampling_rate: f64,
        output_dir: &Path,
    ) -> Result<usize, FramesiftError>;
}

/// Extractor that shells out to `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegExtractor {
    program: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Arguments for one extraction run.
    pub fn args(video_uri: &str, sampling_rate: f64, output_dir: &Path) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            video_uri.to_string(),
            "-vf".to_string(),
            format!("fps={}", sampling_rate),
            output_dir.join(FRAME_PATTERN).to_string_lossy().into_owned(),
        ]
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl FrameExtractor for FfmpegExtractor {
    async fn extract(
        &self,
        video_uri: &str,
        sampling_rate: f64,
        output_dir: &Path,
    ) -> Result<usize, FramesiftError> {
        if sampling_rate.is_nan() || sampling_rate <= 0.0 {
            return Err(FramesiftError::Validation(format!(
                "Sampling rate must be positive, got {}",
                sampling_rate
            )));
        }
        tokio::fs::create_dir_all(output_dir).await?;

        info!(uri = %video_uri, rate = sampling_rate, "Starting ffmpeg");
        let output = Command::new(&self.program)
            .args(Self::args(video_uri, sampling_rate, output_dir))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                FramesiftError::Transform(format!(
                    "Failed to launch {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FramesiftError::Transform(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let frames = count_frames(output_dir).await?;
        debug!(uri = %video_uri, frames, "ffmpeg finished");
        Ok(frames)
    }
}

/// Count `frame-*.jpg` files in `dir`.
pub async fn count_frames(dir: &Path) -> Result<usize, FramesiftError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame-") && name.ends_with(".jpg") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args() {
        let args = FfmpegExtractor::args("/videos/a.mp4", 0.2, Path::new("/frames/a"));
        assert_eq!(
            args,
            vec![
                "-hide_banner",
                "-loglevel",
                "error",
                "-i",
                "/videos/a.mp4",
                "-vf",
                "fps=0.2",
                "/frames/a/frame-%05d.jpg",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_transform_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = FfmpegExtractor::new("/nonexistent/ffmpeg-binary");
        let err = extractor
            .extract("/videos/a.mp4", 0.2, &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, FramesiftError::Transform(_)));
    }

    #[tokio::test]
    async fn test_rejects_non_positive_rate() {
        let dir = tempfile::tempdir().unwrap();
        let err = FfmpegExtractor::default()
            .extract("/videos/a.mp4", 0.0, dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, FramesiftError::Validation(_)));
    }

    #[tokio::test]
    async fn test_count_frames_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame-00001.jpg"), b"a").unwrap();
        std::fs::write(dir.path().join("frame-00002.jpg"), b"b").unwrap();
        std::fs::write(dir.path().join("log.txt"), b"c").unwrap();
        assert_eq!(count_frames(dir.path()).await.unwrap(), 2);
    }
}
