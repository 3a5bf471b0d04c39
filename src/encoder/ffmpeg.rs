//! FFmpeg subprocess wrapper for HLS rendition passes.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::rendition::{playlist_file_name, segment_pattern, RenditionSpec};
use crate::error::EncoderError;

/// Target duration of each HLS segment in seconds.
pub const HLS_SEGMENT_SECONDS: u32 = 10;

/// Lines of ffmpeg stderr kept in a failure.
const STDERR_TAIL_LINES: usize = 20;

/// Files produced by one rendition pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionOutput {
    /// `WxH` of the rendition.
    pub resolution: String,
    /// Bandwidth advertised for this rendition.
    pub bandwidth: u64,
    /// Path to the sub-playlist.
    pub playlist: PathBuf,
    /// Media segments, in playback order.
    pub segments: Vec<PathBuf>,
}

impl RenditionOutput {
    /// File name of the sub-playlist, as referenced from the master playlist.
    pub fn playlist_name(&self) -> String {
        self.playlist
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Runs one rendition pass of the source into `output_dir`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenditionEncoder: Send + Sync {
    async fn encode(
        &self,
        input: &Path,
        output_dir: &Path,
        prefix: &str,
        spec: &RenditionSpec,
    ) -> Result<RenditionOutput, EncoderError>;
}

/// Encoder that shells out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Checks that the binary can be executed before any work starts.
    pub async fn check_available(&self) -> Result<(), EncoderError> {
        let output = Command::new(&self.binary)
            .args(["-hide_banner", "-version"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                EncoderError::SpawnFailed(format!("{}: {}", self.binary.display(), e))
            })?;

        if !output.success() {
            return Err(EncoderError::FfmpegFailed {
                code: output.code().unwrap_or(-1),
                stderr: "version probe failed".to_string(),
            });
        }

        Ok(())
    }
}

/// Builds the ffmpeg arguments for one HLS rendition.
pub fn hls_args(input: &Path, output_dir: &Path, prefix: &str, spec: &RenditionSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        input.as_os_str().to_owned(),
    ];

    args.extend(
        [
            "-c:v".to_string(),
            "h264".to_string(),
            "-b:v".to_string(),
            spec.video_bitrate(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            spec.audio_bitrate(),
            "-vf".to_string(),
            format!("scale={}", spec.resolution()),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            HLS_SEGMENT_SECONDS.to_string(),
            // Keep every segment in the index, not a sliding window.
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-hls_segment_filename".to_string(),
        ]
        .into_iter()
        .map(OsString::from),
    );

    args.push(output_dir.join(segment_pattern(prefix, spec)).into_os_string());
    args.push(output_dir.join(playlist_file_name(prefix, spec)).into_os_string());

    args
}

/// Lists the segment files of one rendition, sorted by sequence number.
pub fn collect_segments(
    output_dir: &Path,
    prefix: &str,
    spec: &RenditionSpec,
) -> std::io::Result<Vec<PathBuf>> {
    let stem = format!("{}_{}_", prefix, spec.resolution());
    let mut segments = Vec::new();

    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| {
                n.strip_prefix(&stem)
                    .and_then(|rest| rest.strip_suffix(".ts"))
                    .is_some_and(|seq| !seq.is_empty() && seq.bytes().all(|b| b.is_ascii_digit()))
            });
        if matches {
            segments.push(path);
        }
    }

    // Zero-padded to three digits, but longer sources overflow the padding.
    segments.sort_by_key(|p| {
        let name = p.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let seq: u64 = name.rsplit('_').next().and_then(|s| s.parse().ok()).unwrap_or(0);
        seq
    });

    Ok(segments)
}

/// Keeps the last few lines of a process's stderr.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl RenditionEncoder for FfmpegEncoder {
    async fn encode(
        &self,
        input: &Path,
        output_dir: &Path,
        prefix: &str,
        spec: &RenditionSpec,
    ) -> Result<RenditionOutput, EncoderError> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(hls_args(input, output_dir, prefix, spec));
        // A job deadline drops this future; the child must die with it.
        cmd.kill_on_drop(true);

        info!(
            input = ?input,
            resolution = %spec.resolution(),
            video_bitrate = %spec.video_bitrate(),
            audio_bitrate = %spec.audio_bitrate(),
            "Starting HLS rendition pass"
        );
        debug!(cmd = ?cmd, "Running FFmpeg");

        let output_result = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EncoderError::SpawnFailed(e.to_string()))?;

        if !output_result.status.success() {
            return Err(EncoderError::FfmpegFailed {
                code: output_result.status.code().unwrap_or(-1),
                stderr: stderr_tail(&output_result.stderr),
            });
        }

        let playlist = output_dir.join(playlist_file_name(prefix, spec));
        if !playlist.is_file() {
            return Err(EncoderError::VerificationFailed(format!(
                "playlist '{}' was not written",
                playlist.display()
            )));
        }

        let segments = collect_segments(output_dir, prefix, spec)
            .map_err(|e| EncoderError::VerificationFailed(e.to_string()))?;

        if segments.is_empty() {
            return Err(EncoderError::VerificationFailed(format!(
                "no segments for {}",
                spec.resolution()
            )));
        }

        info!(
            resolution = %spec.resolution(),
            segments = segments.len(),
            "HLS rendition pass completed"
        );

        Ok(RenditionOutput {
            resolution: spec.resolution(),
            bandwidth: spec.bandwidth,
            playlist,
            segments,
        })
    }
}
