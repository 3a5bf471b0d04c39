//! HLS master playlist generation.

use std::path::{Path, PathBuf};

use super::ffmpeg::RenditionOutput;

/// First line of every playlist.
pub const HEADER: &str = "#EXTM3U";

/// Master playlist file name for a job.
pub fn master_file_name(prefix: &str) -> String {
    format!("{}_master.m3u8", prefix)
}

/// Renders the master playlist.
///
/// One `#EXT-X-STREAM-INF` line per rendition, each followed by the relative
/// sub-playlist name. Lines are newline-joined with no trailing newline.
pub fn render_master(outputs: &[RenditionOutput]) -> String {
    let mut lines = Vec::with_capacity(1 + outputs.len() * 2);
    lines.push(HEADER.to_string());

    for output in outputs {
        lines.push(format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            output.bandwidth, output.resolution
        ));
        lines.push(output.playlist_name());
    }

    lines.join("\n")
}

/// Writes the master playlist into `output_dir` and returns its path.
pub async fn write_master(
    output_dir: &Path,
    prefix: &str,
    outputs: &[RenditionOutput],
) -> std::io::Result<PathBuf> {
    let path = output_dir.join(master_file_name(prefix));
    tokio::fs::write(&path, render_master(outputs)).await?;
    Ok(path)
}
