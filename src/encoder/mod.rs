//! HLS transcode pipeline: rendition passes, master playlist and upload.

pub mod ffmpeg;
pub mod playlist;
pub mod rendition;
pub mod upload;
pub mod worker;

pub use ffmpeg::{FfmpegEncoder, RenditionEncoder, RenditionOutput};
pub use rendition::{sanitize_key, RenditionSpec, RENDITIONS};
pub use upload::{UploadSummary, Uploader};
pub use worker::{JobReport, TranscodeJob, TranscodeWorker};
