//! Fixed rendition ladder and output naming.

/// One target encoding of the source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenditionSpec {
    /// Tier name used in logs.
    pub tier: &'static str,
    pub width: u32,
    pub height: u32,
    /// Target video bitrate in kbit/s.
    pub video_kbps: u32,
    /// Target audio bitrate in kbit/s.
    pub audio_kbps: u32,
    /// Advertised `BANDWIDTH` in the master playlist, bits/s.
    pub bandwidth: u64,
}

impl RenditionSpec {
    /// `WxH` form used in file names, the scale filter and the playlist.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn video_bitrate(&self) -> String {
        format!("{}k", self.video_kbps)
    }

    pub fn audio_bitrate(&self) -> String {
        format!("{}k", self.audio_kbps)
    }
}

/// Rendition ladder, lowest resolution first. Passes run in this order and the
/// master playlist lists them in this order.
pub const RENDITIONS: [RenditionSpec; 3] = [
    RenditionSpec {
        tier: "low",
        width: 320,
        height: 180,
        video_kbps: 500,
        audio_kbps: 64,
        bandwidth: 676_800,
    },
    RenditionSpec {
        tier: "mid",
        width: 854,
        height: 480,
        video_kbps: 1000,
        audio_kbps: 128,
        bandwidth: 1_353_600,
    },
    RenditionSpec {
        tier: "high",
        width: 1280,
        height: 720,
        video_kbps: 2500,
        audio_kbps: 192,
        bandwidth: 3_230_400,
    },
];

/// Turns an object key into a flat file-name prefix.
///
/// Anything other than ASCII alphanumerics, `-` and `_` becomes `_`, so
/// `clip.mp4` maps to `clip_mp4` and `uploads/a.mov` to `uploads_a_mov`.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Sub-playlist file name for one rendition.
pub fn playlist_file_name(prefix: &str, spec: &RenditionSpec) -> String {
    format!("{}_{}.m3u8", prefix, spec.resolution())
}

/// ffmpeg segment file pattern for one rendition.
pub fn segment_pattern(prefix: &str, spec: &RenditionSpec) -> String {
    format!("{}_{}_%03d.ts", prefix, spec.resolution())
}
