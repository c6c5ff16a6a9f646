use std::path::Path;

use crate::foundation::error::{ReframeError, ReframeResult};

/// GIF frame delays are expressed in centiseconds.
pub const GIF_QUANTUM_MICROS: u64 = 10_000;

/// Broad category of a media format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// Single-frame image.
    StillImage,
    /// Multi-frame image with per-frame delays.
    AnimatedImage,
    /// Audio/video container.
    Video,
    /// Audio-only container.
    Audio,
}

/// Codec settings for formats handled by `ffmpeg`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FfmpegCodecs {
    /// Value passed to `-f`.
    pub muxer: &'static str,
    /// Value passed to `-c:v`.
    pub video_codec: &'static str,
    /// Value passed to `-c:a`.
    pub audio_codec: &'static str,
    /// Highest (worst) CRF accepted by the video codec.
    pub max_crf: u8,
}

/// Engine bound to a format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// Still image handled by the `image` crate.
    Image(image::ImageFormat),
    /// Animated GIF handled by the `image` crate.
    Gif,
    /// Container handled by the system `ffmpeg`.
    Ffmpeg(FfmpegCodecs),
    /// Known format without a frame backend.
    None,
}

/// Static description of one format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// Canonical lowercase name, also used as the file extension.
    pub name: &'static str,
    /// Alternative names and extensions.
    pub aliases: &'static [&'static str],
    /// Format category.
    pub kind: MediaKind,
    /// Backend used for both decode and encode.
    pub backend: Backend,
    /// Minimum frame-duration unit enforced by the format, if any.
    pub quantum_micros: Option<u64>,
    /// Formats whose content can be renamed to this one without re-encoding.
    pub rename_group: &'static str,
}

const H264: FfmpegCodecs = FfmpegCodecs {
    muxer: "mp4",
    video_codec: "libx264",
    audio_codec: "aac",
    max_crf: 51,
};

static FORMATS: &[FormatInfo] = &[
    FormatInfo {
        name: "png",
        aliases: &[],
        kind: MediaKind::StillImage,
        backend: Backend::Image(image::ImageFormat::Png),
        quantum_micros: None,
        rename_group: "png",
    },
    FormatInfo {
        name: "jpg",
        aliases: &["jpeg", "jfif"],
        kind: MediaKind::StillImage,
        backend: Backend::Image(image::ImageFormat::Jpeg),
        quantum_micros: None,
        rename_group: "jpg",
    },
    FormatInfo {
        name: "bmp",
        aliases: &[],
        kind: MediaKind::StillImage,
        backend: Backend::Image(image::ImageFormat::Bmp),
        quantum_micros: None,
        rename_group: "bmp",
    },
    FormatInfo {
        name: "tiff",
        aliases: &["tif"],
        kind: MediaKind::StillImage,
        backend: Backend::Image(image::ImageFormat::Tiff),
        quantum_micros: None,
        rename_group: "tiff",
    },
    FormatInfo {
        name: "webp",
        aliases: &[],
        kind: MediaKind::StillImage,
        backend: Backend::Image(image::ImageFormat::WebP),
        quantum_micros: None,
        rename_group: "webp",
    },
    FormatInfo {
        name: "gif",
        aliases: &[],
        kind: MediaKind::AnimatedImage,
        backend: Backend::Gif,
        quantum_micros: Some(GIF_QUANTUM_MICROS),
        rename_group: "gif",
    },
    FormatInfo {
        name: "mp4",
        aliases: &["m4v"],
        kind: MediaKind::Video,
        backend: Backend::Ffmpeg(H264),
        quantum_micros: None,
        rename_group: "isobmff",
    },
    FormatInfo {
        name: "mov",
        aliases: &["qt"],
        kind: MediaKind::Video,
        backend: Backend::Ffmpeg(FfmpegCodecs {
            muxer: "mov",
            ..H264
        }),
        quantum_micros: None,
        rename_group: "isobmff",
    },
    FormatInfo {
        name: "mkv",
        aliases: &["matroska"],
        kind: MediaKind::Video,
        backend: Backend::Ffmpeg(FfmpegCodecs {
            muxer: "matroska",
            ..H264
        }),
        quantum_micros: None,
        rename_group: "mkv",
    },
    FormatInfo {
        name: "webm",
        aliases: &[],
        kind: MediaKind::Video,
        backend: Backend::Ffmpeg(FfmpegCodecs {
            muxer: "webm",
            video_codec: "libvpx-vp9",
            audio_codec: "libopus",
            max_crf: 63,
        }),
        quantum_micros: None,
        rename_group: "webm",
    },
    FormatInfo {
        name: "mp3",
        aliases: &[],
        kind: MediaKind::Audio,
        backend: Backend::None,
        quantum_micros: None,
        rename_group: "mp3",
    },
    FormatInfo {
        name: "wav",
        aliases: &["wave"],
        kind: MediaKind::Audio,
        backend: Backend::None,
        quantum_micros: None,
        rename_group: "wav",
    },
    FormatInfo {
        name: "ogg",
        aliases: &["oga", "opus"],
        kind: MediaKind::Audio,
        backend: Backend::None,
        quantum_micros: None,
        rename_group: "ogg",
    },
];

impl FormatInfo {
    /// Look up a format by name or alias, case-insensitively.
    pub fn lookup(name: &str) -> Option<&'static FormatInfo> {
        let name = name.trim().trim_start_matches('.').to_ascii_lowercase();
        FORMATS
            .iter()
            .find(|f| f.name == name || f.aliases.contains(&name.as_str()))
    }

    /// Look up a format, failing with [`ReframeError::UnsupportedFormat`] when unknown.
    pub fn require(name: &str) -> ReframeResult<&'static FormatInfo> {
        Self::lookup(name).ok_or_else(|| ReframeError::unsupported(format!("unknown format '{name}'")))
    }

    /// Every registered format.
    pub fn all() -> &'static [FormatInfo] {
        FORMATS
    }

    /// `true` when frames can be decoded from this format.
    pub fn is_decodable(&self) -> bool {
        !matches!(self.backend, Backend::None)
    }

    /// `true` when frames can be encoded into this format.
    pub fn is_encodable(&self) -> bool {
        !matches!(self.backend, Backend::None)
    }

    /// `true` when only a single frame is written.
    pub fn is_static(&self) -> bool {
        self.kind == MediaKind::StillImage
    }

    /// `true` when the container carries an audio track.
    pub fn supports_audio(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// `true` when the backend is the system `ffmpeg`.
    pub fn needs_ffmpeg(&self) -> bool {
        matches!(self.backend, Backend::Ffmpeg(_))
    }

    /// `true` when content in `self` may be copied under `other`'s extension unchanged.
    pub fn rename_compatible(&self, other: &FormatInfo) -> bool {
        self.rename_group == other.rename_group
    }
}

/// Guess a format name from magic bytes, then from the file extension.
pub fn detect_format(bytes: Option<&[u8]>, path: Option<&Path>) -> Option<&'static str> {
    if let Some(bytes) = bytes
        && let Some(name) = sniff(bytes)
    {
        return Some(name);
    }
    let ext = path?.extension()?.to_str()?;
    FormatInfo::lookup(ext).map(|f| f.name)
}

fn sniff(bytes: &[u8]) -> Option<&'static str> {
    if let Ok(fmt) = image::guess_format(bytes) {
        let name = match fmt {
            image::ImageFormat::Png => "png",
            image::ImageFormat::Jpeg => "jpg",
            image::ImageFormat::Gif => "gif",
            image::ImageFormat::Bmp => "bmp",
            image::ImageFormat::Tiff => "tiff",
            image::ImageFormat::WebP => "webp",
            _ => return None,
        };
        return Some(name);
    }
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(if &bytes[8..10] == b"qt" { "mov" } else { "mp4" });
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let head = &bytes[..bytes.len().min(64)];
        let is_webm = head.windows(4).any(|w| w == b"webm");
        return Some(if is_webm { "webm" } else { "mkv" });
    }
    if bytes.starts_with(b"ID3") || bytes.starts_with(&[0xFF, 0xFB]) {
        return Some("mp3");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WAVE" {
        return Some("wav");
    }
    if bytes.starts_with(b"OggS") {
        return Some("ogg");
    }
    None
}

#[cfg(test)]
#[path = "../../tests/unit/media/format.rs"]
mod tests;
