//! Decoding: sources, engine bindings and the eager [`MediaReader`](reader::MediaReader).

use std::path::PathBuf;

use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::frame::Frame;
use crate::media::metadata::AudioInfo;

/// `ffprobe`/`ffmpeg` decode bindings.
pub mod ffmpeg;
pub(crate) mod raster;
/// Eager frame reader.
pub mod reader;

/// Where encoded media comes from.
#[derive(Clone, Debug)]
pub enum MediaSource {
    /// File on disk.
    Path(PathBuf),
    /// Encoded bytes held in memory.
    Bytes(Vec<u8>),
}

impl From<PathBuf> for MediaSource {
    fn from(p: PathBuf) -> Self {
        Self::Path(p)
    }
}

impl From<Vec<u8>> for MediaSource {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// Bounds applied while decoding.
///
/// Readers decode every frame up front, so this is the only guard against inputs that would
/// not fit in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecodeLimits {
    /// Maximum bytes of decoded pixels plus samples held by one reader.
    pub max_decoded_bytes: u64,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_decoded_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

impl DecodeLimits {
    pub(crate) fn check(&self, decoded_bytes: u64) -> ReframeResult<()> {
        if decoded_bytes > self.max_decoded_bytes {
            return Err(ReframeError::validation(format!(
                "decoded media exceeds limit of {} bytes",
                self.max_decoded_bytes
            )));
        }
        Ok(())
    }
}

/// Output of a decode engine, before it is wrapped in a reader.
#[derive(Debug, Default)]
pub(crate) struct DecodedMedia {
    pub(crate) frames: Vec<Frame>,
    pub(crate) audio: Vec<Frame>,
    pub(crate) audio_info: AudioInfo,
    pub(crate) loop_count: u16,
}
