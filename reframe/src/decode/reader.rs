use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::decode::{DecodeLimits, DecodedMedia, MediaSource};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::foundation::scratch::{ScratchFile, scratch_path};
use crate::media::format::{Backend, FormatInfo, detect_format};
use crate::media::frame::{AudioPacket, Frame};
use crate::media::metadata::{AudioInfo, MediaMetadata};

/// Random-access sequence of decoded frames.
///
/// Every frame is decoded when the reader is opened, so frame count, duration and rate are exact
/// before any frame is served. Frames are immutable and cheap to clone.
///
/// The reader owns its backing source (a temp spool for byte input) and releases it on
/// [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct MediaReader {
    metadata: MediaMetadata,
    frames: Vec<Frame>,
    starts: Vec<u64>,
    audio: Vec<Frame>,
    backing: Option<Backing>,
    closed: bool,
}

#[derive(Debug)]
struct Backing {
    path: PathBuf,
    _spool: Option<ScratchFile>,
}

impl MediaReader {
    /// Decode `source` as `format` with default [`DecodeLimits`].
    pub fn open(source: impl Into<MediaSource>, format: &str) -> ReframeResult<Self> {
        Self::open_with_limits(source, format, &DecodeLimits::default())
    }

    /// Decode a file, detecting its format from magic bytes and then its extension.
    pub fn open_path(path: impl AsRef<Path>, limits: &DecodeLimits) -> ReframeResult<Self> {
        let path = path.as_ref();
        let head = read_head(path)?;
        let format = detect_format(Some(&head), Some(path)).ok_or_else(|| {
            ReframeError::unsupported(format!("cannot detect format of '{}'", path.display()))
        })?;
        Self::open_with_limits(path.to_path_buf(), format, limits)
    }

    /// Decode `source` as `format`.
    ///
    /// Either the whole source decodes and the reader is usable, or an error is returned and
    /// nothing is retained.
    #[tracing::instrument(skip(source, limits))]
    pub fn open_with_limits(
        source: impl Into<MediaSource>,
        format: &str,
        limits: &DecodeLimits,
    ) -> ReframeResult<Self> {
        let info = FormatInfo::require(format)?;
        let source = source.into();
        let (decoded, backing) = match info.backend {
            Backend::Image(fmt) => {
                let (bytes, backing) = load_bytes(source)?;
                (crate::decode::raster::decode_still(&bytes, fmt, limits)?, backing)
            }
            Backend::Gif => {
                let (bytes, backing) = load_bytes(source)?;
                (crate::decode::raster::decode_gif(&bytes, limits)?, backing)
            }
            Backend::Ffmpeg(_) => {
                let backing = spool(source, info.name)?;
                let decoded = crate::decode::ffmpeg::decode_all(&backing.path, limits)?;
                (decoded, Some(backing))
            }
            Backend::None => {
                return Err(ReframeError::unsupported(format!(
                    "'{}' has no frame decoder",
                    info.name
                )));
            }
        };

        let reader = Self::from_decoded(info.name, decoded, backing)?;
        tracing::debug!(
            format = info.name,
            frames = reader.metadata.frame_count,
            duration_micros = reader.metadata.total_duration_micros,
            audio_packets = reader.audio.len(),
            "opened reader"
        );
        Ok(reader)
    }

    /// Build a reader over frames that are already in memory.
    pub fn from_frames(format: &str, frames: Vec<Frame>, audio: Vec<Frame>) -> ReframeResult<Self> {
        let info = FormatInfo::require(format)?;
        let audio_info = match audio.first() {
            Some(f) => {
                let p = f.as_audio().ok_or_else(|| {
                    ReframeError::validation("audio frame list contains an image frame")
                })?;
                AudioInfo {
                    channels: p.channels(),
                    sample_rate: p.sample_rate(),
                    bitrate: 0,
                }
            }
            None => AudioInfo::default(),
        };
        if audio.iter().any(|f| f.as_audio().is_none()) {
            return Err(ReframeError::validation(
                "audio frame list contains an image frame",
            ));
        }
        let decoded = DecodedMedia {
            frames,
            audio,
            audio_info,
            loop_count: 0,
        };
        Self::from_decoded(info.name, decoded, None)
    }

    fn from_decoded(
        format: &str,
        decoded: DecodedMedia,
        backing: Option<Backing>,
    ) -> ReframeResult<Self> {
        if decoded.frames.iter().any(|f| f.as_image().is_none()) {
            return Err(ReframeError::validation(
                "image frame list contains an audio frame",
            ));
        }
        let metadata = MediaMetadata::from_frames(
            format,
            &decoded.frames,
            decoded.audio_info,
            decoded.loop_count,
        )?;
        let starts = start_times(&decoded.frames);
        Ok(Self {
            metadata,
            frames: decoded.frames,
            starts,
            audio: decoded.audio,
            backing,
            closed: false,
        })
    }

    /// Metadata computed at open.
    pub fn metadata(&self) -> &MediaMetadata {
        &self.metadata
    }

    /// Canonical format name.
    pub fn format(&self) -> &str {
        &self.metadata.format
    }

    /// Number of image frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// `true` when there are no image frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// `true` when there is more than one image frame.
    pub fn animated(&self) -> bool {
        self.metadata.frame_count > 1
    }

    /// File backing this reader, if it was opened from one.
    pub fn source_path(&self) -> Option<&Path> {
        self.backing.as_ref().map(|b| b.path.as_path())
    }

    /// First image frame.
    pub fn first(&self) -> ReframeResult<&Frame> {
        self.ensure_open()?;
        self.frames
            .first()
            .ok_or_else(|| ReframeError::no_such_frame("reader has no frames"))
    }

    /// Image frame displayed at `timestamp_micros`.
    ///
    /// The timeline is circular: timestamps wrap modulo the total duration, so callers can sample
    /// past the nominal end.
    pub fn frame_at(&self, timestamp_micros: u64) -> ReframeResult<&Frame> {
        self.ensure_open()?;
        if self.frames.is_empty() {
            return Err(ReframeError::no_such_frame(format!(
                "no frame at timestamp {timestamp_micros}us: reader has no frames"
            )));
        }
        let t = timestamp_micros % self.metadata.total_duration_micros.max(1);
        let idx = self.starts.partition_point(|&s| s <= t).saturating_sub(1);
        Ok(&self.frames[idx])
    }

    /// Iterate image frames from the start. Each call starts over.
    pub fn frames(&self) -> std::slice::Iter<'_, Frame> {
        self.frames.iter()
    }

    /// Iterate audio frames from the start. Each call starts over.
    pub fn audio_frames(&self) -> std::slice::Iter<'_, Frame> {
        self.audio.iter()
    }

    /// Keep only the earliest `max_micros` of media.
    ///
    /// The frame straddling the cut is shortened. At least one image frame is always kept.
    pub fn truncated(mut self, max_micros: u64) -> ReframeResult<Self> {
        self.ensure_open()?;
        let audio_micros: u64 = self.audio.iter().map(Frame::duration_micros).sum();
        if self.metadata.total_duration_micros.max(audio_micros) <= max_micros {
            return Ok(self);
        }
        let frames = truncate_frames(std::mem::take(&mut self.frames), max_micros, |f, d| {
            Some(f.with_duration(d))
        });
        let audio = truncate_frames(std::mem::take(&mut self.audio), max_micros, |f, d| {
            let p = f.as_audio()?;
            let keep = (d as u128 * u128::from(p.sample_rate()) / 1_000_000) as usize
                * usize::from(p.channels());
            let keep = keep.min(p.samples().len());
            (keep > 0).then(|| {
                f.with_audio(AudioPacket::new(
                    &p.samples()[..keep],
                    p.channels(),
                    p.sample_rate(),
                ))
            })
        });
        self.rebuild(frames, audio)
    }

    /// Reverse playback order of both image and audio frames.
    pub fn reversed(mut self) -> ReframeResult<Self> {
        self.ensure_open()?;
        let mut frames = std::mem::take(&mut self.frames);
        frames.reverse();
        let audio = std::mem::take(&mut self.audio)
            .iter()
            .rev()
            .filter_map(|f| f.as_audio().map(|p| f.with_audio(p.reversed())))
            .collect();
        self.rebuild(frames, audio)
    }

    fn rebuild(mut self, frames: Vec<Frame>, audio: Vec<Frame>) -> ReframeResult<Self> {
        self.metadata = MediaMetadata::from_frames(
            &self.metadata.format,
            &frames,
            self.metadata.audio(),
            self.metadata.loop_count,
        )?;
        self.starts = start_times(&frames);
        self.frames = frames;
        self.audio = audio;
        Ok(self)
    }

    /// Release decoded frames and the backing source. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.frames = Vec::new();
        self.starts = Vec::new();
        self.audio = Vec::new();
        if let Some(backing) = self.backing.take() {
            tracing::trace!(path = %backing.path.display(), "released reader source");
        }
    }

    /// `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> ReframeResult<()> {
        if self.closed {
            return Err(ReframeError::invalid_state("reader is closed"));
        }
        Ok(())
    }
}

impl Drop for MediaReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl PartialEq for MediaReader {
    fn eq(&self, other: &Self) -> bool {
        self.metadata.format == other.metadata.format && self.frames == other.frames
    }
}

fn start_times(frames: &[Frame]) -> Vec<u64> {
    let mut t = 0u64;
    frames
        .iter()
        .map(|f| {
            let s = t;
            t += f.duration_micros();
            s
        })
        .collect()
}

fn truncate_frames(
    frames: Vec<Frame>,
    max_micros: u64,
    shorten: impl Fn(&Frame, u64) -> Option<Frame>,
) -> Vec<Frame> {
    let mut out = Vec::new();
    let mut t = 0u64;
    for f in frames {
        if t >= max_micros && !out.is_empty() {
            break;
        }
        let end = t + f.duration_micros();
        if end <= max_micros {
            out.push(f);
        } else if let Some(short) = shorten(&f, max_micros.saturating_sub(t)) {
            out.push(short);
        }
        t = end;
    }
    out
}

fn read_head(path: &Path) -> ReframeResult<Vec<u8>> {
    use std::io::Read as _;

    let mut head = Vec::with_capacity(64);
    std::fs::File::open(path)
        .and_then(|f| f.take(64).read_to_end(&mut head))
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    Ok(head)
}

fn load_bytes(source: MediaSource) -> ReframeResult<(Vec<u8>, Option<Backing>)> {
    match source {
        MediaSource::Bytes(bytes) => Ok((bytes, None)),
        MediaSource::Path(path) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            Ok((
                bytes,
                Some(Backing {
                    path,
                    _spool: None,
                }),
            ))
        }
    }
}

fn spool(source: MediaSource, ext: &str) -> ReframeResult<Backing> {
    match source {
        MediaSource::Path(path) => Ok(Backing { path, _spool: None }),
        MediaSource::Bytes(bytes) => {
            let path = scratch_path("spool", ext);
            let guard = ScratchFile::new(path.clone());
            std::fs::write(&path, &bytes)
                .with_context(|| format!("failed to spool input to '{}'", path.display()))?;
            Ok(Backing {
                path,
                _spool: Some(guard),
            })
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/decode/reader.rs"]
mod tests;
