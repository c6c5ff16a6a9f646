use std::path::{Path, PathBuf};

use crate::foundation::core::{Dimensions, Fps};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::format::{Backend, FormatInfo};
use crate::media::frame::{AudioPacket, Frame, ImageBuffer};

/// Audio stream accepted by writers that carry audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioConfig {
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Target bitrate in bits per second (`None` lets the encoder pick).
    pub bitrate: Option<u32>,
}

/// Encoding parameters, fixed when a writer is created.
#[derive(Clone, Debug, PartialEq)]
pub struct WriterConfig {
    /// Output frame rate for constant-rate video.
    pub fps: Fps,
    /// Quality in `1..=100`; higher is better and larger.
    pub quality: u8,
    /// Target video bitrate in bits per second (`None` uses quality-driven CRF only).
    pub video_bitrate: Option<u32>,
    /// Audio stream to accept, if any.
    pub audio: Option<AudioConfig>,
    /// Animation loop count (0 = forever).
    pub loop_count: u16,
    /// Background used to flatten alpha for opaque outputs (RGBA8).
    pub bg_rgba: [u8; 4],
    /// Replace an existing file at the output path.
    pub overwrite: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            fps: Fps { num: 25, den: 1 },
            quality: 85,
            video_bitrate: None,
            audio: None,
            loop_count: 0,
            bg_rgba: [0, 0, 0, 255],
            overwrite: true,
        }
    }
}

impl WriterConfig {
    /// Check ranges.
    pub fn validate(&self) -> ReframeResult<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(ReframeError::validation(format!(
                "quality must be in 1..=100, got {}",
                self.quality
            )));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if let Some(audio) = &self.audio
            && (audio.channels == 0 || audio.sample_rate == 0)
        {
            return Err(ReframeError::validation(
                "audio channels and sample_rate must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Sink contract for encoding frames in playback order.
///
/// The encoder is initialized by the first image frame; every later image frame must have the
/// same dimensions. Audio frames are only accepted once an image frame has been written.
pub trait MediaWriter: Send {
    /// Append one image frame.
    fn write_image_frame(&mut self, frame: &Frame) -> ReframeResult<()>;
    /// Append one audio frame.
    fn write_audio_frame(&mut self, frame: &Frame) -> ReframeResult<()>;
    /// Flush and release the encoder. Safe with zero frames; later calls are no-ops.
    fn close(&mut self) -> ReframeResult<()>;
    /// `true` when only the first image frame is encoded.
    fn is_static(&self) -> bool;
    /// `true` when audio frames are encoded rather than dropped.
    fn supports_audio(&self) -> bool;
    /// Output file path.
    fn path(&self) -> &Path;
    /// Image frames accepted so far.
    fn frames_written(&self) -> usize;
}

/// Create a writer for `format` at `path`.
pub fn create_writer(
    path: impl Into<PathBuf>,
    format: &str,
    config: WriterConfig,
) -> ReframeResult<Box<dyn MediaWriter>> {
    let path = path.into();
    let info = FormatInfo::require(format)?;
    config.validate()?;
    if !config.overwrite && path.exists() {
        return Err(ReframeError::validation(format!(
            "output file '{}' already exists",
            path.display()
        )));
    }
    tracing::debug!(format = info.name, path = %path.display(), "creating writer");

    match info.backend {
        Backend::Image(fmt) => Ok(Box::new(crate::encode::still::StillWriter::new(
            path, fmt, config,
        ))),
        Backend::Gif => Ok(Box::new(crate::encode::gif::GifWriter::new(path, config))),
        Backend::Ffmpeg(codecs) => Ok(Box::new(crate::encode::ffmpeg::FfmpegWriter::new(
            path, info, codecs, config,
        )?)),
        Backend::None => Err(ReframeError::unsupported(format!(
            "'{}' has no frame encoder",
            info.name
        ))),
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReframeResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Bookkeeping shared by every writer: dimension lock, frame count, close flag.
#[derive(Debug, Default)]
pub(crate) struct WriterState {
    dims: Option<Dimensions>,
    frames: usize,
    closed: bool,
}

impl WriterState {
    /// Validate an image frame and record it. Returns the pixels and whether it is the first one.
    pub(crate) fn accept_image<'f>(&mut self, frame: &'f Frame) -> ReframeResult<(&'f ImageBuffer, bool)> {
        let (img, first) = self.check_image(frame)?;
        self.commit_image(img);
        Ok((img, first))
    }

    /// Validate an image frame without recording it.
    ///
    /// Writers that must start an encoder on the first frame call this, start the encoder and
    /// only then [`commit_image`](Self::commit_image), so a failed start leaves the writer
    /// uninitialized.
    pub(crate) fn check_image<'f>(&self, frame: &'f Frame) -> ReframeResult<(&'f ImageBuffer, bool)> {
        self.ensure_open()?;
        let img = frame
            .as_image()
            .ok_or_else(|| ReframeError::validation("write_image_frame got an audio frame"))?;
        let dims = Dimensions::new(img.width(), img.height());
        if dims.width == 0 || dims.height == 0 {
            return Err(ReframeError::validation("image frame has zero width or height"));
        }
        match self.dims {
            None => Ok((img, true)),
            Some(expected) if expected != dims => Err(ReframeError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                dims.width, dims.height, expected.width, expected.height
            ))),
            Some(_) => Ok((img, false)),
        }
    }

    /// Record a frame that passed [`check_image`](Self::check_image).
    pub(crate) fn commit_image(&mut self, img: &ImageBuffer) {
        self.dims
            .get_or_insert_with(|| Dimensions::new(img.width(), img.height()));
        self.frames += 1;
    }

    /// Validate an audio frame against `config`.
    pub(crate) fn accept_audio<'f>(
        &self,
        frame: &'f Frame,
        config: Option<&AudioConfig>,
    ) -> ReframeResult<&'f AudioPacket> {
        self.ensure_open()?;
        let packet = frame
            .as_audio()
            .ok_or_else(|| ReframeError::validation("write_audio_frame got an image frame"))?;
        if self.dims.is_none() {
            return Err(ReframeError::invalid_state(
                "audio frame written before the first image frame",
            ));
        }
        if let Some(cfg) = config
            && (packet.channels() != cfg.channels || packet.sample_rate() != cfg.sample_rate)
        {
            return Err(ReframeError::validation(format!(
                "audio layout mismatch: got {}ch@{}Hz, expected {}ch@{}Hz",
                packet.channels(),
                packet.sample_rate(),
                cfg.channels,
                cfg.sample_rate
            )));
        }
        Ok(packet)
    }

    pub(crate) fn ensure_open(&self) -> ReframeResult<()> {
        if self.closed {
            return Err(ReframeError::invalid_state("writer is closed"));
        }
        Ok(())
    }

    /// Mark closed; returns `false` if it already was.
    pub(crate) fn begin_close(&mut self) -> bool {
        !std::mem::replace(&mut self.closed, true)
    }

    pub(crate) fn frames(&self) -> usize {
        self.frames
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/writer.rs"]
mod tests;
