use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame as GifFrame};

use crate::encode::writer::{MediaWriter, WriterConfig, WriterState, ensure_parent_dir};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::format::GIF_QUANTUM_MICROS;
use crate::media::frame::{Frame, ImageBuffer};

/// Largest delay a single GIF frame can store (`u16` centiseconds).
const MAX_GIF_DELAY_MICROS: u64 = u16::MAX as u64 * GIF_QUANTUM_MICROS;

/// Animated GIF writer.
///
/// Consecutive frames that share pixels (the duplicates a resampler emits) are folded into one
/// GIF frame with the summed delay. The file is encoded on close.
pub(crate) struct GifWriter {
    path: PathBuf,
    config: WriterConfig,
    state: WriterState,
    frames: Vec<(ImageBuffer, u64)>,
}

impl GifWriter {
    pub(crate) fn new(path: PathBuf, config: WriterConfig) -> Self {
        Self {
            path,
            config,
            state: WriterState::default(),
            frames: Vec::new(),
        }
    }

    /// NeuQuant speed in `1..=30`: lower quality trades palette accuracy for speed.
    fn speed(&self) -> i32 {
        1 + (i32::from(100 - self.config.quality.min(100)) * 29) / 99
    }

    fn encode(&mut self) -> ReframeResult<u64> {
        let mut bytes = Vec::new();
        {
            let mut enc = GifEncoder::new_with_speed(&mut bytes, self.speed());
            let repeat = match self.config.loop_count {
                0 => Repeat::Infinite,
                n => Repeat::Finite(n),
            };
            enc.set_repeat(repeat)?;
            for (img, micros) in std::mem::take(&mut self.frames) {
                let mut left = micros;
                loop {
                    let chunk = left.min(MAX_GIF_DELAY_MICROS);
                    let ms = u32::try_from(chunk / 1_000)
                        .map_err(|_| ReframeError::encode("gif delay out of range"))?;
                    enc.encode_frame(GifFrame::from_parts(
                        (*img).clone(),
                        0,
                        0,
                        Delay::from_numer_denom_ms(ms, 1),
                    ))?;
                    left -= chunk;
                    if left == 0 {
                        break;
                    }
                }
            }
        }
        ensure_parent_dir(&self.path)?;
        std::fs::write(&self.path, &bytes)
            .with_context(|| format!("failed to write '{}'", self.path.display()))?;
        Ok(bytes.len() as u64)
    }
}

impl MediaWriter for GifWriter {
    fn write_image_frame(&mut self, frame: &Frame) -> ReframeResult<()> {
        let (img, _) = self.state.accept_image(frame)?;
        let d = frame.duration_micros();
        match self.frames.last_mut() {
            Some((prev, total)) if std::sync::Arc::ptr_eq(prev, img) => *total += d,
            _ => self.frames.push((img.clone(), d)),
        }
        Ok(())
    }

    fn write_audio_frame(&mut self, frame: &Frame) -> ReframeResult<()> {
        self.state.accept_audio(frame, None)?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn close(&mut self) -> ReframeResult<()> {
        if !self.state.begin_close() {
            return Ok(());
        }
        if self.frames.is_empty() {
            tracing::debug!("no frames written, nothing to encode");
            return Ok(());
        }
        let coalesced = self.frames.len();
        let size = self.encode()?;
        tracing::debug!(
            frames = self.state.frames(),
            coalesced,
            size_bytes = size,
            "gif written"
        );
        Ok(())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn supports_audio(&self) -> bool {
        false
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn frames_written(&self) -> usize {
        self.state.frames()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/encode/gif.rs"]
mod tests;
