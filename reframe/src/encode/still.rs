use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder as _, ImageFormat};

use crate::encode::writer::{MediaWriter, WriterConfig, WriterState, ensure_parent_dir};
use crate::foundation::error::ReframeResult;
use crate::foundation::math::flatten_over_bg_rgb8;
use crate::media::frame::{Frame, ImageBuffer};

/// Single-image writer. Keeps the first image frame and encodes it on close.
pub(crate) struct StillWriter {
    path: PathBuf,
    format: ImageFormat,
    config: WriterConfig,
    state: WriterState,
    first: Option<ImageBuffer>,
}

impl StillWriter {
    pub(crate) fn new(path: PathBuf, format: ImageFormat, config: WriterConfig) -> Self {
        Self {
            path,
            format,
            config,
            state: WriterState::default(),
            first: None,
        }
    }

    fn encode(&self, img: &ImageBuffer) -> ReframeResult<()> {
        ensure_parent_dir(&self.path)?;
        let file = std::fs::File::create(&self.path)
            .with_context(|| format!("failed to create '{}'", self.path.display()))?;
        let mut out = BufWriter::new(file);
        let (w, h) = img.dimensions();

        match self.format {
            ImageFormat::Jpeg => {
                let rgb = flatten_over_bg_rgb8(img.as_raw(), self.config.bg_rgba)?;
                JpegEncoder::new_with_quality(&mut out, self.config.quality)
                    .write_image(&rgb, w, h, ExtendedColorType::Rgb8)?;
            }
            ImageFormat::Png => {
                let compression = if self.config.quality >= 75 {
                    CompressionType::Default
                } else {
                    CompressionType::Best
                };
                PngEncoder::new_with_quality(&mut out, compression, FilterType::Adaptive)
                    .write_image(img.as_raw(), w, h, ExtendedColorType::Rgba8)?;
            }
            other => img.write_to(&mut out, other)?,
        }
        out.flush()
            .with_context(|| format!("failed to write '{}'", self.path.display()))?;
        Ok(())
    }
}

impl MediaWriter for StillWriter {
    fn write_image_frame(&mut self, frame: &Frame) -> ReframeResult<()> {
        let (img, first) = self.state.accept_image(frame)?;
        if first {
            self.first = Some(img.clone());
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
        let Some(img) = self.first.take() else {
            tracing::debug!("no frames written, nothing to encode");
            return Ok(());
        };
        self.encode(&img)
    }

    fn is_static(&self) -> bool {
        true
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
#[path = "../../tests/unit/encode/still.rs"]
mod tests;
