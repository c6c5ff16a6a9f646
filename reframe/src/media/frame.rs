use std::sync::Arc;

use image::RgbaImage;

use crate::foundation::core::{Dimensions, MICROS_PER_SEC};

/// Shared, immutable packed RGBA8 image (straight alpha).
pub type ImageBuffer = Arc<RgbaImage>;

/// Opaque chunk of decoded audio.
///
/// Samples are interleaved `f32` in `[-1, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioPacket {
    samples: Arc<[f32]>,
    channels: u16,
    sample_rate: u32,
}

impl AudioPacket {
    /// Create a packet. `samples.len()` should be a multiple of `channels`.
    pub fn new(samples: impl Into<Arc<[f32]>>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            channels,
            sample_rate,
        }
    }

    /// Interleaved samples.
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of samples per channel.
    pub fn sample_frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / usize::from(self.channels)
        }
    }

    /// Playback length at the packet's sample rate.
    pub fn duration_micros(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.sample_frames() as u64 * MICROS_PER_SEC / u64::from(self.sample_rate)
    }

    /// Copy with the sample order reversed, keeping channels interleaved.
    pub fn reversed(&self) -> Self {
        let ch = usize::from(self.channels.max(1));
        let samples: Vec<f32> = self
            .samples
            .chunks_exact(ch)
            .rev()
            .flatten()
            .copied()
            .collect();
        Self::new(samples, self.channels, self.sample_rate)
    }

    /// Linearly resample so the packet plays `speed` times faster at the same sample rate.
    pub fn time_scaled(&self, speed: f64) -> Self {
        let frames_in = self.sample_frames();
        if speed <= 0.0 || !speed.is_finite() || frames_in == 0 || speed == 1.0 {
            return self.clone();
        }
        let ch = usize::from(self.channels);
        let frames_out = ((frames_in as f64) / speed).round().max(1.0) as usize;
        let mut out = Vec::with_capacity(frames_out * ch);
        for i in 0..frames_out {
            let pos = i as f64 * speed;
            let i0 = (pos.floor() as usize).min(frames_in - 1);
            let i1 = (i0 + 1).min(frames_in - 1);
            let t = (pos - i0 as f64) as f32;
            for c in 0..ch {
                let a = self.samples[i0 * ch + c];
                let b = self.samples[i1 * ch + c];
                out.push(a + (b - a) * t);
            }
        }
        Self::new(out, self.channels, self.sample_rate)
    }
}

/// Payload carried by a [`Frame`].
#[derive(Clone, Debug)]
pub enum FramePayload {
    /// Decoded still image.
    Image(ImageBuffer),
    /// Decoded audio chunk.
    Audio(AudioPacket),
}

/// Immutable timed unit of media.
#[derive(Clone, Debug)]
pub struct Frame {
    payload: FramePayload,
    duration_micros: u64,
}

impl Frame {
    /// Image frame.
    pub fn image(image: impl Into<ImageBuffer>, duration_micros: u64) -> Self {
        Self {
            payload: FramePayload::Image(image.into()),
            duration_micros,
        }
    }

    /// Audio frame. Duration is derived from the packet.
    pub fn audio(packet: AudioPacket) -> Self {
        let duration_micros = packet.duration_micros();
        Self {
            payload: FramePayload::Audio(packet),
            duration_micros,
        }
    }

    /// Payload.
    pub fn payload(&self) -> &FramePayload {
        &self.payload
    }

    /// Duration in microseconds.
    pub fn duration_micros(&self) -> u64 {
        self.duration_micros
    }

    /// Image payload, if this is an image frame.
    pub fn as_image(&self) -> Option<&ImageBuffer> {
        match &self.payload {
            FramePayload::Image(img) => Some(img),
            FramePayload::Audio(_) => None,
        }
    }

    /// Audio payload, if this is an audio frame.
    pub fn as_audio(&self) -> Option<&AudioPacket> {
        match &self.payload {
            FramePayload::Audio(p) => Some(p),
            FramePayload::Image(_) => None,
        }
    }

    /// Image dimensions, if this is an image frame.
    pub fn dimensions(&self) -> Option<Dimensions> {
        self.as_image()
            .map(|img| Dimensions::new(img.width(), img.height()))
    }

    /// Copy with a different duration.
    pub fn with_duration(&self, duration_micros: u64) -> Self {
        Self {
            payload: self.payload.clone(),
            duration_micros,
        }
    }

    /// Copy with a different image, keeping the duration.
    pub fn with_image(&self, image: impl Into<ImageBuffer>) -> Self {
        Self {
            payload: FramePayload::Image(image.into()),
            duration_micros: self.duration_micros,
        }
    }

    /// Copy with a different audio packet; duration follows the packet.
    pub fn with_audio(&self, packet: AudioPacket) -> Self {
        Self::audio(packet)
    }

    /// `true` when both frames share the same pixel allocation.
    pub fn shares_image_with(&self, other: &Frame) -> bool {
        match (self.as_image(), other.as_image()) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        if self.duration_micros != other.duration_micros {
            return false;
        }
        match (&self.payload, &other.payload) {
            (FramePayload::Image(a), FramePayload::Image(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.dimensions() == b.dimensions() && a.as_raw() == b.as_raw())
            }
            (FramePayload::Audio(a), FramePayload::Audio(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/media/frame.rs"]
mod tests;
