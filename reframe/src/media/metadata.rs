use crate::foundation::core::{Dimensions, MICROS_PER_SEC};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::frame::Frame;

/// Audio stream properties reported by a decoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct AudioInfo {
    /// Channel count (0 when there is no audio).
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Source bitrate in bits per second (0 when unknown).
    pub bitrate: u32,
}

/// Media properties computed once when a reader is opened.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct MediaMetadata {
    /// Canonical format name.
    pub format: String,
    /// Average frames per second (`> 0` whenever `frame_count > 0`).
    pub frame_rate: f64,
    /// Number of image frames.
    pub frame_count: usize,
    /// Sum of all image frame durations.
    pub total_duration_micros: u64,
    /// Average image frame duration.
    pub frame_duration_micros: u64,
    /// Audio channel count (0 when silent).
    pub audio_channels: u16,
    /// Audio sample rate in Hz.
    pub audio_sample_rate: u32,
    /// Audio bitrate in bits per second.
    pub audio_bitrate: u32,
    /// Width of the first frame.
    pub width: u32,
    /// Height of the first frame.
    pub height: u32,
    /// Animation loop count (0 = forever).
    pub loop_count: u16,
}

impl MediaMetadata {
    /// Derive metadata from decoded image frames.
    ///
    /// Frames with zero duration (still images) report one frame per second.
    pub(crate) fn from_frames(
        format: &str,
        frames: &[Frame],
        audio: AudioInfo,
        loop_count: u16,
    ) -> ReframeResult<Self> {
        let frame_count = frames.len();
        let total_duration_micros: u64 = frames.iter().map(Frame::duration_micros).sum();
        let dims = match frames.first() {
            Some(first) => first.dimensions().ok_or_else(|| {
                ReframeError::validation("image frame list contains an audio frame")
            })?,
            None => Dimensions::new(0, 0),
        };

        let (frame_rate, frame_duration_micros) = if frame_count == 0 {
            (0.0, 0)
        } else if total_duration_micros == 0 {
            (1.0, 0)
        } else {
            let avg = total_duration_micros as f64 / frame_count as f64;
            (MICROS_PER_SEC as f64 / avg, avg.round() as u64)
        };

        Ok(Self {
            format: format.to_string(),
            frame_rate,
            frame_count,
            total_duration_micros,
            frame_duration_micros,
            audio_channels: audio.channels,
            audio_sample_rate: audio.sample_rate,
            audio_bitrate: audio.bitrate,
            width: dims.width,
            height: dims.height,
            loop_count,
        })
    }

    /// Dimensions of the first frame.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Audio properties.
    pub fn audio(&self) -> AudioInfo {
        AudioInfo {
            channels: self.audio_channels,
            sample_rate: self.audio_sample_rate,
            bitrate: self.audio_bitrate,
        }
    }

    /// `true` when the source has an audio track.
    pub fn has_audio(&self) -> bool {
        self.audio_channels > 0 && self.audio_sample_rate > 0
    }
}
