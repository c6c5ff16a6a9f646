use std::io::Cursor;

use image::AnimationDecoder as _;
use image::codecs::gif::GifDecoder;
use image::metadata::LoopCount;

use crate::decode::{DecodeLimits, DecodedMedia};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::frame::Frame;

/// Delay assumed for GIF frames that declare none.
pub(crate) const GIF_DEFAULT_DELAY_MICROS: u64 = 100_000;

/// Decode a single-frame image. The frame has zero duration.
pub(crate) fn decode_still(
    bytes: &[u8],
    format: image::ImageFormat,
    limits: &DecodeLimits,
) -> ReframeResult<DecodedMedia> {
    let img = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ReframeError::decode(format!("{format:?} decode failed: {e}")))?
        .to_rgba8();
    limits.check(img.as_raw().len() as u64)?;
    Ok(DecodedMedia {
        frames: vec![Frame::image(img, 0)],
        ..DecodedMedia::default()
    })
}

/// Decode every frame of a GIF, composited to full-canvas RGBA.
pub(crate) fn decode_gif(bytes: &[u8], limits: &DecodeLimits) -> ReframeResult<DecodedMedia> {
    let decoder = GifDecoder::new(Cursor::new(bytes))
        .map_err(|e| ReframeError::decode(format!("gif header decode failed: {e}")))?;
    // 0 means forever, matching the writer's convention.
    let loop_count = match decoder.loop_count() {
        LoopCount::Infinite => 0,
        LoopCount::Finite(n) => u16::try_from(n.get()).unwrap_or(u16::MAX),
    };

    let mut frames = Vec::new();
    let mut used = 0u64;
    for frame in decoder.into_frames() {
        let frame = frame.map_err(|e| {
            ReframeError::decode(format!("gif frame {} decode failed: {e}", frames.len()))
        })?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let mut micros = if denom == 0 {
            0
        } else {
            u64::from(numer) * 1_000 / u64::from(denom)
        };
        if micros == 0 {
            micros = GIF_DEFAULT_DELAY_MICROS;
        }
        let buffer = frame.into_buffer();
        used += buffer.as_raw().len() as u64;
        limits.check(used)?;
        frames.push(Frame::image(buffer, micros));
    }

    if frames.is_empty() {
        return Err(ReframeError::decode("gif contains no frames"));
    }
    Ok(DecodedMedia {
        frames,
        loop_count,
        ..DecodedMedia::default()
    })
}
