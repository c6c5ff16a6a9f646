use std::str::FromStr;

use image::imageops::{self, FilterType};

use crate::foundation::core::Dimensions;
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::frame::Frame;
use crate::transform::FrameTransform;

fn image_of(frame: &Frame) -> ReframeResult<&image::RgbaImage> {
    frame
        .as_image()
        .map(|img| &**img)
        .ok_or_else(|| ReframeError::validation("image transform got an audio frame"))
}

/// Resize an image frame to exactly `dims`. Frames already at `dims` are returned unchanged.
pub fn resize_frame(frame: &Frame, dims: Dimensions) -> ReframeResult<Frame> {
    let img = image_of(frame)?;
    if img.dimensions() == (dims.width, dims.height) {
        return Ok(frame.clone());
    }
    let out = imageops::resize(img, dims.width, dims.height, FilterType::Triangle);
    Ok(frame.with_image(out))
}

/// Mirror left-right.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlipHorizontal;

impl FrameTransform for FlipHorizontal {
    type Constant = ();

    fn key(&self) -> String {
        "flip-h".to_string()
    }

    fn prepare(&self, _first: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn apply(&self, frame: &Frame, _: &()) -> ReframeResult<Frame> {
        Ok(frame.with_image(imageops::flip_horizontal(image_of(frame)?)))
    }
}

/// Mirror top-bottom.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlipVertical;

impl FrameTransform for FlipVertical {
    type Constant = ();

    fn key(&self) -> String {
        "flip-v".to_string()
    }

    fn prepare(&self, _first: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn apply(&self, frame: &Frame, _: &()) -> ReframeResult<Frame> {
        Ok(frame.with_image(imageops::flip_vertical(image_of(frame)?)))
    }
}

/// Shrink to fit inside a box, keeping aspect ratio. Never enlarges.
///
/// The target size is computed once from the first frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeToFit {
    max: Dimensions,
}

impl ResizeToFit {
    /// Fit inside `max_width` x `max_height` (both non-zero).
    pub fn new(max_width: u32, max_height: u32) -> ReframeResult<Self> {
        if max_width == 0 || max_height == 0 {
            return Err(ReframeError::validation("resize box must be non-zero"));
        }
        Ok(Self {
            max: Dimensions::new(max_width, max_height),
        })
    }
}

impl FrameTransform for ResizeToFit {
    type Constant = Dimensions;

    fn key(&self) -> String {
        format!("fit:{}x{}", self.max.width, self.max.height)
    }

    fn prepare(&self, first: &Frame) -> ReframeResult<Dimensions> {
        let img = image_of(first)?;
        let (w, h) = img.dimensions();
        let scale = (f64::from(self.max.width) / f64::from(w))
            .min(f64::from(self.max.height) / f64::from(h))
            .min(1.0);
        Ok(Dimensions::new(w, h).scaled(scale))
    }

    fn apply(&self, frame: &Frame, target: &Dimensions) -> ReframeResult<Frame> {
        resize_frame(frame, *target)
    }
}

/// One named operation, as accepted on the command line.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// No change.
    Identity,
    /// [`FlipHorizontal`].
    FlipH,
    /// [`FlipVertical`].
    FlipV,
    /// Speed multiplier (negative reverses).
    Speed(f64),
    /// Play backwards at the same speed.
    Reverse,
    /// Convert to GIF.
    Gif,
    /// [`ResizeToFit`].
    Fit(u32, u32),
}

impl FromStr for Op {
    type Err = ReframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let op = match s {
            "identity" => Op::Identity,
            "flip-h" => Op::FlipH,
            "flip-v" => Op::FlipV,
            "reverse" => Op::Reverse,
            "gif" => Op::Gif,
            _ => {
                if let Some(v) = s.strip_prefix("speed=") {
                    let f: f64 = v
                        .parse()
                        .map_err(|_| ReframeError::validation(format!("invalid speed '{v}'")))?;
                    crate::transform::Speed::new(f)?;
                    Op::Speed(f)
                } else if let Some(v) = s.strip_prefix("fit=") {
                    let (w, h) = v
                        .split_once('x')
                        .and_then(|(w, h)| Some((w.parse().ok()?, h.parse().ok()?)))
                        .ok_or_else(|| {
                            ReframeError::validation(format!("invalid box '{v}', expected WxH"))
                        })?;
                    ResizeToFit::new(w, h)?;
                    Op::Fit(w, h)
                } else {
                    return Err(ReframeError::validation(format!("unknown op '{s}'")));
                }
            }
        };
        Ok(op)
    }
}

impl FrameTransform for Op {
    type Constant = Option<Dimensions>;

    fn key(&self) -> String {
        match self {
            Op::Identity => "identity".to_string(),
            Op::FlipH => FlipHorizontal.key(),
            Op::FlipV => FlipVertical.key(),
            Op::Speed(f) => format!("speed:{f}"),
            Op::Reverse => "reverse".to_string(),
            Op::Gif => "convert:gif".to_string(),
            Op::Fit(w, h) => format!("fit:{w}x{h}"),
        }
    }

    fn prepare(&self, first: &Frame) -> ReframeResult<Self::Constant> {
        match self {
            Op::Fit(w, h) => Ok(Some(ResizeToFit::new(*w, *h)?.prepare(first)?)),
            _ => Ok(None),
        }
    }

    fn apply(&self, frame: &Frame, constant: &Self::Constant) -> ReframeResult<Frame> {
        match (self, constant) {
            (Op::FlipH, _) => FlipHorizontal.apply(frame, &()),
            (Op::FlipV, _) => FlipVertical.apply(frame, &()),
            (Op::Fit(..), Some(target)) => resize_frame(frame, *target),
            _ => Ok(frame.clone()),
        }
    }

    fn output_format(&self, input: &str) -> String {
        match self {
            Op::Gif => "gif".to_string(),
            _ => input.to_string(),
        }
    }

    fn speed(&self) -> f64 {
        match self {
            Op::Speed(f) => *f,
            Op::Reverse => -1.0,
            _ => 1.0,
        }
    }

    fn mutates_audio(&self) -> bool {
        matches!(self, Op::Speed(f) if f.abs() != 1.0)
    }

    fn transform_audio(&self, frame: &Frame) -> ReframeResult<Frame> {
        match self {
            Op::Speed(f) => Ok(crate::transform::time_scaled_audio(frame, f.abs())),
            _ => Ok(frame.clone()),
        }
    }

    fn is_passthrough(&self) -> bool {
        matches!(self, Op::Identity | Op::Gif) || matches!(self, Op::Speed(f) if *f == 1.0)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/ops.rs"]
mod tests;
