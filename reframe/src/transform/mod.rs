//! Per-frame transforms.
//!
//! A [`FrameTransform`] derives constant data once from the first frame ([`prepare`]) and then
//! maps every image frame independently ([`apply`]). Transforms also declare the output format,
//! playback speed and whether they touch audio, which the engine uses to plan a job.
//!
//! [`prepare`]: FrameTransform::prepare
//! [`apply`]: FrameTransform::apply

use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::frame::Frame;

/// Built-in pixel operations.
pub mod ops;

/// A pure per-frame image transform.
///
/// `apply` must not depend on anything but the frame and the prepared constant, so frames can be
/// re-run on a later attempt with identical results.
pub trait FrameTransform: Send + Sync {
    /// Data computed once per job from the first frame.
    type Constant: Send + Sync;

    /// Stable identifier used in job fingerprints. Equal keys must mean equal output.
    fn key(&self) -> String;

    /// Derive per-job constant data from the first image frame.
    fn prepare(&self, first: &Frame) -> ReframeResult<Self::Constant>;

    /// Map one image frame.
    fn apply(&self, frame: &Frame, constant: &Self::Constant) -> ReframeResult<Frame>;

    /// Output format for an input in `input` format.
    fn output_format(&self, input: &str) -> String {
        input.to_string()
    }

    /// Playback speed multiplier. Negative values play backwards.
    fn speed(&self) -> f64 {
        1.0
    }

    /// `true` when [`transform_audio`](Self::transform_audio) changes audio frames.
    fn mutates_audio(&self) -> bool {
        false
    }

    /// Map one audio frame. Only called when [`mutates_audio`](Self::mutates_audio) is `true`.
    fn transform_audio(&self, frame: &Frame) -> ReframeResult<Frame> {
        Ok(frame.clone())
    }

    /// `true` when pixels and timing are untouched, so a compatible source can be copied as is.
    fn is_passthrough(&self) -> bool {
        false
    }
}

/// Leaves every frame unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl FrameTransform for Identity {
    type Constant = ();

    fn key(&self) -> String {
        "identity".to_string()
    }

    fn prepare(&self, _first: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn apply(&self, frame: &Frame, _: &()) -> ReframeResult<Frame> {
        Ok(frame.clone())
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

/// Changes only the output format.
#[derive(Clone, Debug)]
pub struct Convert {
    format: String,
}

impl Convert {
    /// Convert into `format`.
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl FrameTransform for Convert {
    type Constant = ();

    fn key(&self) -> String {
        format!("convert:{}", self.format)
    }

    fn prepare(&self, _first: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn apply(&self, frame: &Frame, _: &()) -> ReframeResult<Frame> {
        Ok(frame.clone())
    }

    fn output_format(&self, _input: &str) -> String {
        self.format.clone()
    }

    fn is_passthrough(&self) -> bool {
        true
    }
}

/// Wraps a closure as a stateless transform.
pub struct FnTransform<F> {
    key: String,
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&Frame) -> ReframeResult<Frame> + Send + Sync,
{
    /// `key` identifies the closure in job fingerprints.
    pub fn new(key: impl Into<String>, f: F) -> Self {
        Self { key: key.into(), f }
    }
}

impl<F> FrameTransform for FnTransform<F>
where
    F: Fn(&Frame) -> ReframeResult<Frame> + Send + Sync,
{
    type Constant = ();

    fn key(&self) -> String {
        self.key.clone()
    }

    fn prepare(&self, _first: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn apply(&self, frame: &Frame, _: &()) -> ReframeResult<Frame> {
        (self.f)(frame)
    }
}

/// Changes playback speed. Negative speeds also reverse.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Speed(f64);

impl Speed {
    /// Speed multiplier; must be finite and non-zero.
    pub fn new(factor: f64) -> ReframeResult<Self> {
        if !factor.is_finite() || factor == 0.0 {
            return Err(ReframeError::validation(format!(
                "speed must be finite and non-zero, got {factor}"
            )));
        }
        Ok(Self(factor))
    }

    /// The multiplier.
    pub fn factor(self) -> f64 {
        self.0
    }
}

impl FrameTransform for Speed {
    type Constant = ();

    fn key(&self) -> String {
        format!("speed:{}", self.0)
    }

    fn prepare(&self, _first: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn apply(&self, frame: &Frame, _: &()) -> ReframeResult<Frame> {
        Ok(frame.clone())
    }

    fn speed(&self) -> f64 {
        self.0
    }

    fn mutates_audio(&self) -> bool {
        self.0.abs() != 1.0
    }

    /// Resample audio to the new playback rate. Direction is handled when the reader is
    /// reversed, so only the magnitude applies here.
    fn transform_audio(&self, frame: &Frame) -> ReframeResult<Frame> {
        Ok(time_scaled_audio(frame, self.0.abs()))
    }

    fn is_passthrough(&self) -> bool {
        self.0 == 1.0
    }
}

/// `frame` with its audio packet played `speed` times faster; image frames pass through.
pub(crate) fn time_scaled_audio(frame: &Frame, speed: f64) -> Frame {
    match frame.as_audio() {
        Some(packet) => frame.with_audio(packet.time_scaled(speed)),
        None => frame.clone(),
    }
}

/// Runs `A` then `B`.
#[derive(Clone, Debug)]
pub struct Then<A, B> {
    first: A,
    second: B,
}

impl<A, B> Then<A, B> {
    /// Chain two transforms.
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

/// Chaining sugar for every transform.
pub trait FrameTransformExt: FrameTransform + Sized {
    /// Apply `next` after `self`.
    fn then<B: FrameTransform>(self, next: B) -> Then<Self, B> {
        Then::new(self, next)
    }
}

impl<T: FrameTransform> FrameTransformExt for T {}

impl<A: FrameTransform, B: FrameTransform> FrameTransform for Then<A, B> {
    type Constant = (A::Constant, B::Constant);

    fn key(&self) -> String {
        format!("{}|{}", self.first.key(), self.second.key())
    }

    fn prepare(&self, first: &Frame) -> ReframeResult<Self::Constant> {
        let a = self.first.prepare(first)?;
        let mid = self.first.apply(first, &a)?;
        let b = self.second.prepare(&mid)?;
        Ok((a, b))
    }

    fn apply(&self, frame: &Frame, (a, b): &Self::Constant) -> ReframeResult<Frame> {
        let mid = self.first.apply(frame, a)?;
        self.second.apply(&mid, b)
    }

    fn output_format(&self, input: &str) -> String {
        self.second.output_format(&self.first.output_format(input))
    }

    fn speed(&self) -> f64 {
        self.first.speed() * self.second.speed()
    }

    fn mutates_audio(&self) -> bool {
        self.first.mutates_audio() || self.second.mutates_audio()
    }

    fn transform_audio(&self, frame: &Frame) -> ReframeResult<Frame> {
        let mid = if self.first.mutates_audio() {
            self.first.transform_audio(frame)?
        } else {
            frame.clone()
        };
        if self.second.mutates_audio() {
            self.second.transform_audio(&mid)
        } else {
            Ok(mid)
        }
    }

    fn is_passthrough(&self) -> bool {
        self.first.is_passthrough() && self.second.is_passthrough()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/transform/mod.rs"]
mod tests;
