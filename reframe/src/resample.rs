//! Frame-duration quantization.
//!
//! Formats such as GIF only store delays in whole multiples of a quantum, and fixed-rate video
//! needs one frame per frame period. [`FrameResampler`] maps a variable-duration sequence onto
//! that grid by duplicating frames, carrying the sub-quantum remainder forward so the total
//! drifts by less than one quantum.

use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::frame::Frame;

/// Rewrites frames so every output frame lasts exactly one quantum.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameResampler {
    quantum_micros: u64,
}

impl FrameResampler {
    /// Resampler for quantum `quantum_micros` (must be non-zero).
    pub fn new(quantum_micros: u64) -> ReframeResult<Self> {
        if quantum_micros == 0 {
            return Err(ReframeError::validation("resample quantum must be > 0"));
        }
        Ok(Self { quantum_micros })
    }

    /// Quantum in microseconds.
    pub fn quantum_micros(self) -> u64 {
        self.quantum_micros
    }

    /// Resample a whole sequence.
    pub fn resample(self, frames: &[Frame]) -> Vec<Frame> {
        let total = frames.iter().map(Frame::duration_micros).sum();
        self.resample_iter(frames.iter().cloned(), total).collect()
    }

    /// Lazily resample `frames`, whose durations must sum to `total_micros`.
    ///
    /// `total_micros` is needed up front to decide whether the input collapses to a single frame.
    pub fn resample_iter<I>(self, frames: I, total_micros: u64) -> Resampled<I::IntoIter>
    where
        I: IntoIterator<Item = Frame>,
    {
        Resampled {
            inner: frames.into_iter(),
            q: self.quantum_micros,
            collapse: total_micros < self.quantum_micros,
            carry: 0,
            current: None,
            pending: 0,
            finished: false,
        }
    }
}

/// Iterator returned by [`FrameResampler::resample_iter`].
#[derive(Debug)]
pub struct Resampled<I> {
    inner: I,
    q: u64,
    collapse: bool,
    carry: u64,
    current: Option<Frame>,
    pending: u64,
    finished: bool,
}

impl<I> Resampled<I> {
    /// Sub-quantum remainder not yet emitted. Always `< quantum`.
    pub fn carry_micros(&self) -> u64 {
        self.carry
    }
}

impl<I: Iterator<Item = Frame>> Iterator for Resampled<I> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        loop {
            if self.pending > 0 {
                self.pending -= 1;
                return self.current.as_ref().map(|f| f.with_duration(self.q));
            }
            if self.finished {
                return None;
            }

            let Some(frame) = self.inner.next() else {
                self.finished = true;
                if !self.collapse && self.carry * 2 >= self.q && self.current.is_some() {
                    self.carry = 0;
                    self.pending = 1;
                    continue;
                }
                return None;
            };

            if self.collapse {
                self.finished = true;
                self.pending = 1;
                self.current = Some(frame);
                continue;
            }

            let d = frame.duration_micros();
            self.pending = d / self.q;
            self.carry += d % self.q;
            if self.carry >= self.q {
                self.carry -= self.q;
                self.pending += 1;
            }
            self.current = Some(frame);
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/resample/resample.rs"]
mod tests;
