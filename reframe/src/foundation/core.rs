use crate::foundation::error::{ReframeError, ReframeResult};

/// Microseconds per second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Convert seconds to whole microseconds, rounding to nearest and clamping negatives to zero.
pub fn micros_from_secs_f64(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * MICROS_PER_SEC as f64).round() as u64
}

/// Convert microseconds to floating-point seconds.
pub fn micros_to_secs_f64(micros: u64) -> f64 {
    micros as f64 / MICROS_PER_SEC as f64
}

/// Parse a human duration (`"30"`, `"1.5s"`, `"250ms"`, `"40us"`) into microseconds.
pub fn parse_duration_micros(s: &str) -> ReframeResult<u64> {
    let s = s.trim();
    let (num, scale) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1_000.0)
    } else if let Some(v) = s.strip_suffix("us") {
        (v, 1.0)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, MICROS_PER_SEC as f64)
    } else {
        (s, MICROS_PER_SEC as f64)
    };
    let v = num
        .trim()
        .parse::<f64>()
        .map_err(|e| ReframeError::validation(format!("invalid duration '{s}': {e}")))?;
    if !v.is_finite() || v < 0.0 {
        return Err(ReframeError::validation(format!(
            "duration must be a non-negative number, got '{s}'"
        )));
    }
    Ok((v * scale).round() as u64)
}

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReframeResult<Self> {
        if den == 0 {
            return Err(ReframeError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReframeError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Approximate a floating-point rate with a millisecond-precision rational.
    pub fn from_f64(fps: f64) -> ReframeResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(ReframeError::validation(format!(
                "fps must be positive, got {fps}"
            )));
        }
        let num = (fps * 1000.0).round();
        if num < 1.0 || num > f64::from(u32::MAX) {
            return Err(ReframeError::validation(format!("fps out of range: {fps}")));
        }
        let (num, den) = reduce(num as u32, 1000);
        Self::new(num, den)
    }

    /// Rate whose frames last exactly `micros`.
    pub fn from_frame_duration_micros(micros: u64) -> ReframeResult<Self> {
        if micros == 0 {
            return Err(ReframeError::validation("frame duration must be > 0"));
        }
        let den = u32::try_from(micros)
            .map_err(|_| ReframeError::validation("frame duration too long"))?;
        let (num, den) = reduce(1_000_000, den);
        Self::new(num, den)
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame, rounded to whole microseconds.
    pub fn frame_duration_micros(self) -> u64 {
        (u64::from(self.den) * MICROS_PER_SEC + u64::from(self.num) / 2) / u64::from(self.num)
    }
}

fn reduce(num: u32, den: u32) -> (u32, u32) {
    fn gcd(mut a: u32, mut b: u32) -> u32 {
        while b != 0 {
            (a, b) = (b, a % b);
        }
        a
    }
    let g = gcd(num, den).max(1);
    (num / g, den / g)
}

/// Pixel dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Multiply both axes by `scale`, never going below one pixel.
    pub fn scaled(self, scale: f64) -> Self {
        let s = |v: u32| ((f64::from(v) * scale).round() as u32).max(1);
        Self {
            width: s(self.width),
            height: s(self.height),
        }
    }

    /// Number of bytes of one packed RGBA8 image with these dimensions.
    pub fn rgba_len(self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
