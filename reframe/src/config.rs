//! JSON-loadable engine configuration.

use std::io::Read;
use std::path::Path;

use anyhow::Context as _;

use crate::decode::DecodeLimits;
use crate::engine::RetryPolicy;
use crate::foundation::error::{ReframeError, ReframeResult};

/// Encoding defaults applied to every job.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WriterDefaults {
    /// Starting quality in `1..=100`.
    pub quality: u8,
    /// Target video bitrate in bits per second.
    pub video_bitrate: Option<u32>,
    /// Background used to flatten alpha for opaque outputs (RGBA8).
    pub bg_rgba: [u8; 4],
}

impl Default for WriterDefaults {
    fn default() -> Self {
        Self {
            quality: 85,
            video_bitrate: None,
            bg_rgba: [0, 0, 0, 255],
        }
    }
}

/// Top-level configuration.
///
/// Every field has a default, so `{}` is a valid config file.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Worker threads for the job pool (`None` = one per core).
    pub threads: Option<usize>,
    /// Size-budget retry policy.
    pub retry: RetryPolicy,
    /// Encoding defaults.
    pub writer: WriterDefaults,
    /// Decode memory bounds.
    pub limits: DecodeLimits,
    /// Budget applied when a job does not set one.
    pub default_max_output_bytes: Option<u64>,
}

impl EngineConfig {
    /// Read and validate a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> ReframeResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open config '{}'", path.display()))?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Parse and validate JSON from `reader`.
    pub fn from_reader(reader: impl Read) -> ReframeResult<Self> {
        let cfg: Self = serde_json::from_reader(reader)
            .map_err(|e| ReframeError::validation(format!("invalid config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> ReframeResult<()> {
        if self.threads == Some(0) {
            return Err(ReframeError::validation("threads must be >= 1"));
        }
        if !(1..=100).contains(&self.writer.quality) {
            return Err(ReframeError::validation(format!(
                "writer.quality must be in 1..=100, got {}",
                self.writer.quality
            )));
        }
        if self.limits.max_decoded_bytes == 0 {
            return Err(ReframeError::validation(
                "limits.max_decoded_bytes must be > 0",
            ));
        }
        if self.default_max_output_bytes == Some(0) {
            return Err(ReframeError::validation(
                "default_max_output_bytes must be > 0",
            ));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
#[path = "../tests/unit/config/config.rs"]
mod tests;
