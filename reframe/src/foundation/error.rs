use crate::engine::ProcessedOutput;

/// Convenience result type used across reframe.
pub type ReframeResult<T> = Result<T, ReframeError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum ReframeError {
    /// Input or output format that no engine can decode or encode.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Failure reported by a decode engine.
    #[error("decode error: {0}")]
    Decode(String),

    /// Failure reported by an encode engine.
    #[error("encode error: {0}")]
    Encode(String),

    /// API misuse, such as writing audio before the encoder exists.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A best-effort output was produced but it is larger than the budget.
    ///
    /// The output file is left on disk; callers decide whether to keep it.
    #[error(
        "size exceeded: {} bytes after {} attempts (budget {max_bytes} bytes)",
        output.size_bytes,
        output.attempts
    )]
    SizeExceeded {
        /// Smallest output achieved.
        output: Box<ProcessedOutput>,
        /// Budget that was requested.
        max_bytes: u64,
    },

    /// Frame lookup on a reader without frames.
    #[error("no such frame: {0}")]
    NoSuchFrame(String),

    /// Invalid caller-provided parameters or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// The job was cancelled at a frame boundary.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReframeError {
    /// Build a [`ReframeError::UnsupportedFormat`] value.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    /// Build a [`ReframeError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`ReframeError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`ReframeError::InvalidState`] value.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Build a [`ReframeError::NoSuchFrame`] value.
    pub fn no_such_frame(msg: impl Into<String>) -> Self {
        Self::NoSuchFrame(msg.into())
    }

    /// Build a [`ReframeError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReframeError::Cancelled`] value.
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Best-effort output attached to a [`ReframeError::SizeExceeded`] error.
    pub fn best_effort_output(&self) -> Option<&ProcessedOutput> {
        match self {
            Self::SizeExceeded { output, .. } => Some(output),
            _ => None,
        }
    }
}

impl From<image::ImageError> for ReframeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Self::UnsupportedFormat(e.to_string()),
            image::ImageError::Decoding(e) => Self::Decode(e.to_string()),
            image::ImageError::Encoding(e) => Self::Encode(e.to_string()),
            other => Self::Other(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
