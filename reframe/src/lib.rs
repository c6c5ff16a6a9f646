//! Reframe is a frame-based media transform pipeline.
//!
//! Media is decoded eagerly into timed frames, mapped through a [`FrameTransform`], optionally
//! quantized onto the target format's timing grid and re-encoded. A byte budget turns the
//! encode into a bounded retry loop that lowers quality and scale until the output fits.
//!
//! - Open a [`MediaReader`]
//! - Run it through [`TransformEngine::process`]
//! - Or schedule many jobs on a [`JobPool`], deduplicated by a [`ResultRegistry`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// JSON-loadable engine configuration.
pub mod config;
pub mod decode;
pub mod encode;
pub mod engine;
/// Frames, formats and metadata.
pub mod media;
pub mod pool;
pub mod resample;
pub mod transform;

pub use crate::foundation::core::{
    Dimensions, Fps, MICROS_PER_SEC, micros_from_secs_f64, micros_to_secs_f64,
    parse_duration_micros,
};
pub use crate::foundation::error::{ReframeError, ReframeResult};

pub use crate::config::{EngineConfig, WriterDefaults};
pub use crate::decode::reader::MediaReader;
pub use crate::decode::{DecodeLimits, MediaSource};
pub use crate::encode::writer::{AudioConfig, MediaWriter, WriterConfig, create_writer};
pub use crate::engine::{
    CancelToken, ProcessOptions, ProcessedOutput, RetryPolicy, TransformEngine,
};
pub use crate::media::format::{FormatInfo, MediaKind, detect_format};
pub use crate::media::frame::{AudioPacket, Frame, FramePayload, ImageBuffer};
pub use crate::media::metadata::{AudioInfo, MediaMetadata};
pub use crate::pool::{Fingerprint, JobHandle, JobPool, ResultRegistry, fingerprint};
pub use crate::resample::FrameResampler;
pub use crate::transform::{
    Convert, FnTransform, FrameTransform, FrameTransformExt, Identity, Speed, Then,
};
