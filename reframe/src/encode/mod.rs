//! Encoding writers.
//!
//! Writers consume frames in playback order and are created through
//! [`create_writer`](writer::create_writer), which picks the backend from the format registry.

/// `ffmpeg`-based video writer.
pub mod ffmpeg;
pub(crate) mod gif;
pub(crate) mod still;
/// Writer trait, configuration and factory.
pub mod writer;
