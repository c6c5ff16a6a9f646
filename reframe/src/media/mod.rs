/// Timed frame values.
pub mod frame;
/// Format registry and detection.
pub mod format;
/// Reader metadata.
pub mod metadata;
