//! Size-constrained transform pipeline.
//!
//! [`TransformEngine::process`] turns one [`MediaReader`] plus one [`FrameTransform`] into one
//! output file. When a byte budget is set the encode is repeated at lower quality and smaller
//! scale until it fits or the attempt bound is reached.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context as _;

use crate::config::{EngineConfig, WriterDefaults};
use crate::decode::reader::MediaReader;
use crate::encode::writer::{
    AudioConfig, MediaWriter, WriterConfig, create_writer, ensure_parent_dir,
};
use crate::foundation::core::{Dimensions, Fps};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::foundation::scratch::{ScratchFile, scratch_path_in};
use crate::media::format::FormatInfo;
use crate::media::frame::Frame;
use crate::resample::FrameResampler;
use crate::transform::FrameTransform;
use crate::transform::ops::resize_frame;

/// Highest frame rate chosen for video outputs.
const MAX_OUTPUT_FPS: f64 = 60.0;
/// Frame rate for video outputs built from still images.
const STILL_VIDEO_FPS: u32 = 25;

/// How the engine backs off when an output is over budget.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total encode attempts, including the first.
    pub max_attempts: u32,
    /// Quality lowered by this much per retry.
    pub quality_step: u8,
    /// Quality never goes below this.
    pub min_quality: u8,
    /// Largest per-retry scale factor, so every retry shrinks by at least this much.
    pub max_scale_step: f64,
    /// Cumulative scale never goes below this.
    pub min_scale: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            quality_step: 15,
            min_quality: 10,
            max_scale_step: 0.9,
            min_scale: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Check ranges.
    pub fn validate(&self) -> ReframeResult<()> {
        if self.max_attempts == 0 {
            return Err(ReframeError::validation("retry.max_attempts must be >= 1"));
        }
        if !(1..=100).contains(&self.min_quality) {
            return Err(ReframeError::validation(
                "retry.min_quality must be in 1..=100",
            ));
        }
        if !(self.min_scale > 0.0 && self.min_scale <= 1.0) {
            return Err(ReframeError::validation("retry.min_scale must be in (0, 1]"));
        }
        if !(self.max_scale_step > 0.0 && self.max_scale_step <= 1.0) {
            return Err(ReframeError::validation(
                "retry.max_scale_step must be in (0, 1]",
            ));
        }
        if self.min_scale > self.max_scale_step {
            return Err(ReframeError::validation(format!(
                "retry.min_scale ({}) must not exceed retry.max_scale_step ({})",
                self.min_scale, self.max_scale_step
            )));
        }
        Ok(())
    }

    /// Scale multiplier for the next attempt after producing `size` bytes against `budget`.
    pub fn scale_factor(&self, size: u64, budget: u64) -> f64 {
        let ratio = (budget as f64 / size.max(1) as f64).sqrt();
        ratio.max(self.min_scale).min(self.max_scale_step)
    }

    /// Quality for the next attempt.
    pub fn next_quality(&self, quality: u8) -> u8 {
        quality
            .saturating_sub(self.quality_step)
            .max(self.min_quality)
    }
}

/// Cooperative cancellation flag, checked at every frame boundary.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// `true` once [`cancel`](Self::cancel) was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancelled.
    pub fn check(&self) -> ReframeResult<()> {
        if self.is_cancelled() {
            return Err(ReframeError::cancelled("job cancelled"));
        }
        Ok(())
    }
}

/// Per-job options.
#[derive(Clone, Debug)]
pub struct ProcessOptions {
    /// Directory receiving the output file.
    pub output_dir: PathBuf,
    /// Output file stem; the extension comes from the output format.
    pub output_name: String,
    /// Output size budget in bytes.
    pub max_output_bytes: Option<u64>,
    /// Keep only this much of the input.
    pub max_duration_micros: Option<u64>,
    /// Cancellation flag.
    pub cancel: CancelToken,
}

impl ProcessOptions {
    /// Write `<output_dir>/<output_name>.<ext>` with no budget.
    pub fn new(output_dir: impl Into<PathBuf>, output_name: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            output_name: output_name.into(),
            max_output_bytes: None,
            max_duration_micros: None,
            cancel: CancelToken::new(),
        }
    }

    /// Set the byte budget.
    pub fn with_max_output_bytes(mut self, bytes: u64) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set the duration cap.
    pub fn with_max_duration_micros(mut self, micros: u64) -> Self {
        self.max_duration_micros = Some(micros);
        self
    }

    /// Use `cancel` instead of a private token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Result of a finished job.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct ProcessedOutput {
    /// Final output path.
    pub path: PathBuf,
    /// Output format name.
    pub format: String,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Output width.
    pub width: u32,
    /// Output height.
    pub height: u32,
    /// Image frames handed to the writer.
    pub frame_count: usize,
    /// Encode attempts made (0 when the source was copied without re-encoding).
    pub attempts: u32,
    /// Quality of the kept attempt.
    pub quality: u8,
    /// Cumulative scale of the kept attempt.
    pub scale: f64,
}

/// Everything about a job that stays fixed across attempts.
struct Plan<'a> {
    format: &'static FormatInfo,
    speed: f64,
    quantum: Option<u64>,
    total_micros: u64,
    fps: Fps,
    audio: Option<AudioConfig>,
    base_dims: Dimensions,
    cancel: &'a CancelToken,
}

struct Attempt {
    size: u64,
    dims: Dimensions,
    frames: usize,
}

/// Runs transform jobs.
#[derive(Clone, Debug, Default)]
pub struct TransformEngine {
    retry: RetryPolicy,
    writer: WriterDefaults,
    default_max_output_bytes: Option<u64>,
}

impl TransformEngine {
    /// Engine with explicit policies.
    pub fn new(retry: RetryPolicy, writer: WriterDefaults) -> Self {
        Self {
            retry,
            writer,
            default_max_output_bytes: None,
        }
    }

    /// Engine configured from an [`EngineConfig`].
    pub fn from_config(config: &EngineConfig) -> ReframeResult<Self> {
        config.validate()?;
        Ok(Self {
            retry: config.retry.clone(),
            writer: config.writer.clone(),
            default_max_output_bytes: config.default_max_output_bytes,
        })
    }

    /// Retry policy in use.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Transform `reader` into a new file.
    ///
    /// On budget exhaustion the smallest attempt is left at the final path and returned inside
    /// [`ReframeError::SizeExceeded`].
    #[tracing::instrument(
        skip_all,
        fields(input = reader.format(), op = %transform.key(), name = %options.output_name)
    )]
    pub fn process<T: FrameTransform>(
        &self,
        reader: MediaReader,
        transform: &T,
        options: &ProcessOptions,
    ) -> ReframeResult<ProcessedOutput> {
        self.retry.validate()?;
        options.cancel.check()?;

        let in_info = FormatInfo::require(reader.format())?;
        let out_name = transform.output_format(in_info.name);
        let out_info = FormatInfo::require(&out_name)?;
        if !out_info.is_encodable() {
            return Err(ReframeError::unsupported(format!(
                "'{}' has no frame encoder",
                out_info.name
            )));
        }
        let final_path = options
            .output_dir
            .join(format!("{}.{}", options.output_name, out_info.name));
        let budget = options.max_output_bytes.or(self.default_max_output_bytes);

        if let Some(out) = self.try_passthrough(
            &reader,
            transform,
            in_info,
            out_info,
            &final_path,
            budget,
            options,
        )? {
            tracing::info!(
                path = %out.path.display(),
                size = out.size_bytes,
                "copied without re-encoding"
            );
            return Ok(out);
        }

        let mut reader = reader;
        if let Some(max) = options.max_duration_micros {
            reader = reader.truncated(max)?;
        }
        let speed = transform.speed();
        if !speed.is_finite() || speed == 0.0 {
            return Err(ReframeError::validation(format!(
                "transform speed must be finite and non-zero, got {speed}"
            )));
        }
        if speed < 0.0 {
            reader = reader.reversed()?;
        }

        let first = reader.first()?;
        let constant = transform.prepare(first)?;
        let base_dims = transform
            .apply(first, &constant)?
            .dimensions()
            .ok_or_else(|| ReframeError::validation("transform produced an audio frame"))?;
        let plan = self.plan(&reader, out_info, speed, base_dims, &options.cancel)?;

        ensure_parent_dir(&final_path)?;
        let scratch_dir = final_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut quality = self.writer.quality;
        let mut scale = 1.0f64;
        let mut best: Option<(ScratchFile, ProcessedOutput)> = None;
        let mut attempts = 0u32;
        let mut fits = false;

        while attempts < self.retry.max_attempts {
            attempts += 1;
            let tmp = scratch_path_in(&scratch_dir, "attempt", out_info.name);
            let guard = ScratchFile::new(tmp.clone());
            let got =
                self.encode_attempt(&reader, transform, &constant, &plan, quality, scale, &tmp)?;
            tracing::debug!(
                attempt = attempts,
                size = got.size,
                quality,
                scale,
                width = got.dims.width,
                height = got.dims.height,
                "encode attempt finished"
            );

            let output = ProcessedOutput {
                path: final_path.clone(),
                format: out_info.name.to_string(),
                size_bytes: got.size,
                width: got.dims.width,
                height: got.dims.height,
                frame_count: got.frames,
                attempts,
                quality,
                scale,
            };
            if best.as_ref().is_none_or(|(_, b)| got.size < b.size_bytes) {
                best = Some((guard, output));
            }

            fits = budget.is_none_or(|b| got.size <= b);
            if fits {
                break;
            }
            let Some(b) = budget else { break };
            let next_quality = self.retry.next_quality(quality);
            let next_scale =
                (scale * self.retry.scale_factor(got.size, b)).max(self.retry.min_scale);
            if next_quality == quality && next_scale == scale {
                tracing::debug!("quality and scale at their floors, stopping early");
                break;
            }
            quality = next_quality;
            scale = next_scale;
        }

        let Some((guard, mut output)) = best else {
            return Err(ReframeError::invalid_state("no encode attempt was made"));
        };
        output.attempts = attempts;
        if let Some(tmp) = guard.keep()
            && let Err(e) = std::fs::rename(&tmp, &final_path)
        {
            drop(ScratchFile::new(tmp));
            return Err(anyhow::Error::new(e)
                .context(format!("failed to move output to '{}'", final_path.display()))
                .into());
        }

        if !fits && let Some(max_bytes) = budget {
            tracing::warn!(
                size = output.size_bytes,
                max_bytes,
                attempts,
                "output still exceeds budget"
            );
            return Err(ReframeError::SizeExceeded {
                output: Box::new(output),
                max_bytes,
            });
        }
        tracing::info!(
            path = %output.path.display(),
            size = output.size_bytes,
            attempts,
            "job finished"
        );
        Ok(output)
    }

    #[allow(clippy::too_many_arguments)]
    fn try_passthrough<T: FrameTransform>(
        &self,
        reader: &MediaReader,
        transform: &T,
        in_info: &FormatInfo,
        out_info: &'static FormatInfo,
        final_path: &Path,
        budget: Option<u64>,
        options: &ProcessOptions,
    ) -> ReframeResult<Option<ProcessedOutput>> {
        if !transform.is_passthrough() || !in_info.rename_compatible(out_info) {
            return Ok(None);
        }
        let Some(src) = reader.source_path() else {
            return Ok(None);
        };
        let meta = reader.metadata();
        let audio_micros: u64 = reader.audio_frames().map(Frame::duration_micros).sum();
        if options
            .max_duration_micros
            .is_some_and(|m| m < meta.total_duration_micros.max(audio_micros))
        {
            return Ok(None);
        }
        let size = std::fs::metadata(src)
            .with_context(|| format!("failed to stat '{}'", src.display()))?
            .len();
        if budget.is_some_and(|b| size > b) {
            return Ok(None);
        }

        ensure_parent_dir(final_path)?;
        let same = match (src.canonicalize(), final_path.canonicalize()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        if !same {
            std::fs::copy(src, final_path).with_context(|| {
                format!("failed to copy '{}' to '{}'", src.display(), final_path.display())
            })?;
        }
        Ok(Some(ProcessedOutput {
            path: final_path.to_path_buf(),
            format: out_info.name.to_string(),
            size_bytes: size,
            width: meta.width,
            height: meta.height,
            frame_count: meta.frame_count,
            attempts: 0,
            quality: self.writer.quality,
            scale: 1.0,
        }))
    }

    fn plan<'a>(
        &self,
        reader: &MediaReader,
        format: &'static FormatInfo,
        speed: f64,
        base_dims: Dimensions,
        cancel: &'a CancelToken,
    ) -> ReframeResult<Plan<'a>> {
        let speed = speed.abs();
        let total_micros = reader
            .frames()
            .map(|f| scaled_duration(f.duration_micros(), speed))
            .sum();
        let meta = reader.metadata();

        let fps = if total_micros > 0 && meta.frame_rate > 0.0 {
            Fps::from_f64((meta.frame_rate * speed).clamp(1.0, MAX_OUTPUT_FPS))?
        } else {
            Fps::new(STILL_VIDEO_FPS, 1)?
        };
        let quantum = if format.is_static() {
            None
        } else if let Some(q) = format.quantum_micros {
            Some(q)
        } else if format.needs_ffmpeg() {
            Some(fps.frame_duration_micros())
        } else {
            None
        };

        let audio = (format.supports_audio() && meta.has_audio()).then(|| AudioConfig {
            channels: meta.audio_channels,
            sample_rate: meta.audio_sample_rate,
            bitrate: (meta.audio_bitrate > 0).then_some(meta.audio_bitrate),
        });

        Ok(Plan {
            format,
            speed,
            quantum,
            total_micros,
            fps,
            audio,
            base_dims,
            cancel,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn encode_attempt<T: FrameTransform>(
        &self,
        reader: &MediaReader,
        transform: &T,
        constant: &T::Constant,
        plan: &Plan<'_>,
        quality: u8,
        scale: f64,
        path: &Path,
    ) -> ReframeResult<Attempt> {
        let config = WriterConfig {
            fps: plan.fps,
            quality,
            video_bitrate: self
                .writer
                .video_bitrate
                .map(|b| (f64::from(b) * scale * scale).round().max(1.0) as u32),
            audio: plan.audio,
            loop_count: reader.metadata().loop_count,
            bg_rgba: self.writer.bg_rgba,
            overwrite: true,
        };
        let mut writer = create_writer(path, plan.format.name, config)?;
        let target = (scale < 1.0).then(|| plan.base_dims.scaled(scale));

        let step = |frame: &Frame| -> ReframeResult<Frame> {
            plan.cancel.check()?;
            let mut out = transform.apply(frame, constant)?;
            if let Some(dims) = target {
                out = resize_frame(&out, dims)?;
            }
            let d = scaled_duration(frame.duration_micros(), plan.speed);
            if d != out.duration_micros() {
                out = out.with_duration(d);
            }
            Ok(out)
        };

        let mut failure: Option<ReframeError> = None;
        {
            let take = if writer.is_static() { 1 } else { usize::MAX };
            let mapped = reader.frames().take(take).map_while(|f| match step(f) {
                Ok(f) => Some(f),
                Err(e) => {
                    failure = Some(e);
                    None
                }
            });
            let frames: Box<dyn Iterator<Item = Frame> + '_> = match plan.quantum {
                Some(q) if !writer.is_static() => {
                    Box::new(FrameResampler::new(q)?.resample_iter(mapped, plan.total_micros))
                }
                _ => Box::new(mapped),
            };
            for frame in frames {
                plan.cancel.check()?;
                writer.write_image_frame(&frame)?;
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        if writer.supports_audio() {
            write_audio(writer.as_mut(), reader, transform, plan)?;
        }
        writer.close()?;

        let size = std::fs::metadata(path)
            .with_context(|| format!("writer produced no file at '{}'", path.display()))?
            .len();
        Ok(Attempt {
            size,
            dims: target.unwrap_or(plan.base_dims),
            frames: writer.frames_written(),
        })
    }
}

fn write_audio<T: FrameTransform>(
    writer: &mut dyn MediaWriter,
    reader: &MediaReader,
    transform: &T,
    plan: &Plan<'_>,
) -> ReframeResult<()> {
    for frame in reader.audio_frames() {
        plan.cancel.check()?;
        if transform.mutates_audio() {
            writer.write_audio_frame(&transform.transform_audio(frame)?)?;
        } else {
            writer.write_audio_frame(frame)?;
        }
    }
    Ok(())
}

fn scaled_duration(micros: u64, speed: f64) -> u64 {
    if speed == 1.0 {
        micros
    } else {
        (micros as f64 / speed).round() as u64
    }
}

#[cfg(test)]
#[path = "../tests/unit/engine/engine.rs"]
mod tests;
