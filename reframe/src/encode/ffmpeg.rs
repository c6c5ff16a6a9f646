use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use anyhow::Context as _;

use crate::decode::ffmpeg::{StderrDrain, is_ffmpeg_on_path, join_stderr_drain, spawn_stderr_drain};
use crate::encode::writer::{MediaWriter, WriterConfig, WriterState, ensure_parent_dir};
use crate::foundation::core::Dimensions;
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::foundation::math::flatten_over_bg_rgba8;
use crate::foundation::scratch::{ScratchFile, scratch_path_in};
use crate::media::format::{FfmpegCodecs, FormatInfo};
use crate::media::frame::Frame;

/// Lowest CRF used at quality 100.
const BEST_CRF: u32 = 18;

/// Video writer backed by the system `ffmpeg`.
///
/// `ffmpeg` is spawned on the first image frame and fed raw RGBA over stdin, producing a
/// video-only intermediate file next to the output. Audio packets are spooled as `f32le` to a
/// second temp file. On close the intermediate is either renamed into place or, when audio was
/// recorded, muxed with the spooled audio in a second `ffmpeg` run that copies the video stream.
pub struct FfmpegWriter {
    path: PathBuf,
    format: &'static FormatInfo,
    codecs: FfmpegCodecs,
    config: WriterConfig,
    state: WriterState,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<StderrDrain>,
    scratch: Vec<u8>,

    video_tmp: Option<ScratchFile>,
    audio_tmp: Option<ScratchFile>,
    audio_out: Option<BufWriter<std::fs::File>>,
    audio_samples: u64,
}

impl FfmpegWriter {
    pub(crate) fn new(
        path: PathBuf,
        format: &'static FormatInfo,
        codecs: FfmpegCodecs,
        config: WriterConfig,
    ) -> ReframeResult<Self> {
        if !cfg!(feature = "media-ffmpeg") {
            return Err(ReframeError::unsupported(format!(
                "'{}' output requires the 'media-ffmpeg' feature",
                format.name
            )));
        }
        Ok(Self {
            path,
            format,
            codecs,
            config,
            state: WriterState::default(),
            child: None,
            stdin: None,
            stderr_drain: None,
            scratch: Vec::new(),
            video_tmp: None,
            audio_tmp: None,
            audio_out: None,
            audio_samples: 0,
        })
    }

    /// CRF for the configured quality, from [`BEST_CRF`] at 100 up to the codec maximum at 1.
    pub(crate) fn crf(&self) -> u32 {
        crf_for_quality(self.config.quality, self.codecs.max_crf)
    }

    fn scratch_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn start(&mut self, dims: Dimensions) -> ReframeResult<()> {
        ensure_parent_dir(&self.path)?;
        if !is_ffmpeg_on_path() {
            return Err(ReframeError::encode(
                "ffmpeg is required for video encoding, but was not found on PATH",
            ));
        }

        let tmp = scratch_path_in(&self.scratch_dir(), "video", self.format.name);
        let video_tmp = ScratchFile::new(tmp.clone());

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", dims.width, dims.height),
            "-r",
            &format!("{}/{}", self.config.fps.num, self.config.fps.den),
            "-i",
            "pipe:0",
            "-an",
            // yuv420p needs even dimensions.
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
            "-c:v",
            self.codecs.video_codec,
            "-pix_fmt",
            "yuv420p",
            "-crf",
            &self.crf().to_string(),
        ]);
        match self.config.video_bitrate {
            Some(b) => {
                cmd.args(["-b:v", &b.to_string()]);
            }
            // libvpx only honours CRF in constant-quality mode.
            None if self.codecs.video_codec.starts_with("libvpx") => {
                cmd.args(["-b:v", "0"]);
            }
            None => {}
        }
        if matches!(self.codecs.muxer, "mp4" | "mov") {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.args(["-f", self.codecs.muxer]).arg(&tmp);

        tracing::debug!(
            width = dims.width,
            height = dims.height,
            codec = self.codecs.video_codec,
            crf = self.crf(),
            "spawning ffmpeg encoder"
        );
        let mut child = cmd.spawn().map_err(|e| {
            ReframeError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReframeError::encode("failed to open ffmpeg stdin (unexpected)"))?;
        let drain = spawn_stderr_drain(&mut child)?;

        self.scratch = vec![0u8; dims.rgba_len()];
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(drain);
        self.video_tmp = Some(video_tmp);
        Ok(())
    }

    fn finish_video(&mut self) -> ReframeResult<()> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| ReframeError::encode(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr = match self.stderr_drain.take() {
            Some(h) => join_stderr_drain(h)?,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(ReframeError::encode(format!(
                "ffmpeg exited with status {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }

    fn mux_audio(&mut self, video: &Path, audio: &Path) -> ReframeResult<()> {
        let Some(cfg) = self.config.audio else {
            return Err(ReframeError::invalid_state("audio spooled without an audio config"));
        };
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args(["-y", "-loglevel", "error", "-i"])
            .arg(video)
            .args([
                "-f",
                "f32le",
                "-ar",
                &cfg.sample_rate.to_string(),
                "-ac",
                &cfg.channels.to_string(),
                "-i",
            ])
            .arg(audio)
            .args([
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
                "-c:v",
                "copy",
                "-c:a",
                self.codecs.audio_codec,
            ]);
        if let Some(b) = cfg.bitrate {
            cmd.args(["-b:a", &b.to_string()]);
        }
        if matches!(self.codecs.muxer, "mp4" | "mov") {
            cmd.args(["-movflags", "+faststart"]);
        }
        cmd.args(["-shortest", "-f", self.codecs.muxer]).arg(&self.path);

        tracing::debug!(codec = self.codecs.audio_codec, "spawning ffmpeg mux");
        let mut child = cmd.spawn().map_err(|e| {
            ReframeError::encode(format!("failed to spawn ffmpeg for audio mux: {e}"))
        })?;
        let drain = spawn_stderr_drain(&mut child)?;
        let status = child
            .wait()
            .map_err(|e| ReframeError::encode(format!("failed to wait for ffmpeg mux: {e}")))?;
        let stderr = join_stderr_drain(drain)?;
        if !status.success() {
            return Err(ReframeError::encode(format!(
                "ffmpeg audio mux failed with status {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        Ok(())
    }

    fn finish(&mut self) -> ReframeResult<()> {
        self.finish_video()?;
        let Some(mut video_tmp) = self.video_tmp.take() else {
            return Ok(());
        };

        if let Some(mut out) = self.audio_out.take() {
            out.flush().context("failed to flush audio spool")?;
        }
        let audio_tmp = self.audio_tmp.take();

        match audio_tmp {
            Some(audio) if self.audio_samples > 0 => {
                let (Some(v), Some(a)) = (video_tmp.path(), audio.path()) else {
                    return Err(ReframeError::invalid_state("scratch file already released"));
                };
                let (v, a) = (v.to_path_buf(), a.to_path_buf());
                self.mux_audio(&v, &a)?;
                video_tmp.remove();
            }
            _ => {
                let Some(v) = video_tmp.keep() else {
                    return Err(ReframeError::invalid_state("scratch file already released"));
                };
                if let Err(e) = std::fs::rename(&v, &self.path) {
                    let _guard = ScratchFile::new(v.clone());
                    return Err(anyhow::Error::new(e)
                        .context(format!(
                            "failed to move '{}' to '{}'",
                            v.display(),
                            self.path.display()
                        ))
                        .into());
                }
            }
        }
        Ok(())
    }

    fn kill(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if let Some(h) = self.stderr_drain.take() {
            let _ = join_stderr_drain(h);
        }
    }
}

impl MediaWriter for FfmpegWriter {
    fn write_image_frame(&mut self, frame: &Frame) -> ReframeResult<()> {
        let (img, first) = self.state.check_image(frame)?;
        if first {
            let dims = Dimensions::new(img.width(), img.height());
            if let Err(e) = self.start(dims) {
                self.kill();
                return Err(e);
            }
        }
        self.state.commit_image(img);
        flatten_over_bg_rgba8(&mut self.scratch, img.as_raw(), self.config.bg_rgba)?;
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReframeError::invalid_state("ffmpeg encoder is not running"));
        };
        stdin.write_all(&self.scratch).map_err(|e| {
            ReframeError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        Ok(())
    }

    fn write_audio_frame(&mut self, frame: &Frame) -> ReframeResult<()> {
        let packet = self.state.accept_audio(frame, self.config.audio.as_ref())?;
        if self.config.audio.is_none() {
            tracing::trace!("dropping audio frame: writer has no audio stream");
            return Ok(());
        }
        if self.audio_out.is_none() {
            let path = scratch_path_in(&self.scratch_dir(), "audio", "f32");
            let guard = ScratchFile::new(path.clone());
            let file = std::fs::File::create(&path)
                .with_context(|| format!("failed to create audio spool '{}'", path.display()))?;
            self.audio_out = Some(BufWriter::new(file));
            self.audio_tmp = Some(guard);
        }
        if let Some(out) = self.audio_out.as_mut() {
            for s in packet.samples() {
                out.write_all(&s.to_le_bytes())
                    .context("failed to write audio spool")?;
            }
        }
        self.audio_samples += packet.samples().len() as u64;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    fn close(&mut self) -> ReframeResult<()> {
        if !self.state.begin_close() {
            return Ok(());
        }
        let res = self.finish();
        if res.is_err() {
            self.kill();
        }
        res
    }

    fn is_static(&self) -> bool {
        false
    }

    fn supports_audio(&self) -> bool {
        self.config.audio.is_some() && self.format.supports_audio()
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn frames_written(&self) -> usize {
        self.state.frames()
    }
}

impl Drop for FfmpegWriter {
    fn drop(&mut self) {
        if self.child.is_some() {
            tracing::warn!(path = %self.path.display(), "ffmpeg writer dropped without close");
        }
        self.kill();
    }
}

pub(crate) fn crf_for_quality(quality: u8, max_crf: u8) -> u32 {
    let q = u32::from(quality.clamp(1, 100));
    let max = u32::from(max_crf).max(BEST_CRF);
    BEST_CRF + ((100 - q) * (max - BEST_CRF) + 49) / 99
}

#[cfg(test)]
#[path = "../../tests/unit/encode/ffmpeg.rs"]
mod tests;
