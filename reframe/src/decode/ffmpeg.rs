use std::path::Path;

use crate::foundation::core::{Dimensions, Fps};
use crate::foundation::error::{ReframeError, ReframeResult};
use crate::media::metadata::AudioInfo;

#[cfg(feature = "media-ffmpeg")]
use crate::decode::{DecodeLimits, DecodedMedia};

/// Sample frames per decoded audio packet.
pub const AUDIO_PACKET_FRAMES: usize = 1024;

/// Stream properties reported by `ffprobe`.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeInfo {
    /// Video dimensions.
    pub dimensions: Dimensions,
    /// Video frame rate, when the container reports one.
    pub fps: Option<Fps>,
    /// Container duration.
    pub duration_micros: u64,
    /// Frame count stored in the container header, when present.
    pub frame_count_hint: Option<u64>,
    /// Audio stream properties (`channels == 0` when silent).
    pub audio: AudioInfo,
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    tool_runs("ffmpeg")
}

/// Return `true` when `ffprobe` can be invoked from `PATH`.
pub fn is_ffprobe_on_path() -> bool {
    tool_runs("ffprobe")
}

fn tool_runs(name: &str) -> bool {
    std::process::Command::new(name)
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub(crate) fn parse_ff_ratio(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.split('/');
    let a = parts.next()?.trim().parse::<u32>().ok()?;
    let b = match parts.next() {
        Some(b) => b.trim().parse::<u32>().ok()?,
        None => 1,
    };
    if a == 0 || b == 0 {
        return None;
    }
    Some((a, b))
}

/// Start time of frame `idx` at a constant rate, rounded to whole microseconds.
///
/// Durations derived from consecutive start times sum exactly to the rounded end time, so long
/// clips do not drift.
pub(crate) fn cfr_start_micros(idx: u64, fps: Fps) -> u64 {
    let num = u128::from(fps.num);
    let scaled = u128::from(idx) * u128::from(fps.den) * 1_000_000;
    ((scaled + num / 2) / num) as u64
}

/// Probe source metadata through `ffprobe`.
#[cfg(feature = "media-ffmpeg")]
pub fn probe(source_path: &Path) -> ReframeResult<ProbeInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
        avg_frame_rate: Option<String>,
        nb_frames: Option<String>,
        channels: Option<u16>,
        sample_rate: Option<String>,
        bit_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| ReframeError::decode(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReframeError::decode(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReframeError::decode(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ReframeError::unsupported("no video stream found"))?;
    let width = video_stream
        .width
        .ok_or_else(|| ReframeError::decode("missing video width from ffprobe"))?;
    let height = video_stream
        .height
        .ok_or_else(|| ReframeError::decode("missing video height from ffprobe"))?;

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_ff_ratio)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_ff_ratio))
        .and_then(|(num, den)| Fps::new(num, den).ok());
    let duration_micros = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|s| s.parse::<f64>().ok())
        .map(crate::foundation::core::micros_from_secs_f64)
        .unwrap_or(0);
    let frame_count_hint = video_stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|&n| n > 0);

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioInfo {
            channels: s.channels.unwrap_or(0),
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            bitrate: s
                .bit_rate
                .as_deref()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
        .unwrap_or_default();

    Ok(ProbeInfo {
        dimensions: Dimensions::new(width, height),
        fps,
        duration_micros,
        frame_count_hint,
        audio,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
/// Probe source metadata through `ffprobe`.
///
/// Returns an error when `media-ffmpeg` feature is disabled.
pub fn probe(_source_path: &Path) -> ReframeResult<ProbeInfo> {
    Err(ReframeError::unsupported(
        "audio/video sources require the 'media-ffmpeg' feature",
    ))
}

/// Decode every video frame and the full audio track of `source_path`.
#[cfg(feature = "media-ffmpeg")]
#[tracing::instrument(skip(limits), fields(path = %source_path.display()))]
pub(crate) fn decode_all(source_path: &Path, limits: &DecodeLimits) -> ReframeResult<DecodedMedia> {
    let info = probe(source_path)?;
    let fps = match info.fps {
        Some(fps) => fps,
        None => match info.frame_count_hint {
            Some(n) if info.duration_micros > 0 => Fps::from_f64(
                n as f64 / crate::foundation::core::micros_to_secs_f64(info.duration_micros),
            )?,
            _ => Fps::new(25, 1)?,
        },
    };
    if let Some(n) = info.frame_count_hint {
        limits.check(n.saturating_mul(info.dimensions.rgba_len() as u64))?;
    }

    let images = decode_video_rgba8(source_path, info.dimensions, fps, limits)?;
    let used = images.len() as u64 * info.dimensions.rgba_len() as u64;
    let frames = images
        .into_iter()
        .enumerate()
        .map(|(i, img)| {
            let i = i as u64;
            let d = cfr_start_micros(i + 1, fps) - cfr_start_micros(i, fps);
            crate::media::frame::Frame::image(img, d)
        })
        .collect::<Vec<_>>();
    tracing::debug!(frames = frames.len(), fps = fps.as_f64(), "decoded video");

    let audio = if info.audio.channels > 0 && info.audio.sample_rate > 0 {
        decode_audio_f32(source_path, info.audio, limits, used)?
    } else {
        Vec::new()
    };

    Ok(DecodedMedia {
        frames,
        audio,
        audio_info: info.audio,
        loop_count: 0,
    })
}

#[cfg(not(feature = "media-ffmpeg"))]
pub(crate) fn decode_all(
    _source_path: &Path,
    _limits: &crate::decode::DecodeLimits,
) -> ReframeResult<crate::decode::DecodedMedia> {
    Err(ReframeError::unsupported(
        "audio/video sources require the 'media-ffmpeg' feature",
    ))
}

#[cfg(feature = "media-ffmpeg")]
fn decode_video_rgba8(
    source_path: &Path,
    dims: Dimensions,
    fps: Fps,
    limits: &DecodeLimits,
) -> ReframeResult<Vec<image::RgbaImage>> {
    use std::process::{Command, Stdio};

    let frame_len = dims.rgba_len();
    if frame_len == 0 {
        return Err(ReframeError::decode(
            "decoded video frame size is zero (invalid source dimensions)",
        ));
    }

    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(source_path)
        .args([
            "-map",
            "0:v:0",
            "-vsync",
            "cfr",
            "-r",
            &format!("{}/{}", fps.num, fps.den),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ReframeError::decode(format!("failed to spawn ffmpeg for video decode: {e}")))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ReframeError::decode("failed to open ffmpeg stdout (unexpected)"))?;
    let stderr_drain = spawn_stderr_drain(&mut child)?;

    let mut frames = Vec::new();
    let mut buf = vec![0u8; frame_len];
    let read_result: ReframeResult<()> = loop {
        match read_full(&mut stdout, &mut buf) {
            Ok(0) => break Ok(()),
            Ok(n) if n == frame_len => {}
            Ok(n) => {
                break Err(ReframeError::decode(format!(
                    "truncated video frame: got {n} bytes, expected {frame_len}"
                )));
            }
            Err(e) => break Err(ReframeError::decode(format!("ffmpeg stdout read failed: {e}"))),
        }
        if let Err(e) = limits.check((frames.len() as u64 + 1) * frame_len as u64) {
            break Err(e);
        }
        let img = image::RgbaImage::from_raw(dims.width, dims.height, buf.clone())
            .ok_or_else(|| ReframeError::decode("decoded frame buffer has wrong length"));
        match img {
            Ok(img) => frames.push(img),
            Err(e) => break Err(e),
        }
    };

    if read_result.is_err() {
        let _ = child.kill();
    }
    drop(stdout);
    let status = child
        .wait()
        .map_err(|e| ReframeError::decode(format!("failed to wait for ffmpeg: {e}")))?;
    let stderr = join_stderr_drain(stderr_drain)?;
    read_result?;

    if !status.success() {
        return Err(ReframeError::decode(format!(
            "ffmpeg video decode failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&stderr).trim()
        )));
    }
    if frames.is_empty() {
        return Err(ReframeError::decode(format!(
            "ffmpeg returned no video frames for '{}'",
            source_path.display()
        )));
    }
    Ok(frames)
}

#[cfg(feature = "media-ffmpeg")]
fn decode_audio_f32(
    path: &Path,
    audio: AudioInfo,
    limits: &DecodeLimits,
    already_used: u64,
) -> ReframeResult<Vec<crate::media::frame::Frame>> {
    use crate::media::frame::{AudioPacket, Frame};

    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &audio.channels.to_string(),
            "-ar",
            &audio.sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReframeError::decode(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        return Err(ReframeError::decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    if !out.stdout.len().is_multiple_of(4) {
        return Err(ReframeError::decode(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    limits.check(already_used + out.stdout.len() as u64)?;

    let pcm = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect::<Vec<_>>();
    let per_packet = AUDIO_PACKET_FRAMES * usize::from(audio.channels);
    Ok(pcm
        .chunks(per_packet)
        .map(|chunk| Frame::audio(AudioPacket::new(chunk, audio.channels, audio.sample_rate)))
        .collect())
}

#[cfg(feature = "media-ffmpeg")]
fn read_full(r: &mut impl std::io::Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

pub(crate) type StderrDrain = std::thread::JoinHandle<std::io::Result<Vec<u8>>>;

/// Collect a child's stderr on a helper thread so a chatty child never blocks on a full pipe.
pub(crate) fn spawn_stderr_drain(child: &mut std::process::Child) -> ReframeResult<StderrDrain> {
    use std::io::Read as _;

    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ReframeError::invalid_state("failed to open ffmpeg stderr (unexpected)"))?;
    Ok(std::thread::spawn(move || {
        let mut stderr_bytes = Vec::new();
        stderr.read_to_end(&mut stderr_bytes)?;
        Ok(stderr_bytes)
    }))
}

pub(crate) fn join_stderr_drain(handle: StderrDrain) -> ReframeResult<Vec<u8>> {
    handle
        .join()
        .map_err(|_| ReframeError::invalid_state("ffmpeg stderr drain thread panicked"))?
        .map_err(|e| ReframeError::Other(anyhow::Error::new(e).context("ffmpeg stderr read failed")))
}
