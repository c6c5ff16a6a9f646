use super::*;
use crate::foundation::scratch::scratch_path;
use crate::transform::{FnTransform, Identity, Speed};
use image::{Rgba, RgbaImage};
use std::sync::atomic::AtomicUsize;

fn noisy(seed: u8, w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let mut v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663) ^ u32::from(seed);
        v ^= v >> 13;
        v = v.wrapping_mul(0x5bd1_e995);
        v ^= v >> 15;
        Rgba([v as u8, (v >> 8) as u8, (v >> 16) as u8, 255])
    })
}

fn gif_reader(durations: &[u64]) -> MediaReader {
    let frames = durations
        .iter()
        .enumerate()
        .map(|(i, &d)| Frame::image(noisy(i as u8, 40, 40), d))
        .collect();
    MediaReader::from_frames("gif", frames, Vec::new()).unwrap()
}

fn out_dir() -> PathBuf {
    let dir = scratch_path("engine", "d");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn durations(path: &Path) -> Vec<u64> {
    let r = MediaReader::open(std::fs::read(path).unwrap(), "gif").unwrap();
    r.frames().map(Frame::duration_micros).collect()
}

#[test]
fn retry_policy_math() {
    let p = RetryPolicy::default();
    p.validate().unwrap();
    assert_eq!(p.next_quality(85), 70);
    assert_eq!(p.next_quality(15), 10);
    assert_eq!(p.scale_factor(400, 100), 0.5);
    assert_eq!(p.scale_factor(100, 99), 0.9);
    assert_eq!(p.scale_factor(1_000_000, 1), 0.1);
    assert!(
        RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        }
        .validate()
        .is_err()
    );
}

#[test]
fn cancel_token_is_shared_between_clones() {
    let a = CancelToken::new();
    let b = a.clone();
    assert!(b.check().is_ok());
    a.cancel();
    assert!(b.is_cancelled());
    assert!(matches!(b.check(), Err(ReframeError::Cancelled(_))));
}

#[test]
fn speed_scales_durations() {
    assert_eq!(scaled_duration(100, 1.0), 100);
    assert_eq!(scaled_duration(100, 2.0), 50);
    assert_eq!(scaled_duration(100, 0.5), 200);
    assert_eq!(scaled_duration(0, 3.0), 0);
}

#[test]
fn identity_gif_round_trip_keeps_timing() {
    let dir = out_dir();
    let engine = TransformEngine::default();
    let out = engine
        .process(
            gif_reader(&[100_000, 100_000, 120_000]),
            &Identity,
            &ProcessOptions::new(&dir, "out"),
        )
        .unwrap();
    assert_eq!(out.path, dir.join("out.gif"));
    assert_eq!(out.attempts, 1);
    assert_eq!((out.width, out.height), (40, 40));
    assert_eq!(out.size_bytes, std::fs::metadata(&out.path).unwrap().len());
    assert_eq!(durations(&out.path), vec![100_000, 100_000, 120_000]);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn quantized_output_rounds_odd_delays() {
    let dir = out_dir();
    let out = TransformEngine::default()
        .process(
            gif_reader(&[12_000, 12_000, 12_000]),
            &FnTransform::new("copy", |f: &Frame| Ok(f.clone())),
            &ProcessOptions::new(&dir, "q"),
        )
        .unwrap();
    assert_eq!(out.frame_count, 4);
    assert_eq!(durations(&out.path).iter().sum::<u64>(), 40_000);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn speed_and_reverse_change_timing_and_order() {
    let dir = out_dir();
    let engine = TransformEngine::default();
    let out = engine
        .process(
            gif_reader(&[200_000, 100_000]),
            &Speed::new(-2.0).unwrap(),
            &ProcessOptions::new(&dir, "rev"),
        )
        .unwrap();
    assert_eq!(durations(&out.path), vec![50_000, 100_000]);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn max_duration_keeps_earliest_segment() {
    let dir = out_dir();
    let out = TransformEngine::default()
        .process(
            gif_reader(&[100_000, 100_000, 100_000]),
            &Identity,
            &ProcessOptions::new(&dir, "cut").with_max_duration_micros(150_000),
        )
        .unwrap();
    assert_eq!(durations(&out.path), vec![100_000, 50_000]);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn static_target_gets_first_frame() {
    let dir = out_dir();
    let out = TransformEngine::default()
        .process(
            gif_reader(&[100_000, 100_000]),
            &crate::transform::Convert::new("png"),
            &ProcessOptions::new(&dir, "still"),
        )
        .unwrap();
    assert_eq!(out.format, "png");
    assert_eq!(out.frame_count, 1);
    let back = image::open(&out.path).unwrap().to_rgba8();
    assert_eq!(back, noisy(0, 40, 40));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn unreachable_budget_stops_after_max_attempts() {
    let dir = out_dir();
    let err = TransformEngine::default()
        .process(
            gif_reader(&[100_000, 100_000]),
            &Identity,
            &ProcessOptions::new(&dir, "big").with_max_output_bytes(1),
        )
        .unwrap_err();
    let (output, max_bytes) = match err {
        ReframeError::SizeExceeded { output, max_bytes } => (output, max_bytes),
        other => panic!("expected SizeExceeded, got {other}"),
    };
    assert_eq!(max_bytes, 1);
    assert_eq!(output.attempts, 3);
    assert!(output.scale <= 0.1 + 1e-9);
    assert!(output.path.exists());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn budget_retry_shrinks_until_it_fits() {
    let dir = out_dir();
    let reader = || {
        let frames = (0..2)
            .map(|i| Frame::image(noisy(i, 96, 96), 100_000))
            .collect();
        MediaReader::from_frames("gif", frames, Vec::new()).unwrap()
    };
    let engine = TransformEngine::new(
        RetryPolicy {
            max_attempts: 6,
            ..RetryPolicy::default()
        },
        WriterDefaults::default(),
    );
    let full = engine
        .process(reader(), &Identity, &ProcessOptions::new(&dir, "full"))
        .unwrap();
    let budget = full.size_bytes * 2 / 3;
    let out = engine
        .process(
            reader(),
            &Identity,
            &ProcessOptions::new(&dir, "fit").with_max_output_bytes(budget),
        )
        .unwrap();
    assert!(out.size_bytes <= budget);
    assert!(out.attempts >= 2);
    assert!(out.scale < 1.0);
    assert!(out.width < 96);
    assert_eq!(out.size_bytes, std::fs::metadata(&out.path).unwrap().len());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn cancellation_mid_job_leaves_no_files() {
    let dir = out_dir();
    let token = CancelToken::new();
    let calls = AtomicUsize::new(0);
    let t = {
        let token = token.clone();
        FnTransform::new("cancel-after-first", move |f: &Frame| {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                token.cancel();
            }
            Ok(f.clone())
        })
    };
    let err = TransformEngine::default()
        .process(
            gif_reader(&[100_000, 100_000, 100_000]),
            &t,
            &ProcessOptions::new(&dir, "c").with_cancel(token),
        )
        .unwrap_err();
    assert!(matches!(err, ReframeError::Cancelled(_)));
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn passthrough_copies_compatible_source() {
    let dir = out_dir();
    let src = dir.join("src.gif");
    {
        let mut w = create_writer(&src, "gif", WriterConfig::default()).unwrap();
        w.write_image_frame(&Frame::image(noisy(1, 8, 8), 50_000)).unwrap();
        w.write_image_frame(&Frame::image(noisy(2, 8, 8), 50_000)).unwrap();
        w.close().unwrap();
    }
    let reader = MediaReader::open(src.clone(), "gif").unwrap();
    let out = TransformEngine::default()
        .process(reader, &Identity, &ProcessOptions::new(&dir, "copy"))
        .unwrap();
    assert_eq!(out.attempts, 0);
    assert_eq!(std::fs::read(&out.path).unwrap(), std::fs::read(&src).unwrap());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn unencodable_output_is_unsupported() {
    let dir = out_dir();
    let err = TransformEngine::default()
        .process(
            gif_reader(&[10_000]),
            &crate::transform::Convert::new("mp3"),
            &ProcessOptions::new(&dir, "x"),
        )
        .unwrap_err();
    assert!(matches!(err, ReframeError::UnsupportedFormat(_)));
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn inverted_scale_bounds_are_rejected() {
    let p = RetryPolicy {
        min_scale: 0.95,
        max_scale_step: 0.9,
        ..RetryPolicy::default()
    };
    assert!(matches!(p.validate(), Err(ReframeError::Validation(_))));
    assert_eq!(p.scale_factor(1_000, 1), 0.9);

    let dir = out_dir();
    let engine = TransformEngine::new(p, WriterDefaults::default());
    let res = engine.process(
        gif_reader(&[100_000]),
        &Identity,
        &ProcessOptions::new(&dir, "inverted").with_max_output_bytes(1),
    );
    assert!(matches!(res, Err(ReframeError::Validation(_))));
    std::fs::remove_dir_all(dir).unwrap();
}

#[derive(Default)]
struct AudioSink {
    packets: Vec<Frame>,
}

impl MediaWriter for AudioSink {
    fn write_image_frame(&mut self, _frame: &Frame) -> ReframeResult<()> {
        Ok(())
    }

    fn write_audio_frame(&mut self, frame: &Frame) -> ReframeResult<()> {
        self.packets.push(frame.clone());
        Ok(())
    }

    fn close(&mut self) -> ReframeResult<()> {
        Ok(())
    }

    fn is_static(&self) -> bool {
        false
    }

    fn supports_audio(&self) -> bool {
        true
    }

    fn path(&self) -> &Path {
        Path::new("sink")
    }

    fn frames_written(&self) -> usize {
        0
    }
}

fn audio_lengths<T: FrameTransform>(transform: &T) -> Vec<usize> {
    use crate::media::frame::AudioPacket;

    let audio = vec![Frame::audio(AudioPacket::new(vec![0.5f32; 800], 1, 8_000))];
    let reader =
        MediaReader::from_frames("mp4", vec![Frame::image(noisy(0, 4, 4), 100_000)], audio)
            .unwrap();
    let cancel = CancelToken::new();
    let plan = Plan {
        format: FormatInfo::require("mp4").unwrap(),
        speed: transform.speed().abs(),
        quantum: None,
        total_micros: 100_000,
        fps: Fps::new(10, 1).unwrap(),
        audio: None,
        base_dims: Dimensions::new(4, 4),
        cancel: &cancel,
    };
    let mut sink = AudioSink::default();
    write_audio(&mut sink, &reader, transform, &plan).unwrap();
    sink.packets
        .iter()
        .map(|f| f.as_audio().unwrap().samples().len())
        .collect()
}

#[test]
fn audio_is_retimed_once_by_the_transform() {
    assert_eq!(audio_lengths(&Identity), vec![800]);
    assert_eq!(audio_lengths(&Speed::new(2.0).unwrap()), vec![400]);
    assert_eq!(audio_lengths(&Speed::new(-2.0).unwrap()), vec![400]);
    assert_eq!(audio_lengths(&crate::transform::ops::Op::Speed(0.5)), vec![1_600]);

    let pixels_only = FnTransform::new("noop", |f: &Frame| Ok(f.clone()));
    let chained = crate::transform::FrameTransformExt::then(
        Speed::new(2.0).unwrap(),
        Speed::new(2.0).unwrap(),
    );
    assert_eq!(audio_lengths(&pixels_only), vec![800]);
    assert_eq!(audio_lengths(&chained), vec![200]);
}
