use super::*;
use crate::foundation::scratch::scratch_path;
use crate::media::frame::AudioPacket;
use image::{Rgba, RgbaImage};

fn img_frame(w: u32, h: u32) -> Frame {
    Frame::image(RgbaImage::from_pixel(w, h, Rgba([200, 100, 50, 255])), 100_000)
}

fn audio_frame() -> Frame {
    Frame::audio(AudioPacket::new(vec![0.0f32; 32], 2, 48_000))
}

#[test]
fn default_config_is_valid() {
    WriterConfig::default().validate().unwrap();
}

#[test]
fn config_rejects_bad_quality_and_audio() {
    let cfg = WriterConfig {
        quality: 0,
        ..WriterConfig::default()
    };
    assert!(matches!(cfg.validate(), Err(ReframeError::Validation(_))));

    let cfg = WriterConfig {
        audio: Some(AudioConfig {
            channels: 0,
            sample_rate: 48_000,
            bitrate: None,
        }),
        ..WriterConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn unknown_or_unencodable_formats_are_unsupported() {
    let p = scratch_path("w", "x");
    assert!(matches!(
        create_writer(p.clone(), "nope", WriterConfig::default()),
        Err(ReframeError::UnsupportedFormat(_))
    ));
    assert!(matches!(
        create_writer(p, "wav", WriterConfig::default()),
        Err(ReframeError::UnsupportedFormat(_))
    ));
}

#[test]
fn audio_before_image_is_invalid_state() {
    for fmt in ["png", "gif"] {
        let mut w = create_writer(scratch_path("w", fmt), fmt, WriterConfig::default()).unwrap();
        assert!(matches!(
            w.write_audio_frame(&audio_frame()),
            Err(ReframeError::InvalidState(_))
        ));
        w.close().unwrap();
    }
}

#[test]
fn close_with_zero_frames_is_ok_and_idempotent() {
    for fmt in ["png", "jpg", "gif"] {
        let p = scratch_path("empty", fmt);
        let mut w = create_writer(p.clone(), fmt, WriterConfig::default()).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert_eq!(w.frames_written(), 0);
        assert!(!p.exists());
    }
}

#[test]
fn mismatched_dimensions_are_rejected() {
    let p = scratch_path("mismatch", "gif");
    let mut w = create_writer(p.clone(), "gif", WriterConfig::default()).unwrap();
    w.write_image_frame(&img_frame(4, 4)).unwrap();
    assert!(matches!(
        w.write_image_frame(&img_frame(5, 4)),
        Err(ReframeError::Validation(_))
    ));
    w.close().unwrap();
    assert_eq!(w.frames_written(), 1);
    std::fs::remove_file(p).unwrap();
}

#[test]
fn writes_after_close_are_invalid_state() {
    let p = scratch_path("closed", "png");
    let mut w = create_writer(p.clone(), "png", WriterConfig::default()).unwrap();
    w.write_image_frame(&img_frame(2, 2)).unwrap();
    w.close().unwrap();
    assert!(matches!(
        w.write_image_frame(&img_frame(2, 2)),
        Err(ReframeError::InvalidState(_))
    ));
    std::fs::remove_file(p).unwrap();
}

#[test]
fn existing_output_is_kept_without_overwrite() {
    let p = scratch_path("exists", "png");
    std::fs::write(&p, b"x").unwrap();
    let cfg = WriterConfig {
        overwrite: false,
        ..WriterConfig::default()
    };
    assert!(matches!(
        create_writer(p.clone(), "png", cfg),
        Err(ReframeError::Validation(_))
    ));
    std::fs::remove_file(p).unwrap();
}

#[test]
fn writer_kinds_are_reported() {
    let still = create_writer(scratch_path("k", "png"), "png", WriterConfig::default()).unwrap();
    assert!(still.is_static());
    assert!(!still.supports_audio());
    let gif = create_writer(scratch_path("k", "gif"), "gif", WriterConfig::default()).unwrap();
    assert!(!gif.is_static());
    assert!(!gif.supports_audio());
}

#[test]
fn audio_layout_is_checked() {
    let mut state = WriterState::default();
    state.accept_image(&img_frame(1, 1)).unwrap();
    let cfg = AudioConfig {
        channels: 1,
        sample_rate: 48_000,
        bitrate: None,
    };
    assert!(matches!(
        state.accept_audio(&audio_frame(), Some(&cfg)),
        Err(ReframeError::Validation(_))
    ));
    assert!(state.accept_audio(&audio_frame(), None).is_ok());
}

#[test]
fn ensure_parent_dir_creates_nested_dirs() {
    let dir = scratch_path("dirs", "d");
    let file = dir.join("a").join("b.png");
    ensure_parent_dir(&file).unwrap();
    assert!(dir.join("a").is_dir());
    std::fs::remove_dir_all(dir).unwrap();
}

#[test]
fn checked_frames_are_not_recorded_until_committed() {
    let mut state = WriterState::default();
    let frame = img_frame(3, 2);
    let (img, first) = state.check_image(&frame).unwrap();
    assert!(first);
    assert_eq!(state.frames(), 0);
    assert!(matches!(
        state.accept_audio(&audio_frame(), None),
        Err(ReframeError::InvalidState(_))
    ));

    state.commit_image(img);
    assert_eq!(state.frames(), 1);
    assert!(!state.check_image(&frame).unwrap().1);
    assert!(matches!(
        state.check_image(&img_frame(2, 3)),
        Err(ReframeError::Validation(_))
    ));
    assert!(state.accept_audio(&audio_frame(), None).is_ok());
}
