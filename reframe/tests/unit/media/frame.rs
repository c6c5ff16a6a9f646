use super::*;

fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, image::Rgba(px))
}

#[test]
fn audio_duration_follows_sample_count() {
    let packet = AudioPacket::new(vec![0.0f32; 48_000 * 2], 2, 48_000);
    assert_eq!(packet.sample_frames(), 48_000);
    assert_eq!(packet.duration_micros(), 1_000_000);
    assert_eq!(Frame::audio(packet).duration_micros(), 1_000_000);
}

#[test]
fn audio_reverse_keeps_channel_pairs() {
    let packet = AudioPacket::new(vec![1.0f32, -1.0, 2.0, -2.0, 3.0, -3.0], 2, 10);
    assert_eq!(packet.reversed().samples(), &[3.0, -3.0, 2.0, -2.0, 1.0, -1.0]);
}

#[test]
fn audio_time_scale_halves_length_at_double_speed() {
    let packet = AudioPacket::new((0..100).map(|v| v as f32).collect::<Vec<_>>(), 1, 100);
    let fast = packet.time_scaled(2.0);
    assert_eq!(fast.sample_frames(), 50);
    assert_eq!(fast.sample_rate(), 100);
    assert_eq!(fast.samples()[1], 2.0);
    assert_eq!(packet.time_scaled(1.0), packet);
}

#[test]
fn frames_compare_by_content_and_duration() {
    let a = Frame::image(solid(2, 2, [1, 2, 3, 255]), 10);
    let b = Frame::image(solid(2, 2, [1, 2, 3, 255]), 10);
    assert_eq!(a, b);
    assert!(!a.shares_image_with(&b));
    assert_ne!(a, b.with_duration(11));
    assert_ne!(a, b.with_image(solid(2, 2, [0, 0, 0, 255])));
}

#[test]
fn with_duration_shares_pixels() {
    let a = Frame::image(solid(3, 1, [9, 9, 9, 9]), 5);
    let b = a.with_duration(7);
    assert!(a.shares_image_with(&b));
    assert_eq!(b.duration_micros(), 7);
    assert_eq!(b.dimensions(), Some(Dimensions::new(3, 1)));
}

#[test]
fn payload_accessors_are_exclusive() {
    let img = Frame::image(solid(1, 1, [0, 0, 0, 0]), 1);
    assert!(img.as_image().is_some());
    assert!(img.as_audio().is_none());
    let audio = Frame::audio(AudioPacket::new(vec![0.0f32], 1, 1));
    assert!(audio.as_image().is_none());
    assert!(audio.dimensions().is_none());
    assert_ne!(img, audio);
}
