use super::*;
use crate::foundation::scratch::scratch_path;
use image::{Rgba, RgbaImage};

fn frame(px: [u8; 4]) -> Frame {
    Frame::image(RgbaImage::from_pixel(6, 4, Rgba(px)), 0)
}

#[test]
fn keeps_only_first_frame() {
    let p = scratch_path("still", "png");
    let mut w = StillWriter::new(p.clone(), ImageFormat::Png, WriterConfig::default());
    w.write_image_frame(&frame([10, 20, 30, 255])).unwrap();
    w.write_image_frame(&frame([90, 90, 90, 255])).unwrap();
    w.close().unwrap();

    let back = image::open(&p).unwrap().to_rgba8();
    assert_eq!(back.dimensions(), (6, 4));
    assert_eq!(back.get_pixel(0, 0).0, [10, 20, 30, 255]);
    assert_eq!(w.frames_written(), 2);
    std::fs::remove_file(p).unwrap();
}

#[test]
fn jpeg_flattens_alpha_over_background() {
    let p = scratch_path("still", "jpg");
    let cfg = WriterConfig {
        bg_rgba: [255, 255, 255, 255],
        quality: 95,
        ..WriterConfig::default()
    };
    let mut w = StillWriter::new(p.clone(), ImageFormat::Jpeg, cfg);
    w.write_image_frame(&frame([0, 0, 0, 0])).unwrap();
    w.close().unwrap();

    let back = image::open(&p).unwrap().to_rgb8();
    let px = back.get_pixel(2, 2).0;
    assert!(px.iter().all(|&c| c > 240), "{px:?}");
    std::fs::remove_file(p).unwrap();
}

#[test]
fn lower_jpeg_quality_is_not_larger() {
    let mut img = RgbaImage::new(64, 64);
    for (x, y, px) in img.enumerate_pixels_mut() {
        *px = Rgba([(x * 4) as u8, (y * 4) as u8, ((x ^ y) * 8) as u8, 255]);
    }
    let frame = Frame::image(img, 0);
    let size = |quality| {
        let p = scratch_path("q", "jpg");
        let cfg = WriterConfig {
            quality,
            ..WriterConfig::default()
        };
        let mut w = StillWriter::new(p.clone(), ImageFormat::Jpeg, cfg);
        w.write_image_frame(&frame).unwrap();
        w.close().unwrap();
        let n = std::fs::metadata(&p).unwrap().len();
        std::fs::remove_file(p).unwrap();
        n
    };
    assert!(size(20) <= size(95));
}

#[test]
fn other_formats_round_trip() {
    for (fmt, ext) in [(ImageFormat::Bmp, "bmp"), (ImageFormat::Tiff, "tiff")] {
        let p = scratch_path("still", ext);
        let mut w = StillWriter::new(p.clone(), fmt, WriterConfig::default());
        w.write_image_frame(&frame([1, 2, 3, 255])).unwrap();
        w.close().unwrap();
        let back = image::open(&p).unwrap().to_rgba8();
        assert_eq!(back.get_pixel(5, 3).0, [1, 2, 3, 255]);
        std::fs::remove_file(p).unwrap();
    }
}
