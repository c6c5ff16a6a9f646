use super::*;
use image::{Rgba, RgbaImage};

fn gradient(w: u32, h: u32) -> Frame {
    let img = RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 0, 255]));
    Frame::image(img, 100_000)
}

#[test]
fn flips_mirror_pixels() {
    let f = gradient(3, 2);
    let h = FlipHorizontal.apply(&f, &()).unwrap();
    assert_eq!(h.as_image().unwrap().get_pixel(0, 0)[0], 2);
    let v = FlipVertical.apply(&f, &()).unwrap();
    assert_eq!(v.as_image().unwrap().get_pixel(0, 0)[1], 1);
    assert_eq!(v.duration_micros(), 100_000);
}

#[test]
fn fit_keeps_aspect_and_never_enlarges() {
    let fit = ResizeToFit::new(50, 50).unwrap();
    assert_eq!(fit.prepare(&gradient(200, 100)).unwrap(), Dimensions::new(50, 25));
    assert_eq!(fit.prepare(&gradient(20, 10)).unwrap(), Dimensions::new(20, 10));
    assert!(ResizeToFit::new(0, 5).is_err());
}

#[test]
fn resize_frame_is_noop_at_target() {
    let f = gradient(8, 4);
    let same = resize_frame(&f, Dimensions::new(8, 4)).unwrap();
    assert!(same.shares_image_with(&f));
    let small = resize_frame(&f, Dimensions::new(4, 2)).unwrap();
    assert_eq!(small.as_image().unwrap().dimensions(), (4, 2));
}

#[test]
fn ops_parse_from_cli_names() {
    assert_eq!("identity".parse::<Op>().unwrap(), Op::Identity);
    assert_eq!("flip-h".parse::<Op>().unwrap(), Op::FlipH);
    assert_eq!("speed=2.5".parse::<Op>().unwrap(), Op::Speed(2.5));
    assert_eq!("fit=64x32".parse::<Op>().unwrap(), Op::Fit(64, 32));
    assert!("speed=0".parse::<Op>().is_err());
    assert!("fit=64".parse::<Op>().is_err());
    assert!("explode".parse::<Op>().is_err());
}

#[test]
fn op_semantics() {
    assert_eq!(Op::Reverse.speed(), -1.0);
    assert_eq!(Op::Gif.output_format("mp4"), "gif");
    assert!(Op::Gif.is_passthrough());
    assert!(Op::Speed(1.0).is_passthrough());
    assert!(!Op::FlipH.is_passthrough());
    assert!(Op::Speed(0.5).mutates_audio());
    assert!(!Op::Reverse.mutates_audio());
    assert!(!Op::FlipV.mutates_audio());

    let op = Op::Fit(2, 2);
    let c = op.prepare(&gradient(8, 4)).unwrap();
    assert_eq!(c, Some(Dimensions::new(2, 1)));
    let out = op.apply(&gradient(8, 4), &c).unwrap();
    assert_eq!(out.as_image().unwrap().dimensions(), (2, 1));
}
