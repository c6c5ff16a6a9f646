use super::*;

#[test]
fn fps_rejects_zero() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    assert!(Fps::from_f64(0.0).is_err());
    assert!(Fps::from_f64(f64::NAN).is_err());
}

#[test]
fn fps_from_f64_reduces() {
    assert_eq!(Fps::from_f64(25.0).unwrap(), Fps { num: 25, den: 1 });
    assert_eq!(Fps::from_f64(29.97).unwrap(), Fps { num: 2997, den: 100 });
}

#[test]
fn fps_frame_duration_round_trips() {
    let fps = Fps::from_frame_duration_micros(10_000).unwrap();
    assert_eq!(fps, Fps { num: 100, den: 1 });
    assert_eq!(fps.frame_duration_micros(), 10_000);
    assert_eq!(Fps::new(30, 1).unwrap().frame_duration_micros(), 33_333);
}

#[test]
fn parse_duration_accepts_suffixes() {
    assert_eq!(parse_duration_micros("2").unwrap(), 2_000_000);
    assert_eq!(parse_duration_micros("1.5s").unwrap(), 1_500_000);
    assert_eq!(parse_duration_micros("250ms").unwrap(), 250_000);
    assert_eq!(parse_duration_micros("40us").unwrap(), 40);
    assert!(parse_duration_micros("-1").is_err());
    assert!(parse_duration_micros("abc").is_err());
}

#[test]
fn dimensions_scale_never_hits_zero() {
    let d = Dimensions::new(100, 3);
    assert_eq!(d.scaled(0.5), Dimensions::new(50, 2));
    assert_eq!(d.scaled(0.01), Dimensions::new(1, 1));
    assert_eq!(d.rgba_len(), 1200);
}

#[test]
fn secs_conversion_clamps() {
    assert_eq!(micros_from_secs_f64(-3.0), 0);
    assert_eq!(micros_from_secs_f64(0.25), 250_000);
    assert!((micros_to_secs_f64(1_500_000) - 1.5).abs() < 1e-12);
}
