use super::*;
use std::path::PathBuf;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        ReframeError::unsupported("x")
            .to_string()
            .contains("unsupported format:")
    );
    assert!(ReframeError::decode("x").to_string().contains("decode error:"));
    assert!(ReframeError::encode("x").to_string().contains("encode error:"));
    assert!(
        ReframeError::invalid_state("x")
            .to_string()
            .contains("invalid state:")
    );
    assert!(
        ReframeError::no_such_frame("x")
            .to_string()
            .contains("no such frame:")
    );
    assert!(
        ReframeError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(ReframeError::cancelled("x").to_string().contains("cancelled:"));
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = ReframeError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn size_exceeded_exposes_best_effort_output() {
    let output = ProcessedOutput {
        path: PathBuf::from("out.gif"),
        format: "gif".to_string(),
        size_bytes: 2048,
        width: 8,
        height: 8,
        frame_count: 3,
        attempts: 3,
        quality: 55,
        scale: 0.5,
    };
    let err = ReframeError::SizeExceeded {
        output: Box::new(output),
        max_bytes: 1024,
    };
    let msg = err.to_string();
    assert!(msg.contains("2048 bytes"));
    assert!(msg.contains("budget 1024 bytes"));
    assert_eq!(err.best_effort_output().map(|o| o.size_bytes), Some(2048));
    assert!(ReframeError::decode("x").best_effort_output().is_none());
}
