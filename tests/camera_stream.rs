//! Streaming camera behavior against a real placeholder file on disk.

use std::path::PathBuf;

use vision_pipeline::camera::StreamingCamera;
use vision_pipeline::config::{CameraSettings, SourceSpec, StubSpec};
use vision_pipeline::frame::Frame;

fn write_placeholder(dir: &tempfile::TempDir) -> (PathBuf, Vec<u8>) {
    let frame = Frame::rgb24(vec![90u8; 20 * 20 * 3], 20, 20).unwrap();
    let jpeg = frame.encode_jpeg(70).unwrap();
    let path = dir.path().join("placeholder.jpg");
    std::fs::write(&path, &jpeg).unwrap();
    (path, jpeg)
}

fn camera_settings(frames: u64, placeholder_path: PathBuf) -> CameraSettings {
    CameraSettings {
        source: SourceSpec::Stub(StubSpec {
            name: "feed".to_string(),
            frames: Some(frames),
            width: 48,
            height: 36,
        }),
        width: 40,
        height: 40,
        placeholder_path,
        jpeg_quality: 85,
    }
}

#[test]
fn k_frames_then_placeholder_then_real_frames_again() {
    let dir = tempfile::tempdir().unwrap();
    let (placeholder_path, placeholder_bytes) = write_placeholder(&dir);
    let k = 4;
    let mut camera = StreamingCamera::open(&camera_settings(k, placeholder_path)).unwrap();

    // K pulls serve real encoded frames.
    for i in 0..k {
        let bytes = camera.get_frame().unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "pull {} not a jpeg", i);
        assert_ne!(bytes, placeholder_bytes, "pull {} served placeholder early", i);
    }

    // Pull K+1 hits exhaustion: the placeholder, byte for byte.
    assert_eq!(camera.get_frame().unwrap(), placeholder_bytes);

    // Pull K+2 reads from the transparently reopened stream.
    let bytes = camera.get_frame().unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    assert_ne!(bytes, placeholder_bytes);
}

#[test]
fn missing_placeholder_fails_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.jpg");
    assert!(StreamingCamera::open(&camera_settings(2, missing)).is_err());
}

#[test]
fn transform_output_uses_camera_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let (placeholder_path, _) = write_placeholder(&dir);
    let mut camera = StreamingCamera::open(&camera_settings(10, placeholder_path)).unwrap();

    camera
        .set_rect([(0.0, 0.0), (47.0, 0.0), (0.0, 35.0), (47.0, 35.0)])
        .unwrap();

    let bytes = camera.get_frame().unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!(image::GenericImageView::dimensions(&decoded), camera.geometry());
}

#[test]
fn repeated_exhaustion_cycles_keep_recovering() {
    let dir = tempfile::tempdir().unwrap();
    let (placeholder_path, placeholder_bytes) = write_placeholder(&dir);
    let k = 2;
    let mut camera = StreamingCamera::open(&camera_settings(k, placeholder_path)).unwrap();

    for _ in 0..10 {
        for _ in 0..k {
            let bytes = camera.get_frame().unwrap();
            assert_ne!(bytes, placeholder_bytes);
        }
        assert_eq!(camera.get_frame().unwrap(), placeholder_bytes);
    }
}
