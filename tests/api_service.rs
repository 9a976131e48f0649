//! HTTP service smoke tests over a real loopback socket.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use vision_pipeline::api::ApiServer;
use vision_pipeline::config::{ApiConfig, CameraSettings, SourceSpec, StubSpec};
use vision_pipeline::detect::{BoxedDetector, DetectorFactory, EdgeOverlayDetector};
use vision_pipeline::frame::Frame;

fn test_api_config(dir: &tempfile::TempDir) -> ApiConfig {
    let placeholder = Frame::rgb24(vec![40u8; 16 * 16 * 3], 16, 16)
        .unwrap()
        .encode_jpeg(70)
        .unwrap();
    let placeholder_path = dir.path().join("placeholder.jpg");
    std::fs::write(&placeholder_path, placeholder).unwrap();

    ApiConfig {
        addr: "127.0.0.1:0".to_string(),
        upload_dir: dir.path().join("uploads"),
        output_dir: dir.path().join("outputs"),
        camera: CameraSettings {
            source: SourceSpec::Stub(StubSpec {
                name: "feed".to_string(),
                frames: None,
                width: 32,
                height: 24,
            }),
            width: 40,
            height: 40,
            placeholder_path,
            jpeg_quality: 80,
        },
        workers: 2,
        queue_capacity: 4,
    }
}

fn detector_factory() -> DetectorFactory {
    Arc::new(|| Ok(Box::new(EdgeOverlayDetector::new()) as BoxedDetector))
}

fn get(addr: std::net::SocketAddr, path: &str, read_limit: usize) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(stream, "GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path).unwrap();

    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    while data.len() < read_limit {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

#[test]
fn health_endpoint_answers_ok() {
    let dir = tempfile::tempdir().unwrap();
    let handle = ApiServer::new(test_api_config(&dir), detector_factory())
        .spawn()
        .unwrap();

    let response = get(handle.addr, "/health", 512);
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains(r#""status":"ok""#));

    handle.stop().unwrap();
}

#[test]
fn unknown_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let handle = ApiServer::new(test_api_config(&dir), detector_factory())
        .spawn()
        .unwrap();

    let response = get(handle.addr, "/nope", 512);
    assert!(response.starts_with("HTTP/1.1 404"));

    handle.stop().unwrap();
}

#[test]
fn preview_is_missing_without_a_pipeline_attached() {
    let dir = tempfile::tempdir().unwrap();
    let handle = ApiServer::new(test_api_config(&dir), detector_factory())
        .spawn()
        .unwrap();

    let response = get(handle.addr, "/preview.jpg", 512);
    assert!(response.starts_with("HTTP/1.1 404"));
    assert!(response.contains("no_preview"));

    handle.stop().unwrap();
}

#[test]
fn video_feed_streams_multipart_jpeg_parts() {
    let dir = tempfile::tempdir().unwrap();
    let handle = ApiServer::new(test_api_config(&dir), detector_factory())
        .spawn()
        .unwrap();

    // Read enough bytes to cover the response header and a few parts.
    let response = get(handle.addr, "/video_feed", 16 * 1024);
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("multipart/x-mixed-replace"));
    assert!(response.contains("--frame"));
    assert!(response.contains("Content-Type: image/jpeg"));
    assert!(
        response.matches("--frame").count() >= 2,
        "expected more than one streamed part"
    );

    handle.stop().unwrap();
}
