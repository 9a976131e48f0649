//! HTTP service.
//!
//! A small hand-rolled HTTP/1.1 server on `std::net::TcpListener`, running
//! on its own thread. Endpoints:
//!
//! - `GET /video_feed` - long-lived `multipart/x-mixed-replace` stream; each
//!   part is one JPEG pulled from the streaming camera. Served on a
//!   dedicated thread per connection so the accept loop stays responsive.
//! - `POST /upload_video` - save the uploaded video, then run the pipeline
//!   over it once, synchronously, with output enabled. Responds with the
//!   stored file name.
//! - `GET /preview.jpg` - latest annotated pipeline frame, when a preview
//!   handle is attached.
//! - `GET /health` - liveness probe.
//!
//! The streaming camera is shared behind a mutex; that is the external
//! serialization the camera requires of concurrent pullers.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::camera::StreamingCamera;
use crate::config::{ApiConfig, PipelineConfig, SourceSpec};
use crate::detect::DetectorFactory;
use crate::pipeline;
use crate::sink::PreviewHandle;

const MAX_HEADER_BYTES: usize = 8192;
const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;
const UPLOAD_FILE_NAME: &str = "video.mp4";
const OUTPUT_FILE_NAME: &str = "video.mp4";
/// Pacing between multipart frames, roughly 25 fps.
const STREAM_FRAME_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug)]
pub struct ApiHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ApiHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("api server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ApiServer {
    cfg: ApiConfig,
    detectors: DetectorFactory,
    preview: Option<PreviewHandle>,
}

impl ApiServer {
    pub fn new(cfg: ApiConfig, detectors: DetectorFactory) -> Self {
        Self {
            cfg,
            detectors,
            preview: None,
        }
    }

    /// Attach a preview handle so `/preview.jpg` serves live pipeline
    /// frames.
    pub fn with_preview(mut self, preview: PreviewHandle) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Bind, open the streaming camera, and serve on a background thread.
    /// Camera or bind failures abort here, before the thread starts.
    pub fn spawn(self) -> Result<ApiHandle> {
        let configured_addr: SocketAddr = self.cfg.addr.parse()?;
        let listener = TcpListener::bind(configured_addr)?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let camera = StreamingCamera::open(&self.cfg.camera)?;
        let state = Arc::new(ServerState {
            cfg: self.cfg,
            detectors: self.detectors,
            camera: Mutex::new(camera),
            preview: self.preview,
            shutdown: AtomicBool::new(false),
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let thread_state = state.clone();
        let join = std::thread::spawn(move || {
            if let Err(err) = run_api(listener, thread_state, shutdown_thread) {
                log::error!("api server stopped: {}", err);
            }
        });

        log::info!("api listening on {}", addr);
        Ok(ApiHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

struct ServerState {
    cfg: ApiConfig,
    detectors: DetectorFactory,
    camera: Mutex<StreamingCamera>,
    preview: Option<PreviewHandle>,
    shutdown: AtomicBool,
}

fn run_api(listener: TcpListener, state: Arc<ServerState>, shutdown: Arc<AtomicBool>) -> Result<()> {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            state.shutdown.store(true, Ordering::SeqCst);
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                if let Err(err) = handle_connection(stream, &state) {
                    log::warn!("api request rejected: {}", err);
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

fn handle_connection(mut stream: TcpStream, state: &Arc<ServerState>) -> Result<()> {
    let request = read_request(&mut stream)?;

    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => {
            write_json_response(&mut stream, 200, r#"{"status":"ok"}"#)?;
        }
        ("GET", "/preview.jpg") => match state.preview.as_ref().and_then(|p| p.latest()) {
            Some(frame) => write_response(&mut stream, 200, "image/jpeg", &frame.jpeg)?,
            None => write_json_response(&mut stream, 404, r#"{"error":"no_preview"}"#)?,
        },
        ("GET", "/video_feed") => {
            // Long-lived response; hand the connection to its own thread so
            // the accept loop keeps serving.
            let stream_state = state.clone();
            std::thread::spawn(move || {
                if let Err(err) = stream_video_feed(stream, stream_state) {
                    log::debug!("video feed closed: {}", err);
                }
            });
        }
        ("POST", "/upload_video") => match handle_upload(&request, state) {
            Ok(file_name) => {
                write_response(&mut stream, 200, "text/plain", file_name.as_bytes())?
            }
            Err(err) => {
                log::warn!("upload failed: {}", err);
                write_json_response(&mut stream, 500, r#"{"error":"upload_failed"}"#)?;
            }
        },
        ("GET", _) => {
            write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#)?;
        }
        _ => {
            write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#)?;
        }
    }
    Ok(())
}

/// Serve the multipart MJPEG feed until the client disconnects or the
/// server shuts down. Exhausted streams surface as placeholder frames from
/// the camera, so the response never closes on its own.
fn stream_video_feed(mut stream: TcpStream, state: Arc<ServerState>) -> Result<()> {
    stream.write_all(
        b"HTTP/1.1 200 OK\r\n\
          Cache-Control: no-store\r\n\
          Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\r\n",
    )?;

    loop {
        if state.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let bytes = {
            let mut camera = state
                .camera
                .lock()
                .map_err(|_| anyhow!("camera state poisoned"))?;
            camera.get_frame()?
        };

        let mut part = Vec::with_capacity(bytes.len() + 96);
        part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
        part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", bytes.len()).as_bytes());
        part.extend_from_slice(&bytes);
        part.extend_from_slice(b"\r\n\r\n");
        if stream.write_all(&part).is_err() {
            break; // client went away
        }

        std::thread::sleep(STREAM_FRAME_INTERVAL);
    }
    Ok(())
}

/// Save the uploaded video and run the pipeline over it once, to
/// completion. Mirrors the upload flow of the original service: fixed
/// stored file name, output enabled, display off.
fn handle_upload(request: &HttpRequest, state: &Arc<ServerState>) -> Result<String> {
    let payload = extract_upload_payload(request)?;
    if payload.is_empty() {
        return Err(anyhow!("empty upload body"));
    }

    std::fs::create_dir_all(&state.cfg.upload_dir)
        .with_context(|| format!("create upload dir {}", state.cfg.upload_dir.display()))?;
    let input_path = state.cfg.upload_dir.join(UPLOAD_FILE_NAME);
    std::fs::write(&input_path, &payload)
        .with_context(|| format!("store upload at {}", input_path.display()))?;

    let mut config = PipelineConfig {
        display: false,
        output: true,
        output_path: state.cfg.output_dir.join(OUTPUT_FILE_NAME),
        input: SourceSpec::File(input_path),
        workers: state.cfg.workers,
        queue_capacity: state.cfg.queue_capacity,
        ..PipelineConfig::default()
    };
    config.validate()?;

    let summary = pipeline::run(&config, state.detectors.clone())?;
    log::info!(
        "upload processed: {} frames sunk to {}",
        summary.frames_sunk,
        config.output_path.display()
    );
    Ok(UPLOAD_FILE_NAME.to_string())
}

/// Pull the file payload out of the request body: either the raw body, or
/// the first part of a multipart/form-data submission.
fn extract_upload_payload(request: &HttpRequest) -> Result<Vec<u8>> {
    let Some(content_type) = request.headers.get("content-type") else {
        return Ok(request.body.clone());
    };
    let Some(boundary) = content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("boundary="))
    else {
        return Ok(request.body.clone());
    };
    let boundary = boundary.trim_matches('"');

    let open_marker = format!("--{}", boundary);
    let body = &request.body;
    let part_start = find_subslice(body, open_marker.as_bytes())
        .ok_or_else(|| anyhow!("multipart boundary not found in body"))?;
    let headers_end = find_subslice(&body[part_start..], b"\r\n\r\n")
        .ok_or_else(|| anyhow!("malformed multipart part"))?
        + part_start
        + 4;
    let close_marker = format!("\r\n--{}", boundary);
    let payload_end = find_subslice(&body[headers_end..], close_marker.as_bytes())
        .map(|i| headers_end + i)
        .unwrap_or(body.len());
    Ok(body[headers_end..payload_end].to_vec())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    stream.set_read_timeout(Some(Duration::from_secs(10)))?;
    let mut buf = [0u8; 4096];
    let mut data = Vec::new();
    let headers_end = loop {
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break find_subslice(&data, b"\r\n\r\n")
                .ok_or_else(|| anyhow!("connection closed mid-request"))?;
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(i) = find_subslice(&data, b"\r\n\r\n") {
            break i;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(anyhow!("request headers too large"));
        }
    };

    let header_text = String::from_utf8_lossy(&data[..headers_end]).to_string();
    let mut lines = header_text.split("\r\n");
    let request_line = lines.next().ok_or_else(|| anyhow!("empty request"))?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or_else(|| anyhow!("missing method"))?;
    let raw_path = parts.next().ok_or_else(|| anyhow!("missing path"))?;
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    let mut body = data[headers_end + 4..].to_vec();
    if let Some(length) = headers.get("content-length") {
        let length: usize = length
            .parse()
            .map_err(|_| anyhow!("invalid content-length"))?;
        if length > MAX_UPLOAD_BYTES {
            return Err(anyhow!("request body too large"));
        }
        while body.len() < length {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                return Err(anyhow!("connection closed mid-body"));
            }
            body.extend_from_slice(&buf[..n]);
        }
        body.truncate(length);
    }

    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Ok(HttpRequest {
        method: method.to_string(),
        path,
        headers,
        body,
    })
}

fn write_json_response(stream: &mut TcpStream, status: u16, body: &str) -> Result<()> {
    write_response(stream, status, "application/json", body.as_bytes())
}

fn write_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<()> {
    let status_line = match status {
        200 => "HTTP/1.1 200 OK",
        400 => "HTTP/1.1 400 Bad Request",
        404 => "HTTP/1.1 404 Not Found",
        405 => "HTTP/1.1 405 Method Not Allowed",
        413 => "HTTP/1.1 413 Payload Too Large",
        _ => "HTTP/1.1 500 Internal Server Error",
    };
    let header = format!(
        "{status_line}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\n\r\n",
        status_line = status_line,
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}
