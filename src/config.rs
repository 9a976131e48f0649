//! Run configuration.
//!
//! A `PipelineConfig` is constructed once per run (from a JSON file,
//! environment overrides, CLI flags, or the upload endpoint) and is
//! read-only for the pipeline's duration. There is no process-wide mutable
//! configuration state.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_OUTPUT_PATH: &str = "outputs/video.mp4";
const DEFAULT_INPUT: &str = "uploads/video.mp4";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_QUEUE_CAPACITY: usize = 5;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8750";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_OUTPUT_DIR: &str = "outputs";
const DEFAULT_CAMERA_SOURCE: &str = "outputs/video.mp4";
const DEFAULT_CAMERA_WIDTH: u32 = 400;
const DEFAULT_CAMERA_HEIGHT: u32 = 400;
const DEFAULT_PLACEHOLDER: &str = "outputs/placeholder.jpg";
const DEFAULT_JPEG_QUALITY: u8 = 85;

/// Where the pipeline or streaming camera pulls frames from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// Capture device index (e.g. "0" for /dev/video0).
    Device(u32),
    /// Local video file.
    File(PathBuf),
    /// Deterministic synthetic source, `stub://name?frames=K&width=W&height=H`.
    Stub(StubSpec),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubSpec {
    pub name: String,
    /// Number of frames before the source reports exhaustion; `None` is
    /// endless.
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
}

impl SourceSpec {
    /// A live device keeps producing frames until stopped; files and
    /// bounded stubs exhaust on their own.
    pub fn is_live_device(&self) -> bool {
        matches!(self, SourceSpec::Device(_))
            || matches!(self, SourceSpec::Stub(stub) if stub.frames.is_none())
    }
}

impl FromStr for SourceSpec {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(anyhow!("input source must not be empty"));
        }
        if let Some(rest) = value.strip_prefix("stub://") {
            return parse_stub(rest);
        }
        if value.chars().all(|c| c.is_ascii_digit()) {
            let index: u32 = value
                .parse()
                .map_err(|_| anyhow!("device index out of range: {}", value))?;
            return Ok(SourceSpec::Device(index));
        }
        if value.contains("://") {
            return Err(anyhow!(
                "only local inputs are supported (device index, file path, stub://)"
            ));
        }
        Ok(SourceSpec::File(PathBuf::from(value)))
    }
}

impl std::fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceSpec::Device(index) => write!(f, "{}", index),
            SourceSpec::File(path) => write!(f, "{}", path.display()),
            SourceSpec::Stub(stub) => {
                write!(f, "stub://{}?width={}&height={}", stub.name, stub.width, stub.height)?;
                if let Some(frames) = stub.frames {
                    write!(f, "&frames={}", frames)?;
                }
                Ok(())
            }
        }
    }
}

fn parse_stub(rest: &str) -> Result<SourceSpec> {
    let (name, query) = match rest.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (rest, None),
    };
    if name.is_empty() {
        return Err(anyhow!("stub source needs a name: stub://<name>"));
    }
    let mut stub = StubSpec {
        name: name.to_string(),
        frames: None,
        width: 640,
        height: 480,
    };
    if let Some(query) = query {
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(anyhow!("malformed stub parameter '{}'", pair));
            };
            match key {
                "frames" => stub.frames = Some(parse_stub_number(key, value)?),
                "width" => stub.width = parse_stub_number(key, value)? as u32,
                "height" => stub.height = parse_stub_number(key, value)? as u32,
                _ => return Err(anyhow!("unknown stub parameter '{}'", key)),
            }
        }
    }
    if stub.width == 0 || stub.height == 0 {
        return Err(anyhow!("stub geometry must be non-zero"));
    }
    Ok(SourceSpec::Stub(stub))
}

fn parse_stub_number(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' must be a number, got '{}'", key, value))
}

/// Configuration for one pipeline run. Read-only once validated.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Publish annotated frames to the live preview.
    pub display: bool,
    /// Write annotated frames to `output_path`.
    pub output: bool,
    pub output_path: PathBuf,
    pub input: SourceSpec,
    pub workers: usize,
    pub queue_capacity: usize,
    /// Frames to process before stopping; zero or negative is unbounded.
    pub frame_limit: i64,
    /// Hint for preview consumers; carried through, never interpreted here.
    pub fullscreen: bool,
    /// Lower the log filter to debug for this run.
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            display: false,
            output: false,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            input: SourceSpec::File(PathBuf::from(DEFAULT_INPUT)),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            frame_limit: 0,
            fullscreen: false,
            debug: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    display: Option<bool>,
    output: Option<bool>,
    output_path: Option<String>,
    input: Option<String>,
    workers: Option<usize>,
    queue_capacity: Option<usize>,
    frame_limit: Option<i64>,
    fullscreen: Option<bool>,
    debug: Option<bool>,
}

impl PipelineConfig {
    /// Load from an optional JSON file (`VISION_CONFIG`), then apply
    /// environment overrides, then validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            display: file.display.unwrap_or(defaults.display),
            output: file.output.unwrap_or(defaults.output),
            output_path: file
                .output_path
                .map(PathBuf::from)
                .unwrap_or(defaults.output_path),
            input: match file.input {
                Some(input) => input.parse()?,
                None => defaults.input,
            },
            workers: file.workers.unwrap_or(defaults.workers),
            queue_capacity: file.queue_capacity.unwrap_or(defaults.queue_capacity),
            frame_limit: file.frame_limit.unwrap_or(defaults.frame_limit),
            fullscreen: file.fullscreen.unwrap_or(defaults.fullscreen),
            debug: file.debug.unwrap_or(defaults.debug),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(input) = std::env::var("VISION_INPUT") {
            if !input.trim().is_empty() {
                self.input = input.parse()?;
            }
        }
        if let Ok(path) = std::env::var("VISION_OUTPUT_PATH") {
            if !path.trim().is_empty() {
                self.output_path = PathBuf::from(path);
                self.output = true;
            }
        }
        if let Ok(workers) = std::env::var("VISION_WORKERS") {
            self.workers = workers
                .parse()
                .map_err(|_| anyhow!("VISION_WORKERS must be an integer"))?;
        }
        if let Ok(capacity) = std::env::var("VISION_QUEUE_CAPACITY") {
            self.queue_capacity = capacity
                .parse()
                .map_err(|_| anyhow!("VISION_QUEUE_CAPACITY must be an integer"))?;
        }
        if let Ok(limit) = std::env::var("VISION_FRAME_LIMIT") {
            self.frame_limit = limit
                .parse()
                .map_err(|_| anyhow!("VISION_FRAME_LIMIT must be an integer"))?;
        }
        Ok(())
    }

    /// Enforce the configuration invariants. A violation here is a fatal
    /// startup failure; nothing has been opened or spawned yet.
    pub fn validate(&mut self) -> Result<()> {
        if self.workers < 1 {
            return Err(anyhow!("worker count must be >= 1"));
        }
        if self.queue_capacity < 1 {
            return Err(anyhow!("queue capacity must be >= 1"));
        }
        if self.output && self.output_path.as_os_str().is_empty() {
            return Err(anyhow!("output enabled but output path is empty"));
        }
        // A headless unbounded run on a live device would never terminate;
        // turn the preview on so the quit signal applies.
        if !self.display && self.frame_limit <= 0 && self.input.is_live_device() {
            log::info!("display off with no frame limit on a live source; enabling display");
            self.display = true;
        }
        Ok(())
    }

    pub fn unbounded(&self) -> bool {
        self.frame_limit <= 0
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Streaming camera settings shared by the HTTP service and tests.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    pub source: SourceSpec,
    /// Fixed output geometry for perspective-corrected frames.
    pub width: u32,
    pub height: u32,
    /// Pre-existing image served verbatim when the stream is exhausted.
    pub placeholder_path: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: SourceSpec::File(PathBuf::from(DEFAULT_CAMERA_SOURCE)),
            width: DEFAULT_CAMERA_WIDTH,
            height: DEFAULT_CAMERA_HEIGHT,
            placeholder_path: PathBuf::from(DEFAULT_PLACEHOLDER),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Configuration for the HTTP service.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub addr: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub camera: CameraSettings,
    /// Worker count and queue capacity for pipeline runs started by the
    /// upload endpoint.
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_API_ADDR.to_string(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            camera: CameraSettings::default(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
