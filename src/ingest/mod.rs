//! Frame sources.
//!
//! Every source implements the narrow `VideoSource` capability: pull the
//! next frame, report exhaustion as `Ok(None)`. Opening happens at
//! construction, release on drop. Shipped backends:
//! - `stub://` deterministic synthetic frames (always available; tests,
//!   demos, and the streaming-camera harness run on it)
//! - local video files via FFmpeg (feature: ingest-file-ffmpeg)
//! - V4L2 devices (feature: ingest-v4l2)
//!
//! Exhaustion is not an error: for the pipeline it triggers draining, for
//! the streaming camera it triggers a transparent reopen.

mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod stub;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use file::FileSource;
pub use stub::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

use anyhow::{anyhow, Result};

use crate::config::SourceSpec;
use crate::frame::Frame;

/// Pull-based capture primitive.
pub trait VideoSource: Send {
    /// Pull the next frame. `Ok(None)` means the stream is exhausted; the
    /// call may be repeated and keeps returning `Ok(None)`.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Native frame geometry, used to open downstream writers.
    fn geometry(&self) -> (u32, u32);

    /// Nominal frame rate, used to open downstream writers.
    fn frame_rate(&self) -> u32;
}

/// Open the capture backend for a source spec. Failures here are fatal
/// startup errors; nothing downstream has been created yet.
pub fn open_source(spec: &SourceSpec) -> Result<Box<dyn VideoSource>> {
    match spec {
        SourceSpec::Stub(stub) => Ok(Box::new(SyntheticSource::new(stub.clone()))),
        SourceSpec::File(path) => Ok(Box::new(FileSource::open(path)?)),
        SourceSpec::Device(index) => open_device(*index),
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(index: u32) -> Result<Box<dyn VideoSource>> {
    Ok(Box::new(V4l2Source::open(&format!("/dev/video{}", index))?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(index: u32) -> Result<Box<dyn VideoSource>> {
    Err(anyhow!(
        "device capture for index {} requires the ingest-v4l2 feature",
        index
    ))
}
