//! Annotated-frame sinks.
//!
//! The coordinator forwards each annotated frame to at most two sinks: a
//! `VideoWriter` persisting to a media file and a `PreviewPublisher`
//! exposing the latest frame as JPEG for live viewing. Both are optional
//! and both are opened during pipeline INIT, where failures are fatal.
//!
//! Frames whose geometry differs from the writer's configured geometry are
//! nearest-neighbor resized to match; the first mismatch is logged.

#[cfg(feature = "output-ffmpeg")]
pub(crate) mod ffmpeg;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::frame::Frame;

/// Persistent video output opened for one pipeline run.
pub trait VideoWriter: Send {
    /// Append one frame. Implementations apply the resize-to-match policy.
    fn write(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the output. Idempotent.
    fn finish(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;
}

/// Geometry and target for a writer, taken from the source at INIT.
#[derive(Clone, Debug)]
pub struct WriterConfig {
    pub path: PathBuf,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

/// Open the configured writer backend. `null://` discards frames while
/// still counting them (demos and stub-driven runs); anything else needs
/// the FFmpeg encoder.
pub fn open_writer(config: &WriterConfig) -> Result<Box<dyn VideoWriter>> {
    if config.width == 0 || config.height == 0 {
        return Err(anyhow!("writer geometry must be non-zero"));
    }
    if config.path.to_string_lossy() == "null://" {
        return Ok(Box::new(MemoryWriter::discarding(
            config.width,
            config.height,
        )));
    }

    #[cfg(feature = "output-ffmpeg")]
    {
        Ok(Box::new(ffmpeg::FfmpegWriter::open(config)?))
    }
    #[cfg(not(feature = "output-ffmpeg"))]
    {
        Err(anyhow!(
            "writing '{}' requires the output-ffmpeg feature",
            config.path.display()
        ))
    }
}

/// Resize-to-match policy shared by all writers.
fn conform_geometry(frame: &Frame, width: u32, height: u32, warned: &mut bool) -> Frame {
    if frame.width == width && frame.height == height {
        return frame.clone();
    }
    if !*warned {
        log::warn!(
            "resizing {}x{} frames to configured writer geometry {}x{}",
            frame.width,
            frame.height,
            width,
            height
        );
        *warned = true;
    }
    frame.resized_nearest(width, height)
}

// ----------------------------------------------------------------------------
// In-memory writer
// ----------------------------------------------------------------------------

/// Writer that keeps (or just counts) frames in memory. Backs the `null://`
/// output target and the pipeline tests.
pub struct MemoryWriter {
    width: u32,
    height: u32,
    store: bool,
    warned_resize: bool,
    finished: bool,
    frames: Arc<Mutex<Vec<Frame>>>,
    written: u64,
}

impl MemoryWriter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            store: true,
            warned_resize: false,
            finished: false,
            frames: Arc::new(Mutex::new(Vec::new())),
            written: 0,
        }
    }

    /// Counting-only variant; frame payloads are dropped after the resize
    /// policy runs.
    pub fn discarding(width: u32, height: u32) -> Self {
        Self {
            store: false,
            ..Self::new(width, height)
        }
    }

    /// Shared view of stored frames, usable after the writer itself has
    /// been moved into the pipeline.
    pub fn frames_handle(&self) -> Arc<Mutex<Vec<Frame>>> {
        self.frames.clone()
    }
}

impl VideoWriter for MemoryWriter {
    fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.finished {
            return Err(anyhow!("write after finish"));
        }
        let frame = conform_geometry(frame, self.width, self.height, &mut self.warned_resize);
        if self.store {
            self.frames
                .lock()
                .map_err(|_| anyhow!("memory writer poisoned"))?
                .push(frame);
        }
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

// ----------------------------------------------------------------------------
// Live preview
// ----------------------------------------------------------------------------

/// Latest annotated frame, encoded for immediate serving.
#[derive(Clone, Debug)]
pub struct PreviewFrame {
    pub jpeg: Vec<u8>,
    pub frame_number: u64,
    /// Consumer hint carried from the run configuration.
    pub fullscreen: bool,
}

type SharedPreview = Arc<Mutex<Option<PreviewFrame>>>;

/// Publishes the latest annotated frame for live consumers. This is the
/// display surface of a headless deployment: the HTTP layer serves whatever
/// was published last.
pub struct PreviewPublisher {
    shared: SharedPreview,
    jpeg_quality: u8,
    fullscreen: bool,
}

impl PreviewPublisher {
    pub fn new(jpeg_quality: u8, fullscreen: bool) -> Self {
        Self {
            shared: Arc::new(Mutex::new(None)),
            jpeg_quality,
            fullscreen,
        }
    }

    pub fn publish(&self, frame: &Frame, frame_number: u64) -> Result<()> {
        let jpeg = frame.encode_jpeg(self.jpeg_quality)?;
        let mut guard = self
            .shared
            .lock()
            .map_err(|_| anyhow!("preview state poisoned"))?;
        *guard = Some(PreviewFrame {
            jpeg,
            frame_number,
            fullscreen: self.fullscreen,
        });
        Ok(())
    }

    /// Read-side handle for servers; outlives the publisher.
    pub fn handle(&self) -> PreviewHandle {
        PreviewHandle {
            shared: self.shared.clone(),
        }
    }
}

#[derive(Clone)]
pub struct PreviewHandle {
    shared: SharedPreview,
}

impl PreviewHandle {
    pub fn latest(&self) -> Option<PreviewFrame> {
        self.shared.lock().ok().and_then(|guard| guard.clone())
    }
}
