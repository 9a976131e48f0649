//! Realtime object detection pipeline.
//!
//! This crate moves video frames from capture to annotated output under
//! bounded memory and explicit termination rules.
//!
//! # Architecture
//!
//! The core is a producer / worker-pool / consumer pipeline:
//!
//! ```text
//! source -> inbox -> [worker 1..N] -> outbox -> coordinator -> sinks
//! ```
//!
//! - Two bounded queues (inbox/outbox) are the only shared state between
//!   the coordinator and the workers, and the only backpressure mechanism.
//! - The coordinator issues one `put` and one blocking `get` per frame,
//!   which bounds in-flight frames by queue capacity and preserves
//!   end-to-end frame order.
//! - A detection failure degrades exactly one frame; resource failures at
//!   startup abort the run before any worker is spawned.
//!
//! Alongside the pipeline, [`camera::StreamingCamera`] serves single JPEG
//! frames to pull-based consumers with optional perspective correction and
//! transparent restart-on-exhaustion, and [`api::ApiServer`] exposes both
//! over HTTP (MJPEG feed, upload-and-process, live preview).
//!
//! # Module Structure
//!
//! - `frame`: the opaque pixel payload moved between stages
//! - `queue`: bounded blocking frame queue
//! - `ingest`: capture sources (synthetic, file, V4L2)
//! - `detect`: detector seam and shipped backend
//! - `pipeline`: coordinator and worker pool
//! - `sink`: video writers and the live preview publisher
//! - `camera`: on-demand streaming camera
//! - `transform`: homography solve and perspective warp
//! - `api`: HTTP service
//! - `config`: run configuration

pub mod api;
pub mod camera;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod queue;
pub mod sink;
pub mod transform;

pub use camera::StreamingCamera;
pub use config::{ApiConfig, CameraSettings, PipelineConfig, SourceSpec, StubSpec};
pub use detect::{BoxedDetector, Detector, DetectorFactory, EdgeOverlayDetector};
pub use frame::{Frame, PixelFormat};
pub use ingest::{open_source, SyntheticSource, VideoSource};
pub use pipeline::{quit_signal, run, run_with_parts, PipelineState, RunSummary};
pub use queue::FrameQueue;
pub use sink::{
    open_writer, MemoryWriter, PreviewFrame, PreviewHandle, PreviewPublisher, VideoWriter,
    WriterConfig,
};
pub use transform::{warp_perspective, Homography, Point};
