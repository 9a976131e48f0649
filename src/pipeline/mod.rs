//! Pipeline coordinator.
//!
//! Drives capture into the worker inbox, drains the outbox into the sinks,
//! and enforces termination and shutdown. The coordinator runs on the
//! calling thread and is the only producer to the inbox and the only
//! consumer of the outbox.
//!
//! State machine: INIT -> RUNNING -> DRAINING -> STOPPED. Stopping is a
//! one-way transition; a new run builds a new pipeline.
//!
//! Each RUNNING iteration issues exactly one `put` to the inbox followed by
//! one blocking `get` from the outbox. That strict pairing bounds in-flight
//! frames by queue capacity (not worker count) and preserves end-to-end
//! frame order, since no worker can ever pull more than one frame ahead.
//! Decoupling the put/get cadence would break both properties.

pub mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use crate::config::PipelineConfig;
use crate::detect::DetectorFactory;
use crate::frame::Frame;
use crate::ingest::{self, VideoSource};
use crate::queue::FrameQueue;
use crate::sink::{self, PreviewPublisher, VideoWriter, WriterConfig};
use worker::{spawn_worker_pool, DetectOutcome};

const PREVIEW_JPEG_QUALITY: u8 = 85;
/// How often a stalled outbox read re-checks worker liveness.
const STALL_POLL: Duration = Duration::from_millis(100);

/// Coordinator states, logged at each transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Running,
    Draining,
    Stopped,
}

/// Throughput and accounting for one completed run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Frames pulled from the source.
    pub frames_read: u64,
    /// Annotated frames forwarded to the sinks.
    pub frames_sunk: u64,
    /// Frames lost to isolated detection failures.
    pub frames_failed: u64,
    pub elapsed: Duration,
    pub fps: f64,
}

/// Wall-clock frame-rate counter, started at INIT and reported at DRAINING.
struct FpsCounter {
    started: Instant,
    frames: u64,
}

impl FpsCounter {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            frames: 0,
        }
    }

    fn update(&mut self) {
        self.frames += 1;
    }

    fn stop(self) -> (Duration, f64) {
        let elapsed = self.started.elapsed();
        let fps = if elapsed.as_secs_f64() > 0.0 {
            self.frames as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        (elapsed, fps)
    }
}

/// Process-wide quit flag raised by Ctrl-C. The handler is installed once;
/// later calls return the same flag.
pub fn quit_signal() -> Arc<AtomicBool> {
    static QUIT: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    QUIT.get_or_init(|| {
        let flag = Arc::new(AtomicBool::new(false));
        let handler_flag = flag.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            handler_flag.store(true, Ordering::SeqCst);
        }) {
            log::warn!("failed to install ctrl-c handler: {}", err);
        }
        flag
    })
    .clone()
}

/// Open every resource named by the config and run the pipeline to
/// completion. This is the INIT phase: any failure here aborts the run
/// before a single worker is spawned or frame is read.
pub fn run(config: &PipelineConfig, detectors: DetectorFactory) -> Result<RunSummary> {
    let mut config = config.clone();
    config.validate()?;

    let source = ingest::open_source(&config.input)?;
    let writer = if config.output {
        let (width, height) = source.geometry();
        Some(sink::open_writer(&WriterConfig {
            path: config.output_path.clone(),
            frame_rate: source.frame_rate(),
            width,
            height,
        })?)
    } else {
        None
    };
    let preview = if config.display {
        Some(PreviewPublisher::new(PREVIEW_JPEG_QUALITY, config.fullscreen))
    } else {
        None
    };

    run_with_parts(
        &config,
        detectors,
        source,
        writer,
        preview.as_ref(),
        quit_signal(),
    )
}

/// Run the pipeline over already-opened parts. The config must be
/// validated. Tests inject deterministic sources, writers, and quit flags
/// here; [`run`] resolves them from the config.
pub fn run_with_parts(
    config: &PipelineConfig,
    detectors: DetectorFactory,
    mut source: Box<dyn VideoSource>,
    mut writer: Option<Box<dyn VideoWriter>>,
    preview: Option<&PreviewPublisher>,
    quit: Arc<AtomicBool>,
) -> Result<RunSummary> {
    // INIT: queues and workers; queue capacity bounds total in-flight
    // frames for the whole run.
    log::debug!("pipeline: {:?} -> {:?}", PipelineState::Init, PipelineState::Running);
    let inbox: FrameQueue<Frame> = FrameQueue::with_capacity(config.queue_capacity);
    let outbox: FrameQueue<DetectOutcome> = FrameQueue::with_capacity(config.queue_capacity);
    let pool = spawn_worker_pool(config.workers, detectors, &inbox, &outbox)?;
    let mut fps = FpsCounter::start();

    let mut frames_read: u64 = 0;
    let mut frames_sunk: u64 = 0;
    let mut frames_failed: u64 = 0;
    let mut run_error: Option<anyhow::Error> = None;

    // RUNNING: one put, one get, one forward per iteration.
    loop {
        if config.display && quit.load(Ordering::SeqCst) {
            log::info!("quit signal observed, stopping pipeline");
            break;
        }

        let frame = match source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => break, // source exhausted: normal termination
            Err(err) => {
                run_error = Some(err.context("frame capture failed"));
                break;
            }
        };
        frames_read += 1;

        if let Err(err) = inbox.put(frame) {
            run_error = Some(err);
            break;
        }
        let outcome = match wait_for_outcome(&outbox, &pool) {
            Ok(outcome) => outcome,
            Err(err) => {
                run_error = Some(err);
                break;
            }
        };

        match outcome {
            DetectOutcome::Annotated(annotated) => {
                if let Some(writer) = writer.as_mut() {
                    if let Err(err) = writer.write(&annotated) {
                        run_error = Some(err.context("sink write failed"));
                        break;
                    }
                }
                if let Some(preview) = preview {
                    if let Err(err) = preview.publish(&annotated, frames_read) {
                        run_error = Some(err.context("preview publish failed"));
                        break;
                    }
                }
                frames_sunk += 1;
                fps.update();
            }
            DetectOutcome::Failed { .. } => {
                frames_failed += 1;
            }
        }

        if !config.display && !config.unbounded() && frames_read >= config.frame_limit as u64 {
            break;
        }
    }

    // DRAINING -> STOPPED: report throughput, hard-stop the pool, release
    // the source, close the writer.
    log::debug!("pipeline: {:?} -> {:?}", PipelineState::Running, PipelineState::Draining);
    let (elapsed, fps) = fps.stop();
    log::info!(
        "pipeline stopping: {} read, {} sunk, {} failed in {:.2}s ({:.1} fps)",
        frames_read,
        frames_sunk,
        frames_failed,
        elapsed.as_secs_f64(),
        fps
    );
    pool.terminate();
    drop(source);
    if let Some(writer) = writer.as_mut() {
        writer.finish()?;
    }
    log::debug!("pipeline: {:?} -> {:?}", PipelineState::Draining, PipelineState::Stopped);

    if let Some(err) = run_error {
        return Err(err);
    }

    Ok(RunSummary {
        frames_read,
        frames_sunk,
        frames_failed,
        elapsed,
        fps,
    })
}

/// Blocking outbox read that still notices a dead pool. This is not a
/// per-frame detection timeout: the wait continues for as long as any
/// worker is alive.
fn wait_for_outcome(
    outbox: &FrameQueue<DetectOutcome>,
    pool: &worker::WorkerPool,
) -> Result<DetectOutcome> {
    loop {
        if let Some(outcome) = outbox.get_timeout(STALL_POLL)? {
            return Ok(outcome);
        }
        if !pool.any_alive() {
            return Err(anyhow!("all detection workers terminated unexpectedly"));
        }
    }
}
