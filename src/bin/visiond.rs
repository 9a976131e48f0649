//! visiond - run the detection pipeline once over a configured source.
//!
//! Reads frames from a device, file, or synthetic source, routes them
//! through the worker pool, and writes annotated output and/or publishes a
//! live preview. Exits when the source is exhausted, the frame limit is
//! reached, or Ctrl-C is pressed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use vision_pipeline::config::PipelineConfig;
use vision_pipeline::detect::{BoxedDetector, DetectorFactory, EdgeOverlayDetector};
use vision_pipeline::pipeline;

#[derive(Parser, Debug)]
#[command(name = "visiond", version, about = "Realtime object detection pipeline")]
struct Args {
    /// Input source: device index, file path, or stub://name?frames=K
    #[arg(long, env = "VISION_INPUT")]
    input: Option<String>,

    /// Write annotated video to this path (enables output)
    #[arg(long, env = "VISION_OUTPUT_PATH")]
    output: Option<PathBuf>,

    /// Publish annotated frames to the live preview
    #[arg(long)]
    display: bool,

    /// Preview consumers should render full screen
    #[arg(long)]
    fullscreen: bool,

    /// Number of detection workers
    #[arg(long, env = "VISION_WORKERS")]
    workers: Option<usize>,

    /// Frame queue capacity
    #[arg(long, env = "VISION_QUEUE_CAPACITY")]
    queue_size: Option<usize>,

    /// Stop after this many frames (0 = unbounded)
    #[arg(long, env = "VISION_FRAME_LIMIT")]
    num_frames: Option<i64>,

    /// Optional JSON config file; flags override its values
    #[arg(long, env = "VISION_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(input) = &args.input {
        config.input = input.parse()?;
    }
    if let Some(output) = &args.output {
        config.output = true;
        config.output_path = output.clone();
    }
    if args.display {
        config.display = true;
    }
    if args.fullscreen {
        config.fullscreen = true;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(queue_size) = args.queue_size {
        config.queue_capacity = queue_size;
    }
    if let Some(num_frames) = args.num_frames {
        config.frame_limit = num_frames;
    }
    if args.debug {
        config.debug = true;
    }

    let filter = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    config.validate()?;
    log::info!(
        "visiond starting: input={} workers={} queue={} output={}",
        config.input,
        config.workers,
        config.queue_capacity,
        config.output
    );
    if config.display {
        log::info!("press ctrl-c to stop");
    }

    let detectors: DetectorFactory =
        Arc::new(|| Ok(Box::new(EdgeOverlayDetector::new()) as BoxedDetector));
    let summary = pipeline::run(&config, detectors)?;

    log::info!(
        "done: {} frames read, {} sunk, {} failed, {:.1} fps",
        summary.frames_read,
        summary.frames_sunk,
        summary.frames_failed,
        summary.fps
    );
    Ok(())
}
