//! vision_api - HTTP streaming and upload service.
//!
//! Serves the on-demand MJPEG feed from the streaming camera and accepts
//! video uploads that are run through the detection pipeline synchronously.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use vision_pipeline::api::ApiServer;
use vision_pipeline::config::ApiConfig;
use vision_pipeline::detect::{BoxedDetector, DetectorFactory, EdgeOverlayDetector};
use vision_pipeline::pipeline;

#[derive(Parser, Debug)]
#[command(name = "vision_api", version, about = "HTTP streaming and upload service")]
struct Args {
    /// Listen address
    #[arg(long, env = "VISION_API_ADDR", default_value = "127.0.0.1:8750")]
    addr: String,

    /// Source for the streaming camera (file path, device index, stub://)
    #[arg(long, env = "VISION_CAMERA_SOURCE")]
    camera_source: Option<String>,

    /// Placeholder image served while an exhausted stream reopens
    #[arg(long, env = "VISION_PLACEHOLDER")]
    placeholder: Option<PathBuf>,

    /// Directory for uploaded videos
    #[arg(long, env = "VISION_UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// Directory for annotated output videos
    #[arg(long, env = "VISION_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Detection workers for upload-triggered pipeline runs
    #[arg(long, env = "VISION_WORKERS")]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let mut cfg = ApiConfig {
        addr: args.addr,
        ..ApiConfig::default()
    };
    if let Some(source) = &args.camera_source {
        cfg.camera.source = source.parse()?;
    }
    if let Some(placeholder) = args.placeholder {
        cfg.camera.placeholder_path = placeholder;
    }
    if let Some(upload_dir) = args.upload_dir {
        cfg.upload_dir = upload_dir;
    }
    if let Some(output_dir) = args.output_dir {
        cfg.output_dir = output_dir;
    }
    if let Some(workers) = args.workers {
        cfg.workers = workers;
    }

    let detectors: DetectorFactory =
        Arc::new(|| Ok(Box::new(EdgeOverlayDetector::new()) as BoxedDetector));
    let handle = ApiServer::new(cfg, detectors).spawn()?;
    log::info!("vision_api serving on {} - press ctrl-c to stop", handle.addr);

    let quit = pipeline::quit_signal();
    while !quit.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }

    handle.stop()?;
    log::info!("vision_api stopped");
    Ok(())
}
