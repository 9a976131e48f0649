use std::sync::Arc;

use anyhow::Result;

use crate::frame::Frame;

/// Detector seam between the pipeline and whatever model runs inference.
///
/// The pipeline treats detection as an opaque mapping from a raw frame to an
/// annotated frame. Implementations may hold per-instance state (one
/// instance is created per worker, so a model load happens once per worker
/// at startup).
///
/// An `Err` from `annotate` degrades that single frame: the worker logs it
/// and reports a per-frame failure downstream. It never stops the pool.
pub trait Detector: Send {
    /// Backend identifier, used in worker logs.
    fn name(&self) -> &'static str;

    /// Map a raw frame to an annotated frame.
    fn annotate(&mut self, frame: Frame) -> Result<Frame>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

pub type BoxedDetector = Box<dyn Detector>;

/// Constructor invoked inside each worker thread at pool startup. A
/// construction failure aborts pipeline startup before any frame flows.
pub type DetectorFactory = Arc<dyn Fn() -> Result<BoxedDetector> + Send + Sync>;
