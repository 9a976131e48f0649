//! Detection worker pool.
//!
//! N independent workers, each owning its own detector instance, loop:
//! pull a raw frame from the inbox, run detection, push the outcome to the
//! outbox. Workers share nothing with each other; the queues are the only
//! state shared with the coordinator.
//!
//! A detection error degrades that single frame: the worker logs it and
//! pushes a failure outcome so the coordinator's one-put/one-get pairing
//! still sees exactly one outbox item per inbox item. The pool never stops
//! for a per-frame error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::detect::DetectorFactory;
use crate::frame::Frame;
use crate::queue::FrameQueue;

/// How often a blocked worker re-checks the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Per-frame result leaving the pool. Exactly one outcome is produced for
/// every frame pulled from the inbox.
#[derive(Debug)]
pub enum DetectOutcome {
    Annotated(Frame),
    /// The frame was lost to a detection error on the given worker.
    Failed { worker: usize },
}

/// Handle over the running workers.
///
/// Two distinct shutdown paths exist:
/// - [`WorkerPool::terminate`] - hard stop. Workers are told to stop
///   regardless of in-flight work; frames still queued or mid-detection are
///   discarded. This is the coordinator's shutdown path.
/// - [`WorkerPool::join`] - drain-then-stop. Callers that have dropped
///   every inbox producer wait here for the workers to finish the backlog
///   and exit on their own.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// True while at least one worker thread is still running.
    pub fn any_alive(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Hard stop: interrupt all workers and wait for them to exit. Frames
    /// mid-flight are lost; that loss is logged here, never masked.
    pub fn terminate(self) {
        self.stop.store(true, Ordering::SeqCst);
        let workers = self.handles.len();
        for handle in self.handles {
            let _ = handle.join();
        }
        log::info!(
            "worker pool hard stop: {} workers terminated, in-flight frames discarded",
            workers
        );
    }

    /// Drain-then-stop: wait for workers to exit after the inbox
    /// disconnects empty. The caller must have dropped every inbox producer
    /// first, or this blocks indefinitely.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

/// Spawn `count` workers. Each worker constructs its own detector via
/// `factory` at startup; any construction failure tears the pool down and
/// fails the spawn, before a single frame has flowed.
pub fn spawn_worker_pool(
    count: usize,
    factory: DetectorFactory,
    inbox: &FrameQueue<Frame>,
    outbox: &FrameQueue<DetectOutcome>,
) -> Result<WorkerPool> {
    let stop = Arc::new(AtomicBool::new(false));
    let (init_tx, init_rx) = crossbeam_channel::bounded::<Result<String, String>>(count);

    let mut handles = Vec::with_capacity(count);
    for worker_index in 0..count {
        let factory = factory.clone();
        let inbox_rx = inbox.receiver();
        let outbox_tx = outbox.sender();
        let stop = stop.clone();
        let init_tx = init_tx.clone();
        let handle = thread::Builder::new()
            .name(format!("detect-worker-{}", worker_index))
            .spawn(move || {
                worker_main(worker_index, factory, inbox_rx, outbox_tx, stop, init_tx)
            })
            .map_err(|e| anyhow!("failed to spawn worker thread: {}", e))?;
        handles.push(handle);
    }
    drop(init_tx);

    let pool = WorkerPool { handles, stop };
    for _ in 0..count {
        match init_rx.recv() {
            Ok(Ok(message)) => log::debug!("{}", message),
            Ok(Err(message)) => {
                pool.terminate();
                return Err(anyhow!("detector startup failed: {}", message));
            }
            Err(_) => {
                pool.terminate();
                return Err(anyhow!("worker exited before reporting detector startup"));
            }
        }
    }

    Ok(pool)
}

fn worker_main(
    worker_index: usize,
    factory: DetectorFactory,
    inbox_rx: Receiver<Frame>,
    outbox_tx: Sender<DetectOutcome>,
    stop: Arc<AtomicBool>,
    init_tx: Sender<Result<String, String>>,
) {
    let mut detector = match factory().and_then(|mut detector| {
        detector.warm_up()?;
        Ok(detector)
    }) {
        Ok(detector) => {
            let message = format!(
                "worker #{}: detector '{}' ready",
                worker_index,
                detector.name()
            );
            if init_tx.send(Ok(message)).is_err() {
                return;
            }
            detector
        }
        Err(err) => {
            let _ = init_tx.send(Err(format!("worker #{}: {}", worker_index, err)));
            return;
        }
    };
    drop(init_tx);

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let frame = match inbox_rx.recv_timeout(STOP_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let outcome = match detector.annotate(frame) {
            Ok(annotated) => DetectOutcome::Annotated(annotated),
            Err(err) => {
                log::warn!("worker #{}: frame dropped: {}", worker_index, err);
                DetectOutcome::Failed {
                    worker: worker_index,
                }
            }
        };

        if outbox_tx.send(outcome).is_err() {
            // Coordinator gone; nothing left to do.
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoxedDetector, Detector};
    use std::sync::atomic::AtomicUsize;

    struct PassThrough;

    impl Detector for PassThrough {
        fn name(&self) -> &'static str {
            "pass-through"
        }

        fn annotate(&mut self, frame: Frame) -> Result<Frame> {
            Ok(frame)
        }
    }

    fn frame(tag: u8) -> Frame {
        Frame::rgb24(vec![tag; 4 * 4 * 3], 4, 4).unwrap()
    }

    #[test]
    fn pool_processes_frames_from_inbox_to_outbox() {
        let inbox = FrameQueue::with_capacity(4);
        let outbox = FrameQueue::with_capacity(4);
        let factory: DetectorFactory =
            Arc::new(|| Ok(Box::new(PassThrough) as BoxedDetector));
        let pool = spawn_worker_pool(2, factory, &inbox, &outbox).unwrap();

        for i in 0..8 {
            inbox.put(frame(i)).unwrap();
            let outcome = outbox.get().unwrap();
            assert!(matches!(outcome, DetectOutcome::Annotated(_)));
        }

        pool.terminate();
    }

    #[test]
    fn detector_init_failure_fails_the_spawn() {
        let inbox: FrameQueue<Frame> = FrameQueue::with_capacity(2);
        let outbox = FrameQueue::with_capacity(2);
        let factory: DetectorFactory = Arc::new(|| Err(anyhow!("model missing")));
        let err = spawn_worker_pool(2, factory, &inbox, &outbox)
            .err()
            .expect("spawn must fail");
        assert!(err.to_string().contains("detector startup failed"));
    }

    #[test]
    fn detection_failure_yields_failure_outcome_and_pool_survives() {
        struct FailOnMarker;
        impl Detector for FailOnMarker {
            fn name(&self) -> &'static str {
                "fail-on-marker"
            }
            fn annotate(&mut self, frame: Frame) -> Result<Frame> {
                if frame.data[0] == 0xEE {
                    Err(anyhow!("injected failure"))
                } else {
                    Ok(frame)
                }
            }
        }

        let inbox = FrameQueue::with_capacity(2);
        let outbox = FrameQueue::with_capacity(2);
        let factory: DetectorFactory =
            Arc::new(|| Ok(Box::new(FailOnMarker) as BoxedDetector));
        let pool = spawn_worker_pool(1, factory, &inbox, &outbox).unwrap();

        inbox.put(frame(0xEE)).unwrap();
        assert!(matches!(
            outbox.get().unwrap(),
            DetectOutcome::Failed { worker: 0 }
        ));

        inbox.put(frame(1)).unwrap();
        assert!(matches!(
            outbox.get().unwrap(),
            DetectOutcome::Annotated(_)
        ));

        pool.terminate();
    }

    #[test]
    fn terminate_stops_workers_promptly() {
        let inbox: FrameQueue<Frame> = FrameQueue::with_capacity(2);
        let outbox = FrameQueue::with_capacity(2);
        let counter = Arc::new(AtomicUsize::new(0));

        struct Counting(Arc<AtomicUsize>);
        impl Detector for Counting {
            fn name(&self) -> &'static str {
                "counting"
            }
            fn annotate(&mut self, frame: Frame) -> Result<Frame> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(frame)
            }
        }

        let factory: DetectorFactory = {
            let counter = counter.clone();
            Arc::new(move || Ok(Box::new(Counting(counter.clone())) as BoxedDetector))
        };
        let pool = spawn_worker_pool(3, factory, &inbox, &outbox).unwrap();
        assert!(pool.any_alive());
        pool.terminate();
    }
}
