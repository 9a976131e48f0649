//! Bounded blocking frame queue.
//!
//! Two instances of this queue (the worker inbox and outbox) are the only
//! shared mutable state between the pipeline coordinator and the worker
//! pool. The queue is the sole backpressure mechanism: `put` blocks while
//! the queue holds `capacity` items, `get` blocks while it is empty, and
//! nothing is ever silently dropped.
//!
//! FIFO order holds for any single producer/single consumer pair. With
//! several consumers attached (the worker pool), only the set of delivered
//! items is guaranteed; the coordinator's strict one-put/one-get pairing is
//! what preserves end-to-end frame order.

use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Fixed-capacity FIFO channel with blocking put/get semantics.
///
/// Cloning shares the same underlying channel. A `get` removes the item and
/// transfers ownership to the caller.
pub struct FrameQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> Clone for FrameQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
        }
    }
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `capacity` items. Capacity is fixed
    /// for the queue's lifetime; configuration validates `capacity >= 1`.
    pub fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity >= 1, "queue capacity must be >= 1");
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Enqueue an item, blocking while the queue is full.
    pub fn put(&self, item: T) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|_| anyhow!("queue disconnected: all consumers dropped"))
    }

    /// Dequeue the oldest item, blocking while the queue is empty.
    pub fn get(&self) -> Result<T> {
        self.rx
            .recv()
            .map_err(|_| anyhow!("queue disconnected: all producers dropped"))
    }

    /// Dequeue with a timeout. `Ok(None)` means the timeout elapsed with the
    /// queue still empty; workers use this to poll their stop flag.
    pub fn get_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(Some(item)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("queue disconnected: all producers dropped"))
            }
        }
    }

    /// Receiving endpoint for a consumer that must observe disconnection
    /// (workers exit when every producer handle is gone).
    pub(crate) fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    /// Sending endpoint for a producer that must not keep the receive side
    /// alive on its own.
    pub(crate) fn sender(&self) -> Sender<T> {
        self.tx.clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
