//! Shared bounded worker pool for candidate processing
//!
//! All pipelines dispatch their accepted candidates through one pool. A
//! semaphore bounds concurrent workers at `max_pool_size`; under the
//! `reject` overflow policy at most `queue_capacity` candidates may wait
//! for a permit, and anything beyond that fails with
//! [`Error::PoolSaturated`] — a candidate-scoped error that leaves the
//! rest of the tick untouched. Under `block` (the default) submission
//! simply waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{OverflowPolicy, WorkerPoolConfig};
use crate::error::{Error, Result};

/// Bounded worker pool shared by every pipeline
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    waiting: AtomicUsize,
    queue_capacity: usize,
    overflow: OverflowPolicy,
}

impl WorkerPool {
    /// Build the pool from the throughput configuration
    ///
    /// `max_pool_size` is the hard concurrency bound; `core_pool_size` has
    /// no separate runtime meaning on tokio and is kept as configuration
    /// surface only.
    pub fn new(config: &WorkerPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            permits: Arc::new(Semaphore::new(config.max_pool_size.max(1))),
            waiting: AtomicUsize::new(0),
            queue_capacity: config.queue_capacity.max(1),
            overflow: config.overflow,
        })
    }

    /// Acquire a worker permit for one candidate
    ///
    /// Blocks or rejects on saturation depending on the overflow policy.
    pub async fn acquire(&self, flow_id: &str) -> Result<OwnedSemaphorePermit> {
        match self.overflow {
            OverflowPolicy::Block => self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| Error::Other("worker pool closed".into())),
            OverflowPolicy::Reject => {
                if let Ok(permit) = self.permits.clone().try_acquire_owned() {
                    return Ok(permit);
                }
                let queued = self.waiting.fetch_add(1, Ordering::SeqCst);
                if queued >= self.queue_capacity {
                    self.waiting.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::PoolSaturated {
                        flow_id: flow_id.to_owned(),
                    });
                }
                let permit = self.permits.clone().acquire_owned().await;
                self.waiting.fetch_sub(1, Ordering::SeqCst);
                permit.map_err(|_| Error::Other("worker pool closed".into()))
            }
        }
    }
}
