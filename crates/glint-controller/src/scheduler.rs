use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use hashbrown::HashMap;

use futures_util::future::join_all;

use serde::Serialize;
use serde_json::Value;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::time::Instant;

use tracing::{debug, trace, warn};

use crate::config::SchedulerConfig;
use crate::error::Result;
use crate::lock;
use crate::transport::{DeviceRequest, Transport};

struct QueuedRequest {
    id: u64,
    request: DeviceRequest,
    enqueued_at: Instant,
    responder: oneshot::Sender<Result<Value>>,
}

impl QueuedRequest {
    async fn dispatch<T: Transport>(self, transport: &T) {
        let Self {
            id,
            request,
            enqueued_at,
            responder,
        } = self;

        trace!(
            "Dispatching request {id} to {} after {:?} in queue",
            request.url(),
            enqueued_at.elapsed()
        );

        let result = transport.send(&request).await;

        // The caller may have stopped waiting.
        if responder.send(result).is_err() {
            debug!("Request {id} settled after its caller went away");
        }
    }
}

struct DeviceQueue {
    requests: VecDeque<QueuedRequest>,
    // Set while a drain loop owns the queue.
    processing: bool,
    last_request: Instant,
}

impl DeviceQueue {
    fn new() -> Self {
        Self {
            requests: VecDeque::new(),
            processing: false,
            last_request: Instant::now(),
        }
    }
}

/// Statistics of a device queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Number of requests waiting to be dispatched.
    pub queue_length: usize,
    /// Whether a drain loop is running for the device.
    pub processing: bool,
    /// Time elapsed since the drain loop last became idle, or since the queue
    /// creation.
    pub time_since_last_request: Duration,
}

struct Inner<T> {
    transport: Arc<T>,
    config: SchedulerConfig,
    queues: Mutex<HashMap<String, DeviceQueue>>,
    next_id: AtomicU64,
}

impl<T: Transport> Inner<T> {
    // Removes the next batch from the head of the device queue.
    //
    // When the queue is empty, the processing flag is cleared under the same
    // lock which guards the enqueue operation, so a request is either taken
    // by this loop or starts a new one.
    fn next_batch(&self, device: &str) -> Option<Vec<QueuedRequest>> {
        let mut queues = lock(&self.queues);
        let queue = queues.get_mut(device)?;

        if queue.requests.is_empty() {
            queue.processing = false;
            queue.last_request = Instant::now();
            return None;
        }

        let size = queue.requests.len().min(self.config.max_concurrent_per_device);
        Some(queue.requests.drain(..size).collect())
    }

    fn has_pending(&self, device: &str) -> bool {
        lock(&self.queues)
            .get(device)
            .is_some_and(|queue| !queue.requests.is_empty())
    }

    async fn drain(self: Arc<Self>, device: String) {
        debug!("Draining the queue of {device}");

        let mut guard = DrainGuard {
            inner: Arc::clone(&self),
            device: device.clone(),
            finished: false,
        };

        while let Some(batch) = self.next_batch(&device) {
            trace!("Dispatching a batch of {} requests to {device}", batch.len());

            let transport = self.transport.as_ref();
            let _ = join_all(batch.into_iter().map(|request| request.dispatch(transport))).await;

            if self.has_pending(&device) {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        guard.finished = true;
        debug!("The queue of {device} is idle");
    }
}

// Releases a device queue whose drain loop stopped before the queue was
// empty, because a dispatch panicked or the task was aborted.
//
// The requests of the interrupted batch are settled with an error when their
// responders are dropped. The remaining requests are handed to a new loop.
struct DrainGuard<T: Transport> {
    inner: Arc<Inner<T>>,
    device: String,
    finished: bool,
}

impl<T: Transport> Drop for DrainGuard<T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let pending = {
            let mut queues = lock(&self.inner.queues);
            let Some(queue) = queues.get_mut(&self.device) else {
                return;
            };
            queue.last_request = Instant::now();
            queue.processing = !queue.requests.is_empty();
            queue.processing
        };

        warn!("The drain loop of {} stopped unexpectedly", self.device);

        if !pending {
            return;
        }

        match Handle::try_current() {
            Ok(runtime) => {
                drop(runtime.spawn(Arc::clone(&self.inner).drain(self.device.clone())));
            }
            Err(_) => {
                if let Some(queue) = lock(&self.inner.queues).get_mut(&self.device) {
                    queue.processing = false;
                }
            }
        }
    }
}

/// A per-device request scheduler.
///
/// Requests are queued per device key and dispatched by a drain loop, at
/// most one per device. The loop removes up to
/// `max_concurrent_per_device` requests from the head of the queue, sends
/// them concurrently, waits for all of them to settle and pauses before the
/// next batch if more requests are waiting.
///
/// Devices are independent of each other: their loops run concurrently.
///
/// The scheduler never retries a request. A failure is delivered to its
/// own caller only and never stops the loop.
pub struct Scheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Scheduler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> Scheduler<T> {
    /// Creates a [`Scheduler`] dispatching through the given [`Transport`].
    #[must_use]
    pub fn new(transport: Arc<T>, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                queues: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Queues a request for a device and waits for its response.
    ///
    /// The device queue is created if it does not exist, and its drain loop
    /// is started if it is not already running.
    ///
    /// This method must be called within a `tokio` runtime.
    ///
    /// # Errors
    ///
    /// The error produced by the [`Transport`] for this request, unchanged.
    pub async fn queue_request(
        &self,
        device: impl Into<String>,
        request: DeviceRequest,
    ) -> Result<Value> {
        let device = device.into();
        let (responder, receiver) = oneshot::channel();

        let queued = QueuedRequest {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            request,
            enqueued_at: Instant::now(),
            responder,
        };

        let start = {
            let mut queues = lock(&self.inner.queues);
            let queue = queues
                .entry(device.clone())
                .or_insert_with(DeviceQueue::new);
            queue.requests.push_back(queued);

            let start = !queue.processing;
            queue.processing = true;
            start
        };

        if start {
            drop(tokio::spawn(Arc::clone(&self.inner).drain(device)));
        }

        receiver.await?
    }

    /// Returns the [`QueueStats`] of every device.
    #[must_use]
    pub fn queue_stats(&self) -> HashMap<String, QueueStats> {
        lock(&self.inner.queues)
            .iter()
            .map(|(device, queue)| {
                (
                    device.clone(),
                    QueueStats {
                        queue_length: queue.requests.len(),
                        processing: queue.processing,
                        time_since_last_request: queue.last_request.elapsed(),
                    },
                )
            })
            .collect()
    }

    /// Evicts the queues which are empty and idle for longer than the stale
    /// threshold, returning how many have been evicted.
    pub fn cleanup(&self) -> usize {
        let threshold = self.inner.config.stale_threshold;
        let mut queues = lock(&self.inner.queues);

        let before = queues.len();
        queues.retain(|_, queue| {
            !queue.requests.is_empty()
                || queue.processing
                || queue.last_request.elapsed() <= threshold
        });
        let removed = before - queues.len();

        if removed > 0 {
            debug!("Evicted {removed} stale device queues");
        }
        removed
    }

    /// Returns the [`Transport`].
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.inner.transport
    }

    /// Returns the [`SchedulerConfig`].
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }
}
