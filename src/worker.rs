//! Serialized worker: one FIFO, at most one drain loop.
//!
//! Submitters push onto a lock-free queue and race a compare-and-set on the
//! `active` flag. The winner spawns the drain loop; everyone else relies on
//! the running loop to pick their item up. When the loop finds the queue
//! empty it clears the flag and looks again, so an item pushed during
//! deactivation is never stranded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering, fence};
use std::task::{Context, Poll};
use std::time::Instant;

use crossbeam_queue::SegQueue;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{Instrument, debug, warn};
use uuid::Uuid;

use crate::error::Failure;
use crate::outcome::WorkerResult;
use crate::processor::Processor;
use crate::telemetry::{metrics, work};

/// Callback a worker runs after its loop deactivates on an empty queue.
pub type IdleHook = Arc<dyn Fn() + Send + Sync>;

/// Newtype for worker identities. Only used for logging and spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

struct Job<I, O> {
    input: I,
    completion: Option<oneshot::Sender<WorkerResult<O>>>,
}

struct Shared<I, O> {
    id: WorkerId,
    partition: Option<String>,
    queue: SegQueue<Job<I, O>>,
    active: AtomicBool,
    processor: Arc<dyn Processor<I, O>>,
}

/// Processes submitted items strictly one at a time, in submission order.
///
/// Cloning is cheap and clones share the same queue. Submissions must happen
/// inside a Tokio runtime, since the drain loop is spawned with
/// [`tokio::spawn`].
pub struct Worker<I, O> {
    shared: Arc<Shared<I, O>>,
}

impl<I, O> Clone for Worker<I, O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<I, O> std::fmt::Debug for Worker<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.shared.id)
            .field("partition", &self.shared.partition)
            .field("pending", &self.shared.queue.len())
            .field("active", &self.shared.active.load(Ordering::SeqCst))
            .finish()
    }
}

impl<I, O> Worker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Create a worker around an async processing function.
    pub fn new<F, Fut>(process: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        Self::from_processor(Arc::new(process))
    }

    /// Create a worker around an already-shared processing capability.
    pub fn from_processor(processor: Arc<dyn Processor<I, O>>) -> Self {
        Self::build(processor, None)
    }

    pub(crate) fn for_partition(processor: Arc<dyn Processor<I, O>>, key: &str) -> Self {
        Self::build(processor, Some(key.to_string()))
    }

    fn build(processor: Arc<dyn Processor<I, O>>, partition: Option<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: WorkerId::new(),
                partition,
                queue: SegQueue::new(),
                active: AtomicBool::new(false),
                processor,
            }),
        }
    }

    pub fn id(&self) -> WorkerId {
        self.shared.id
    }

    /// Enqueue an item and return immediately. The outcome is discarded.
    pub fn submit(&self, item: I, on_idle: Option<IdleHook>) {
        metrics::items_submitted().add(1, &[KeyValue::new("mode", "fire_and_forget")]);
        self.shared.push(Job {
            input: item,
            completion: None,
        });
        Shared::try_start(&self.shared, on_idle);
    }

    /// Enqueue an item and return a handle that resolves with its outcome.
    pub fn submit_and_await(&self, item: I, on_idle: Option<IdleHook>) -> Completion<O> {
        metrics::items_submitted().add(1, &[KeyValue::new("mode", "await")]);
        let (tx, rx) = oneshot::channel();
        self.shared.push(Job {
            input: item,
            completion: Some(tx),
        });
        Shared::try_start(&self.shared, on_idle);
        Completion { rx }
    }

    /// True while an item is queued or a drain loop holds the active flag.
    pub fn has_pending_or_active_work(&self) -> bool {
        self.shared.has_pending_or_active_work()
    }

    /// Number of items waiting in the queue (excludes the one in flight).
    pub fn pending_len(&self) -> usize {
        self.shared.queue.len()
    }

    pub(crate) fn same_as(&self, other: &Worker<I, O>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<I, O> Shared<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    fn push(&self, job: Job<I, O>) {
        self.queue.push(job);
        // Pairs with the fence in `drain` after the flag is cleared.
        fence(Ordering::SeqCst);
    }

    fn has_pending_or_active_work(&self) -> bool {
        !self.queue.is_empty() || self.active.load(Ordering::SeqCst)
    }

    fn acquire(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn try_start(this: &Arc<Self>, on_idle: Option<IdleHook>) {
        if !this.acquire() {
            return;
        }
        let span = work::start_drain_span(this.id, this.partition.as_deref());
        let shared = Arc::clone(this);
        tokio::spawn(
            async move {
                shared.drain(on_idle).await;
            }
            .instrument(span),
        );
    }

    async fn drain(self: Arc<Self>, on_idle: Option<IdleHook>) {
        debug!("drain loop started");
        let mut processed: u64 = 0;

        loop {
            while let Some(job) = self.queue.pop() {
                self.run(job).await;
                processed += 1;
            }

            self.active.store(false, Ordering::SeqCst);
            fence(Ordering::SeqCst);

            if self.queue.is_empty() {
                break;
            }
            // Something landed while we were deactivating. Either we take the
            // flag back, or the submitter that beat us owns the queue now.
            if !self.acquire() {
                debug!(processed, "drain loop handed off");
                work::record_drained(&tracing::Span::current(), processed);
                return;
            }
        }

        work::record_drained(&tracing::Span::current(), processed);
        debug!(processed, "drain loop idle");

        if let Some(hook) = on_idle {
            hook();
        }
    }

    async fn run(&self, job: Job<I, O>) {
        let Job { input, completion } = job;
        let processor = Arc::clone(&self.processor);
        let start = Instant::now();

        // Own task, so a panic surfaces as a JoinError rather than unwinding
        // the loop and leaving `active` set forever.
        let joined = tokio::spawn(async move { processor.process(input).await }).await;

        let outcome = match joined {
            Ok(Ok(value)) => WorkerResult::success(value),
            Ok(Err(e)) => WorkerResult::error(Failure::Process(e)),
            Err(e) if e.is_panic() => WorkerResult::error(Failure::Panicked(panic_message(
                e.into_panic(),
            ))),
            Err(_) => WorkerResult::error(Failure::Abandoned),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        metrics::item_duration_ms().record(elapsed_ms, &[]);
        metrics::items_processed().add(1, &[KeyValue::new("result", result_label(&outcome))]);

        match completion {
            Some(tx) => {
                // The caller may have dropped the handle; nothing to do then.
                let _ = tx.send(outcome);
            }
            None => {
                if let WorkerResult::Error(failure) = outcome {
                    warn!(error = %failure, "fire-and-forget item failed, outcome discarded");
                }
            }
        }
    }
}

fn result_label<T>(outcome: &WorkerResult<T>) -> &'static str {
    match outcome {
        WorkerResult::Success(_) => "ok",
        WorkerResult::Error(Failure::Process(_)) => "error",
        WorkerResult::Error(Failure::Panicked(_)) => "panic",
        WorkerResult::Error(Failure::Abandoned) => "abandoned",
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle to the outcome of a [`Worker::submit_and_await`] submission.
///
/// Always resolves: if the item is dropped without being processed the
/// outcome is [`Failure::Abandoned`].
#[derive(Debug)]
pub struct Completion<O> {
    rx: oneshot::Receiver<WorkerResult<O>>,
}

impl<O> Future for Completion<O> {
    type Output = WorkerResult<O>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| WorkerResult::error(Failure::Abandoned)))
    }
}
