use std::{
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use sentinel_logging::LogLevel;
use sentinel_telemetry::SentinelTelemetry;
use tokio::{sync::Notify, task::JoinHandle};
use uuid::Uuid;

use crate::{
    error::BusError,
    event::Event,
    subscription::{EventHandler, Subscription},
};

/// Snapshot of dead-letter queue contents.
#[derive(Debug, Clone, Serialize)]
pub struct DlqEntry {
    /// The event that exhausted its retries.
    pub event: Event,
    /// The last handler error, formatted.
    pub error: String,
}

/// Point-in-time bus metrics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BusMetrics {
    /// Total events accepted into `publish`.
    pub events_received: u64,
    /// Total events fully processed by the consumer loop.
    pub events_processed: u64,
    /// Total events rejected as duplicates.
    pub events_deduplicated: u64,
    /// Total events that exhausted retries and landed in the DLQ.
    pub events_failed: u64,
    /// Total handler invocations (including retries) that returned `Ok`.
    pub handlers_invoked: u64,
    /// Current queue depth.
    pub queue_size: usize,
    /// Current subscription count.
    pub subscriptions: usize,
    /// Current dead-letter queue size.
    pub dlq_size: usize,
    /// Current dedup cache size.
    pub dedup_cache_size: usize,
}

#[derive(Default)]
struct MetricsInner {
    events_received: AtomicU64,
    events_processed: AtomicU64,
    events_deduplicated: AtomicU64,
    events_failed: AtomicU64,
    handlers_invoked: AtomicU64,
}

struct QueuedEvent {
    priority_rank: u8,
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority_rank == other.priority_rank && self.seq == other.seq
    }
}
impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    /// `BinaryHeap` pops the greatest element first. We want the
    /// highest-priority event (lowest `EventPriority` ordinal) to pop
    /// first, and among equal priorities, the event with the smaller
    /// sequence number (published first) to pop first — stable FIFO
    /// ordering without ever comparing `Event` fields directly.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority_rank
            .cmp(&other.priority_rank)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Tunables for a bus instance.
#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    /// Maximum events the priority queue will hold before `publish` starts dropping.
    pub max_queue_size: usize,
    /// Window, in seconds, used for deduplication unless an event overrides it.
    pub dedup_window_seconds: i64,
    /// Maximum retry attempts per handler invocation.
    pub max_retries: u32,
    /// Delay between retry attempts.
    pub retry_delay: Duration,
    /// Maximum dead-letter queue size.
    pub dlq_max_size: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            dedup_window_seconds: 60,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            dlq_max_size: 1_000,
        }
    }
}

struct Inner {
    config: BusConfig,
    queue: Mutex<BinaryHeap<QueuedEvent>>,
    notify: Notify,
    seq: AtomicU64,
    dedup_cache: Mutex<IndexMap<String, DateTime<Utc>>>,
    subscriptions: RwLock<IndexMap<Uuid, Subscription>>,
    dlq: Mutex<VecDeque<DlqEntry>>,
    metrics: MetricsInner,
    running: AtomicBool,
    processor_task: Mutex<Option<JoinHandle<()>>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
    telemetry: Option<SentinelTelemetry>,
}

/// Central event bus: priority-ordered delivery, deduplication, a
/// dead-letter queue for handlers that keep failing, and basic
/// metrics. Cheap to clone — all state lives behind an `Arc`.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    /// Creates a bus with the given configuration.
    #[must_use]
    pub fn new(config: BusConfig) -> Self {
        Self::with_telemetry(config, None)
    }

    /// Creates a bus with configuration and an optional telemetry handle.
    #[must_use]
    pub fn with_telemetry(config: BusConfig, telemetry: Option<SentinelTelemetry>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                queue: Mutex::new(BinaryHeap::new()),
                notify: Notify::new(),
                seq: AtomicU64::new(0),
                dedup_cache: Mutex::new(IndexMap::new()),
                subscriptions: RwLock::new(IndexMap::new()),
                dlq: Mutex::new(VecDeque::new()),
                metrics: MetricsInner::default(),
                running: AtomicBool::new(false),
                processor_task: Mutex::new(None),
                cleanup_task: Mutex::new(None),
                telemetry,
            }),
        }
    }

    /// Starts the consumer loop and the dedup-cache sweep. Idempotent.
    pub fn start(&self) {
        if self.inner.running.swap(true, AtomicOrdering::SeqCst) {
            return;
        }

        let processor = {
            let bus = self.clone();
            tokio::spawn(async move { bus.process_events().await })
        };
        *self.inner.processor_task.lock() = Some(processor);

        let cleanup = {
            let bus = self.clone();
            tokio::spawn(async move { bus.cleanup_dedup_cache().await })
        };
        *self.inner.cleanup_task.lock() = Some(cleanup);

        self.log(LogLevel::Info, "bus.started", serde_json::json!({}));
    }

    /// Stops the consumer loop and the dedup-cache sweep.
    pub async fn stop(&self) {
        self.inner.running.store(false, AtomicOrdering::SeqCst);
        self.inner.notify.notify_waiters();

        if let Some(handle) = self.inner.processor_task.lock().take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(handle) = self.inner.cleanup_task.lock().take() {
            handle.abort();
            let _ = handle.await;
        }

        self.log(LogLevel::Info, "bus.stopped", serde_json::json!({}));
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(telemetry) = &self.inner.telemetry {
            let _ = telemetry.log(level, message, metadata);
        }
    }

    /// Registers a handler. `event_types` empty means "deliver every type".
    pub fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        event_types: impl IntoIterator<Item = String>,
        priority_filter: Option<crate::event::EventPriority>,
        source_filter: Option<String>,
    ) -> Uuid {
        let subscription_id = Uuid::new_v4();
        let subscription = Subscription {
            subscription_id,
            event_types: event_types.into_iter().collect(),
            priority_filter,
            source_filter,
            handler,
        };
        self.inner
            .subscriptions
            .write()
            .insert(subscription_id, subscription);
        subscription_id
    }

    /// Removes a subscription. Returns `false` if it was not found.
    pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
        self.inner
            .subscriptions
            .write()
            .shift_remove(&subscription_id)
            .is_some()
    }

    /// Publishes an event. Returns `false` if it was deduplicated or
    /// the queue was full.
    pub fn publish(&self, event: Event) -> bool {
        self.inner
            .metrics
            .events_received
            .fetch_add(1, AtomicOrdering::Relaxed);

        if self.is_duplicate(&event) {
            self.inner
                .metrics
                .events_deduplicated
                .fetch_add(1, AtomicOrdering::Relaxed);
            return false;
        }

        let expiry = Utc::now() + chrono::Duration::seconds(event.dedup_window_seconds);
        self.inner
            .dedup_cache
            .lock()
            .insert(event.dedup_key.clone(), expiry);

        let mut queue = self.inner.queue.lock();
        if queue.len() >= self.inner.config.max_queue_size {
            return false;
        }
        let seq = self.inner.seq.fetch_add(1, AtomicOrdering::Relaxed);
        let priority_rank = 3 - event.priority.ordinal();
        queue.push(QueuedEvent {
            priority_rank,
            seq,
            event,
        });
        drop(queue);
        self.inner.notify.notify_one();
        true
    }

    fn is_duplicate(&self, event: &Event) -> bool {
        let cache = self.inner.dedup_cache.lock();
        cache
            .get(&event.dedup_key)
            .is_some_and(|expiry| Utc::now() < *expiry)
    }

    async fn process_events(&self) {
        while self.inner.running.load(AtomicOrdering::SeqCst) {
            let next = {
                let mut queue = self.inner.queue.lock();
                queue.pop()
            };
            let Some(queued) = next else {
                tokio::select! {
                    () = self.inner.notify.notified() => {}
                    () = tokio::time::sleep(Duration::from_secs(1)) => {}
                }
                continue;
            };

            let handlers = self.handlers_for(&queued.event);
            for subscription in handlers {
                self.invoke_handler(&subscription, &queued.event).await;
            }
            self.inner
                .metrics
                .events_processed
                .fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    fn handlers_for(&self, event: &Event) -> Vec<Subscription> {
        let subs = self.inner.subscriptions.read();
        subs.values()
            .filter(|sub| sub.event_types.is_empty() || sub.event_types.contains(&event.event_type))
            .filter(|sub| sub.accepts(event))
            .map(|sub| Subscription {
                subscription_id: sub.subscription_id,
                event_types: sub.event_types.clone(),
                priority_filter: sub.priority_filter,
                source_filter: sub.source_filter.clone(),
                handler: Arc::clone(&sub.handler),
            })
            .collect()
    }

    async fn invoke_handler(&self, subscription: &Subscription, event: &Event) {
        let max_retries = self.inner.config.max_retries.max(1);
        for attempt in 0..max_retries {
            match subscription.handler.handle(event).await {
                Ok(()) => {
                    self.inner
                        .metrics
                        .handlers_invoked
                        .fetch_add(1, AtomicOrdering::Relaxed);
                    return;
                }
                Err(err) => {
                    if attempt + 1 < max_retries {
                        tokio::time::sleep(self.inner.config.retry_delay).await;
                    } else {
                        self.log(
                            LogLevel::Error,
                            "bus.handler_failed",
                            serde_json::json!({
                                "event_id": event.event_id.to_string(),
                                "error": err.to_string(),
                            }),
                        );
                        self.add_to_dlq(event.clone(), err.to_string());
                        self.inner
                            .metrics
                            .events_failed
                            .fetch_add(1, AtomicOrdering::Relaxed);
                    }
                }
            }
        }
    }

    fn add_to_dlq(&self, event: Event, error: String) {
        let mut dlq = self.inner.dlq.lock();
        dlq.push_back(DlqEntry { event, error });
        while dlq.len() > self.inner.config.dlq_max_size {
            dlq.pop_front();
        }
    }

    async fn cleanup_dedup_cache(&self) {
        while self.inner.running.load(AtomicOrdering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let now = Utc::now();
            self.inner.dedup_cache.lock().retain(|_, expiry| *expiry >= now);
        }
    }

    /// Snapshot of current metrics.
    #[must_use]
    pub fn metrics(&self) -> BusMetrics {
        BusMetrics {
            events_received: self.inner.metrics.events_received.load(AtomicOrdering::Relaxed),
            events_processed: self.inner.metrics.events_processed.load(AtomicOrdering::Relaxed),
            events_deduplicated: self
                .inner
                .metrics
                .events_deduplicated
                .load(AtomicOrdering::Relaxed),
            events_failed: self.inner.metrics.events_failed.load(AtomicOrdering::Relaxed),
            handlers_invoked: self.inner.metrics.handlers_invoked.load(AtomicOrdering::Relaxed),
            queue_size: self.inner.queue.lock().len(),
            subscriptions: self.inner.subscriptions.read().len(),
            dlq_size: self.inner.dlq.lock().len(),
            dedup_cache_size: self.inner.dedup_cache.lock().len(),
        }
    }

    /// Returns up to `limit` of the most recent dead-letter entries.
    #[must_use]
    pub fn dlq(&self, limit: usize) -> Vec<DlqEntry> {
        let dlq = self.inner.dlq.lock();
        dlq.iter().rev().take(limit).cloned().collect()
    }

    /// Re-publishes a specific event from the dead-letter queue,
    /// removing it from the queue regardless of whether the republish
    /// succeeds.
    pub fn replay_from_dlq(&self, event_id: Uuid) -> bool {
        let event = {
            let mut dlq = self.inner.dlq.lock();
            let position = dlq.iter().position(|entry| entry.event.event_id == event_id);
            position.map(|index| dlq.remove(index).expect("index came from position").event)
        };
        match event {
            Some(event) => self.publish(event),
            None => false,
        }
    }

    /// Whether the bus's background tasks are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(AtomicOrdering::SeqCst)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("running", &self.is_running())
            .finish()
    }
}
