//! Typed event bus with timers and a cooperative run loop
//!
//! The bus dispatches [`EventPayload`] values to handlers subscribed by
//! [`EventKind`]. It supports:
//!
//! - Synchronous dispatch (handlers run at the publish call site) and
//!   asynchronous dispatch (events queue for the loop)
//! - Per-handler minimum priority and filter chains
//! - Delayed and repeating scheduled tasks, cancellable by id
//! - A bounded pending queue: excess publishes are dropped (counted) rather
//!   than blocking, so producers inside handlers cannot deadlock the loop
//!
//! The run loop multiplexes pending events and due tasks on one task. Within
//! a tick, handlers of one event run in subscription order; events of one
//! kind dispatch in publish order.
//!
//! # Example
//!
//! ```no_run
//! use neko_launcher::events::EventBus;
//! use neko_launcher::types::{EventKind, EventPayload, Priority};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! bus.spawn_loop();
//!
//! bus.subscribe(EventKind::ProcessExited, |event| {
//!     println!("game exited: {:?}", event.payload);
//! });
//! bus.publish(EventPayload::ProcessExited { code: Some(0) });
//! # }
//! ```

use crate::types::{DispatchMode, EventId, EventKind, EventPayload, HandlerId, Priority};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default cap on the pending-event queue
const DEFAULT_MAX_PENDING: usize = 10_000;

/// Longest the loop sleeps between ticks even with nothing due
const WAIT_CEILING: Duration = Duration::from_millis(500);

/// How often the cancelled set is reconciled against the task queue
const CLEANUP_INTERVAL: Duration = Duration::from_secs(2);

/// A dispatched event: payload plus delivery metadata
#[derive(Clone, Debug)]
pub struct Event {
    /// Unique id assigned at publish time
    pub id: EventId,
    /// Priority compared against each handler's minimum
    pub priority: Priority,
    /// How the event was delivered
    pub mode: DispatchMode,
    /// When the event was published
    pub timestamp: Instant,
    /// The payload
    pub payload: EventPayload,
}

/// A predicate applied to an event before a handler runs
pub type EventFilter = Box<dyn Fn(&Event) -> bool + Send + Sync>;

/// A handler callback
pub type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

struct Handler {
    id: HandlerId,
    min_priority: Priority,
    filters: Vec<EventFilter>,
    callback: EventCallback,
}

struct ScheduledEntry {
    id: EventId,
    due: Instant,
    priority: Priority,
    /// `Some` for repeating tasks; a fresh entry is enqueued per firing
    interval: Option<Duration>,
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEntry {
    /// Max-heap order: earliest due first, then higher priority, then lower id
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}

/// Counters exposed by [`EventBus::statistics`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Events accepted for dispatch (both modes)
    pub published: u64,
    /// Events whose handler pass completed
    pub dispatched: u64,
    /// Handler invocations that panicked
    pub failed: u64,
    /// Events dropped because the pending queue was full
    pub dropped: u64,
}

struct BusInner {
    handlers: RwLock<HashMap<EventKind, Vec<Arc<Handler>>>>,
    pending: Mutex<VecDeque<Event>>,
    max_pending: AtomicUsize,
    scheduled: Mutex<BinaryHeap<ScheduledEntry>>,
    cancelled: Mutex<HashSet<EventId>>,
    next_event_id: AtomicU64,
    next_handler_id: AtomicU64,
    wake: Notify,
    token: CancellationToken,

    published: AtomicU64,
    dispatched: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl BusInner {
    fn next_event_id(&self) -> EventId {
        EventId::new(self.next_event_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Run every eligible handler for `event`, isolating panics
    fn dispatch(&self, event: &Event) {
        let handlers: Vec<Arc<Handler>> = {
            let map = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            map.get(&event.payload.kind()).cloned().unwrap_or_default()
        };

        'next: for handler in handlers {
            if event.priority < handler.min_priority {
                continue;
            }
            for filter in &handler.filters {
                if !filter(event) {
                    continue 'next;
                }
            }
            let result =
                std::panic::catch_unwind(AssertUnwindSafe(|| (handler.callback)(event)));
            if result.is_err() {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    handler = handler.id.get(),
                    kind = ?event.payload.kind(),
                    "event handler panicked"
                );
            }
        }
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    fn enqueue(&self, event: Event) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.len() >= self.max_pending.load(Ordering::Relaxed) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(kind = ?event.payload.kind(), "event queue full, event dropped");
            return;
        }
        pending.push_back(event);
        drop(pending);
        self.wake.notify_one();
    }

    fn schedule(
        &self,
        delay: Duration,
        priority: Priority,
        interval: Option<Duration>,
        callback: Arc<dyn Fn() + Send + Sync>,
    ) -> EventId {
        let id = self.next_event_id();
        let entry = ScheduledEntry {
            id,
            due: Instant::now() + delay,
            priority,
            interval,
            callback,
        };
        self.scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        self.wake.notify_one();
        id
    }

    /// Drop cancelled ids that are no longer queued so the set stays bounded
    fn reconcile_cancelled(&self) {
        let queued: HashSet<EventId> = self
            .scheduled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.id)
            .collect();
        self.cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|id| queued.contains(id));
    }
}

/// Typed publish/subscribe bus with delayed and repeating timers
///
/// Cloning is cheap; all clones share the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus; the run loop is not started until
    /// [`EventBus::spawn_loop`] or [`EventBus::run`] is called
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                handlers: RwLock::new(HashMap::new()),
                pending: Mutex::new(VecDeque::new()),
                max_pending: AtomicUsize::new(DEFAULT_MAX_PENDING),
                scheduled: Mutex::new(BinaryHeap::new()),
                cancelled: Mutex::new(HashSet::new()),
                next_event_id: AtomicU64::new(0),
                next_handler_id: AtomicU64::new(0),
                wake: Notify::new(),
                token: CancellationToken::new(),
                published: AtomicU64::new(0),
                dispatched: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribe to an event kind with no priority floor and no filters
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subscribe_with(kind, Priority::Low, Vec::new(), callback)
    }

    /// Subscribe with a minimum priority and a filter chain
    ///
    /// The handler runs only for events whose priority is at least
    /// `min_priority` and which pass every filter.
    pub fn subscribe_with<F>(
        &self,
        kind: EventKind,
        min_priority: Priority,
        filters: Vec<EventFilter>,
        callback: F,
    ) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = HandlerId::new(self.inner.next_handler_id.fetch_add(1, Ordering::SeqCst));
        let handler = Arc::new(Handler {
            id,
            min_priority,
            filters,
            callback: Box::new(callback),
        });
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind)
            .or_default()
            .push(handler);
        id
    }

    /// Remove a subscription; returns whether it existed
    pub fn unsubscribe(&self, kind: EventKind, id: HandlerId) -> bool {
        let mut map = self.inner.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = map.get_mut(&kind) {
            let before = list.len();
            list.retain(|h| h.id != id);
            return list.len() < before;
        }
        false
    }

    /// Publish with [`Priority::Normal`] and [`DispatchMode::Async`]
    pub fn publish(&self, payload: EventPayload) -> EventId {
        self.publish_with(payload, Priority::Normal, DispatchMode::Async)
    }

    /// Publish with explicit priority and dispatch mode
    ///
    /// `Sync` runs every eligible handler before returning and observes no
    /// ordering relation with queued events. `Async` enqueues; if the queue
    /// is at capacity the event is dropped and counted.
    pub fn publish_with(
        &self,
        payload: EventPayload,
        priority: Priority,
        mode: DispatchMode,
    ) -> EventId {
        let event = Event {
            id: self.inner.next_event_id(),
            priority,
            mode,
            timestamp: Instant::now(),
            payload,
        };
        self.inner.published.fetch_add(1, Ordering::SeqCst);
        let id = event.id;
        match mode {
            DispatchMode::Sync => self.inner.dispatch(&event),
            DispatchMode::Async => self.inner.enqueue(event),
        }
        id
    }

    /// Publish `payload` after `delay`
    pub fn publish_after(&self, delay: Duration, payload: EventPayload) -> EventId {
        self.publish_after_with(delay, payload, Priority::Normal)
    }

    /// Publish `payload` after `delay` with an explicit priority
    pub fn publish_after_with(
        &self,
        delay: Duration,
        payload: EventPayload,
        priority: Priority,
    ) -> EventId {
        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        self.inner.schedule(
            delay,
            priority,
            None,
            Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let bus = EventBus { inner };
                    bus.publish_with(payload.clone(), priority, DispatchMode::Async);
                }
            }),
        )
    }

    /// Run `callback` once on the loop after `delay`
    pub fn schedule_task<F>(&self, delay: Duration, priority: Priority, callback: F) -> EventId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.schedule(delay, priority, None, Arc::new(callback))
    }

    /// Run `callback` on the loop every `interval`
    ///
    /// The first firing happens one interval from now. Each firing enqueues
    /// a fresh entry, so cancellation takes effect at the next inspection.
    pub fn schedule_repeating<F>(
        &self,
        interval: Duration,
        priority: Priority,
        callback: F,
    ) -> EventId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .schedule(interval, priority, Some(interval), Arc::new(callback))
    }

    /// Cancel a scheduled task by id; returns whether the id was newly marked
    pub fn cancel_task(&self, id: EventId) -> bool {
        self.inner
            .cancelled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id)
    }

    /// Change the pending-queue cap; applies to future publishes only
    pub fn set_max_pending_events(&self, max: usize) {
        self.inner.max_pending.store(max, Ordering::Relaxed);
    }

    /// Snapshot the bus counters
    pub fn statistics(&self) -> EventStats {
        EventStats {
            published: self.inner.published.load(Ordering::SeqCst),
            dispatched: self.inner.dispatched.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
            dropped: self.inner.dropped.load(Ordering::SeqCst),
        }
    }

    /// Spawn the run loop on the current tokio runtime
    pub fn spawn_loop(&self) -> tokio::task::JoinHandle<()> {
        let bus = self.clone();
        tokio::spawn(async move { bus.run().await })
    }

    /// Stop the run loop; pending events are left in the queue
    pub fn stop(&self) {
        self.inner.token.cancel();
        self.inner.wake.notify_waiters();
    }

    /// Drive the bus until [`EventBus::stop`] is called
    ///
    /// One iteration drains pending events, runs every due scheduled task,
    /// then sleeps until the earlier of the next due time, a 500 ms ceiling,
    /// or a wake-up signal. The cancelled set is reconciled about every two
    /// seconds.
    pub async fn run(&self) {
        let inner = &self.inner;
        let mut last_cleanup = Instant::now();
        tracing::debug!("event loop started");

        loop {
            if inner.token.is_cancelled() {
                break;
            }

            let mut did_work = false;

            // 1. Drain pending events in FIFO order.
            loop {
                let event = inner
                    .pending
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .pop_front();
                match event {
                    Some(event) => {
                        inner.dispatch(&event);
                        did_work = true;
                    }
                    None => break,
                }
            }

            // 2. Run every due scheduled task.
            let now = Instant::now();
            loop {
                let entry = {
                    let mut queue = inner.scheduled.lock().unwrap_or_else(|e| e.into_inner());
                    let next_due = queue.peek().map(|next| next.due);
                    match next_due {
                        Some(due) if due <= now => queue.pop(),
                        _ => None,
                    }
                };
                let Some(entry) = entry else { break };

                if inner
                    .cancelled
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(&entry.id)
                {
                    continue;
                }

                did_work = true;
                let result =
                    std::panic::catch_unwind(AssertUnwindSafe(|| (entry.callback)()));
                if result.is_err() {
                    inner.failed.fetch_add(1, Ordering::SeqCst);
                    tracing::error!(task = entry.id.get(), "scheduled task panicked");
                }

                if let Some(interval) = entry.interval {
                    let still_cancelled = inner
                        .cancelled
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .remove(&entry.id);
                    if !still_cancelled {
                        inner
                            .scheduled
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .push(ScheduledEntry {
                                id: entry.id,
                                due: Instant::now() + interval,
                                priority: entry.priority,
                                interval: Some(interval),
                                callback: entry.callback,
                            });
                    }
                }
            }

            // 3. Periodically bound the cancelled set.
            if last_cleanup.elapsed() >= CLEANUP_INTERVAL {
                inner.reconcile_cancelled();
                last_cleanup = Instant::now();
            }

            if did_work {
                continue;
            }

            // 4. Sleep until there is something to do.
            let next_due = inner
                .scheduled
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .peek()
                .map(|e| e.due);
            let wait = next_due
                .map(|due| due.saturating_duration_since(Instant::now()).min(WAIT_CEILING))
                .unwrap_or(WAIT_CEILING);

            tokio::select! {
                _ = inner.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
                _ = inner.token.cancelled() => break,
            }
        }
        tracing::debug!("event loop stopped");
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn line_event(line: &str) -> EventPayload {
        EventPayload::LogFileLine {
            line: line.to_string(),
            source: std::path::PathBuf::from("latest.log"),
        }
    }

    #[tokio::test]
    async fn test_sync_publish_dispatches_at_call_site() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_c = hits.clone();
        bus.subscribe(EventKind::LogFileLine, move |_| {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });

        // No loop running; Sync must still deliver.
        bus.publish_with(line_event("a"), Priority::Normal, DispatchMode::Sync);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_dispatch_completeness() {
        let bus = EventBus::new();
        let loop_handle = bus.spawn_loop();

        let hits = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let hits = hits.clone();
            bus.subscribe(EventKind::ProcessExited, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        bus.publish(EventPayload::ProcessExited { code: Some(0) });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);

        bus.stop();
        let _ = loop_handle.await;
    }

    #[tokio::test]
    async fn test_min_priority_and_filters() {
        let bus = EventBus::new();
        let high_hits = Arc::new(AtomicU32::new(0));
        let high_c = high_hits.clone();
        bus.subscribe_with(
            EventKind::LogFileLine,
            Priority::High,
            Vec::new(),
            move |_| {
                high_c.fetch_add(1, Ordering::SeqCst);
            },
        );

        let filtered_hits = Arc::new(AtomicU32::new(0));
        let filtered_c = filtered_hits.clone();
        let filters: Vec<EventFilter> = vec![Box::new(|event: &Event| {
            event.payload.line().is_some_and(|l| l.contains("match"))
        })];
        bus.subscribe_with(EventKind::LogFileLine, Priority::Low, filters, move |_| {
            filtered_c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish_with(line_event("no"), Priority::Normal, DispatchMode::Sync);
        bus.publish_with(line_event("match me"), Priority::High, DispatchMode::Sync);

        // Normal-priority event is below the High floor; only the second
        // event reaches the first handler.
        assert_eq!(high_hits.load(Ordering::SeqCst), 1);
        // The filter admits only the "match" line.
        assert_eq!(filtered_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handlers_run_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let order = order.clone();
            bus.subscribe(EventKind::LogFileLine, move |_| {
                order.lock().unwrap().push(i);
            });
        }
        bus.publish_with(line_event("x"), Priority::Normal, DispatchMode::Sync);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_fifo_across_events_of_same_kind() {
        let bus = EventBus::new();
        let loop_handle = bus.spawn_loop();

        let lines = Arc::new(Mutex::new(Vec::new()));
        let lines_c = lines.clone();
        bus.subscribe(EventKind::LogFileLine, move |event| {
            if let Some(line) = event.payload.line() {
                lines_c.lock().unwrap().push(line.to_string());
            }
        });

        for i in 0..5 {
            bus.publish(line_event(&format!("line-{i}")));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            *lines.lock().unwrap(),
            vec!["line-0", "line-1", "line-2", "line-3", "line-4"]
        );
        bus.stop();
        let _ = loop_handle.await;
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_c = hits.clone();
        let id = bus.subscribe(EventKind::LogFileLine, move |_| {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(bus.unsubscribe(EventKind::LogFileLine, id));
        assert!(!bus.unsubscribe(EventKind::LogFileLine, id));

        bus.publish_with(line_event("x"), Priority::Normal, DispatchMode::Sync);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_after_fires_once() {
        let bus = EventBus::new();
        let loop_handle = bus.spawn_loop();

        let hits = Arc::new(AtomicU32::new(0));
        let hits_c = hits.clone();
        bus.subscribe(EventKind::ProcessExited, move |_| {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish_after(
            Duration::from_millis(30),
            EventPayload::ProcessExited { code: None },
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0, "not due yet");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        bus.stop();
        let _ = loop_handle.await;
    }

    // Counts firings against wall-clock intervals; keep it off a contended
    // scheduler.
    #[serial_test::serial]
    #[tokio::test]
    async fn test_repeating_task_cancelled_mid_flight() {
        let bus = EventBus::new();
        let loop_handle = bus.spawn_loop();

        let fires = Arc::new(AtomicU32::new(0));
        let fires_c = fires.clone();
        let id = bus.schedule_repeating(Duration::from_millis(50), Priority::Normal, move || {
            fires_c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(175)).await;
        assert!(bus.cancel_task(id));
        let at_cancel = fires.load(Ordering::SeqCst);
        assert!(
            (2..=4).contains(&at_cancel),
            "expected ~3 firings, got {at_cancel}"
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            fires.load(Ordering::SeqCst),
            at_cancel,
            "no firings after cancellation"
        );

        bus.stop();
        let _ = loop_handle.await;
    }

    #[tokio::test]
    async fn test_cancel_before_first_fire() {
        let bus = EventBus::new();
        let loop_handle = bus.spawn_loop();

        let fires = Arc::new(AtomicU32::new(0));
        let fires_c = fires.clone();
        let id = bus.schedule_task(Duration::from_millis(50), Priority::Normal, move || {
            fires_c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(bus.cancel_task(id));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fires.load(Ordering::SeqCst), 0);

        bus.stop();
        let _ = loop_handle.await;
    }

    #[tokio::test]
    async fn test_queue_overflow_drops_and_counts() {
        let bus = EventBus::new();
        bus.set_max_pending_events(2);

        // No loop running, so the queue cannot drain.
        bus.publish(line_event("a"));
        bus.publish(line_event("b"));
        bus.publish(line_event("c"));

        let stats = bus.statistics();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.published, 3);
    }

    #[tokio::test]
    async fn test_handler_panic_is_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicU32::new(0));
        let hits_c = hits.clone();

        bus.subscribe(EventKind::LogFileLine, |_| panic!("handler bug"));
        bus.subscribe(EventKind::LogFileLine, move |_| {
            hits_c.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish_with(line_event("x"), Priority::Normal, DispatchMode::Sync);

        // The second handler still ran, the panic was counted.
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.statistics().failed, 1);
    }
}
