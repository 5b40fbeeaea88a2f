//! Synchronous in-process publish/subscribe for timeline and view changes.
//!
//! Listeners run on the publisher's call stack, one after another, in
//! subscription order. A listener that returns an error or panics is
//! reported and skipped; the rest still receive the event. A slow listener
//! delays everyone after it, which is only reported, never interrupted.
//! There is no replay: a listener subscribed after a publish never sees it
//! and should re-read the store when it subscribes.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::model::{Phase, ViewContext, ViewMode};

/// Something other views need to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A project's phase list was saved.
    TimelineUpdated {
        project_id: String,
        phases: Vec<Phase>,
    },
    /// The selected project or view mode changed.
    ProjectContextUpdated {
        selected_project_id: String,
        view_mode: ViewMode,
    },
}

impl SyncEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SyncEvent::TimelineUpdated { .. } => EventKind::TimelineUpdated,
            SyncEvent::ProjectContextUpdated { .. } => EventKind::ProjectContextUpdated,
        }
    }

    pub fn context_updated(context: &ViewContext) -> Self {
        SyncEvent::ProjectContextUpdated {
            selected_project_id: context.selected_project_id.clone(),
            view_mode: context.view_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TimelineUpdated,
    ProjectContextUpdated,
}

pub type ListenerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Listener = dyn Fn(&SyncEvent) -> ListenerResult + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    listener: Box<Listener>,
}

/// A listener that did not handle an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerFailure {
    pub subscription: SubscriptionId,
    pub event: EventKind,
    pub reason: String,
    pub panicked: bool,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Listeners that handled the event successfully.
    pub delivered: usize,
    pub failures: Vec<ListenerFailure>,
    /// Listeners that took longer than the bus threshold.
    pub slow: Vec<SubscriptionId>,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct SyncBus {
    subscriptions: Mutex<Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
    slow_listener_threshold: Option<Duration>,
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBus")
            .field("listeners", &self.listener_count())
            .field("slow_listener_threshold", &self.slow_listener_threshold)
            .finish()
    }
}

impl SyncBus {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            slow_listener_threshold: None,
        }
    }

    /// Report listeners that run longer than `threshold`.
    pub fn with_slow_listener_threshold(mut self, threshold: Duration) -> Self {
        self.slow_listener_threshold = Some(threshold);
        self
    }

    /// Receive every event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(None, Box::new(listener))
    }

    /// Receive only events of `kind`.
    pub fn subscribe_to<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncEvent) -> ListenerResult + Send + Sync + 'static,
    {
        self.register(Some(kind), Box::new(listener))
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `event` to every listener subscribed right now.
    pub fn publish(&self, event: &SyncEvent) -> PublishReport {
        let kind = event.kind();
        let targets: Vec<Arc<Subscription>> = self
            .lock()
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .cloned()
            .collect();

        let mut report = PublishReport::default();
        for subscription in targets {
            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| (subscription.listener)(event)));
            let elapsed = started.elapsed();

            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        subscription = subscription.id.0,
                        event = ?kind,
                        error = %e,
                        "sync listener failed"
                    );
                    report.failures.push(ListenerFailure {
                        subscription: subscription.id,
                        event: kind,
                        reason: e.to_string(),
                        panicked: false,
                    });
                }
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    tracing::error!(
                        subscription = subscription.id.0,
                        event = ?kind,
                        reason = %reason,
                        "sync listener panicked"
                    );
                    report.failures.push(ListenerFailure {
                        subscription: subscription.id,
                        event: kind,
                        reason,
                        panicked: true,
                    });
                }
            }

            if let Some(threshold) = self.slow_listener_threshold {
                if elapsed > threshold {
                    tracing::warn!(
                        subscription = subscription.id.0,
                        event = ?kind,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "slow sync listener"
                    );
                    report.slow.push(subscription.id);
                }
            }
        }
        report
    }

    fn register(&self, kind: Option<EventKind>, listener: Box<Listener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push(Arc::new(Subscription { id, kind, listener }));
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<Subscription>>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
