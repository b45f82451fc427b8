use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::warn;

use crate::build::{BuildIdentity, BuildState};

use super::types::{BuildEvent, EventKind};

/// Fan-out bus for build events.
///
/// Every subscriber owns an unbounded queue, so publishing never waits and a
/// slow subscriber never loses events. Cheaply cloneable; every clone
/// publishes to the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    backlog_warning: usize,
}

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::UnboundedSender<BuildEvent>,
    kind: Option<EventKind>,
    pending: Arc<AtomicUsize>,
}

impl EventBus {
    /// Create a bus that warns when a subscriber falls `backlog_warning`
    /// events behind.
    pub fn new(backlog_warning: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            backlog_warning: backlog_warning.max(1),
        }
    }

    /// Publish an event. Never blocks and never fails; with no subscribers
    /// the event is dropped.
    pub fn publish(&self, event: BuildEvent) {
        let mut subscribers = self.lock();

        // Delivery happens under the lock so all subscribers see one order
        subscribers.retain(|subscriber| {
            if subscriber.kind.is_some_and(|kind| event.kind() != kind) {
                return !subscriber.tx.is_closed();
            }
            if subscriber.tx.send(event.clone()).is_err() {
                return false;
            }
            let pending = subscriber.pending.fetch_add(1, Ordering::Relaxed) + 1;
            if pending == self.backlog_warning {
                warn!(
                    "Event subscriber is {} events behind {}",
                    pending,
                    event.identity()
                );
            }
            true
        });
    }

    /// Convenience method to publish a log line.
    pub fn log_updated(&self, identity: &BuildIdentity, line: &str) {
        self.publish(BuildEvent::BuildLogUpdated {
            identity: identity.clone(),
            line: line.to_string(),
        });
    }

    /// Convenience method to publish a state change.
    pub fn build_changed(
        &self,
        identity: &BuildIdentity,
        state: BuildState,
        build_info: Option<String>,
        manifest_info: Option<String>,
    ) {
        self.publish(BuildEvent::BuildChanged {
            identity: identity.clone(),
            state,
            build_info,
            manifest_info,
        });
    }

    /// Subscribe to one kind of event.
    pub fn subscribe(&self, kind: EventKind) -> EventSubscription {
        self.add_subscriber(Some(kind))
    }

    /// Subscribe to every event.
    pub fn subscribe_all(&self) -> EventSubscription {
        self.add_subscriber(None)
    }

    /// Subscriptions still attached to the bus.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|subscriber| !subscriber.tx.is_closed());
        subscribers.len()
    }

    fn add_subscriber(&self, kind: Option<EventKind>) -> EventSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        self.lock().push(Subscriber {
            tx,
            kind,
            pending: Arc::clone(&pending),
        });
        EventSubscription { rx, pending }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        // A panicking publisher leaves the list intact
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// One subscriber's view of the bus.
#[derive(Debug)]
pub struct EventSubscription {
    rx: mpsc::UnboundedReceiver<BuildEvent>,
    pending: Arc<AtomicUsize>,
}

impl EventSubscription {
    /// Wait for the next event. Returns `None` once every clone of the bus
    /// is gone and the queue is drained.
    pub async fn recv(&mut self) -> Option<BuildEvent> {
        let event = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(event)
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<BuildEvent> {
        let event = self.rx.try_recv().ok()?;
        self.pending.fetch_sub(1, Ordering::Relaxed);
        Some(event)
    }

    /// Events queued for this subscriber.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Turn the subscription into a lazy stream of events.
    pub fn into_stream(self) -> impl Stream<Item = BuildEvent> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|event| (event, subscription))
        })
    }
}
