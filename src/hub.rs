//! The hub fans events out to every registered session.
//!
//! Each session gets its own bounded queue.
//! Publishing never waits: if a session's queue is full the event is dropped
//! for that session only, and its drop counter goes up.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

use crate::{event::Event, session::SessionId};

/// The queue capacity per session if nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
struct Slot {
    sender: mpsc::Sender<Event>,
    dropped: Arc<AtomicU64>,
}

#[derive(Debug)]
struct HubInner {
    sessions: RwLock<HashMap<SessionId, Slot>>,
    queue_capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

/// A handle to the hub.
/// Clones refer to the same hub.
#[derive(Debug, Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

/// What happened to an event for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Put on the session's queue.
    Queued,

    /// The queue was full, so the event was dropped for this session.
    Overflow,

    /// The session is gone but not deregistered yet.
    Closed,
}

/// How a single publish went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Sessions which got the event queued.
    pub queued: usize,

    /// Sessions which had the event dropped due to a full queue.
    pub overflowed: usize,

    /// Sessions which were closed.
    pub closed: usize,
}

impl PublishReport {
    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Queued => self.queued += 1,
            Delivery::Overflow => self.overflowed += 1,
            Delivery::Closed => self.closed += 1,
        }
    }
}

/// Counters describing the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubStats {
    /// Registered sessions right now.
    pub sessions: usize,

    /// Events published since start.
    pub published: u64,

    /// Event deliveries dropped due to full queues, across all sessions.
    pub dropped: u64,
}

/// The receiving end of a session's queue.
#[derive(Debug)]
pub struct Subscription {
    id: SessionId,
    events: mpsc::Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

impl Subscription {
    /// The session this subscription belongs to.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the next event.
    /// `None` if the session was deregistered and the queue is empty.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Get the next event if there is one.
    pub fn try_next_event(&mut self) -> Option<Event> {
        self.events.try_recv().ok()
    }

    /// How many events were dropped for this session.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Split into a stream of events and a shared drop counter.
    pub(crate) fn into_parts(self) -> (ReceiverStream<Event>, Arc<AtomicU64>) {
        (ReceiverStream::new(self.events), self.dropped)
    }
}

impl Hub {
    /// Create a hub where each session can have `queue_capacity` events waiting.
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sessions: RwLock::new(HashMap::new()),
                // A zero capacity channel is not a thing.
                queue_capacity: queue_capacity.max(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a session.
    /// Events published from now on are queued for it.
    pub fn register(&self, id: SessionId) -> Subscription {
        let (sender, events) = mpsc::channel(self.inner.queue_capacity);
        let dropped = Arc::new(AtomicU64::new(0));

        let slot = Slot {
            sender,
            dropped: Arc::clone(&dropped),
        };

        if self.inner.sessions.write().insert(id, slot).is_some() {
            warn!(%id, "Session registered twice, replacing the old queue");
        }

        debug!(%id, "Registered");

        Subscription {
            id,
            events,
            dropped,
        }
    }

    /// Deregister a session.
    /// Returns `false` if it was not registered.
    pub fn deregister(&self, id: &SessionId) -> bool {
        let removed = self.inner.sessions.write().remove(id).is_some();

        if removed {
            debug!(%id, "Deregistered");
        }

        removed
    }

    /// Deregister everyone.
    /// Sessions see their queue end once drained.
    pub fn close_all(&self) -> usize {
        let closed = self.inner.sessions.write().drain().count();
        debug!(%closed, "Closed all sessions");
        closed
    }

    /// Queue the event for every registered session.
    ///
    /// Never waits for a session.
    pub fn publish(&self, event: Event) -> PublishReport {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        // Keep the lock only for the snapshot.
        let slots = self
            .inner
            .sessions
            .read()
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect::<Vec<_>>();

        let mut report = PublishReport::default();

        for (id, slot) in slots {
            let delivery = self.deliver(&id, &slot, event.clone());
            report.record(delivery);
        }

        trace!(%event, ?report, "Published");

        report
    }

    fn deliver(&self, id: &SessionId, slot: &Slot, event: Event) -> Delivery {
        match slot.sender.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(event)) => {
                let dropped = slot.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);

                debug!(%id, %event, %dropped, "Queue full, dropping event");
                Delivery::Overflow
            }
            Err(TrySendError::Closed(_)) => {
                trace!(%id, "Queue closed");
                Delivery::Closed
            }
        }
    }

    /// How many sessions are registered.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    /// How many events were dropped for the given session,
    /// if it is registered.
    pub fn dropped(&self, id: &SessionId) -> Option<u64> {
        self.inner
            .sessions
            .read()
            .get(id)
            .map(|slot| slot.dropped.load(Ordering::Relaxed))
    }

    /// The hub's counters.
    pub fn stats(&self) -> HubStats {
        HubStats {
            sessions: self.session_count(),
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
