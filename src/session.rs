//! A listener session: one connected client and its delivery state.
//!
//! Sessions move through `Connecting -> Open -> Closing -> Closed`.
//! While open, the session's queue in the [`Hub`] is drained onto the connection
//! by a dedicated task.

use std::{
    fmt::Display,
    net::SocketAddr,
    sync::{atomic::Ordering, Arc},
};

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use crate::{event::Event, hub::Hub};

/// Identifies a session.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// A fresh, unique id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The first group is plenty for telling sessions apart in logs.
        let id = self.0.to_string();
        write!(f, "{}", &id[..8])
    }
}

/// The lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, not yet registered with the hub.
    Connecting,

    /// Registered, events are flowing.
    Open,

    /// Tearing down.
    Closing,

    /// Done.
    Closed,
}

impl SessionState {
    /// Is going from `self` to `next` allowed?
    pub fn can_become(self, next: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection, or it dropped.
    ClientClosed,

    /// Sending to the client failed.
    SendFailure(String),

    /// The hub stopped feeding the session.
    HubClosed,
}

impl Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::ClientClosed => write!(f, "client closed"),
            CloseReason::SendFailure(problem) => write!(f, "send failure: {problem}"),
            CloseReason::HubClosed => write!(f, "hub closed"),
        }
    }
}

/// Inbound frames, as far as a session cares.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Something the client sent. Ignored.
    Other,

    /// The client wants to close.
    Close,
}

/// One connected listener.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: Arc<str>,
    state: SessionState,
}

impl Session {
    /// A new session for the given peer.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            id: SessionId::new(),
            peer: peer.to_string().into(),
            state: SessionState::Connecting,
        }
    }

    /// The session's id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to the next state.
    /// Returns `false` and stays put if the transition is not allowed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if self.state.can_become(next) {
            debug!(id = %self.id, from = ?self.state, to = ?next, "Session state");
            self.state = next;
            true
        } else {
            warn!(id = %self.id, from = ?self.state, to = ?next, "Invalid session transition");
            false
        }
    }

    /// Run the session to completion.
    ///
    /// `outbound` receives the JSON text of each event,
    /// `inbound` yields whatever the client sends.
    pub(crate) async fn run<O, I, E>(mut self, hub: Hub, outbound: O, inbound: I) -> CloseReason
    where
        O: Sink<String, Error = E> + Unpin + Send + 'static,
        E: Display + Send + 'static,
        I: Stream<Item = Inbound> + Unpin + Send + 'static,
    {
        let span = info_span!("Session", id = %self.id, peer = %self.peer);

        async move {
            let subscription = hub.register(self.id);
            self.transition(SessionState::Open);
            info!("Open");

            let (events, dropped) = subscription.into_parts();

            let mut write_handle =
                tokio::spawn(drain(events, outbound).instrument(info_span!("Write")));
            let mut read_handle = tokio::spawn(read(inbound).instrument(info_span!("Read")));

            let reason = tokio::select! {
                reason = &mut write_handle => {
                    read_handle.abort();
                    reason.unwrap_or_else(|e| CloseReason::SendFailure(e.to_string()))
                }
                reason = &mut read_handle => {
                    // This ensures the underlying connection gets closed,
                    // which signals the peer that the session is over.
                    write_handle.abort();
                    reason.unwrap_or(CloseReason::ClientClosed)
                }
            };

            self.transition(SessionState::Closing);
            hub.deregister(&self.id);
            self.transition(SessionState::Closed);

            info!(%reason, dropped = dropped.load(Ordering::Relaxed), "Closed");

            reason
        }
        .instrument(span)
        .await
    }
}

async fn drain<S, O, E>(mut events: S, mut outbound: O) -> CloseReason
where
    S: Stream<Item = Event> + Unpin,
    O: Sink<String, Error = E> + Unpin,
    E: Display,
{
    while let Some(event) = events.next().await {
        if let Err(e) = outbound.send(event.to_json()).await {
            debug!(%e, "Send failed");
            return CloseReason::SendFailure(e.to_string());
        }
        trace!(%event, "Flushed");
    }

    CloseReason::HubClosed
}

async fn read<I>(mut inbound: I) -> CloseReason
where
    I: Stream<Item = Inbound> + Unpin,
{
    while let Some(message) = inbound.next().await {
        match message {
            Inbound::Other => debug!("Client sent something, ignoring"),
            Inbound::Close => {
                debug!("Client closing");
                break;
            }
        }
    }

    CloseReason::ClientClosed
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::mpsc;
    use pretty_assertions::assert_eq;

    use super::*;

    fn peer() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 12345))
    }

    async fn wait_for_sessions(hub: &Hub, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.session_count() != count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("Sessions should register");
    }

    #[test]
    fn transitions() {
        use SessionState::*;

        assert!(Connecting.can_become(Open));
        assert!(Open.can_become(Closing));
        assert!(Closing.can_become(Closed));
        assert!(Connecting.can_become(Closing));

        assert!(!Open.can_become(Connecting));
        assert!(!Closed.can_become(Open));
        assert!(!Connecting.can_become(Closed));
        assert!(!Open.can_become(Open));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut session = Session::new(peer());
        assert_eq!(session.state(), SessionState::Connecting);

        assert!(!session.transition(SessionState::Closed));
        assert_eq!(session.state(), SessionState::Connecting);

        assert!(session.transition(SessionState::Open));
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn events_are_written_as_json() {
        let hub = Hub::default();
        let (out_tx, mut out_rx) = mpsc::unbounded::<String>();
        let (_in_tx, in_rx) = mpsc::unbounded::<Inbound>();

        let session = tokio::spawn(Session::new(peer()).run(hub.clone(), out_tx, in_rx));
        wait_for_sessions(&hub, 1).await;

        hub.publish(Event::Pedal);
        hub.publish(Event::Pedal);

        assert_eq!(out_rx.next().await.as_deref(), Some(r#"{"type":"pedal"}"#));
        assert_eq!(out_rx.next().await.as_deref(), Some(r#"{"type":"pedal"}"#));

        session.abort();
    }

    #[tokio::test]
    async fn client_close_deregisters() {
        let hub = Hub::default();
        let (out_tx, _out_rx) = mpsc::unbounded::<String>();
        let (in_tx, in_rx) = mpsc::unbounded::<Inbound>();

        let session = tokio::spawn(Session::new(peer()).run(hub.clone(), out_tx, in_rx));
        wait_for_sessions(&hub, 1).await;

        in_tx.unbounded_send(Inbound::Other).unwrap();
        in_tx.unbounded_send(Inbound::Close).unwrap();

        assert_eq!(session.await.unwrap(), CloseReason::ClientClosed);
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn send_failure_closes_only_that_session() {
        let hub = Hub::default();

        let (broken_tx, broken_rx) = mpsc::unbounded::<String>();
        drop(broken_rx);
        let (_broken_in_tx, broken_in_rx) = mpsc::unbounded::<Inbound>();

        let (ok_tx, mut ok_rx) = mpsc::unbounded::<String>();
        let (_ok_in_tx, ok_in_rx) = mpsc::unbounded::<Inbound>();

        let broken = tokio::spawn(Session::new(peer()).run(hub.clone(), broken_tx, broken_in_rx));
        let ok = tokio::spawn(Session::new(peer()).run(hub.clone(), ok_tx, ok_in_rx));
        wait_for_sessions(&hub, 2).await;

        hub.publish(Event::Pedal);

        assert!(matches!(
            broken.await.unwrap(),
            CloseReason::SendFailure(_)
        ));
        assert_eq!(hub.session_count(), 1);

        hub.publish(Event::Pedal);
        assert_eq!(ok_rx.next().await.as_deref(), Some(r#"{"type":"pedal"}"#));
        assert_eq!(ok_rx.next().await.as_deref(), Some(r#"{"type":"pedal"}"#));

        ok.abort();
    }
}
