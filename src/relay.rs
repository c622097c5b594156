//! The relay reads records from a device and publishes the events it finds.
//!
//! The device is opened through a [`Connect`] implementation.
//! If it disappears, the relay waits and reconnects with exponential backoff,
//! so the process keeps running through unplugged cables and flaky adapters.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::{
    error::SourceError,
    event::Detector,
    hub::Hub,
    source::{Connect, LineSource},
};

/// Exponential backoff, doubling from an initial delay up to a cap.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Start at `initial`, never exceeding `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);

        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// The delay to wait now. Following delays grow.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Go back to the initial delay.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// What the relay did during its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Successful connections to the device.
    pub connections: u64,

    /// Times the device went away after connecting.
    pub disconnects: u64,

    /// Records read.
    pub records: u64,

    /// Events published.
    pub events: u64,
}

/// Moves events from a device to the hub.
pub struct Relay {
    connector: Arc<dyn Connect>,
    detector: Detector,
    hub: Hub,
    backoff: Backoff,
}

impl Relay {
    /// Create a relay. Nothing happens until [`Relay::run`].
    pub fn new(connector: Arc<dyn Connect>, detector: Detector, hub: Hub, backoff: Backoff) -> Self {
        Self {
            connector,
            detector,
            hub,
            backoff,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) -> RelayStats {
        let span = info_span!("Relay", source = %self.connector.describe());

        async move {
            let mut stats = RelayStats::default();

            loop {
                let source = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    source = self.connect() => source,
                };
                stats.connections += 1;

                let problem = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    problem = self.pump(source, &mut stats) => problem,
                };
                stats.disconnects += 1;

                let delay = self.backoff.next_delay();
                warn!(%problem, ?delay, "Device lost, reconnecting");

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {},
                }
            }

            info!(?stats, "Relay stopped");
            stats
        }
        .instrument(span)
        .await
    }

    async fn connect(&mut self) -> Box<dyn LineSource> {
        loop {
            match self.connector.connect().await {
                Ok(source) => {
                    info!("Connected");
                    return source;
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(%e, ?delay, "Could not connect, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Read from the source until it fails.
    /// The source is dropped (and the device released) on return.
    async fn pump(&mut self, mut source: Box<dyn LineSource>, stats: &mut RelayStats) -> SourceError {
        let mut got_any = false;

        loop {
            let record = match source.next_record().await {
                Ok(record) => record,
                Err(e) => return e,
            };
            stats.records += 1;

            // A connection which actually produces data counts as healthy.
            if !got_any {
                got_any = true;
                self.backoff.reset();
            }

            if let Some(event) = self.detector.classify(&record) {
                let report = self.hub.publish(event.clone());
                stats.events += 1;

                info!(%event, queued = report.queued, dropped = report.overflowed, "Event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{event::Event, mock::MockDevice, session::SessionId};

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(5), Duration::from_millis(20))
    }

    async fn eventually<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Condition should become true");
    }

    #[test]
    fn backoff_doubles_up_to_max() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn backoff_max_below_initial() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(10));

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn markers_become_events() {
        let mock = MockDevice::new("relay-markers");
        let hub = Hub::default();
        let mut subscription = hub.register(SessionId::new());
        let shutdown = CancellationToken::new();

        let relay = Relay::new(
            Arc::new(mock.clone()),
            Detector::default(),
            hub.clone(),
            fast_backoff(),
        );
        let handle = tokio::spawn(relay.run(shutdown.clone()));

        eventually(|| mock.is_connected()).await;

        assert!(mock.write_line("."));
        assert!(mock.write_line("noise"));
        assert!(mock.write(".\r\n"));

        assert_eq!(subscription.next_event().await, Some(Event::Pedal));
        assert_eq!(subscription.next_event().await, Some(Event::Pedal));

        shutdown.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.connections, 1);
        assert_eq!(stats.records, 3);
        assert_eq!(stats.events, 2);
        assert_eq!(subscription.try_next_event(), None);
    }

    #[tokio::test]
    async fn reconnects_after_unplug() {
        let mock = MockDevice::new("relay-reconnect");
        let hub = Hub::default();
        let mut subscription = hub.register(SessionId::new());
        let shutdown = CancellationToken::new();

        let relay = Relay::new(
            Arc::new(mock.clone()),
            Detector::default(),
            hub.clone(),
            fast_backoff(),
        );
        let handle = tokio::spawn(relay.run(shutdown.clone()));

        eventually(|| mock.is_connected()).await;
        assert!(mock.write_line("."));
        assert_eq!(subscription.next_event().await, Some(Event::Pedal));

        mock.unplug();

        // Give the relay a few failed attempts.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert_eq!(mock.connections(), 1);

        mock.plug();
        eventually(|| mock.is_connected()).await;
        assert_eq!(mock.connections(), 2);

        assert!(mock.write_line("."));
        assert_eq!(subscription.next_event().await, Some(Event::Pedal));

        shutdown.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.connections, 2);
        assert_eq!(stats.disconnects, 1);
        assert_eq!(stats.events, 2);
    }

    #[tokio::test]
    async fn device_missing_at_start() {
        let mock = MockDevice::new("relay-late");
        mock.unplug();

        let hub = Hub::default();
        let mut subscription = hub.register(SessionId::new());
        let shutdown = CancellationToken::new();

        let relay = Relay::new(
            Arc::new(mock.clone()),
            Detector::default(),
            hub.clone(),
            fast_backoff(),
        );
        let handle = tokio::spawn(relay.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_millis(30)).await;
        mock.plug();

        eventually(|| mock.is_connected()).await;
        assert!(mock.write_line("."));
        assert_eq!(subscription.next_event().await, Some(Event::Pedal));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_while_waiting_for_device() {
        let mock = MockDevice::new("relay-shutdown");
        mock.unplug();

        let shutdown = CancellationToken::new();
        let relay = Relay::new(
            Arc::new(mock.clone()),
            Detector::default(),
            Hub::default(),
            fast_backoff(),
        );
        let handle = tokio::spawn(relay.run(shutdown.clone()));

        shutdown.cancel();
        let stats = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stats, RelayStats::default());
    }
}
