#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use color_eyre::Result;
use pedal_relay::{
    client::ClientHandle,
    config::{Config, Reconnect},
    event::Event,
    hub::Hub,
    mock::MockDevice,
    server::{self, Running},
    source::Connect,
};
use tokio::{net::TcpStream, sync::oneshot, time::timeout};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct TestServer {
    pub port: u16,
    pub hub: Hub,
    pub shutdown: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub fn test_config() -> Config {
    Config {
        bind_address: [127, 0, 0, 1].into(),
        port: 0,
        reconnect: Reconnect {
            initial_delay_ms: 5,
            max_delay_ms: 20,
        },
        ..Default::default()
    }
}

pub async fn start_server_with_connector(
    config: Config,
    connector: Arc<dyn Connect>,
) -> TestServer {
    let (started_tx, started_rx) = oneshot::channel();
    let shutdown = CancellationToken::new();

    tokio::spawn(server::run_with_connector(
        config,
        connector,
        started_tx,
        shutdown.clone(),
    ));

    let Running { port, hub } = started_rx
        .await
        .expect("Server should reply with allocated port");

    TestServer {
        port,
        hub,
        shutdown,
    }
}

/// Start a server reading from the source its configuration names.
pub async fn start_server_from_config(config: Config) -> TestServer {
    let (started_tx, started_rx) = oneshot::channel();
    let shutdown = CancellationToken::new();

    tokio::spawn(server::run_from_config_any_port(
        config,
        started_tx,
        shutdown.clone(),
    ));

    let Running { port, hub } = started_rx
        .await
        .expect("Server should reply with allocated port");

    TestServer {
        port,
        hub,
        shutdown,
    }
}

/// Start a server reading from a fresh mock device.
/// Returns once the relay is connected to the mock.
pub async fn start_server_with_mock(name: &str) -> (TestServer, MockDevice) {
    let mock = MockDevice::new(name);
    let server = start_server_with_connector(test_config(), Arc::new(mock.clone())).await;

    eventually(|| mock.is_connected()).await;

    (server, mock)
}

pub async fn eventually<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Condition should become true");
}

pub async fn wait_for_sessions(hub: &Hub, count: usize) {
    eventually(|| hub.session_count() == count).await;
}

pub async fn connect_raw(port: u16, path: &str) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    info!("Connecting to server on port {port}");
    let (stream, http_response) =
        tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}{path}")).await?;

    assert_eq!(http_response.status(), StatusCode::SWITCHING_PROTOCOLS);

    Ok(stream)
}

pub async fn connect(port: u16) -> Result<ClientHandle> {
    Ok(ClientHandle::new("127.0.0.1", port).await?)
}

pub async fn receive(client: &mut ClientHandle) -> Result<Event> {
    Ok(timeout(Duration::from_secs(5), client.next_event()).await??)
}

pub async fn assert_nothing_within(client: &mut ClientHandle, duration: Duration) {
    let result = timeout(duration, client.next_event()).await;
    assert!(result.is_err(), "Expected nothing, got {result:?}");
}
