use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use tungstenite::protocol::Message;

use crate::{error::Error, event::Event};

/// A listener connected to a relay server.
pub struct ClientHandle {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl ClientHandle {
    /// Connect to the server at the given address and port.
    pub async fn new(address: &str, port: u16) -> Result<Self, Error> {
        let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{address}:{port}/")).await?;
        debug!(%address, %port, "Connected");

        Ok(Self { stream })
    }

    /// Await the next event from the server.
    pub async fn next_event(&mut self) -> Result<Event, Error> {
        loop {
            let message = self
                .stream
                .next()
                .await
                .ok_or_else(|| Error::WebsocketIssue("Stream closed".into()))??;

            match message {
                Message::Text(text) => {
                    trace!(%text, "Message");
                    return serde_json::from_str(&text).map_err(|e| {
                        Error::WebsocketIssue(format!("Unexpected message `{text}`: {e}"))
                    });
                }
                Message::Close(frame) => {
                    return Err(Error::WebsocketIssue(format!(
                        "Server closed the connection: {frame:?}"
                    )))
                }
                other => debug!(?other, "Ignoring"),
            }
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), Error> {
        self.stream.close(None).await?;

        // Wait for the server to acknowledge.
        while let Some(message) = self.stream.next().await {
            if message.is_err() {
                break;
            }
        }

        Ok(())
    }
}
