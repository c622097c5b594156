use std::net::SocketAddr;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, WebSocketUpgrade,
    },
    response::IntoResponse,
    Extension, TypedHeader,
};
use futures::{future, SinkExt, StreamExt};
use tracing::{debug, info};

use crate::{
    hub::Hub,
    session::{Inbound, Session},
};

pub(crate) async fn ws_handler(
    ws: WebSocketUpgrade,
    user_agent: Option<TypedHeader<headers::UserAgent>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Extension(hub): Extension<Hub>,
) -> impl IntoResponse {
    if let Some(TypedHeader(user_agent)) = user_agent {
        info!("`{}`@`{addr}` connected", user_agent.as_str());
    } else {
        info!("`{addr}` connected");
    }

    ws.on_upgrade(move |socket| handle_websocket(socket, addr, hub))
}

fn to_inbound(message: Result<Message, axum::Error>) -> Inbound {
    match message {
        Ok(Message::Close(_)) => Inbound::Close,
        Ok(other) => {
            debug!(?other, "Inbound message");
            Inbound::Other
        }
        Err(e) => {
            debug!(%e, "Read error");
            Inbound::Close
        }
    }
}

pub(crate) async fn handle_websocket(websocket: WebSocket, addr: SocketAddr, hub: Hub) {
    let (stream_sender, stream_receiver) = websocket.split();

    let outbound = stream_sender
        .with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text))));
    let inbound = stream_receiver.map(to_inbound);

    let session = Session::new(addr);
    let reason = session.run(hub, outbound, inbound).await;

    debug!(%addr, %reason, "Websocket done");
}
