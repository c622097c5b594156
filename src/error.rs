use std::{io, net::SocketAddr};

use thiserror::Error;

/// Errors thay may occur in this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be bound.
    /// This is the only error the server cannot recover from.
    #[error("Could not bind to `{addr}`. Problem: {problem}")]
    Bind {
        /// The address we tried to bind to.
        addr: SocketAddr,

        /// The underlying issue.
        problem: String,
    },

    /// The server stopped with an error after binding.
    #[error("The server stopped unexpectedly. Problem: {0}")]
    Serve(String),

    /// The configuration is not valid.
    #[error("Bad configuration: {0}")]
    BadConfig(String),

    /// A client had trouble with its websocket.
    #[error("Websocket problem: {0}")]
    WebsocketIssue(String),
}

impl Error {
    /// Get the message if this is a [`Error::BadConfig`].
    pub fn try_into_bad_config(self) -> Option<String> {
        if let Self::BadConfig(problem) = self {
            Some(problem)
        } else {
            None
        }
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Self::WebsocketIssue(e.to_string())
    }
}

/// Problems a line source may run into.
///
/// All of these are recoverable by reconnecting.
#[derive(Debug, Error)]
pub enum SourceError {
    /// IO related errors.
    #[error("Underlying IO problem")]
    IO(#[from] io::Error),

    /// The device could not be opened.
    #[error("Device `{device}` unavailable: {problem}")]
    Unavailable {
        /// Which device.
        device: String,

        /// Why it could not be opened.
        problem: String,
    },

    /// The device went away.
    #[error("Device disconnected")]
    Disconnected,
}
