#![deny(missing_docs)]
#![doc = include_str!("../README.md")]

/// Code relating to setting up the server which accepts connections and runs the relay.
pub mod server;

/// A listening client.
pub mod client;

/// The command line interface.
pub mod cli;

/// Handles incoming websockets.
pub(crate) mod websocket;

/// One connected listener and its lifecycle.
pub mod session;

/// Fans events out to sessions.
pub mod hub;

/// Reads the device and publishes what it finds.
pub mod relay;

/// Events and how records are classified as such.
pub mod event;

/// Where records come from.
pub mod source;

/// A mocked device.
pub mod mock;

/// Serial port driver.
pub mod serial;

/// Relates to config files.
pub mod config;

/// Possible errors in this library.
pub mod error;

/// Logging/tracing setup.
pub mod logging;
