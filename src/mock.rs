//! A mock device, useful to test the relay without an actual serial port.
//!
//! Bytes written to the mock come out of the connected line source,
//! framed by the same codec a serial port uses.
//! The mock can be unplugged and plugged back in to exercise reconnection.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
struct MockState {
    plugged: bool,

    // Set while a line source is connected to the mock.
    wire: Option<mpsc::UnboundedSender<Vec<u8>>>,

    connections: usize,
}

/// A device which lives in memory.
///
/// Clones refer to the same device.
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub(crate) name: Arc<str>,
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    /// Create a new mock device, plugged in.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                plugged: true,
                wire: None,
                connections: 0,
            })),
        }
    }

    /// Put bytes on the wire.
    /// Returns `false` if nothing is connected to receive them.
    pub fn write<B: AsRef<[u8]>>(&self, bytes: B) -> bool {
        let state = self.state.lock();

        match &state.wire {
            Some(wire) => wire.send(bytes.as_ref().to_vec()).is_ok(),
            None => false,
        }
    }

    /// Write a line, appending the newline delimiter.
    pub fn write_line(&self, line: &str) -> bool {
        self.write(format!("{line}\n"))
    }

    /// Make the device disappear.
    /// A connected source sees a disconnect, and new connections fail.
    pub fn unplug(&self) {
        info!(name = %self.name, "Unplugging mock");
        let mut state = self.state.lock();

        state.plugged = false;
        state.wire = None;
    }

    /// Make the device available again.
    pub fn plug(&self) {
        info!(name = %self.name, "Plugging in mock");
        self.state.lock().plugged = true;
    }

    /// Is the device plugged in?
    pub fn is_plugged(&self) -> bool {
        self.state.lock().plugged
    }

    /// Is a line source currently connected?
    pub fn is_connected(&self) -> bool {
        self.state
            .lock()
            .wire
            .as_ref()
            .map_or(false, |wire| !wire.is_closed())
    }

    /// How many times a line source has connected to this device.
    pub fn connections(&self) -> usize {
        self.state.lock().connections
    }

    /// Hand out a fresh wire, replacing any earlier one.
    /// Returns `None` if unplugged.
    pub(crate) fn attach(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        let mut state = self.state.lock();

        if !state.plugged {
            return None;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.wire = Some(tx);
        state.connections += 1;

        debug!(name = %self.name, connections = state.connections, "Mock attached");

        Some(rx)
    }
}
