use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::source::Record;

/// The marker the sensor prints for each revolution.
pub const DEFAULT_MARKER: &str = ".";

/// Something that happened on the device, as sent to listeners.
///
/// Serialized with the variant name in a `type` field,
/// so a pedal event is `{"type":"pedal"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// The pedal (or fan) went round once.
    Pedal,
}

impl Event {
    /// The JSON text sent over the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Serialize should work")
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Pedal => write!(f, "pedal"),
        }
    }
}

/// Classifies records as events or noise.
#[derive(Debug, Clone)]
pub struct Detector {
    marker: Vec<u8>,
}

impl Detector {
    /// A detector recognizing the given marker.
    /// Whitespace around the marker does not count.
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.trim().as_bytes().to_vec(),
        }
    }

    /// Turn a record into an event, if it is one.
    ///
    /// Surrounding whitespace is ignored.
    /// Anything else is noise and yields `None`.
    pub fn classify(&self, record: &Record) -> Option<Event> {
        if record.trimmed() == self.marker.as_slice() {
            Some(Event::Pedal)
        } else {
            debug!(%record, "Noise");
            None
        }
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}
