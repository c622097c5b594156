//! Line sources turn a device into a sequence of [`Record`]s.
//!
//! A [`Connect`] implementation knows how to open a device,
//! and an opened device is a [`LineSource`].
//! When a source fails it is dropped, and a fresh one is opened via the connector.

use std::fmt::Display;

use async_trait::async_trait;

use crate::error::SourceError;

pub(crate) mod mock;
pub(crate) mod serial;

/// A source producing synthetic records on a clock.
pub mod simulated;

/// One delimiter-terminated unit read from a device.
/// The delimiter itself is not included.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Record(Vec<u8>);

impl Record {
    /// Create a record from the bytes of a line.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw bytes of the line.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The line without leading or trailing ASCII whitespace.
    pub fn trimmed(&self) -> &[u8] {
        let bytes = self.as_bytes();

        let start = bytes
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(bytes.len());
        let end = bytes
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(start, |position| position + 1);

        &bytes[start..end]
    }
}

impl<T: AsRef<[u8]>> From<T> for Record {
    fn from(bytes: T) -> Self {
        Self(bytes.as_ref().to_vec())
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = String::from_utf8_lossy(&self.0)
            .chars()
            .take(48)
            .collect::<String>();

        write!(f, "{}", s.trim())
    }
}

/// Something which produces records, one line at a time.
#[async_trait]
pub trait LineSource: Send {
    /// Wait for the next complete record.
    ///
    /// An error means the source is done for,
    /// and should be dropped.
    async fn next_record(&mut self) -> Result<Record, SourceError>;
}

/// Something which can open a fresh [`LineSource`].
#[async_trait]
pub trait Connect: Send + Sync {
    /// Open the device.
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError>;

    /// A human readable description, used in logs.
    fn describe(&self) -> String;
}
