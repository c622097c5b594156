/// Opening serial ports.
pub(crate) mod serial_port;

/// Codecs for decoding messages from the wire.
pub mod codecs;

/// The baud rate used if nothing else is configured.
pub const DEFAULT_BAUD: u32 = 9600;
