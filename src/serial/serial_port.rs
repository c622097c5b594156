use futures::StreamExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace};

use crate::{
    error::SourceError,
    serial::{codecs::lines::LinesCodec, DEFAULT_BAUD},
    source::Record,
};

fn try_create_serial_port(path: &str, baud: u32) -> Result<SerialStream, SourceError> {
    serialport::new(path, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .open_native_async()
        .map_err(|e| SourceError::Unavailable {
            device: path.to_owned(),
            problem: e.to_string(),
        })
}

/// Builder for [`SerialLines`].
///
/// The builder itself is cheap and may open the same port many times,
/// once per (re)connection.
#[derive(Debug, Clone)]
pub struct SerialPortBuilder {
    path: String,
    baud: u32,
    line_codec: LinesCodec,
}

impl SerialPortBuilder {
    /// Start a new builder.
    /// The tty should likely be along the lines of `/dev/ttyACMx` on unix, and `COMx` on Windows.
    pub fn new(tty: &str) -> Self {
        Self {
            path: tty.to_owned(),
            baud: DEFAULT_BAUD,
            line_codec: LinesCodec::default(),
        }
    }

    /// Set the serial port builder's baud.
    pub fn set_baud(mut self, baud: u32) -> Self {
        self.baud = baud;
        self
    }

    /// Set the [`LinesCodec`] to use.
    pub fn set_line_codec(mut self, codec: LinesCodec) -> Self {
        self.line_codec = codec;
        self
    }

    /// The path of the port.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The baud rate the port is opened with.
    pub fn baud(&self) -> u32 {
        self.baud
    }

    /// Open the port.
    /// The port stays open for as long as the returned [`SerialLines`] lives.
    pub(crate) fn open(&self) -> Result<SerialLines, SourceError> {
        info!(path = %self.path, baud = %self.baud, "Opening serial port");

        let stream = try_create_serial_port(&self.path, self.baud)?;

        Ok(SerialLines {
            frames: FramedRead::new(stream, self.line_codec.clone()),
        })
    }
}

/// An open serial port, read line by line.
pub struct SerialLines {
    frames: FramedRead<SerialStream, LinesCodec>,
}

impl SerialLines {
    pub(crate) async fn next_line(&mut self) -> Result<Record, SourceError> {
        match self.frames.next().await {
            Some(Ok(line)) => {
                trace!("Line from port: `{:?}`", &line[..line.len().min(32)]);
                Ok(Record::new(line))
            }
            Some(Err(e)) => {
                debug!(?e, "Serial port read error");
                Err(e)
            }
            None => Err(SourceError::Disconnected),
        }
    }
}
