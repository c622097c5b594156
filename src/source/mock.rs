//! A mock line source.
//! Reads whatever is written to a [`MockDevice`].

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::mpsc;
use tokio_util::codec::Decoder;

use super::{Connect, LineSource, Record};
use crate::{error::SourceError, mock::MockDevice, serial::codecs::lines::LinesCodec};

struct MockLines {
    wire: mpsc::UnboundedReceiver<Vec<u8>>,
    buffer: BytesMut,
    codec: LinesCodec,
}

#[async_trait]
impl Connect for MockDevice {
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError> {
        let wire = self.attach().ok_or_else(|| SourceError::Unavailable {
            device: self.name.to_string(),
            problem: "mock is unplugged".into(),
        })?;

        Ok(Box::new(MockLines {
            wire,
            buffer: BytesMut::new(),
            codec: LinesCodec::default(),
        }))
    }

    fn describe(&self) -> String {
        format!("mock device {}", self.name)
    }
}

#[async_trait]
impl LineSource for MockLines {
    async fn next_record(&mut self) -> Result<Record, SourceError> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer)? {
                return Ok(Record::new(line));
            }

            match self.wire.recv().await {
                Some(bytes) => self.buffer.extend_from_slice(&bytes),
                None => return Err(SourceError::Disconnected),
            }
        }
    }
}
