//! A serial port line source.

use async_trait::async_trait;

use super::{Connect, LineSource, Record};
use crate::{
    error::SourceError,
    serial::serial_port::{SerialLines, SerialPortBuilder},
};

#[async_trait]
impl Connect for SerialPortBuilder {
    async fn connect(&self) -> Result<Box<dyn LineSource>, SourceError> {
        Ok(Box::new(self.open()?))
    }

    fn describe(&self) -> String {
        format!("serial port {} @ {} baud", self.path(), self.baud())
    }
}

#[async_trait]
impl LineSource for SerialLines {
    async fn next_record(&mut self) -> Result<Record, SourceError> {
        self.next_line().await
    }
}
