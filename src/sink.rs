//! Node sinks shipped with the crate.

use anyhow::{anyhow, Result};
use std::io::Write;
use std::sync::Mutex;

use crate::models::NodePayload;
use crate::traits::NodeSink;

/// Writes each node as one JSON line to the wrapped writer.
///
/// Used by the CLI to hand nodes to a downstream process over stdout or a file.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|_| anyhow!("node writer lock poisoned"))
    }
}

impl<W: Write + Send> NodeSink for JsonLinesSink<W> {
    fn create_node(&self, node: NodePayload) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow!("node writer lock poisoned"))?;
        serde_json::to_writer(&mut *writer, &node)?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}
