//! JSON output adapter.

use anyhow::Result;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::Mutex;

/// Writes scan records as JSON Lines or as one JSON array.
pub struct JsonOutput {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonOutput {
    /// Creates a new JSON output writing to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Creates a new JSON output writing to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writes one record as a single line.
    #[allow(clippy::significant_drop_tightening)]
    pub fn write_line<T: Serialize>(&self, record: &T) -> Result<()> {
        let json = serde_json::to_string(record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writeln!(writer, "{json}")?;
        Ok(())
    }

    /// Writes a batch of records as a JSON array.
    #[allow(clippy::significant_drop_tightening)]
    pub fn write_array<T: Serialize>(&self, records: &[T], pretty: bool) -> Result<()> {
        let json = if pretty {
            serde_json::to_string_pretty(records)?
        } else {
            serde_json::to_string(records)?
        };
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writeln!(writer, "{json}")?;
        Ok(())
    }

    /// Flushes the underlying writer.
    #[allow(clippy::significant_drop_tightening)]
    pub fn flush(&self) -> Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock poisoned: {e}"))?;
        writer.flush()?;
        Ok(())
    }
}
