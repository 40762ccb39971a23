//! NDJSON output for records and reports.

use serde::Serialize;
use std::io::Write;

use crate::error::IngestError;

/// NDJSON (Newline Delimited JSON) writer
///
/// Writes values as NDJSON, one JSON object per line.
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    /// Create a new NDJSON writer
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// Write a single value as an NDJSON line
    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), IngestError> {
        let json = serde_json::to_string(value)?;
        writeln!(self.writer, "{}", json)?;
        self.written += 1;
        Ok(())
    }

    /// Write multiple values
    pub fn write_all<T: Serialize>(&mut self, values: &[T]) -> Result<(), IngestError> {
        for value in values {
            self.write(value)?;
        }
        Ok(())
    }

    /// Lines written so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> Result<(), IngestError> {
        self.writer.flush()?;
        Ok(())
    }
}
