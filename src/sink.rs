//! Destinations for transfer results as they are recorded.

use crate::models::TransferResult;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Receives every result the executor records, in order.
pub trait ResultSink: Send {
    fn record(&mut self, result: &TransferResult);
}

/// Keeps results in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub results: Vec<TransferResult>,
}

#[cfg(test)]
impl ResultSink for MemorySink {
    fn record(&mut self, result: &TransferResult) {
        self.results.push(result.clone());
    }
}

/// Appends results to a JSON-lines ledger file.
pub struct LedgerSink {
    path: PathBuf,
    file: File,
}

impl LedgerSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open ledger: {}", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn append(&mut self, result: &TransferResult) -> Result<()> {
        let line = serde_json::to_string(result)?;
        writeln!(self.file, "{}", line)?;
        self.file.flush()?;
        Ok(())
    }
}

impl ResultSink for LedgerSink {
    fn record(&mut self, result: &TransferResult) {
        if let Err(e) = self.append(result) {
            warn!(
                "Failed to write {} to ledger {}: {}",
                result.route(),
                self.path.display(),
                e
            );
        }
    }
}

/// Fans every result out to several sinks.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl SinkSet {
    pub fn with(mut self, sink: impl ResultSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl ResultSink for SinkSet {
    fn record(&mut self, result: &TransferResult) {
        for sink in &mut self.sinks {
            sink.record(result);
        }
    }
}
