//! Composition of one source and one target into a runnable transfer.

use std::time::{Duration, Instant};

use tracing::info;

use crate::drivers::{Driver, FetchOptions};
use crate::error::Result;
use crate::source::Source;
use crate::target::Target;

/// Outcome of a completed transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub rows: u64,
    pub elapsed: Duration,
}

/// One source wired to one target.
///
/// Running the pipeline moves every row, batch by batch, in a single pass:
/// the read stream's backpressure keeps memory bounded and the write side
/// finishes a batch before the next one is pulled.
pub struct Pipeline {
    source: Source,
    target: Target,
    options: FetchOptions,
    limit: Option<u64>,
}

impl Pipeline {
    pub fn new(source: Source, target: Target) -> Self {
        Self {
            source,
            target,
            options: FetchOptions::default(),
            limit: None,
        }
    }

    /// Override the default fetch tuning.
    pub fn with_options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    /// Transfer at most `limit` rows, for sampling and smoke tests.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// One-line description of the transfer plan.
    pub fn summary(&self) -> String {
        format!("{} -> {}", self.source.summary(), self.target.summary())
    }

    /// Run the transfer to completion.
    pub async fn run(&self) -> Result<TransferReport> {
        info!(plan = %self.summary(), "starting transfer");
        let start = Instant::now();

        let stream = self.source.to_stream_limit(self.limit, &self.options).await?;
        let rows = self.target.ingest(stream).await?;

        let elapsed = start.elapsed();
        info!(rows, elapsed_ms = elapsed.as_millis() as u64, "transfer complete");
        Ok(TransferReport { rows, elapsed })
    }

    /// Run with explicit drivers, bypassing endpoint dispatch.
    pub async fn run_with_drivers(
        &self,
        reader: &dyn Driver,
        writer: &dyn Driver,
    ) -> Result<TransferReport> {
        let start = Instant::now();
        let stream = self
            .source
            .to_stream_with_driver(reader, self.limit, &self.options)
            .await?;
        let rows = self.target.ingest_with_driver(writer, stream).await?;
        Ok(TransferReport {
            rows,
            elapsed: start.elapsed(),
        })
    }
}
