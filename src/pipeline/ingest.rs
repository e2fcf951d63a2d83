//! Ingestion: raw lines -> parsed events -> batched store writes

use anyhow::{Context, Result};
use std::io::BufRead;
use tracing::{debug, info, warn};

use crate::config::{Config, ParsePolicy};
use crate::error::{IngestError, ParseError};
use crate::event::{parse_line, Event, Message, StatusChange};
use crate::store::EventStore;

/// Knobs for one ingestion run
#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub parse_policy: ParsePolicy,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size(),
            parse_policy: config.ingest.parse_policy,
        }
    }
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What an ingestion run saw and wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Non-blank lines read
    pub lines: u64,
    /// Lines that parsed as messages
    pub messages: u64,
    /// Lines that parsed as status changes
    pub status_changes: u64,
    /// Rows actually added (duplicates excluded)
    pub written: u64,
    /// Lines rejected by the parser
    pub skipped: u64,
    /// Non-empty flushes to the store
    pub flushes: u64,
}

impl IngestReport {
    pub fn duplicates(&self) -> u64 {
        (self.messages + self.status_changes).saturating_sub(self.written)
    }
}

/// Two independent buffers, each flushed on its own once full
pub struct Batcher<'a> {
    store: &'a EventStore,
    batch_size: usize,
    messages: Vec<Message>,
    statuses: Vec<StatusChange>,
    report: IngestReport,
}

impl<'a> Batcher<'a> {
    pub fn new(store: &'a EventStore, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            messages: Vec::with_capacity(batch_size),
            statuses: Vec::with_capacity(batch_size),
            report: IngestReport::default(),
        }
    }

    /// Buffer one event, flushing its buffer if that fills it
    pub fn push(&mut self, event: Event) -> Result<()> {
        match event {
            Event::Message(msg) => {
                self.report.messages += 1;
                self.messages.push(msg);
                if self.messages.len() >= self.batch_size {
                    self.flush_messages()?;
                }
            }
            Event::Status(status) => {
                self.report.status_changes += 1;
                self.statuses.push(status);
                if self.statuses.len() >= self.batch_size {
                    self.flush_statuses()?;
                }
            }
        }
        Ok(())
    }

    #[cfg(test)]
    fn pending(&self) -> (usize, usize) {
        (self.messages.len(), self.statuses.len())
    }

    fn flush_messages(&mut self) -> Result<()> {
        if self.messages.is_empty() {
            return Ok(());
        }
        let written = self
            .store
            .insert_messages(&self.messages)
            .context("Failed to flush message batch")?;
        debug!(
            buffered = self.messages.len(),
            written, "flushed message batch"
        );
        self.report.written += written as u64;
        self.report.flushes += 1;
        self.messages.clear();
        Ok(())
    }

    fn flush_statuses(&mut self) -> Result<()> {
        if self.statuses.is_empty() {
            return Ok(());
        }
        let written = self
            .store
            .insert_status_changes(&self.statuses)
            .context("Failed to flush status batch")?;
        debug!(
            buffered = self.statuses.len(),
            written, "flushed status batch"
        );
        self.report.written += written as u64;
        self.report.flushes += 1;
        self.statuses.clear();
        Ok(())
    }

    /// Flush whatever is left in both buffers
    pub fn finish(mut self) -> Result<IngestReport> {
        self.flush_statuses()?;
        self.flush_messages()?;
        Ok(self.report)
    }
}

/// Ingest every line of `reader` into `store`, then refresh the sites table.
///
/// Under [`ParsePolicy::Skip`] bad lines are logged and counted; under
/// [`ParsePolicy::Strict`] the first one aborts with [`IngestError::Parse`].
/// Batches flushed before an abort stay committed.
pub fn ingest<R: BufRead>(
    store: &EventStore,
    mut reader: R,
    options: &IngestOptions,
) -> Result<IngestReport> {
    info!(batch_size = options.batch_size, "ingesting events");

    let mut batcher = Batcher::new(store, options.batch_size);
    let mut skipped = 0u64;
    let mut lines = 0u64;
    let mut line_number = 0u64;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = reader
            .read_until(b'\n', &mut buf)
            .context("Failed to read input")?;
        if read == 0 {
            break;
        }
        line_number += 1;

        let parsed = match std::str::from_utf8(&buf) {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => {
                lines += 1;
                parse_line(line.trim_end_matches(['\r', '\n']))
            }
            Err(_) => {
                lines += 1;
                Err(ParseError::Encoding)
            }
        };

        match parsed {
            Ok(event) => batcher.push(event)?,
            Err(source) => match options.parse_policy {
                ParsePolicy::Skip => {
                    warn!(line = line_number, error = %source, "skipping unparseable line");
                    skipped += 1;
                }
                ParsePolicy::Strict => {
                    return Err(IngestError::Parse {
                        line: line_number,
                        source,
                    }
                    .into());
                }
            },
        }
    }

    let mut report = batcher.finish()?;
    report.lines = lines;
    report.skipped = skipped;

    let new_sites = store.rebuild_sites()?;
    info!(
        lines = report.lines,
        messages = report.messages,
        status_changes = report.status_changes,
        written = report.written,
        skipped = report.skipped,
        new_sites,
        "ingestion finished"
    );
    if report.skipped > 0 {
        warn!(skipped = report.skipped, "some lines could not be parsed");
    }

    Ok(report)
}
