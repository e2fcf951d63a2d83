//! Ingest command implementation

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::pipeline::{self, IngestOptions};
use crate::source::{self, FileType};
use crate::store::EventStore;

/// Load a log file and classify its messages, without printing summaries
pub fn run(store: &EventStore, config: &Config, file: &Path, file_type: FileType) -> Result<()> {
    tracing::info!(file = %file.display(), ftype = file_type.as_str(), "reading input");
    let reader = source::open_lines(file, file_type)?;
    let report = pipeline::ingest(store, reader, &IngestOptions::from_config(config))?;
    super::print_ingest_report(&report);

    let classified = pipeline::classify(store, config.classify.policy)?;
    eprintln!(
        "Classified {} messages ({} chats, {} emails)",
        classified.examined, classified.chats, classified.emails
    );
    Ok(())
}
