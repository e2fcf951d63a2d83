//! Full run: ingest, classify, then print summaries

use anyhow::Result;
use std::io::Write;
use std::path::Path;

use crate::config::Config;
use crate::source::FileType;
use crate::store::EventStore;

pub fn run<W: Write>(
    store: &EventStore,
    config: &Config,
    file: &Path,
    file_type: FileType,
    out: &mut W,
) -> Result<()> {
    super::ingest::run(store, config, file, file_type)?;
    super::analyze::run(store, out)
}
