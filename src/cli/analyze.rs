//! Analyze command implementation

use anyhow::Result;
use std::io::Write;

use crate::pipeline;
use crate::store::EventStore;

/// Print one summary line per site to `out`
pub fn run<W: Write>(store: &EventStore, out: &mut W) -> Result<()> {
    let summaries = pipeline::aggregate(store)?;

    if summaries.is_empty() {
        eprintln!("No sites found. Run 'sitepulse ingest' first.");
        return Ok(());
    }

    for summary in summaries {
        writeln!(out, "{}", summary)?;
    }
    out.flush()?;
    Ok(())
}
