pub mod analyze;
pub mod ingest;
pub mod run;
pub mod stats;

use crate::pipeline::IngestReport;

/// Progress goes to stderr; stdout is reserved for summary lines
pub(crate) fn print_ingest_report(report: &IngestReport) {
    eprintln!(
        "Ingested {} lines: {} messages, {} status changes ({} new rows, {} duplicates)",
        report.lines,
        report.messages,
        report.status_changes,
        report.written,
        report.duplicates(),
    );
    eprintln!("Skipped {} unparseable lines", report.skipped);
}
