//! The three batch phases, run in order against one [`EventStore`]:
//! ingest, classify, aggregate.
//!
//! [`EventStore`]: crate::store::EventStore

mod aggregate;
mod classify;
mod ingest;

pub use aggregate::{aggregate, summarize_site, SiteSummary};
pub use classify::{classify, is_chat, ClassifyReport};
pub use ingest::{ingest, Batcher, IngestOptions, IngestReport};
