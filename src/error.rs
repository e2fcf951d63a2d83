//! Error types for event parsing and ingestion
//!
//! Storage and query failures are not modelled here: they travel as
//! `anyhow::Error` and abort the run.

use thiserror::Error;

/// Why a raw line could not be turned into an event
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("line is not valid UTF-8")]
    Encoding,

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("site_id `{0}` is not an integer")]
    InvalidSiteId(String),

    #[error("timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Failures raised by the ingestion phase itself
#[derive(Debug, Error)]
pub enum IngestError {
    /// Only produced under the strict parse policy
    #[error("line {line}: {source}")]
    Parse {
        line: u64,
        #[source]
        source: ParseError,
    },
}
