// Pipeline error kinds
//
// Every stage surfaces a human-readable error to the caller. Schema and
// consistency failures always stop forward progress; per-event API failures
// are logged and skipped inside the client instead of surfacing here.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconError {
    /// A required column is entirely absent from an uploaded report.
    #[error("{source_name}: required column '{column}' is missing")]
    Schema {
        source_name: &'static str,
        column: &'static str,
    },

    /// A fixture name maps to more than one event date; the caller must
    /// pick one explicitly before resolution can proceed.
    #[error("fixture '{fixture}' has {} possible dates; select one explicitly", dates.len())]
    AmbiguousEvent {
        fixture: String,
        dates: Vec<NaiveDate>,
    },

    /// The selected fixture does not appear in the fixture list at all.
    #[error("fixture '{fixture}' not found in the fixture list")]
    UnknownFixture { fixture: String },

    /// A join or filter step produced zero rows.
    #[error("no matching data after {stage}")]
    EmptyResult { stage: &'static str },

    /// The consolidated payment report does not belong to the selected
    /// fixture: only `matched` of `total` rows carry the expected
    /// (event, date) pair.
    #[error(
        "consolidated payment file does not match '{fixture}' on {date}: \
         only {matched} of {total} rows matched"
    )]
    FixtureMismatch {
        fixture: String,
        date: NaiveDate,
        matched: usize,
        total: usize,
    },

    /// Sum of box totals disagrees with the sum of consolidated payments
    /// beyond tolerance. Hard gate: no export may be produced.
    #[error(
        "pre-order total £{preorder_total:.2} does not match consolidated \
         payment total £{consolidated_total:.2}"
    )]
    Mismatch {
        preorder_total: f64,
        consolidated_total: f64,
    },

    /// Token retrieval or another non-recoverable API call failed.
    #[error("catering API call to {url} failed with status {status}")]
    Api { url: String, status: u16 },

    #[error("catering API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("snapshot parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconError>;
