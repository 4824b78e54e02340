//! Error taxonomy for the synthesis pipeline.
//!
//! Every failure below the repair loop propagates upward intact; only the
//! collected structural-invalid messages trigger a repair cycle, and those
//! travel as plain `Vec<String>` rather than an error until attempts run out.

use std::time::Duration;

use thiserror::Error;

use crate::client::ClientError;

/// Main error type for model/query synthesis.
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// Missing or empty credentials for the completion backend.
    #[error("authentication error: missing or empty API key")]
    Authentication,

    /// Transport-level failure talking to the completion backend.
    #[error("completion transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The completion backend answered with a non-success status.
    #[error("completion API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// No terminal chunk arrived within the wall-clock budget.
    #[error("completion timed out after {0:?} without a terminal chunk")]
    Timeout(Duration),

    /// The completion text did not parse as the expected payload.
    ///
    /// Not retried here: a differently-worded prompt is the only remedy,
    /// which is what the repair loop does for models.
    #[error("malformed completion response: {reason}; payload starts with: {snippet}")]
    MalformedResponse { reason: String, snippet: String },

    /// A suggested table name matched nothing in the connection metadata.
    #[error("table '{0}' not found in connection metadata")]
    UnknownTable(String),

    /// The validation service itself was unreachable or failed.
    ///
    /// Terminal: this is not a structural-invalid result and never triggers
    /// a repair cycle.
    #[error("validation service error: {0}")]
    ValidationService(#[source] ClientError),

    /// Repair attempts exhausted with the model still structurally invalid.
    #[error("model still invalid after {attempts} validation attempt(s): {}", .errors.join(", "))]
    RepairExhausted { attempts: u32, errors: Vec<String> },
}

impl SynthesisError {
    /// Build a [`SynthesisError::MalformedResponse`] from a parse failure,
    /// keeping a bounded, char-boundary-safe snippet of the offending text.
    pub(crate) fn malformed(err: &serde_json::Error, payload: &str) -> Self {
        const MAX_SNIPPET: usize = 200;
        let mut end = payload.len().min(MAX_SNIPPET);
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        SynthesisError::MalformedResponse {
            reason: err.to_string(),
            snippet: payload[..end].to_string(),
        }
    }
}
