//! Query translator: free-text question to structured query.
//!
//! The prompt forbids aggregation and aliasing inside column names; that is
//! a prompt-level constraint only — downstream execution enforces it.

use std::sync::Arc;

use tracing::debug;

use crate::completion::CompletionService;
use crate::error::SynthesisError;
use crate::extract::extract_json;
use crate::model::{Query, Table};
use crate::prompt;

/// Maps a question plus the available columns into a structured query.
pub struct QueryTranslator {
    completion: Arc<CompletionService>,
}

impl QueryTranslator {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    /// Translate `question` against the columns of `tables`.
    ///
    /// No repair cycle here: a malformed completion surfaces as
    /// [`SynthesisError::MalformedResponse`] for the caller.
    pub async fn translate(
        &self,
        tables: &[Table],
        question: &str,
    ) -> Result<Query, SynthesisError> {
        let prompt = prompt::translate_question(tables, question);
        let text = self.completion.complete(&prompt).await?;
        let query: Query = extract_json(&text)?;
        debug!(columns = query.columns.len(), "question translated to query");
        Ok(query)
    }
}
