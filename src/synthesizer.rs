//! Model synthesizer: orchestrates prompts, completions, and extraction to
//! produce candidate tables, joins, and models.
//!
//! Per-table synthesis has no cross-table dependency and runs concurrently;
//! join synthesis is a strict barrier that waits for every table. A
//! suggestion naming a table absent from the metadata fails before any
//! upstream call is spent.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::{debug, info};
use uuid::Uuid;

use crate::completion::CompletionService;
use crate::error::SynthesisError;
use crate::extract::extract_json;
use crate::model::{Join, Model, PossibleModel, Table};
use crate::prompt;

/// Produces candidate models from suggestions and connection metadata.
pub struct ModelSynthesizer {
    completion: Arc<CompletionService>,
}

impl ModelSynthesizer {
    pub fn new(completion: Arc<CompletionService>) -> Self {
        Self { completion }
    }

    /// Suggest possible models for the given schema metadata.
    pub async fn suggest_models(
        &self,
        metadata: &[Table],
        hint: Option<&str>,
    ) -> Result<Vec<PossibleModel>, SynthesisError> {
        let prompt = prompt::suggest_models(metadata, hint);
        let text = self.completion.complete(&prompt).await?;
        let suggestions: Vec<PossibleModel> = extract_json(&text)?;
        info!(count = suggestions.len(), "model suggestions produced");
        Ok(suggestions)
    }

    /// Build one table from its metadata definition.
    ///
    /// Fails with [`SynthesisError::UnknownTable`] before any upstream call
    /// when `table_name` matches neither a display name nor a storage name.
    pub async fn build_table(
        &self,
        metadata: &[Table],
        table_name: &str,
        hint: Option<&str>,
    ) -> Result<Table, SynthesisError> {
        let source = metadata
            .iter()
            .find(|t| t.matches_name(table_name))
            .ok_or_else(|| SynthesisError::UnknownTable(table_name.to_string()))?;
        let prompt = prompt::build_table(source, table_name, hint);
        let text = self.completion.complete(&prompt).await?;
        extract_json(&text)
    }

    /// Build the join list for the tables selected by a suggestion.
    pub async fn build_joins(
        &self,
        metadata: &[Table],
        suggestion: &PossibleModel,
        hint: Option<&str>,
    ) -> Result<Vec<Join>, SynthesisError> {
        let relevant = relevant_tables(metadata, &suggestion.tables);
        let prompt = prompt::build_joins(&relevant, hint);
        let text = self.completion.complete(&prompt).await?;
        extract_json(&text)
    }

    /// Build a whole model from a single prompt.
    ///
    /// One-shot alternative to [`ModelSynthesizer::synthesize`]; the emitted
    /// candidate never carries a connection regardless of what the model
    /// returned.
    pub async fn build_model(
        &self,
        metadata: &[Table],
        suggestion: &PossibleModel,
        hint: Option<&str>,
    ) -> Result<Model, SynthesisError> {
        let relevant = relevant_tables(metadata, &suggestion.tables);
        let prompt = prompt::build_model(&relevant, &suggestion.name, hint);
        let text = self.completion.complete(&prompt).await?;
        let mut candidate: Model = extract_json(&text)?;
        candidate.connection = None;
        Ok(candidate)
    }

    /// Synthesize a candidate model: every suggested table concurrently, then
    /// joins over the completed table set.
    pub async fn synthesize(
        &self,
        metadata: &[Table],
        suggestion: &PossibleModel,
        hint: Option<&str>,
    ) -> Result<Model, SynthesisError> {
        // Resolve every name up front so unrecoverable input never spends a
        // completion.
        for name in &suggestion.tables {
            if !metadata.iter().any(|t| t.matches_name(name)) {
                return Err(SynthesisError::UnknownTable(name.clone()));
            }
        }

        debug!(
            model = %suggestion.name,
            tables = suggestion.tables.len(),
            "synthesizing candidate model"
        );

        let tables = try_join_all(
            suggestion
                .tables
                .iter()
                .map(|name| self.build_table(metadata, name, hint)),
        )
        .await?;

        // Join synthesis needs the final table list; with fewer than two
        // tables there is nothing to join against.
        let joins = if tables.len() < 2 {
            Vec::new()
        } else {
            self.build_joins(metadata, suggestion, hint).await?
        };

        info!(
            model = %suggestion.name,
            tables = tables.len(),
            joins = joins.len(),
            "candidate model assembled"
        );

        Ok(Model {
            id: Uuid::new_v4().to_string(),
            name: suggestion.name.clone(),
            display_name: None,
            connection: None,
            tables,
            joins,
            formulas: Vec::new(),
            filters: Vec::new(),
        })
    }
}

/// Metadata entries selected by a suggestion, by display or storage name.
fn relevant_tables<'a>(metadata: &'a [Table], names: &[String]) -> Vec<&'a Table> {
    metadata
        .iter()
        .filter(|t| names.iter().any(|n| t.matches_name(n)))
        .collect()
}
