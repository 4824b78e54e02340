//! modelsmith - LLM-assisted synthesis of BI data models and queries
//!
//! Turns a natural-language intent ("suggest a model", "fix this model",
//! "answer this question") into a validated structured artifact by prompting
//! a completion service, caching identical requests by prompt fingerprint,
//! extracting strict JSON from free-form output, and iteratively repairing
//! invalid candidates against an external validator.
//!
//! ## Pipeline
//! intent -> prompt builder -> completion service (cache-checked) ->
//! extractor -> candidate -> validator -> repair loop back into the builder
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use modelsmith::{
//!     CompletionService, MokaPromptCache, OpenAiClient, OpenAiConfig,
//!     RepairLoop, RestBiClient,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Arc::new(OpenAiClient::new(OpenAiConfig::from_env()?)?);
//! let cache = Arc::new(MokaPromptCache::default());
//! let completion = Arc::new(CompletionService::new(backend, cache));
//! let validator = Arc::new(RestBiClient::new("http://localhost:3000"));
//! let repair = RepairLoop::new(completion, validator);
//! # let _ = repair; Ok(())
//! # }
//! ```

// Core error handling
pub mod error;

// Domain types shared across the pipeline
pub mod model;

// Completion cache and prompt fingerprinting
pub mod cache;

// Configuration for backend, cache, and repair policy
pub mod config;

// Streaming completion service
pub mod completion;

// Strict JSON extraction from completion text
pub mod extract;

// Prompt builders for each synthesis task
pub mod prompt;

// Candidate model synthesis
pub mod synthesizer;

// External collaborator contracts (validator, SQL runner)
pub mod client;

// Synthesize-validate-repair state machine
pub mod repair;

// Question-to-query translation
pub mod query;

pub use cache::{fingerprint, CacheError, MokaPromptCache, PromptCache};
pub use client::{ClientError, ModelValidator, RestBiClient, SqlError, SqlResult, SqlRunner};
pub use completion::{ChunkStream, CompletionBackend, CompletionChunk, CompletionService, OpenAiClient};
pub use config::{CacheConfig, OpenAiConfig, RepairPolicy};
pub use error::SynthesisError;
pub use extract::extract_json;
pub use model::{
    collect_validation_errors, Column, ColumnDataType, ColumnRole, Connection, DatabaseType,
    Filter, FilterValue, Formula, Join, JoinClause, Model, PossibleModel, Query, QueryFilter,
    SortBy, SortClause, SortDirection, Table, ValidationResult,
};
pub use query::QueryTranslator;
pub use repair::{AcceptedModel, RepairLoop};
pub use synthesizer::ModelSynthesizer;
