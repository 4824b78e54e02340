//! External collaborator contracts: model validation and SQL execution.
//!
//! The pipeline never inspects a live database itself. Structural validation
//! and query execution belong to the restbi server; this module defines the
//! trait seams the pipeline consumes and a reqwest client for the server's
//! endpoints. Responses are either the expected payload or an `SqlError`
//! body, discriminated by the presence of a `message` field.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::model::{Connection, Model, Query, Table, ValidationResult};

/// Structured error reported by the SQL-side collaborator.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct SqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

/// Tabular result of an executed query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlResult {
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
}

/// Failure talking to a collaborator service.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server reported: {0}")]
    Sql(#[from] SqlError),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Validates a candidate model against the live schema.
#[async_trait]
pub trait ModelValidator: Send + Sync {
    /// Validate `model` (which must carry the real connection) and return the
    /// server's normalized view with per-table/per-column validity flags.
    async fn validate(&self, model: &Model) -> Result<ValidationResult, ClientError>;
}

/// Introspects metadata and executes structured queries.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    /// Fetch table/column metadata for a connection.
    async fn get_metadata(&self, connection: &Connection) -> Result<Vec<Table>, ClientError>;

    /// Execute a structured query against a validated model.
    async fn execute_query(&self, query: &Query, model: &Model) -> Result<SqlResult, ClientError>;
}

/// HTTP client for a restbi server.
#[derive(Clone)]
pub struct RestBiClient {
    base_url: String,
    client: reqwest::Client,
}

impl RestBiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    /// POST `body` to `path` and decode a payload-or-SqlError response.
    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "posting to restbi server");

        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        if value.get("message").map_or(false, |m| m.is_string()) {
            if let Ok(err) = serde_json::from_value::<SqlError>(value.clone()) {
                return Err(ClientError::Sql(err));
            }
        }
        serde_json::from_value(value).map_err(|e| ClientError::Status {
            status: status.as_u16(),
            body: format!("undecodable response body: {e}"),
        })
    }
}

#[async_trait]
impl ModelValidator for RestBiClient {
    async fn validate(&self, model: &Model) -> Result<ValidationResult, ClientError> {
        self.post("/validate", model).await
    }
}

#[async_trait]
impl SqlRunner for RestBiClient {
    async fn get_metadata(&self, connection: &Connection) -> Result<Vec<Table>, ClientError> {
        self.post("/metadata", connection).await
    }

    async fn execute_query(&self, query: &Query, model: &Model) -> Result<SqlResult, ClientError> {
        #[derive(Serialize)]
        struct ExecuteRequest<'a> {
            query: &'a Query,
            model: &'a Model,
        }
        self.post("/query", &ExecuteRequest { query, model }).await
    }
}
