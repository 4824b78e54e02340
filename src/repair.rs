//! Repair loop: synthesize a candidate, validate it, and re-synthesize from
//! the collected errors until accepted or the attempt budget runs out.
//!
//! States: Synthesizing -> Validating -> Accepted, or Validating -> Repairing
//! -> Validating -> ... -> Accepted | Exhausted. A validator transport
//! failure is terminal and never treated as a structural-invalid result.
//! Each entry into Repairing issues exactly one upstream completion (subject
//! to caching); persistence of the accepted model is the caller's concern.

use std::sync::Arc;

use tracing::{info, warn};

use crate::client::ModelValidator;
use crate::completion::CompletionService;
use crate::config::RepairPolicy;
use crate::error::SynthesisError;
use crate::extract::extract_json;
use crate::model::{collect_validation_errors, Connection, Model, PossibleModel, Table};
use crate::prompt;
use crate::synthesizer::ModelSynthesizer;

/// A structurally valid model, as normalized by the validator.
#[derive(Debug, Clone)]
pub struct AcceptedModel {
    pub model: Model,
    /// Repair cycles it took to get here; 0 means first-pass acceptance.
    pub repairs: u32,
}

/// Bounded synthesize-validate-repair state machine.
pub struct RepairLoop {
    synthesizer: ModelSynthesizer,
    completion: Arc<CompletionService>,
    validator: Arc<dyn ModelValidator>,
    policy: RepairPolicy,
}

impl RepairLoop {
    pub fn new(
        completion: Arc<CompletionService>,
        validator: Arc<dyn ModelValidator>,
    ) -> Self {
        Self {
            synthesizer: ModelSynthesizer::new(completion.clone()),
            completion,
            validator,
            policy: RepairPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Produce an accepted model for `suggestion`, or fail.
    ///
    /// The caller's `connection` is attached to every candidate before
    /// validation and to the accepted result; synthesized candidates never
    /// carry one of their own.
    pub async fn run(
        &self,
        metadata: &[Table],
        suggestion: &PossibleModel,
        connection: &Connection,
        hint: Option<&str>,
    ) -> Result<AcceptedModel, SynthesisError> {
        let mut candidate = self.synthesizer.synthesize(metadata, suggestion, hint).await?;
        let mut repairs: u32 = 0;

        loop {
            let mut to_validate = candidate.clone();
            to_validate.connection = Some(connection.clone());

            let result = self
                .validator
                .validate(&to_validate)
                .await
                .map_err(SynthesisError::ValidationService)?;

            let errors = collect_validation_errors(&result.model.tables);
            if errors.is_empty() {
                info!(model = %candidate.name, repairs, "model accepted");
                let mut accepted = result.model;
                accepted.connection = Some(connection.clone());
                return Ok(AcceptedModel {
                    model: accepted,
                    repairs,
                });
            }

            if repairs >= self.policy.max_repair_attempts {
                return Err(SynthesisError::RepairExhausted {
                    attempts: repairs + 1,
                    errors,
                });
            }
            repairs += 1;

            warn!(
                model = %candidate.name,
                attempt = repairs,
                errors = errors.len(),
                "model invalid, attempting repair"
            );

            let relevant = relevant_metadata(metadata, &candidate);
            let prompt = prompt::repair_model(&relevant, &candidate, &errors.join(", "), hint);
            let text = self.completion.complete(&prompt).await?;
            candidate = extract_json(&text)?;
            // Never trust a connection the model emitted.
            candidate.connection = None;
        }
    }
}

/// Metadata entries for the tables the candidate actually uses.
fn relevant_metadata<'a>(metadata: &'a [Table], candidate: &Model) -> Vec<&'a Table> {
    metadata
        .iter()
        .filter(|meta| candidate.tables.iter().any(|t| meta.matches_name(&t.name)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::cache::MokaPromptCache;
    use crate::client::ClientError;
    use crate::completion::{ChunkStream, CompletionBackend, CompletionChunk};
    use crate::model::{Column, DatabaseType, ValidationResult};

    use super::*;

    /// Backend that records every prompt and answers by substring route.
    struct RecordingBackend {
        routes: Vec<(&'static str, String)>,
        prompts: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl RecordingBackend {
        fn new(routes: Vec<(&'static str, String)>) -> Self {
            Self {
                routes,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        fn repair_prompts(&self) -> Vec<String> {
            self.prompts
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.contains("Fix the following model"))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl CompletionBackend for RecordingBackend {
        async fn open_stream(&self, prompt: &str) -> Result<ChunkStream, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            let response = self
                .routes
                .iter()
                .find(|(needle, _)| prompt.contains(needle))
                .map(|(_, response)| response.clone())
                .unwrap_or_else(|| panic!("no route for prompt: {prompt}"));
            let chunks: Vec<Result<CompletionChunk, SynthesisError>> =
                vec![Ok(CompletionChunk {
                    delta: Some(response),
                })];
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        fn model_name(&self) -> &str {
            "recording"
        }
    }

    /// Validator that replays a scripted sequence of results.
    struct StubValidator {
        results: Mutex<VecDeque<Result<ValidationResult, ClientError>>>,
        calls: AtomicUsize,
    }

    impl StubValidator {
        fn new(results: Vec<Result<ValidationResult, ClientError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelValidator for StubValidator {
        async fn validate(&self, _model: &Model) -> Result<ValidationResult, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .expect("validator called more times than scripted")
        }
    }

    fn column(name: &str, validated: bool) -> Column {
        Column {
            id: name.to_string(),
            db_name: name.to_uppercase(),
            name: name.to_string(),
            alias: None,
            role: None,
            data_type: None,
            aggregation_type: None,
            validated: Some(validated),
        }
    }

    fn normalized_table(valid_columns: &[(&str, bool)]) -> Table {
        Table {
            id: "t1".into(),
            db_name: "ORDERS".into(),
            name: "orders".into(),
            schema: None,
            alias: None,
            validated: Some(true),
            columns: valid_columns
                .iter()
                .map(|(name, ok)| column(name, *ok))
                .collect(),
        }
    }

    fn normalized_result(valid_columns: &[(&str, bool)]) -> ValidationResult {
        ValidationResult {
            model: Model {
                id: "m1".into(),
                name: "Sales".into(),
                display_name: None,
                connection: None,
                tables: vec![normalized_table(valid_columns)],
                joins: vec![],
                formulas: vec![],
                filters: vec![],
            },
            db_tables: vec![],
        }
    }

    fn connection() -> Connection {
        Connection {
            id: "conn-1".into(),
            name: "warehouse".into(),
            host: "localhost".into(),
            port: 5432,
            user: "user".into(),
            password: "secret".into(),
            database: "analytics".into(),
            db_type: DatabaseType::Postgres,
            schema: None,
            warehouse: None,
            role: None,
        }
    }

    fn metadata() -> Vec<Table> {
        vec![Table {
            id: "meta-orders".into(),
            db_name: "ORDERS".into(),
            name: "orders".into(),
            schema: None,
            alias: None,
            validated: None,
            columns: vec![column("id", false), column("total", false)],
        }]
    }

    fn suggestion() -> PossibleModel {
        PossibleModel {
            name: "Sales".into(),
            tables: vec!["orders".into()],
            reason: "revenue".into(),
        }
    }

    fn table_route() -> (&'static str, String) {
        (
            "definition of the table orders",
            r#"{"id":"t1","dbName":"ORDERS","name":"orders","columns":[
                {"id":"c1","dbName":"ID","name":"id"},
                {"id":"c2","dbName":"TOTAL","name":"total"}
            ]}"#
            .to_string(),
        )
    }

    fn repair_route() -> (&'static str, String) {
        (
            "Fix the following model",
            r#"{"id":"m2","name":"Sales","tables":[{"id":"t1","dbName":"ORDERS","name":"orders","columns":[{"id":"c2","dbName":"TOTAL","name":"total"}]}],"joins":[],"formulas":[],"filters":[]}"#
                .to_string(),
        )
    }

    fn repair_loop(
        backend: Arc<RecordingBackend>,
        validator: Arc<StubValidator>,
    ) -> RepairLoop {
        let completion = Arc::new(CompletionService::new(
            backend,
            Arc::new(MokaPromptCache::default()),
        ));
        RepairLoop::new(completion, validator)
    }

    #[tokio::test]
    async fn first_pass_valid_model_is_accepted_with_zero_repairs() {
        let backend = Arc::new(RecordingBackend::new(vec![table_route()]));
        let validator = Arc::new(StubValidator::new(vec![Ok(normalized_result(&[
            ("id", true),
            ("total", true),
        ]))]));
        let repair = repair_loop(backend.clone(), validator.clone());

        let accepted = repair
            .run(&metadata(), &suggestion(), &connection(), None)
            .await
            .unwrap();

        assert_eq!(accepted.repairs, 0);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
        assert!(backend.repair_prompts().is_empty());
        // The accepted model is the validator's normalized view with the
        // caller's connection re-attached.
        assert_eq!(accepted.model.connection, Some(connection()));
        assert_eq!(accepted.model.tables[0].validated, Some(true));
    }

    #[tokio::test]
    async fn invalid_column_triggers_exactly_one_repair() {
        let backend = Arc::new(RecordingBackend::new(vec![table_route(), repair_route()]));
        let validator = Arc::new(StubValidator::new(vec![
            Ok(normalized_result(&[("id", true), ("total", false)])),
            Ok(normalized_result(&[("total", true)])),
        ]));
        let repair = repair_loop(backend.clone(), validator.clone());

        let accepted = repair
            .run(&metadata(), &suggestion(), &connection(), None)
            .await
            .unwrap();

        assert_eq!(accepted.repairs, 1);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 2);

        let repair_prompts = backend.repair_prompts();
        assert_eq!(repair_prompts.len(), 1);
        assert!(repair_prompts[0].contains("Invalid Column: total in Table: orders"));
    }

    #[tokio::test]
    async fn still_invalid_after_budget_is_exhausted() {
        let backend = Arc::new(RecordingBackend::new(vec![table_route(), repair_route()]));
        let validator = Arc::new(StubValidator::new(vec![
            Ok(normalized_result(&[("total", false)])),
            Ok(normalized_result(&[("total", false)])),
        ]));
        let repair = repair_loop(backend, validator);

        let result = repair
            .run(&metadata(), &suggestion(), &connection(), None)
            .await;

        match result {
            Err(SynthesisError::RepairExhausted { attempts, errors }) => {
                assert_eq!(attempts, 2);
                assert!(errors
                    .iter()
                    .any(|e| e.contains("Invalid Column: total")));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wider_policy_allows_more_repairs() {
        let backend = Arc::new(RecordingBackend::new(vec![table_route(), repair_route()]));
        let validator = Arc::new(StubValidator::new(vec![
            Ok(normalized_result(&[("total", false)])),
            Ok(normalized_result(&[("total", false)])),
            Ok(normalized_result(&[("total", true)])),
        ]));
        let repair = repair_loop(backend.clone(), validator)
            .with_policy(RepairPolicy { max_repair_attempts: 3 });

        let accepted = repair
            .run(&metadata(), &suggestion(), &connection(), None)
            .await
            .unwrap();
        assert_eq!(accepted.repairs, 2);
    }

    #[tokio::test]
    async fn validator_failure_is_terminal_not_repaired() {
        let backend = Arc::new(RecordingBackend::new(vec![table_route()]));
        let validator = Arc::new(StubValidator::new(vec![Err(ClientError::Status {
            status: 503,
            body: "validator down".into(),
        })]));
        let repair = repair_loop(backend.clone(), validator);

        let result = repair
            .run(&metadata(), &suggestion(), &connection(), None)
            .await;

        assert!(matches!(
            result,
            Err(SynthesisError::ValidationService(_))
        ));
        assert!(backend.repair_prompts().is_empty());
    }

    #[tokio::test]
    async fn candidate_is_validated_with_connection_attached() {
        struct CapturingValidator {
            saw_connection: AtomicUsize,
        }

        #[async_trait]
        impl ModelValidator for CapturingValidator {
            async fn validate(&self, model: &Model) -> Result<ValidationResult, ClientError> {
                if model.connection.is_some() {
                    self.saw_connection.fetch_add(1, Ordering::SeqCst);
                }
                Ok(ValidationResult {
                    model: Model {
                        connection: None,
                        ..model.clone()
                    },
                    db_tables: vec![],
                })
            }
        }

        let backend = Arc::new(RecordingBackend::new(vec![table_route(), repair_route()]));
        let validator = Arc::new(CapturingValidator {
            saw_connection: AtomicUsize::new(0),
        });
        let completion = Arc::new(CompletionService::new(
            backend,
            Arc::new(MokaPromptCache::default()),
        ));
        let repair = RepairLoop::new(completion, validator.clone());

        // The echoed candidate carries no validity flags, so the run ends in
        // exhaustion; the assertion is about what the validator observed.
        let result = repair
            .run(&metadata(), &suggestion(), &connection(), None)
            .await;

        assert!(matches!(result, Err(SynthesisError::RepairExhausted { .. })));
        assert_eq!(validator.saw_connection.load(Ordering::SeqCst), 2);
    }
}
