//! The retry loop: generate, validate, execute, feed back.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::metrics::Metrics;
use crate::obs;
use crate::program::GeneratedProgram;
use crate::sandbox::{ExecutionError, ExecutionOutcome, FaultKind, SandboxExecutor};
use crate::validator::{StaticValidator, ValidationReport};

use super::consumer::InsightConsumer;
use super::producer::{CodeProducer, GenerationRequest, ProducerError};
use super::state::{self, AfterExecution, AfterValidation, RetryState};

/// The only failure that ends a run without a terminal outcome.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("code producer failed on attempt {attempt}")]
    Producer {
        attempt: u32,
        #[source]
        source: ProducerError,
    },
}

/// A natural-language analysis question plus optional upstream context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub query: String,
    #[serde(default)]
    pub intent: Option<serde_json::Value>,
    #[serde(default)]
    pub plan: Option<serde_json::Value>,
}

impl AnalysisRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_intent(mut self, intent: serde_json::Value) -> Self {
        self.intent = Some(intent);
        self
    }

    pub fn with_plan(mut self, plan: serde_json::Value) -> Self {
        self.plan = Some(plan);
        self
    }
}

/// What happened on one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// SHA-256 of the program text.
    pub program_digest: String,
    pub validation: ValidationReport,
    /// Absent when validation rejected the program.
    pub execution: Option<ExecutionOutcome>,
    /// Feedback sent to the producer for the next attempt, if there was one.
    pub feedback: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Diagnostic detail of the attempt that exhausted the budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "detail", rename_all = "snake_case")]
pub enum AttemptFailure {
    Invalid(ValidationReport),
    Execution(ExecutionOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Succeeded {
        outcome: ExecutionOutcome,
        attempts: u32,
    },
    Failed {
        attempts: u32,
        last: AttemptFailure,
    },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            PipelineOutcome::Succeeded { attempts, .. } | PipelineOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub query: String,
    pub outcome: PipelineOutcome,
    pub attempts: Vec<AttemptRecord>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Drives attempts strictly one after another until success or the
/// configured attempt budget is spent.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use nlytics_core::{AnalysisRequest, PipelineConfig, RetryOrchestrator, ScriptedProducer};
/// # use nlytics_core::{DataFrame, GeneratedProgram, Scalar};
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let producer = Arc::new(ScriptedProducer::new([GeneratedProgram::new(
///     "result = df['price'].sum()",
///     "result",
/// )]));
/// let orchestrator = RetryOrchestrator::new(PipelineConfig::standard(), producer)?;
/// let df = DataFrame::from_columns(vec![("price", vec![Scalar::Int(10), Scalar::Int(20)])])?;
/// let report = orchestrator.run(&AnalysisRequest::new("total price"), Arc::new(df)).await?;
/// assert!(report.outcome.is_success());
/// # Ok(())
/// # }
/// ```
pub struct RetryOrchestrator {
    config: PipelineConfig,
    validator: StaticValidator,
    executor: Arc<SandboxExecutor>,
    producer: Arc<dyn CodeProducer>,
    consumer: Option<Arc<dyn InsightConsumer>>,
    metrics: Arc<Metrics>,
}

impl RetryOrchestrator {
    pub fn new(config: PipelineConfig, producer: Arc<dyn CodeProducer>) -> crate::error::Result<Self> {
        config.validate()?;
        let validator = StaticValidator::new(config.validator.clone())?;
        let executor = Arc::new(SandboxExecutor::new(config.executor.clone())?);
        Ok(Self {
            config,
            validator,
            executor,
            producer,
            consumer: None,
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn with_consumer(mut self, consumer: Arc<dyn InsightConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Share a counter set, e.g. with a hosting service's reporter.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one request. Program failures end up in the
    /// report; only a producer failure is an `Err`.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        dataset: Arc<Dataset>,
    ) -> Result<PipelineReport, OrchestratorError> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::pipeline_span(&run_id);
        self.run_attempts(run_id, request, dataset)
            .instrument(span)
            .await
    }

    async fn run_attempts(
        &self,
        run_id: String,
        request: &AnalysisRequest,
        dataset: Arc<Dataset>,
    ) -> Result<PipelineReport, OrchestratorError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let max_attempts = self.config.retry.max_attempts;
        obs::emit_pipeline_started(&run_id, &request.query, max_attempts);

        let columns = dataset.manifest();
        let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let mut state = RetryState::new(max_attempts);
        let mut records = Vec::new();

        let outcome = loop {
            let attempt_started = Utc::now();
            let generation = GenerationRequest {
                query: request.query.clone(),
                intent: request.intent.clone(),
                plan: request.plan.clone(),
                columns: columns.clone(),
                retry_feedback: state.last_feedback.clone(),
                attempt: state.attempt,
            };
            let program = self
                .producer
                .generate(&generation)
                .await
                .map_err(|source| OrchestratorError::Producer {
                    attempt: state.attempt,
                    source,
                })?;
            let program_digest = program.digest();
            obs::emit_program_generated(state.attempt, &program_digest, program.code.len());

            let validation = self.validator.validate_program(&program, &column_names);
            self.metrics.record_validation(validation.valid);
            obs::emit_attempt_validated(
                state.attempt,
                validation.valid,
                validation.score,
                validation.errors.len(),
                validation.warnings.len(),
            );

            let mut record = AttemptRecord {
                attempt: state.attempt,
                program_digest,
                validation: validation.clone(),
                execution: None,
                feedback: None,
                started_at: attempt_started,
            };

            let feedback = match state::after_validation(&state, &validation) {
                AfterValidation::Fail => {
                    records.push(record);
                    break PipelineOutcome::Failed {
                        attempts: state.attempt,
                        last: AttemptFailure::Invalid(validation),
                    };
                }
                AfterValidation::Retry(feedback) => feedback,
                AfterValidation::Execute => {
                    let execution = self.execute(program, Arc::clone(&dataset)).await;
                    self.record_execution(state.attempt, &execution);
                    record.execution = Some(execution.clone());
                    match state::after_execution(&state, &execution) {
                        AfterExecution::Succeed => {
                            records.push(record);
                            self.deliver(&run_id, &request.query, &execution).await;
                            break PipelineOutcome::Succeeded {
                                outcome: execution,
                                attempts: state.attempt,
                            };
                        }
                        AfterExecution::Fail => {
                            records.push(record);
                            break PipelineOutcome::Failed {
                                attempts: state.attempt,
                                last: AttemptFailure::Execution(execution),
                            };
                        }
                        AfterExecution::Retry(feedback) => feedback,
                    }
                }
            };

            self.metrics.inc_retries();
            obs::emit_retry_scheduled(state.attempt + 1, feedback.len());
            record.feedback = Some(feedback.clone());
            records.push(record);
            state = state.advance(feedback);
        };

        let duration_ms = clock.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(&run_id, outcome.is_success(), outcome.attempts(), duration_ms);
        self.metrics.flush();
        Ok(PipelineReport {
            run_id,
            query: request.query.clone(),
            outcome,
            attempts: records,
            started_at,
            duration_ms,
        })
    }

    /// Interpretation is CPU-bound, so it runs off the async workers.
    async fn execute(&self, program: GeneratedProgram, dataset: Arc<Dataset>) -> ExecutionOutcome {
        let executor = Arc::clone(&self.executor);
        let timeout_ms = self.config.retry.timeout_ms;
        let started = Instant::now();
        let task = tokio::task::spawn_blocking(move || {
            executor.execute_program(&program, &dataset, timeout_ms)
        });
        match task.await {
            Ok(outcome) => outcome,
            Err(join) => ExecutionOutcome::failed(
                ExecutionError {
                    kind: FaultKind::RuntimeFault,
                    class: "InternalError".into(),
                    message: format!("execution task failed: {join}"),
                    trace: None,
                    line: None,
                },
                String::new(),
                String::new(),
                started.elapsed().as_millis() as u64,
            ),
        }
    }

    fn record_execution(&self, attempt: u32, outcome: &ExecutionOutcome) {
        self.metrics.inc_executions();
        if outcome.is_timeout() {
            self.metrics.inc_timeouts();
        } else if !outcome.success {
            self.metrics.inc_runtime_faults();
        }
        obs::emit_attempt_executed(
            attempt,
            outcome.success,
            outcome.duration_ms,
            outcome.error.as_ref().map(|e| e.class.as_str()),
        );
    }

    async fn deliver(&self, run_id: &str, query: &str, outcome: &ExecutionOutcome) {
        let (Some(consumer), Some(result)) = (&self.consumer, &outcome.result) else {
            return;
        };
        if let Err(err) = consumer.consume(result, query, outcome.duration_ms).await {
            obs::emit_consumer_error(run_id, &err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::dataset::{DataFrame, Scalar};
    use crate::orchestrator::consumer::ConsumerError;
    use crate::orchestrator::producer::ScriptedProducer;
    use crate::sandbox::{ResultValue, ScalarValue};

    fn prices() -> Arc<Dataset> {
        Arc::new(
            DataFrame::from_columns(vec![(
                "price",
                vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30)],
            )])
            .unwrap(),
        )
    }

    fn orchestrator(programs: Vec<GeneratedProgram>, max_attempts: u32) -> (RetryOrchestrator, Arc<ScriptedProducer>) {
        let producer = Arc::new(ScriptedProducer::new(programs));
        let config = PipelineConfig::standard().with_retry(max_attempts, 2_000);
        let orch = RetryOrchestrator::new(config, producer.clone()).unwrap();
        (orch, producer)
    }

    #[derive(Default)]
    struct RecordingConsumer {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl InsightConsumer for RecordingConsumer {
        async fn consume(&self, result: &ResultValue, query: &str, _duration_ms: u64) -> Result<(), ConsumerError> {
            self.seen
                .lock()
                .unwrap()
                .push(format!("{query}:{}", result.kind_name()));
            if self.fail {
                Err(ConsumerError::new("narrative service unavailable"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let (orch, producer) = orchestrator(
            vec![GeneratedProgram::new("result = df['price'].sum()", "result")],
            3,
        );
        let report = orch.run(&AnalysisRequest::new("total"), prices()).await.unwrap();
        match &report.outcome {
            PipelineOutcome::Succeeded { outcome, attempts } => {
                assert_eq!(*attempts, 1);
                assert_eq!(outcome.result, Some(ResultValue::Scalar(ScalarValue::Int(60))));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.attempts.len(), 1);
        assert_eq!(report.attempts[0].program_digest.len(), 64);
        assert!(producer.requests()[0].retry_feedback.is_none());
        assert_eq!(producer.requests()[0].columns[0].name, "price");
    }

    #[tokio::test]
    async fn test_runtime_failure_feeds_back_then_succeeds() {
        let (orch, producer) = orchestrator(
            vec![
                GeneratedProgram::new("result = df['revenue'].sum()", "result"),
                GeneratedProgram::new("result = df['price'].max()", "result"),
            ],
            3,
        );
        let report = orch.run(&AnalysisRequest::new("max"), prices()).await.unwrap();
        assert_eq!(report.outcome.attempts(), 2);
        let feedback = producer.requests()[1].retry_feedback.clone().unwrap();
        assert!(feedback.starts_with("Execution failed:"));
        assert!(feedback.contains("revenue"));
        assert_eq!(report.attempts[0].feedback.as_deref(), Some(feedback.as_str()));
        let snap = orch.metrics().snapshot();
        assert_eq!(snap.executions, 2);
        assert_eq!(snap.runtime_faults, 1);
        assert_eq!(snap.retries, 1);
    }

    #[tokio::test]
    async fn test_invalid_program_never_executes() {
        let (orch, _) = orchestrator(vec![GeneratedProgram::new("import os\nresult = 1", "result")], 1);
        let report = orch.run(&AnalysisRequest::new("files"), prices()).await.unwrap();
        match report.outcome {
            PipelineOutcome::Failed {
                attempts: 1,
                last: AttemptFailure::Invalid(validation),
            } => assert!(!validation.valid),
            other => panic!("unexpected {other:?}"),
        }
        assert!(report.attempts[0].execution.is_none());
        assert_eq!(orch.metrics().snapshot().executions, 0);
    }

    #[tokio::test]
    async fn test_producer_error_aborts_run() {
        let (orch, _) = orchestrator(Vec::new(), 3);
        let err = orch.run(&AnalysisRequest::new("q"), prices()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Producer { attempt: 1, .. }));
    }

    #[tokio::test]
    async fn test_consumer_failure_is_not_fatal() {
        let (orch, _) = orchestrator(vec![GeneratedProgram::new("result = len(df)", "result")], 1);
        let consumer = Arc::new(RecordingConsumer {
            fail: true,
            ..Default::default()
        });
        let orch = orch.with_consumer(consumer.clone());
        let report = orch.run(&AnalysisRequest::new("rows"), prices()).await.unwrap();
        assert!(report.outcome.is_success());
        assert_eq!(consumer.seen.lock().unwrap().as_slice(), ["rows:scalar"]);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = PipelineOutcome::Failed {
            attempts: 3,
            last: AttemptFailure::Invalid(ValidationReport::from_findings(Vec::new(), Vec::new())),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["last"]["stage"], "invalid");
    }
}
