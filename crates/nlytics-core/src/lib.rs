//! NLytics Core Library
//!
//! Validates, sandboxes and retries generated analysis programs over an
//! in-memory tabular dataset.

pub mod config;
pub mod dataset;
pub mod error;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod program;
pub mod render;
pub mod sandbox;
pub mod script;
pub mod telemetry;
pub mod validator;

pub use config::{ExecutorConfig, PipelineConfig, RetryConfig, ValidatorConfig};
pub use dataset::{
    ColumnInfo, DataFrame, Dataset, DatasetError, DatasetSource, InMemorySource, JsonFileSource,
    Scalar, Series,
};
pub use error::{ConfigError, Result};
pub use metrics::{Metrics, MetricsSnapshot};
pub use orchestrator::{
    AnalysisRequest, AttemptFailure, AttemptRecord, CodeProducer, ConsumerError,
    GenerationRequest, InsightConsumer, OrchestratorError, PipelineOutcome, PipelineReport,
    ProducerError, RetryOrchestrator, ScriptedProducer,
};
pub use program::GeneratedProgram;
pub use sandbox::{
    ExecutionError, ExecutionOutcome, FaultKind, ResultValue, SandboxExecutor, ScalarValue,
};
pub use script::ParseError;
pub use validator::{IssueKind, StaticValidator, ValidationIssue, ValidationReport, ValidationWarning};
