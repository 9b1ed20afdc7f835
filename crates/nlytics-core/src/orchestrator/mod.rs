//! Retry orchestration: producer and consumer boundaries, the attempt state
//! machine and the async driver.

pub mod consumer;
pub mod engine;
pub mod feedback;
pub mod producer;
pub mod state;

pub use consumer::{ConsumerError, InsightConsumer};
pub use engine::{
    AnalysisRequest, AttemptFailure, AttemptRecord, OrchestratorError, PipelineOutcome,
    PipelineReport, RetryOrchestrator,
};
pub use producer::{CodeProducer, GenerationRequest, ProducerError, ScriptedProducer};
pub use state::{after_execution, after_validation, AfterExecution, AfterValidation, RetryState};
