//! The insight consumer boundary: receives the result of a successful run.

use async_trait::async_trait;

use crate::sandbox::ResultValue;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("insight consumer failed: {message}")]
pub struct ConsumerError {
    pub message: String,
}

impl ConsumerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Called once per successful pipeline run. Failures are logged and never
/// change the pipeline outcome.
#[async_trait]
pub trait InsightConsumer: Send + Sync {
    async fn consume(
        &self,
        result: &ResultValue,
        query: &str,
        duration_ms: u64,
    ) -> Result<(), ConsumerError>;
}
