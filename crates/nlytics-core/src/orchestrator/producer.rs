//! The external code producer boundary.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::dataset::ColumnInfo;
use crate::program::GeneratedProgram;

/// Everything the producer is given for one attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub query: String,
    /// Structured intent from an upstream classifier, passed through opaquely.
    pub intent: Option<serde_json::Value>,
    /// Execution plan from an upstream planner, passed through opaquely.
    pub plan: Option<serde_json::Value>,
    pub columns: Vec<ColumnInfo>,
    /// Feedback describing what went wrong on the previous attempt.
    pub retry_feedback: Option<String>,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// The producer could not supply a program at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("code producer failed: {message}")]
pub struct ProducerError {
    pub message: String,
}

impl ProducerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Text-generation-backed source of programs. Its output is never trusted:
/// every program goes through the validator before it runs.
#[async_trait]
pub trait CodeProducer: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedProgram, ProducerError>;
}

/// Replays a fixed sequence of programs, one per call, and records every
/// request it receives.
#[derive(Debug, Default)]
pub struct ScriptedProducer {
    programs: Mutex<VecDeque<GeneratedProgram>>,
    requests: Mutex<Vec<GenerationRequest>>,
    repeat_last: bool,
}

impl ScriptedProducer {
    pub fn new(programs: impl IntoIterator<Item = GeneratedProgram>) -> Self {
        Self {
            programs: Mutex::new(programs.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
        }
    }

    /// Keep returning the final program once the script runs out.
    pub fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CodeProducer for ScriptedProducer {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedProgram, ProducerError> {
        self.requests
            .lock()
            .map_err(|_| ProducerError::new("request log poisoned"))?
            .push(request.clone());
        let mut programs = self
            .programs
            .lock()
            .map_err(|_| ProducerError::new("program script poisoned"))?;
        match programs.len() {
            0 => Err(ProducerError::new(format!(
                "script exhausted at attempt {}",
                request.attempt
            ))),
            1 if self.repeat_last => programs
                .front()
                .cloned()
                .ok_or_else(|| ProducerError::new("script exhausted")),
            _ => programs
                .pop_front()
                .ok_or_else(|| ProducerError::new("script exhausted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(attempt: u32) -> GenerationRequest {
        GenerationRequest {
            query: "total".into(),
            intent: None,
            plan: None,
            columns: Vec::new(),
            retry_feedback: None,
            attempt,
        }
    }

    #[tokio::test]
    async fn test_scripted_producer_replays_in_order() {
        let producer = ScriptedProducer::new([
            GeneratedProgram::new("result = 1", "result"),
            GeneratedProgram::new("result = 2", "result"),
        ]);
        assert_eq!(producer.generate(&request(1)).await.unwrap().code, "result = 1");
        assert_eq!(producer.generate(&request(2)).await.unwrap().code, "result = 2");
        assert!(producer.generate(&request(3)).await.is_err());
        assert_eq!(producer.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_repeating_producer_never_runs_out() {
        let producer =
            ScriptedProducer::new([GeneratedProgram::new("x = 1", "result")]).repeating();
        for attempt in 1..=4 {
            assert!(producer.generate(&request(attempt)).await.is_ok());
        }
    }
}
