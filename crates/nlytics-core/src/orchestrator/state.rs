//! The retry state machine as pure transition functions.
//!
//! ```text
//! GENERATING -> VALIDATING
//! VALIDATING: valid   -> EXECUTING
//!             invalid -> attempt < max ? GENERATING(feedback) : FAILED
//! EXECUTING:  success -> SUCCEEDED
//!             failure -> attempt < max ? GENERATING(feedback) : FAILED
//! ```

use serde::{Deserialize, Serialize};

use crate::sandbox::ExecutionOutcome;
use crate::validator::ValidationReport;

use super::feedback;

/// The only state carried from one attempt to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryState {
    /// 1-based, monotonic, never above `max_attempts`.
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_feedback: Option<String>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 1,
            max_attempts,
            last_feedback: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// State for the next attempt.
    pub fn advance(&self, feedback: String) -> Self {
        Self {
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
            last_feedback: Some(feedback),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterValidation {
    Execute,
    Retry(String),
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AfterExecution {
    Succeed,
    Retry(String),
    Fail,
}

pub fn after_validation(state: &RetryState, report: &ValidationReport) -> AfterValidation {
    if report.valid {
        AfterValidation::Execute
    } else if state.can_retry() {
        AfterValidation::Retry(feedback::invalid_code(report))
    } else {
        AfterValidation::Fail
    }
}

pub fn after_execution(state: &RetryState, outcome: &ExecutionOutcome) -> AfterExecution {
    if outcome.success {
        AfterExecution::Succeed
    } else if state.can_retry() {
        AfterExecution::Retry(feedback::runtime_failure(outcome))
    } else {
        AfterExecution::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecutionError, FaultKind, ResultValue};
    use crate::validator::{IssueKind, ValidationIssue};

    fn invalid() -> ValidationReport {
        ValidationReport::from_findings(
            vec![ValidationIssue {
                kind: IssueKind::SyntaxError,
                message: "unexpected token".into(),
                line: 1,
            }],
            Vec::new(),
        )
    }

    fn failed() -> ExecutionOutcome {
        ExecutionOutcome::failed(
            ExecutionError {
                kind: FaultKind::TimeoutFault,
                class: "Timeout".into(),
                message: "Execution timeout after 10 ms".into(),
                trace: None,
                line: None,
            },
            String::new(),
            String::new(),
            10,
        )
    }

    #[test]
    fn test_valid_report_executes() {
        let state = RetryState::new(3);
        let report = ValidationReport::from_findings(Vec::new(), Vec::new());
        assert_eq!(after_validation(&state, &report), AfterValidation::Execute);
    }

    #[test]
    fn test_invalid_report_retries_until_last_attempt() {
        let state = RetryState::new(2);
        assert!(matches!(after_validation(&state, &invalid()), AfterValidation::Retry(_)));
        let last = state.advance("fb".into());
        assert_eq!(last.attempt, 2);
        assert_eq!(after_validation(&last, &invalid()), AfterValidation::Fail);
    }

    #[test]
    fn test_execution_transitions() {
        let state = RetryState::new(1);
        let ok = ExecutionOutcome::succeeded(ResultValue::Empty, String::new(), String::new(), 1);
        assert_eq!(after_execution(&state, &ok), AfterExecution::Succeed);
        assert_eq!(after_execution(&state, &failed()), AfterExecution::Fail);
        match after_execution(&RetryState::new(2), &failed()) {
            AfterExecution::Retry(fb) => assert!(fb.contains("Execution timeout")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_advance_records_feedback() {
        let next = RetryState::new(3).advance("fix the import".into());
        assert_eq!(next.last_feedback.as_deref(), Some("fix the import"));
        assert!(next.can_retry());
    }
}
