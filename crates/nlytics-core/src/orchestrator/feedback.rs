//! Retry feedback handed to the code producer.

use crate::sandbox::ExecutionOutcome;
use crate::validator::ValidationReport;

/// One bullet per validation error, framed as a regeneration request.
pub fn invalid_code(report: &ValidationReport) -> String {
    let mut out = String::from("The generated code has issues:\n");
    for err in &report.errors {
        out.push('\n');
        if err.line > 0 {
            out.push_str(&format!("- {} (line {}): {}", err.kind, err.line, err.message));
        } else {
            out.push_str(&format!("- {}: {}", err.kind, err.message));
        }
    }
    out.push_str("\n\nPlease regenerate the code addressing these issues.");
    out
}

/// The executor's message and trace, verbatim.
pub fn runtime_failure(outcome: &ExecutionOutcome) -> String {
    match &outcome.error {
        Some(err) => match &err.trace {
            Some(trace) => format!("Execution failed: {}\n{}", err.message, trace),
            None => format!("Execution failed: {}", err.message),
        },
        None => "Execution failed: unknown error".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecutionError, FaultKind};
    use crate::validator::{IssueKind, ValidationIssue};

    #[test]
    fn test_invalid_code_lists_every_error() {
        let report = ValidationReport::from_findings(
            vec![
                ValidationIssue {
                    kind: IssueKind::SecurityViolation,
                    message: "forbidden pattern `eval(`".into(),
                    line: 2,
                },
                ValidationIssue {
                    kind: IssueKind::ShapeError,
                    message: "missing assignment to 'result'".into(),
                    line: 0,
                },
            ],
            Vec::new(),
        );
        assert_eq!(
            invalid_code(&report),
            "The generated code has issues:\n\n\
             - SecurityViolation (line 2): forbidden pattern `eval(`\n\
             - ShapeError: missing assignment to 'result'\n\n\
             Please regenerate the code addressing these issues."
        );
    }

    #[test]
    fn test_runtime_failure_carries_trace() {
        let outcome = ExecutionOutcome::failed(
            ExecutionError {
                kind: FaultKind::RuntimeFault,
                class: "KeyError".into(),
                message: "'revenue'".into(),
                trace: Some("Traceback (sandbox):\nKeyError: 'revenue'".into()),
                line: Some(1),
            },
            String::new(),
            String::new(),
            3,
        );
        let text = runtime_failure(&outcome);
        assert!(text.starts_with("Execution failed: 'revenue'\nTraceback"));
    }
}
