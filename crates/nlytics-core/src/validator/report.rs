//! Validation report types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Validator-originated failure classes. None of these ever reach execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    SecurityViolation,
    SyntaxError,
    ShapeError,
    UnauthorizedImport,
}

impl IssueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::SecurityViolation => "SecurityViolation",
            IssueKind::SyntaxError => "SyntaxError",
            IssueKind::ShapeError => "ShapeError",
            IssueKind::UnauthorizedImport => "UnauthorizedImport",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A blocking finding. `line` is 1-based; 0 means "whole program".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    pub message: String,
    pub line: usize,
}

/// A non-blocking finding from the column audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub message: String,
    pub line: usize,
}

/// Outcome of static analysis over one program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationWarning>,
    /// 100 − 25 per error − 5 per warning, floored at 0.
    pub score: u8,
}

impl ValidationReport {
    pub fn from_findings(errors: Vec<ValidationIssue>, warnings: Vec<ValidationWarning>) -> Self {
        let penalty = errors.len().saturating_mul(25) + warnings.len().saturating_mul(5);
        let score = 100usize.saturating_sub(penalty) as u8;
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
            score,
        }
    }

    pub fn has_kind(&self, kind: IssueKind) -> bool {
        self.errors.iter().any(|e| e.kind == kind)
    }

    pub fn errors_of(&self, kind: IssueKind) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(kind: IssueKind) -> ValidationIssue {
        ValidationIssue {
            kind,
            message: "x".into(),
            line: 1,
        }
    }

    fn warning() -> ValidationWarning {
        ValidationWarning {
            message: "w".into(),
            line: 1,
        }
    }

    #[test]
    fn test_score_formula() {
        let report = ValidationReport::from_findings(
            vec![issue(IssueKind::ShapeError)],
            vec![warning(), warning()],
        );
        assert!(!report.valid);
        assert_eq!(report.score, 65);
    }

    #[test]
    fn test_score_floors_at_zero() {
        let errors = (0..5).map(|_| issue(IssueKind::SecurityViolation)).collect();
        let report = ValidationReport::from_findings(errors, vec![]);
        assert_eq!(report.score, 0);
    }

    #[test]
    fn test_warnings_alone_keep_report_valid() {
        let report = ValidationReport::from_findings(vec![], vec![warning()]);
        assert!(report.valid);
        assert_eq!(report.score, 95);
    }

    #[test]
    fn test_kind_serializes_as_taxonomy_name() {
        let json = serde_json::to_string(&IssueKind::UnauthorizedImport).unwrap();
        assert_eq!(json, "\"UnauthorizedImport\"");
    }
}
