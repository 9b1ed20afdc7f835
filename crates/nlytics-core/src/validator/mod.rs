//! Static validation of generated programs.
//!
//! Pure analysis of program text; nothing is executed. Checks run in a fixed
//! order: security scan, syntax, result shape, imports, then the non-blocking
//! column audit. The security scan is pattern-based and therefore incomplete;
//! the sandbox context is the real boundary.

pub mod report;

pub use report::{IssueKind, ValidationIssue, ValidationReport, ValidationWarning};

use regex::{Regex, RegexBuilder};

use crate::config::ValidatorConfig;
use crate::error::{ConfigError, Result};
use crate::program::GeneratedProgram;
use crate::script::{self, Program, StmtKind};

/// Deterministic, side-effect-free program validator.
#[derive(Debug, Clone)]
pub struct StaticValidator {
    config: ValidatorConfig,
    deny: Vec<Regex>,
    column_literal: Regex,
}

impl StaticValidator {
    pub fn new(config: ValidatorConfig) -> Result<Self> {
        config.validate()?;
        let deny = config
            .deny_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::BadPattern {
                        pattern: p.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        let column_literal = Regex::new(r#"['"]([a-zA-Z_][a-zA-Z0-9_]*)['"]"#)
            .map_err(|source| ConfigError::BadPattern {
                pattern: "column literal".into(),
                source,
            })?;
        Ok(Self {
            config,
            deny,
            column_literal,
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validate `code` against the configured result variable.
    pub fn validate<S: AsRef<str>>(&self, code: &str, known_columns: &[S]) -> ValidationReport {
        self.check(code, &self.config.result_name, known_columns)
    }

    /// Validate a producer's program against the result name it declares.
    pub fn validate_program<S: AsRef<str>>(
        &self,
        program: &GeneratedProgram,
        known_columns: &[S],
    ) -> ValidationReport {
        self.check(&program.code, &program.result_name, known_columns)
    }

    fn check<S: AsRef<str>>(
        &self,
        code: &str,
        result_name: &str,
        known_columns: &[S],
    ) -> ValidationReport {
        let mut errors = self.security_scan(code);

        let parsed = script::parse(code);
        if let Err(e) = &parsed {
            errors.push(ValidationIssue {
                kind: IssueKind::SyntaxError,
                message: format!("Syntax error: {}", e.message),
                line: e.line,
            });
        }

        if !assigns_result(parsed.as_ref().ok(), code, result_name) {
            errors.push(ValidationIssue {
                kind: IssueKind::ShapeError,
                message: format!("Must assign final result to variable \"{result_name}\""),
                line: 0,
            });
        }

        if let Ok(program) = &parsed {
            errors.extend(self.import_audit(program));
        }

        let warnings = self.column_audit(code, known_columns);
        let report = ValidationReport::from_findings(errors, warnings);
        tracing::debug!(
            valid = report.valid,
            score = report.score,
            errors = report.errors.len(),
            warnings = report.warnings.len(),
            "program validated"
        );
        report
    }

    fn security_scan(&self, code: &str) -> Vec<ValidationIssue> {
        let mut out = Vec::new();
        for pattern in &self.deny {
            for m in pattern.find_iter(code) {
                out.push(ValidationIssue {
                    kind: IssueKind::SecurityViolation,
                    message: format!("Dangerous operation detected: {}", m.as_str()),
                    line: line_of(code, m.start()),
                });
            }
        }
        out
    }

    fn import_audit(&self, program: &Program) -> Vec<ValidationIssue> {
        let allowed = |name: &str| self.config.allowed_modules.iter().any(|m| m == name);
        let mut out = Vec::new();
        program.walk(&mut |stmt| match &stmt.kind {
            StmtKind::Import { names } => {
                for n in names.iter().filter(|n| !allowed(&n.name)) {
                    out.push(ValidationIssue {
                        kind: IssueKind::UnauthorizedImport,
                        message: format!("Unauthorized import: {}", n.name),
                        line: stmt.line,
                    });
                }
            }
            StmtKind::ImportFrom { module, .. } if !allowed(module) => {
                out.push(ValidationIssue {
                    kind: IssueKind::UnauthorizedImport,
                    message: format!("Unauthorized import from: {module}"),
                    line: stmt.line,
                });
            }
            _ => {}
        });
        out
    }

    /// Quoted identifier-like literals that are not known columns. Heuristic:
    /// misses computed references and flags unrelated strings, so it only warns.
    fn column_audit<S: AsRef<str>>(&self, code: &str, known: &[S]) -> Vec<ValidationWarning> {
        self.column_literal
            .captures_iter(code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let name = caps.get(1)?.as_str();
                let known_col = known.iter().any(|k| k.as_ref() == name);
                (!known_col && name.len() > self.config.min_column_literal_len).then(|| {
                    ValidationWarning {
                        message: format!("Column \"{name}\" not found in dataframe"),
                        line: line_of(code, whole.start()),
                    }
                })
            })
            .collect()
    }
}

fn line_of(code: &str, offset: usize) -> usize {
    code[..offset].matches('\n').count() + 1
}

/// Structural check when the program parses; otherwise a textual fallback so
/// a syntax error does not also hide a missing result assignment.
fn assigns_result(program: Option<&Program>, code: &str, name: &str) -> bool {
    if let Some(program) = program {
        return program.assigns(name);
    }
    let pattern = format!(r"\b{}\s*=([^=]|$)", regex::escape(name));
    Regex::new(&pattern).is_ok_and(|re| re.is_match(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> StaticValidator {
        StaticValidator::new(ValidatorConfig::default()).unwrap()
    }

    const COLS: &[&str] = &["price", "region", "qty"];

    #[test]
    fn test_clean_program_is_valid() {
        let report = validator().validate("result = df['price'].sum()", COLS);
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.score, 100);
    }

    #[test]
    fn test_security_violation_reports_line() {
        let report = validator().validate("x = 1\nresult = eval('1+1')", COLS);
        assert!(!report.valid);
        let issue = report.errors_of(IssueKind::SecurityViolation).next().unwrap();
        assert_eq!(issue.line, 2);
        assert!(issue.message.starts_with("Dangerous operation detected: eval"));
    }

    #[test]
    fn test_security_scan_is_case_insensitive() {
        let report = validator().validate("result = EVAL ('x')", COLS);
        assert!(report.has_kind(IssueKind::SecurityViolation));
    }

    #[test]
    fn test_syntax_error_uses_parser_line() {
        let report = validator().validate("x = 1\nresult = df.nlargest(10 'price')", COLS);
        let issue = report.errors_of(IssueKind::SyntaxError).next().unwrap();
        assert_eq!(issue.line, 2);
        assert!(issue.message.starts_with("Syntax error:"));
        assert!(!report.has_kind(IssueKind::ShapeError));
    }

    #[test]
    fn test_missing_result_is_shape_error() {
        let report = validator().validate("top = df.nlargest(3,'price')", COLS);
        assert!(!report.valid);
        let issue = report.errors_of(IssueKind::ShapeError).next().unwrap();
        assert!(issue.message.contains("\"result\""));
        assert_eq!(issue.line, 0);
    }

    #[test]
    fn test_comparison_is_not_an_assignment() {
        let report = validator().validate("x = result == 1", COLS);
        assert!(report.has_kind(IssueKind::ShapeError));
    }

    #[test]
    fn test_declared_result_name_is_honored() {
        let program = GeneratedProgram::new("answer = 42", "answer");
        let report = validator().validate_program(&program, COLS);
        assert!(report.valid);
    }

    #[test]
    fn test_unauthorized_import() {
        let report = validator().validate("import socket\nresult = 1", COLS);
        let issue = report.errors_of(IssueKind::UnauthorizedImport).next().unwrap();
        assert_eq!(issue.message, "Unauthorized import: socket");
        assert_eq!(issue.line, 1);
    }

    #[test]
    fn test_unauthorized_from_import() {
        let report = validator().validate("from pathlib import Path\nresult = 1", COLS);
        let issue = report.errors_of(IssueKind::UnauthorizedImport).next().unwrap();
        assert_eq!(issue.message, "Unauthorized import from: pathlib");
    }

    #[test]
    fn test_allowed_imports_pass() {
        let report = validator().validate("import pandas as pd\nimport numpy as np\nresult = 1", COLS);
        assert!(report.valid, "{:?}", report.errors);
    }

    #[test]
    fn test_unknown_column_literal_is_warning_only() {
        let report = validator().validate("result = df['revenue'].sum()", COLS);
        assert!(report.valid);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].message,
            "Column \"revenue\" not found in dataframe"
        );
        assert_eq!(report.score, 95);
    }

    #[test]
    fn test_short_literals_ignored_by_column_audit() {
        let report = validator().validate("result = df.sort_values('qty', ascending=True)\nx = 'ab'", COLS);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_multiple_errors_accumulate_score() {
        let report = validator().validate("import os\nx = os.listdir('.')", COLS);
        assert!(report.has_kind(IssueKind::SecurityViolation));
        assert!(report.has_kind(IssueKind::ShapeError));
        assert!(report.has_kind(IssueKind::UnauthorizedImport));
        assert_eq!(report.score, 100u8.saturating_sub(25 * report.errors.len() as u8));
    }

    #[test]
    fn test_custom_deny_pattern() {
        let mut config = ValidatorConfig::default();
        config.deny_patterns = vec![r"\bplot\s*\(".into()];
        let v = StaticValidator::new(config).unwrap();
        assert!(!v.validate("result = df.plot()", COLS).valid);
        assert!(v.validate("result = eval", COLS).valid);
    }
}
