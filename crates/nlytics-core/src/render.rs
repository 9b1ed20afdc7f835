//! Markdown summaries of reports and outcomes for chat-style display.

use crate::dataset::{DataFrame, Scalar, Series};
use crate::sandbox::{ExecutionOutcome, ResultValue, ScalarValue};
use crate::validator::ValidationReport;

const MAX_TABLE_ROWS: usize = 10;
const MAX_SERIES_ITEMS: usize = 10;
const MAX_CELL_CHARS: usize = 50;
const MAX_TEXT_CHARS: usize = 500;
const MAX_TRACE_CHARS: usize = 1000;

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => &text[..cut],
        None => text,
    }
}

fn cell(value: &Scalar) -> String {
    let text = if value.is_missing() {
        "NaN".to_string()
    } else {
        value.to_string()
    };
    truncate(&text, MAX_CELL_CHARS).to_string()
}

fn line_prefix(line: usize) -> String {
    if line == 0 {
        "Program".to_string()
    } else {
        format!("Line {line}")
    }
}

pub fn validation_markdown(report: &ValidationReport) -> String {
    if report.valid && report.warnings.is_empty() {
        return format!("**Code Validation Passed** (Score: {}/100)", report.score);
    }
    let mut lines = Vec::new();
    if report.valid {
        lines.push(format!("**Code Validation Passed** (Score: {}/100)", report.score));
    } else {
        lines.push(format!("### Code Validation Failed (Score: {}/100)", report.score));
    }
    lines.push(String::new());
    if !report.errors.is_empty() {
        lines.push("**Errors:**".to_string());
        for err in &report.errors {
            lines.push(format!("- {}: {} ({})", line_prefix(err.line), err.message, err.kind));
        }
        lines.push(String::new());
    }
    if !report.warnings.is_empty() {
        lines.push("**Warnings:**".to_string());
        for warning in &report.warnings {
            lines.push(format!("- {}: {}", line_prefix(warning.line), warning.message));
        }
    }
    lines.join("\n").trim_end().to_string()
}

fn frame_table(df: &DataFrame) -> String {
    if df.n_rows() == 0 {
        return "_Empty DataFrame_".to_string();
    }
    let mut header = vec![String::new()];
    header.extend(df.column_names());
    let mut lines = vec![
        format!("| {} |", header.join(" | ")),
        format!("| {} |", vec!["---"; header.len()].join(" | ")),
    ];
    for row in 0..df.n_rows().min(MAX_TABLE_ROWS) {
        let mut cells = vec![label_text(&df.index.key(row))];
        cells.extend(df.columns.iter().map(|c| cell(&c.values[row])));
        lines.push(format!("| {} |", cells.join(" | ")));
    }
    if df.n_rows() > MAX_TABLE_ROWS {
        lines.push(format!("\n_... {} more rows_", df.n_rows() - MAX_TABLE_ROWS));
    }
    lines.join("\n")
}

fn label_text(key: &[Scalar]) -> String {
    match key {
        [single] => cell(single),
        many => format!(
            "({})",
            many.iter().map(cell).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn series_list(series: &Series) -> String {
    if series.values.is_empty() {
        return "_Empty Series_".to_string();
    }
    let mut lines: Vec<String> = series
        .values
        .iter()
        .take(MAX_SERIES_ITEMS)
        .enumerate()
        .map(|(row, v)| format!("- **{}**: {}", label_text(&series.index.key(row)), cell(v)))
        .collect();
    if series.values.len() > MAX_SERIES_ITEMS {
        lines.push(format!(
            "_... {} more items_",
            series.values.len() - MAX_SERIES_ITEMS
        ));
    }
    lines.join("\n")
}

fn result_section(result: &ResultValue, lines: &mut Vec<String>) {
    lines.push(format!("**Result Type**: {}\n", result.kind_name()));
    match result {
        ResultValue::TabularFrame(df) => {
            lines.push(format!("**Shape**: {} rows x {} columns", df.n_rows(), df.n_cols()));
            lines.push(String::new());
            lines.push(frame_table(df));
        }
        ResultValue::LabeledSequence(series) => {
            lines.push(format!("**Length**: {}", series.values.len()));
            lines.push(String::new());
            lines.push(series_list(series));
        }
        ResultValue::Scalar(scalar) => {
            let text = match scalar {
                ScalarValue::Bool(b) => if *b { "True" } else { "False" }.to_string(),
                ScalarValue::Int(i) => i.to_string(),
                ScalarValue::Float(f) => crate::dataset::format_float(*f),
                ScalarValue::Text(s) => s.clone(),
            };
            lines.push(format!("**Value**: {}", truncate(&text, MAX_TEXT_CHARS)));
        }
        ResultValue::Empty => lines.push("_No result_".to_string()),
        other => {
            let json = serde_json::to_string(other).unwrap_or_default();
            lines.push(format!("```\n{}\n```", truncate(&json, MAX_TEXT_CHARS)));
        }
    }
}

pub fn outcome_markdown(outcome: &ExecutionOutcome) -> String {
    let seconds = outcome.duration_ms as f64 / 1000.0;
    let mut lines = Vec::new();
    if outcome.success {
        lines.push("### Execution Successful".to_string());
        lines.push(format!("**Time**: {seconds:.2}s\n"));
        if let Some(result) = &outcome.result {
            result_section(result, &mut lines);
        }
        if !outcome.stdout.is_empty() {
            lines.push("\n**Console Output:**".to_string());
            lines.push(format!("```\n{}\n```", truncate(&outcome.stdout, MAX_TEXT_CHARS)));
        }
    } else {
        lines.push("### Execution Failed".to_string());
        lines.push(format!("**Time**: {seconds:.2}s"));
        let message = outcome
            .error
            .as_ref()
            .map(|e| format!("{}: {}", e.class, e.message))
            .unwrap_or_else(|| "Unknown error".to_string());
        lines.push(format!("\n**Error**: {message}"));
        if let Some(trace) = outcome.error.as_ref().and_then(|e| e.trace.as_deref()) {
            lines.push("\n**Traceback:**".to_string());
            lines.push(format!("```\n{}\n```", truncate(trace, MAX_TRACE_CHARS)));
        }
    }
    lines.join("\n")
}

/// Notice shown when another attempt is about to be requested.
pub fn retry_notice(attempt: u32, max_attempts: u32, feedback: &str) -> String {
    format!("**Retrying** (Attempt {attempt}/{max_attempts})\n\n{feedback}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{ExecutionError, FaultKind};
    use crate::validator::{IssueKind, ValidationIssue, ValidationWarning};

    #[test]
    fn test_validation_passed_is_one_line() {
        let report = ValidationReport::from_findings(Vec::new(), Vec::new());
        assert_eq!(validation_markdown(&report), "**Code Validation Passed** (Score: 100/100)");
    }

    #[test]
    fn test_validation_failed_lists_errors_and_warnings() {
        let report = ValidationReport::from_findings(
            vec![ValidationIssue {
                kind: IssueKind::UnauthorizedImport,
                message: "module 'socket' is not allowed".into(),
                line: 1,
            }],
            vec![ValidationWarning {
                message: "column 'prce' not in dataset".into(),
                line: 2,
            }],
        );
        let text = validation_markdown(&report);
        assert!(text.starts_with("### Code Validation Failed"));
        assert!(text.contains("- Line 1: module 'socket' is not allowed (UnauthorizedImport)"));
        assert!(text.contains("**Warnings:**\n- Line 2: column 'prce' not in dataset"));
    }

    #[test]
    fn test_frame_table_caps_rows() {
        let values: Vec<Scalar> = (0..12).map(Scalar::Int).collect();
        let df = DataFrame::from_columns(vec![("n", values)]).unwrap();
        let outcome = ExecutionOutcome::succeeded(
            ResultValue::TabularFrame(df),
            String::new(),
            String::new(),
            1500,
        );
        let text = outcome_markdown(&outcome);
        assert!(text.contains("**Time**: 1.50s"));
        assert!(text.contains("**Shape**: 12 rows x 1 columns"));
        assert!(text.contains("|  | n |\n| --- | --- |\n| 0 | 0 |"));
        assert!(text.contains("| 9 | 9 |"));
        assert!(!text.contains("| 10 | 10 |"));
        assert!(text.contains("_... 2 more rows_"));
    }

    #[test]
    fn test_series_list_uses_labels() {
        let series = Series::with_index(
            Some("total".into()),
            crate::dataset::Index::from_labels(None, vec![Scalar::Text("east".into())]),
            vec![Scalar::Float(2.5)],
        );
        let outcome = ExecutionOutcome::succeeded(
            ResultValue::LabeledSequence(series),
            "hello\n".into(),
            String::new(),
            0,
        );
        let text = outcome_markdown(&outcome);
        assert!(text.contains("- **east**: 2.5"));
        assert!(text.contains("**Console Output:**\n```\nhello\n\n```"));
    }

    #[test]
    fn test_failed_outcome_truncates_trace() {
        let outcome = ExecutionOutcome::failed(
            ExecutionError {
                kind: FaultKind::RuntimeFault,
                class: "ZeroDivisionError".into(),
                message: "division by zero".into(),
                trace: Some("x".repeat(1500)),
                line: Some(1),
            },
            String::new(),
            String::new(),
            0,
        );
        let text = outcome_markdown(&outcome);
        assert!(text.contains("**Error**: ZeroDivisionError: division by zero"));
        assert!(text.contains(&format!("```\n{}\n```", "x".repeat(1000))));
        assert!(!text.contains(&"x".repeat(1001)));
    }

    #[test]
    fn test_retry_notice() {
        assert_eq!(
            retry_notice(2, 3, "fix it"),
            "**Retrying** (Attempt 2/3)\n\nfix it"
        );
    }
}
