use nlytics_core::{IssueKind, PipelineConfig, StaticValidator};

fn validator() -> StaticValidator {
    StaticValidator::new(PipelineConfig::standard().validator).unwrap()
}

const COLUMNS: &[&str] = &["price", "region", "units"];

// ── Security scan ───────────────────────────────────────────────────────

#[test]
fn deny_listed_constructs_are_security_violations() {
    let v = validator();
    let malicious = [
        "result = eval('1 + 1')",
        "result = exec('x = 1')",
        "m = __import__('os')\nresult = 1",
        "result = open('/etc/passwd').read()",
        "result = getattr(df, 'shape')",
        "result = df.__class__.__bases__",
        "result = ().__class__.__subclasses__()",
        "result = globals()",
        "import pandas as pd\nresult = pd.read_csv('x.csv')",
        "df.to_csv('out.csv')\nresult = 1",
        "result = os.listdir('.')",
        "result = sys.modules",
        "result = subprocess.run(['ls'])",
        "result = compile('1', 'f', 'eval')",
    ];
    for code in malicious {
        let report = v.validate(code, COLUMNS);
        assert!(!report.valid, "accepted: {code}");
        assert!(
            report.has_kind(IssueKind::SecurityViolation),
            "no security violation for: {code}"
        );
    }
}

#[test]
fn security_violation_reports_matching_line() {
    let report = validator().validate("x = 1\ny = 2\nresult = eval('x')", COLUMNS);
    let issue = report
        .errors_of(IssueKind::SecurityViolation)
        .next()
        .unwrap();
    assert_eq!(issue.line, 3);
    assert!(issue.message.starts_with("Dangerous operation detected:"));
}

// ── Shape and syntax ────────────────────────────────────────────────────

#[test]
fn missing_result_assignment_is_shape_error() {
    let report = validator().validate("top = dataset.nlargest(3, 'price')", COLUMNS);
    assert!(!report.valid);
    let issue = report.errors_of(IssueKind::ShapeError).next().unwrap();
    assert!(issue.message.contains("\"result\""));
}

#[test]
fn comparison_is_not_an_assignment() {
    let report = validator().validate("x = 1\nresult == x", COLUMNS);
    assert!(report.has_kind(IssueKind::ShapeError));
}

#[test]
fn syntax_error_carries_line() {
    let report = validator().validate("x = 1\nresult = (x +", COLUMNS);
    let issue = report.errors_of(IssueKind::SyntaxError).next().unwrap();
    assert!(issue.message.starts_with("Syntax error:"));
    assert!(issue.line >= 2);
}

#[test]
fn deeply_nested_blocks_are_a_syntax_error() {
    let mut code = String::new();
    for level in 0..2_000 {
        code.push_str(&" ".repeat(level));
        code.push_str("if 1:\n");
    }
    code.push_str(&" ".repeat(2_000));
    code.push_str("result = 1\n");
    let report = validator().validate(&code, COLUMNS);
    assert!(!report.valid);
    assert!(report.has_kind(IssueKind::SyntaxError));
}

// ── Imports ─────────────────────────────────────────────────────────────

#[test]
fn socket_import_is_rejected() {
    let report = validator().validate("import socket\nresult = 1", COLUMNS);
    assert!(!report.valid);
    assert!(
        report.has_kind(IssueKind::UnauthorizedImport)
            || report.has_kind(IssueKind::SecurityViolation)
    );
}

#[test]
fn allow_listed_imports_pass() {
    let code = "import pandas as pd\nimport numpy as np\nfrom numpy import mean\nresult = np.mean([1, 2])";
    let report = validator().validate(code, COLUMNS);
    assert!(report.valid, "{:?}", report.errors);
    assert_eq!(report.score, 100);
}

#[test]
fn from_import_of_unknown_module_is_rejected() {
    let report = validator().validate("from collections import Counter\nresult = 1", COLUMNS);
    let issue = report.errors_of(IssueKind::UnauthorizedImport).next().unwrap();
    assert_eq!(issue.line, 1);
}

// ── Column audit ────────────────────────────────────────────────────────

#[test]
fn unknown_column_is_only_a_warning() {
    let report = validator().validate("result = df['revenue'].sum()", COLUMNS);
    assert!(report.valid);
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.score, 95);
}

#[test]
fn known_columns_produce_no_warnings() {
    let code = "result = df.groupby('region')['price'].mean()";
    let report = validator().validate(code, COLUMNS);
    assert!(report.valid);
    assert!(report.warnings.is_empty());
}

// ── Determinism ─────────────────────────────────────────────────────────

#[test]
fn validation_is_deterministic() {
    let v = validator();
    let code = "import os\nresult = eval('1')\nresult = df['nope']";
    assert_eq!(v.validate(code, COLUMNS), v.validate(code, COLUMNS));
}
