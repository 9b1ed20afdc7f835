use std::time::Instant;

use nlytics_core::sandbox::{ExecutionOutcome, FaultKind, ResultValue, SandboxExecutor, ScalarValue};
use nlytics_core::{DataFrame, PipelineConfig, Scalar};

fn executor() -> SandboxExecutor {
    let config = PipelineConfig::standard().with_dataset_name("dataset");
    SandboxExecutor::new(config.executor).unwrap()
}

fn prices() -> DataFrame {
    DataFrame::from_columns(vec![(
        "price",
        vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30)],
    )])
    .unwrap()
}

fn sales() -> DataFrame {
    DataFrame::from_columns(vec![
        (
            "region",
            vec!["north".into(), "south".into(), "north".into(), "east".into()],
        ),
        (
            "revenue",
            vec![Scalar::Int(100), Scalar::Int(40), Scalar::Int(60), Scalar::Float(12.5)],
        ),
        (
            "units",
            vec![Scalar::Int(3), Scalar::Null, Scalar::Int(2), Scalar::Int(1)],
        ),
    ])
    .unwrap()
}

fn run(code: &str, data: &DataFrame) -> ExecutionOutcome {
    executor().execute(code, data, 2_000)
}

fn error_class(outcome: &ExecutionOutcome) -> &str {
    outcome.error.as_ref().map(|e| e.class.as_str()).unwrap_or("")
}

// ── Reference scenarios ─────────────────────────────────────────────────

#[test]
fn sum_of_price_column() {
    let outcome = run("result = dataset['price'].sum()", &prices());
    assert!(outcome.success);
    assert_eq!(outcome.result, Some(ResultValue::Scalar(ScalarValue::Int(60))));
}

#[test]
fn infinite_loop_times_out() {
    let started = Instant::now();
    let outcome = run("while true: pass\nresult=1", &prices());
    let elapsed = started.elapsed().as_millis();
    assert!(!outcome.success);
    assert!(outcome.is_timeout());
    let err = outcome.error.unwrap();
    assert_eq!(err.kind, FaultKind::TimeoutFault);
    assert_eq!(err.message, "Execution timeout after 2000 ms");
    assert!(elapsed >= 1_900, "returned after {elapsed} ms");
    assert!(elapsed < 3_500, "returned after {elapsed} ms");
}

#[test]
fn large_membership_test_finishes_inside_timeout() {
    let started = Instant::now();
    let code = "s = pd.Series(list(range(100000)))\nresult = s.isin(list(range(100000))).sum()";
    let outcome = executor().execute(code, &prices(), 1_000);
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.result, Some(ResultValue::Scalar(ScalarValue::Int(100_000))));
    assert!(started.elapsed().as_millis() < 1_500);
}

// ── Resource bounds ─────────────────────────────────────────────────────

#[test]
fn nested_repetition_fails_instead_of_exhausting_memory() {
    let outcome = run("x = [0] * 1000000\ny = [x] * 40\nresult = len(y)", &prices());
    assert!(!outcome.success);
    let err = outcome.error.unwrap();
    assert_eq!(err.kind, FaultKind::RuntimeFault);
    assert_eq!(err.class, "ValueError");
    assert!(err.message.contains("limit"), "{}", err.message);
}

#[test]
fn copies_built_by_comprehension_are_bounded() {
    let outcome = run("x = [0] * 1000000\ny = [x for _ in range(40)]\nresult = 1", &prices());
    assert_eq!(error_class(&outcome), "ValueError");
}

#[test]
fn string_growth_is_bounded() {
    let outcome = run("s = 'a' * 2000\nresult = s.replace('a', s)", &prices());
    assert_eq!(error_class(&outcome), "ValueError");
    let outcome = run("result = '-'.join(['x' * 900000, 'y' * 900000])", &prices());
    assert_eq!(error_class(&outcome), "ValueError");
}

// ── Isolation ───────────────────────────────────────────────────────────

#[test]
fn caller_dataset_is_never_mutated() {
    let data = sales();
    let before = data.clone();
    let programs = [
        "dataset['revenue'] = 0\nresult = dataset",
        "dataset.sort_values('revenue', inplace=True)\nresult = 1",
        "dataset.drop(columns=['units'], inplace=True)\nresult = 1 / 0",
        "dataset.loc[dataset['region'] == 'north', 'units'] = 99\nresult = dataset['units'].sum()",
    ];
    for code in programs {
        run(code, &data);
        assert_eq!(data, before, "mutated by: {code}");
    }
}

#[test]
fn each_run_gets_a_fresh_context() {
    let data = prices();
    assert!(run("leftover = 5\nresult = leftover", &data).success);
    let outcome = run("result = leftover", &data);
    assert_eq!(error_class(&outcome), "NameError");
}

// ── Closed surface ──────────────────────────────────────────────────────

#[test]
fn aliased_dynamic_evaluation_is_still_blocked() {
    let outcome = run("f = eval\nresult = f('1 + 1')", &prices());
    assert!(!outcome.success);
    assert_eq!(outcome.error.as_ref().unwrap().kind, FaultKind::RuntimeFault);
    assert_eq!(error_class(&outcome), "DisallowedOperation");
}

#[test]
fn dunder_traversal_is_blocked() {
    let outcome = run("result = dataset.__class__", &prices());
    assert_eq!(error_class(&outcome), "DisallowedOperation");
}

#[test]
fn pandas_io_is_a_stub() {
    let outcome = run("result = pd.read_csv('data.csv')", &prices());
    assert_eq!(error_class(&outcome), "DisallowedOperation");
}

#[test]
fn unknown_module_import_fails() {
    let outcome = run("import socket\nresult = 1", &prices());
    assert!(!outcome.success);
    assert_eq!(error_class(&outcome), "DisallowedOperation");
}

// ── Analysis surface ────────────────────────────────────────────────────

#[test]
fn groupby_sum_returns_labeled_sequence() {
    let outcome = run(
        "result = dataset.groupby('region')['revenue'].sum().sort_values(ascending=False)",
        &sales(),
    );
    assert!(outcome.success, "{:?}", outcome.error);
    let series = outcome.result.as_ref().and_then(ResultValue::as_series).unwrap();
    assert_eq!(series.values[0], Scalar::Int(160));
    assert_eq!(series.index.label(0), Scalar::Text("north".into()));
}

#[test]
fn filter_and_select_returns_frame() {
    let code = "high = dataset[dataset['revenue'] > 50]\nresult = high[['region', 'revenue']]";
    let outcome = run(code, &sales());
    let frame = outcome.result.as_ref().and_then(ResultValue::as_frame).unwrap();
    assert_eq!(frame.n_rows(), 2);
    assert_eq!(frame.column_names(), vec!["region", "revenue"]);
}

#[test]
fn dict_result_becomes_mapping() {
    let code = "result = {'rows': len(dataset), 'mean': dataset['price'].mean()}";
    match run(code, &prices()).result {
        Some(ResultValue::Mapping(map)) => {
            assert_eq!(map["rows"], ResultValue::Scalar(ScalarValue::Int(3)));
            assert_eq!(map["mean"], ResultValue::Scalar(ScalarValue::Float(20.0)));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn numpy_helpers_are_available() {
    let outcome = run("result = round(np.mean(dataset['price'].tolist()), 1)", &prices());
    assert_eq!(outcome.result.and_then(|r| r.as_f64()), Some(20.0));
}

// ── Diagnostics ─────────────────────────────────────────────────────────

#[test]
fn runtime_fault_carries_trace_and_output() {
    let outcome = run("print('checking')\nresult = dataset['missing']", &prices());
    assert!(!outcome.success);
    assert_eq!(outcome.stdout, "checking\n");
    let err = outcome.error.unwrap();
    assert_eq!(err.class, "KeyError");
    assert_eq!(err.line, Some(2));
    assert!(err.trace.unwrap().contains("line 2"));
}

#[test]
fn missing_result_is_empty_not_an_error() {
    let outcome = run("total = dataset['price'].sum()", &prices());
    assert!(outcome.success);
    assert_eq!(outcome.result, Some(ResultValue::Empty));
}
