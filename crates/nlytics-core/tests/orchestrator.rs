use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nlytics_core::orchestrator::{AttemptFailure, PipelineOutcome};
use nlytics_core::render;
use nlytics_core::{
    AnalysisRequest, CodeProducer, ConsumerError, DataFrame, GeneratedProgram, GenerationRequest,
    InsightConsumer, IssueKind, PipelineConfig, ProducerError, ResultValue, RetryOrchestrator,
    Scalar, ScriptedProducer,
};

fn dataset() -> Arc<DataFrame> {
    Arc::new(
        DataFrame::from_columns(vec![
            ("price", vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30)]),
            ("region", vec!["north".into(), "south".into(), "north".into()]),
        ])
        .unwrap(),
    )
}

fn config(max_attempts: u32, timeout_ms: u64) -> PipelineConfig {
    PipelineConfig::standard()
        .with_dataset_name("dataset")
        .with_retry(max_attempts, timeout_ms)
}

/// Always returns a program importing a different forbidden module.
#[derive(Default)]
struct AlwaysInvalid {
    feedback_seen: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl CodeProducer for AlwaysInvalid {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedProgram, ProducerError> {
        self.feedback_seen
            .lock()
            .unwrap()
            .push(request.retry_feedback.clone());
        let module = ["socket", "shutil", "pickle", "ctypes"][(request.attempt as usize - 1) % 4];
        Ok(GeneratedProgram::new(
            format!("import {module}\nresult = 1"),
            "result",
        ))
    }
}

#[derive(Default)]
struct Collector {
    results: Mutex<Vec<(ResultValue, String)>>,
}

#[async_trait]
impl InsightConsumer for Collector {
    async fn consume(&self, result: &ResultValue, query: &str, _duration_ms: u64) -> Result<(), ConsumerError> {
        self.results
            .lock()
            .unwrap()
            .push((result.clone(), query.to_string()));
        Ok(())
    }
}

// ── Exhaustion ──────────────────────────────────────────────────────────

#[tokio::test]
async fn always_invalid_producer_stops_after_max_attempts() {
    let producer = Arc::new(AlwaysInvalid::default());
    let orch = RetryOrchestrator::new(config(3, 2_000), producer.clone()).unwrap();
    let report = orch
        .run(&AnalysisRequest::new("list files"), dataset())
        .await
        .unwrap();

    match &report.outcome {
        PipelineOutcome::Failed {
            attempts,
            last: AttemptFailure::Invalid(validation),
        } => {
            assert_eq!(*attempts, 3);
            assert!(validation.has_kind(IssueKind::UnauthorizedImport));
            assert!(validation.errors[0].message.contains("pickle"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(report.attempts.len(), 3);
    assert!(report.attempts.iter().all(|a| a.execution.is_none()));
    assert!(report.attempts[2].feedback.is_none());

    let seen = producer.feedback_seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen[0].is_none());
    let first = seen[1].as_deref().unwrap();
    let second = seen[2].as_deref().unwrap();
    assert_ne!(first, second);
    assert!(first.contains("socket"));
    assert!(second.contains("shutil"));
    assert!(first.starts_with("The generated code has issues:"));

    let snap = orch.metrics().snapshot();
    assert_eq!(snap.validations, 3);
    assert_eq!(snap.rejected_programs, 3);
    assert_eq!(snap.executions, 0);
    assert_eq!(snap.retries, 2);
}

#[tokio::test]
async fn single_attempt_budget_never_retries() {
    let producer = Arc::new(AlwaysInvalid::default());
    let orch = RetryOrchestrator::new(config(1, 2_000), producer.clone()).unwrap();
    let report = orch.run(&AnalysisRequest::new("q"), dataset()).await.unwrap();
    assert_eq!(report.outcome.attempts(), 1);
    assert_eq!(producer.feedback_seen.lock().unwrap().len(), 1);
}

// ── Recovery ────────────────────────────────────────────────────────────

#[tokio::test]
async fn recovers_from_invalid_then_runtime_failure() {
    let producer = Arc::new(ScriptedProducer::new([
        GeneratedProgram::new("top = dataset.nlargest(2, 'price')", "result"),
        GeneratedProgram::new("result = dataset['cost'].sum()", "result"),
        GeneratedProgram::new("result = dataset.groupby('region')['price'].sum()", "result"),
    ]));
    let collector = Arc::new(Collector::default());
    let orch = RetryOrchestrator::new(config(3, 2_000), producer.clone())
        .unwrap()
        .with_consumer(collector.clone());
    let report = orch
        .run(&AnalysisRequest::new("price by region"), dataset())
        .await
        .unwrap();

    assert!(report.outcome.is_success());
    assert_eq!(report.outcome.attempts(), 3);

    let requests = producer.requests();
    let shape_feedback = requests[1].retry_feedback.as_deref().unwrap();
    assert!(shape_feedback.contains("ShapeError"));
    let runtime_feedback = requests[2].retry_feedback.as_deref().unwrap();
    assert!(runtime_feedback.starts_with("Execution failed:"));
    assert!(runtime_feedback.contains("cost"));

    let results = collector.results.lock().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].1, "price by region");
    let series = results[0].0.as_series().unwrap();
    assert_eq!(series.values, vec![Scalar::Int(40), Scalar::Int(20)]);

    let notice = render::retry_notice(2, 3, shape_feedback);
    assert!(notice.starts_with("**Retrying** (Attempt 2/3)"));
}

#[tokio::test]
async fn timeout_is_retried_with_feedback() {
    let producer = Arc::new(ScriptedProducer::new([
        GeneratedProgram::new("while true: pass\nresult = 1", "result"),
        GeneratedProgram::new("result = len(dataset)", "result"),
    ]));
    let orch = RetryOrchestrator::new(config(2, 200), producer.clone()).unwrap();
    let report = orch.run(&AnalysisRequest::new("rows"), dataset()).await.unwrap();
    assert!(report.outcome.is_success());
    let feedback = producer.requests()[1].retry_feedback.clone().unwrap();
    assert!(feedback.contains("Execution timeout after 200 ms"));
    assert_eq!(orch.metrics().snapshot().timeouts, 1);
}

#[tokio::test]
async fn runtime_failure_on_last_attempt_surfaces_outcome() {
    let producer = Arc::new(
        ScriptedProducer::new([GeneratedProgram::new("result = 1 / 0", "result")]).repeating(),
    );
    let orch = RetryOrchestrator::new(config(2, 2_000), producer).unwrap();
    let report = orch.run(&AnalysisRequest::new("ratio"), dataset()).await.unwrap();
    match report.outcome {
        PipelineOutcome::Failed {
            attempts: 2,
            last: AttemptFailure::Execution(outcome),
        } => assert_eq!(outcome.error.unwrap().class, "ZeroDivisionError"),
        other => panic!("unexpected {other:?}"),
    }
}

// ── Request plumbing ────────────────────────────────────────────────────

#[tokio::test]
async fn producer_sees_manifest_and_context() {
    let producer = Arc::new(ScriptedProducer::new([GeneratedProgram::new(
        "result = dataset['price'].max()",
        "result",
    )]));
    let orch = RetryOrchestrator::new(config(3, 2_000), producer.clone()).unwrap();
    let request = AnalysisRequest::new("highest price")
        .with_intent(serde_json::json!({"kind": "aggregate"}))
        .with_plan(serde_json::json!(["max of price"]));
    orch.run(&request, dataset()).await.unwrap();

    let seen = &producer.requests()[0];
    assert_eq!(seen.attempt, 1);
    assert_eq!(seen.intent, Some(serde_json::json!({"kind": "aggregate"})));
    let names: Vec<_> = seen.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["price", "region"]);
}

#[tokio::test]
async fn independent_runs_share_no_state() {
    let make = || {
        let producer = Arc::new(ScriptedProducer::new([GeneratedProgram::new(
            "dataset['price'] = 0\nresult = dataset['price'].sum()",
            "result",
        )]));
        RetryOrchestrator::new(config(1, 2_000), producer).unwrap()
    };
    let data = dataset();
    let (a, b) = (make(), make());
    let (req_a, req_b) = (AnalysisRequest::new("a"), AnalysisRequest::new("b"));
    let (ra, rb) = tokio::join!(
        a.run(&req_a, Arc::clone(&data)),
        b.run(&req_b, Arc::clone(&data)),
    );
    assert!(ra.unwrap().outcome.is_success());
    assert!(rb.unwrap().outcome.is_success());
    assert_eq!(a.metrics().snapshot().executions, 1);
    assert_eq!(b.metrics().snapshot().executions, 1);
    assert_eq!(data.column("price").unwrap().values[0], Scalar::Int(10));
}

#[tokio::test]
async fn report_serializes_to_json() {
    let producer = Arc::new(ScriptedProducer::new([GeneratedProgram::new(
        "result = dataset['price'].sum()",
        "result",
    )]));
    let orch = RetryOrchestrator::new(config(1, 2_000), producer).unwrap();
    let report = orch.run(&AnalysisRequest::new("sum"), dataset()).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"]["status"], "succeeded");
    assert_eq!(json["outcome"]["outcome"]["result"]["value"], 60);
    assert_eq!(json["attempts"][0]["program_digest"].as_str().unwrap().len(), 64);
}
