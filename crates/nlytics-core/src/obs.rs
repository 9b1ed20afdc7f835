//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`pipeline_span`]
//! - Emission functions for pipeline, validation and execution events
//!
//! Events are emitted at `info!` level; faults and rejections at `warn!`.

use tracing::{info, warn};

/// Run-scoped span; every event emitted while it is entered carries `run_id`.
///
/// Async callers attach it with `tracing::Instrument` so the span is entered
/// on each poll rather than held across `.await` points:
///
/// ```ignore
/// drive(request).instrument(obs::pipeline_span(&run_id)).await
/// ```
pub fn pipeline_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("nlytics.pipeline", run_id = %run_id)
}

/// Emit event: pipeline run started.
pub fn emit_pipeline_started(run_id: &str, query: &str, max_attempts: u32) {
    info!(
        event = "pipeline.started",
        run_id = %run_id,
        query = %query,
        max_attempts = max_attempts,
    );
}

/// Emit event: a program was received from the producer.
pub fn emit_program_generated(attempt: u32, digest: &str, code_len: usize) {
    info!(
        event = "pipeline.program_generated",
        attempt = attempt,
        digest = %digest,
        code_len = code_len,
    );
}

/// Emit event: validation finished for an attempt.
pub fn emit_attempt_validated(attempt: u32, valid: bool, score: u8, errors: usize, warnings: usize) {
    if valid {
        info!(
            event = "pipeline.attempt_validated",
            attempt = attempt,
            valid = valid,
            score = score,
            warnings = warnings,
        );
    } else {
        warn!(
            event = "pipeline.attempt_validated",
            attempt = attempt,
            valid = valid,
            score = score,
            errors = errors,
            warnings = warnings,
        );
    }
}

/// Emit event: execution finished for an attempt.
pub fn emit_attempt_executed(attempt: u32, success: bool, duration_ms: u64, fault: Option<&str>) {
    match fault {
        None => info!(
            event = "pipeline.attempt_executed",
            attempt = attempt,
            success = success,
            duration_ms = duration_ms,
        ),
        Some(fault) => warn!(
            event = "pipeline.attempt_executed",
            attempt = attempt,
            success = success,
            duration_ms = duration_ms,
            fault = %fault,
        ),
    }
}

/// Emit event: another attempt will be requested with feedback.
pub fn emit_retry_scheduled(next_attempt: u32, feedback_len: usize) {
    info!(
        event = "pipeline.retry_scheduled",
        next_attempt = next_attempt,
        feedback_len = feedback_len,
    );
}

/// Emit event: pipeline reached a terminal state.
pub fn emit_pipeline_finished(run_id: &str, success: bool, attempts: u32, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        success = success,
        attempts = attempts,
        duration_ms = duration_ms,
    );
}

/// Emit event: the sandbox watchdog fired.
pub fn emit_timeout_fired(timeout_ms: u64) {
    warn!(event = "sandbox.timeout", timeout_ms = timeout_ms);
}

/// Emit event: the insight consumer failed (warning level, never fatal).
pub fn emit_consumer_error(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "pipeline.consumer_error", run_id = %run_id, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_span_create() {
        let _entered = pipeline_span("test-run-id").entered();
        emit_pipeline_started("test-run-id", "total price", 3);
        emit_attempt_validated(1, false, 75, 1, 0);
        emit_attempt_executed(1, false, 12, Some("TimeoutFault"));
        emit_pipeline_finished("test-run-id", false, 1, 12);
    }
}
