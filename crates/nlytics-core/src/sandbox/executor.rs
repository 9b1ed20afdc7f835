//! Sandbox executor: runs one program against a private dataset copy under a
//! preemption timer and reports the outcome as a value.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ExecutorConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::obs;
use crate::program::GeneratedProgram;
use crate::script::{self, Program};

use super::context::ExecutionContext;
use super::fault::{Fault, FaultClass};
use super::interp::Interpreter;
use super::outcome::{ExecutionError, ExecutionOutcome, ResultValue};
use super::watchdog::Watchdog;

/// Stack for the interpreter thread; deep lambda recursion and nested
/// expressions recurse on the native stack.
const INTERPRETER_STACK_BYTES: usize = 64 * 1024 * 1024;

/// Executes analysis programs. Holds configuration only; every call builds
/// and tears down its own execution context, so one executor can serve any
/// number of concurrent calls.
#[derive(Debug, Clone)]
pub struct SandboxExecutor {
    config: ExecutorConfig,
}

impl SandboxExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Parse and run `code`. Never fails as a Rust error: every fault of the
    /// program is reported inside the outcome. `dataset` is only read.
    pub fn execute(&self, code: &str, dataset: &Dataset, timeout_ms: u64) -> ExecutionOutcome {
        let started = Instant::now();
        match script::parse(code) {
            Ok(program) => self.run(&program, dataset, timeout_ms, started),
            Err(e) => {
                let fault = Fault::new(FaultClass::SyntaxError, e.message.clone()).at(e.line, "parse");
                ExecutionOutcome::failed(
                    ExecutionError::from_fault(&fault),
                    String::new(),
                    String::new(),
                    elapsed_ms(started),
                )
            }
        }
    }

    /// Run a generated program, reading back its declared result variable.
    pub fn execute_program(
        &self,
        program: &GeneratedProgram,
        dataset: &Dataset,
        timeout_ms: u64,
    ) -> ExecutionOutcome {
        if program.result_name == self.config.result_name {
            return self.execute(&program.code, dataset, timeout_ms);
        }
        let executor = Self {
            config: ExecutorConfig {
                result_name: program.result_name.clone(),
                ..self.config.clone()
            },
        };
        executor.execute(&program.code, dataset, timeout_ms)
    }

    /// Run with the configured default timeout.
    pub fn execute_default(&self, code: &str, dataset: &Dataset) -> ExecutionOutcome {
        self.execute(code, dataset, self.config.default_timeout_ms)
    }

    fn run(
        &self,
        program: &Program,
        dataset: &Dataset,
        timeout_ms: u64,
        started: Instant,
    ) -> ExecutionOutcome {
        let joined = thread::scope(|scope| {
            thread::Builder::new()
                .name("nlytics-interp".into())
                .stack_size(INTERPRETER_STACK_BYTES)
                .spawn_scoped(scope, || self.interpret(program, dataset, timeout_ms, started))
                .map(|handle| handle.join())
        });

        match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "interpreter panicked".to_string());
                tracing::error!(detail = %detail, "interpreter panic contained");
                internal_failure(format!("internal interpreter error: {detail}"), started)
            }
            Err(e) => internal_failure(format!("could not start interpreter thread: {e}"), started),
        }
    }

    /// Body of the interpreter thread. Output capture and the interrupt flag
    /// live in the context; the watchdog guard is dropped on every path out
    /// of the block that armed it.
    fn interpret(
        &self,
        program: &Program,
        dataset: &Dataset,
        timeout_ms: u64,
        started: Instant,
    ) -> ExecutionOutcome {
        let interrupt = Arc::new(AtomicBool::new(false));
        let mut ctx = ExecutionContext::new(&self.config, dataset, timeout_ms, Arc::clone(&interrupt));

        let run = match Watchdog::arm(Duration::from_millis(timeout_ms), interrupt) {
            Ok(watchdog) => {
                let result = Interpreter::new(&mut ctx).run(program);
                drop(watchdog);
                result
            }
            Err(e) => Err(Fault::new(
                FaultClass::InternalError,
                format!("could not arm watchdog: {e}"),
            )),
        };

        let result = match run {
            Ok(()) => Ok(ctx
                .take_global(&self.config.result_name)
                .map(ResultValue::from_value)
                .unwrap_or(ResultValue::Empty)),
            Err(fault) => Err(fault),
        };
        let (stdout, stderr) = ctx.into_output();
        let duration_ms = elapsed_ms(started);

        match result {
            Ok(value) => {
                tracing::debug!(
                    duration_ms,
                    result_kind = value.kind_name(),
                    "program executed"
                );
                ExecutionOutcome::succeeded(value, stdout, stderr, duration_ms)
            }
            Err(fault) => {
                if fault.is_timeout() {
                    obs::emit_timeout_fired(timeout_ms);
                }
                tracing::debug!(
                    duration_ms,
                    class = %fault.class,
                    line = ?fault.line,
                    "program faulted"
                );
                ExecutionOutcome::failed(ExecutionError::from_fault(&fault), stdout, stderr, duration_ms)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn internal_failure(message: String, started: Instant) -> ExecutionOutcome {
    let fault = Fault::new(FaultClass::InternalError, message);
    ExecutionOutcome::failed(
        ExecutionError::from_fault(&fault),
        String::new(),
        String::new(),
        elapsed_ms(started),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataFrame, Scalar};
    use crate::sandbox::outcome::FaultKind;

    fn executor() -> SandboxExecutor {
        SandboxExecutor::new(ExecutorConfig::default()).unwrap()
    }

    fn data() -> DataFrame {
        DataFrame::from_columns(vec![
            ("product", vec!["a".into(), "b".into()]),
            ("revenue", vec![Scalar::Int(5), Scalar::Int(7)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_scalar_result() {
        let outcome = executor().execute("result = df['revenue'].sum()", &data(), 1000);
        assert!(outcome.success);
        assert_eq!(outcome.result.as_ref().and_then(ResultValue::as_f64), Some(12.0));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_missing_result_is_empty() {
        let outcome = executor().execute("x = 1", &data(), 1000);
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(ResultValue::Empty));
    }

    #[test]
    fn test_syntax_error_is_runtime_fault() {
        let outcome = executor().execute("result = (", &data(), 1000);
        assert!(!outcome.success);
        let err = outcome.error.unwrap();
        assert_eq!(err.kind, FaultKind::RuntimeFault);
        assert_eq!(err.class, "SyntaxError");
    }

    #[test]
    fn test_mutation_stays_private() {
        let df = data();
        let before = df.clone();
        let outcome = executor().execute("df['revenue'] = 0\nresult = df", &df, 1000);
        assert!(outcome.success);
        assert_eq!(df, before);
    }

    #[test]
    fn test_output_captured_on_failure() {
        let outcome = executor().execute("print('before')\nresult = 1 / 0", &data(), 1000);
        assert!(!outcome.success);
        assert_eq!(outcome.stdout, "before\n");
        assert_eq!(outcome.error.unwrap().class, "ZeroDivisionError");
    }

    #[test]
    fn test_declared_result_name() {
        let program = GeneratedProgram::new("answer = 42", "answer");
        let outcome = executor().execute_program(&program, &data(), 1000);
        assert_eq!(outcome.result.and_then(|r| r.as_f64()), Some(42.0));
    }
}
