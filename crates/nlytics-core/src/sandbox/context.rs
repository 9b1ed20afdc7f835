//! Per-execution state: the global namespace, captured output and the
//! interrupt flag the watchdog raises.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::ExecutorConfig;
use crate::dataset::Dataset;

use super::builtins;
use super::capture::OutputCapture;
use super::fault::{Fault, FaultClass};
use super::value::{ModuleKind, Value};

/// Everything one program run can see or change. Built fresh per execution
/// and dropped with it; nothing leaks between runs.
#[derive(Debug)]
pub struct ExecutionContext {
    pub(crate) globals: IndexMap<String, Value>,
    pub(crate) capture: OutputCapture,
    interrupt: Arc<AtomicBool>,
    timeout_ms: u64,
    limit: usize,
    importable: Vec<ModuleKind>,
}

impl ExecutionContext {
    /// Bind builtins, the configured module aliases and a private copy of
    /// `dataset` under the configured name.
    pub fn new(
        config: &ExecutorConfig,
        dataset: &Dataset,
        timeout_ms: u64,
        interrupt: Arc<AtomicBool>,
    ) -> Self {
        let mut globals = IndexMap::new();
        for name in builtins::initial_names() {
            if let Some(value) = builtins::lookup(name) {
                globals.insert(name.to_string(), value);
            }
        }
        let mut importable = Vec::new();
        for (alias, module) in &config.module_bindings {
            if let Some(kind) = ModuleKind::from_name(module) {
                globals.insert(alias.clone(), Value::Module(kind));
                if !importable.contains(&kind) {
                    importable.push(kind);
                }
            }
        }
        globals.insert(config.dataset_name.clone(), Value::Frame(dataset.clone()));

        Self {
            globals,
            capture: OutputCapture::new(config.max_output_bytes),
            interrupt,
            timeout_ms,
            limit: config.max_collection_len,
            importable,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn timeout_fault(&self) -> Fault {
        Fault::new(
            FaultClass::Timeout,
            format!("Execution timeout after {} ms", self.timeout_ms),
        )
    }

    /// Module a program may `import` under `name`.
    pub fn module(&self, name: &str) -> Option<ModuleKind> {
        ModuleKind::from_name(name).filter(|kind| self.importable.contains(kind))
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    pub fn take_global(&mut self, name: &str) -> Option<Value> {
        self.globals.shift_remove(name)
    }

    /// Captured `(stdout, stderr)`.
    pub fn into_output(self) -> (String, String) {
        self.capture.into_parts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataFrame, Scalar};

    fn context(config: &ExecutorConfig) -> ExecutionContext {
        let df = DataFrame::from_columns(vec![("x", vec![Scalar::Int(1)])]).unwrap();
        ExecutionContext::new(config, &df, 1000, Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn test_initial_bindings() {
        let ctx = context(&ExecutorConfig::default());
        assert!(matches!(ctx.global("df"), Some(Value::Frame(_))));
        assert!(matches!(ctx.global("pd"), Some(Value::Module(ModuleKind::Pandas))));
        assert!(matches!(ctx.global("len"), Some(Value::Builtin("len"))));
        assert!(matches!(ctx.global("eval"), Some(Value::Stub("eval"))));
        assert!(ctx.global("os").is_none());
    }

    #[test]
    fn test_only_bound_modules_are_importable() {
        let mut config = ExecutorConfig::default();
        config.module_bindings.retain(|_, m| m == "pandas");
        let ctx = context(&config);
        assert_eq!(ctx.module("pandas"), Some(ModuleKind::Pandas));
        assert_eq!(ctx.module("numpy"), None);
        assert_eq!(ctx.module("os"), None);
    }

    #[test]
    fn test_timeout_message() {
        let ctx = context(&ExecutorConfig::default());
        assert_eq!(
            ctx.timeout_fault().message,
            "Execution timeout after 1000 ms"
        );
    }
}
