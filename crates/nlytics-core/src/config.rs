//! Injected pipeline configuration.
//!
//! Core components read only the struct they are constructed with. The
//! [`PipelineConfig::standard`] preset is the reference configuration; a JSON
//! file may override any subset of it.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Modules the executor knows how to bind.
pub const KNOWN_MODULES: &[&str] = &["pandas", "numpy"];

/// Static validator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Variable every program must assign.
    pub result_name: String,
    /// Case-insensitive regular expressions; each match is a security violation.
    pub deny_patterns: Vec<String>,
    /// Module names `import` / `from … import` may reference.
    pub allowed_modules: Vec<String>,
    /// Quoted identifiers shorter than or equal to this are ignored by the column audit.
    pub min_column_literal_len: usize,
}

/// Sandbox executor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Name the private dataset copy is bound under.
    pub dataset_name: String,
    /// Variable read back as the result.
    pub result_name: String,
    /// alias → module (`pandas` or `numpy`).
    pub module_bindings: IndexMap<String, String>,
    pub default_timeout_ms: u64,
    /// Upper bound on any list, range or repetition the program materializes.
    pub max_collection_len: usize,
    /// Upper bound on each captured output stream.
    pub max_output_bytes: usize,
}

/// Retry orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Per-attempt execution bound (milliseconds).
    pub timeout_ms: u64,
}

/// Everything a pipeline instance needs, injected at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub validator: ValidatorConfig,
    pub executor: ExecutorConfig,
    pub retry: RetryConfig,
}

/// Reference deny-list: dynamic evaluation, reflection, dunder access,
/// process and filesystem primitives, persistence calls.
fn standard_deny_patterns() -> Vec<String> {
    [
        r"\bopen\s*\(",
        r"\beval\s*\(",
        r"\bexec\s*\(",
        r"\b__import__\s*\(",
        r"\bcompile\s*\(",
        r"\bgetattr\s*\(",
        r"\bsetattr\s*\(",
        r"\bdelattr\s*\(",
        r"\bhasattr\s*\(",
        r"\bglobals\s*\(",
        r"\blocals\s*\(",
        r"\bvars\s*\(",
        r"\bdir\s*\(",
        r"\bbreakpoint\s*\(",
        r"\binput\s*\(",
        r"\b__builtins__",
        r"\b__dict__",
        r"\b__class__",
        r"\b__bases__",
        r"\b__subclasses__",
        r"\bos\.",
        r"\bsys\.",
        r"\bsubprocess\.",
        r"\bimportlib\.",
        r"\.to_csv\(",
        r"\.to_excel\(",
        r"\.to_sql\(",
        r"\bread_\w+\(",
        r"\.read_",
        r"\.to_pickle\(",
        r"\.to_hdf\(",
        r"\bfile\s*\(",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            result_name: "result".into(),
            deny_patterns: standard_deny_patterns(),
            allowed_modules: ["pandas", "numpy", "pd", "np"]
                .iter()
                .map(|m| (*m).to_string())
                .collect(),
            min_column_literal_len: 2,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        let mut module_bindings = IndexMap::new();
        module_bindings.insert("pd".to_string(), "pandas".to_string());
        module_bindings.insert("np".to_string(), "numpy".to_string());
        module_bindings.insert("pandas".to_string(), "pandas".to_string());
        module_bindings.insert("numpy".to_string(), "numpy".to_string());
        Self {
            dataset_name: "df".into(),
            result_name: "result".into(),
            module_bindings,
            default_timeout_ms: 30_000,
            max_collection_len: 1_000_000,
            max_output_bytes: 64 * 1024,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    /// The reference configuration.
    ///
    /// | Setting          | Value                          |
    /// |------------------|--------------------------------|
    /// | result variable  | `result`                       |
    /// | dataset binding  | `df`                           |
    /// | allowed modules  | `pandas numpy pd np`           |
    /// | max attempts     | 3                              |
    /// | timeout          | 30 000 ms                      |
    pub fn standard() -> Self {
        Self::default()
    }

    /// Override the name the dataset is bound under (builder pattern).
    pub fn with_dataset_name(mut self, name: impl Into<String>) -> Self {
        self.executor.dataset_name = name.into();
        self
    }

    /// Override the retry bounds (builder pattern).
    pub fn with_retry(mut self, max_attempts: u32, timeout_ms: u64) -> Self {
        self.retry = RetryConfig {
            max_attempts,
            timeout_ms,
        };
        self
    }

    /// Load a JSON file whose fields override the standard preset.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.as_ref().display(), "loaded pipeline configuration");
        Ok(config)
    }

    /// Reject configurations no pipeline could run with.
    pub fn validate(&self) -> Result<()> {
        self.validator.validate()?;
        self.executor.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.retry.timeout_ms == 0 {
            return Err(ConfigError::invalid("retry.timeout_ms", "must be non-zero"));
        }
        if self.validator.result_name != self.executor.result_name {
            return Err(ConfigError::invalid(
                "executor.result_name",
                format!(
                    "must match validator.result_name ({:?} vs {:?})",
                    self.executor.result_name, self.validator.result_name
                ),
            ));
        }
        Ok(())
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.result_name) {
            return Err(ConfigError::invalid(
                "validator.result_name",
                "must be an identifier",
            ));
        }
        for pattern in &self.deny_patterns {
            regex::RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::BadPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
        }
        Ok(())
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.dataset_name) {
            return Err(ConfigError::invalid(
                "executor.dataset_name",
                "must be an identifier",
            ));
        }
        if !is_identifier(&self.result_name) {
            return Err(ConfigError::invalid(
                "executor.result_name",
                "must be an identifier",
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "executor.default_timeout_ms",
                "must be non-zero",
            ));
        }
        if self.max_collection_len == 0 {
            return Err(ConfigError::invalid(
                "executor.max_collection_len",
                "must be non-zero",
            ));
        }
        for (alias, module) in &self.module_bindings {
            if !KNOWN_MODULES.contains(&module.as_str()) {
                return Err(ConfigError::UnknownModule {
                    alias: alias.clone(),
                    module: module.clone(),
                });
            }
            if !is_identifier(alias) {
                return Err(ConfigError::invalid(
                    "executor.module_bindings",
                    format!("alias {alias:?} is not an identifier"),
                ));
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_standard_preset_is_valid() {
        let config = PipelineConfig::standard();
        config.validate().unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.timeout_ms, 30_000);
        assert_eq!(config.executor.dataset_name, "df");
        assert!(config.validator.allowed_modules.contains(&"np".to_string()));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let config = PipelineConfig::standard().with_retry(0, 1000);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = PipelineConfig::standard().with_retry(3, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_deny_pattern_rejected() {
        let mut config = PipelineConfig::standard();
        config.validator.deny_patterns.push("(unclosed".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BadPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_module_binding_rejected() {
        let mut config = PipelineConfig::standard();
        config
            .executor
            .module_bindings
            .insert("s".into(), "socket".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownModule { .. })
        ));
    }

    #[test]
    fn test_mismatched_result_names_rejected() {
        let mut config = PipelineConfig::standard();
        config.executor.result_name = "output".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_overrides_preset() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"retry": {{"max_attempts": 5}}, "executor": {{"dataset_name": "dataset"}}}}"#
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.timeout_ms, 30_000);
        assert_eq!(config.executor.dataset_name, "dataset");
        assert_eq!(config.validator.result_name, "result");
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = PipelineConfig::standard().with_dataset_name("dataset");
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
