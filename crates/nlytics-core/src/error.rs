//! Crate-level error taxonomy.
//!
//! Failures of an analysed program are never Rust errors; they are recorded
//! as values in a `ValidationReport` or `ExecutionOutcome`. The errors here
//! describe misuse of the library itself.

/// Rejected pipeline configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("deny pattern {pattern:?} does not compile: {source}")]
    BadPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown module {module:?} bound as {alias:?} (expected pandas or numpy)")]
    UnknownModule { alias: String, module: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_display() {
        let err = ConfigError::invalid("retry.max_attempts", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "invalid configuration: retry.max_attempts must be at least 1"
        );
    }

    #[test]
    fn test_bad_pattern_display_names_pattern() {
        let source = regex::Regex::new("(").unwrap_err();
        let err = ConfigError::BadPattern {
            pattern: "(".into(),
            source,
        };
        assert!(err.to_string().contains("\"(\""));
    }
}
