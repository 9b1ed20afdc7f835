//! Error types for dataset construction and loading.

/// Errors produced while building or loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("column {column} has {actual} values, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("unsupported value in column {column}: {value}")]
    UnsupportedValue { column: String, value: String },

    #[error("invalid dataset shape: {0}")]
    InvalidShape(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DatasetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_display() {
        let err = DatasetError::LengthMismatch {
            column: "price".into(),
            expected: 3,
            actual: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("price"));
        assert!(msg.contains("expected 3"));
    }
}
