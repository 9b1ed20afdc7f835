//! Dataset sources: where the pipeline gets its data and column manifest.

use std::path::{Path, PathBuf};

use super::error::Result;
use super::frame::DataFrame;

/// Supplies the dataset a pipeline runs against.
pub trait DatasetSource: Send + Sync {
    /// Load the full dataset.
    fn load(&self) -> Result<DataFrame>;

    /// Human-readable origin used in logs.
    fn describe(&self) -> String;
}

/// Reads a dataset from a JSON file (column object or record array).
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DatasetSource for JsonFileSource {
    fn load(&self) -> Result<DataFrame> {
        let text = std::fs::read_to_string(&self.path)?;
        let frame = DataFrame::from_json_str(&text)?;
        tracing::debug!(
            path = %self.path.display(),
            rows = frame.n_rows(),
            cols = frame.n_cols(),
            "dataset loaded"
        );
        Ok(frame)
    }

    fn describe(&self) -> String {
        format!("json:{}", self.path.display())
    }
}

/// Hands out clones of a frame already held in memory.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    frame: DataFrame,
    label: String,
}

impl InMemorySource {
    pub fn new(label: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            frame,
            label: label.into(),
        }
    }
}

impl DatasetSource for InMemorySource {
    fn load(&self) -> Result<DataFrame> {
        Ok(self.frame.clone())
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DatasetError, Scalar};

    #[test]
    fn test_json_file_source_loads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"[{"price": 10}, {"price": 20}]"#).unwrap();

        let source = JsonFileSource::new(&path);
        let df = source.load().unwrap();
        assert_eq!(df.n_rows(), 2);
        assert_eq!(df.column("price").unwrap().values[1], Scalar::Int(20));
        assert!(source.describe().starts_with("json:"));
    }

    #[test]
    fn test_json_file_source_missing_file() {
        let source = JsonFileSource::new("/definitely/not/here.json");
        assert!(matches!(source.load(), Err(DatasetError::Io(_))));
    }

    #[test]
    fn test_in_memory_source_returns_copy() {
        let df = DataFrame::from_columns(vec![("a", vec![Scalar::Int(1)])]).unwrap();
        let source = InMemorySource::new("test", df.clone());
        assert_eq!(source.load().unwrap(), df);
    }
}
