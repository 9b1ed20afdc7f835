//! Column-major tabular data.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::error::{DatasetError, Result};
use super::index::Index;
use super::scalar::{DType, Scalar};
use super::series::Series;

/// A named column of a [`DataFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Scalar>,
}

/// Manifest entry describing one column, handed to code producers and the
/// validator's column audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub dtype: DType,
    pub missing: usize,
    pub unique: usize,
}

/// Tabular data: equal-length named columns sharing one row index.
///
/// # Invariants
///
/// Every column has exactly `index.len()` values and column names are unique.
/// Constructors enforce both; sandbox operations preserve them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub index: Index,
    pub columns: Vec<Column>,
}

impl Default for DataFrame {
    fn default() -> Self {
        Self {
            index: Index::range(0),
            columns: Vec::new(),
        }
    }
}

impl DataFrame {
    /// Build a frame with a range index from `(name, values)` pairs.
    pub fn from_columns<N: Into<String>>(columns: Vec<(N, Vec<Scalar>)>) -> Result<Self> {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(name, values)| Column {
                name: name.into(),
                values,
            })
            .collect();
        let rows = columns.first().map_or(0, |c| c.values.len());
        Self::with_index(Index::range(rows), columns)
    }

    /// Build a frame with an explicit index, checking the invariants.
    pub fn with_index(index: Index, columns: Vec<Column>) -> Result<Self> {
        let rows = index.len();
        for (i, col) in columns.iter().enumerate() {
            if col.values.len() != rows {
                return Err(DatasetError::LengthMismatch {
                    column: col.name.clone(),
                    expected: rows,
                    actual: col.values.len(),
                });
            }
            if columns[..i].iter().any(|c| c.name == col.name) {
                return Err(DatasetError::DuplicateColumn(col.name.clone()));
            }
        }
        Ok(Self { index, columns })
    }

    /// Parse either JSON shape: an object of column arrays, or an array of
    /// record objects.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Object(_) => Self::from_json_columns(value),
            serde_json::Value::Array(_) => Self::from_records(value),
            other => Err(DatasetError::InvalidShape(format!(
                "expected an object of columns or an array of records, got {}",
                json_kind(other)
            ))),
        }
    }

    /// `{"price": [10, 20], "symbol": ["A", "B"]}`
    pub fn from_json_columns(value: &serde_json::Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            DatasetError::InvalidShape("column layout must be a JSON object".into())
        })?;
        let mut columns = Vec::with_capacity(obj.len());
        for (name, cells) in obj {
            let cells = cells.as_array().ok_or_else(|| {
                DatasetError::InvalidShape(format!("column {name} must be a JSON array"))
            })?;
            let values = cells
                .iter()
                .map(|c| json_to_scalar(name, c))
                .collect::<Result<Vec<_>>>()?;
            columns.push((name.clone(), values));
        }
        Self::from_columns(columns)
    }

    /// `[{"price": 10, "symbol": "A"}, ...]`; keys missing from a record become null.
    pub fn from_records(value: &serde_json::Value) -> Result<Self> {
        let rows = value.as_array().ok_or_else(|| {
            DatasetError::InvalidShape("record layout must be a JSON array".into())
        })?;
        let mut names: Vec<String> = Vec::new();
        for row in rows {
            let obj = row.as_object().ok_or_else(|| {
                DatasetError::InvalidShape("every record must be a JSON object".into())
            })?;
            for key in obj.keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }
        let mut columns: Vec<(String, Vec<Scalar>)> = names
            .iter()
            .map(|n| (n.clone(), Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            let Some(obj) = row.as_object() else {
                continue;
            };
            for (name, values) in columns.iter_mut() {
                let cell = match obj.get(name.as_str()) {
                    Some(v) => json_to_scalar(name, v)?,
                    None => Scalar::Null,
                };
                values.push(cell);
            }
        }
        Self::from_columns(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Column as a series sharing this frame's index.
    pub fn series(&self, name: &str) -> Option<Series> {
        self.column(name).map(|c| Series {
            name: Some(c.name.clone()),
            index: self.index.clone(),
            values: c.values.clone(),
        })
    }

    /// Insert or replace a column. `values` must have `n_rows()` entries.
    pub fn set_column(&mut self, name: &str, values: Vec<Scalar>) -> Result<()> {
        if values.len() != self.n_rows() && !(self.columns.is_empty() && self.index.is_empty()) {
            return Err(DatasetError::LengthMismatch {
                column: name.to_string(),
                expected: self.n_rows(),
                actual: values.len(),
            });
        }
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = Index::range(values.len());
        }
        match self.column_position(name) {
            Some(pos) => self.columns[pos].values = values,
            None => self.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
        Ok(())
    }

    /// New frame with the given rows, in order.
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: self.index.take(rows),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: rows.iter().map(|&r| c.values[r].clone()).collect(),
                })
                .collect(),
        }
    }

    /// Column name/type manifest.
    pub fn manifest(&self) -> Vec<ColumnInfo> {
        self.columns
            .iter()
            .map(|c| {
                let seen: HashSet<_> = c.values.iter().filter_map(Scalar::lookup_key).collect();
                ColumnInfo {
                    name: c.name.clone(),
                    dtype: DType::infer(&c.values),
                    missing: c.values.iter().filter(|v| v.is_missing()).count(),
                    unique: seen.len(),
                }
            })
            .collect()
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn json_to_scalar(column: &str, v: &serde_json::Value) -> Result<Scalar> {
    Ok(match v {
        serde_json::Value::Null => Scalar::Null,
        serde_json::Value::Bool(b) => Scalar::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Scalar::Int(i),
            None => Scalar::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Scalar::Text(s.clone()),
        other => {
            return Err(DatasetError::UnsupportedValue {
                column: column.to_string(),
                value: other.to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices() -> DataFrame {
        DataFrame::from_columns(vec![
            ("price", vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30)]),
            ("symbol", vec!["A".into(), "B".into(), "A".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let err = DataFrame::from_columns(vec![
            ("a", vec![Scalar::Int(1)]),
            ("b", vec![Scalar::Int(1), Scalar::Int(2)]),
        ])
        .unwrap_err();
        assert!(matches!(err, DatasetError::LengthMismatch { .. }));
    }

    #[test]
    fn test_from_columns_rejects_duplicate_names() {
        let err = DataFrame::from_columns(vec![
            ("a", vec![Scalar::Int(1)]),
            ("a", vec![Scalar::Int(2)]),
        ])
        .unwrap_err();
        assert!(matches!(err, DatasetError::DuplicateColumn(n) if n == "a"));
    }

    #[test]
    fn test_json_column_layout() {
        let df = DataFrame::from_json_str(r#"{"price": [10, 20.5, null]}"#).unwrap();
        assert_eq!(df.n_rows(), 3);
        assert_eq!(df.column("price").unwrap().values[1], Scalar::Float(20.5));
    }

    #[test]
    fn test_json_record_layout_fills_missing_keys() {
        let df = DataFrame::from_json_str(r#"[{"a": 1}, {"a": 2, "b": "x"}]"#).unwrap();
        assert_eq!(df.column_names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(df.column("b").unwrap().values[0], Scalar::Null);
    }

    #[test]
    fn test_json_rejects_nested_values() {
        let err = DataFrame::from_json_str(r#"{"a": [[1]]}"#).unwrap_err();
        assert!(matches!(err, DatasetError::UnsupportedValue { .. }));
    }

    #[test]
    fn test_manifest_counts() {
        let info = prices().manifest();
        assert_eq!(info[0].dtype, DType::Int);
        assert_eq!(info[1].dtype, DType::Text);
        assert_eq!(info[1].unique, 2);
        assert_eq!(info[0].missing, 0);
    }

    #[test]
    fn test_set_column_checks_length() {
        let mut df = prices();
        assert!(df.set_column("x", vec![Scalar::Int(1)]).is_err());
        df.set_column("x", vec![Scalar::Int(1); 3]).unwrap();
        assert_eq!(df.n_cols(), 3);
    }
}
