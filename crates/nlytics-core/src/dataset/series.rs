//! One-dimensional labeled values.

use serde::{Deserialize, Serialize};

use super::index::Index;
use super::scalar::{DType, Scalar};

/// A labeled sequence of values, optionally named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: Option<String>,
    pub index: Index,
    pub values: Vec<Scalar>,
}

impl Series {
    /// Series with a default range index.
    pub fn new(name: Option<String>, values: Vec<Scalar>) -> Self {
        Self {
            name,
            index: Index::range(values.len()),
            values,
        }
    }

    pub fn with_index(name: Option<String>, index: Index, values: Vec<Scalar>) -> Self {
        debug_assert_eq!(index.len(), values.len());
        Self {
            name,
            index,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dtype(&self) -> DType {
        DType::infer(&self.values)
    }

    /// New series made of the given positions, keeping labels.
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            name: self.name.clone(),
            index: self.index.take(rows),
            values: rows.iter().map(|&r| self.values[r].clone()).collect(),
        }
    }

    /// Same labels and name, new values.
    pub fn map_values(&self, values: Vec<Scalar>) -> Self {
        Self {
            name: self.name.clone(),
            index: self.index.clone(),
            values,
        }
    }

    /// Value stored under `label`, if any.
    pub fn get(&self, label: &Scalar) -> Option<&Scalar> {
        self.index.position(label).map(|i| &self.values[i])
    }

    /// Non-missing values, in order.
    pub fn present(&self) -> impl Iterator<Item = &Scalar> {
        self.values.iter().filter(|v| !v.is_missing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_keeps_labels() {
        let s = Series::new(Some("x".into()), vec![Scalar::Int(10), Scalar::Int(20)]);
        let t = s.take(&[1]);
        assert_eq!(t.values, vec![Scalar::Int(20)]);
        assert_eq!(t.index.label(0), Scalar::Int(1));
        assert_eq!(t.name.as_deref(), Some("x"));
    }

    #[test]
    fn test_get_by_label() {
        let s = Series::with_index(
            None,
            Index::from_labels(None, vec!["a".into(), "b".into()]),
            vec![Scalar::Int(1), Scalar::Int(2)],
        );
        assert_eq!(s.get(&Scalar::from("b")), Some(&Scalar::Int(2)));
        assert_eq!(s.get(&Scalar::from("z")), None);
    }
}
