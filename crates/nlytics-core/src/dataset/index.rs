//! Row labels for series and frames.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::scalar::{LookupKey, Scalar};

/// Row index with one or more levels (more than one after a multi-key group-by).
///
/// Stored column-major: `levels[l][row]`. Every level has the same length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub names: Vec<Option<String>>,
    pub levels: Vec<Vec<Scalar>>,
}

impl Index {
    /// Default `0..len` index.
    pub fn range(len: usize) -> Self {
        Self {
            names: vec![None],
            levels: vec![(0..len as i64).map(Scalar::Int).collect()],
        }
    }

    /// Single-level index from explicit labels.
    pub fn from_labels(name: Option<String>, labels: Vec<Scalar>) -> Self {
        Self {
            names: vec![name],
            levels: vec![labels],
        }
    }

    pub fn len(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    /// `true` when this is an unnamed `0..len` index.
    pub fn is_default_range(&self) -> bool {
        self.levels.len() == 1
            && self.names[0].is_none()
            && self.levels[0]
                .iter()
                .enumerate()
                .all(|(i, v)| matches!(v, Scalar::Int(n) if *n == i as i64))
    }

    /// All level values of one row.
    pub fn key(&self, row: usize) -> Vec<Scalar> {
        self.levels.iter().map(|l| l[row].clone()).collect()
    }

    /// Single-level label for `row`; multi-level keys are rendered as a tuple string.
    pub fn label(&self, row: usize) -> Scalar {
        if self.levels.len() == 1 {
            self.levels[0][row].clone()
        } else {
            let parts: Vec<String> = self.levels.iter().map(|l| l[row].to_string()).collect();
            Scalar::Text(format!("({})", parts.join(", ")))
        }
    }

    /// Position of the first row whose label equals `label`.
    pub fn position(&self, label: &Scalar) -> Option<usize> {
        if self.levels.len() == 1 {
            self.levels[0].iter().position(|v| v.loose_eq(label))
        } else {
            (0..self.len()).find(|&i| self.label(i).loose_eq(label))
        }
    }

    /// First position of every label of a single-level index, for resolving
    /// many labels at once. `None` for multi-level indexes.
    pub fn positions(&self) -> Option<HashMap<LookupKey<'_>, usize>> {
        let [level] = self.levels.as_slice() else {
            return None;
        };
        let mut table = HashMap::with_capacity(level.len());
        for (i, v) in level.iter().enumerate() {
            if let Some(k) = v.lookup_key() {
                table.entry(k).or_insert(i);
            }
        }
        Some(table)
    }

    /// Position of the first row whose full key equals `key`.
    pub fn position_of_key(&self, key: &[Scalar]) -> Option<usize> {
        if key.len() != self.levels.len() {
            return None;
        }
        (0..self.len()).find(|&i| {
            self.levels
                .iter()
                .zip(key)
                .all(|(level, k)| level[i].loose_eq(k))
        })
    }

    /// New index made of the given rows, in order.
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            levels: self
                .levels
                .iter()
                .map(|l| rows.iter().map(|&r| l[r].clone()).collect())
                .collect(),
        }
    }

    /// Column names used when the index is moved back into a frame.
    pub fn column_names(&self) -> Vec<String> {
        let single = self.levels.len() == 1;
        self.names
            .iter()
            .enumerate()
            .map(|(i, n)| match n {
                Some(n) => n.clone(),
                None if single => "index".to_string(),
                None => format!("level_{i}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_index_is_default() {
        let idx = Index::range(3);
        assert_eq!(idx.len(), 3);
        assert!(idx.is_default_range());
        assert_eq!(idx.label(2), Scalar::Int(2));
    }

    #[test]
    fn test_take_reorders_rows() {
        let idx = Index::from_labels(
            Some("k".into()),
            vec!["a".into(), "b".into(), "c".into()],
        );
        let taken = idx.take(&[2, 0]);
        assert_eq!(taken.levels[0], vec![Scalar::from("c"), Scalar::from("a")]);
        assert!(!taken.is_default_range());
    }

    #[test]
    fn test_multi_level_label_and_names() {
        let idx = Index {
            names: vec![Some("a".into()), None],
            levels: vec![vec![Scalar::Int(1)], vec![Scalar::from("x")]],
        };
        assert_eq!(idx.label(0), Scalar::from("(1, x)"));
        assert_eq!(idx.column_names(), vec!["a".to_string(), "level_1".to_string()]);
        assert_eq!(idx.position_of_key(&[Scalar::Int(1), Scalar::from("x")]), Some(0));
        assert!(idx.positions().is_none());
    }

    #[test]
    fn test_positions_keep_first_occurrence() {
        let idx = Index::from_labels(
            None,
            vec![Scalar::Int(7), Scalar::Null, Scalar::Float(7.0), Scalar::from("b")],
        );
        let table = idx.positions().unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&LookupKey::Int(7)), Some(&0));
        assert_eq!(table.get(&LookupKey::Text("b")), Some(&3));
    }
}
