//! Row selection by label, position and boolean mask.

use crate::dataset::{Index, Scalar};

use super::fault::{Exec, Fault};
use super::ops::mask_bool;
use super::value::Value;

/// Result of resolving a row selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// A single row; selecting it reduces one dimension.
    One(usize),
    Many(Vec<usize>),
}

/// Boolean mask positions, if `key` is a mask of length `n`.
pub fn mask(n: usize, key: &Value) -> Exec<Option<Vec<usize>>> {
    let cells: Vec<Scalar> = match key {
        Value::Series(s) if s.values.iter().all(|v| matches!(v, Scalar::Bool(_) | Scalar::Null)) && !s.is_empty() => {
            s.values.clone()
        }
        Value::List(items) if !items.is_empty() && items.iter().all(|v| matches!(v, Value::Bool(_))) => {
            items.iter().map(|v| Scalar::Bool(matches!(v, Value::Bool(true)))).collect()
        }
        Value::Series(s) if s.is_empty() && n == 0 => Vec::new(),
        _ => return Ok(None),
    };
    if cells.len() != n {
        return Err(Fault::index(format!(
            "Boolean index has wrong length: {} instead of {n}",
            cells.len()
        )));
    }
    Ok(Some(
        cells
            .iter()
            .enumerate()
            .filter(|(_, v)| mask_bool(v))
            .map(|(i, _)| i)
            .collect(),
    ))
}

fn position(n: usize, v: &Value) -> Exec<usize> {
    let i = v.as_int().ok_or_else(|| {
        Fault::type_error(format!(
            "cannot index by position with '{}'",
            v.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + n as i64 } else { i };
    if resolved < 0 || resolved as usize >= n {
        return Err(Fault::index("single positional indexer is out-of-bounds"));
    }
    Ok(resolved as usize)
}

/// `.iloc`-style selection over `n` rows.
pub fn by_position(n: usize, key: &Value) -> Exec<Rows> {
    if let Some(rows) = mask(n, key)? {
        return Ok(Rows::Many(rows));
    }
    match key {
        Value::Slice(s) => Ok(Rows::Many(s.positions(n)?)),
        Value::List(items) => Ok(Rows::Many(
            items
                .iter()
                .map(|v| position(n, v))
                .collect::<Exec<Vec<_>>>()?,
        )),
        Value::Range(r) => {
            let items: Vec<Value> = Value::Range(*r).collect_values(n.max(1) * 2)?;
            Ok(Rows::Many(
                items
                    .iter()
                    .map(|v| position(n, v))
                    .collect::<Exec<Vec<_>>>()?,
            ))
        }
        other => position(n, other).map(Rows::One),
    }
}

fn label_position(index: &Index, v: &Value) -> Exec<usize> {
    let found = match v {
        Value::Tuple(parts) if index.nlevels() > 1 => {
            let key = parts
                .iter()
                .map(Value::to_scalar)
                .collect::<Exec<Vec<_>>>()?;
            index.position_of_key(&key)
        }
        other => index.position(&other.to_scalar()?),
    };
    found.ok_or_else(|| Fault::key(v.repr()))
}

/// `.loc`-style selection against `index`.
pub fn by_label(index: &Index, key: &Value) -> Exec<Rows> {
    if let Some(rows) = mask(index.len(), key)? {
        return Ok(Rows::Many(rows));
    }
    match key {
        Value::Slice(s) => {
            let start = match &s.lower {
                Value::None => 0,
                v => label_position(index, v)?,
            };
            let stop = match &s.upper {
                Value::None => index.len(),
                v => label_position(index, v)? + 1,
            };
            Ok(Rows::Many((start..stop.max(start)).collect()))
        }
        Value::List(items) => {
            let table = index.positions();
            let mut rows = Vec::with_capacity(items.len());
            let mut missing = Vec::new();
            for item in items {
                let found = match (&table, item.to_scalar()) {
                    (Some(table), Ok(label)) => label.lookup_key().and_then(|k| table.get(&k).copied()),
                    _ => label_position(index, item).ok(),
                };
                match found {
                    Some(p) => rows.push(p),
                    None => missing.push(item.repr()),
                }
            }
            if !missing.is_empty() {
                return Err(Fault::key(format!("[{}] not in index", missing.join(", "))));
            }
            Ok(Rows::Many(rows))
        }
        other => label_position(index, other).map(Rows::One),
    }
}

/// Plain `series[key]`: labels first, falling back to positions for integer
/// keys on a non-integer index.
pub fn by_label_or_position(index: &Index, key: &Value) -> Exec<Rows> {
    match key {
        Value::Slice(_) => by_position(index.len(), key),
        Value::Int(_) if !index_is_integer(index) => by_position(index.len(), key),
        _ => by_label(index, key),
    }
}

fn index_is_integer(index: &Index) -> bool {
    index.nlevels() == 1 && index.levels[0].iter().all(|v| matches!(v, Scalar::Int(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Series;
    use crate::sandbox::value::SliceValue;

    fn labels() -> Index {
        Index::from_labels(None, vec!["a".into(), "b".into(), "c".into()])
    }

    #[test]
    fn test_mask_selection() {
        let m = Value::Series(Series::new(
            None,
            vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(true)],
        ));
        assert_eq!(by_position(3, &m).unwrap(), Rows::Many(vec![0, 2]));
        assert!(by_position(2, &m).is_err());
    }

    #[test]
    fn test_position_bounds() {
        assert_eq!(by_position(3, &Value::Int(-1)).unwrap(), Rows::One(2));
        let err = by_position(3, &Value::Int(3)).unwrap_err();
        assert_eq!(err.class, crate::sandbox::fault::FaultClass::IndexError);
    }

    #[test]
    fn test_label_slice_is_inclusive() {
        let s = Value::Slice(Box::new(SliceValue {
            lower: Value::Str("a".into()),
            upper: Value::Str("b".into()),
            step: Value::None,
        }));
        assert_eq!(by_label(&labels(), &s).unwrap(), Rows::Many(vec![0, 1]));
    }

    #[test]
    fn test_missing_label_is_key_error() {
        let err = by_label(&labels(), &Value::Str("z".into())).unwrap_err();
        assert_eq!(err.message, "'z'");
    }

    #[test]
    fn test_integer_key_falls_back_to_position() {
        assert_eq!(
            by_label_or_position(&labels(), &Value::Int(1)).unwrap(),
            Rows::One(1)
        );
    }
}
