//! Series properties, methods and the `.str` accessor.

use std::cmp::Ordering;
use std::collections::HashSet;

use indexmap::IndexMap;
use regex::RegexBuilder;

use crate::dataset::{Column, DType, DataFrame, Index, LookupKey, Scalar, Series};

use super::args::{poll_row, Args, Invoker, Returned};
use super::builtins;
use super::fault::{Exec, Fault};
use super::select::{self, Rows};
use super::stats;
use super::value::{IndexerKind, Key, Value};

pub const METHODS: &[&str] = &[
    "sum", "mean", "min", "max", "count", "median", "std", "var", "prod", "quantile", "idxmax",
    "idxmin", "unique", "nunique", "value_counts", "sort_values", "sort_index", "head", "tail",
    "nlargest", "nsmallest", "isin", "isna", "isnull", "notna", "notnull", "fillna", "dropna",
    "astype", "round", "abs", "cumsum", "cumprod", "cummax", "cummin", "pct_change", "diff",
    "shift", "apply", "map", "tolist", "to_list", "to_frame", "to_dict", "reset_index",
    "between", "describe", "any", "all", "copy", "rename", "clip", "drop_duplicates",
    "duplicated", "items", "get", "agg", "aggregate", "mode", "item",
];

pub const STR_METHODS: &[&str] = &[
    "lower", "upper", "strip", "lstrip", "rstrip", "title", "contains", "startswith",
    "endswith", "len", "replace", "isdigit", "zfill", "slice",
];

/// Property access on a series; `None` when `name` is not a property.
pub fn attribute(s: &Series, name: &str) -> Exec<Option<Value>> {
    Ok(Some(match name {
        "values" | "array" => Value::Series(Series::new(None, s.values.clone())),
        "index" => index_value(&s.index),
        "name" => s.name.clone().map_or(Value::None, Value::Str),
        "dtype" => Value::Str(s.dtype().to_string()),
        "shape" => Value::Tuple(vec![Value::Int(s.len() as i64)]),
        "size" => Value::Int(s.len() as i64),
        "empty" => Value::Bool(s.is_empty()),
        "str" => {
            if !matches!(s.dtype(), DType::Text | DType::Mixed | DType::Empty) {
                return Err(Fault::new(
                    super::fault::FaultClass::AttributeError,
                    "Can only use .str accessor with string values!",
                ));
            }
            Value::Indexer(IndexerKind::Str, Box::new(Value::Series(s.clone())))
        }
        other => match IndexerKind::from_attr(other) {
            Some(kind) => Value::Indexer(kind, Box::new(Value::Series(s.clone()))),
            None => return Ok(None),
        },
    }))
}

/// An index exposed to programs: a series whose labels and values are both
/// the index labels, so `in`, iteration and `tolist()` all see the labels.
pub fn index_value(index: &Index) -> Value {
    let labels: Vec<Scalar> = (0..index.len()).map(|i| index.label(i)).collect();
    labels_value(index.names.first().cloned().flatten(), labels)
}

pub fn labels_value(name: Option<String>, labels: Vec<Scalar>) -> Value {
    Value::Series(Series::with_index(
        name,
        Index::from_labels(None, labels.clone()),
        labels,
    ))
}

/// `series[key]`.
pub fn subscript(s: &Series, key: &Value) -> Exec<Value> {
    rows_value(s, select::by_label_or_position(&s.index, key)?)
}

pub fn rows_value(s: &Series, rows: Rows) -> Exec<Value> {
    Ok(match rows {
        Rows::One(i) => Value::from_scalar(&s.values[i]),
        Rows::Many(rows) => Value::Series(s.take(&rows)),
    })
}

/// `series.iloc[...]`, `.loc[...]`, `.at[...]`, `.iat[...]`.
pub fn indexer_get(kind: IndexerKind, s: &Series, key: &Value) -> Exec<Value> {
    let rows = match kind {
        IndexerKind::Iloc | IndexerKind::Iat => select::by_position(s.len(), key)?,
        _ => select::by_label(&s.index, key)?,
    };
    rows_value(s, rows)
}

/// `series[key] = value` / `series.loc[key] = value`; returns the updated series.
pub fn assign(mut s: Series, kind: Option<IndexerKind>, key: &Value, value: &Value) -> Exec<Series> {
    let rows = match kind {
        Some(IndexerKind::Iloc | IndexerKind::Iat) => select::by_position(s.len(), key)?,
        Some(_) => select::by_label(&s.index, key)?,
        None => match select::by_label_or_position(&s.index, key) {
            Ok(rows) => rows,
            Err(e) if e.class == super::fault::FaultClass::KeyError => {
                let label = key.to_scalar()?;
                s.index.levels[0].push(label);
                for level in s.index.levels.iter_mut().skip(1) {
                    level.push(Scalar::Null);
                }
                s.values.push(value.to_scalar()?);
                return Ok(s);
            }
            Err(e) => return Err(e),
        },
    };
    let positions = match rows {
        Rows::One(i) => vec![i],
        Rows::Many(rows) => rows,
    };
    let cells = broadcast_cells(value, positions.len())?;
    for (p, v) in positions.into_iter().zip(cells) {
        s.values[p] = v;
    }
    Ok(s)
}

/// Cells for assigning `value` into `n` positions.
pub fn broadcast_cells(value: &Value, n: usize) -> Exec<Vec<Scalar>> {
    match value {
        Value::Series(src) => {
            if src.len() != n {
                return Err(Fault::value(format!(
                    "Length of values ({}) does not match length of index ({n})",
                    src.len()
                )));
            }
            Ok(src.values.clone())
        }
        Value::List(items) | Value::Tuple(items) => {
            if items.len() != n {
                return Err(Fault::value(format!(
                    "Length of values ({}) does not match length of index ({n})",
                    items.len()
                )));
            }
            items.iter().map(Value::to_scalar).collect()
        }
        other => Ok(vec![other.to_scalar()?; n]),
    }
}

/// Values of a list-like argument as cells.
/// Membership flags for `isin`; `wanted` is hashed once.
pub fn isin_flags(values: &[Scalar], wanted: &[Scalar], inv: &dyn Invoker) -> Exec<Vec<Scalar>> {
    let set: HashSet<LookupKey<'_>> = wanted.iter().filter_map(Scalar::lookup_key).collect();
    let mut flags = Vec::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        poll_row(inv, i)?;
        flags.push(Scalar::Bool(v.lookup_key().is_some_and(|k| set.contains(&k))));
    }
    Ok(flags)
}

pub fn cells_of(v: Value, limit: usize) -> Exec<Vec<Scalar>> {
    match v {
        Value::Series(s) => Ok(s.values),
        other => other
            .collect_values(limit)?
            .iter()
            .map(Value::to_scalar)
            .collect(),
    }
}

fn reduce(s: &Series, name: &str, args: &mut Args) -> Exec<Scalar> {
    args.take_kw("skipna");
    args.take_kw("numeric_only");
    match name {
        "std" | "var" => {
            let ddof = args.int(usize::MAX, "ddof", 1, name)?.max(0) as usize;
            if name == "std" {
                stats::std(&s.values, ddof)
            } else {
                stats::var(&s.values, ddof)
            }
        }
        "quantile" => {
            let q = args
                .take(0, "q")
                .map_or(Some(0.5), |v| v.as_f64())
                .ok_or_else(|| Fault::type_error("quantile() q must be a number"))?;
            stats::quantile(&s.values, q)
        }
        other => stats::aggregate(other, &s.values),
    }
}

fn idx_extreme(s: &Series, want: Ordering, name: &str) -> Exec<Value> {
    let pos = stats::arg_extreme(&s.values, want).ok_or_else(|| {
        Fault::value(format!(
            "attempt to get {} of an empty sequence",
            if name == "idxmax" { "argmax" } else { "argmin" }
        ))
    })?;
    Ok(Value::from_scalar(&s.index.label(pos)))
}

/// Stable order of positions by value; missing values always last.
pub fn sorted_positions(values: &[Scalar], ascending: bool) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&values[a], &values[b]);
        match (x.is_missing(), y.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ if ascending => x.sort_cmp(y),
            _ => y.sort_cmp(x),
        }
    });
    order
}

/// Counts of distinct values, most frequent first (ties in first-seen order).
pub fn value_counts(values: &[Scalar], name: Option<String>, normalize: bool, dropna: bool) -> Series {
    let mut counts: IndexMap<String, (Scalar, usize)> = IndexMap::new();
    for v in values {
        if v.is_missing() && dropna {
            continue;
        }
        counts
            .entry(v.group_key())
            .or_insert_with(|| (v.clone(), 0))
            .1 += 1;
    }
    let mut entries: Vec<(Scalar, usize)> = counts.into_values().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    let total: usize = entries.iter().map(|e| e.1).sum();
    let labels = entries.iter().map(|e| e.0.clone()).collect();
    let (series_name, cells) = if normalize {
        (
            "proportion",
            entries
                .iter()
                .map(|e| Scalar::Float(e.1 as f64 / total.max(1) as f64))
                .collect(),
        )
    } else {
        (
            "count",
            entries.iter().map(|e| Scalar::Int(e.1 as i64)).collect(),
        )
    };
    Series::with_index(
        Some(series_name.to_string()),
        Index::from_labels(name, labels),
        cells,
    )
}

/// Cast one cell for `astype`.
pub fn cast(v: &Scalar, target: &str) -> Exec<Scalar> {
    Ok(match target {
        "int" | "int64" | "int32" | "Int64" => match v {
            Scalar::Float(f) if !f.is_finite() => {
                return Err(Fault::value(
                    "Cannot convert non-finite values (NA or inf) to integer",
                ))
            }
            Scalar::Null => {
                return Err(Fault::value(
                    "Cannot convert non-finite values (NA or inf) to integer",
                ))
            }
            other => match builtins::to_int(&Value::from_scalar(other), 10)? {
                Value::Int(i) => Scalar::Int(i),
                _ => Scalar::Null,
            },
        },
        "float" | "float64" | "float32" => match v {
            Scalar::Null => Scalar::Float(f64::NAN),
            other => Scalar::Float(builtins::to_float(&Value::from_scalar(other))?),
        },
        "str" | "string" | "object" => match v {
            Scalar::Null => Scalar::Null,
            other => Scalar::Text(Value::from_scalar(other).to_str()),
        },
        "bool" => Scalar::Bool(super::ops::mask_bool(v)),
        "category" => v.clone(),
        other => return Err(Fault::type_error(format!("data type '{other}' not understood"))),
    })
}

/// Target type name of an `astype` argument.
pub fn dtype_name(v: &Value) -> Exec<String> {
    match v {
        Value::Type(name) => Ok(name.to_string()),
        Value::Str(name) => Ok(name.clone()),
        other => Err(Fault::type_error(format!(
            "data type '{}' not understood",
            other.to_str()
        ))),
    }
}

fn cumulative(s: &Series, name: &str) -> Exec<Series> {
    let mut acc: Option<Scalar> = None;
    let mut out = Vec::with_capacity(s.len());
    for v in &s.values {
        if v.is_missing() {
            out.push(Scalar::Float(f64::NAN));
            continue;
        }
        let next = match acc.take() {
            None => v.clone(),
            Some(prev) => {
                let pair = [prev, v.clone()];
                match name {
                    "cumsum" => stats::sum(&pair)?,
                    "cumprod" => stats::prod(&pair)?,
                    "cummax" => stats::max(&pair)?,
                    _ => stats::min(&pair)?,
                }
            }
        };
        out.push(next.clone());
        acc = Some(next);
    }
    Ok(s.map_values(out))
}

fn shifted(s: &Series, periods: i64) -> Vec<Scalar> {
    let n = s.len() as i64;
    (0..n)
        .map(|i| {
            let src = i - periods;
            if src < 0 || src >= n {
                Scalar::Float(f64::NAN)
            } else {
                s.values[src as usize].clone()
            }
        })
        .collect()
}

fn numeric_pairwise(
    s: &Series,
    periods: i64,
    f: impl Fn(f64, f64) -> f64,
) -> Vec<Scalar> {
    let prev = shifted(s, periods);
    s.values
        .iter()
        .zip(&prev)
        .map(|(cur, before)| match (cur.as_f64(), before.as_f64()) {
            (Some(c), Some(b)) if !c.is_nan() && !b.is_nan() => Scalar::Float(f(c, b)),
            _ => Scalar::Float(f64::NAN),
        })
        .collect()
}

/// One-column frame from a series, keeping its index.
pub fn to_frame(s: &Series, name: Option<String>) -> DataFrame {
    DataFrame {
        index: s.index.clone(),
        columns: vec![Column {
            name: name.or_else(|| s.name.clone()).unwrap_or_else(|| "0".to_string()),
            values: s.values.clone(),
        }],
    }
}

/// Move the index into leading columns.
pub fn reset_index(s: &Series, name: Option<String>) -> DataFrame {
    let mut columns: Vec<Column> = s
        .index
        .column_names()
        .into_iter()
        .zip(&s.index.levels)
        .map(|(name, level)| Column {
            name,
            values: level.clone(),
        })
        .collect();
    columns.push(Column {
        name: name.or_else(|| s.name.clone()).unwrap_or_else(|| "0".to_string()),
        values: s.values.clone(),
    });
    DataFrame {
        index: Index::range(s.len()),
        columns,
    }
}

/// Summary statistics of a numeric series.
pub fn describe(values: &[Scalar]) -> Exec<Vec<(String, Scalar)>> {
    Ok(vec![
        ("count".into(), Scalar::Float(stats::count(values) as f64)),
        ("mean".into(), stats::mean(values)?),
        ("std".into(), stats::std(values, 1)?),
        ("min".into(), to_float(stats::min(values)?)),
        ("25%".into(), stats::quantile(values, 0.25)?),
        ("50%".into(), stats::quantile(values, 0.5)?),
        ("75%".into(), stats::quantile(values, 0.75)?),
        ("max".into(), to_float(stats::max(values)?)),
    ])
}

fn to_float(v: Scalar) -> Scalar {
    match v.as_f64() {
        Some(f) => Scalar::Float(f),
        None => v,
    }
}

/// Summary of a text series: count, unique, top, freq.
pub fn describe_text(values: &[Scalar]) -> Vec<(String, Scalar)> {
    let counts = value_counts(values, None, false, true);
    vec![
        ("count".into(), Scalar::Int(stats::count(values) as i64)),
        ("unique".into(), Scalar::Int(stats::nunique(values) as i64)),
        (
            "top".into(),
            counts.index.levels[0].first().cloned().unwrap_or(Scalar::Null),
        ),
        (
            "freq".into(),
            counts.values.first().cloned().unwrap_or(Scalar::Null),
        ),
    ]
}

fn inplace(args: &mut Args, updated: Series) -> Exec<Returned> {
    if args.flag_kw("inplace", false)? {
        Ok(Returned::mutated(Value::None, Value::Series(updated)))
    } else {
        Ok(Returned::value(Value::Series(updated)))
    }
}

/// `series.name(args)`.
pub fn call_method(s: Series, name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Returned> {
    let limit = inv.limit();
    let out = match name {
        "sum" | "mean" | "min" | "max" | "count" | "median" | "std" | "var" | "prod"
        | "quantile" | "nunique" => {
            args.take_kw("dropna");
            Value::from_scalar(&reduce(&s, name, &mut args)?)
        }
        "idxmax" => idx_extreme(&s, Ordering::Greater, name)?,
        "idxmin" => idx_extreme(&s, Ordering::Less, name)?,
        "any" | "all" => {
            let present: Vec<bool> = s.present().map(super::ops::mask_bool).collect();
            Value::Bool(if name == "any" {
                present.iter().any(|b| *b)
            } else {
                present.iter().all(|b| *b)
            })
        }
        "unique" => Value::Series(Series::new(None, stats::unique(&s.values, true))),
        "mode" => {
            let counts = value_counts(&s.values, None, false, true);
            let top = counts.values.first().and_then(Scalar::as_i64).unwrap_or(0);
            let mut modes: Vec<Scalar> = counts
                .index
                .levels[0]
                .iter()
                .zip(&counts.values)
                .filter(|(_, c)| c.as_i64() == Some(top))
                .map(|(v, _)| v.clone())
                .collect();
            modes.sort_by(Scalar::sort_cmp);
            Value::Series(Series::new(s.name.clone(), modes))
        }
        "value_counts" => {
            let normalize = args.flag(0, "normalize", false)?;
            args.take_kw("sort");
            let ascending = args.flag_kw("ascending", false)?;
            let dropna = args.flag_kw("dropna", true)?;
            let mut counts = value_counts(&s.values, s.name.clone(), normalize, dropna);
            if ascending {
                let order = sorted_positions(&counts.values, true);
                counts = counts.take(&order);
            }
            Value::Series(counts)
        }
        "sort_values" => {
            let ascending = args.flag(0, "ascending", true)?;
            args.take_kw("kind");
            args.take_kw("na_position");
            let order = sorted_positions(&s.values, ascending);
            let sorted = s.take(&order);
            return finish_inplace(args, name, sorted);
        }
        "sort_index" => {
            let ascending = args.flag(0, "ascending", true)?;
            let labels: Vec<Scalar> = (0..s.len()).map(|i| s.index.label(i)).collect();
            let order = sorted_positions(&labels, ascending);
            let sorted = s.take(&order);
            return finish_inplace(args, name, sorted);
        }
        "head" | "tail" => {
            let n = args.int(0, "n", 5, name)?;
            Value::Series(s.take(&head_tail(s.len(), n, name == "head")))
        }
        "nlargest" | "nsmallest" => {
            let n = args.int(0, "n", 5, name)?.max(0) as usize;
            args.take_kw("keep");
            let order = sorted_positions(&s.values, name == "nsmallest");
            let rows: Vec<usize> = order
                .into_iter()
                .filter(|&i| !s.values[i].is_missing())
                .take(n)
                .collect();
            Value::Series(s.take(&rows))
        }
        "isin" => {
            let wanted = cells_of(args.required(0, "values", name)?, limit)?;
            Value::Series(s.map_values(isin_flags(&s.values, &wanted, inv)?))
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            let want_missing = name.starts_with("is");
            Value::Series(s.map_values(
                s.values
                    .iter()
                    .map(|v| Scalar::Bool(v.is_missing() == want_missing))
                    .collect(),
            ))
        }
        "fillna" => {
            let fill = args.required(0, "value", name)?;
            let filled = match &fill {
                Value::Dict(_) | Value::Series(_) => {
                    let lookup = fill_lookup(&fill)?;
                    s.values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| {
                            if v.is_missing() {
                                lookup(&s.index.label(i)).unwrap_or_else(|| v.clone())
                            } else {
                                v.clone()
                            }
                        })
                        .collect()
                }
                other => {
                    let cell = other.to_scalar()?;
                    s.values
                        .iter()
                        .map(|v| if v.is_missing() { cell.clone() } else { v.clone() })
                        .collect()
                }
            };
            let updated = s.map_values(filled);
            return finish_inplace(args, name, updated);
        }
        "dropna" => {
            let rows: Vec<usize> = (0..s.len()).filter(|&i| !s.values[i].is_missing()).collect();
            let updated = s.take(&rows);
            return finish_inplace(args, name, updated);
        }
        "drop_duplicates" | "duplicated" => {
            let keep = keep_arg(args.take(0, "keep"))?;
            let dup = duplicated_flags(&s.values.iter().map(|v| vec![v.clone()]).collect::<Vec<_>>(), &keep);
            if name == "duplicated" {
                Value::Series(s.map_values(dup.into_iter().map(Scalar::Bool).collect()))
            } else {
                let rows: Vec<usize> = (0..s.len()).filter(|&i| !dup[i]).collect();
                Value::Series(s.take(&rows))
            }
        }
        "astype" => {
            let target = dtype_name(&args.required(0, "dtype", name)?)?;
            let cells = s
                .values
                .iter()
                .map(|v| cast(v, &target))
                .collect::<Exec<Vec<_>>>()?;
            Value::Series(s.map_values(cells))
        }
        "round" => {
            let d = args.int(0, "decimals", 0, name)?;
            Value::Series(s.map_values(s.values.iter().map(|v| builtins::round_scalar(v, d)).collect()))
        }
        "abs" => Value::Series(s.map_values(
            s.values
                .iter()
                .map(builtins::abs_scalar)
                .collect::<Exec<Vec<_>>>()?,
        )),
        "clip" => {
            let lower = args.optional(0, "lower").and_then(|v| v.as_f64());
            let upper = args.optional(1, "upper").and_then(|v| v.as_f64());
            Value::Series(s.map_values(
                s.values
                    .iter()
                    .map(|v| match v.as_f64() {
                        Some(x) if !v.is_missing() => {
                            let lo = lower.map_or(x, |l| x.max(l));
                            let clipped = upper.map_or(lo, |u| lo.min(u));
                            if clipped == x {
                                v.clone()
                            } else {
                                Scalar::Float(clipped)
                            }
                        }
                        _ => v.clone(),
                    })
                    .collect(),
            ))
        }
        "cumsum" | "cumprod" | "cummax" | "cummin" => Value::Series(cumulative(&s, name)?),
        "pct_change" => {
            let periods = args.int(0, "periods", 1, name)?;
            Value::Series(s.map_values(numeric_pairwise(&s, periods, |c, b| c / b - 1.0)))
        }
        "diff" => {
            let periods = args.int(0, "periods", 1, name)?;
            Value::Series(s.map_values(numeric_pairwise(&s, periods, |c, b| c - b)))
        }
        "shift" => {
            let periods = args.int(0, "periods", 1, name)?;
            Value::Series(s.map_values(shifted(&s, periods)))
        }
        "between" => {
            let left = args.required(0, "left", name)?.to_scalar()?;
            let right = args.required(1, "right", name)?.to_scalar()?;
            let inclusive = args
                .string(2, "inclusive", name)?
                .unwrap_or_else(|| "both".into());
            let (lo_inclusive, hi_inclusive) = match inclusive.as_str() {
                "both" => (true, true),
                "neither" => (false, false),
                "left" => (true, false),
                "right" => (false, true),
                other => {
                    return Err(Fault::value(format!(
                        "Inclusive has to be either string of 'both','left', 'right', or 'neither', got {other}"
                    )))
                }
            };
            let lo_ok = |o: Ordering| o == Ordering::Greater || (lo_inclusive && o == Ordering::Equal);
            let hi_ok = |o: Ordering| o == Ordering::Less || (hi_inclusive && o == Ordering::Equal);
            Value::Series(s.map_values(
                s.values
                    .iter()
                    .map(|v| {
                        Scalar::Bool(
                            !v.is_missing() && lo_ok(v.sort_cmp(&left)) && hi_ok(v.sort_cmp(&right)),
                        )
                    })
                    .collect(),
            ))
        }
        "apply" | "map" => {
            let func = args.required(0, if name == "map" { "arg" } else { "func" }, name)?;
            args.take_kw("na_action");
            Value::Series(map_series(&s, &func, inv)?)
        }
        "agg" | "aggregate" => {
            let func = args.required(0, "func", name)?;
            match func {
                Value::Str(f) => Value::from_scalar(&stats::aggregate(&f, &s.values)?),
                Value::List(fs) => {
                    let mut labels = Vec::with_capacity(fs.len());
                    let mut cells = Vec::with_capacity(fs.len());
                    for f in fs {
                        let f = f.as_str().map(str::to_string).ok_or_else(|| {
                            Fault::type_error("agg() expects function names")
                        })?;
                        cells.push(stats::aggregate(&f, &s.values)?);
                        labels.push(Scalar::Text(f));
                    }
                    Value::Series(Series::with_index(
                        s.name.clone(),
                        Index::from_labels(None, labels),
                        cells,
                    ))
                }
                f => inv.invoke(&f, vec![Value::Series(s.clone())])?,
            }
        }
        "tolist" | "to_list" => Value::List(s.values.iter().map(Value::from_scalar).collect()),
        "items" => Value::List(
            s.values
                .iter()
                .enumerate()
                .map(|(i, v)| Value::Tuple(vec![Value::from_scalar(&s.index.label(i)), Value::from_scalar(v)]))
                .collect(),
        ),
        "to_dict" => Value::Dict(
            s.values
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::from_scalar(&s.index.label(i)), Value::from_scalar(v)))
                .collect(),
        ),
        "to_frame" => {
            let col = args.string(0, "name", name)?;
            Value::Frame(to_frame(&s, col))
        }
        "reset_index" => {
            let drop = args.flag_kw("drop", false)?;
            let col = args.string(usize::MAX, "name", name)?;
            if drop {
                Value::Series(Series::new(s.name.clone(), s.values.clone()))
            } else {
                Value::Frame(reset_index(&s, col))
            }
        }
        "describe" => {
            let rows = if s.dtype().is_numeric() {
                describe(&s.values)?
            } else {
                describe_text(&s.values)
            };
            let (labels, cells): (Vec<Scalar>, Vec<Scalar>) =
                rows.into_iter().map(|(l, v)| (Scalar::Text(l), v)).unzip();
            Value::Series(Series::with_index(
                s.name.clone(),
                Index::from_labels(None, labels),
                cells,
            ))
        }
        "copy" => {
            args.take(0, "deep");
            Value::Series(s)
        }
        "rename" => {
            let new = args.take(0, "index");
            let updated = match new {
                Some(Value::Str(n)) => Series { name: Some(n), ..s },
                Some(Value::None) => Series { name: None, ..s },
                Some(other) => {
                    return Err(Fault::type_error(format!(
                        "rename() expects a name, not '{}'",
                        other.type_name()
                    )))
                }
                None => s,
            };
            return finish_inplace(args, name, updated);
        }
        "get" => {
            let key = args.required(0, "key", name)?;
            let default = args.take(1, "default").unwrap_or(Value::None);
            match key.to_scalar().ok().and_then(|k| s.get(&k).cloned()) {
                Some(v) => Value::from_scalar(&v),
                None => default,
            }
        }
        "item" => {
            if s.len() != 1 {
                return Err(Fault::value("can only convert an array of size 1 to a Python scalar"));
            }
            Value::from_scalar(&s.values[0])
        }
        other => return Err(Fault::attribute("Series", other)),
    };
    args.finish(name)?;
    Ok(Returned::value(out))
}

fn finish_inplace(mut args: Args, name: &str, updated: Series) -> Exec<Returned> {
    let r = inplace(&mut args, updated)?;
    args.finish(name)?;
    Ok(r)
}

/// Lookup function for `fillna`/`map` with a dict or series argument.
fn fill_lookup(v: &Value) -> Exec<Box<dyn Fn(&Scalar) -> Option<Scalar> + '_>> {
    match v {
        Value::Dict(map) => Ok(Box::new(move |label: &Scalar| {
            map.get(&Key::from_scalar(label)).and_then(|v| v.to_scalar().ok())
        })),
        Value::Series(src) => Ok(Box::new(move |label: &Scalar| src.get(label).cloned())),
        other => Err(Fault::type_error(format!(
            "expected a dict or Series, not '{}'",
            other.type_name()
        ))),
    }
}

/// `keep=` of the duplicate helpers: "first", "last" or `False`.
pub fn keep_arg(v: Option<Value>) -> Exec<String> {
    match v {
        None => Ok("first".into()),
        Some(Value::Str(k)) if k == "first" || k == "last" => Ok(k),
        Some(Value::Bool(false)) => Ok("none".into()),
        Some(other) => Err(Fault::value(format!(
            "keep must be either \"first\", \"last\" or False, got {}",
            other.repr()
        ))),
    }
}

/// `apply`/`map` element-wise.
pub fn map_series(s: &Series, func: &Value, inv: &mut dyn Invoker) -> Exec<Series> {
    let cells = match func {
        Value::Dict(_) | Value::Series(_) => {
            let lookup = fill_lookup(func)?;
            s.values
                .iter()
                .map(|v| lookup(v).unwrap_or(Scalar::Float(f64::NAN)))
                .collect()
        }
        f => {
            let mut out = Vec::with_capacity(s.len());
            for v in &s.values {
                inv.poll()?;
                out.push(inv.invoke(f, vec![Value::from_scalar(v)])?.to_scalar()?);
            }
            out
        }
    };
    Ok(s.map_values(cells))
}

/// Positions kept by `head(n)` / `tail(n)`; negative `n` counts from the other end.
pub fn head_tail(len: usize, n: i64, head: bool) -> Vec<usize> {
    let take = if n >= 0 {
        (n as usize).min(len)
    } else {
        len.saturating_sub(n.unsigned_abs() as usize)
    };
    if head {
        (0..take).collect()
    } else {
        (len - take..len).collect()
    }
}

/// Duplicate flags over row keys, honouring `keep` = first | last | False.
pub fn duplicated_flags(keys: &[Vec<Scalar>], keep: &str) -> Vec<bool> {
    let key_of = |k: &Vec<Scalar>| k.iter().map(Scalar::group_key).collect::<Vec<_>>().join("\u{1f}");
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for k in keys {
        *counts.entry(key_of(k)).or_default() += 1;
    }
    let mut seen: IndexMap<String, usize> = IndexMap::new();
    keys.iter()
        .map(|k| {
            let key = key_of(k);
            let total = counts.get(&key).copied().unwrap_or(0);
            let n = seen.entry(key).or_default();
            *n += 1;
            match keep {
                "last" => *n < total,
                "first" => *n > 1,
                _ => total > 1,
            }
        })
        .collect()
}

/// `series.str.<name>(args)`; missing and non-text cells yield missing.
pub fn str_method(s: &Series, name: &str, mut args: Args) -> Exec<Value> {
    let text_map = |f: &dyn Fn(&str) -> Scalar| -> Vec<Scalar> {
        s.values
            .iter()
            .map(|v| match v {
                Scalar::Text(t) => f(t),
                _ => Scalar::Float(f64::NAN),
            })
            .collect()
    };
    let cells = match name {
        "lower" => text_map(&|t| Scalar::Text(t.to_lowercase())),
        "upper" => text_map(&|t| Scalar::Text(t.to_uppercase())),
        "strip" => text_map(&|t| Scalar::Text(t.trim().to_string())),
        "lstrip" => text_map(&|t| Scalar::Text(t.trim_start().to_string())),
        "rstrip" => text_map(&|t| Scalar::Text(t.trim_end().to_string())),
        "title" => text_map(&|t| {
            let mut out = String::with_capacity(t.len());
            let mut prev = false;
            for c in t.chars() {
                if c.is_alphabetic() {
                    if prev {
                        out.extend(c.to_lowercase());
                    } else {
                        out.extend(c.to_uppercase());
                    }
                    prev = true;
                } else {
                    out.push(c);
                    prev = false;
                }
            }
            Scalar::Text(out)
        }),
        "len" => text_map(&|t| Scalar::Int(t.chars().count() as i64)),
        "isdigit" => text_map(&|t| Scalar::Bool(!t.is_empty() && t.chars().all(|c| c.is_ascii_digit()))),
        "zfill" => {
            let width = args.int(0, "width", 0, name)?.max(0) as usize;
            text_map(&|t| {
                let len = t.chars().count();
                Scalar::Text(if len >= width {
                    t.to_string()
                } else {
                    format!("{}{t}", "0".repeat(width - len))
                })
            })
        }
        "slice" => {
            let start = args.optional(0, "start").and_then(|v| v.as_int());
            let stop = args.optional(1, "stop").and_then(|v| v.as_int());
            text_map(&|t| Scalar::Text(slice_chars(t, start, stop)))
        }
        "startswith" | "endswith" => {
            let pat = args
                .string(0, "pat", name)?
                .ok_or_else(|| Fault::type_error(format!("{name}() missing required argument: 'pat'")))?;
            let na = args.take(1, "na");
            let mut cells = text_map(&|t| {
                Scalar::Bool(if name == "startswith" {
                    t.starts_with(pat.as_str())
                } else {
                    t.ends_with(pat.as_str())
                })
            });
            apply_na(&mut cells, &s.values, na)?;
            cells
        }
        "contains" => {
            let pat = args
                .string(0, "pat", name)?
                .ok_or_else(|| Fault::type_error("contains() missing required argument: 'pat'"))?;
            let case = args.flag(1, "case", true)?;
            args.take_kw("flags");
            let na = args.take(3, "na");
            let regex = args.flag(4, "regex", true)?;
            let mut cells = if regex {
                let re = RegexBuilder::new(&pat)
                    .case_insensitive(!case)
                    .build()
                    .map_err(|e| Fault::value(format!("invalid regular expression: {e}")))?;
                text_map(&|t| Scalar::Bool(re.is_match(t)))
            } else if case {
                text_map(&|t| Scalar::Bool(t.contains(pat.as_str())))
            } else {
                let lowered = pat.to_lowercase();
                text_map(&|t| Scalar::Bool(t.to_lowercase().contains(lowered.as_str())))
            };
            apply_na(&mut cells, &s.values, na)?;
            cells
        }
        "replace" => {
            let pat = args
                .string(0, "pat", name)?
                .ok_or_else(|| Fault::type_error("replace() missing required argument: 'pat'"))?;
            let repl = args
                .string(1, "repl", name)?
                .ok_or_else(|| Fault::type_error("replace() missing required argument: 'repl'"))?;
            let regex = args.flag(3, "regex", false)?;
            if regex {
                let re = RegexBuilder::new(&pat)
                    .build()
                    .map_err(|e| Fault::value(format!("invalid regular expression: {e}")))?;
                text_map(&|t| Scalar::Text(re.replace_all(t, repl.as_str()).into_owned()))
            } else {
                text_map(&|t| Scalar::Text(t.replace(pat.as_str(), &repl)))
            }
        }
        other => return Err(Fault::attribute("StringMethods", other)),
    };
    args.finish(name)?;
    Ok(Value::Series(s.map_values(cells)))
}

/// `series.str[a:b]` / `series.str[i]`.
pub fn str_subscript(s: &Series, key: &Value) -> Exec<Value> {
    let cells = s
        .values
        .iter()
        .map(|v| match v {
            Scalar::Text(t) => match key {
                Value::Slice(sl) => {
                    let chars: Vec<char> = t.chars().collect();
                    Ok(Scalar::Text(
                        sl.positions(chars.len())?.into_iter().map(|i| chars[i]).collect(),
                    ))
                }
                k => {
                    let chars: Vec<char> = t.chars().collect();
                    Ok(match select::by_position(chars.len(), k) {
                        Ok(Rows::One(i)) => Scalar::Text(chars[i].to_string()),
                        _ => Scalar::Float(f64::NAN),
                    })
                }
            },
            _ => Ok(Scalar::Float(f64::NAN)),
        })
        .collect::<Exec<Vec<_>>>()?;
    Ok(Value::Series(s.map_values(cells)))
}

fn slice_chars(t: &str, start: Option<i64>, stop: Option<i64>) -> String {
    let chars: Vec<char> = t.chars().collect();
    let n = chars.len() as i64;
    let fix = |i: i64| if i < 0 { (i + n).max(0) } else { i.min(n) };
    let a = start.map_or(0, fix);
    let b = stop.map_or(n, fix);
    if a >= b {
        return String::new();
    }
    chars[a as usize..b as usize].iter().collect()
}

fn apply_na(cells: &mut [Scalar], source: &[Scalar], na: Option<Value>) -> Exec<()> {
    let Some(na) = na else {
        return Ok(());
    };
    let fill = na.to_scalar()?;
    for (cell, src) in cells.iter_mut().zip(source) {
        if !matches!(src, Scalar::Text(_)) {
            *cell = fill.clone();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Calls;

    impl Invoker for Calls {
        fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Exec<Value> {
            match func {
                Value::Builtin(name) => builtins::call(name, Args::positional(args), self),
                _ => Err(Fault::type_error("not callable")),
            }
        }

        fn limit(&self) -> usize {
            10_000
        }

        fn poll(&self) -> Exec<()> {
            Ok(())
        }

        fn write_stdout(&mut self, _text: &str) {}
    }

    /// An invoker whose deadline has already passed.
    struct Expired;

    impl Invoker for Expired {
        fn invoke(&mut self, _func: &Value, _args: Vec<Value>) -> Exec<Value> {
            Err(Fault::type_error("not callable"))
        }

        fn limit(&self) -> usize {
            10_000
        }

        fn poll(&self) -> Exec<()> {
            Err(Fault::new(super::super::fault::FaultClass::Timeout, "Execution timeout after 1 ms"))
        }

        fn write_stdout(&mut self, _text: &str) {}
    }

    fn prices() -> Series {
        Series::new(
            Some("price".into()),
            vec![Scalar::Int(10), Scalar::Int(30), Scalar::Null, Scalar::Int(20)],
        )
    }

    fn call(s: Series, name: &str, pos: Vec<Value>) -> Value {
        call_method(s, name, Args::positional(pos), &mut Calls)
            .unwrap()
            .value
    }

    #[test]
    fn test_reductions_skip_missing() {
        assert_eq!(call(prices(), "sum", vec![]), Value::Int(60));
        assert_eq!(call(prices(), "mean", vec![]), Value::Float(20.0));
        assert_eq!(call(prices(), "count", vec![]), Value::Int(3));
        assert_eq!(call(prices(), "idxmax", vec![]), Value::Int(1));
    }

    #[test]
    fn test_sort_values_missing_last() {
        let mut kw = IndexMap::new();
        kw.insert("ascending".to_string(), Value::Bool(false));
        let out = call_method(prices(), "sort_values", Args::new(vec![], kw), &mut Calls).unwrap();
        match out.value {
            Value::Series(s) => {
                assert_eq!(s.values[0], Scalar::Int(30));
                assert!(s.values[3].is_missing());
                assert_eq!(s.index.label(0), Scalar::Int(1));
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_fillna_inplace_returns_receiver() {
        let mut kw = IndexMap::new();
        kw.insert("inplace".to_string(), Value::Bool(true));
        let out =
            call_method(prices(), "fillna", Args::new(vec![Value::Int(0)], kw), &mut Calls).unwrap();
        assert_eq!(out.value, Value::None);
        match out.receiver {
            Some(Value::Series(s)) => assert_eq!(s.values[2], Scalar::Int(0)),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_value_counts_orders_by_frequency() {
        let s = Series::new(
            Some("sym".into()),
            vec!["A".into(), "B".into(), "B".into(), "C".into()],
        );
        let counts = value_counts(&s.values, s.name.clone(), false, true);
        assert_eq!(counts.index.levels[0][0], Scalar::from("B"));
        assert_eq!(counts.values[0], Scalar::Int(2));
        assert_eq!(counts.name.as_deref(), Some("count"));
    }

    #[test]
    fn test_apply_with_builtin() {
        let s = Series::new(None, vec![Scalar::Int(-1), Scalar::Int(2)]);
        assert_eq!(
            call(s, "apply", vec![Value::Builtin("abs")]),
            Value::Series(Series::new(None, vec![Scalar::Int(1), Scalar::Int(2)]))
        );
    }

    #[test]
    fn test_str_contains_case_insensitive() {
        let s = Series::new(None, vec!["Apple".into(), "pear".into(), Scalar::Null]);
        let mut kw = IndexMap::new();
        kw.insert("case".to_string(), Value::Bool(false));
        kw.insert("na".to_string(), Value::Bool(false));
        match str_method(&s, "contains", Args::new(vec![Value::Str("ap".into())], kw)).unwrap() {
            Value::Series(m) => assert_eq!(
                m.values,
                vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(false)]
            ),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_str_accessor_rejects_numbers() {
        assert!(attribute(&prices(), "str").is_err());
    }

    #[test]
    fn test_astype_int_rejects_missing() {
        assert!(call_method(prices(), "astype", Args::positional(vec![Value::Type("int")]), &mut Calls).is_err());
    }

    #[test]
    fn test_assign_new_label_appends() {
        let s = Series::new(None, vec![Scalar::Int(1)]);
        let updated = assign(s, None, &Value::Str("x".into()), &Value::Int(5)).unwrap();
        assert_eq!(updated.len(), 2);
        assert_eq!(updated.values[1], Scalar::Int(5));
    }

    #[test]
    fn test_isin_matches_across_numeric_types() {
        let wanted = Value::List(vec![Value::Float(10.0), Value::Int(20), Value::None]);
        match call(prices(), "isin", vec![wanted]) {
            Value::Series(out) => assert_eq!(
                out.values,
                vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(false), Scalar::Bool(true)]
            ),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_isin_stops_at_deadline() {
        let values: Vec<Scalar> = (0..10).map(Scalar::Int).collect();
        let err = isin_flags(&values, &values, &Expired).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_pct_change() {
        let s = Series::new(None, vec![Scalar::Int(10), Scalar::Int(15)]);
        match call(s, "pct_change", vec![]) {
            Value::Series(out) => {
                assert!(out.values[0].is_missing());
                assert_eq!(out.values[1], Scalar::Float(0.5));
            }
            other => panic!("{:?}", other),
        }
    }
}
