//! DataFrame properties, selection, assignment and methods.

use std::cmp::Ordering;
use std::collections::HashSet;

use indexmap::IndexMap;

use crate::dataset::{Column, DType, DataFrame, Index, Scalar, Series};

use super::args::{poll_row, Args, Invoker, Returned};
use super::builtins;
use super::fault::{Exec, Fault};
use super::groupby::GroupBy;
use super::select::{self, Rows};
use super::series_ops;
use super::stats;
use super::value::{repr_str, IndexerKind, Key, Value};

pub const METHODS: &[&str] = &[
    "head", "tail", "nlargest", "nsmallest", "sort_values", "sort_index", "groupby",
    "reset_index", "set_index", "copy", "dropna", "fillna", "rename", "drop", "mean", "sum",
    "min", "max", "count", "median", "std", "var", "prod", "nunique", "describe", "round", "abs",
    "isin", "isna", "isnull", "notna", "notnull", "astype", "drop_duplicates", "duplicated",
    "value_counts", "to_dict", "apply", "assign", "iterrows", "items", "idxmax", "idxmin",
    "cumsum", "any", "all", "get", "insert",
];

fn missing_column(name: &str) -> Fault {
    Fault::key(repr_str(name))
}

fn frame(index: Index, columns: Vec<Column>) -> Exec<DataFrame> {
    DataFrame::with_index(index, columns).map_err(|e| Fault::value(e.to_string()))
}

/// Property access on a frame; `None` when `name` is neither a property nor a column.
pub fn attribute(df: &DataFrame, name: &str) -> Exec<Option<Value>> {
    Ok(Some(match name {
        "columns" => series_ops::labels_value(
            None,
            df.columns.iter().map(|c| Scalar::Text(c.name.clone())).collect(),
        ),
        "index" => series_ops::index_value(&df.index),
        "shape" => Value::Tuple(vec![
            Value::Int(df.n_rows() as i64),
            Value::Int(df.n_cols() as i64),
        ]),
        "size" => Value::Int((df.n_rows() * df.n_cols()) as i64),
        "ndim" => Value::Int(2),
        "empty" => Value::Bool(df.n_rows() == 0 || df.n_cols() == 0),
        "dtypes" => Value::Series(Series::with_index(
            None,
            Index::from_labels(None, df.columns.iter().map(|c| Scalar::Text(c.name.clone())).collect()),
            df.columns
                .iter()
                .map(|c| Scalar::Text(DType::infer(&c.values).to_string()))
                .collect(),
        )),
        "values" => Value::List(
            (0..df.n_rows())
                .map(|r| Value::List(df.columns.iter().map(|c| Value::from_scalar(&c.values[r])).collect()))
                .collect(),
        ),
        "T" => Value::Frame(transpose(df)?),
        other => match IndexerKind::from_attr(other) {
            Some(kind) => Value::Indexer(kind, Box::new(Value::Frame(df.clone()))),
            None => match df.series(other) {
                Some(s) => Value::Series(s),
                None => return Ok(None),
            },
        },
    }))
}

fn transpose(df: &DataFrame) -> Exec<DataFrame> {
    let labels: Vec<Scalar> = (0..df.n_rows()).map(|r| df.index.label(r)).collect();
    let columns = labels
        .iter()
        .enumerate()
        .map(|(r, label)| Column {
            name: Value::from_scalar(label).to_str(),
            values: df.columns.iter().map(|c| c.values[r].clone()).collect(),
        })
        .collect();
    frame(
        Index::from_labels(None, df.columns.iter().map(|c| Scalar::Text(c.name.clone())).collect()),
        columns,
    )
}

/// Frame restricted to `cols`, in that order.
pub fn project(df: &DataFrame, cols: &[String]) -> Exec<DataFrame> {
    let mut columns = Vec::with_capacity(cols.len());
    let mut missing = Vec::new();
    for c in cols {
        match df.column(c) {
            Some(col) => columns.push(col.clone()),
            None => missing.push(repr_str(c)),
        }
    }
    if !missing.is_empty() {
        return Err(Fault::key(format!("[{}] not in index", missing.join(", "))));
    }
    Ok(DataFrame {
        index: df.index.clone(),
        columns,
    })
}

fn column_names_of(v: &Value) -> Option<Vec<String>> {
    match v {
        Value::List(items) | Value::Tuple(items) => items
            .iter()
            .map(|i| i.as_str().map(str::to_string))
            .collect(),
        Value::Series(s) => s.values.iter().map(|v| v.as_str().map(str::to_string)).collect(),
        _ => None,
    }
}

/// `df[key]`.
pub fn subscript(df: &DataFrame, key: &Value) -> Exec<Value> {
    match key {
        Value::Str(name) => df
            .series(name)
            .map(Value::Series)
            .ok_or_else(|| missing_column(name)),
        Value::Slice(_) => match select::by_position(df.n_rows(), key)? {
            Rows::Many(rows) => Ok(Value::Frame(df.take_rows(&rows))),
            Rows::One(r) => Ok(Value::Frame(df.take_rows(&[r]))),
        },
        other => {
            if let Some(rows) = select::mask(df.n_rows(), other)? {
                return Ok(Value::Frame(df.take_rows(&rows)));
            }
            match column_names_of(other) {
                Some(cols) => Ok(Value::Frame(project(df, &cols)?)),
                None => Err(Fault::key(other.repr())),
            }
        }
    }
}

/// Cells for a whole column from an assigned value. A series with different
/// labels is aligned by label; unmatched rows become missing.
fn column_cells(df: &DataFrame, value: &Value) -> Exec<Vec<Scalar>> {
    match value {
        Value::Series(s) if s.index != df.index && s.len() == df.n_rows() && s.index.is_default_range() => {
            Ok(s.values.clone())
        }
        Value::Series(s) if s.index != df.index => Ok((0..df.n_rows())
            .map(|r| {
                s.index
                    .position_of_key(&df.index.key(r))
                    .map_or(Scalar::Float(f64::NAN), |p| s.values[p].clone())
            })
            .collect()),
        other => series_ops::broadcast_cells(other, df.n_rows()),
    }
}

/// `df[key] = value`; returns the updated frame.
pub fn assign(mut df: DataFrame, key: &Value, value: &Value) -> Exec<DataFrame> {
    match key {
        Value::Str(name) => {
            let cells = column_cells(&df, value)?;
            df.set_column(name, cells).map_err(|e| Fault::value(e.to_string()))?;
            Ok(df)
        }
        other => {
            if let Some(rows) = select::mask(df.n_rows(), other)? {
                return set_cells(df, &rows, None, value);
            }
            let Some(cols) = column_names_of(other) else {
                return Err(Fault::type_error(format!(
                    "cannot assign to a frame with a '{}' key",
                    other.type_name()
                )));
            };
            match value {
                Value::Frame(src) => {
                    if src.n_cols() != cols.len() {
                        return Err(Fault::value("Columns must be same length as key"));
                    }
                    for (name, col) in cols.iter().zip(&src.columns) {
                        let cells = column_cells(&df, &Value::Series(Series::with_index(
                            None,
                            src.index.clone(),
                            col.values.clone(),
                        )))?;
                        df.set_column(name, cells).map_err(|e| Fault::value(e.to_string()))?;
                    }
                }
                other => {
                    let cells = column_cells(&df, other)?;
                    for name in &cols {
                        df.set_column(name, cells.clone())
                            .map_err(|e| Fault::value(e.to_string()))?;
                    }
                }
            }
            Ok(df)
        }
    }
}

/// `df.columns = [...]`.
pub fn set_columns(mut df: DataFrame, value: Value, limit: usize) -> Exec<DataFrame> {
    let names: Vec<String> = value
        .collect_values(limit)?
        .into_iter()
        .map(|v| v.to_str())
        .collect();
    if names.len() != df.n_cols() {
        return Err(Fault::value(format!(
            "Length mismatch: Expected axis has {} elements, new values have {} elements",
            df.n_cols(),
            names.len()
        )));
    }
    for (col, name) in df.columns.iter_mut().zip(names) {
        col.name = name;
    }
    frame(df.index, df.columns)
}

/// Resolve the column part of a `.loc`/`.iloc` key to positions; `One` for a single column.
fn column_selector(df: &DataFrame, kind: IndexerKind, key: &Value, create: bool) -> Exec<(Rows, Vec<String>)> {
    let names = df.column_names();
    let label_index = Index::from_labels(None, names.iter().map(|n| Scalar::Text(n.clone())).collect());
    let rows = match kind {
        IndexerKind::Iloc | IndexerKind::Iat => select::by_position(names.len(), key)?,
        _ => match key {
            Value::Str(name) if create && df.column(name).is_none() => {
                return Ok((Rows::One(names.len()), vec![name.clone()]));
            }
            Value::Str(name) if df.column(name).is_none() => return Err(missing_column(name)),
            other => select::by_label(&label_index, other)?,
        },
    };
    Ok((rows, names))
}

fn split_key(key: &Value) -> (Value, Option<Value>) {
    match key {
        Value::Tuple(parts) if parts.len() == 2 => (parts[0].clone(), Some(parts[1].clone())),
        other => (other.clone(), None),
    }
}

fn row_selector(df: &DataFrame, kind: IndexerKind, key: &Value) -> Exec<Rows> {
    match kind {
        IndexerKind::Iloc | IndexerKind::Iat => select::by_position(df.n_rows(), key),
        _ => select::by_label(&df.index, key),
    }
}

/// `df.loc[...]`, `df.iloc[...]`, `df.at[...]`, `df.iat[...]`.
pub fn indexer_get(kind: IndexerKind, df: &DataFrame, key: &Value) -> Exec<Value> {
    let (row_key, col_key) = split_key(key);
    let rows = row_selector(df, kind, &row_key)?;
    let (cols, names) = match &col_key {
        Some(k) => column_selector(df, kind, k, false)?,
        None => (Rows::Many((0..df.n_cols()).collect()), df.column_names()),
    };
    Ok(match (rows, cols) {
        (Rows::One(r), Rows::One(c)) => Value::from_scalar(&df.columns[c].values[r]),
        (Rows::One(r), Rows::Many(cs)) => Value::Series(Series::with_index(
            Some(Value::from_scalar(&df.index.label(r)).to_str()),
            Index::from_labels(None, cs.iter().map(|&c| Scalar::Text(names[c].clone())).collect()),
            cs.iter().map(|&c| df.columns[c].values[r].clone()).collect(),
        )),
        (Rows::Many(rs), Rows::One(c)) => Value::Series(Series::with_index(
            Some(names[c].clone()),
            df.index.take(&rs),
            rs.iter().map(|&r| df.columns[c].values[r].clone()).collect(),
        )),
        (Rows::Many(rs), Rows::Many(cs)) => {
            let sub = df.take_rows(&rs);
            Value::Frame(DataFrame {
                index: sub.index,
                columns: cs.iter().map(|&c| sub.columns[c].clone()).collect(),
            })
        }
    })
}

/// `df.loc[...] = value` and friends; returns the updated frame.
pub fn indexer_set(kind: IndexerKind, mut df: DataFrame, key: &Value, value: &Value) -> Exec<DataFrame> {
    let (row_key, col_key) = split_key(key);
    let rows = match (kind, &row_key) {
        (IndexerKind::Loc | IndexerKind::At, k) if !matches!(k, Value::Slice(_) | Value::List(_) | Value::Series(_)) => {
            match select::by_label(&df.index, k) {
                Ok(r) => r,
                Err(e) if e.class == super::fault::FaultClass::KeyError && col_key.is_some() => {
                    append_row(&mut df, k.to_scalar()?);
                    Rows::One(df.n_rows() - 1)
                }
                Err(e) => return Err(e),
            }
        }
        _ => row_selector(&df, kind, &row_key)?,
    };
    let rows = match rows {
        Rows::One(r) => vec![r],
        Rows::Many(rs) => rs,
    };
    let cols = match &col_key {
        Some(k) => {
            let (sel, _) = column_selector(&df, kind, k, true)?;
            match sel {
                Rows::One(c) if c == df.n_cols() => {
                    let name = k.as_str().unwrap_or_default().to_string();
                    df.set_column(&name, vec![Scalar::Float(f64::NAN); df.n_rows()])
                        .map_err(|e| Fault::value(e.to_string()))?;
                    vec![c]
                }
                Rows::One(c) => vec![c],
                Rows::Many(cs) => cs,
            }
        }
        None => (0..df.n_cols()).collect(),
    };
    set_cells(df, &rows, Some(&cols), value)
}

fn append_row(df: &mut DataFrame, label: Scalar) {
    df.index.levels[0].push(label);
    for level in df.index.levels.iter_mut().skip(1) {
        level.push(Scalar::Null);
    }
    for col in &mut df.columns {
        col.values.push(Scalar::Float(f64::NAN));
    }
}

fn set_cells(mut df: DataFrame, rows: &[usize], cols: Option<&[usize]>, value: &Value) -> Exec<DataFrame> {
    let all: Vec<usize> = (0..df.n_cols()).collect();
    let cols = cols.unwrap_or(&all);
    let cells = match value {
        Value::Series(s) if s.len() == df.n_rows() && s.len() != rows.len() => {
            rows.iter().map(|&r| s.values[r].clone()).collect()
        }
        Value::Frame(_) => {
            return Err(Fault::type_error("cannot assign a DataFrame into selected cells"))
        }
        other => series_ops::broadcast_cells(other, rows.len())?,
    };
    for &c in cols {
        for (&r, v) in rows.iter().zip(&cells) {
            df.columns[c].values[r] = v.clone();
        }
    }
    Ok(df)
}

/// Column-wise reduction into a series indexed by column name.
pub fn reduce(df: &DataFrame, name: &str, args: &mut Args) -> Exec<Value> {
    let numeric_only = args.flag_kw("numeric_only", false)?;
    args.take_kw("skipna");
    let (q, axis) = if name == "quantile" {
        let q = args.take(0, "q").map_or(Some(0.5), |v| v.as_f64()).ok_or_else(|| {
            Fault::type_error("quantile() q must be a number")
        })?;
        (q, axis_arg(args.take_kw("axis"))?)
    } else {
        (0.5, axis_arg(args.take(0, "axis"))?)
    };
    let ddof = if matches!(name, "std" | "var") {
        args.int(usize::MAX, "ddof", 1, name)?.max(0) as usize
    } else {
        1
    };
    let reduce_one = |values: &[Scalar]| -> Exec<Scalar> {
        match name {
            "std" => stats::std(values, ddof),
            "var" => stats::var(values, ddof),
            "quantile" => stats::quantile(values, q),
            other => stats::aggregate(other, values),
        }
    };
    let columns: Vec<&Column> = df
        .columns
        .iter()
        .filter(|c| !numeric_only || DType::infer(&c.values).is_numeric())
        .collect();
    if axis == 1 {
        let cells = (0..df.n_rows())
            .map(|r| {
                let row: Vec<Scalar> = columns.iter().map(|c| c.values[r].clone()).collect();
                reduce_one(&row)
            })
            .collect::<Exec<Vec<_>>>()?;
        return Ok(Value::Series(Series::with_index(None, df.index.clone(), cells)));
    }
    let mut labels = Vec::with_capacity(columns.len());
    let mut cells = Vec::with_capacity(columns.len());
    for c in columns {
        cells.push(reduce_one(&c.values)?);
        labels.push(Scalar::Text(c.name.clone()));
    }
    Ok(Value::Series(Series::with_index(
        None,
        Index::from_labels(None, labels),
        cells,
    )))
}

fn axis_arg(v: Option<Value>) -> Exec<i64> {
    match v {
        None | Some(Value::None) => Ok(0),
        Some(Value::Int(a)) if a == 0 || a == 1 => Ok(a),
        Some(Value::Str(s)) if s == "index" || s == "rows" => Ok(0),
        Some(Value::Str(s)) if s == "columns" => Ok(1),
        Some(other) => Err(Fault::value(format!(
            "No axis named {} for object type DataFrame",
            other.to_str()
        ))),
    }
}

fn string_list(v: Value, what: &str) -> Exec<Vec<String>> {
    match v {
        Value::Str(s) => Ok(vec![s]),
        other => column_names_of(&other).ok_or_else(|| {
            Fault::type_error(format!("{what} must be a column name or list of column names"))
        }),
    }
}

/// Stable multi-column sort; missing values last in every key.
pub fn sort_rows(df: &DataFrame, by: &[String], ascending: &[bool]) -> Exec<Vec<usize>> {
    let keys: Vec<&Vec<Scalar>> = by
        .iter()
        .map(|b| df.column(b).map(|c| &c.values).ok_or_else(|| missing_column(b)))
        .collect::<Exec<_>>()?;
    let mut order: Vec<usize> = (0..df.n_rows()).collect();
    order.sort_by(|&a, &b| {
        for (k, values) in keys.iter().enumerate() {
            let asc = ascending.get(k).copied().unwrap_or(true);
            let (x, y) = (&values[a], &values[b]);
            let o = match (x.is_missing(), y.is_missing()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                _ if asc => x.sort_cmp(y),
                _ => y.sort_cmp(x),
            };
            if o != Ordering::Equal {
                return o;
            }
        }
        Ordering::Equal
    });
    Ok(order)
}

fn ascending_arg(v: Option<Value>, n: usize) -> Exec<Vec<bool>> {
    match v {
        None => Ok(vec![true; n]),
        Some(Value::List(items)) => {
            if items.len() != n {
                return Err(Fault::value(format!(
                    "Length of ascending ({}) != length of by ({n})",
                    items.len()
                )));
            }
            items.iter().map(Value::truthy).collect()
        }
        Some(v) => Ok(vec![v.truthy()?; n]),
    }
}

/// Move index levels into leading columns.
pub fn reset_index(df: &DataFrame, drop: bool) -> Exec<DataFrame> {
    let mut columns = Vec::new();
    if !drop {
        for (name, level) in df.index.column_names().into_iter().zip(&df.index.levels) {
            columns.push(Column {
                name,
                values: level.clone(),
            });
        }
    }
    columns.extend(df.columns.iter().cloned());
    frame(Index::range(df.n_rows()), columns)
}

fn set_index(df: &DataFrame, keys: &[String], drop: bool) -> Exec<DataFrame> {
    let mut levels = Vec::with_capacity(keys.len());
    for k in keys {
        levels.push(df.column(k).ok_or_else(|| missing_column(k))?.values.clone());
    }
    let index = Index {
        names: keys.iter().cloned().map(Some).collect(),
        levels,
    };
    let columns = df
        .columns
        .iter()
        .filter(|c| !drop || !keys.contains(&c.name))
        .cloned()
        .collect();
    frame(index, columns)
}

fn rename_map(v: Value) -> Exec<IndexMap<String, String>> {
    match v {
        Value::Dict(map) => Ok(map
            .into_iter()
            .map(|(k, v)| (k.to_value().to_str(), v.to_str()))
            .collect()),
        other => Err(Fault::type_error(format!(
            "rename() expects a dict mapping, not '{}'",
            other.type_name()
        ))),
    }
}

fn describe(df: &DataFrame) -> Exec<DataFrame> {
    let numeric: Vec<&Column> = df
        .columns
        .iter()
        .filter(|c| DType::infer(&c.values).is_numeric())
        .collect();
    let (labels, columns) = if numeric.is_empty() {
        let mut labels = Vec::new();
        let mut columns = Vec::new();
        for c in &df.columns {
            let rows = series_ops::describe_text(&c.values);
            labels = rows.iter().map(|(l, _)| Scalar::Text(l.clone())).collect();
            columns.push(Column {
                name: c.name.clone(),
                values: rows.into_iter().map(|(_, v)| v).collect(),
            });
        }
        (labels, columns)
    } else {
        let mut labels = Vec::new();
        let mut columns = Vec::new();
        for c in numeric {
            let rows = series_ops::describe(&c.values)?;
            labels = rows.iter().map(|(l, _)| Scalar::Text(l.clone())).collect();
            columns.push(Column {
                name: c.name.clone(),
                values: rows.into_iter().map(|(_, v)| v).collect(),
            });
        }
        (labels, columns)
    };
    frame(Index::from_labels(None, labels), columns)
}

fn map_cells(df: &DataFrame, f: impl Fn(&Scalar) -> Exec<Scalar>) -> Exec<DataFrame> {
    let mut out = df.clone();
    for col in &mut out.columns {
        col.values = col.values.iter().map(&f).collect::<Exec<Vec<_>>>()?;
    }
    Ok(out)
}

fn inplace(args: &mut Args, updated: DataFrame) -> Exec<Returned> {
    if args.flag_kw("inplace", false)? {
        Ok(Returned::mutated(Value::None, Value::Frame(updated)))
    } else {
        Ok(Returned::value(Value::Frame(updated)))
    }
}

fn finish_inplace(mut args: Args, name: &str, updated: DataFrame) -> Exec<Returned> {
    let r = inplace(&mut args, updated)?;
    args.finish(name)?;
    Ok(r)
}

fn row_keys(df: &DataFrame, subset: Option<&[String]>) -> Exec<Vec<Vec<Scalar>>> {
    let cols: Vec<&Column> = match subset {
        Some(names) => names
            .iter()
            .map(|n| df.column(n).ok_or_else(|| missing_column(n)))
            .collect::<Exec<_>>()?,
        None => df.columns.iter().collect(),
    };
    Ok((0..df.n_rows())
        .map(|r| cols.iter().map(|c| c.values[r].clone()).collect())
        .collect())
}

/// `df.name(args)`.
pub fn call_method(df: DataFrame, name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Returned> {
    let limit = inv.limit();
    let out = match name {
        "head" | "tail" => {
            let n = args.int(0, "n", 5, name)?;
            Value::Frame(df.take_rows(&series_ops::head_tail(df.n_rows(), n, name == "head")))
        }
        "nlargest" | "nsmallest" => {
            let n = args.int(0, "n", 5, name)?.max(0) as usize;
            let by = string_list(args.required(1, "columns", name)?, "columns")?;
            args.take_kw("keep");
            let asc = vec![name == "nsmallest"; by.len()];
            let order = sort_rows(&df, &by, &asc)?;
            let rows: Vec<usize> = order
                .into_iter()
                .filter(|&r| by.iter().all(|b| df.column(b).is_some_and(|c| !c.values[r].is_missing())))
                .take(n)
                .collect();
            Value::Frame(df.take_rows(&rows))
        }
        "sort_values" => {
            let by = string_list(args.required(0, "by", name)?, "by")?;
            let ascending = ascending_arg(args.take(usize::MAX, "ascending"), by.len())?;
            args.take_kw("kind");
            args.take_kw("na_position");
            let ignore_index = args.flag_kw("ignore_index", false)?;
            let order = sort_rows(&df, &by, &ascending)?;
            let mut sorted = df.take_rows(&order);
            if ignore_index {
                sorted.index = Index::range(sorted.n_rows());
            }
            return finish_inplace(args, name, sorted);
        }
        "sort_index" => {
            let ascending = args.flag(0, "ascending", true)?;
            let labels: Vec<Scalar> = (0..df.n_rows()).map(|r| df.index.label(r)).collect();
            let order = series_ops::sorted_positions(&labels, ascending);
            let sorted = df.take_rows(&order);
            return finish_inplace(args, name, sorted);
        }
        "groupby" => {
            let grouped = GroupBy::new(df, args)?;
            return Ok(Returned::value(Value::GroupBy(Box::new(grouped))));
        }
        "reset_index" => {
            let drop = args.flag(usize::MAX, "drop", false)?;
            let updated = reset_index(&df, drop)?;
            return finish_inplace(args, name, updated);
        }
        "set_index" => {
            let keys = string_list(args.required(0, "keys", name)?, "keys")?;
            let drop = args.flag(1, "drop", true)?;
            let updated = set_index(&df, &keys, drop)?;
            return finish_inplace(args, name, updated);
        }
        "copy" => {
            args.take(0, "deep");
            Value::Frame(df)
        }
        "dropna" => {
            let axis = axis_arg(args.take(0, "axis"))?;
            let how = args.string(1, "how", name)?.unwrap_or_else(|| "any".into());
            let subset = args.take(usize::MAX, "subset").map(|v| string_list(v, "subset")).transpose()?;
            let updated = if axis == 1 {
                let keep: Vec<Column> = df
                    .columns
                    .iter()
                    .filter(|c| {
                        let missing = c.values.iter().filter(|v| v.is_missing()).count();
                        if how == "all" {
                            missing < c.values.len() || c.values.is_empty()
                        } else {
                            missing == 0
                        }
                    })
                    .cloned()
                    .collect();
                DataFrame {
                    index: df.index.clone(),
                    columns: keep,
                }
            } else {
                let keys = row_keys(&df, subset.as_deref())?;
                let rows: Vec<usize> = keys
                    .iter()
                    .enumerate()
                    .filter(|(_, k)| {
                        if how == "all" {
                            !k.iter().all(Scalar::is_missing) || k.is_empty()
                        } else {
                            !k.iter().any(Scalar::is_missing)
                        }
                    })
                    .map(|(r, _)| r)
                    .collect();
                df.take_rows(&rows)
            };
            return finish_inplace(args, name, updated);
        }
        "fillna" => {
            let fill = args.required(0, "value", name)?;
            let mut updated = df.clone();
            match fill {
                Value::Dict(map) => {
                    for (k, v) in map {
                        let col = k.to_value().to_str();
                        let cell = v.to_scalar()?;
                        if let Some(pos) = updated.column_position(&col) {
                            for value in &mut updated.columns[pos].values {
                                if value.is_missing() {
                                    *value = cell.clone();
                                }
                            }
                        }
                    }
                }
                Value::Series(s) => {
                    for col in &mut updated.columns {
                        if let Some(cell) = s.get(&Scalar::Text(col.name.clone())) {
                            for value in &mut col.values {
                                if value.is_missing() {
                                    *value = cell.clone();
                                }
                            }
                        }
                    }
                }
                other => {
                    let cell = other.to_scalar()?;
                    updated = map_cells(&df, |v| Ok(if v.is_missing() { cell.clone() } else { v.clone() }))?;
                }
            }
            return finish_inplace(args, name, updated);
        }
        "rename" => {
            let mapping = match args.take(usize::MAX, "columns") {
                Some(m) => rename_map(m)?,
                None => {
                    let mapper = args.take(0, "mapper");
                    let axis = axis_arg(args.take(usize::MAX, "axis"))?;
                    match mapper {
                        Some(m) if axis == 1 => rename_map(m)?,
                        Some(_) => {
                            return Err(Fault::type_error(
                                "rename() supports column mappings only; pass columns={...}",
                            ))
                        }
                        None => IndexMap::new(),
                    }
                }
            };
            args.take_kw("errors");
            let mut updated = df.clone();
            for col in &mut updated.columns {
                if let Some(new) = mapping.get(&col.name) {
                    col.name = new.clone();
                }
            }
            let updated = frame(updated.index, updated.columns)?;
            return finish_inplace(args, name, updated);
        }
        "drop" => {
            let labels = args.take(0, "labels");
            let axis = axis_arg(args.take(1, "axis"))?;
            let columns = args.take_kw("columns");
            let index = args.take_kw("index");
            let errors = args.string(usize::MAX, "errors", name)?.unwrap_or_else(|| "raise".into());
            let (col_labels, row_labels) = match (labels, columns, index) {
                (Some(l), None, None) if axis == 1 => (Some(l), None),
                (Some(l), None, None) => (None, Some(l)),
                (None, c, i) => (c, i),
                _ => {
                    return Err(Fault::value(
                        "Cannot specify both 'labels' and 'index'/'columns'",
                    ))
                }
            };
            let mut updated = df.clone();
            if let Some(cols) = col_labels {
                let cols = string_list(cols, "columns")?;
                for c in &cols {
                    if updated.column(c).is_none() && errors == "raise" {
                        return Err(Fault::key(format!("[{}] not found in axis", repr_str(c))));
                    }
                }
                updated.columns.retain(|col| !cols.contains(&col.name));
            }
            if let Some(rows) = row_labels {
                let rows = match rows {
                    Value::List(items) => items,
                    Value::Series(s) => s.values.iter().map(Value::from_scalar).collect(),
                    single => vec![single],
                };
                let table = updated.index.positions();
                let mut dropped = HashSet::new();
                for r in &rows {
                    let label = r.to_scalar()?;
                    let found = match &table {
                        Some(table) => label.lookup_key().and_then(|k| table.get(&k).copied()),
                        None => updated.index.position(&label),
                    };
                    match found {
                        Some(p) => {
                            dropped.insert(p);
                        }
                        None if errors == "raise" => {
                            return Err(Fault::key(format!("[{}] not found in axis", r.repr())))
                        }
                        None => {}
                    }
                }
                let keep: Vec<usize> = (0..updated.n_rows()).filter(|r| !dropped.contains(r)).collect();
                updated = updated.take_rows(&keep);
            }
            return finish_inplace(args, name, updated);
        }
        "mean" | "sum" | "min" | "max" | "count" | "median" | "std" | "var" | "prod"
        | "nunique" | "quantile" => {
            args.take_kw("min_count");
            reduce(&df, name, &mut args)?
        }
        "idxmax" | "idxmin" => {
            let want = if name == "idxmax" { Ordering::Greater } else { Ordering::Less };
            args.take_kw("numeric_only");
            let mut labels = Vec::new();
            let mut cells = Vec::new();
            for c in &df.columns {
                let pos = stats::arg_extreme(&c.values, want).ok_or_else(|| {
                    Fault::value(format!("attempt to get arg{} of an empty sequence", &name[3..]))
                })?;
                labels.push(Scalar::Text(c.name.clone()));
                cells.push(df.index.label(pos));
            }
            Value::Series(Series::with_index(None, Index::from_labels(None, labels), cells))
        }
        "any" | "all" => {
            let mut labels = Vec::new();
            let mut cells = Vec::new();
            for c in &df.columns {
                let mut present = c.values.iter().filter(|v| !v.is_missing()).map(super::ops::mask_bool);
                let b = if name == "any" { present.any(|b| b) } else { present.all(|b| b) };
                labels.push(Scalar::Text(c.name.clone()));
                cells.push(Scalar::Bool(b));
            }
            Value::Series(Series::with_index(None, Index::from_labels(None, labels), cells))
        }
        "cumsum" => {
            let mut out = df.clone();
            for col in &mut out.columns {
                let s = Series::new(None, col.values.clone());
                let Returned { value, .. } = series_ops::call_method(s, "cumsum", Args::default(), inv)?;
                if let Value::Series(s) = value {
                    col.values = s.values;
                }
            }
            Value::Frame(out)
        }
        "describe" => Value::Frame(describe(&df)?),
        "round" => {
            let d = args.int(0, "decimals", 0, name)?;
            Value::Frame(map_cells(&df, |v| Ok(builtins::round_scalar(v, d)))?)
        }
        "abs" => Value::Frame(map_cells(&df, builtins::abs_scalar)?),
        "isna" | "isnull" | "notna" | "notnull" => {
            let want_missing = name.starts_with("is");
            Value::Frame(map_cells(&df, |v| Ok(Scalar::Bool(v.is_missing() == want_missing)))?)
        }
        "isin" => {
            let values = args.required(0, "values", name)?;
            let mut out = df.clone();
            for col in &mut out.columns {
                let wanted: Vec<Scalar> = match &values {
                    Value::Dict(map) => match map.get(&Key::Str(col.name.clone())) {
                        Some(v) => series_ops::cells_of(v.clone(), limit)?,
                        None => Vec::new(),
                    },
                    other => series_ops::cells_of(other.clone(), limit)?,
                };
                col.values = series_ops::isin_flags(&col.values, &wanted, inv)?;
            }
            Value::Frame(out)
        }
        "astype" => {
            let target = args.required(0, "dtype", name)?;
            let mut out = df.clone();
            for col in &mut out.columns {
                let t = match &target {
                    Value::Dict(map) => match map.get(&Key::Str(col.name.clone())) {
                        Some(t) => series_ops::dtype_name(t)?,
                        None => continue,
                    },
                    other => series_ops::dtype_name(other)?,
                };
                col.values = col
                    .values
                    .iter()
                    .map(|v| series_ops::cast(v, &t))
                    .collect::<Exec<Vec<_>>>()?;
            }
            Value::Frame(out)
        }
        "drop_duplicates" | "duplicated" => {
            let subset = args.take(0, "subset").map(|v| string_list(v, "subset")).transpose()?;
            let keep = series_ops::keep_arg(args.take(1, "keep"))?;
            let flags = series_ops::duplicated_flags(&row_keys(&df, subset.as_deref())?, &keep);
            if name == "duplicated" {
                Value::Series(Series::with_index(
                    None,
                    df.index.clone(),
                    flags.into_iter().map(Scalar::Bool).collect(),
                ))
            } else {
                let ignore_index = args.flag_kw("ignore_index", false)?;
                let rows: Vec<usize> = (0..df.n_rows()).filter(|&r| !flags[r]).collect();
                let mut updated = df.take_rows(&rows);
                if ignore_index {
                    updated.index = Index::range(updated.n_rows());
                }
                return finish_inplace(args, name, updated);
            }
        }
        "value_counts" => {
            let subset = args.take(0, "subset").map(|v| string_list(v, "subset")).transpose()?;
            let normalize = args.flag(1, "normalize", false)?;
            let names = subset.unwrap_or_else(|| df.column_names());
            let keys = row_keys(&df, Some(&names))?;
            let mut counts: IndexMap<String, (Vec<Scalar>, usize)> = IndexMap::new();
            for k in keys {
                if k.iter().any(Scalar::is_missing) {
                    continue;
                }
                let id = k.iter().map(Scalar::group_key).collect::<Vec<_>>().join("\u{1f}");
                counts.entry(id).or_insert_with(|| (k, 0)).1 += 1;
            }
            let mut entries: Vec<(Vec<Scalar>, usize)> = counts.into_values().collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1));
            let total: usize = entries.iter().map(|e| e.1).sum();
            let index = Index {
                names: names.iter().cloned().map(Some).collect(),
                levels: (0..names.len())
                    .map(|l| entries.iter().map(|e| e.0[l].clone()).collect())
                    .collect(),
            };
            let (label, cells) = if normalize {
                (
                    "proportion",
                    entries
                        .iter()
                        .map(|e| Scalar::Float(e.1 as f64 / total.max(1) as f64))
                        .collect(),
                )
            } else {
                ("count", entries.iter().map(|e| Scalar::Int(e.1 as i64)).collect())
            };
            Value::Series(Series::with_index(Some(label.to_string()), index, cells))
        }
        "to_dict" => {
            let orient = args.string(0, "orient", name)?.unwrap_or_else(|| "dict".into());
            to_dict(&df, &orient, inv)?
        }
        "apply" => {
            let func = args.required(0, "func", name)?;
            let axis = axis_arg(args.take(1, "axis"))?;
            apply(&df, &func, axis, inv)?
        }
        "assign" => {
            let mut updated = df.clone();
            for (col, v) in args.take_all_kw() {
                let v = if v.is_callable() {
                    inv.invoke(&v, vec![Value::Frame(updated.clone())])?
                } else {
                    v
                };
                updated = assign(updated, &Value::Str(col), &v)?;
            }
            Value::Frame(updated)
        }
        "insert" => {
            let loc = args.int(0, "loc", 0, name)?;
            let column = args
                .string(1, "column", name)?
                .ok_or_else(|| Fault::type_error("insert() missing required argument: 'column'"))?;
            let value = args.required(2, "value", name)?;
            if df.column(&column).is_some() {
                return Err(Fault::value(format!("cannot insert {column}, already exists")));
            }
            let cells = column_cells(&df, &value)?;
            let mut updated = df.clone();
            let at = (loc.max(0) as usize).min(updated.n_cols());
            updated.columns.insert(at, Column { name: column, values: cells });
            args.finish(name)?;
            return Ok(Returned::mutated(Value::None, Value::Frame(updated)));
        }
        "iterrows" => {
            if df.n_rows() > limit {
                return Err(Fault::too_large(limit));
            }
            let mut rows = Vec::with_capacity(df.n_rows());
            for r in 0..df.n_rows() {
                poll_row(inv, r)?;
                let row = indexer_get(IndexerKind::Iloc, &df, &Value::Int(r as i64))?;
                rows.push(Value::Tuple(vec![Value::from_scalar(&df.index.label(r)), row]));
            }
            Value::List(rows)
        }
        "items" => Value::List(
            df.columns
                .iter()
                .filter_map(|c| {
                    df.series(&c.name)
                        .map(|s| Value::Tuple(vec![Value::Str(c.name.clone()), Value::Series(s)]))
                })
                .collect(),
        ),
        "get" => {
            let key = args.required(0, "key", name)?;
            let default = args.take(1, "default").unwrap_or(Value::None);
            match subscript(&df, &key) {
                Ok(v) => v,
                Err(e) if e.class == super::fault::FaultClass::KeyError => default,
                Err(e) => return Err(e),
            }
        }
        other => return Err(Fault::attribute("DataFrame", other)),
    };
    args.finish(name)?;
    Ok(Returned::value(out))
}

fn to_dict(df: &DataFrame, orient: &str, inv: &dyn Invoker) -> Exec<Value> {
    let label = |r: usize| Key::from_scalar(&df.index.label(r));
    let row_dict = |r: usize| -> Exec<IndexMap<Key, Value>> {
        poll_row(inv, r)?;
        Ok(df
            .columns
            .iter()
            .map(|c| (Key::Str(c.name.clone()), Value::from_scalar(&c.values[r])))
            .collect())
    };
    Ok(match orient {
        "dict" => Value::Dict(
            df.columns
                .iter()
                .map(|c| {
                    let inner = c
                        .values
                        .iter()
                        .enumerate()
                        .map(|(r, v)| (label(r), Value::from_scalar(v)))
                        .collect();
                    (Key::Str(c.name.clone()), Value::Dict(inner))
                })
                .collect(),
        ),
        "list" => Value::Dict(
            df.columns
                .iter()
                .map(|c| {
                    (
                        Key::Str(c.name.clone()),
                        Value::List(c.values.iter().map(Value::from_scalar).collect()),
                    )
                })
                .collect(),
        ),
        "records" => Value::List(
            (0..df.n_rows())
                .map(|r| row_dict(r).map(Value::Dict))
                .collect::<Exec<Vec<_>>>()?,
        ),
        "index" => Value::Dict(
            (0..df.n_rows())
                .map(|r| Ok((label(r), Value::Dict(row_dict(r)?))))
                .collect::<Exec<IndexMap<_, _>>>()?,
        ),
        other => {
            return Err(Fault::value(format!(
                "orient '{other}' not understood"
            )))
        }
    })
}

fn apply(df: &DataFrame, func: &Value, axis: i64, inv: &mut dyn Invoker) -> Exec<Value> {
    if axis == 1 {
        let mut cells = Vec::with_capacity(df.n_rows());
        for r in 0..df.n_rows() {
            inv.poll()?;
            let row = indexer_get(IndexerKind::Iloc, df, &Value::Int(r as i64))?;
            cells.push(inv.invoke(func, vec![row])?.to_scalar()?);
        }
        return Ok(Value::Series(Series::with_index(None, df.index.clone(), cells)));
    }
    let mut labels = Vec::with_capacity(df.n_cols());
    let mut results = Vec::with_capacity(df.n_cols());
    for c in &df.columns {
        inv.poll()?;
        let s = df.series(&c.name).ok_or_else(|| missing_column(&c.name))?;
        labels.push(Scalar::Text(c.name.clone()));
        results.push(inv.invoke(func, vec![Value::Series(s)])?);
    }
    if results.iter().all(|v| matches!(v, Value::Series(s) if s.len() == df.n_rows())) {
        let columns = df
            .columns
            .iter()
            .zip(results)
            .filter_map(|(c, v)| match v {
                Value::Series(s) => Some(Column {
                    name: c.name.clone(),
                    values: s.values,
                }),
                _ => None,
            })
            .collect();
        return Ok(Value::Frame(frame(df.index.clone(), columns)?));
    }
    let cells = results
        .iter()
        .map(Value::to_scalar)
        .collect::<Exec<Vec<_>>>()?;
    Ok(Value::Series(Series::with_index(None, Index::from_labels(None, labels), cells)))
}

/// `pd.DataFrame(data, columns=..., index=...)`.
pub fn construct(data: Option<Value>, columns: Option<Vec<String>>, index: Option<Value>, limit: usize) -> Exec<DataFrame> {
    let mut df = match data {
        None | Some(Value::None) => DataFrame::default(),
        Some(Value::Frame(df)) => df,
        Some(Value::Dict(map)) => {
            let n = map
                .values()
                .filter_map(|v| match v {
                    Value::List(items) | Value::Tuple(items) => Some(items.len()),
                    Value::Series(s) => Some(s.len()),
                    Value::Range(r) => Some(r.len()),
                    _ => None,
                })
                .max();
            let Some(n) = n else {
                return Err(Fault::value("If using all scalar values, you must pass an index"));
            };
            let mut cols = Vec::with_capacity(map.len());
            let mut row_index = None;
            for (k, v) in map {
                let values = match v {
                    Value::Series(s) => {
                        if row_index.is_none() && !s.index.is_default_range() {
                            row_index = Some(s.index.clone());
                        }
                        s.values
                    }
                    Value::List(_) | Value::Tuple(_) | Value::Range(_) => series_ops::cells_of(v, limit)?,
                    scalar => vec![scalar.to_scalar()?; n],
                };
                if values.len() != n {
                    return Err(Fault::value("All arrays must be of the same length"));
                }
                cols.push(Column {
                    name: k.to_value().to_str(),
                    values,
                });
            }
            frame(row_index.unwrap_or_else(|| Index::range(n)), cols)?
        }
        Some(Value::List(rows)) => {
            let mut names: Vec<String> = columns.clone().unwrap_or_default();
            let all_dicts = rows.iter().all(|r| matches!(r, Value::Dict(_)));
            if all_dicts {
                for r in &rows {
                    if let Value::Dict(map) = r {
                        for k in map.keys() {
                            let k = k.to_value().to_str();
                            if !names.contains(&k) {
                                names.push(k);
                            }
                        }
                    }
                }
            }
            let mut cols: Vec<Column> = names
                .iter()
                .map(|n| Column { name: n.clone(), values: Vec::with_capacity(rows.len()) })
                .collect();
            for (i, r) in rows.iter().enumerate() {
                match r {
                    Value::Dict(map) => {
                        for col in &mut cols {
                            let cell = map
                                .get(&Key::Str(col.name.clone()))
                                .map(Value::to_scalar)
                                .transpose()?
                                .unwrap_or(Scalar::Float(f64::NAN));
                            col.values.push(cell);
                        }
                    }
                    Value::List(items) | Value::Tuple(items) => {
                        if cols.is_empty() && i == 0 {
                            cols = (0..items.len())
                                .map(|c| Column { name: c.to_string(), values: Vec::new() })
                                .collect();
                        }
                        if items.len() != cols.len() {
                            return Err(Fault::value(format!(
                                "{} columns passed, passed data had {} columns",
                                cols.len(),
                                items.len()
                            )));
                        }
                        for (col, item) in cols.iter_mut().zip(items) {
                            col.values.push(item.to_scalar()?);
                        }
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "DataFrame rows must be dicts or lists, not '{}'",
                            other.type_name()
                        )))
                    }
                }
            }
            let n = rows.len();
            return finish_construct(frame(Index::range(n), cols)?, index, limit);
        }
        Some(other) => {
            return Err(Fault::type_error(format!(
                "DataFrame constructor not properly called with '{}'",
                other.type_name()
            )))
        }
    };
    if let Some(cols) = &columns {
        df = project(&df, cols)?;
    }
    finish_construct(df, index, limit)
}

fn finish_construct(mut df: DataFrame, index: Option<Value>, limit: usize) -> Exec<DataFrame> {
    if let Some(index) = index {
        let labels = series_ops::cells_of(index, limit)?;
        if labels.len() != df.n_rows() {
            return Err(Fault::value(format!(
                "Length of values ({}) does not match length of index ({})",
                labels.len(),
                df.n_rows()
            )));
        }
        df.index = Index::from_labels(None, labels);
    }
    Ok(df)
}

/// `pd.concat([...], axis=0|1, ignore_index=False)`.
pub fn concat(items: Vec<Value>, axis: i64, ignore_index: bool) -> Exec<Value> {
    if items.is_empty() {
        return Err(Fault::value("No objects to concatenate"));
    }
    if items.iter().all(|v| matches!(v, Value::Series(_))) && axis == 0 {
        let mut labels = Vec::new();
        let mut cells = Vec::new();
        let mut name = None;
        for (i, v) in items.into_iter().enumerate() {
            if let Value::Series(s) = v {
                if i == 0 {
                    name = s.name.clone();
                } else if name != s.name {
                    name = None;
                }
                labels.extend((0..s.len()).map(|r| s.index.label(r)));
                cells.extend(s.values);
            }
        }
        let index = if ignore_index {
            Index::range(cells.len())
        } else {
            Index::from_labels(None, labels)
        };
        return Ok(Value::Series(Series::with_index(name, index, cells)));
    }
    let frames: Vec<DataFrame> = items
        .into_iter()
        .map(|v| match v {
            Value::Frame(df) => Ok(df),
            Value::Series(s) => Ok(series_ops::to_frame(&s, None)),
            other => Err(Fault::type_error(format!(
                "cannot concatenate object of type '{}'; only Series and DataFrame objs are valid",
                other.type_name()
            ))),
        })
        .collect::<Exec<_>>()?;
    if axis == 1 {
        let mut columns: Vec<Column> = Vec::new();
        let first = &frames[0];
        for df in &frames {
            if df.n_rows() != first.n_rows() {
                return Err(Fault::value("cannot concatenate frames with different row counts along columns"));
            }
            columns.extend(df.columns.iter().cloned());
        }
        return Ok(Value::Frame(frame(first.index.clone(), columns)?));
    }
    let mut names: Vec<String> = Vec::new();
    for df in &frames {
        for c in &df.columns {
            if !names.contains(&c.name) {
                names.push(c.name.clone());
            }
        }
    }
    let mut labels = Vec::new();
    let mut columns: Vec<Column> = names
        .iter()
        .map(|n| Column { name: n.clone(), values: Vec::new() })
        .collect();
    for df in &frames {
        labels.extend((0..df.n_rows()).map(|r| df.index.label(r)));
        for col in &mut columns {
            match df.column(&col.name) {
                Some(src) => col.values.extend(src.values.iter().cloned()),
                None => col
                    .values
                    .extend(std::iter::repeat(Scalar::Float(f64::NAN)).take(df.n_rows())),
            }
        }
    }
    let index = if ignore_index {
        Index::range(labels.len())
    } else {
        Index::from_labels(None, labels)
    };
    Ok(Value::Frame(frame(index, columns)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoCalls;

    impl Invoker for NoCalls {
        fn invoke(&mut self, _func: &Value, _args: Vec<Value>) -> Exec<Value> {
            Err(Fault::type_error("not callable"))
        }

        fn limit(&self) -> usize {
            1_000
        }

        fn poll(&self) -> Exec<()> {
            Ok(())
        }

        fn write_stdout(&mut self, _text: &str) {}
    }

    fn stocks() -> DataFrame {
        DataFrame::from_columns(vec![
            ("symbol", vec!["AAA".into(), "BBB".into(), "CCC".into()]),
            ("price", vec![Scalar::Int(10), Scalar::Int(30), Scalar::Int(20)]),
        ])
        .unwrap()
    }

    fn call(df: DataFrame, name: &str, pos: Vec<Value>) -> Exec<Returned> {
        call_method(df, name, Args::positional(pos), &mut NoCalls)
    }

    #[test]
    fn test_missing_column_is_key_error() {
        let err = subscript(&stocks(), &Value::Str("revenue".into())).unwrap_err();
        assert_eq!(err.class, super::super::fault::FaultClass::KeyError);
        assert_eq!(err.message, "'revenue'");
    }

    #[test]
    fn test_nlargest() {
        let out = call(stocks(), "nlargest", vec![Value::Int(2), Value::Str("price".into())]).unwrap();
        let Value::Frame(df) = out.value else { panic!("expected frame") };
        assert_eq!(df.column("price").unwrap().values, vec![Scalar::Int(30), Scalar::Int(20)]);
        assert_eq!(df.index.levels[0], vec![Scalar::Int(1), Scalar::Int(2)]);
    }

    #[test]
    fn test_mask_selection_keeps_labels() {
        let mask = Value::Series(Series::new(
            None,
            vec![Scalar::Bool(false), Scalar::Bool(true), Scalar::Bool(true)],
        ));
        let Value::Frame(df) = subscript(&stocks(), &mask).unwrap() else {
            panic!("expected frame")
        };
        assert_eq!(df.n_rows(), 2);
        assert_eq!(df.index.label(0), Scalar::Int(1));
    }

    #[test]
    fn test_mean_over_text_column_needs_numeric_only() {
        assert!(call(stocks(), "mean", vec![]).is_err());
        let mut kw = IndexMap::new();
        kw.insert("numeric_only".to_string(), Value::Bool(true));
        let out = call_method(stocks(), "mean", Args::new(vec![], kw), &mut NoCalls).unwrap();
        let Value::Series(s) = out.value else { panic!("expected series") };
        assert_eq!(s.values, vec![Scalar::Float(20.0)]);
        assert_eq!(s.index.label(0), Scalar::from("price"));
    }

    #[test]
    fn test_assign_column_broadcasts_scalar() {
        let df = assign(stocks(), &Value::Str("qty".into()), &Value::Int(1)).unwrap();
        assert_eq!(df.column("qty").unwrap().values, vec![Scalar::Int(1); 3]);
    }

    #[test]
    fn test_loc_mask_and_column_assignment() {
        let mask = Value::Series(Series::new(
            None,
            vec![Scalar::Bool(true), Scalar::Bool(false), Scalar::Bool(true)],
        ));
        let key = Value::Tuple(vec![mask, Value::Str("flag".into())]);
        let df = indexer_set(IndexerKind::Loc, stocks(), &key, &Value::Str("hit".into())).unwrap();
        let flags = &df.column("flag").unwrap().values;
        assert_eq!(flags[0], Scalar::from("hit"));
        assert!(flags[1].is_missing());
    }

    #[test]
    fn test_iloc_scalar_and_row() {
        let df = stocks();
        assert_eq!(
            indexer_get(IndexerKind::Iloc, &df, &Value::Tuple(vec![Value::Int(1), Value::Int(1)])).unwrap(),
            Value::Int(30)
        );
        let Value::Series(row) = indexer_get(IndexerKind::Iloc, &df, &Value::Int(0)).unwrap() else {
            panic!("expected series")
        };
        assert_eq!(row.get(&Scalar::from("symbol")), Some(&Scalar::from("AAA")));
    }

    #[test]
    fn test_sort_values_inplace() {
        let mut kw = IndexMap::new();
        kw.insert("inplace".to_string(), Value::Bool(true));
        kw.insert("ascending".to_string(), Value::Bool(false));
        let out = call_method(stocks(), "sort_values", Args::new(vec![Value::Str("price".into())], kw), &mut NoCalls)
            .unwrap();
        assert_eq!(out.value, Value::None);
        let Some(Value::Frame(df)) = out.receiver else { panic!("expected receiver") };
        assert_eq!(df.column("symbol").unwrap().values[0], Scalar::from("BBB"));
    }

    #[test]
    fn test_columns_membership() {
        let cols = attribute(&stocks(), "columns").unwrap().unwrap();
        assert!(super::super::ops::contains(&cols, &Value::Str("price".into())).unwrap());
    }

    #[test]
    fn test_set_columns_length_mismatch() {
        let err = set_columns(stocks(), Value::List(vec![Value::Str("a".into())]), 100).unwrap_err();
        assert!(err.message.starts_with("Length mismatch"));
    }

    #[test]
    fn test_construct_from_records() {
        let mut r1 = IndexMap::new();
        r1.insert(Key::Str("a".into()), Value::Int(1));
        let mut r2 = IndexMap::new();
        r2.insert(Key::Str("b".into()), Value::Int(2));
        let df = construct(Some(Value::List(vec![Value::Dict(r1), Value::Dict(r2)])), None, None, 100).unwrap();
        assert_eq!(df.column_names(), vec!["a", "b"]);
        assert!(df.column("a").unwrap().values[1].is_missing());
    }

    #[test]
    fn test_groupby_returns_pending_groups() {
        let out = call(stocks(), "groupby", vec![Value::Str("symbol".into())]).unwrap();
        assert!(out.receiver.is_none());
        let Value::GroupBy(g) = out.value else { panic!("expected groupby") };
        assert_eq!(g.keys, vec!["symbol".to_string()]);
    }

    #[test]
    fn test_drop_rows_by_label() {
        let labels = Value::List(vec![Value::Int(0), Value::Float(2.0)]);
        let Value::Frame(df) = call(stocks(), "drop", vec![labels]).unwrap().value else {
            panic!("expected frame")
        };
        assert_eq!(df.column("symbol").unwrap().values, vec![Scalar::from("BBB")]);
        assert!(call(stocks(), "drop", vec![Value::List(vec![Value::Int(9)])]).is_err());
    }

    #[test]
    fn test_concat_rows() {
        let Value::Frame(df) = concat(vec![Value::Frame(stocks()), Value::Frame(stocks())], 0, true).unwrap() else {
            panic!("expected frame")
        };
        assert_eq!(df.n_rows(), 6);
        assert!(df.index.is_default_range());
    }
}
