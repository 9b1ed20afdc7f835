//! Split-apply-combine over frame columns.

use indexmap::IndexMap;

use crate::dataset::{Column, DataFrame, Index, Scalar, Series};

use super::args::{Args, Invoker};
use super::fault::{Exec, Fault};
use super::stats;
use super::value::{Key, Value};

pub const METHODS: &[&str] = &[
    "sum", "mean", "count", "min", "max", "median", "size", "nunique", "first", "last", "std",
    "var", "prod", "agg", "aggregate", "get_group", "apply", "transform", "cumsum", "cumcount",
    "head", "tail",
];

/// Columns picked out of a group-by with `g[col]` or `g[[cols]]`.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    One(String),
    Many(Vec<String>),
}

/// A pending `frame.groupby(...)`; nothing is computed until an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy {
    pub frame: DataFrame,
    pub keys: Vec<String>,
    pub selection: Option<Selection>,
    pub as_index: bool,
    pub sort: bool,
    pub dropna: bool,
}

struct Group {
    key: Vec<Scalar>,
    rows: Vec<usize>,
}

impl GroupBy {
    /// `frame.groupby(by, as_index=True, sort=True, dropna=True)`.
    pub fn new(frame: DataFrame, mut args: Args) -> Exec<Self> {
        let by = args.required(0, "by", "groupby")?;
        let keys = match by {
            Value::Str(k) => vec![k],
            Value::List(items) | Value::Tuple(items) => items
                .iter()
                .map(key_name)
                .collect::<Exec<Vec<_>>>()?,
            other => vec![key_name(&other)?],
        };
        for k in &keys {
            if frame.column(k).is_none() {
                return Err(Fault::key(super::value::repr_str(k)));
            }
        }
        args.take_kw("axis");
        args.take_kw("group_keys");
        args.take_kw("observed");
        let as_index = args.flag_kw("as_index", true)?;
        let sort = args.flag_kw("sort", true)?;
        let dropna = args.flag_kw("dropna", true)?;
        args.finish("groupby")?;
        Ok(Self {
            frame,
            keys,
            selection: None,
            as_index,
            sort,
            dropna,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self.selection {
            Some(Selection::One(_)) => "SeriesGroupBy",
            _ => "DataFrameGroupBy",
        }
    }

    pub fn n_groups(&self) -> Exec<usize> {
        Ok(self.groups().len())
    }

    /// `(key, sub-frame or sub-series)` pairs for `for key, part in g`.
    pub fn iter_groups(&self) -> Exec<Vec<Value>> {
        Ok(self
            .groups()
            .into_iter()
            .map(|g| Value::Tuple(vec![self.key_value(&g.key), self.part(&g.rows)]))
            .collect())
    }

    fn groups(&self) -> Vec<Group> {
        let key_cols: Vec<&Column> = self
            .keys
            .iter()
            .filter_map(|k| self.frame.column(k))
            .collect();
        let mut groups: IndexMap<String, Group> = IndexMap::new();
        for row in 0..self.frame.n_rows() {
            let key: Vec<Scalar> = key_cols.iter().map(|c| c.values[row].clone()).collect();
            if self.dropna && key.iter().any(Scalar::is_missing) {
                continue;
            }
            let id = key.iter().map(Scalar::group_key).collect::<Vec<_>>().join("\u{1f}");
            groups
                .entry(id)
                .or_insert_with(|| Group {
                    key,
                    rows: Vec::new(),
                })
                .rows
                .push(row);
        }
        let mut groups: Vec<Group> = groups.into_values().collect();
        if self.sort {
            groups.sort_by(|a, b| {
                a.key
                    .iter()
                    .zip(&b.key)
                    .map(|(x, y)| x.sort_cmp(y))
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        groups
    }

    fn key_value(&self, key: &[Scalar]) -> Value {
        if key.len() == 1 {
            Value::from_scalar(&key[0])
        } else {
            Value::Tuple(key.iter().map(Value::from_scalar).collect())
        }
    }

    fn part(&self, rows: &[usize]) -> Value {
        let sub = self.frame.take_rows(rows);
        match &self.selection {
            Some(Selection::One(col)) => sub
                .series(col)
                .map_or(Value::None, Value::Series),
            Some(Selection::Many(cols)) => Value::Frame(project(&sub, cols)),
            None => Value::Frame(sub),
        }
    }

    /// Columns aggregated by a plain reduction.
    fn value_columns(&self) -> Vec<String> {
        match &self.selection {
            Some(Selection::One(c)) => vec![c.clone()],
            Some(Selection::Many(cs)) => cs.clone(),
            None => self
                .frame
                .column_names()
                .into_iter()
                .filter(|c| !self.keys.contains(c))
                .collect(),
        }
    }

    fn result_index(&self, groups: &[Group]) -> Index {
        Index {
            names: self.keys.iter().cloned().map(Some).collect(),
            levels: (0..self.keys.len())
                .map(|l| groups.iter().map(|g| g.key[l].clone()).collect())
                .collect(),
        }
    }

    /// Shape per-group results: a series for a single selected column, a
    /// frame otherwise, with keys moved to columns when `as_index=False`.
    fn combine(&self, groups: &[Group], mut columns: Vec<Column>, single: bool) -> Exec<Value> {
        let index = self.result_index(groups);
        if !self.as_index {
            let mut all: Vec<Column> = self
                .keys
                .iter()
                .zip(&index.levels)
                .map(|(k, level)| Column {
                    name: k.clone(),
                    values: level.clone(),
                })
                .collect();
            all.extend(columns.into_iter().filter(|c| !self.keys.contains(&c.name)));
            return frame(Index::range(groups.len()), all);
        }
        if single && columns.len() == 1 {
            if let Some(col) = columns.pop() {
                return Ok(Value::Series(Series::with_index(Some(col.name), index, col.values)));
            }
        }
        frame(index, columns)
    }

    fn reduce_column(&self, groups: &[Group], col: &str, func: &str) -> Exec<Vec<Scalar>> {
        let values = &self
            .frame
            .column(col)
            .ok_or_else(|| Fault::key(super::value::repr_str(col)))?
            .values;
        groups
            .iter()
            .map(|g| {
                let cells: Vec<Scalar> = g.rows.iter().map(|&r| values[r].clone()).collect();
                stats::aggregate(func, &cells).map_err(|e| match e.class {
                    super::fault::FaultClass::AttributeError => {
                        Fault::attribute(self.type_name(), func)
                    }
                    _ => e,
                })
            })
            .collect()
    }

    /// `g.<func>()` for a named reduction.
    pub fn aggregate(&self, func: &str, numeric_only: bool) -> Exec<Value> {
        let groups = self.groups();
        if func == "size" {
            let sizes: Vec<Scalar> = groups.iter().map(|g| Scalar::Int(g.rows.len() as i64)).collect();
            if !self.as_index {
                return self.combine(
                    &groups,
                    vec![Column {
                        name: "size".into(),
                        values: sizes,
                    }],
                    false,
                );
            }
            let name = match &self.selection {
                Some(Selection::One(c)) => Some(c.clone()),
                _ => None,
            };
            return Ok(Value::Series(Series::with_index(
                name,
                self.result_index(&groups),
                sizes,
            )));
        }
        let mut columns = Vec::new();
        for col in self.value_columns() {
            if numeric_only && !self.frame.column(&col).map_or(false, |c| {
                crate::dataset::DType::infer(&c.values).is_numeric()
            }) {
                continue;
            }
            columns.push(Column {
                values: self.reduce_column(&groups, &col, func)?,
                name: col,
            });
        }
        self.combine(&groups, columns, matches!(self.selection, Some(Selection::One(_))))
    }

    /// `g.agg(...)`: a name, a list of names, a `{col: name(s)}` dict, a
    /// callable, or named `new=(col, name)` keyword pairs.
    pub fn agg(&self, spec: Option<Value>, named: IndexMap<String, Value>, inv: &mut dyn Invoker) -> Exec<Value> {
        let groups = self.groups();
        let single = matches!(self.selection, Some(Selection::One(_)));
        let mut as_series = false;
        let columns = match spec {
            Some(Value::Str(func)) => return self.aggregate(&func, false),
            Some(Value::List(funcs)) => {
                let funcs = func_names(&funcs)?;
                let mut out = Vec::new();
                let value_cols = self.value_columns();
                for col in &value_cols {
                    for f in &funcs {
                        let name = if single { f.clone() } else { format!("{col}_{f}") };
                        out.push(Column {
                            name,
                            values: self.reduce_column(&groups, col, f)?,
                        });
                    }
                }
                out
            }
            Some(Value::Dict(map)) => {
                let mut out = Vec::new();
                for (col, funcs) in map {
                    let col = match col {
                        Key::Str(c) => c,
                        other => other.to_value().to_str(),
                    };
                    match funcs {
                        Value::Str(f) => out.push(Column {
                            values: self.reduce_column(&groups, &col, &f)?,
                            name: col,
                        }),
                        Value::List(fs) => {
                            for f in func_names(&fs)? {
                                out.push(Column {
                                    name: format!("{col}_{f}"),
                                    values: self.reduce_column(&groups, &col, &f)?,
                                });
                            }
                        }
                        other => {
                            return Err(Fault::type_error(format!(
                                "aggregation for '{col}' must be a name, not '{}'",
                                other.type_name()
                            )))
                        }
                    }
                }
                out
            }
            Some(func) if func.is_callable() => {
                as_series = single;
                let mut out = Vec::new();
                for col in self.value_columns() {
                    let series = self
                        .frame
                        .series(&col)
                        .ok_or_else(|| Fault::key(super::value::repr_str(&col)))?;
                    let mut cells = Vec::with_capacity(groups.len());
                    for g in &groups {
                        inv.poll()?;
                        let part = Value::Series(series.take(&g.rows));
                        cells.push(inv.invoke(&func, vec![part])?.to_scalar()?);
                    }
                    out.push(Column { name: col, values: cells });
                }
                out
            }
            Some(other) => {
                return Err(Fault::type_error(format!(
                    "agg() argument must be a name, list, dict or function, not '{}'",
                    other.type_name()
                )))
            }
            None => {
                if named.is_empty() {
                    return Err(Fault::type_error("agg() missing required argument: 'func'"));
                }
                let mut out = Vec::new();
                for (new_name, pair) in named {
                    let (col, func) = match &pair {
                        Value::Tuple(parts) if parts.len() == 2 => match (&parts[0], &parts[1]) {
                            (Value::Str(c), Value::Str(f)) => (c.clone(), f.clone()),
                            _ => {
                                return Err(Fault::type_error(
                                    "named aggregation expects (column, function name)",
                                ))
                            }
                        },
                        Value::Str(f) => match &self.selection {
                            Some(Selection::One(c)) => (c.clone(), f.clone()),
                            _ => {
                                return Err(Fault::type_error(
                                    "named aggregation expects (column, function name)",
                                ))
                            }
                        },
                        _ => {
                            return Err(Fault::type_error(
                                "named aggregation expects (column, function name)",
                            ))
                        }
                    };
                    out.push(Column {
                        name: new_name,
                        values: self.reduce_column(&groups, &col, &func)?,
                    });
                }
                return self.combine(&groups, out, false);
            }
        };
        self.combine(&groups, columns, as_series)
    }

    /// `g.get_group(key)`.
    pub fn get_group(&self, key: &Value) -> Exec<Value> {
        let wanted: Vec<Scalar> = match key {
            Value::Tuple(parts) => parts.iter().map(Value::to_scalar).collect::<Exec<_>>()?,
            other => vec![other.to_scalar()?],
        };
        self.groups()
            .into_iter()
            .find(|g| g.key.len() == wanted.len() && g.key.iter().zip(&wanted).all(|(a, b)| a.loose_eq(b)))
            .map(|g| self.part(&g.rows))
            .ok_or_else(|| Fault::key(key.repr()))
    }

    /// `g.transform(func)`: one value per original row, aligned to the frame.
    pub fn transform(&self, func: &Value, inv: &mut dyn Invoker) -> Exec<Value> {
        let groups = self.groups();
        let n = self.frame.n_rows();
        let mut columns = Vec::new();
        for col in self.value_columns() {
            let series = self
                .frame
                .series(&col)
                .ok_or_else(|| Fault::key(super::value::repr_str(&col)))?;
            let mut cells = vec![Scalar::Float(f64::NAN); n];
            for g in &groups {
                inv.poll()?;
                let part = series.take(&g.rows);
                let out = match func {
                    Value::Str(name) => Value::from_scalar(&stats::aggregate(name, &part.values)?),
                    f => inv.invoke(f, vec![Value::Series(part)])?,
                };
                match out {
                    Value::Series(s) if s.len() == g.rows.len() => {
                        for (&r, v) in g.rows.iter().zip(s.values) {
                            cells[r] = v;
                        }
                    }
                    other => {
                        let v = other.to_scalar()?;
                        for &r in &g.rows {
                            cells[r] = v.clone();
                        }
                    }
                }
            }
            columns.push(Column { name: col, values: cells });
        }
        if let Some(Selection::One(_)) = self.selection {
            if let Some(c) = columns.into_iter().next() {
                return Ok(Value::Series(Series::with_index(
                    Some(c.name),
                    self.frame.index.clone(),
                    c.values,
                )));
            }
            return Ok(Value::None);
        }
        frame(self.frame.index.clone(), columns)
    }

    /// `g.apply(func)`: scalar results become a series keyed by group.
    pub fn apply(&self, func: &Value, inv: &mut dyn Invoker) -> Exec<Value> {
        let groups = self.groups();
        let mut cells = Vec::with_capacity(groups.len());
        for g in &groups {
            inv.poll()?;
            let out = inv.invoke(func, vec![self.part(&g.rows)])?;
            cells.push(out.to_scalar().map_err(|_| {
                Fault::type_error(format!(
                    "apply() functions must return a scalar, got '{}'",
                    out.type_name()
                ))
            })?);
        }
        let name = match &self.selection {
            Some(Selection::One(c)) => Some(c.clone()),
            _ => None,
        };
        Ok(Value::Series(Series::with_index(
            name,
            self.result_index(&groups),
            cells,
        )))
    }

    /// Per-row running results (`cumsum`, `cumcount`) and per-group row
    /// slices (`head`, `tail`).
    fn per_row(&self, name: &str, n: i64) -> Exec<Value> {
        let groups = self.groups();
        match name {
            "cumcount" => {
                let mut cells = vec![Scalar::Null; self.frame.n_rows()];
                for g in &groups {
                    for (i, &r) in g.rows.iter().enumerate() {
                        cells[r] = Scalar::Int(i as i64);
                    }
                }
                let mut rows: Vec<usize> = groups.iter().flat_map(|g| g.rows.iter().copied()).collect();
                rows.sort_unstable();
                let s = Series::with_index(None, self.frame.index.clone(), cells);
                Ok(Value::Series(s.take(&rows)))
            }
            "cumsum" => {
                let mut columns = Vec::new();
                for col in self.value_columns() {
                    let values = &self
                        .frame
                        .column(&col)
                        .ok_or_else(|| Fault::key(super::value::repr_str(&col)))?
                        .values;
                    let mut cells = vec![Scalar::Float(f64::NAN); values.len()];
                    for g in &groups {
                        let mut acc: Option<Scalar> = None;
                        for &r in &g.rows {
                            if values[r].is_missing() {
                                continue;
                            }
                            let next = match acc.take() {
                                None => values[r].clone(),
                                Some(prev) => stats::sum(&[prev, values[r].clone()])?,
                            };
                            cells[r] = next.clone();
                            acc = Some(next);
                        }
                    }
                    columns.push(Column { name: col, values: cells });
                }
                let whole = frame(self.frame.index.clone(), columns)?;
                match (&self.selection, whole) {
                    (Some(Selection::One(c)), Value::Frame(df)) => {
                        Ok(df.series(c).map_or(Value::None, Value::Series))
                    }
                    (_, v) => Ok(v),
                }
            }
            _ => {
                let mut rows: Vec<usize> = groups
                    .iter()
                    .flat_map(|g| super::series_ops::head_tail(g.rows.len(), n, name == "head")
                        .into_iter()
                        .map(move |i| g.rows[i]))
                    .collect();
                rows.sort_unstable();
                let sub = self.frame.take_rows(&rows);
                Ok(match &self.selection {
                    Some(Selection::One(c)) => sub.series(c).map_or(Value::None, Value::Series),
                    Some(Selection::Many(cs)) => Value::Frame(project(&sub, cs)),
                    None => Value::Frame(sub),
                })
            }
        }
    }
}

fn key_name(v: &Value) -> Exec<String> {
    match v {
        Value::Str(k) => Ok(k.clone()),
        Value::Series(s) => s
            .name
            .clone()
            .ok_or_else(|| Fault::value("cannot group by an unnamed Series")),
        other => Err(Fault::type_error(format!(
            "groupby() keys must be column names, not '{}'",
            other.type_name()
        ))),
    }
}

fn func_names(funcs: &[Value]) -> Exec<Vec<String>> {
    funcs
        .iter()
        .map(|f| {
            f.as_str()
                .map(str::to_string)
                .ok_or_else(|| Fault::type_error("agg() expects function names"))
        })
        .collect()
}

fn project(df: &DataFrame, cols: &[String]) -> DataFrame {
    DataFrame {
        index: df.index.clone(),
        columns: cols
            .iter()
            .filter_map(|c| df.column(c).cloned())
            .collect(),
    }
}

fn frame(index: Index, columns: Vec<Column>) -> Exec<Value> {
    DataFrame::with_index(index, columns)
        .map(Value::Frame)
        .map_err(|e| Fault::value(e.to_string()))
}

/// `g[col]` / `g[[cols]]`.
pub fn select(g: &GroupBy, key: &Value) -> Exec<Value> {
    let selection = match key {
        Value::Str(c) => Selection::One(c.clone()),
        Value::List(items) => Selection::Many(
            items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| Fault::key(v.repr()))
                })
                .collect::<Exec<Vec<_>>>()?,
        ),
        other => return Err(Fault::key(other.repr())),
    };
    let names = match &selection {
        Selection::One(c) => std::slice::from_ref(c),
        Selection::Many(cs) => cs.as_slice(),
    };
    for c in names {
        if g.frame.column(c).is_none() {
            return Err(Fault::key(format!("Column not found: {c}")));
        }
    }
    Ok(Value::GroupBy(Box::new(GroupBy {
        selection: Some(selection),
        ..g.clone()
    })))
}

/// Property access on a group-by.
pub fn attribute(g: &GroupBy, name: &str) -> Exec<Option<Value>> {
    match name {
        "ngroups" => Ok(Some(Value::Int(g.n_groups()? as i64))),
        col if g.frame.column(col).is_some() && g.selection.is_none() => {
            select(g, &Value::Str(col.to_string())).map(Some)
        }
        _ => Ok(None),
    }
}

/// `g.name(args)`.
pub fn call_method(g: &GroupBy, name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Value> {
    let out = match name {
        "sum" | "mean" | "count" | "min" | "max" | "median" | "size" | "nunique" | "first"
        | "last" | "prod" => {
            let numeric_only = args.flag_kw("numeric_only", false)?;
            args.take_kw("min_count");
            args.take_kw("skipna");
            g.aggregate(name, numeric_only)?
        }
        "std" | "var" => {
            let ddof = args.int(0, "ddof", 1, name)?;
            let numeric_only = args.flag_kw("numeric_only", false)?;
            if ddof == 1 {
                g.aggregate(name, numeric_only)?
            } else {
                return Err(Fault::value(format!("{name}() supports ddof=1 only")));
            }
        }
        "agg" | "aggregate" => {
            let spec = args.take(0, "func");
            let named = args.take_all_kw();
            g.agg(spec, named, inv)?
        }
        "get_group" => {
            let key = args.required(0, "name", name)?;
            g.get_group(&key)?
        }
        "transform" => {
            let func = args.required(0, "func", name)?;
            g.transform(&func, inv)?
        }
        "apply" => {
            let func = args.required(0, "func", name)?;
            g.apply(&func, inv)?
        }
        "cumsum" | "cumcount" => g.per_row(name, 0)?,
        "head" | "tail" => {
            let n = args.int(0, "n", 5, name)?;
            g.per_row(name, n)?
        }
        other => return Err(Fault::attribute(g.type_name(), other)),
    };
    args.finish(name)?;
    Ok(out)
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

    fn sales() -> DataFrame {
        DataFrame::from_columns(vec![
            ("region", vec!["West".into(), "East".into(), "West".into(), Scalar::Null]),
            ("product", vec!["A".into(), "A".into(), "B".into(), "B".into()]),
            (
                "revenue",
                vec![Scalar::Int(10), Scalar::Int(20), Scalar::Int(30), Scalar::Int(40)],
            ),
        ])
        .unwrap()
    }

    fn by(col: &str) -> GroupBy {
        GroupBy::new(sales(), Args::positional(vec![Value::Str(col.into())])).unwrap()
    }

    #[test]
    fn test_groups_sorted_and_missing_keys_dropped() {
        let g = by("region");
        assert_eq!(g.n_groups().unwrap(), 2);
        let Value::Frame(df) = g.aggregate("sum", true).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(df.index.levels[0], vec![Scalar::from("East"), Scalar::from("West")]);
        assert_eq!(df.column("revenue").unwrap().values, vec![Scalar::Int(20), Scalar::Int(40)]);
        assert!(df.column("product").is_none());
    }

    #[test]
    fn test_selected_column_gives_series() {
        let g = by("region");
        let Value::GroupBy(sel) = select(&g, &Value::Str("revenue".into())).unwrap() else {
            panic!("expected group-by");
        };
        assert_eq!(sel.type_name(), "SeriesGroupBy");
        match sel.aggregate("mean", false).unwrap() {
            Value::Series(s) => {
                assert_eq!(s.name.as_deref(), Some("revenue"));
                assert_eq!(s.values, vec![Scalar::Float(20.0), Scalar::Float(20.0)]);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_mean_over_text_column_is_type_error() {
        let err = by("region").aggregate("mean", false).unwrap_err();
        assert_eq!(err.class, super::super::fault::FaultClass::TypeError);
    }

    #[test]
    fn test_agg_dict_and_as_index_false() {
        let mut kw = IndexMap::new();
        kw.insert("as_index".to_string(), Value::Bool(false));
        let g = GroupBy::new(sales(), Args::new(vec![Value::Str("product".into())], kw)).unwrap();
        let mut spec = IndexMap::new();
        spec.insert(Key::Str("revenue".into()), Value::Str("max".into()));
        let Value::Frame(df) = g.agg(Some(Value::Dict(spec)), IndexMap::new(), &mut NoCalls).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(df.column_names(), vec!["product", "revenue"]);
        assert_eq!(df.column("revenue").unwrap().values, vec![Scalar::Int(20), Scalar::Int(40)]);
    }

    #[test]
    fn test_multi_key_index() {
        let g = GroupBy::new(
            sales(),
            Args::positional(vec![Value::List(vec![
                Value::Str("product".into()),
                Value::Str("region".into()),
            ])]),
        )
        .unwrap();
        let Value::Series(sizes) = g.aggregate("size", false).unwrap() else {
            panic!("expected series");
        };
        assert_eq!(sizes.index.nlevels(), 2);
        assert_eq!(sizes.len(), 3);
    }

    #[test]
    fn test_unknown_key_is_key_error() {
        let err = GroupBy::new(sales(), Args::positional(vec![Value::Str("nope".into())])).unwrap_err();
        assert_eq!(err.message, "'nope'");
    }

    #[test]
    fn test_get_group() {
        let Value::Frame(df) = by("region").get_group(&Value::Str("West".into())).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(df.n_rows(), 2);
    }
}
