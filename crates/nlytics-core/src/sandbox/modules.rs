//! The `pandas` and `numpy` module handles.

use std::f64::consts;

use crate::dataset::{Index, Scalar, Series};

use super::args::{Args, Invoker};
use super::builtins;
use super::fault::{Exec, Fault, FaultClass};
use super::frame_ops;
use super::series_ops;
use super::stats;
use super::value::{ModuleKind, Value};

const PANDAS_FUNCS: &[&str] = &[
    "DataFrame", "Series", "concat", "to_numeric", "isna", "isnull", "notna", "notnull", "unique",
];

const NUMPY_FUNCS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "std", "var", "prod", "sqrt", "log", "log10", "log2",
    "exp", "abs", "round", "floor", "ceil", "where", "array", "isnan", "percentile", "unique",
    "arange", "cumsum", "maximum", "minimum", "count_nonzero",
];

/// File and network I/O entry points; reachable as attributes, fatal when called.
const IO_FUNCS: &[&str] = &[
    "read_csv", "read_json", "read_excel", "read_parquet", "read_sql", "read_table",
    "read_pickle", "read_html", "read_clipboard", "read_feather", "read_hdf", "to_pickle",
    "load", "save", "savetxt", "loadtxt", "fromfile", "genfromtxt",
];

fn find(list: &'static [&'static str], name: &str) -> Option<&'static str> {
    list.iter().copied().find(|n| *n == name)
}

/// `module.name`.
pub fn attribute(kind: ModuleKind, name: &str) -> Exec<Value> {
    if let Some(io) = find(IO_FUNCS, name) {
        return Ok(Value::Stub(io));
    }
    let funcs = match kind {
        ModuleKind::Pandas => PANDAS_FUNCS,
        ModuleKind::Numpy => match name {
            "nan" | "NaN" => return Ok(Value::Float(f64::NAN)),
            "inf" | "Inf" => return Ok(Value::Float(f64::INFINITY)),
            "pi" => return Ok(Value::Float(consts::PI)),
            "e" => return Ok(Value::Float(consts::E)),
            _ => NUMPY_FUNCS,
        },
    };
    match (kind, name) {
        (ModuleKind::Pandas, "NA") => return Ok(Value::None),
        (ModuleKind::Numpy, "float64" | "int64" | "float32" | "int32") => {
            return Ok(Value::Type(if name.starts_with("float") { "float" } else { "int" }))
        }
        _ => {}
    }
    find(funcs, name)
        .map(|f| Value::ModuleFn(kind, f))
        .ok_or_else(|| {
            Fault::new(
                FaultClass::AttributeError,
                format!("module '{}' has no attribute '{name}'", kind.name()),
            )
        })
}

/// `module.name(args)`.
pub fn call(kind: ModuleKind, name: &str, args: Args, inv: &mut dyn Invoker) -> Exec<Value> {
    match kind {
        ModuleKind::Pandas => pandas(name, args, inv),
        ModuleKind::Numpy => numpy(name, args, inv),
    }
}

fn pandas(name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Value> {
    let limit = inv.limit();
    let out = match name {
        "DataFrame" => {
            let data = args.take(0, "data");
            let index = args.optional(1, "index");
            let columns = match args.optional(2, "columns") {
                Some(v) => Some(
                    v.collect_values(limit)?
                        .into_iter()
                        .map(|c| c.to_str())
                        .collect(),
                ),
                None => None,
            };
            args.take_kw("dtype");
            args.take_kw("copy");
            Value::Frame(frame_ops::construct(data, columns, index, limit)?)
        }
        "Series" => {
            let data = args.take(0, "data");
            let index = args.optional(1, "index");
            args.take_kw("dtype");
            let series_name = args.optional(3, "name").map(|v| v.to_str());
            Value::Series(build_series(data, index, series_name, limit)?)
        }
        "concat" => {
            let objs = args.required(0, "objs", name)?.collect_values(limit)?;
            let axis = match args.take(1, "axis") {
                None => 0,
                Some(Value::Str(s)) if s == "columns" => 1,
                Some(Value::Str(_)) => 0,
                Some(v) => v.as_int().unwrap_or(0),
            };
            let ignore_index = args.flag_kw("ignore_index", false)?;
            args.take_kw("sort");
            frame_ops::concat(objs, axis, ignore_index)?
        }
        "to_numeric" => {
            let arg = args.required(0, "arg", name)?;
            let errors = args.string(1, "errors", name)?.unwrap_or_else(|| "raise".into());
            args.take_kw("downcast");
            let coerce = errors == "coerce";
            match arg {
                Value::Series(s) => {
                    let cells = s
                        .values
                        .iter()
                        .map(|v| to_numeric(v, coerce))
                        .collect::<Exec<Vec<_>>>()?;
                    Value::Series(s.map_values(cells))
                }
                Value::List(items) | Value::Tuple(items) => Value::Series(Series::new(
                    None,
                    items
                        .iter()
                        .map(|v| to_numeric(&v.to_scalar()?, coerce))
                        .collect::<Exec<Vec<_>>>()?,
                )),
                other => Value::from_scalar(&to_numeric(&other.to_scalar()?, coerce)?),
            }
        }
        "isna" | "isnull" | "notna" | "notnull" => {
            let obj = args.required(0, "obj", name)?;
            let want_missing = name.starts_with("is");
            match obj {
                Value::Series(s) => {
                    series_ops::call_method(s, name, Args::default(), inv)?.value
                }
                Value::Frame(df) => {
                    frame_ops::call_method(df, name, Args::default(), inv)?.value
                }
                other => Value::Bool(other.to_scalar()?.is_missing() == want_missing),
            }
        }
        "unique" => {
            let values = series_ops::cells_of(args.required(0, "values", name)?, limit)?;
            Value::Series(Series::new(None, stats::unique(&values, true)))
        }
        other => return Err(builtins::disallowed(other)),
    };
    args.finish(name)?;
    Ok(out)
}

fn build_series(data: Option<Value>, index: Option<Value>, name: Option<String>, limit: usize) -> Exec<Series> {
    let mut s = match data {
        None | Some(Value::None) => Series::new(None, Vec::new()),
        Some(Value::Series(s)) => s,
        Some(Value::Dict(map)) => {
            let (labels, cells): (Vec<Scalar>, Vec<Scalar>) = map
                .into_iter()
                .map(|(k, v)| Ok((k.to_value().to_scalar()?, v.to_scalar()?)))
                .collect::<Exec<Vec<_>>>()?
                .into_iter()
                .unzip();
            Series::with_index(None, Index::from_labels(None, labels), cells)
        }
        Some(v) if v.is_scalar() => {
            let n = match &index {
                Some(idx) => idx.clone().collect_values(limit)?.len(),
                None => 1,
            };
            Series::new(None, vec![v.to_scalar()?; n])
        }
        Some(v) => Series::new(None, series_ops::cells_of(v, limit)?),
    };
    if let Some(index) = index {
        let labels = series_ops::cells_of(index, limit)?;
        if labels.len() != s.len() {
            return Err(Fault::value(format!(
                "Length of values ({}) does not match length of index ({})",
                s.len(),
                labels.len()
            )));
        }
        s.index = Index::from_labels(None, labels);
    }
    if name.is_some() {
        s.name = name;
    }
    Ok(s)
}

fn to_numeric(v: &Scalar, coerce: bool) -> Exec<Scalar> {
    match v {
        Scalar::Text(t) => {
            let trimmed = t.trim();
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Scalar::Int(i));
            }
            if let Ok(f) = trimmed.parse::<f64>() {
                return Ok(Scalar::Float(f));
            }
            if coerce {
                Ok(Scalar::Float(f64::NAN))
            } else {
                Err(Fault::value(format!("Unable to parse string \"{t}\"")))
            }
        }
        Scalar::Bool(b) => Ok(Scalar::Int(i64::from(*b))),
        Scalar::Null => Ok(Scalar::Float(f64::NAN)),
        other => Ok(other.clone()),
    }
}

/// Cells of an array-like numpy argument.
fn array_cells(v: Value, limit: usize) -> Exec<Vec<Scalar>> {
    match v {
        Value::Frame(df) => Ok(df.columns.into_iter().flat_map(|c| c.values).collect()),
        v if v.is_scalar() => Ok(vec![v.to_scalar()?]),
        other => series_ops::cells_of(other, limit),
    }
}

/// Apply `f` element-wise, keeping the container shape.
fn elementwise(v: Value, f: impl Fn(f64) -> f64, limit: usize) -> Exec<Value> {
    let cell = |s: &Scalar| -> Exec<Scalar> {
        if s.is_missing() {
            return Ok(Scalar::Float(f64::NAN));
        }
        s.as_f64().map(|x| Scalar::Float(f(x))).ok_or_else(|| {
            Fault::type_error(format!(
                "ufunc not supported for the input type '{}'",
                Value::from_scalar(s).type_name()
            ))
        })
    };
    match v {
        Value::Series(s) => {
            let cells = s.values.iter().map(&cell).collect::<Exec<Vec<_>>>()?;
            Ok(Value::Series(s.map_values(cells)))
        }
        Value::Frame(mut df) => {
            for col in &mut df.columns {
                col.values = col.values.iter().map(&cell).collect::<Exec<Vec<_>>>()?;
            }
            Ok(Value::Frame(df))
        }
        v if v.is_scalar() => Ok(Value::from_scalar(&cell(&v.to_scalar()?)?)),
        other => {
            let cells = series_ops::cells_of(other, limit)?;
            Ok(Value::Series(Series::new(
                None,
                cells.iter().map(&cell).collect::<Exec<Vec<_>>>()?,
            )))
        }
    }
}

fn numpy(name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Value> {
    let limit = inv.limit();
    let out = match name {
        "sum" | "mean" | "median" | "min" | "max" | "prod" | "std" | "var" => {
            let a = args.required(0, "a", name)?;
            args.take_kw("axis");
            let ddof = args.int(usize::MAX, "ddof", 0, name)?.max(0) as usize;
            let cells = array_cells(a, limit)?;
            if matches!(name, "min" | "max") && cells.is_empty() {
                return Err(Fault::value(format!(
                    "zero-size array to reduction operation {}imum which has no identity",
                    name
                )));
            }
            let v = match name {
                "std" => stats::std(&cells, ddof)?,
                "var" => stats::var(&cells, ddof)?,
                other => stats::aggregate(other, &cells)?,
            };
            Value::from_scalar(&v)
        }
        "cumsum" => {
            let a = args.required(0, "a", name)?;
            let s = match a {
                Value::Series(s) => s,
                other => Series::new(None, array_cells(other, limit)?),
            };
            series_ops::call_method(s, "cumsum", Args::default(), inv)?.value
        }
        "count_nonzero" => {
            let cells = array_cells(args.required(0, "a", name)?, limit)?;
            Value::Int(cells.iter().filter(|v| super::ops::mask_bool(v)).count() as i64)
        }
        "sqrt" => elementwise(args.required(0, "x", name)?, f64::sqrt, limit)?,
        "log" => elementwise(args.required(0, "x", name)?, f64::ln, limit)?,
        "log10" => elementwise(args.required(0, "x", name)?, f64::log10, limit)?,
        "log2" => elementwise(args.required(0, "x", name)?, f64::log2, limit)?,
        "exp" => elementwise(args.required(0, "x", name)?, f64::exp, limit)?,
        "floor" => elementwise(args.required(0, "x", name)?, f64::floor, limit)?,
        "ceil" => elementwise(args.required(0, "x", name)?, f64::ceil, limit)?,
        "abs" => builtins::call("abs", Args::positional(vec![args.required(0, "x", name)?]), inv)?,
        "round" => {
            let a = args.required(0, "a", name)?;
            let decimals = args.int(1, "decimals", 0, name)?;
            match a {
                Value::Int(i) => Value::Int(i),
                Value::Float(f) => Value::Float(builtins::round_f64(f, decimals)),
                other => builtins::call(
                    "round",
                    Args::positional(vec![other, Value::Int(decimals)]),
                    inv,
                )?,
            }
        }
        "isnan" => {
            let x = args.required(0, "x", name)?;
            match x {
                Value::Series(s) => Value::Series(s.map_values(
                    s.values.iter().map(|v| Scalar::Bool(v.is_missing())).collect(),
                )),
                v if v.is_scalar() => Value::Bool(v.to_scalar()?.is_missing()),
                other => Value::Series(Series::new(
                    None,
                    array_cells(other, limit)?
                        .iter()
                        .map(|v| Scalar::Bool(v.is_missing()))
                        .collect(),
                )),
            }
        }
        "where" => {
            let cond = args.required(0, "condition", name)?;
            let x = args.required(1, "x", name)?;
            let y = args.required(2, "y", name)?;
            np_where(cond, x, y, limit)?
        }
        "maximum" | "minimum" => {
            let a = args.required(0, "x1", name)?;
            let b = args.required(1, "x2", name)?;
            let pick_max = name == "maximum";
            np_where_pair(a, b, pick_max, limit)?
        }
        "array" => {
            let obj = args.required(0, "object", name)?;
            args.take_kw("dtype");
            match obj {
                Value::Series(s) => Value::Series(Series::new(None, s.values)),
                other => Value::Series(Series::new(None, array_cells(other, limit)?)),
            }
        }
        "percentile" => {
            let cells = array_cells(args.required(0, "a", name)?, limit)?;
            let q = args.required(1, "q", name)?;
            match q {
                Value::List(qs) => Value::List(
                    qs.iter()
                        .map(|q| {
                            let p = q.as_f64().ok_or_else(|| Fault::type_error("percentiles must be numbers"))?;
                            Ok(Value::from_scalar(&percentile(&cells, p)?))
                        })
                        .collect::<Exec<Vec<_>>>()?,
                ),
                q => {
                    let p = q
                        .as_f64()
                        .ok_or_else(|| Fault::type_error("percentiles must be numbers"))?;
                    Value::from_scalar(&percentile(&cells, p)?)
                }
            }
        }
        "unique" => {
            let mut cells = stats::unique(&array_cells(args.required(0, "ar", name)?, limit)?, true);
            cells.sort_by(Scalar::sort_cmp);
            Value::Series(Series::new(None, cells))
        }
        "arange" => {
            let a = args.required(0, "start", name)?;
            let stop = args.optional(1, "stop");
            let step = args.optional(2, "step").unwrap_or(Value::Int(1));
            let (start, stop) = match stop {
                Some(stop) => (a, stop),
                None => (Value::Int(0), a),
            };
            arange(start, stop, step, limit)?
        }
        other => return Err(builtins::disallowed(other)),
    };
    args.finish(name)?;
    Ok(out)
}

fn percentile(cells: &[Scalar], p: f64) -> Exec<Scalar> {
    if !(0.0..=100.0).contains(&p) {
        return Err(Fault::value("Percentiles must be in the range [0, 100]"));
    }
    stats::quantile(cells, p / 100.0)
}

fn arange(start: Value, stop: Value, step: Value, limit: usize) -> Exec<Value> {
    match (start.as_int(), stop.as_int(), step.as_int()) {
        (Some(a), Some(b), Some(s)) => {
            if s == 0 {
                return Err(Fault::zero_division("division by zero"));
            }
            let n = if (s > 0 && b > a) || (s < 0 && b < a) {
                ((b - a).unsigned_abs() + s.unsigned_abs() - 1) / s.unsigned_abs()
            } else {
                0
            };
            if n as usize > limit {
                return Err(Fault::too_large(limit));
            }
            Ok(Value::Series(Series::new(
                None,
                (0..n as i64).map(|i| Scalar::Int(a + i * s)).collect(),
            )))
        }
        _ => {
            let (a, b, s) = match (start.as_f64(), stop.as_f64(), step.as_f64()) {
                (Some(a), Some(b), Some(s)) => (a, b, s),
                _ => return Err(Fault::type_error("arange() arguments must be numbers")),
            };
            if s == 0.0 {
                return Err(Fault::zero_division("division by zero"));
            }
            let n = ((b - a) / s).ceil().max(0.0);
            if n > limit as f64 {
                return Err(Fault::too_large(limit));
            }
            Ok(Value::Series(Series::new(
                None,
                (0..n as usize).map(|i| Scalar::Float(a + i as f64 * s)).collect(),
            )))
        }
    }
}

fn broadcast_arg(v: Value, n: usize, limit: usize) -> Exec<Vec<Scalar>> {
    match v {
        v if v.is_scalar() => Ok(vec![v.to_scalar()?; n]),
        other => {
            let cells = array_cells(other, limit)?;
            if cells.len() != n {
                return Err(Fault::value(format!(
                    "operands could not be broadcast together with shapes ({n},) ({},)",
                    cells.len()
                )));
            }
            Ok(cells)
        }
    }
}

fn np_where(cond: Value, x: Value, y: Value, limit: usize) -> Exec<Value> {
    if cond.is_scalar() {
        return Ok(if cond.truthy()? { x } else { y });
    }
    let (index, mask) = match cond {
        Value::Series(s) => (s.index.clone(), s.values),
        other => {
            let cells = array_cells(other, limit)?;
            (Index::range(cells.len()), cells)
        }
    };
    let n = mask.len();
    let xs = broadcast_arg(x, n, limit)?;
    let ys = broadcast_arg(y, n, limit)?;
    let cells = mask
        .iter()
        .zip(xs.into_iter().zip(ys))
        .map(|(m, (a, b))| if super::ops::mask_bool(m) { a } else { b })
        .collect();
    Ok(Value::Series(Series::with_index(None, index, cells)))
}

fn np_where_pair(a: Value, b: Value, pick_max: bool, limit: usize) -> Exec<Value> {
    if a.is_scalar() && b.is_scalar() {
        let (x, y) = (a.to_scalar()?, b.to_scalar()?);
        if x.is_missing() || y.is_missing() {
            return Ok(Value::Float(f64::NAN));
        }
        let take_x = (x.sort_cmp(&y) == std::cmp::Ordering::Greater) == pick_max;
        return Ok(Value::from_scalar(if take_x { &x } else { &y }));
    }
    let (index, n) = match (&a, &b) {
        (Value::Series(s), _) | (_, Value::Series(s)) => (s.index.clone(), s.len()),
        _ => {
            let n = array_cells(a.clone(), limit)?.len();
            (Index::range(n), n)
        }
    };
    let xs = broadcast_arg(a, n, limit)?;
    let ys = broadcast_arg(b, n, limit)?;
    let cells = xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| {
            if x.is_missing() || y.is_missing() {
                Scalar::Float(f64::NAN)
            } else if (x.sort_cmp(&y) == std::cmp::Ordering::Greater) == pick_max {
                x
            } else {
                y
            }
        })
        .collect();
    Ok(Value::Series(Series::with_index(None, index, cells)))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Calls;

    impl Invoker for Calls {
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

    fn ints(xs: &[i64]) -> Value {
        Value::List(xs.iter().map(|&x| Value::Int(x)).collect())
    }

    #[test]
    fn test_read_functions_are_stubs() {
        assert_eq!(attribute(ModuleKind::Pandas, "read_csv").unwrap(), Value::Stub("read_csv"));
        let err = attribute(ModuleKind::Pandas, "eval").unwrap_err();
        assert_eq!(err.class, FaultClass::AttributeError);
    }

    #[test]
    fn test_numpy_std_uses_population_ddof() {
        let v = call(ModuleKind::Numpy, "std", Args::positional(vec![ints(&[1, 3])]), &mut Calls).unwrap();
        assert_eq!(v, Value::Float(1.0));
    }

    #[test]
    fn test_np_where_over_mask() {
        let mask = Value::Series(Series::new(None, vec![Scalar::Bool(true), Scalar::Bool(false)]));
        let v = np_where(mask, Value::Str("hi".into()), Value::Str("lo".into()), 10).unwrap();
        let Value::Series(s) = v else { panic!("expected series") };
        assert_eq!(s.values, vec![Scalar::from("hi"), Scalar::from("lo")]);
    }

    #[test]
    fn test_to_numeric_coerce() {
        let mut kw = indexmap::IndexMap::new();
        kw.insert("errors".to_string(), Value::Str("coerce".into()));
        let data = Value::List(vec![Value::Str("1.5".into()), Value::Str("x".into())]);
        let Value::Series(s) = call(ModuleKind::Pandas, "to_numeric", Args::new(vec![data], kw), &mut Calls).unwrap() else {
            panic!("expected series")
        };
        assert_eq!(s.values[0], Scalar::Float(1.5));
        assert!(s.values[1].is_missing());
    }

    #[test]
    fn test_series_from_dict() {
        use super::super::value::Key;

        let mut map = indexmap::IndexMap::new();
        map.insert(Key::Str("a".into()), Value::Int(1));
        let s = build_series(Some(Value::Dict(map)), None, Some("n".into()), 10).unwrap();
        assert_eq!(s.get(&Scalar::from("a")), Some(&Scalar::Int(1)));
        assert_eq!(s.name.as_deref(), Some("n"));
    }

    #[test]
    fn test_arange_respects_limit() {
        assert!(arange(Value::Int(0), Value::Int(5_000), Value::Int(1), 100).is_err());
        let Value::Series(s) = arange(Value::Int(0), Value::Int(5), Value::Int(2), 100).unwrap() else {
            panic!("expected series")
        };
        assert_eq!(s.values, vec![Scalar::Int(0), Scalar::Int(2), Scalar::Int(4)]);
    }
}
