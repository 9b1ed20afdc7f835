//! The builtin whitelist and the disallowed-primitive stubs.

use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};

use crate::dataset::Scalar;
use crate::script::ast::BinOp;

use super::args::{Args, Invoker};
use super::collections;
use super::fault::{Exec, Fault};
use super::format;
use super::ops;
use super::stats;
use super::value::{Key, ModuleKind, RangeValue, Value};

/// Callable builtins.
pub const BUILTINS: &[&str] = &[
    "abs", "all", "any", "enumerate", "filter", "len", "map", "max", "min", "pow", "print",
    "range", "round", "sorted", "sum", "zip", "isinstance", "format", "repr", "reversed",
    "divmod",
];

/// Builtin types; callable as conversions and usable with `isinstance`.
pub const TYPES: &[&str] = &[
    "bool", "dict", "float", "int", "list", "set", "str", "tuple", "type",
];

/// Primitives that are bound but refuse to run.
pub const STUBS: &[&str] = &[
    "eval", "exec", "compile", "open", "__import__", "getattr", "setattr", "delattr",
    "hasattr", "globals", "locals", "vars", "dir", "input", "breakpoint", "exit", "quit",
    "help", "memoryview", "object", "super", "classmethod", "staticmethod", "property",
];

/// Initial binding for a builtin name, if any.
pub fn lookup(name: &str) -> Option<Value> {
    if let Some(n) = TYPES.iter().find(|n| **n == name) {
        return Some(Value::Type(*n));
    }
    if let Some(n) = BUILTINS.iter().find(|n| **n == name) {
        return Some(Value::Builtin(*n));
    }
    if let Some(n) = STUBS.iter().find(|n| **n == name) {
        return Some(Value::Stub(*n));
    }
    match name {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Every name bound at program start besides the dataset and modules.
pub fn initial_names() -> impl Iterator<Item = &'static str> {
    TYPES
        .iter()
        .chain(BUILTINS)
        .chain(STUBS)
        .copied()
        .chain(["true", "false"])
}

pub fn disallowed(name: &str) -> Fault {
    Fault::disallowed(format!("'{name}' is not available in the sandbox"))
}

/// Call a builtin function or type conversion.
pub fn call(name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Value> {
    let limit = inv.limit();
    let v = match name {
        "abs" => abs(args.required(0, "x", name)?)?,
        "all" | "any" => {
            let items = iterable(args.required(0, "iterable", name)?, limit)?;
            let mut acc = name == "all";
            for item in items {
                let t = item.truthy()?;
                if name == "all" && !t {
                    acc = false;
                    break;
                }
                if name == "any" && t {
                    acc = true;
                    break;
                }
            }
            Value::Bool(acc)
        }
        "enumerate" => {
            let items = iterable(args.required(0, "iterable", name)?, limit)?;
            let start = args.int(1, "start", 0, name)?;
            Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::Tuple(vec![Value::Int(start + i as i64), v]))
                    .collect(),
            )
        }
        "filter" => {
            let func = args.required(0, "function", name)?;
            let items = iterable(args.required(1, "iterable", name)?, limit)?;
            let mut out = Vec::new();
            for item in items {
                inv.poll()?;
                let keep = match &func {
                    Value::None => item.truthy()?,
                    f => inv.invoke(f, vec![item.clone()])?.truthy()?,
                };
                if keep {
                    out.push(item);
                }
            }
            Value::List(out)
        }
        "map" => {
            let func = args.required(0, "function", name)?;
            let columns = args
                .rest(1)
                .into_iter()
                .map(|v| iterable(v, limit))
                .collect::<Exec<Vec<_>>>()?;
            if columns.is_empty() {
                return Err(Fault::type_error("map() must have at least two arguments."));
            }
            let n = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(n);
            for i in 0..n {
                inv.poll()?;
                let call_args = columns.iter().map(|c| c[i].clone()).collect();
                out.push(inv.invoke(&func, call_args)?);
            }
            Value::List(out)
        }
        "len" => Value::Int(len(&args.required(0, "obj", name)?)? as i64),
        "max" | "min" => return extreme(name, args, inv),
        "pow" => {
            let base = args.required(0, "base", name)?;
            let exp = args.required(1, "exp", name)?;
            args.finish(name)?;
            return ops::binary(BinOp::Pow, base, exp, limit);
        }
        "divmod" => {
            let a = args.required(0, "a", name)?;
            let b = args.required(1, "b", name)?;
            args.finish(name)?;
            let q = ops::binary(BinOp::FloorDiv, a.clone(), b.clone(), limit)?;
            let r = ops::binary(BinOp::Mod, a, b, limit)?;
            return Ok(Value::Tuple(vec![q, r]));
        }
        "print" => {
            if args.take_kw("file").is_some() {
                return Err(Fault::disallowed("print(file=...) is not supported"));
            }
            let sep = args.take_kw("sep").map_or(" ".to_string(), |v| v.to_str());
            let end = args.take_kw("end").map_or("\n".to_string(), |v| v.to_str());
            args.take_kw("flush");
            let parts: Vec<String> = args.rest(0).iter().map(Value::to_str).collect();
            inv.write_stdout(&format!("{}{end}", parts.join(&sep)));
            Value::None
        }
        "range" => range(&mut args)?,
        "round" => {
            let x = args.required(0, "number", name)?;
            let digits = args.optional(1, "ndigits");
            round(x, digits)?
        }
        "sorted" => {
            let items = iterable(args.required(0, "iterable", name)?, limit)?;
            let key = args.take_kw("key").filter(|k| !matches!(k, Value::None));
            let reverse = args.flag_kw("reverse", false)?;
            args.finish(name)?;
            return collections::sort_values(items, key.as_ref(), reverse, inv).map(Value::List);
        }
        "reversed" => {
            let mut items = iterable(args.required(0, "sequence", name)?, limit)?;
            items.reverse();
            Value::List(items)
        }
        "sum" => {
            let source = args.required(0, "iterable", name)?;
            let start = args.take(1, "start").unwrap_or(Value::Int(0));
            args.finish(name)?;
            if let Value::Series(s) = &source {
                let total = Value::from_scalar(&stats::sum(&s.values)?);
                return ops::binary(BinOp::Add, start, total, limit);
            }
            return ops::sum_values(iterable(source, limit)?, start, limit);
        }
        "zip" => {
            let columns = args
                .rest(0)
                .into_iter()
                .map(|v| iterable(v, limit))
                .collect::<Exec<Vec<_>>>()?;
            let n = columns.iter().map(Vec::len).min().unwrap_or(0);
            Value::List(
                (0..n)
                    .map(|i| Value::Tuple(columns.iter().map(|c| c[i].clone()).collect()))
                    .collect(),
            )
        }
        "isinstance" => {
            let obj = args.required(0, "obj", name)?;
            let cls = args.required(1, "class_or_tuple", name)?;
            Value::Bool(isinstance(&obj, &cls)?)
        }
        "format" => {
            let v = args.required(0, "value", name)?;
            let spec = args.string(1, "format_spec", name)?.unwrap_or_default();
            Value::Str(format::format_value(&v, &spec)?)
        }
        "repr" => Value::Str(args.required(0, "obj", name)?.repr()),
        "bool" => Value::Bool(match args.take(0, "x") {
            Some(v) => v.truthy()?,
            None => false,
        }),
        "int" => match args.take(0, "x") {
            None => Value::Int(0),
            Some(v) => {
                let base = args.int(1, "base", 10, name)?;
                to_int(&v, base)?
            }
        },
        "float" => match args.take(0, "x") {
            None => Value::Float(0.0),
            Some(v) => Value::Float(to_float(&v)?),
        },
        "str" => Value::Str(args.take(0, "object").map_or(String::new(), |v| v.to_str())),
        "list" => Value::List(match args.take(0, "iterable") {
            Some(v) => iterable(v, limit)?,
            None => Vec::new(),
        }),
        "tuple" => Value::Tuple(match args.take(0, "iterable") {
            Some(v) => iterable(v, limit)?,
            None => Vec::new(),
        }),
        "set" => Value::Set(match args.take(0, "iterable") {
            Some(v) => iterable(v, limit)?
                .iter()
                .map(Key::from_value)
                .collect::<Exec<IndexSet<_>>>()?,
            None => IndexSet::new(),
        }),
        "dict" => {
            let mut map = IndexMap::new();
            if let Some(src) = args.take(0, "mapping") {
                collections::merge_into(&mut map, src)?;
            }
            for (k, v) in args.take_all_kw() {
                map.insert(Key::Str(k), v);
            }
            Value::Dict(map)
        }
        "type" => Value::Type(args.required(0, "object", name)?.type_name()),
        other if STUBS.contains(&other) => return Err(disallowed(other)),
        other => return Err(Fault::name(other)),
    };
    args.finish(name)?;
    Ok(v)
}

/// Materialize an iterable argument; series iterate their values.
fn iterable(v: Value, limit: usize) -> Exec<Vec<Value>> {
    v.collect_values(limit)
}

pub fn len(v: &Value) -> Exec<usize> {
    Ok(match v {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Set(s) => s.len(),
        Value::Dict(d) => d.len(),
        Value::Range(r) => r.len(),
        Value::Series(s) => s.len(),
        Value::Frame(df) => df.n_rows(),
        Value::GroupBy(g) => g.n_groups()?,
        other => {
            return Err(Fault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    })
}

fn abs(v: Value) -> Exec<Value> {
    match v {
        Value::Int(i) => i.checked_abs().map(Value::Int).ok_or_else(Fault::overflow),
        Value::Bool(b) => Ok(Value::Int(i64::from(b))),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        Value::Series(s) => {
            let values = s
                .values
                .iter()
                .map(|x| abs_scalar(x))
                .collect::<Exec<Vec<_>>>()?;
            Ok(Value::Series(s.map_values(values)))
        }
        Value::Frame(mut df) => {
            for col in &mut df.columns {
                col.values = col
                    .values
                    .iter()
                    .map(abs_scalar)
                    .collect::<Exec<Vec<_>>>()?;
            }
            Ok(Value::Frame(df))
        }
        other => Err(Fault::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

pub fn abs_scalar(x: &Scalar) -> Exec<Scalar> {
    match x {
        Scalar::Null => Ok(Scalar::Float(f64::NAN)),
        Scalar::Text(_) => Err(Fault::type_error("bad operand type for abs(): 'str'")),
        other => abs(Value::from_scalar(other))?.to_scalar(),
    }
}

fn range(args: &mut Args) -> Exec<Value> {
    let nums = args.rest(0);
    let ints = nums
        .iter()
        .map(|v| {
            v.as_int().ok_or_else(|| {
                Fault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            })
        })
        .collect::<Exec<Vec<i64>>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => {
            return Err(Fault::type_error(format!(
                "range expected 1 to 3 arguments, got {}",
                ints.len()
            )))
        }
    };
    if step == 0 {
        return Err(Fault::value("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(RangeValue { start, stop, step }))
}

/// Python rounding: half to even.
pub fn round_f64(x: f64, digits: i64) -> f64 {
    if !x.is_finite() {
        return x;
    }
    let factor = 10f64.powi(digits.clamp(-308, 308) as i32);
    let scaled = x * factor;
    if !scaled.is_finite() {
        return x;
    }
    scaled.round_ties_even() / factor
}

fn round(x: Value, digits: Option<Value>) -> Exec<Value> {
    let digits = match digits {
        None => None,
        Some(d) => Some(d.as_int().ok_or_else(|| {
            Fault::type_error(format!(
                "'{}' object cannot be interpreted as an integer",
                d.type_name()
            ))
        })?),
    };
    match (x, digits) {
        (Value::Int(i), _) => Ok(Value::Int(i)),
        (Value::Bool(b), _) => Ok(Value::Int(i64::from(b))),
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(Fault::value(format!(
                    "cannot convert float {} to integer",
                    crate::dataset::format_float(f)
                )));
            }
            let r = f.round_ties_even();
            if r.abs() >= 9.2e18 {
                return Err(Fault::overflow());
            }
            Ok(Value::Int(r as i64))
        }
        (Value::Float(f), Some(d)) => Ok(Value::Float(round_f64(f, d))),
        (Value::Series(s), d) => {
            let d = d.unwrap_or(0);
            let values = s.values.iter().map(|v| round_scalar(v, d)).collect();
            Ok(Value::Series(s.map_values(values)))
        }
        (Value::Frame(mut df), d) => {
            let d = d.unwrap_or(0);
            for col in &mut df.columns {
                col.values = col.values.iter().map(|v| round_scalar(v, d)).collect();
            }
            Ok(Value::Frame(df))
        }
        (other, _) => Err(Fault::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

pub fn round_scalar(v: &Scalar, digits: i64) -> Scalar {
    match v {
        Scalar::Float(f) => Scalar::Float(round_f64(*f, digits)),
        other => other.clone(),
    }
}

pub fn to_int(v: &Value, base: i64) -> Exec<Value> {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => {
            if f.is_nan() {
                return Err(Fault::value("cannot convert float NaN to integer"));
            }
            if f.is_infinite() || f.abs() >= 9.2e18 {
                return Err(Fault::overflow());
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Value::Str(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != '_').collect();
            let radix = u32::try_from(base)
                .ok()
                .filter(|b| (2..=36).contains(b))
                .ok_or_else(|| Fault::value("int() base must be >= 2 and <= 36, or 0"))?;
            i64::from_str_radix(&cleaned, radix)
                .map(Value::Int)
                .map_err(|_| {
                    Fault::value(format!(
                        "invalid literal for int() with base {base}: {}",
                        super::value::repr_str(s)
                    ))
                })
        }
        other => Err(Fault::type_error(format!(
            "int() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

pub fn to_float(v: &Value) -> Exec<f64> {
    match v {
        Value::Str(s) => {
            let t = s.trim().to_ascii_lowercase();
            match t.as_str() {
                "nan" | "+nan" | "-nan" => Ok(f64::NAN),
                "inf" | "+inf" | "infinity" => Ok(f64::INFINITY),
                "-inf" | "-infinity" => Ok(f64::NEG_INFINITY),
                _ => t.replace('_', "").parse::<f64>().map_err(|_| {
                    Fault::value(format!(
                        "could not convert string to float: {}",
                        super::value::repr_str(s)
                    ))
                }),
            }
        }
        other => other.as_f64().ok_or_else(|| {
            Fault::type_error(format!(
                "float() argument must be a string or a real number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn extreme(name: &str, mut args: Args, inv: &mut dyn Invoker) -> Exec<Value> {
    let key = args.take_kw("key").filter(|k| !matches!(k, Value::None));
    let default = args.take_kw("default");
    let mut pos = args.rest(0);
    args.finish(name)?;
    let want = if name == "max" {
        Ordering::Greater
    } else {
        Ordering::Less
    };
    let items = match pos.len() {
        0 => {
            return Err(Fault::type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )))
        }
        1 => match pos.remove(0) {
            Value::Series(s) => {
                let r = if want == Ordering::Greater {
                    stats::max(&s.values)?
                } else {
                    stats::min(&s.values)?
                };
                return Ok(Value::from_scalar(&r));
            }
            other => other.collect_values(inv.limit())?,
        },
        _ => pos,
    };
    if items.is_empty() {
        return default.ok_or_else(|| {
            Fault::value(format!("{name}() arg is an empty sequence"))
        });
    }
    match key {
        None => Ok(ops::extreme_value(items, want)?.unwrap_or(Value::None)),
        Some(f) => {
            let mut best: Option<(Value, Value)> = None;
            let sym = if want == Ordering::Greater { ">" } else { "<" };
            for item in items {
                let k = inv.invoke(&f, vec![item.clone()])?;
                best = match best {
                    Some((bk, bv)) if ops::order(&k, &bk, sym)? != Some(want) => Some((bk, bv)),
                    _ => Some((k, item)),
                };
            }
            Ok(best.map_or(Value::None, |(_, v)| v))
        }
    }
}

fn isinstance(obj: &Value, cls: &Value) -> Exec<bool> {
    match cls {
        Value::Tuple(options) => {
            for c in options {
                if isinstance(obj, c)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Type(name) => Ok(match *name {
            "int" => matches!(obj, Value::Int(_) | Value::Bool(_)),
            "float" => matches!(obj, Value::Float(_)),
            "str" => matches!(obj, Value::Str(_)),
            "bool" => matches!(obj, Value::Bool(_)),
            "list" => matches!(obj, Value::List(_)),
            "tuple" => matches!(obj, Value::Tuple(_)),
            "dict" => matches!(obj, Value::Dict(_)),
            "set" => matches!(obj, Value::Set(_)),
            "type" => matches!(obj, Value::Type(_)),
            other => obj.type_name() == other,
        }),
        Value::ModuleFn(ModuleKind::Pandas, "DataFrame") => Ok(matches!(obj, Value::Frame(_))),
        Value::ModuleFn(ModuleKind::Pandas, "Series") => Ok(matches!(obj, Value::Series(_))),
        other => Err(Fault::type_error(format!(
            "isinstance() arg 2 must be a type or tuple of types, not '{}'",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        out: String,
    }

    impl Invoker for Recorder {
        fn invoke(&mut self, func: &Value, args: Vec<Value>) -> Exec<Value> {
            match func {
                Value::Builtin(name) => call(name, Args::positional(args), self),
                _ => Err(Fault::type_error("not callable")),
            }
        }

        fn limit(&self) -> usize {
            1_000
        }

        fn poll(&self) -> Exec<()> {
            Ok(())
        }

        fn write_stdout(&mut self, text: &str) {
            self.out.push_str(text);
        }
    }

    fn run(name: &str, pos: Vec<Value>) -> Exec<Value> {
        call(name, Args::positional(pos), &mut Recorder::default())
    }

    #[test]
    fn test_lookup_binds_stubs_and_aliases() {
        assert_eq!(lookup("eval"), Some(Value::Stub("eval")));
        assert_eq!(lookup("len"), Some(Value::Builtin("len")));
        assert_eq!(lookup("int"), Some(Value::Type("int")));
        assert_eq!(lookup("true"), Some(Value::Bool(true)));
        assert_eq!(lookup("os"), None);
    }

    #[test]
    fn test_stub_call_is_disallowed() {
        let err = run("eval", vec![Value::Str("1+1".into())]).unwrap_err();
        assert_eq!(err.class, super::super::fault::FaultClass::DisallowedOperation);
    }

    #[test]
    fn test_print_writes_capture() {
        let mut recorder = Recorder::default();
        let mut kw = IndexMap::new();
        kw.insert("sep".to_string(), Value::Str("-".into()));
        call(
            "print",
            Args::new(vec![Value::Int(1), Value::Str("a".into())], kw),
            &mut recorder,
        )
        .unwrap();
        assert_eq!(recorder.out, "1-a\n");
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(run("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(run("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
        assert_eq!(
            run("round", vec![Value::Float(1.234), Value::Int(2)]).unwrap(),
            Value::Float(1.23)
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(run("int", vec![Value::Str(" 42 ".into())]).unwrap(), Value::Int(42));
        assert!(run("int", vec![Value::Str("x".into())]).is_err());
        assert_eq!(run("float", vec![Value::Str("1.5".into())]).unwrap(), Value::Float(1.5));
        assert_eq!(run("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_max_min_and_empty() {
        let xs = Value::List(vec![Value::Int(3), Value::Int(9), Value::Int(1)]);
        assert_eq!(run("max", vec![xs.clone()]).unwrap(), Value::Int(9));
        assert_eq!(run("min", vec![Value::Int(4), Value::Int(2)]).unwrap(), Value::Int(2));
        assert!(run("max", vec![Value::List(vec![])]).is_err());
    }

    #[test]
    fn test_map_and_sorted() {
        let xs = Value::List(vec![Value::Int(-3), Value::Int(2)]);
        assert_eq!(
            run("map", vec![Value::Builtin("abs"), xs.clone()]).unwrap(),
            Value::List(vec![Value::Int(3), Value::Int(2)])
        );
        assert_eq!(
            run("sorted", vec![xs]).unwrap(),
            Value::List(vec![Value::Int(-3), Value::Int(2)])
        );
    }

    #[test]
    fn test_range_is_lazy_and_len() {
        let r = run("range", vec![Value::Int(1_000_000_000)]).unwrap();
        assert_eq!(len(&r).unwrap(), 1_000_000_000);
        assert!(run("list", vec![r]).is_err());
    }

    #[test]
    fn test_isinstance() {
        let ty = Value::Tuple(vec![Value::Type("int"), Value::Type("float")]);
        assert_eq!(run("isinstance", vec![Value::Float(1.0), ty]).unwrap(), Value::Bool(true));
        assert_eq!(
            run("isinstance", vec![Value::Bool(true), Value::Type("int")]).unwrap(),
            Value::Bool(true)
        );
    }
}
