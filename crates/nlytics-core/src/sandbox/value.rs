//! Runtime values of the sandbox interpreter.
//!
//! Bindings have value semantics: assignment copies, and mutating methods
//! write the updated receiver back to the place it was read from.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::dataset::{format_float, DataFrame, Scalar, Series};
use crate::script::Expr;

use super::fault::{Exec, Fault};
use super::groupby::GroupBy;
use super::text;

/// Hashable view of a value, used for dict keys and set members.
///
/// Booleans and integral floats collapse onto integers so `1`, `1.0` and
/// `True` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    None,
    Int(i64),
    Float(u64),
    Str(String),
    Tuple(Vec<Key>),
}

impl Key {
    pub fn from_value(v: &Value) -> Exec<Key> {
        Ok(match v {
            Value::None => Key::None,
            Value::Bool(b) => Key::Int(i64::from(*b)),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => Self::from_f64(*f),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<Exec<Vec<_>>>()?,
            ),
            other => {
                return Err(Fault::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }

    pub fn from_scalar(s: &Scalar) -> Key {
        match s {
            Scalar::Null => Key::None,
            Scalar::Bool(b) => Key::Int(i64::from(*b)),
            Scalar::Int(i) => Key::Int(*i),
            Scalar::Float(f) => Self::from_f64(*f),
            Scalar::Text(t) => Key::Str(t.clone()),
        }
    }

    fn from_f64(f: f64) -> Key {
        if f.fract() == 0.0 && f.abs() < 9.0e15 {
            Key::Int(f as i64)
        } else if f.is_nan() {
            Key::Float(f64::NAN.to_bits())
        } else {
            Key::Float(f.to_bits())
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::None => Value::None,
            Key::Int(i) => Value::Int(*i),
            Key::Float(bits) => Value::Float(f64::from_bits(*bits)),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(items) => Value::Tuple(items.iter().map(Key::to_value).collect()),
        }
    }
}

/// Data-manipulation modules the sandbox can bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Pandas,
    Numpy,
}

impl ModuleKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pandas" => Some(ModuleKind::Pandas),
            "numpy" => Some(ModuleKind::Numpy),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ModuleKind::Pandas => "pandas",
            ModuleKind::Numpy => "numpy",
        }
    }
}

/// Accessor objects returned by `.loc`, `.iloc`, `.at`, `.iat` and `.str`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexerKind {
    Loc,
    Iloc,
    At,
    Iat,
    Str,
}

impl IndexerKind {
    pub fn from_attr(attr: &str) -> Option<Self> {
        match attr {
            "loc" => Some(IndexerKind::Loc),
            "iloc" => Some(IndexerKind::Iloc),
            "at" => Some(IndexerKind::At),
            "iat" => Some(IndexerKind::Iat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    pub fn len(&self) -> usize {
        let span = if self.step > 0 {
            self.stop.saturating_sub(self.start)
        } else {
            self.start.saturating_sub(self.stop)
        };
        if span <= 0 {
            return 0;
        }
        let step = self.step.unsigned_abs();
        ((span.unsigned_abs() + step - 1) / step) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, v: i64) -> bool {
        let in_bounds = if self.step > 0 {
            v >= self.start && v < self.stop
        } else {
            v <= self.start && v > self.stop
        };
        in_bounds && (v - self.start) % self.step == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceValue {
    pub lower: Value,
    pub upper: Value,
    pub step: Value,
}

impl SliceValue {
    /// Positions selected from a sequence of `len` items (Python slice rules).
    pub fn positions(&self, len: usize) -> Exec<Vec<usize>> {
        let opt = |v: &Value, what: &str| -> Exec<Option<i64>> {
            match v {
                Value::None => Ok(None),
                other => other.as_int().map(Some).ok_or_else(|| {
                    Fault::type_error(format!(
                        "slice {what} must be an integer or None, not '{}'",
                        other.type_name()
                    ))
                }),
            }
        };
        let step = opt(&self.step, "step")?.unwrap_or(1);
        if step == 0 {
            return Err(Fault::value("slice step cannot be zero"));
        }
        let n = len as i64;
        let clamp = |i: i64, lo: i64, hi: i64| {
            let i = if i < 0 { i + n } else { i };
            i.clamp(lo, hi)
        };
        let (start, stop) = if step > 0 {
            (
                opt(&self.lower, "start")?.map_or(0, |i| clamp(i, 0, n)),
                opt(&self.upper, "stop")?.map_or(n, |i| clamp(i, 0, n)),
            )
        } else {
            (
                opt(&self.lower, "start")?.map_or(n - 1, |i| clamp(i, -1, n - 1)),
                opt(&self.upper, "stop")?.map_or(-1, |i| clamp(i, -1, n - 1)),
            )
        };
        let mut out = Vec::new();
        let mut i = start;
        while (step > 0 && i < stop) || (step < 0 && i > stop) {
            out.push(i as usize);
            i += step;
        }
        Ok(out)
    }
}

/// A user lambda with the enclosing local bindings captured at creation.
#[derive(Debug, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
    pub captured: Vec<(String, Value)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Set(IndexSet<Key>),
    Dict(IndexMap<Key, Value>),
    Range(RangeValue),
    Slice(Box<SliceValue>),
    Frame(DataFrame),
    Series(Series),
    GroupBy(Box<GroupBy>),
    Module(ModuleKind),
    ModuleFn(ModuleKind, &'static str),
    Builtin(&'static str),
    /// A disallowed primitive; calling it raises `DisallowedOperation`.
    Stub(&'static str),
    Type(&'static str),
    Method(Box<Value>, String),
    Lambda(Rc<Lambda>),
    Indexer(IndexerKind, Box<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Slice(_) => "slice",
            Value::Frame(_) => "DataFrame",
            Value::Series(_) => "Series",
            Value::GroupBy(g) => g.type_name(),
            Value::Module(_) => "module",
            Value::ModuleFn(..) | Value::Builtin(_) | Value::Stub(_) => {
                "builtin_function_or_method"
            }
            Value::Type(_) => "type",
            Value::Method(..) => "method",
            Value::Lambda(_) => "function",
            Value::Indexer(IndexerKind::Str, _) => "StringMethods",
            Value::Indexer(IndexerKind::Loc, _) => "_LocIndexer",
            Value::Indexer(IndexerKind::Iloc, _) => "_iLocIndexer",
            Value::Indexer(IndexerKind::At, _) => "_AtIndexer",
            Value::Indexer(IndexerKind::Iat, _) => "_iAtIndexer",
        }
    }

    pub fn from_scalar(s: &Scalar) -> Value {
        match s {
            Scalar::Null => Value::None,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Int(*i),
            Scalar::Float(f) => Value::Float(*f),
            Scalar::Text(t) => Value::Str(t.clone()),
        }
    }

    pub fn to_scalar(&self) -> Exec<Scalar> {
        Ok(match self {
            Value::None => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Int(i) => Scalar::Int(*i),
            Value::Float(f) => Scalar::Float(*f),
            Value::Str(s) => Scalar::Text(s.clone()),
            other => {
                return Err(Fault::type_error(format!(
                    "cannot store a '{}' in a column",
                    other.type_name()
                )))
            }
        })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_) | Value::Float(_))
    }

    /// Integer view (`bool` counts), for indices and counts.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Value::Builtin(_)
                | Value::Stub(_)
                | Value::ModuleFn(..)
                | Value::Method(..)
                | Value::Lambda(_)
                | Value::Type(_)
        )
    }

    /// Python truthiness; frames and series are ambiguous.
    pub fn truthy(&self) -> Exec<bool> {
        Ok(match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Range(r) => !r.is_empty(),
            Value::Frame(_) | Value::Series(_) => {
                return Err(Fault::value(format!(
                    "The truth value of a {} is ambiguous. Use a.empty, a.bool(), a.item(), a.any() or a.all().",
                    self.type_name()
                )))
            }
            _ => true,
        })
    }

    /// Structural equality with Python's cross-type numeric rules.
    pub fn py_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => match (a.as_int(), b.as_int()) {
                (Some(x), Some(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            },
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Set(a), Value::Set(b)) => a.len() == b.len() && a.iter().all(|k| b.contains(k)),
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.py_eq(w)))
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Type(a) | Value::Builtin(a), Value::Type(b) | Value::Builtin(b)) => a == b,
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Frame(a), Value::Frame(b)) => a == b,
            (Value::Series(a), Value::Series(b)) => a == b,
            (Value::Lambda(a), Value::Lambda(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `repr()` text.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => repr_str(s),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Set(keys) if keys.is_empty() => "set()".to_string(),
            Value::Set(keys) => {
                let items: Vec<String> = keys.iter().map(|k| k.to_value().repr()).collect();
                format!("{{{}}}", items.join(", "))
            }
            Value::Dict(map) => {
                let items: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.to_value().repr(), v.repr()))
                    .collect();
                format!("{{{}}}", items.join(", "))
            }
            other => other.to_str(),
        }
    }

    /// `str()` text.
    pub fn to_str(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.clone(),
            Value::List(_) | Value::Tuple(_) | Value::Set(_) | Value::Dict(_) => self.repr(),
            Value::Range(r) if r.step == 1 => format!("range({}, {})", r.start, r.stop),
            Value::Range(r) => format!("range({}, {}, {})", r.start, r.stop, r.step),
            Value::Slice(s) => format!(
                "slice({}, {}, {})",
                s.lower.repr(),
                s.upper.repr(),
                s.step.repr()
            ),
            Value::Frame(df) => text::render_frame(df),
            Value::Series(s) => text::render_series(s),
            Value::GroupBy(g) => format!("<{} object>", g.type_name()),
            Value::Module(m) => format!("<module '{}'>", m.name()),
            Value::ModuleFn(m, name) => format!("<function {}.{}>", m.name(), name),
            Value::Builtin(name) | Value::Stub(name) => format!("<built-in function {name}>"),
            Value::Type(name) => format!("<class '{name}'>"),
            Value::Method(recv, name) => {
                format!("<bound method {} of {}>", name, recv.type_name())
            }
            Value::Lambda(_) => "<function <lambda>>".to_string(),
            Value::Indexer(..) => format!("<{} object>", self.type_name()),
        }
    }

    /// Iterate the value the way a `for` loop would.
    pub fn into_iter_values(self) -> Exec<ValueIter> {
        Ok(match self {
            Value::Range(r) => ValueIter::Range {
                next: r.start,
                remaining: r.len(),
                step: r.step,
            },
            Value::List(items) | Value::Tuple(items) => ValueIter::Items(items.into_iter()),
            Value::Set(keys) => ValueIter::Items(
                keys.iter()
                    .map(Key::to_value)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Dict(map) => ValueIter::Items(
                map.keys()
                    .map(Key::to_value)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Str(s) => ValueIter::Items(
                s.chars()
                    .map(|c| Value::Str(c.to_string()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Series(s) => ValueIter::Items(
                s.values
                    .iter()
                    .map(Value::from_scalar)
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::Frame(df) => ValueIter::Items(
                df.columns
                    .into_iter()
                    .map(|c| Value::Str(c.name))
                    .collect::<Vec<_>>()
                    .into_iter(),
            ),
            Value::GroupBy(g) => ValueIter::Items(g.iter_groups()?.into_iter()),
            other => {
                return Err(Fault::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        })
    }

    /// Number of values a deep copy of `self` materializes, counting each
    /// 16 bytes of text as one value. Counting stops once the total passes
    /// `cap`, so the cost is bounded by `cap`.
    pub fn weight(&self, cap: usize) -> usize {
        let mut total = 0;
        self.add_weight(&mut total, cap);
        total
    }

    fn add_weight(&self, total: &mut usize, cap: usize) {
        *total = total.saturating_add(1);
        let frame_cells = |df: &DataFrame| df.n_rows().saturating_mul(df.n_cols().max(1));
        match self {
            Value::Str(s) => *total = total.saturating_add(s.len() / 16),
            Value::List(items) | Value::Tuple(items) => {
                for v in items {
                    if *total > cap {
                        return;
                    }
                    v.add_weight(total, cap);
                }
            }
            Value::Dict(map) => {
                for v in map.values() {
                    if *total > cap {
                        return;
                    }
                    *total = total.saturating_add(1);
                    v.add_weight(total, cap);
                }
            }
            Value::Set(keys) => *total = total.saturating_add(keys.len()),
            Value::Series(series) => *total = total.saturating_add(series.len()),
            Value::Frame(df) => *total = total.saturating_add(frame_cells(df)),
            Value::GroupBy(g) => *total = total.saturating_add(frame_cells(&g.frame)),
            Value::Method(inner, _) | Value::Indexer(_, inner) => inner.add_weight(total, cap),
            _ => {}
        }
    }

    /// Materialize the iteration into a vector, bounded by `limit` items.
    pub fn collect_values(self, limit: usize) -> Exec<Vec<Value>> {
        let iter = self.into_iter_values()?;
        if iter.size_hint().0 > limit {
            return Err(Fault::too_large(limit));
        }
        Ok(iter.collect())
    }
}

/// Combined [`Value::weight`] of `items`, stopping once it passes `cap`.
pub fn weight_of(items: &[Value], cap: usize) -> usize {
    let mut total = 0;
    for v in items {
        if total > cap {
            break;
        }
        v.add_weight(&mut total, cap);
    }
    total
}

/// Iterator behind `for` loops and comprehensions; ranges stay lazy.
pub enum ValueIter {
    Range {
        next: i64,
        remaining: usize,
        step: i64,
    },
    Items(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::Range {
                next,
                remaining,
                step,
            } => {
                if *remaining == 0 {
                    return None;
                }
                let v = *next;
                *remaining -= 1;
                *next = next.wrapping_add(*step);
                Some(Value::Int(v))
            }
            ValueIter::Items(it) => it.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            ValueIter::Range { remaining, .. } => (*remaining, Some(*remaining)),
            ValueIter::Items(it) => it.size_hint(),
        }
    }
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

pub fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
