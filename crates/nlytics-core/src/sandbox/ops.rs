//! Operators: arithmetic, comparison, membership and unary operators over
//! interpreter values, with element-wise broadcasting for series and frames.

use std::cmp::Ordering;

use indexmap::IndexSet;

use crate::dataset::{Column, DataFrame, Scalar, Series};
use crate::script::ast::{BinOp, CmpOp, UnaryOp};

use super::fault::{Exec, Fault};
use super::format;
use super::value::{weight_of, Key, Value};

fn unsupported(op: &str, a: &Value, b: &Value) -> Fault {
    Fault::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

/// `a <op> b`. `limit` bounds repetition and concatenation results.
pub fn binary(op: BinOp, a: Value, b: Value, limit: usize) -> Exec<Value> {
    match (&a, &b) {
        (Value::Series(_), _) | (_, Value::Series(_)) => series_binary(op, a, b, limit),
        (Value::Frame(_), _) | (_, Value::Frame(_)) => frame_binary(op, a, b, limit),
        _ => scalar_binary(op, a, b, limit),
    }
}

fn scalar_binary(op: BinOp, a: Value, b: Value, limit: usize) -> Exec<Value> {
    match (op, a, b) {
        (BinOp::Add, Value::Str(mut x), Value::Str(y)) => {
            if x.len() + y.len() > limit {
                return Err(Fault::too_large(limit));
            }
            x.push_str(&y);
            Ok(Value::Str(x))
        }
        (BinOp::Add, Value::List(mut x), Value::List(y)) => {
            if weight_of(&x, limit).saturating_add(weight_of(&y, limit)) > limit {
                return Err(Fault::too_large(limit));
            }
            x.extend(y);
            Ok(Value::List(x))
        }
        (BinOp::Add, Value::Tuple(mut x), Value::Tuple(y)) => {
            if weight_of(&x, limit).saturating_add(weight_of(&y, limit)) > limit {
                return Err(Fault::too_large(limit));
            }
            x.extend(y);
            Ok(Value::Tuple(x))
        }
        (BinOp::Mul, Value::Str(s), n @ (Value::Int(_) | Value::Bool(_)))
        | (BinOp::Mul, n @ (Value::Int(_) | Value::Bool(_)), Value::Str(s)) => {
            let times = repeat_count(&n, s.len(), limit)?;
            Ok(Value::Str(s.repeat(times)))
        }
        (BinOp::Mul, Value::List(items), n @ (Value::Int(_) | Value::Bool(_)))
        | (BinOp::Mul, n @ (Value::Int(_) | Value::Bool(_)), Value::List(items)) => {
            let times = repeat_count(&n, weight_of(&items, limit), limit)?;
            Ok(Value::List(repeat_items(&items, times)))
        }
        (BinOp::Mul, Value::Tuple(items), n @ (Value::Int(_) | Value::Bool(_)))
        | (BinOp::Mul, n @ (Value::Int(_) | Value::Bool(_)), Value::Tuple(items)) => {
            let times = repeat_count(&n, weight_of(&items, limit), limit)?;
            Ok(Value::Tuple(repeat_items(&items, times)))
        }
        (BinOp::Mod, Value::Str(fmt), args) => format::percent_format(&fmt, &args).map(Value::Str),
        (BinOp::BitOr, Value::Set(x), Value::Set(y)) => {
            Ok(Value::Set(x.union(&y).cloned().collect()))
        }
        (BinOp::BitAnd, Value::Set(x), Value::Set(y)) => {
            Ok(Value::Set(x.intersection(&y).cloned().collect()))
        }
        (BinOp::Sub, Value::Set(x), Value::Set(y)) => {
            Ok(Value::Set(x.difference(&y).cloned().collect()))
        }
        (BinOp::BitXor, Value::Set(x), Value::Set(y)) => {
            Ok(Value::Set(x.symmetric_difference(&y).cloned().collect::<IndexSet<Key>>()))
        }
        (BinOp::BitOr, Value::Dict(mut x), Value::Dict(y)) => {
            x.extend(y);
            Ok(Value::Dict(x))
        }
        (BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor, Value::Bool(x), Value::Bool(y)) => {
            Ok(Value::Bool(match op {
                BinOp::BitAnd => x & y,
                BinOp::BitOr => x | y,
                _ => x ^ y,
            }))
        }
        (op, a, b) if a.is_number() && b.is_number() => numeric(op, &a, &b),
        (op, a, b) => Err(unsupported(op.symbol(), &a, &b)),
    }
}

/// Repetitions allowed when one copy materializes `unit` values. A single
/// copy is never larger than its operand, so only `n > 1` is bounded.
fn repeat_count(n: &Value, unit: usize, limit: usize) -> Exec<usize> {
    let n = n.as_int().unwrap_or(0).max(0) as usize;
    if n > 1 && n.saturating_mul(unit) > limit {
        return Err(Fault::too_large(limit));
    }
    Ok(n)
}

fn repeat_items(items: &[Value], times: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend(items.iter().cloned());
    }
    out
}

fn numeric(op: BinOp, a: &Value, b: &Value) -> Exec<Value> {
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if let Some(v) = int_arith(op, x, y)? {
            return Ok(v);
        }
    }
    let (x, y) = match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(unsupported(op.symbol(), a, b)),
    };
    let both_int = a.as_int().is_some() && b.as_int().is_some();
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(Fault::zero_division(if both_int {
                    "division by zero"
                } else {
                    "float division by zero"
                }));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(Fault::zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(Fault::zero_division("float modulo"));
            }
            let r = x % y;
            if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(Fault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            x.powf(y)
        }
        BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
            return Err(unsupported(op.symbol(), a, b));
        }
    };
    Ok(Value::Float(v))
}

/// Integer arithmetic; `None` means "fall through to float".
fn int_arith(op: BinOp, x: i64, y: i64) -> Exec<Option<Value>> {
    let v = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(Fault::overflow)?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(Fault::overflow)?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(Fault::overflow)?,
        BinOp::Div => return Ok(None),
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(Fault::zero_division("integer division or modulo by zero"));
            }
            let q = x.checked_div(y).ok_or_else(Fault::overflow)?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(Fault::zero_division("integer division or modulo by zero"));
            }
            let r = x.checked_rem(y).ok_or_else(Fault::overflow)?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(None);
            }
            let exp = u32::try_from(y).map_err(|_| Fault::overflow())?;
            x.checked_pow(exp).ok_or_else(Fault::overflow)?
        }
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
    };
    Ok(Some(Value::Int(v)))
}

/// Element-wise operator on two cells. Missing operands propagate as NaN;
/// division by zero yields ±inf/NaN instead of faulting.
pub fn elementwise(op: BinOp, a: &Scalar, b: &Scalar, limit: usize) -> Exec<Scalar> {
    if matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
        if let (Scalar::Int(x), Scalar::Int(y)) = (a, b) {
            return int_arith(op, *x, *y).map(|v| match v {
                Some(Value::Int(i)) => Scalar::Int(i),
                _ => Scalar::Null,
            });
        }
        let x = mask_bool(a);
        let y = mask_bool(b);
        return Ok(Scalar::Bool(match op {
            BinOp::BitAnd => x && y,
            BinOp::BitOr => x || y,
            _ => x ^ y,
        }));
    }
    if a.is_missing() || b.is_missing() {
        return Ok(Scalar::Float(f64::NAN));
    }
    if a.is_numeric()
        && b.is_numeric()
        && matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod)
        && b.as_f64() == Some(0.0)
    {
        let x = a.as_f64().unwrap_or(f64::NAN);
        return Ok(Scalar::Float(match op {
            BinOp::Mod => f64::NAN,
            _ if x > 0.0 => f64::INFINITY,
            _ if x < 0.0 => f64::NEG_INFINITY,
            _ => f64::NAN,
        }));
    }
    scalar_binary(op, Value::from_scalar(a), Value::from_scalar(b), limit)?.to_scalar()
}

/// Truth of a mask cell; missing counts as false.
pub fn mask_bool(v: &Scalar) -> bool {
    match v {
        Scalar::Bool(b) => *b,
        Scalar::Int(i) => *i != 0,
        Scalar::Float(f) => !f.is_nan() && *f != 0.0,
        Scalar::Text(t) => !t.is_empty(),
        Scalar::Null => false,
    }
}

/// Right-hand operand broadcast to `n` cells.
fn broadcast(v: &Value, n: usize) -> Exec<Vec<Scalar>> {
    match v {
        Value::Series(s) => {
            if s.len() != n {
                return Err(Fault::value(format!(
                    "operands could not be broadcast together with shapes ({n},) ({},)",
                    s.len()
                )));
            }
            Ok(s.values.clone())
        }
        Value::List(items) | Value::Tuple(items) => {
            if items.len() != n {
                return Err(Fault::value(format!(
                    "Lengths must match to compare or combine ({n} vs {})",
                    items.len()
                )));
            }
            items.iter().map(Value::to_scalar).collect()
        }
        other if other.is_scalar() => Ok(vec![other.to_scalar()?; n]),
        other => Err(Fault::type_error(format!(
            "cannot combine a Series with '{}'",
            other.type_name()
        ))),
    }
}

fn series_binary(op: BinOp, a: Value, b: Value, limit: usize) -> Exec<Value> {
    let (base, left_series) = match (&a, &b) {
        (Value::Series(s), _) => (s.clone(), true),
        (_, Value::Series(s)) => (s.clone(), false),
        _ => return Err(unsupported(op.symbol(), &a, &b)),
    };
    let other = if left_series { &b } else { &a };
    let others = broadcast(other, base.len())?;
    let mut out = Vec::with_capacity(base.len());
    for (x, y) in base.values.iter().zip(&others) {
        out.push(if left_series {
            elementwise(op, x, y, limit)?
        } else {
            elementwise(op, y, x, limit)?
        });
    }
    let mut result = base.map_values(out);
    if let Value::Series(o) = other {
        if o.name != base.name {
            result.name = None;
        }
    }
    Ok(Value::Series(result))
}

fn map_frame(df: &DataFrame, mut f: impl FnMut(usize, &Column) -> Exec<Vec<Scalar>>) -> Exec<DataFrame> {
    let mut columns = Vec::with_capacity(df.n_cols());
    for (i, col) in df.columns.iter().enumerate() {
        columns.push(Column {
            name: col.name.clone(),
            values: f(i, col)?,
        });
    }
    Ok(DataFrame {
        index: df.index.clone(),
        columns,
    })
}

fn frame_binary(op: BinOp, a: Value, b: Value, limit: usize) -> Exec<Value> {
    match (&a, &b) {
        (Value::Frame(x), Value::Frame(y)) => {
            if x.n_rows() != y.n_rows() || x.column_names() != y.column_names() {
                return Err(Fault::value(
                    "can only combine identically-labeled DataFrame objects",
                ));
            }
            let out = map_frame(x, |i, col| {
                col.values
                    .iter()
                    .zip(&y.columns[i].values)
                    .map(|(p, q)| elementwise(op, p, q, limit))
                    .collect()
            })?;
            Ok(Value::Frame(out))
        }
        (Value::Frame(x), s) if s.is_scalar() => {
            let rhs = s.to_scalar()?;
            Ok(Value::Frame(map_frame(x, |_, col| {
                col.values
                    .iter()
                    .map(|p| elementwise(op, p, &rhs, limit))
                    .collect()
            })?))
        }
        (s, Value::Frame(y)) if s.is_scalar() => {
            let lhs = s.to_scalar()?;
            Ok(Value::Frame(map_frame(y, |_, col| {
                col.values
                    .iter()
                    .map(|q| elementwise(op, &lhs, q, limit))
                    .collect()
            })?))
        }
        _ => Err(unsupported(op.symbol(), &a, &b)),
    }
}

/// Ordering of two values; `None` when either side is NaN.
pub fn order(a: &Value, b: &Value, sym: &str) -> Exec<Option<Ordering>> {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (x, y) if x.is_number() && y.is_number() => match (x.as_int(), y.as_int()) {
            (Some(i), Some(j)) => Ok(Some(i.cmp(&j))),
            _ => Ok(x.as_f64().and_then(|p| y.as_f64().and_then(|q| p.partial_cmp(&q)))),
        },
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => {
            for (p, q) in x.iter().zip(y) {
                if !p.py_eq(q) {
                    return order(p, q, sym);
                }
            }
            Ok(Some(x.len().cmp(&y.len())))
        }
        _ => Err(Fault::type_error(format!(
            "'{sym}' not supported between instances of '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Eq => "==",
        CmpOp::NotEq => "!=",
        CmpOp::Lt => "<",
        CmpOp::LtE => "<=",
        CmpOp::Gt => ">",
        CmpOp::GtE => ">=",
        CmpOp::In => "in",
        CmpOp::NotIn => "not in",
        CmpOp::Is => "is",
        CmpOp::IsNot => "is not",
    }
}

fn scalar_compare(op: CmpOp, a: &Value, b: &Value) -> Exec<bool> {
    let ord = |want: fn(Ordering) -> bool| -> Exec<bool> {
        Ok(order(a, b, cmp_symbol(op))?.is_some_and(want))
    };
    match op {
        CmpOp::Eq => Ok(a.py_eq(b)),
        CmpOp::NotEq => Ok(!a.py_eq(b)),
        CmpOp::Lt => ord(|o| o == Ordering::Less),
        CmpOp::LtE => ord(|o| o != Ordering::Greater),
        CmpOp::Gt => ord(|o| o == Ordering::Greater),
        CmpOp::GtE => ord(|o| o != Ordering::Less),
        CmpOp::In => contains(b, a),
        CmpOp::NotIn => contains(b, a).map(|c| !c),
        CmpOp::Is => Ok(identical(a, b)),
        CmpOp::IsNot => Ok(!identical(a, b)),
    }
}

fn identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Type(x) | Value::Builtin(x), Value::Type(y) | Value::Builtin(y)) => x == y,
        (Value::Module(x), Value::Module(y)) => x == y,
        _ => false,
    }
}

/// Element-wise comparison of two cells. Missing cells compare unequal.
fn cell_compare(op: CmpOp, a: &Scalar, b: &Scalar) -> Exec<bool> {
    if a.is_missing() || b.is_missing() {
        return Ok(op == CmpOp::NotEq);
    }
    let text = |s: &Scalar| matches!(s, Scalar::Text(_));
    if text(a) != text(b) {
        return match op {
            CmpOp::Eq => Ok(false),
            CmpOp::NotEq => Ok(true),
            _ => Err(Fault::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                cmp_symbol(op),
                Value::from_scalar(a).type_name(),
                Value::from_scalar(b).type_name()
            ))),
        };
    }
    scalar_compare(op, &Value::from_scalar(a), &Value::from_scalar(b))
}

/// `a <op> b` for one link of a comparison chain.
pub fn compare(op: CmpOp, a: &Value, b: &Value) -> Exec<Value> {
    if matches!(op, CmpOp::In | CmpOp::NotIn | CmpOp::Is | CmpOp::IsNot) {
        return scalar_compare(op, a, b).map(Value::Bool);
    }
    match (a, b) {
        (Value::Series(s), other) | (other, Value::Series(s)) => {
            let left_series = matches!(a, Value::Series(_));
            let others = broadcast(other, s.len())?;
            let mut out = Vec::with_capacity(s.len());
            for (x, y) in s.values.iter().zip(&others) {
                let r = if left_series {
                    cell_compare(op, x, y)?
                } else {
                    cell_compare(op, y, x)?
                };
                out.push(Scalar::Bool(r));
            }
            Ok(Value::Series(s.map_values(out)))
        }
        (Value::Frame(df), other) | (other, Value::Frame(df)) if other.is_scalar() => {
            let left_frame = matches!(a, Value::Frame(_));
            let rhs = other.to_scalar()?;
            let out = map_frame(df, |_, col| {
                col.values
                    .iter()
                    .map(|v| {
                        let r = if left_frame {
                            cell_compare(op, v, &rhs)?
                        } else {
                            cell_compare(op, &rhs, v)?
                        };
                        Ok(Scalar::Bool(r))
                    })
                    .collect()
            })?;
            Ok(Value::Frame(out))
        }
        _ => scalar_compare(op, a, b).map(Value::Bool),
    }
}

/// `item in container`.
pub fn contains(container: &Value, item: &Value) -> Exec<bool> {
    match container {
        Value::Str(s) => match item {
            Value::Str(sub) => Ok(s.contains(sub.as_str())),
            other => Err(Fault::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| v.py_eq(item))),
        Value::Set(keys) => Ok(keys.contains(&Key::from_value(item)?)),
        Value::Dict(map) => Ok(map.contains_key(&Key::from_value(item)?)),
        Value::Range(r) => Ok(item.as_int().is_some_and(|i| r.contains(i))
            || matches!(item, Value::Float(f) if f.fract() == 0.0 && r.contains(*f as i64))),
        Value::Series(s) => Ok(item
            .to_scalar()
            .is_ok_and(|label| s.index.position(&label).is_some())),
        Value::Frame(df) => Ok(item.as_str().is_some_and(|c| df.column(c).is_some())),
        other => Err(Fault::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn unary(op: UnaryOp, v: Value) -> Exec<Value> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy()?)),
        (op, Value::Series(s)) => {
            let values = s
                .values
                .iter()
                .map(|x| unary_cell(op, x))
                .collect::<Exec<Vec<_>>>()?;
            Ok(Value::Series(s.map_values(values)))
        }
        (op, Value::Frame(df)) => Ok(Value::Frame(map_frame(&df, |_, col| {
            col.values.iter().map(|x| unary_cell(op, x)).collect()
        })?)),
        (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or_else(Fault::overflow),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-i64::from(b))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(i64::from(b))),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::Float(_))) => Ok(v),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Int(!i64::from(b))),
        (op, v) => {
            let sym = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                _ => "~",
            };
            Err(Fault::type_error(format!(
                "bad operand type for unary {sym}: '{}'",
                v.type_name()
            )))
        }
    }
}

fn unary_cell(op: UnaryOp, x: &Scalar) -> Exec<Scalar> {
    match (op, x) {
        (UnaryOp::Invert, Scalar::Bool(b)) => Ok(Scalar::Bool(!b)),
        (UnaryOp::Invert, Scalar::Null) => Ok(Scalar::Bool(true)),
        (_, x) if x.is_missing() => Ok(Scalar::Float(f64::NAN)),
        (op, x) => unary(op, Value::from_scalar(x))?.to_scalar(),
    }
}

/// Sum of a sequence of values with `+` semantics.
pub fn sum_values(items: Vec<Value>, start: Value, limit: usize) -> Exec<Value> {
    items
        .into_iter()
        .try_fold(start, |acc, v| binary(BinOp::Add, acc, v, limit))
}

/// Python-style `min`/`max` over values.
pub fn extreme_value(items: Vec<Value>, want: Ordering) -> Exec<Option<Value>> {
    let mut best: Option<Value> = None;
    for v in items {
        best = Some(match best {
            None => v,
            Some(b) => {
                let sym = if want == Ordering::Less { "<" } else { ">" };
                if order(&v, &b, sym)? == Some(want) {
                    v
                } else {
                    b
                }
            }
        });
    }
    Ok(best)
}

/// Series from a column of booleans, used as a row mask.
pub fn mask_positions(mask: &Series) -> Vec<usize> {
    mask.values
        .iter()
        .enumerate()
        .filter(|(_, v)| mask_bool(v))
        .map(|(i, _)| i)
        .collect()
}
