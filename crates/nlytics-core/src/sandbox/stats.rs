//! Reductions over column values. Missing cells are skipped.

use std::cmp::Ordering;

use crate::dataset::Scalar;

use super::fault::{Exec, Fault};

/// Reductions recognized by `agg`, group-by and frame/series methods.
pub const AGGREGATIONS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "size", "nunique", "first", "last", "std",
    "var", "prod",
];

fn numbers(values: &[Scalar], op: &str) -> Exec<Vec<f64>> {
    values
        .iter()
        .filter(|v| !v.is_missing())
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                Fault::type_error(format!(
                    "cannot compute {op} of non-numeric value {}",
                    crate::sandbox::value::repr_str(&v.to_string())
                ))
            })
        })
        .collect()
}

pub fn sum(values: &[Scalar]) -> Exec<Scalar> {
    let present: Vec<&Scalar> = values.iter().filter(|v| !v.is_missing()).collect();
    if !present.is_empty() && present.iter().all(|v| matches!(v, Scalar::Text(_))) {
        let joined: String = present.iter().filter_map(|v| v.as_str()).collect();
        return Ok(Scalar::Text(joined));
    }
    if present.iter().all(|v| matches!(v, Scalar::Int(_) | Scalar::Bool(_))) {
        let mut acc: i64 = 0;
        for v in &present {
            let i = v.as_i64().unwrap_or(0);
            acc = acc.checked_add(i).ok_or_else(Fault::overflow)?;
        }
        return Ok(Scalar::Int(acc));
    }
    Ok(Scalar::Float(numbers(values, "sum")?.iter().sum()))
}

pub fn prod(values: &[Scalar]) -> Exec<Scalar> {
    let present: Vec<&Scalar> = values.iter().filter(|v| !v.is_missing()).collect();
    if present.iter().all(|v| matches!(v, Scalar::Int(_) | Scalar::Bool(_))) {
        let mut acc: i64 = 1;
        for v in &present {
            acc = acc
                .checked_mul(v.as_i64().unwrap_or(1))
                .ok_or_else(Fault::overflow)?;
        }
        return Ok(Scalar::Int(acc));
    }
    Ok(Scalar::Float(numbers(values, "prod")?.iter().product()))
}

pub fn mean(values: &[Scalar]) -> Exec<Scalar> {
    let xs = numbers(values, "mean")?;
    if xs.is_empty() {
        return Ok(Scalar::Float(f64::NAN));
    }
    Ok(Scalar::Float(xs.iter().sum::<f64>() / xs.len() as f64))
}

pub fn var(values: &[Scalar], ddof: usize) -> Exec<Scalar> {
    let xs = numbers(values, "var")?;
    if xs.len() <= ddof {
        return Ok(Scalar::Float(f64::NAN));
    }
    let m = xs.iter().sum::<f64>() / xs.len() as f64;
    let ss: f64 = xs.iter().map(|x| (x - m) * (x - m)).sum();
    Ok(Scalar::Float(ss / (xs.len() - ddof) as f64))
}

pub fn std(values: &[Scalar], ddof: usize) -> Exec<Scalar> {
    Ok(match var(values, ddof)? {
        Scalar::Float(v) => Scalar::Float(v.sqrt()),
        other => other,
    })
}

/// Linear-interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[Scalar], q: f64) -> Exec<Scalar> {
    if !(0.0..=1.0).contains(&q) {
        return Err(Fault::value("percentiles should all be in the interval [0, 1]"));
    }
    let mut xs = numbers(values, "quantile")?;
    if xs.is_empty() {
        return Ok(Scalar::Float(f64::NAN));
    }
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q * (xs.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(Scalar::Float(xs[lo] + (xs[hi] - xs[lo]) * frac))
}

pub fn median(values: &[Scalar]) -> Exec<Scalar> {
    quantile(values, 0.5)
}

fn extreme(values: &[Scalar], want: Ordering, op: &str) -> Exec<Scalar> {
    let mut best: Option<&Scalar> = None;
    for v in values.iter().filter(|v| !v.is_missing()) {
        best = Some(match best {
            None => v,
            Some(b) => {
                if matches!(v, Scalar::Text(_)) != matches!(b, Scalar::Text(_)) {
                    return Err(Fault::type_error(format!(
                        "'{op}' not supported between instances of 'str' and numbers"
                    )));
                }
                if v.sort_cmp(b) == want {
                    v
                } else {
                    b
                }
            }
        });
    }
    Ok(best.cloned().unwrap_or(Scalar::Float(f64::NAN)))
}

pub fn min(values: &[Scalar]) -> Exec<Scalar> {
    extreme(values, Ordering::Less, "<")
}

pub fn max(values: &[Scalar]) -> Exec<Scalar> {
    extreme(values, Ordering::Greater, ">")
}

pub fn count(values: &[Scalar]) -> usize {
    values.iter().filter(|v| !v.is_missing()).count()
}

/// Distinct present values, in first-seen order.
pub fn unique(values: &[Scalar], keep_missing: bool) -> Vec<Scalar> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for v in values {
        if v.is_missing() && !keep_missing {
            continue;
        }
        if seen.insert(v.group_key()) {
            out.push(v.clone());
        }
    }
    out
}

pub fn nunique(values: &[Scalar]) -> usize {
    unique(values, false).len()
}

/// Position of the extreme present value (first on ties).
pub fn arg_extreme(values: &[Scalar], want: Ordering) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, v) in values.iter().enumerate() {
        if v.is_missing() {
            continue;
        }
        match best {
            None => best = Some(i),
            Some(b) if v.sort_cmp(&values[b]) == want => best = Some(i),
            Some(_) => {}
        }
    }
    best
}

/// Apply a named reduction.
pub fn aggregate(name: &str, values: &[Scalar]) -> Exec<Scalar> {
    match name {
        "sum" => sum(values),
        "mean" | "average" => mean(values),
        "median" => median(values),
        "min" => min(values),
        "max" => max(values),
        "count" => Ok(Scalar::Int(count(values) as i64)),
        "size" => Ok(Scalar::Int(values.len() as i64)),
        "nunique" => Ok(Scalar::Int(nunique(values) as i64)),
        "first" => Ok(values
            .iter()
            .find(|v| !v.is_missing())
            .cloned()
            .unwrap_or(Scalar::Null)),
        "last" => Ok(values
            .iter()
            .rev()
            .find(|v| !v.is_missing())
            .cloned()
            .unwrap_or(Scalar::Null)),
        "std" => std(values, 1),
        "var" => var(values, 1),
        "prod" => prod(values),
        other => Err(Fault::attribute("SeriesGroupBy", other)),
    }
}

/// Whether a reduction only makes sense on numeric columns.
pub fn is_numeric_only(name: &str) -> bool {
    matches!(name, "mean" | "average" | "median" | "std" | "var" | "prod")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(xs: &[i64]) -> Vec<Scalar> {
        xs.iter().map(|&x| Scalar::Int(x)).collect()
    }

    #[test]
    fn test_sum_keeps_integers() {
        assert_eq!(sum(&ints(&[10, 20, 30])).unwrap(), Scalar::Int(60));
        let mixed = vec![Scalar::Int(1), Scalar::Float(0.5), Scalar::Null];
        assert_eq!(sum(&mixed).unwrap(), Scalar::Float(1.5));
    }

    #[test]
    fn test_sum_overflow_is_fault() {
        let err = sum(&ints(&[i64::MAX, 1])).unwrap_err();
        assert_eq!(err.class, crate::sandbox::fault::FaultClass::OverflowError);
    }

    #[test]
    fn test_mean_median_std() {
        let xs = ints(&[1, 2, 3, 4]);
        assert_eq!(mean(&xs).unwrap(), Scalar::Float(2.5));
        assert_eq!(median(&xs).unwrap(), Scalar::Float(2.5));
        match std(&xs, 1).unwrap() {
            Scalar::Float(s) => assert!((s - 1.2909944).abs() < 1e-6),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn test_min_max_skip_missing() {
        let xs = vec![Scalar::Null, Scalar::Int(3), Scalar::Float(f64::NAN), Scalar::Int(-1)];
        assert_eq!(min(&xs).unwrap(), Scalar::Int(-1));
        assert_eq!(max(&xs).unwrap(), Scalar::Int(3));
    }

    #[test]
    fn test_mean_of_text_is_type_error() {
        let xs = vec![Scalar::from("a")];
        assert!(mean(&xs).is_err());
    }

    #[test]
    fn test_unknown_aggregation() {
        assert!(aggregate("mode", &ints(&[1])).is_err());
        assert_eq!(aggregate("size", &ints(&[1, 2])).unwrap(), Scalar::Int(2));
    }
}
