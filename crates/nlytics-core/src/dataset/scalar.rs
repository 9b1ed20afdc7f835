//! Cell values and column type inference.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell of a dataset column.
///
/// Serialized untagged so JSON datasets map naturally: `null`, booleans,
/// integers, floats and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// `true` for `Null` and for floating-point NaN (pandas missing-value semantics).
    pub fn is_missing(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Scalar::Bool(_) | Scalar::Int(_) | Scalar::Float(_))
    }

    /// Numeric view of the value; booleans count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Bool(b) => Some(i64::from(*b)),
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Null => DType::Empty,
            Scalar::Bool(_) => DType::Bool,
            Scalar::Int(_) => DType::Int,
            Scalar::Float(f) if f.is_nan() => DType::Empty,
            Scalar::Float(_) => DType::Float,
            Scalar::Text(_) => DType::Text,
        }
    }

    /// Equality used for lookups and de-duplication: numbers compare by value
    /// across int/float, missing values never equal anything.
    pub fn loose_eq(&self, other: &Scalar) -> bool {
        if self.is_missing() || other.is_missing() {
            return false;
        }
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }

    /// Total order for sorting: missing values last, numbers before text.
    pub fn sort_cmp(&self, other: &Scalar) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            (false, false) => {}
        }
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (Scalar::Text(_), _) => Ordering::Greater,
            (_, Scalar::Text(_)) => Ordering::Less,
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (a, b) => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
        }
    }

    /// Hashable form of [`Scalar::loose_eq`]: equal values share a key,
    /// missing values have none.
    pub fn lookup_key(&self) -> Option<LookupKey<'_>> {
        match self {
            Scalar::Null => None,
            Scalar::Text(s) => Some(LookupKey::Text(s)),
            Scalar::Int(i) => Some(LookupKey::Int(*i)),
            Scalar::Bool(b) => Some(LookupKey::Int(i64::from(*b))),
            Scalar::Float(f) if f.is_nan() => None,
            Scalar::Float(f) => Some(
                if f.fract() == 0.0 && *f >= -9.223_372_036_854_776e18 && *f < 9.223_372_036_854_776e18 {
                    LookupKey::Int(*f as i64)
                } else {
                    LookupKey::Float(f.to_bits())
                },
            ),
        }
    }

    /// Key used when grouping: values that are `loose_eq` share a key.
    pub fn group_key(&self) -> String {
        match self {
            Scalar::Null => "n:".to_string(),
            Scalar::Bool(b) => format!("b:{b}"),
            Scalar::Int(i) => format!("f:{}", *i as f64),
            Scalar::Float(f) => format!("f:{f}"),
            Scalar::Text(s) => format!("t:{s}"),
        }
    }
}

/// See [`Scalar::lookup_key`]. Integral floats fold into `Int`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupKey<'a> {
    Int(i64),
    Float(u64),
    Text(&'a str),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "None"),
            Scalar::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{}", format_float(*x)),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::Text(v)
    }
}

/// Render a float the way analysts expect to read it back: integral values
/// keep a trailing `.0`, non-finite values use `nan`/`inf`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Inferred column type, reported in the dataset manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    Bool,
    Int,
    Float,
    Text,
    Mixed,
    Empty,
}

impl DType {
    /// Infer the column type from its values, ignoring missing cells.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Scalar>) -> DType {
        let mut acc = DType::Empty;
        for v in values {
            let t = v.dtype();
            acc = match (acc, t) {
                (a, DType::Empty) => a,
                (DType::Empty, t) => t,
                (a, t) if a == t => a,
                (DType::Int, DType::Float) | (DType::Float, DType::Int) => DType::Float,
                _ => DType::Mixed,
            };
            if acc == DType::Mixed {
                break;
            }
        }
        acc
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, DType::Bool | DType::Int | DType::Float)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::Bool => "bool",
            DType::Int => "int64",
            DType::Float => "float64",
            DType::Text => "object",
            DType::Mixed => "mixed",
            DType::Empty => "empty",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_inference() {
        let ints = [Scalar::Int(1), Scalar::Null, Scalar::Int(3)];
        assert_eq!(DType::infer(&ints), DType::Int);

        let nums = [Scalar::Int(1), Scalar::Float(2.5)];
        assert_eq!(DType::infer(&nums), DType::Float);

        let mixed = [Scalar::Int(1), Scalar::Text("a".into())];
        assert_eq!(DType::infer(&mixed), DType::Mixed);

        assert_eq!(DType::infer(&[Scalar::Null]), DType::Empty);
    }

    #[test]
    fn test_sort_cmp_puts_missing_last() {
        let mut v = vec![
            Scalar::Float(f64::NAN),
            Scalar::Int(3),
            Scalar::Null,
            Scalar::Float(1.5),
        ];
        v.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(v[0], Scalar::Float(1.5));
        assert_eq!(v[1], Scalar::Int(3));
        assert!(v[2].is_missing() && v[3].is_missing());
    }

    #[test]
    fn test_loose_eq_across_numeric_types() {
        assert!(Scalar::Int(2).loose_eq(&Scalar::Float(2.0)));
        assert!(!Scalar::Null.loose_eq(&Scalar::Null));
        assert!(!Scalar::Text("2".into()).loose_eq(&Scalar::Int(2)));
    }

    #[test]
    fn test_lookup_key_agrees_with_loose_eq() {
        let values = [
            Scalar::Int(2),
            Scalar::Float(2.0),
            Scalar::Float(2.5),
            Scalar::Bool(true),
            Scalar::Int(1),
            Scalar::Text("2".into()),
            Scalar::Float(-0.0),
            Scalar::Int(0),
        ];
        for a in &values {
            for b in &values {
                assert_eq!(
                    a.lookup_key() == b.lookup_key(),
                    a.loose_eq(b),
                    "{a:?} vs {b:?}"
                );
            }
        }
        assert!(Scalar::Null.lookup_key().is_none());
        assert!(Scalar::Float(f64::NAN).lookup_key().is_none());
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(60.0), "60.0");
        assert_eq!(format_float(0.25), "0.25");
        assert_eq!(format_float(f64::NAN), "nan");
    }

    #[test]
    fn test_untagged_json_shapes() {
        let v: Vec<Scalar> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            v,
            vec![
                Scalar::Null,
                Scalar::Bool(true),
                Scalar::Int(3),
                Scalar::Float(2.5),
                Scalar::Text("x".into())
            ]
        );
    }
}
