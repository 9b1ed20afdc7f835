//! Execution outcome and the typed result value handed downstream.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::dataset::{DataFrame, Series};

use super::fault::Fault;
use super::value::Value;

/// Executor-originated failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    RuntimeFault,
    TimeoutFault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: FaultKind,
    /// Python-style class label, e.g. `KeyError`.
    pub class: String,
    pub message: String,
    pub trace: Option<String>,
    pub line: Option<usize>,
}

impl ExecutionError {
    pub fn from_fault(fault: &Fault) -> Self {
        let kind = if fault.is_timeout() {
            FaultKind::TimeoutFault
        } else {
            FaultKind::RuntimeFault
        };
        Self {
            kind,
            class: fault.class.to_string(),
            message: fault.message.clone(),
            trace: Some(fault.trace()),
            line: fault.line,
        }
    }
}

/// A scalar result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Admissible result shapes. The executor passes these through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ResultValue {
    TabularFrame(DataFrame),
    LabeledSequence(Series),
    Scalar(ScalarValue),
    Mapping(IndexMap<String, ResultValue>),
    Sequence(Vec<ResultValue>),
    Empty,
}

impl ResultValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResultValue::TabularFrame(_) => "tabular_frame",
            ResultValue::LabeledSequence(_) => "labeled_sequence",
            ResultValue::Scalar(_) => "scalar",
            ResultValue::Mapping(_) => "mapping",
            ResultValue::Sequence(_) => "sequence",
            ResultValue::Empty => "empty",
        }
    }

    /// Numeric view of a scalar result.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ResultValue::Scalar(ScalarValue::Int(i)) => Some(*i as f64),
            ResultValue::Scalar(ScalarValue::Float(f)) => Some(*f),
            ResultValue::Scalar(ScalarValue::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&DataFrame> {
        match self {
            ResultValue::TabularFrame(df) => Some(df),
            _ => None,
        }
    }

    pub fn as_series(&self) -> Option<&Series> {
        match self {
            ResultValue::LabeledSequence(s) => Some(s),
            _ => None,
        }
    }

    /// Convert an interpreter value. Values with no data shape (functions,
    /// modules, accessors) are passed on as their text form.
    pub(crate) fn from_value(value: Value) -> Self {
        match value {
            Value::None => ResultValue::Empty,
            Value::Bool(b) => ResultValue::Scalar(ScalarValue::Bool(b)),
            Value::Int(i) => ResultValue::Scalar(ScalarValue::Int(i)),
            Value::Float(f) => ResultValue::Scalar(ScalarValue::Float(f)),
            Value::Str(s) => ResultValue::Scalar(ScalarValue::Text(s)),
            Value::List(items) | Value::Tuple(items) => {
                ResultValue::Sequence(items.into_iter().map(Self::from_value).collect())
            }
            Value::Set(keys) => ResultValue::Sequence(
                keys.iter()
                    .map(|k| Self::from_value(k.to_value()))
                    .collect(),
            ),
            Value::Dict(map) => ResultValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k.to_value().to_str(), Self::from_value(v)))
                    .collect(),
            ),
            Value::Frame(df) => ResultValue::TabularFrame(df),
            Value::Series(s) => ResultValue::LabeledSequence(s),
            other => ResultValue::Scalar(ScalarValue::Text(other.to_str())),
        }
    }
}

/// Structured result of one sandboxed execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: Option<ResultValue>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub error: Option<ExecutionError>,
}

impl ExecutionOutcome {
    pub fn succeeded(result: ResultValue, stdout: String, stderr: String, duration_ms: u64) -> Self {
        Self {
            success: true,
            result: Some(result),
            stdout,
            stderr,
            duration_ms,
            error: None,
        }
    }

    pub fn failed(error: ExecutionError, stdout: String, stderr: String, duration_ms: u64) -> Self {
        Self {
            success: false,
            result: None,
            stdout,
            stderr,
            duration_ms,
            error: Some(error),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == FaultKind::TimeoutFault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Scalar;
    use crate::sandbox::fault::FaultClass;

    #[test]
    fn test_none_maps_to_empty() {
        assert_eq!(ResultValue::from_value(Value::None), ResultValue::Empty);
    }

    #[test]
    fn test_dict_maps_to_mapping_with_string_keys() {
        let mut map = IndexMap::new();
        map.insert(
            crate::sandbox::value::Key::Int(1),
            Value::Str("a".into()),
        );
        let rv = ResultValue::from_value(Value::Dict(map));
        match rv {
            ResultValue::Mapping(m) => {
                assert_eq!(m["1"], ResultValue::Scalar(ScalarValue::Text("a".into())));
            }
            other => panic!("expected mapping, got {:?}", other),
        }
    }

    #[test]
    fn test_series_passes_through() {
        let s = Series::new(Some("x".into()), vec![Scalar::Int(1)]);
        let rv = ResultValue::from_value(Value::Series(s.clone()));
        assert_eq!(rv.as_series(), Some(&s));
    }

    #[test]
    fn test_timeout_fault_kind() {
        let fault = Fault::new(FaultClass::Timeout, "Execution timeout after 10 ms");
        let err = ExecutionError::from_fault(&fault);
        assert_eq!(err.kind, FaultKind::TimeoutFault);
        let outcome = ExecutionOutcome::failed(err, String::new(), String::new(), 10);
        assert!(outcome.is_timeout());
        assert!(outcome.result.is_none());
    }

    #[test]
    fn test_result_serializes_tagged() {
        let json = serde_json::to_value(ResultValue::Scalar(ScalarValue::Int(60))).unwrap();
        assert_eq!(json, serde_json::json!({"type": "scalar", "value": 60}));
    }
}
