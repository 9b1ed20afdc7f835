//! Faults raised while interpreting a program.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Python-style label of an interpretation fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultClass {
    KeyError,
    NameError,
    ZeroDivisionError,
    TypeError,
    ValueError,
    IndexError,
    AttributeError,
    OverflowError,
    RecursionError,
    DisallowedOperation,
    SyntaxError,
    Timeout,
    InternalError,
}

impl FaultClass {
    pub fn as_str(self) -> &'static str {
        match self {
            FaultClass::KeyError => "KeyError",
            FaultClass::NameError => "NameError",
            FaultClass::ZeroDivisionError => "ZeroDivisionError",
            FaultClass::TypeError => "TypeError",
            FaultClass::ValueError => "ValueError",
            FaultClass::IndexError => "IndexError",
            FaultClass::AttributeError => "AttributeError",
            FaultClass::OverflowError => "OverflowError",
            FaultClass::RecursionError => "RecursionError",
            FaultClass::DisallowedOperation => "DisallowedOperation",
            FaultClass::SyntaxError => "SyntaxError",
            FaultClass::Timeout => "Timeout",
            FaultClass::InternalError => "InternalError",
        }
    }
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified fault, tagged with the statement it escaped from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub class: FaultClass,
    pub message: String,
    pub line: Option<usize>,
    pub statement: Option<&'static str>,
}

/// Result of any interpreter step.
pub type Exec<T> = Result<T, Fault>;

impl Fault {
    pub fn new(class: FaultClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            line: None,
            statement: None,
        }
    }

    pub fn key(message: impl Into<String>) -> Self {
        Self::new(FaultClass::KeyError, message)
    }

    pub fn name(name: &str) -> Self {
        Self::new(
            FaultClass::NameError,
            format!("name '{name}' is not defined"),
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultClass::TypeError, message)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(FaultClass::ValueError, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(FaultClass::IndexError, message)
    }

    pub fn attribute(type_name: &str, attr: &str) -> Self {
        Self::new(
            FaultClass::AttributeError,
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FaultClass::ZeroDivisionError, message)
    }

    pub fn overflow() -> Self {
        Self::new(FaultClass::OverflowError, "integer overflow")
    }

    pub fn disallowed(message: impl Into<String>) -> Self {
        Self::new(FaultClass::DisallowedOperation, message)
    }

    pub fn too_large(limit: usize) -> Self {
        Self::new(
            FaultClass::ValueError,
            format!("collection exceeds the sandbox limit of {limit} items"),
        )
    }

    /// Attach the failing statement unless an inner statement already did.
    pub fn at(mut self, line: usize, statement: &'static str) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
            self.statement = Some(statement);
        }
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.class == FaultClass::Timeout
    }

    /// Diagnostic trace in a familiar traceback shape.
    pub fn trace(&self) -> String {
        let mut out = String::from("Traceback (sandbox):\n");
        if let Some(line) = self.line {
            out.push_str(&format!("  line {line}, in <program>"));
            if let Some(stmt) = self.statement {
                out.push_str(&format!(": {stmt}"));
            }
            out.push('\n');
        }
        out.push_str(&format!("{}: {}", self.class, self.message));
        out
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_innermost_location_wins() {
        let fault = Fault::name("x").at(3, "expression").at(1, "if");
        assert_eq!(fault.line, Some(3));
        assert_eq!(fault.statement, Some("expression"));
    }

    #[test]
    fn test_trace_shape() {
        let fault = Fault::zero_division("division by zero").at(2, "assignment");
        assert_eq!(
            fault.trace(),
            "Traceback (sandbox):\n  line 2, in <program>: assignment\nZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn test_name_error_message() {
        assert_eq!(
            Fault::name("undefined_variable").message,
            "name 'undefined_variable' is not defined"
        );
    }
}
