//! Programs received from the code producer.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Externally produced program text that must assign its result to
/// `result_name`. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedProgram {
    pub code: String,
    pub result_name: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub declared_variables: Vec<String>,
}

impl GeneratedProgram {
    pub fn new(code: impl Into<String>, result_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            result_name: result_name.into(),
            explanation: String::new(),
            declared_variables: Vec::new(),
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = explanation.into();
        self
    }

    /// SHA-256 hex digest of the program text, for audit records.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.code.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_stable_and_text_sensitive() {
        let a = GeneratedProgram::new("result = 1", "result");
        let b = GeneratedProgram::new("result = 1", "result").with_explanation("one");
        let c = GeneratedProgram::new("result = 2", "result");
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
