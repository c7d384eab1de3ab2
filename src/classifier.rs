//! Sensitivity classification by case-insensitive regular expressions.

use crate::models::Entry;
use regex::{Regex, RegexBuilder};
use tracing::warn;

/// Patterns used when the settings do not provide any.
pub const DEFAULT_SENSITIVE_PATTERNS: &[&str] =
    &["password", "token", "secret", "pwd", "api[-_ ]?key"];

/// A pattern that failed to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternError {
    pub pattern: String,
    pub message: String,
}

/// Decides whether an entry's value should be stored protected.
#[derive(Debug, Clone)]
pub struct SensitivityClassifier {
    patterns: Vec<Regex>,
    rejected: Vec<PatternError>,
}

impl Default for SensitivityClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_PATTERNS)
    }
}

impl SensitivityClassifier {
    /// Compile `patterns`; malformed ones are skipped and remembered.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut compiled = Vec::new();
        let mut rejected = Vec::new();

        for pattern in patterns {
            let pattern = pattern.as_ref();
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(re) => compiled.push(re),
                Err(e) => {
                    warn!(pattern, "skipping malformed sensitivity pattern");
                    rejected.push(PatternError {
                        pattern: pattern.to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }

        Self {
            patterns: compiled,
            rejected,
        }
    }

    /// Patterns that were skipped because they did not compile.
    pub fn rejected(&self) -> &[PatternError] {
        &self.rejected
    }

    pub fn matches(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        self.patterns.iter().any(|re| re.is_match(text))
    }

    pub fn is_sensitive_fields(&self, name: &str, kind: &str, description: Option<&str>) -> bool {
        self.matches(name) || self.matches(kind) || description.is_some_and(|d| self.matches(d))
    }

    pub fn is_sensitive(&self, entry: &Entry) -> bool {
        self.is_sensitive_fields(&entry.name, &entry.kind, entry.description.as_deref())
    }
}

/// Check a pattern list without building a classifier.
pub fn validate_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<PatternError> {
    SensitivityClassifier::new(patterns).rejected
}
