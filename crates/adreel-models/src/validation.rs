//! Field-level validation errors.
//!
//! Every mutation passes through schema validation before persistence.
//! Failures enumerate exactly which fields are wrong and why, so the
//! caller can surface them verbatim.

use serde::Serialize;
use thiserror::Error;

/// A single field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    /// Dotted path to the offending field (e.g. `scenes[2].duration`).
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

/// Validation failure carrying per-field detail.
#[derive(Debug, Clone, Error, Serialize)]
#[error("validation failed: {}", self.summary())]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    /// Build from a single violation.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation {
                field: field.into(),
                message: message.into(),
            }],
        }
    }

    fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|v| format!("{}: {}", v.field, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl From<validator::ValidationErrors> for ValidationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut violations = Vec::new();
        for (field, kind_errors) in errors.field_errors() {
            for e in kind_errors {
                let message = e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                violations.push(FieldViolation {
                    field: field.to_string(),
                    message,
                });
            }
        }
        // Struct-level errors carry no field path
        if violations.is_empty() {
            violations.push(FieldViolation {
                field: "request".to_string(),
                message: errors.to_string(),
            });
        }
        Self { violations }
    }
}

/// Accumulator for collecting violations across a whole document.
#[derive(Debug, Default)]
pub struct Violations {
    violations: Vec<FieldViolation>,
}

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record a violation when `ok` is false.
    pub fn check(&mut self, ok: bool, field: impl Into<String>, message: impl Into<String>) {
        if !ok {
            self.push(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Convert into a result: `Ok(())` when nothing was recorded.
    pub fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }
}

/// Check that a version string is present and non-empty.
///
/// Consumers treat an unknown or missing version as a hard failure,
/// never a silent default.
pub fn require_version(violations: &mut Violations, version: &str) {
    violations.check(!version.trim().is_empty(), "version", "must be non-empty");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_violations_is_ok() {
        assert!(Violations::new().finish().is_ok());
    }

    #[test]
    fn test_derived_errors_map_to_field_violations() {
        use validator::Validate;

        #[derive(Validate)]
        struct Form {
            #[validate(length(min = 1, message = "must be non-empty"))]
            name: String,
            #[validate(url(message = "must be a valid URL"))]
            link: String,
        }

        let form = Form {
            name: String::new(),
            link: "not a url".to_string(),
        };
        let err = ValidationError::from(form.validate().unwrap_err());
        assert_eq!(err.violations.len(), 2);
        let fields: Vec<&str> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"link"));
    }

    #[test]
    fn test_violations_collect_fields() {
        let mut v = Violations::new();
        v.push("title", "must be non-empty");
        v.check(false, "scenes", "must not be empty");
        v.check(true, "format", "ignored");
        let err = v.finish().unwrap_err();
        assert_eq!(err.violations.len(), 2);
        assert_eq!(err.violations[0].field, "title");
        assert!(err.to_string().contains("scenes"));
    }
}
