//! Merges the schema layer's outcome with consistency results.
//!
//! Schema conformance is checked elsewhere; all this module needs from it
//! is a success flag and a list of issues shaped like violations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::violation::{Layer, ValidationResult, Violation};

/// Category used for schema issues that arrive without one.
pub const SCHEMA_CATEGORY: &str = "Schema Validation";

/// One issue reported by the schema layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    #[serde(default)]
    pub category: Option<String>,
    pub message: String,
    /// JSON pointer or dotted path to the offending value.
    #[serde(default)]
    pub path: Option<String>,
}

/// The schema layer's verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaOutcome {
    pub success: bool,
    #[serde(default)]
    pub violations: Vec<SchemaIssue>,
}

impl SchemaOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            violations: Vec::new(),
        }
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        serde_json::from_value(value).map_err(|e| CoreError::MalformedSchemaResult(e.to_string()))
    }

    fn into_violations(self) -> impl Iterator<Item = Violation> {
        self.violations.into_iter().map(|issue| {
            let message = match issue.path {
                Some(path) if !path.is_empty() => format!("{path}: {}", issue.message),
                _ => issue.message,
            };
            Violation {
                layer: Layer::Schema,
                domain: None,
                category: issue.category.unwrap_or_else(|| SCHEMA_CATEGORY.to_string()),
                message,
                record: None,
            }
        })
    }
}

/// Combine an optional schema outcome with any number of consistency
/// results. Schema issues come first; nothing is de-duplicated.
///
/// Success requires the schema layer to have succeeded and every
/// consistency result to have succeeded.
pub fn aggregate(
    schema: Option<SchemaOutcome>,
    consistency: impl IntoIterator<Item = ValidationResult>,
) -> ValidationResult {
    let schema = schema.unwrap_or_else(SchemaOutcome::passed);
    let schema_result = ValidationResult {
        success: schema.success,
        violations: schema.into_violations().collect(),
    };

    consistency
        .into_iter()
        .fold(schema_result, ValidationResult::merge)
}
