//! Violation and result types shared by every layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::{Domain, Record};
use crate::fields::{self, FieldError};

/// Which validation layer produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Schema,
    Consistency,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Consistency => "consistency",
        }
    }
}

/// Points at the offending record inside a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRef {
    pub collection: String,
    pub index: usize,
    /// The record's identifier, when it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{}[{}] ({key})", self.collection, self.index),
            None => write!(f, "{}[{}]", self.collection, self.index),
        }
    }
}

/// A single failed expectation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub layer: Layer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<RecordRef>,
}

impl Violation {
    pub fn consistency(
        domain: Domain,
        category: impl Into<String>,
        message: impl Into<String>,
        record: Option<RecordRef>,
    ) -> Self {
        Self {
            layer: Layer::Consistency,
            domain: Some(domain),
            category: category.into(),
            message: message.into(),
            record,
        }
    }

    /// `"<category>: <message>"`, the form downstream parsers key on.
    pub fn render(&self) -> String {
        format!("{}: {}", self.category, self.message)
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)
    }
}

/// Outcome of one or more validation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub violations: Vec<Violation>,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::passed()
    }
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            success: true,
            violations: Vec::new(),
        }
    }

    /// Success iff `violations` is empty.
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            success: violations.is_empty(),
            violations,
        }
    }

    /// Concatenate two results. No de-duplication; success requires both.
    pub fn merge(mut self, other: ValidationResult) -> Self {
        self.success = self.success && other.success;
        self.violations.extend(other.violations);
        self
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Violation> {
        self.violations.iter().filter(move |v| v.category == category)
    }

    /// Violation counts grouped by `(layer, category)`.
    pub fn summary(&self) -> BTreeMap<(Layer, String), usize> {
        let mut counts = BTreeMap::new();
        for v in &self.violations {
            *counts.entry((v.layer, v.category.clone())).or_insert(0) += 1;
        }
        counts
    }
}

// ---------------------------------------------------------------------------
// Check scope
// ---------------------------------------------------------------------------

/// Where a rule is looking: domain, category, collection, and which field
/// identifies a record for [`RecordRef::key`].
#[derive(Debug, Clone, Copy)]
pub struct Check<'a> {
    pub domain: Domain,
    pub category: &'static str,
    pub collection: &'a str,
    pub key_field: Option<&'static str>,
}

impl<'a> Check<'a> {
    pub fn new(domain: Domain, category: &'static str, collection: &'a str) -> Self {
        Self {
            domain,
            category,
            collection,
            key_field: None,
        }
    }

    pub fn keyed_by(mut self, field: &'static str) -> Self {
        self.key_field = Some(field);
        self
    }

    pub fn at(&self, index: usize, record: &Record) -> RecordRef {
        let key = self
            .key_field
            .and_then(|f| record.get(f))
            .map(fields::display_value)
            .filter(|k| !k.is_empty());
        RecordRef {
            collection: self.collection.to_string(),
            index,
            key,
        }
    }

    pub fn violation(&self, index: usize, record: &Record, message: impl Into<String>) -> Violation {
        Violation::consistency(self.domain, self.category, message, Some(self.at(index, record)))
    }

    /// A "missing field" or "invalid field" violation for `field`.
    pub fn field_error(
        &self,
        index: usize,
        record: &Record,
        field: &str,
        error: FieldError,
    ) -> Violation {
        let location = self.at(index, record);
        let message = match error {
            FieldError::Missing => format!("{location} is missing required field '{field}'"),
            FieldError::Invalid(kind) => format!(
                "{location} has invalid field '{field}' (expected {})",
                kind.describe()
            ),
        };
        Violation::consistency(self.domain, self.category, message, Some(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::record;
    use serde_json::json;

    fn sample(category: &str) -> Violation {
        Violation::consistency(Domain::MarketData, category, "bad", None)
    }

    #[test]
    fn render_prefixes_category() {
        assert_eq!(
            sample("Price Consistency").render(),
            "Price Consistency: bad"
        );
    }

    #[test]
    fn merge_concatenates_without_dedup() {
        let a = ValidationResult::from_violations(vec![sample("X")]);
        let b = ValidationResult::from_violations(vec![sample("X")]);
        let merged = a.merge(b);
        assert!(!merged.success);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_keeps_failed_flag_without_violations() {
        let failed = ValidationResult {
            success: false,
            violations: vec![],
        };
        let merged = ValidationResult::passed().merge(failed);
        assert!(!merged.success);
        assert!(merged.is_empty());
    }

    #[test]
    fn check_uses_key_field_for_reference() {
        let r = record(&[("positionId", json!("P-7"))]);
        let check = Check::new(Domain::PositionData, "Position Consistency", "positions")
            .keyed_by("positionId");
        let v = check.field_error(3, &r, "quantity", FieldError::Missing);
        assert_eq!(
            v.message,
            "positions[3] (P-7) is missing required field 'quantity'"
        );
        assert_eq!(v.record.unwrap().key.as_deref(), Some("P-7"));
    }

    #[test]
    fn summary_groups_by_layer_and_category() {
        let result = ValidationResult::from_violations(vec![sample("A"), sample("A"), sample("B")]);
        let summary = result.summary();
        assert_eq!(summary[&(Layer::Consistency, "A".to_string())], 2);
        assert_eq!(summary[&(Layer::Consistency, "B".to_string())], 1);
    }
}
