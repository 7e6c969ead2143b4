//! Composite keys and duplicate detection.

use std::collections::HashMap;
use std::fmt;

use crate::dataset::Record;
use crate::fields::{self, FieldError};
use crate::violation::{Check, Violation};

/// Canonical key built from an ordered tuple of field values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey(Vec<String>);

impl CompositeKey {
    /// Build the key for `record`, or return the first missing key field.
    pub fn build<'f>(record: &Record, key_fields: &[&'f str]) -> Result<Self, &'f str> {
        key_fields
            .iter()
            .map(|&field| match record.get(field) {
                Some(v) if fields::has(record, field) => Ok(fields::display_value(v)),
                _ => Err(field),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(CompositeKey)
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("|"))
    }
}

/// One violation per second-and-later occurrence of a key, plus one
/// "missing field" violation per record lacking a key field. Records
/// without a complete key take no part in duplicate tracking.
pub fn find_duplicates(
    check: Check<'_>,
    records: &[Record],
    key_fields: &[&str],
    entity: &str,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut first_seen: HashMap<CompositeKey, usize> = HashMap::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        let key = match CompositeKey::build(record, key_fields) {
            Ok(key) => key,
            Err(field) => {
                violations.push(check.field_error(index, record, field, FieldError::Missing));
                continue;
            }
        };

        if let Some(&first) = first_seen.get(&key) {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "Duplicate {entity} {} at {}[{index}] (first seen at index {first})",
                    describe_key(key_fields, &key),
                    check.collection,
                ),
            ));
        } else {
            first_seen.insert(key, index);
        }
    }

    violations
}

fn describe_key(key_fields: &[&str], key: &CompositeKey) -> String {
    let pairs: Vec<String> = key_fields
        .iter()
        .zip(key.parts())
        .map(|(f, v)| format!("{f}={v}"))
        .collect();
    format!("({})", pairs.join(", "))
}
