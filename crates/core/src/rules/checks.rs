//! Reusable building blocks for domain rules.
//!
//! Value checks skip fields that are absent or unreadable: the shape rule
//! of each entity reports those once, so a malformed field does not fan out
//! into one violation per rule.

use crate::dataset::Record;
use crate::fields::{self, FieldError, FieldSpec};
use crate::index::LookupIndex;
use crate::tolerance::{approx_equal, Tolerance};
use crate::violation::{Check, Violation};

// ---------------------------------------------------------------------------
// Presence / shape
// ---------------------------------------------------------------------------

/// Report required fields that are absent and any declared field that is
/// present but unreadable as its kind.
pub fn field_shapes(check: Check<'_>, records: &[Record], specs: &[FieldSpec]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (index, record) in records.iter().enumerate() {
        for spec in specs {
            match fields::read_as(record, spec.name, spec.kind) {
                Ok(()) => {}
                Err(FieldError::Missing) if !spec.required => {}
                Err(err) => violations.push(check.field_error(index, record, spec.name, err)),
            }
        }
    }
    violations
}

/// [`field_shapes`] applied to every element of a nested sub-sequence.
/// The parent field itself must be readable; its absence is left to the
/// parent's own shape rule.
pub fn nested_field_shapes(
    check: Check<'_>,
    records: &[Record],
    parent_field: &str,
    specs: &[FieldSpec],
) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let Ok(children) = fields::records(record, parent_field) else {
            continue;
        };
        for (pos, child) in children.iter().enumerate() {
            for spec in specs {
                let err = match fields::read_as(child, spec.name, spec.kind) {
                    Ok(()) => continue,
                    Err(FieldError::Missing) if !spec.required => continue,
                    Err(err) => err,
                };
                let location = check.at(index, record);
                let message = match err {
                    FieldError::Missing => format!(
                        "{location} {parent_field}[{pos}] is missing required field '{}'",
                        spec.name
                    ),
                    FieldError::Invalid(kind) => format!(
                        "{location} {parent_field}[{pos}] has invalid field '{}' (expected {})",
                        spec.name,
                        kind.describe()
                    ),
                };
                violations.push(check.violation(index, record, message));
            }
        }
    }
    violations
}

/// Report records whose nested sub-sequence is present but empty.
pub fn non_empty_children(
    check: Check<'_>,
    index: usize,
    record: &Record,
    field: &str,
    what: &str,
) -> Option<Violation> {
    match record.get(field).and_then(|v| v.as_array()) {
        Some(items) if items.is_empty() => Some(check.violation(
            index,
            record,
            format!("{}: must have at least one {what}", check.at(index, record)),
        )),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Sign / range
// ---------------------------------------------------------------------------

pub fn positive(check: Check<'_>, index: usize, record: &Record, field: &str) -> Option<Violation> {
    let value = fields::number(record, field).ok()?;
    (value <= 0.0).then(|| {
        check.violation(
            index,
            record,
            format!("{}: {field} must be positive (got {value})", check.at(index, record)),
        )
    })
}

pub fn non_negative(
    check: Check<'_>,
    index: usize,
    record: &Record,
    field: &str,
) -> Option<Violation> {
    let value = fields::number(record, field).ok()?;
    (value < 0.0).then(|| {
        check.violation(
            index,
            record,
            format!("{}: {field} must not be negative (got {value})", check.at(index, record)),
        )
    })
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

pub fn member_of(
    check: Check<'_>,
    index: usize,
    record: &Record,
    field: &str,
    allowed: &[&str],
) -> Option<Violation> {
    let value = fields::text(record, field).ok()?;
    (!allowed.contains(&value)).then(|| {
        check.violation(
            index,
            record,
            format!(
                "{}: {field} '{value}' is not one of {}",
                check.at(index, record),
                allowed.join(", ")
            ),
        )
    })
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Whether the end of a date pair may equal its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    /// `start < end`
    Strict,
    /// `start <= end`
    Inclusive,
}

/// Compare two date fields. Skips silently unless both parse.
pub fn date_order(
    check: Check<'_>,
    index: usize,
    record: &Record,
    start_field: &str,
    end_field: &str,
    order: DateOrder,
) -> Option<Violation> {
    let start = fields::date(record, start_field).ok()?;
    let end = fields::date(record, end_field).ok()?;
    let holds = match order {
        DateOrder::Strict => start < end,
        DateOrder::Inclusive => start <= end,
    };
    let relation = match order {
        DateOrder::Strict => "before",
        DateOrder::Inclusive => "on or before",
    };
    (!holds).then(|| {
        check.violation(
            index,
            record,
            format!(
                "{}: {start_field} ({start}) must be {relation} {end_field} ({end})",
                check.at(index, record)
            ),
        )
    })
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

/// `derived == minuend - subtrahend` within `profile`.
pub fn derived_difference(
    check: Check<'_>,
    index: usize,
    record: &Record,
    derived: &str,
    minuend: &str,
    subtrahend: &str,
    profile: Tolerance,
) -> Option<Violation> {
    let actual = fields::number(record, derived).ok()?;
    let expected = fields::number(record, minuend).ok()? - fields::number(record, subtrahend).ok()?;
    (!approx_equal(actual, expected, profile)).then(|| {
        check.violation(
            index,
            record,
            format!(
                "{}: {derived} ({actual}) does not equal {minuend} - {subtrahend} ({expected})",
                check.at(index, record)
            ),
        )
    })
}

// ---------------------------------------------------------------------------
// Referential integrity
// ---------------------------------------------------------------------------

/// The foreign key in `field` must resolve in `index`.
pub fn reference(
    check: Check<'_>,
    index: usize,
    record: &Record,
    field: &str,
    target: &LookupIndex<'_>,
    target_name: &str,
) -> Option<Violation> {
    let id = fields::text(record, field).ok()?;
    (!target.contains(id)).then(|| {
        check.violation(
            index,
            record,
            format!(
                "{}: {field} references non-existent {target_name} '{id}'",
                check.at(index, record)
            ),
        )
    })
}

/// A hierarchical record may not name itself as its parent.
pub fn self_reference(
    check: Check<'_>,
    index: usize,
    record: &Record,
    id_field: &str,
    parent_field: &str,
) -> Option<Violation> {
    let id = fields::text(record, id_field).ok()?;
    let parent = fields::text(record, parent_field).ok()?;
    (id == parent).then(|| {
        check.violation(
            index,
            record,
            format!(
                "{}: {parent_field} must not reference itself ('{id}')",
                check.at(index, record)
            ),
        )
    })
}
