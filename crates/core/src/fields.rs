//! Typed field access over JSON records.
//!
//! Every accessor distinguishes an absent field from one that is present
//! but cannot be read as the requested kind, so rules can report the two
//! cases differently.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde_json::Value;

use crate::dataset::Record;

/// Date format used by all upstream feeds.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Why a field could not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// Absent, `null`, or an empty string.
    Missing,
    /// Present but not readable as the expected kind.
    Invalid(FieldKind),
}

/// The value kinds records carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Bool,
    Date,
    Timestamp,
    Records,
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Bool => "boolean",
            Self::Date => "date (YYYY-MM-DD)",
            Self::Timestamp => "RFC 3339 timestamp",
            Self::Records => "list of records",
        }
    }
}

fn present<'a>(record: &'a Record, field: &str) -> Result<&'a Value, FieldError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(FieldError::Missing),
        Some(Value::String(s)) if s.trim().is_empty() => Err(FieldError::Missing),
        Some(v) => Ok(v),
    }
}

/// `true` when the field holds a non-null, non-empty value.
pub fn has(record: &Record, field: &str) -> bool {
    present(record, field).is_ok()
}

pub fn text<'a>(record: &'a Record, field: &str) -> Result<&'a str, FieldError> {
    present(record, field)?
        .as_str()
        .ok_or(FieldError::Invalid(FieldKind::Text))
}

/// Signed decimal quantity. Numeric strings are accepted since some feeds
/// ship decimals as text to avoid precision loss.
pub fn number(record: &Record, field: &str) -> Result<f64, FieldError> {
    let invalid = FieldError::Invalid(FieldKind::Number);
    match present(record, field)? {
        Value::Number(n) => n.as_f64().ok_or(invalid),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).ok_or(invalid),
        _ => Err(invalid),
    }
}

pub fn integer(record: &Record, field: &str) -> Result<i64, FieldError> {
    let invalid = FieldError::Invalid(FieldKind::Integer);
    match present(record, field)? {
        Value::Number(n) => n.as_i64().ok_or(invalid),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid),
        _ => Err(invalid),
    }
}

pub fn boolean(record: &Record, field: &str) -> Result<bool, FieldError> {
    present(record, field)?
        .as_bool()
        .ok_or(FieldError::Invalid(FieldKind::Bool))
}

/// Optional flag: absent reads as `false`.
pub fn flag(record: &Record, field: &str) -> bool {
    matches!(boolean(record, field), Ok(true))
}

pub fn date(record: &Record, field: &str) -> Result<NaiveDate, FieldError> {
    let raw = text(record, field).map_err(|e| match e {
        FieldError::Missing => FieldError::Missing,
        FieldError::Invalid(_) => FieldError::Invalid(FieldKind::Date),
    })?;
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| FieldError::Invalid(FieldKind::Date))
}

pub fn timestamp(record: &Record, field: &str) -> Result<DateTime<FixedOffset>, FieldError> {
    let raw = text(record, field).map_err(|e| match e {
        FieldError::Missing => FieldError::Missing,
        FieldError::Invalid(_) => FieldError::Invalid(FieldKind::Timestamp),
    })?;
    DateTime::parse_from_rfc3339(raw.trim()).map_err(|_| FieldError::Invalid(FieldKind::Timestamp))
}

/// Nested sub-sequence of records. Every element must be an object.
pub fn records<'a>(record: &'a Record, field: &str) -> Result<Vec<&'a Record>, FieldError> {
    let invalid = FieldError::Invalid(FieldKind::Records);
    let items = present(record, field)?.as_array().ok_or(invalid)?;
    items.iter().map(|v| v.as_object().ok_or(invalid)).collect()
}

/// Check that a field can be read as `kind`.
pub fn read_as(record: &Record, field: &str, kind: FieldKind) -> Result<(), FieldError> {
    match kind {
        FieldKind::Text => text(record, field).map(drop),
        FieldKind::Number => number(record, field).map(drop),
        FieldKind::Integer => integer(record, field).map(drop),
        FieldKind::Bool => boolean(record, field).map(drop),
        FieldKind::Date => date(record, field).map(drop),
        FieldKind::Timestamp => timestamp(record, field).map(drop),
        FieldKind::Records => records(record, field).map(drop),
    }
}

/// Canonical text of a scalar value, used for keys and messages.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Declared shape of one field of an entity.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Required fields are reported when absent. Optional fields, and key
    /// fields (whose absence the duplicate-key rule reports), are only
    /// checked for readability when present.
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }
}
