//! Reading input documents from disk.
//!
//! An input document maps domain keys to datasets:
//!
//! ```json
//! { "marketData": { "prices": [ ... ], "fxRates": [ ... ] },
//!   "inventoryData": { "inventory": [ ... ] } }
//! ```
//!
//! Domains that are absent are not validated.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use invgate_core::{CoreError, Dataset, Domain, SchemaOutcome};
use serde_json::Value;

/// Built-in document used when no `--input` is given.
pub const SAMPLE_DOCUMENT: &str = include_str!("../fixtures/sample.json");

/// Split a parsed document into one dataset per domain.
pub fn parse_document(value: &Value) -> Result<BTreeMap<Domain, Dataset>, CoreError> {
    let object = value.as_object().ok_or_else(|| {
        CoreError::MalformedDataset("input document must be a JSON object keyed by domain".into())
    })?;

    object
        .iter()
        .map(|(key, body)| -> Result<(Domain, Dataset), CoreError> {
            let domain = Domain::parse(key)?;
            let dataset = Dataset::from_value(body)?;
            Ok((domain, dataset))
        })
        .collect()
}

/// Load the document at `path`, or the built-in sample when `None`.
pub fn load_document(path: Option<&Path>) -> anyhow::Result<BTreeMap<Domain, Dataset>> {
    let (text, source) = match path {
        Some(path) => (
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read input file {}", path.display()))?,
            path.display().to_string(),
        ),
        None => (SAMPLE_DOCUMENT.to_string(), "built-in sample".to_string()),
    };

    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Input from {source} is not valid JSON"))?;
    let datasets =
        parse_document(&value).with_context(|| format!("Input from {source} is not a valid dataset"))?;

    tracing::info!(
        source = %source,
        domains = datasets.len(),
        records = datasets.values().map(Dataset::record_count).sum::<usize>(),
        "Loaded input document",
    );
    Ok(datasets)
}

/// Load a schema-layer outcome `{success, violations: [...]}`.
pub fn load_schema_result(path: &Path) -> anyhow::Result<SchemaOutcome> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema result {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("Schema result {} is not valid JSON", path.display()))?;
    let outcome = SchemaOutcome::from_value(value)?;

    tracing::info!(
        path = %path.display(),
        success = outcome.success,
        issues = outcome.violations.len(),
        "Loaded schema result",
    );
    Ok(outcome)
}
