//! Dataset model: named collections of JSON records, one per domain.
//!
//! A [`Dataset`] is the unit of work for one validation run. Records are
//! plain `serde_json` objects; typed reads go through [`crate::fields`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// One record of a collection. Field order is preserved as received.
pub type Record = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

/// The five related datasets the gates cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Domain {
    MarketData,
    PositionData,
    CalculationData,
    ReferenceData,
    InventoryData,
}

impl Domain {
    /// All domains in canonical reporting order.
    pub const ALL: [Domain; 5] = [
        Domain::MarketData,
        Domain::PositionData,
        Domain::CalculationData,
        Domain::ReferenceData,
        Domain::InventoryData,
    ];

    /// Stable key matching serde's `rename_all = "camelCase"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "marketData",
            Self::PositionData => "positionData",
            Self::CalculationData => "calculationData",
            Self::ReferenceData => "referenceData",
            Self::InventoryData => "inventoryData",
        }
    }

    /// Human-readable label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MarketData => "Market Data",
            Self::PositionData => "Position Data",
            Self::CalculationData => "Calculation Data",
            Self::ReferenceData => "Reference Data",
            Self::InventoryData => "Inventory Data",
        }
    }

    /// Parse a domain key as it appears in input documents.
    pub fn parse(key: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == key)
            .ok_or_else(|| CoreError::UnknownDomain(key.to_string()))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// Mapping from collection name to an ordered sequence of records.
///
/// Absent collections read as empty, so rules never need to distinguish
/// "not supplied" from "supplied with no records".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Dataset {
    collections: BTreeMap<String, Vec<Record>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests and fixtures.
    pub fn with_collection(mut self, name: impl Into<String>, records: Vec<Record>) -> Self {
        self.insert(name, records);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, records: Vec<Record>) {
        self.collections.insert(name.into(), records);
    }

    /// Records of `name`, or an empty slice when the collection is absent.
    pub fn collection(&self, name: &str) -> &[Record] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of records across all collections.
    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    /// Interpret a JSON object of arrays of objects as a dataset.
    ///
    /// Anything else is a precondition failure: the engine must never be
    /// handed a value it cannot read as collections of records.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let object = value.as_object().ok_or_else(|| {
            CoreError::MalformedDataset("dataset must be a JSON object of collections".into())
        })?;

        let mut dataset = Dataset::new();
        for (name, collection) in object {
            let items = collection.as_array().ok_or_else(|| {
                CoreError::MalformedDataset(format!("collection '{name}' must be an array"))
            })?;
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                match item {
                    Value::Object(map) => records.push(map.clone()),
                    _ => {
                        return Err(CoreError::MalformedRecord {
                            collection: name.clone(),
                            index,
                        })
                    }
                }
            }
            dataset.insert(name.clone(), records);
        }
        Ok(dataset)
    }
}

/// Build a record from `(field, value)` pairs.
pub fn record(pairs: &[(&str, Value)]) -> Record {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn absent_collection_reads_empty() {
        let ds = Dataset::new();
        assert!(ds.collection("positions").is_empty());
        assert!(ds.is_empty());
    }

    #[test]
    fn from_value_preserves_record_order() {
        let ds = Dataset::from_value(&json!({
            "positions": [{"positionId": "P-1"}, {"positionId": "P-2"}]
        }))
        .unwrap();
        let ids: Vec<_> = ds
            .collection("positions")
            .iter()
            .map(|r| r["positionId"].as_str().unwrap())
            .collect();
        assert_eq!(ids, ["P-1", "P-2"]);
        assert_eq!(ds.record_count(), 2);
    }

    #[test]
    fn from_value_rejects_non_object_root() {
        assert_matches!(
            Dataset::from_value(&json!([1, 2])),
            Err(CoreError::MalformedDataset(_))
        );
    }

    #[test]
    fn from_value_rejects_non_array_collection() {
        assert_matches!(
            Dataset::from_value(&json!({"positions": {"positionId": "P-1"}})),
            Err(CoreError::MalformedDataset(_))
        );
    }

    #[test]
    fn from_value_rejects_scalar_record() {
        assert_matches!(
            Dataset::from_value(&json!({"positions": [{"positionId": "P-1"}, 7]})),
            Err(CoreError::MalformedRecord { index: 1, .. })
        );
    }

    #[test]
    fn domain_keys_round_trip() {
        for domain in Domain::ALL {
            assert_eq!(Domain::parse(domain.as_str()).unwrap(), domain);
        }
        assert_matches!(Domain::parse("tradeData"), Err(CoreError::UnknownDomain(_)));
    }
}
