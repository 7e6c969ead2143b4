//! Identifier → record lookup indices, built once per validation run.

use std::collections::HashMap;

use crate::dataset::{Dataset, Record};
use crate::fields;

/// Read-only map from identifier to record.
///
/// Records without the identifier field are skipped; a presence rule
/// reports them. Later duplicates overwrite earlier ones.
#[derive(Debug, Default)]
pub struct LookupIndex<'a> {
    by_id: HashMap<String, &'a Record>,
}

impl<'a> LookupIndex<'a> {
    pub fn build(records: &'a [Record], id_field: &str) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        for record in records {
            if let Some(value) = record.get(id_field).filter(|_| fields::has(record, id_field)) {
                by_id.insert(fields::display_value(value), record);
            }
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a Record> {
        self.by_id.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Declares an index a rule set needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub collection: &'static str,
    pub id_field: &'static str,
}

impl IndexSpec {
    pub const fn new(name: &'static str, collection: &'static str, id_field: &'static str) -> Self {
        Self {
            name,
            collection,
            id_field,
        }
    }
}

/// All indices for one run, keyed by [`IndexSpec::name`].
#[derive(Debug, Default)]
pub struct Indices<'a> {
    by_name: HashMap<&'static str, LookupIndex<'a>>,
    empty: LookupIndex<'a>,
}

impl<'a> Indices<'a> {
    /// Build each distinct spec once.
    pub fn build(dataset: &'a Dataset, specs: &[IndexSpec]) -> Self {
        let mut by_name = HashMap::with_capacity(specs.len());
        for spec in specs {
            by_name
                .entry(spec.name)
                .or_insert_with(|| LookupIndex::build(dataset.collection(spec.collection), spec.id_field));
        }
        Self {
            by_name,
            empty: LookupIndex::default(),
        }
    }

    /// The named index, or an empty one when it was never declared.
    pub fn get(&self, name: &str) -> &LookupIndex<'a> {
        self.by_name.get(name).unwrap_or(&self.empty)
    }

    pub fn is_built(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }
}
