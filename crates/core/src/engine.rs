//! Validation engine.
//!
//! Runs rule sets against a [`Dataset`]. Every index any rule set declares
//! is built once per run; every rule then runs to completion and all of
//! their violations are collected. Nothing short-circuits, and the same
//! input always produces the same violations in the same order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::dataset::{Dataset, Domain};
use crate::index::{IndexSpec, Indices};
use crate::jurisdiction::JurisdictionTable;
use crate::rules::{RuleContext, RuleSet};
use crate::violation::ValidationResult;

/// Runs the generic catalog plus registered jurisdiction rules.
///
/// Cheap to clone; the jurisdiction table is shared and read-only.
#[derive(Debug, Clone)]
pub struct ValidationEngine {
    jurisdictions: Arc<JurisdictionTable>,
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationEngine {
    /// Engine with the standard Japan and Taiwan rules.
    pub fn new() -> Self {
        Self::with_jurisdictions(Arc::new(JurisdictionTable::standard()))
    }

    /// Engine with a caller-supplied table, e.g. [`JurisdictionTable::empty`].
    pub fn with_jurisdictions(jurisdictions: Arc<JurisdictionTable>) -> Self {
        Self { jurisdictions }
    }

    pub fn jurisdictions(&self) -> &JurisdictionTable {
        &self.jurisdictions
    }

    /// Apply `rule_sets` to `dataset`.
    ///
    /// Jurisdiction rules registered for each set's domain run after that
    /// set's generic rules. Succeeds iff no rule reports a violation.
    pub fn validate(&self, dataset: &Dataset, rule_sets: &[RuleSet]) -> ValidationResult {
        let started = Instant::now();

        let specs: Vec<IndexSpec> = rule_sets
            .iter()
            .flat_map(|set| set.indices.iter().copied())
            .collect();
        let indices = Indices::build(dataset, &specs);

        let mut violations = Vec::new();
        for set in rule_sets {
            let _span = tracing::debug_span!("rule_set", name = set.name, domain = %set.domain).entered();
            let ctx = RuleContext {
                domain: set.domain,
                dataset,
                indices: &indices,
            };

            for rule in &set.rules {
                let found = rule.evaluate(&ctx);
                if !found.is_empty() {
                    tracing::debug!(
                        rule_set = set.name,
                        rule = rule.name,
                        violations = found.len(),
                        "Rule reported violations",
                    );
                }
                violations.extend(found);
            }

            for rule in self.jurisdictions.rules_for_domain(set.domain) {
                let found = rule.evaluate(&ctx);
                if !found.is_empty() {
                    tracing::debug!(
                        rule_set = set.name,
                        market = rule.market(),
                        rule = rule.name(),
                        violations = found.len(),
                        "Jurisdiction rule reported violations",
                    );
                }
                violations.extend(found);
            }
        }

        let result = ValidationResult::from_violations(violations);
        tracing::info!(
            rule_sets = rule_sets.len(),
            records = dataset.record_count(),
            violations = result.len(),
            success = result.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Consistency validation complete",
        );
        result
    }

    /// Apply the standard catalog for `domain`.
    pub fn validate_domain(&self, dataset: &Dataset, domain: Domain) -> ValidationResult {
        self.validate(dataset, &[RuleSet::standard(domain)])
    }

    /// Validate each domain's dataset against its standard catalog and
    /// combine the results in domain order.
    pub fn validate_all(&self, datasets: &BTreeMap<Domain, Dataset>) -> ValidationResult {
        datasets
            .iter()
            .map(|(domain, dataset)| self.validate_domain(dataset, *domain))
            .fold(ValidationResult::passed(), ValidationResult::merge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::record;
    use crate::rules::inventory_data::INVENTORY;
    use crate::rules::position_data::{POSITIONS, SETTLEMENT_LADDERS};
    use serde_json::json;

    fn taiwan_relend() -> Dataset {
        Dataset::new().with_collection(
            INVENTORY,
            vec![record(&[
                ("securityId", json!("2330")),
                ("market", json!("TW")),
                ("calculationType", json!("FOR_LOAN")),
                ("businessDate", json!("2024-03-15")),
                ("availableQuantity", json!(1000)),
                ("isBorrowed", json!(true)),
            ])],
        )
    }

    #[test]
    fn empty_dataset_passes_every_domain() {
        let engine = ValidationEngine::new();
        for domain in Domain::ALL {
            let result = engine.validate_domain(&Dataset::new(), domain);
            assert!(result.success, "{domain} should pass on empty input");
            assert!(result.violations.is_empty());
        }
    }

    #[test]
    fn jurisdiction_rules_run_after_generic_rules() {
        let result = ValidationEngine::new().validate_domain(&taiwan_relend(), Domain::InventoryData);
        assert!(!result.success);
        assert_eq!(result.len(), 1);
        assert_eq!(result.violations[0].category, "Taiwan market rule violation");
    }

    #[test]
    fn empty_jurisdiction_table_disables_market_rules() {
        let engine = ValidationEngine::with_jurisdictions(Arc::new(JurisdictionTable::empty()));
        assert!(engine.validate_domain(&taiwan_relend(), Domain::InventoryData).success);
    }

    #[test]
    fn independent_rules_all_report() {
        let ds = Dataset::new()
            .with_collection(
                POSITIONS,
                vec![record(&[
                    ("positionId", json!("P-1")),
                    ("securityId", json!("7203")),
                    ("bookId", json!("B1")),
                    ("market", json!("JP")),
                    ("quantity", json!(100)),
                    ("positionType", json!("LONG")),
                    ("status", json!("BOGUS")),
                    ("positionDate", json!("2024-03-15")),
                ])],
            )
            .with_collection(
                SETTLEMENT_LADDERS,
                vec![record(&[
                    ("positionId", json!("P-404")),
                    ("settlementDate", json!("2024-03-18")),
                    ("buckets", json!([{ "bucket": "SD0", "receipts": 0, "deliveries": 0, "netSettlement": 0 }])),
                ])],
            );
        let result = ValidationEngine::new().validate_domain(&ds, Domain::PositionData);
        assert_eq!(result.len(), 2);
        assert_eq!(result.in_category("Position Consistency").count(), 1);
        assert_eq!(result.in_category("Settlement Ladder Consistency").count(), 1);
    }

    #[test]
    fn validation_is_idempotent() {
        let engine = ValidationEngine::new();
        let ds = taiwan_relend();
        assert_eq!(
            engine.validate_domain(&ds, Domain::InventoryData),
            engine.validate_domain(&ds, Domain::InventoryData),
        );
    }

    #[test]
    fn validate_all_merges_domains() {
        let mut datasets = BTreeMap::new();
        datasets.insert(Domain::MarketData, Dataset::new());
        datasets.insert(Domain::InventoryData, taiwan_relend());
        let result = ValidationEngine::new().validate_all(&datasets);
        assert!(!result.success);
        assert_eq!(result.len(), 1);
    }
}
