//! Calculation data rules: rule definitions, versions, results, limits.

use std::collections::HashMap;

use super::checks::{self, field_shapes, nested_field_shapes, DateOrder};
use super::{Rule, RuleContext, RuleSet};
use crate::dataset::{Domain, Record};
use crate::fields::{self, FieldKind, FieldSpec};
use crate::index::IndexSpec;
use crate::keys::find_duplicates;
use crate::tolerance::Tolerance;
use crate::violation::{Check, Violation};

pub const CALCULATION_RULES: &str = "calculationRules";
pub const CALCULATION_RESULTS: &str = "calculationResults";
pub const LIMITS: &str = "limits";

pub const CATEGORY_RULE: &str = "Calculation Rule Consistency";
pub const CATEGORY_RULE_VERSION: &str = "Calculation Rule Versioning";
pub const CATEGORY_RESULT: &str = "Calculation Result Consistency";
pub const CATEGORY_LIMIT: &str = "Limit Consistency";

/// Rules by `ruleId`. With several versions per id the index keeps the
/// last one listed.
pub const RULE_INDEX: IndexSpec = IndexSpec::new("calculationRules", CALCULATION_RULES, "ruleId");

// ---------------------------------------------------------------------------
// Closed sets
// ---------------------------------------------------------------------------

pub const VALID_RULE_STATUSES: &[&str] = &["ACTIVE", "INACTIVE", "DRAFT"];
pub const VALID_OPERATORS: &[&str] = &["EQ", "NE", "GT", "GTE", "LT", "LTE", "IN", "NOT_IN"];
pub const VALID_ACTION_TYPES: &[&str] = &["INCLUDE", "EXCLUDE", "ADJUST", "CAP"];
pub const VALID_LIMIT_TYPES: &[&str] = &["GROSS", "NET", "CONCENTRATION", "SINGLE_NAME"];

pub const CALC_TYPE_FOR_LOAN: &str = "FOR_LOAN";
pub const CALC_TYPE_FOR_SHORT_SALE: &str = "FOR_SHORT_SALE";
pub const CALC_TYPE_FOR_PLEDGE: &str = "FOR_PLEDGE";
pub const VALID_CALCULATION_TYPES: &[&str] =
    &[CALC_TYPE_FOR_LOAN, CALC_TYPE_FOR_SHORT_SALE, CALC_TYPE_FOR_PLEDGE];

const RULE_KEY: &[&str] = &["ruleId", "version"];
const RESULT_KEY: &[&str] = &["calculationId"];
const LIMIT_KEY: &[&str] = &["limitId"];

const RULE_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("version", FieldKind::Integer),
    FieldSpec::optional("name", FieldKind::Text),
    FieldSpec::required("status", FieldKind::Text),
    FieldSpec::required("effectiveDate", FieldKind::Date),
    FieldSpec::optional("expiryDate", FieldKind::Date),
    FieldSpec::optional("conditions", FieldKind::Records),
    FieldSpec::optional("actions", FieldKind::Records),
];

const CONDITION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("field", FieldKind::Text),
    FieldSpec::required("operator", FieldKind::Text),
];

const ACTION_FIELDS: &[FieldSpec] = &[FieldSpec::required("actionType", FieldKind::Text)];

const RESULT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("ruleId", FieldKind::Text),
    FieldSpec::required("securityId", FieldKind::Text),
    FieldSpec::required("calculationType", FieldKind::Text),
    FieldSpec::required("quantityBefore", FieldKind::Number),
    FieldSpec::required("quantityAfter", FieldKind::Number),
    FieldSpec::required("quantityChange", FieldKind::Number),
    FieldSpec::required("businessDate", FieldKind::Date),
];

const LIMIT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("limitType", FieldKind::Text),
    FieldSpec::required("limitValue", FieldKind::Number),
    FieldSpec::optional("aggregationUnitId", FieldKind::Text),
];

pub fn rule_set() -> RuleSet {
    RuleSet {
        domain: Domain::CalculationData,
        name: "calculation-data",
        indices: vec![RULE_INDEX],
        rules: vec![
            Rule::new("rule_duplicate_keys", rule_duplicate_keys),
            Rule::new("rule_fields", rule_fields),
            Rule::new("rule_enumerations", rule_enumerations),
            Rule::new("rule_effective_before_expiry", rule_effective_before_expiry),
            Rule::new("rule_sequential_versions", rule_sequential_versions),
            Rule::new("result_duplicate_keys", result_duplicate_keys),
            Rule::new("result_fields", result_fields),
            Rule::new("result_rule_reference", result_rule_reference),
            Rule::new("result_calculation_type", result_calculation_type),
            Rule::new("result_quantity_change", result_quantity_change),
            Rule::new("result_within_rule_expiry", result_within_rule_expiry),
            Rule::new("limit_duplicate_keys", limit_duplicate_keys),
            Rule::new("limit_fields", limit_fields),
            Rule::new("limit_values", limit_values),
        ],
    }
}

fn rule_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_RULE, CALCULATION_RULES).keyed_by("ruleId")
}

fn result_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_RESULT, CALCULATION_RESULTS).keyed_by("calculationId")
}

fn limit_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_LIMIT, LIMITS).keyed_by("limitId")
}

// ---------------------------------------------------------------------------
// Calculation rules
// ---------------------------------------------------------------------------

fn rule_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        rule_check(ctx),
        ctx.dataset.collection(CALCULATION_RULES),
        RULE_KEY,
        "calculation rule version",
    )
}

fn rule_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = rule_check(ctx);
    let rules = ctx.dataset.collection(CALCULATION_RULES);
    let mut violations = field_shapes(check, rules, RULE_FIELDS);
    violations.extend(nested_field_shapes(check, rules, "conditions", CONDITION_FIELDS));
    violations.extend(nested_field_shapes(check, rules, "actions", ACTION_FIELDS));
    violations
}

/// Status, condition operators and action types must be known codes.
fn rule_enumerations(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = rule_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(CALCULATION_RULES).iter().enumerate() {
        violations.extend(checks::member_of(check, index, record, "status", VALID_RULE_STATUSES));
        violations.extend(nested_members(check, index, record, "conditions", "operator", VALID_OPERATORS));
        violations.extend(nested_members(check, index, record, "actions", "actionType", VALID_ACTION_TYPES));
    }
    violations
}

fn nested_members(
    check: Check<'_>,
    index: usize,
    record: &Record,
    parent_field: &str,
    field: &str,
    allowed: &[&str],
) -> Vec<Violation> {
    let Ok(children) = fields::records(record, parent_field) else {
        return Vec::new();
    };
    let location = check.at(index, record);
    children
        .iter()
        .enumerate()
        .filter_map(|(pos, child)| {
            let value = fields::text(child, field).ok()?;
            (!allowed.contains(&value)).then(|| {
                check.violation(
                    index,
                    record,
                    format!(
                        "{location}: {parent_field}[{pos}] {field} '{value}' is not one of {}",
                        allowed.join(", ")
                    ),
                )
            })
        })
        .collect()
}

fn rule_effective_before_expiry(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = rule_check(ctx);
    ctx.dataset
        .collection(CALCULATION_RULES)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::date_order(check, i, r, "effectiveDate", "expiryDate", DateOrder::Strict))
        .collect()
}

/// Each rule's versions, sorted ascending, must be exactly `1..=N`.
///
/// One violation per rule id, attached to its first record. A rule with
/// any missing or non-integer version is left to the shape and key rules.
fn rule_sequential_versions(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = Check::new(ctx.domain, CATEGORY_RULE_VERSION, CALCULATION_RULES).keyed_by("ruleId");
    let records = ctx.dataset.collection(CALCULATION_RULES);

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, (usize, Option<Vec<i64>>)> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        let Ok(rule_id) = fields::text(record, "ruleId") else {
            continue;
        };
        let entry = groups.entry(rule_id).or_insert_with(|| {
            order.push(rule_id);
            (index, Some(Vec::new()))
        });
        match (fields::integer(record, "version").ok(), &mut entry.1) {
            (Some(version), Some(versions)) => versions.push(version),
            (_, slot) => *slot = None,
        }
    }

    let mut violations = Vec::new();
    for rule_id in order {
        let (first_index, versions) = &groups[rule_id];
        let Some(versions) = versions else {
            continue;
        };
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        let sequential = sorted.iter().zip(1_i64..).all(|(v, expected)| *v == expected);
        if !sequential {
            let record = &records[*first_index];
            violations.push(check.violation(
                *first_index,
                record,
                format!(
                    "rule '{rule_id}' versions {sorted:?} are not sequential from 1 (expected 1..={})",
                    sorted.len()
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Calculation results
// ---------------------------------------------------------------------------

fn result_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        result_check(ctx),
        ctx.dataset.collection(CALCULATION_RESULTS),
        RESULT_KEY,
        "calculation result",
    )
}

fn result_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(result_check(ctx), ctx.dataset.collection(CALCULATION_RESULTS), RESULT_FIELDS)
}

fn result_rule_reference(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = result_check(ctx);
    let rules = ctx.indices.get(RULE_INDEX.name);
    ctx.dataset
        .collection(CALCULATION_RESULTS)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::reference(check, i, r, "ruleId", rules, "calculation rule"))
        .collect()
}

fn result_calculation_type(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = result_check(ctx);
    ctx.dataset
        .collection(CALCULATION_RESULTS)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::member_of(check, i, r, "calculationType", VALID_CALCULATION_TYPES))
        .collect()
}

fn result_quantity_change(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = result_check(ctx);
    ctx.dataset
        .collection(CALCULATION_RESULTS)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            checks::derived_difference(
                check,
                i,
                r,
                "quantityChange",
                "quantityAfter",
                "quantityBefore",
                Tolerance::DerivedQuantity,
            )
        })
        .collect()
}

/// A result's business date may not fall after its rule's expiry.
fn result_within_rule_expiry(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = result_check(ctx);
    let rules = ctx.indices.get(RULE_INDEX.name);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(CALCULATION_RESULTS).iter().enumerate() {
        let Ok(rule_id) = fields::text(record, "ruleId") else {
            continue;
        };
        let (Ok(business), Some(rule)) = (fields::date(record, "businessDate"), rules.get(rule_id)) else {
            continue;
        };
        let Ok(expiry) = fields::date(rule, "expiryDate") else {
            continue;
        };
        if business > expiry {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "{}: businessDate ({business}) is after expiryDate ({expiry}) of rule '{rule_id}'",
                    check.at(index, record)
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

fn limit_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(limit_check(ctx), ctx.dataset.collection(LIMITS), LIMIT_KEY, "limit")
}

fn limit_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(limit_check(ctx), ctx.dataset.collection(LIMITS), LIMIT_FIELDS)
}

fn limit_values(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = limit_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(LIMITS).iter().enumerate() {
        violations.extend(checks::member_of(check, index, record, "limitType", VALID_LIMIT_TYPES));
        violations.extend(checks::positive(check, index, record, "limitValue"));
    }
    violations
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{record, Dataset};
    use crate::index::Indices;
    use serde_json::json;

    fn run(rule: fn(&RuleContext<'_>) -> Vec<Violation>, ds: &Dataset) -> Vec<Violation> {
        let indices = Indices::build(ds, &[RULE_INDEX]);
        let ctx = RuleContext {
            domain: Domain::CalculationData,
            dataset: ds,
            indices: &indices,
        };
        rule(&ctx)
    }

    fn calc_rule(id: &str, version: i64) -> Record {
        record(&[
            ("ruleId", json!(id)),
            ("version", json!(version)),
            ("status", json!("ACTIVE")),
            ("effectiveDate", json!("2024-01-01")),
            ("expiryDate", json!("2024-12-31")),
        ])
    }

    fn rules_with_versions(versions: &[i64]) -> Dataset {
        Dataset::new().with_collection(
            CALCULATION_RULES,
            versions.iter().map(|v| calc_rule("R1", *v)).collect(),
        )
    }

    fn result(rule_id: &str, business_date: &str) -> Record {
        record(&[
            ("calculationId", json!("C-1")),
            ("ruleId", json!(rule_id)),
            ("securityId", json!("7203")),
            ("calculationType", json!("FOR_LOAN")),
            ("quantityBefore", json!(100)),
            ("quantityAfter", json!(80)),
            ("quantityChange", json!(-20)),
            ("businessDate", json!(business_date)),
        ])
    }

    // -- Versions ----------------------------------------------------------------

    #[test]
    fn sequential_versions_pass() {
        assert!(run(rule_sequential_versions, &rules_with_versions(&[1, 2, 3])).is_empty());
    }

    #[test]
    fn unordered_but_complete_versions_pass() {
        assert!(run(rule_sequential_versions, &rules_with_versions(&[3, 1, 2])).is_empty());
    }

    #[test]
    fn version_gap_fails() {
        let v = run(rule_sequential_versions, &rules_with_versions(&[1, 2, 4]));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].category, CATEGORY_RULE_VERSION);
        assert!(v[0].message.contains("[1, 2, 4]"));
    }

    #[test]
    fn versions_must_start_at_one() {
        assert_eq!(run(rule_sequential_versions, &rules_with_versions(&[2, 3, 4])).len(), 1);
    }

    #[test]
    fn repeated_version_is_not_sequential() {
        assert_eq!(run(rule_sequential_versions, &rules_with_versions(&[1, 1, 2])).len(), 1);
    }

    #[test]
    fn versions_grouped_per_rule_id() {
        let ds = Dataset::new().with_collection(
            CALCULATION_RULES,
            vec![calc_rule("R1", 1), calc_rule("R2", 2), calc_rule("R1", 2)],
        );
        let v = run(rule_sequential_versions, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("'R2'"));
    }

    // -- Rules -------------------------------------------------------------------

    #[test]
    fn expiry_must_follow_effective_date() {
        let mut r = calc_rule("R1", 1);
        r.insert("expiryDate".into(), json!("2023-12-31"));
        let ds = Dataset::new().with_collection(CALCULATION_RULES, vec![r]);
        assert_eq!(run(rule_effective_before_expiry, &ds).len(), 1);
    }

    #[test]
    fn unknown_operator_and_action_rejected() {
        let mut r = calc_rule("R1", 1);
        r.insert("conditions".into(), json!([{"field": "market", "operator": "LIKE"}]));
        r.insert("actions".into(), json!([{"actionType": "INCLUDE"}, {"actionType": "DROP"}]));
        let ds = Dataset::new().with_collection(CALCULATION_RULES, vec![r]);
        let v = run(rule_enumerations, &ds);
        assert_eq!(v.len(), 2);
        assert!(v[0].message.contains("conditions[0] operator 'LIKE'"));
        assert!(v[1].message.contains("actions[1] actionType 'DROP'"));
    }

    // -- Results -----------------------------------------------------------------

    #[test]
    fn result_must_reference_known_rule() {
        let ds = Dataset::new()
            .with_collection(CALCULATION_RULES, vec![calc_rule("R1", 1)])
            .with_collection(CALCULATION_RESULTS, vec![result("R9", "2024-03-15")]);
        let v = run(result_rule_reference, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("non-existent calculation rule 'R9'"));
    }

    #[test]
    fn quantity_change_formula_checked() {
        let mut r = result("R1", "2024-03-15");
        r.insert("quantityChange".into(), json!(20));
        let ds = Dataset::new().with_collection(CALCULATION_RESULTS, vec![result("R1", "2024-03-15"), r]);
        assert_eq!(run(result_quantity_change, &ds).len(), 1);
    }

    #[test]
    fn business_date_on_expiry_passes_after_fails() {
        let ds = Dataset::new()
            .with_collection(CALCULATION_RULES, vec![calc_rule("R1", 1)])
            .with_collection(
                CALCULATION_RESULTS,
                vec![result("R1", "2024-12-31"), result("R1", "2025-01-02")],
            );
        let v = run(result_within_rule_expiry, &ds);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].record.as_ref().unwrap().index, 1);
    }

    // -- Limits ------------------------------------------------------------------

    #[test]
    fn limit_type_and_value_checked() {
        let l = record(&[
            ("limitId", json!("L-1")),
            ("limitType", json!("DAILY")),
            ("limitValue", json!(0)),
        ]);
        let ds = Dataset::new().with_collection(LIMITS, vec![l]);
        assert_eq!(run(limit_values, &ds).len(), 2);
    }
}
