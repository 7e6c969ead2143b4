//! Position data rules: positions, settlement ladders, borrow requirements.

use std::collections::HashSet;

use super::checks::{self, field_shapes, nested_field_shapes};
use super::{Rule, RuleContext, RuleSet};
use crate::dataset::Domain;
use crate::fields::{self, FieldKind, FieldSpec};
use crate::index::IndexSpec;
use crate::keys::find_duplicates;
use crate::tolerance::{approx_equal, Tolerance};
use crate::violation::{Check, Violation};

pub const POSITIONS: &str = "positions";
pub const SETTLEMENT_LADDERS: &str = "settlementLadders";
pub const BORROW_REQUIREMENTS: &str = "borrowRequirements";

pub const CATEGORY_POSITION: &str = "Position Consistency";
pub const CATEGORY_SETTLEMENT_LADDER: &str = "Settlement Ladder Consistency";
pub const CATEGORY_BORROW: &str = "Borrow Requirement Consistency";

/// Index of positions by `positionId`.
pub const POSITION_INDEX: IndexSpec = IndexSpec::new("positions", POSITIONS, "positionId");

pub const POSITION_STATUS_OPEN: &str = "OPEN";
pub const POSITION_STATUS_CLOSED: &str = "CLOSED";
pub const POSITION_STATUS_PENDING: &str = "PENDING";
pub const VALID_POSITION_STATUSES: &[&str] = &[
    POSITION_STATUS_OPEN,
    POSITION_STATUS_CLOSED,
    POSITION_STATUS_PENDING,
];

/// Settlement-day buckets, today through four days out.
pub const VALID_SETTLEMENT_BUCKETS: &[&str] = &["SD0", "SD1", "SD2", "SD3", "SD4"];

const POSITION_KEY: &[&str] = &["positionId"];
const LADDER_KEY: &[&str] = &["positionId", "settlementDate"];
const BORROW_KEY: &[&str] = &["positionId"];

const POSITION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("securityId", FieldKind::Text),
    FieldSpec::required("bookId", FieldKind::Text),
    FieldSpec::required("market", FieldKind::Text),
    FieldSpec::required("quantity", FieldKind::Number),
    FieldSpec::required("positionType", FieldKind::Text),
    FieldSpec::required("status", FieldKind::Text),
    FieldSpec::required("positionDate", FieldKind::Date),
    FieldSpec::optional("tradeTimestamp", FieldKind::Timestamp),
];

const LADDER_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("settlementDate", FieldKind::Date),
    FieldSpec::required("buckets", FieldKind::Records),
];

const LADDER_BUCKET_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("bucket", FieldKind::Text),
    FieldSpec::required("receipts", FieldKind::Number),
    FieldSpec::required("deliveries", FieldKind::Number),
    FieldSpec::required("netSettlement", FieldKind::Number),
];

const BORROW_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("borrowedQuantity", FieldKind::Number),
    FieldSpec::required("requiredQuantity", FieldKind::Number),
    FieldSpec::required("overborrowQuantity", FieldKind::Number),
];

pub fn rule_set() -> RuleSet {
    RuleSet {
        domain: Domain::PositionData,
        name: "position-data",
        indices: vec![POSITION_INDEX],
        rules: vec![
            Rule::new("position_duplicate_keys", position_duplicate_keys),
            Rule::new("position_fields", position_fields),
            Rule::new("position_status", position_status),
            Rule::new("ladder_duplicate_keys", ladder_duplicate_keys),
            Rule::new("ladder_fields", ladder_fields),
            Rule::new("ladder_position_reference", ladder_position_reference),
            Rule::new("ladder_buckets", ladder_buckets),
            Rule::new("borrow_duplicate_keys", borrow_duplicate_keys),
            Rule::new("borrow_fields", borrow_fields),
            Rule::new("borrow_position_reference", borrow_position_reference),
            Rule::new("borrow_overborrow", borrow_overborrow),
        ],
    }
}

fn position_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_POSITION, POSITIONS).keyed_by("positionId")
}

fn ladder_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_SETTLEMENT_LADDER, SETTLEMENT_LADDERS).keyed_by("positionId")
}

fn borrow_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_BORROW, BORROW_REQUIREMENTS).keyed_by("positionId")
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

fn position_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(position_check(ctx), ctx.dataset.collection(POSITIONS), POSITION_KEY, "position")
}

fn position_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(position_check(ctx), ctx.dataset.collection(POSITIONS), POSITION_FIELDS)
}

fn position_status(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = position_check(ctx);
    ctx.dataset
        .collection(POSITIONS)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::member_of(check, i, r, "status", VALID_POSITION_STATUSES))
        .collect()
}

// ---------------------------------------------------------------------------
// Settlement ladders
// ---------------------------------------------------------------------------

fn ladder_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        ladder_check(ctx),
        ctx.dataset.collection(SETTLEMENT_LADDERS),
        LADDER_KEY,
        "settlement ladder",
    )
}

fn ladder_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = ladder_check(ctx);
    let ladders = ctx.dataset.collection(SETTLEMENT_LADDERS);
    let mut violations = field_shapes(check, ladders, LADDER_FIELDS);
    violations.extend(nested_field_shapes(check, ladders, "buckets", LADDER_BUCKET_FIELDS));
    violations
}

fn ladder_position_reference(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = ladder_check(ctx);
    let positions = ctx.indices.get(POSITION_INDEX.name);
    ctx.dataset
        .collection(SETTLEMENT_LADDERS)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::reference(check, i, r, "positionId", positions, "position"))
        .collect()
}

/// Bucket labels, uniqueness, signs, and `net = receipts - deliveries`.
fn ladder_buckets(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = ladder_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(SETTLEMENT_LADDERS).iter().enumerate() {
        violations.extend(checks::non_empty_children(
            check,
            index,
            record,
            "buckets",
            "settlement bucket",
        ));
        let Ok(buckets) = fields::records(record, "buckets") else {
            continue;
        };
        let location = check.at(index, record);
        let mut seen = HashSet::new();

        for (pos, bucket) in buckets.iter().enumerate() {
            if let Ok(label) = fields::text(bucket, "bucket") {
                if !VALID_SETTLEMENT_BUCKETS.contains(&label) {
                    violations.push(check.violation(
                        index,
                        record,
                        format!(
                            "{location}: buckets[{pos}] bucket '{label}' is not one of {}",
                            VALID_SETTLEMENT_BUCKETS.join(", ")
                        ),
                    ));
                } else if !seen.insert(label) {
                    violations.push(check.violation(
                        index,
                        record,
                        format!("{location}: buckets[{pos}] repeats bucket '{label}'"),
                    ));
                }
            }

            for field in ["receipts", "deliveries"] {
                if let Ok(value) = fields::number(bucket, field) {
                    if value < 0.0 {
                        violations.push(check.violation(
                            index,
                            record,
                            format!("{location}: buckets[{pos}] {field} must not be negative (got {value})"),
                        ));
                    }
                }
            }

            if let (Ok(receipts), Ok(deliveries), Ok(net)) = (
                fields::number(bucket, "receipts"),
                fields::number(bucket, "deliveries"),
                fields::number(bucket, "netSettlement"),
            ) {
                let expected = receipts - deliveries;
                if !approx_equal(net, expected, Tolerance::DerivedQuantity) {
                    violations.push(check.violation(
                        index,
                        record,
                        format!(
                            "{location}: buckets[{pos}] netSettlement ({net}) does not equal receipts - deliveries ({expected})"
                        ),
                    ));
                }
            }
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Borrow requirements
// ---------------------------------------------------------------------------

fn borrow_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        borrow_check(ctx),
        ctx.dataset.collection(BORROW_REQUIREMENTS),
        BORROW_KEY,
        "borrow requirement",
    )
}

fn borrow_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(borrow_check(ctx), ctx.dataset.collection(BORROW_REQUIREMENTS), BORROW_FIELDS)
}

fn borrow_position_reference(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = borrow_check(ctx);
    let positions = ctx.indices.get(POSITION_INDEX.name);
    ctx.dataset
        .collection(BORROW_REQUIREMENTS)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::reference(check, i, r, "positionId", positions, "position"))
        .collect()
}

fn borrow_overborrow(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = borrow_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(BORROW_REQUIREMENTS).iter().enumerate() {
        violations.extend(checks::non_negative(check, index, record, "borrowedQuantity"));
        violations.extend(checks::non_negative(check, index, record, "requiredQuantity"));
        violations.extend(checks::derived_difference(
            check,
            index,
            record,
            "overborrowQuantity",
            "borrowedQuantity",
            "requiredQuantity",
            Tolerance::DerivedQuantity,
        ));
    }
    violations
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{record, Dataset, Record};
    use crate::index::Indices;
    use serde_json::{json, Value};

    fn run(rule: fn(&RuleContext<'_>) -> Vec<Violation>, ds: &Dataset) -> Vec<Violation> {
        let indices = Indices::build(ds, &[POSITION_INDEX]);
        let ctx = RuleContext {
            domain: Domain::PositionData,
            dataset: ds,
            indices: &indices,
        };
        rule(&ctx)
    }

    fn position(id: &str) -> Record {
        record(&[
            ("positionId", json!(id)),
            ("securityId", json!("2330")),
            ("bookId", json!("BK-1")),
            ("market", json!("TW")),
            ("quantity", json!(1000)),
            ("positionType", json!("LONG")),
            ("status", json!("OPEN")),
            ("positionDate", json!("2024-03-15")),
        ])
    }

    fn ladder(position_id: &str, buckets: Value) -> Record {
        record(&[
            ("positionId", json!(position_id)),
            ("settlementDate", json!("2024-03-15")),
            ("buckets", buckets),
        ])
    }

    #[test]
    fn ladder_referencing_missing_position_reported_once() {
        let ds = Dataset::new()
            .with_collection(POSITIONS, vec![position("P-1")])
            .with_collection(
                SETTLEMENT_LADDERS,
                vec![ladder("P-404", json!([{"bucket": "SD0", "receipts": 1, "deliveries": 0, "netSettlement": 1}]))],
            );
        let v = run(ladder_position_reference, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("references non-existent position"));
        assert!(v[0].message.contains("P-404"));
    }

    #[test]
    fn ladder_referencing_existing_position_passes() {
        let ds = Dataset::new()
            .with_collection(POSITIONS, vec![position("P-1")])
            .with_collection(SETTLEMENT_LADDERS, vec![ladder("P-1", json!([]))]);
        assert!(run(ladder_position_reference, &ds).is_empty());
    }

    #[test]
    fn net_settlement_must_match_formula() {
        let ds = Dataset::new().with_collection(
            SETTLEMENT_LADDERS,
            vec![ladder(
                "P-1",
                json!([
                    {"bucket": "SD0", "receipts": 100, "deliveries": 40, "netSettlement": 60},
                    {"bucket": "SD1", "receipts": 100, "deliveries": 40, "netSettlement": 140}
                ]),
            )],
        );
        let v = run(ladder_buckets, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("buckets[1] netSettlement"));
    }

    #[test]
    fn unknown_and_repeated_buckets_rejected() {
        let ds = Dataset::new().with_collection(
            SETTLEMENT_LADDERS,
            vec![ladder(
                "P-1",
                json!([
                    {"bucket": "SD0", "receipts": 0, "deliveries": 0, "netSettlement": 0},
                    {"bucket": "SD0", "receipts": 0, "deliveries": 0, "netSettlement": 0},
                    {"bucket": "SD9", "receipts": 0, "deliveries": 0, "netSettlement": 0}
                ]),
            )],
        );
        let v = run(ladder_buckets, &ds);
        assert_eq!(v.len(), 2);
        assert!(v[0].message.contains("repeats bucket 'SD0'"));
        assert!(v[1].message.contains("'SD9' is not one of"));
    }

    #[test]
    fn empty_ladder_is_rejected() {
        let ds = Dataset::new().with_collection(SETTLEMENT_LADDERS, vec![ladder("P-1", json!([]))]);
        let v = run(ladder_buckets, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("at least one settlement bucket"));
    }

    #[test]
    fn overborrow_must_equal_borrowed_minus_required() {
        let good = record(&[
            ("positionId", json!("P-1")),
            ("borrowedQuantity", json!(1500)),
            ("requiredQuantity", json!(1000)),
            ("overborrowQuantity", json!(500)),
        ]);
        let bad = record(&[
            ("positionId", json!("P-2")),
            ("borrowedQuantity", json!(1500)),
            ("requiredQuantity", json!(1000)),
            ("overborrowQuantity", json!(400)),
        ]);
        let ds = Dataset::new().with_collection(BORROW_REQUIREMENTS, vec![good, bad]);
        let v = run(borrow_overborrow, &ds);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].record.as_ref().unwrap().key.as_deref(), Some("P-2"));
    }

    #[test]
    fn invalid_status_rejected() {
        let mut p = position("P-1");
        p.insert("status".into(), json!("ARCHIVED"));
        let ds = Dataset::new().with_collection(POSITIONS, vec![p]);
        assert_eq!(run(position_status, &ds).len(), 1);
    }

    #[test]
    fn missing_quantity_reported_as_missing_field() {
        let mut p = position("P-1");
        p.remove("quantity");
        let ds = Dataset::new().with_collection(POSITIONS, vec![p]);
        let v = run(position_fields, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("missing required field 'quantity'"));
    }
}
