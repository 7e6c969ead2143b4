//! Inventory data rules: availability records and locates.

use super::calculation_data::VALID_CALCULATION_TYPES;
use super::checks::{self, field_shapes, DateOrder};
use super::{Rule, RuleContext, RuleSet};
use crate::dataset::Domain;
use crate::fields::{self, FieldError, FieldKind, FieldSpec};
use crate::keys::find_duplicates;
use crate::violation::{Check, Violation};

pub const INVENTORY: &str = "inventory";
pub const LOCATES: &str = "locates";

pub const CATEGORY_INVENTORY: &str = "Inventory Consistency";
pub const CATEGORY_LOCATE: &str = "Locate Consistency";

pub const LOCATE_STATUS_PENDING: &str = "PENDING";
pub const LOCATE_STATUS_APPROVED: &str = "APPROVED";
pub const LOCATE_STATUS_REJECTED: &str = "REJECTED";
pub const LOCATE_STATUS_EXPIRED: &str = "EXPIRED";
pub const VALID_LOCATE_STATUSES: &[&str] = &[
    LOCATE_STATUS_PENDING,
    LOCATE_STATUS_APPROVED,
    LOCATE_STATUS_REJECTED,
    LOCATE_STATUS_EXPIRED,
];

const INVENTORY_KEY: &[&str] = &["securityId", "market", "calculationType", "businessDate"];
const LOCATE_KEY: &[&str] = &["locateId"];

const INVENTORY_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("businessDate", FieldKind::Date),
    FieldSpec::required("availableQuantity", FieldKind::Number),
    FieldSpec::optional("isBorrowed", FieldKind::Bool),
    FieldSpec::optional("expiryDate", FieldKind::Date),
    FieldSpec::optional("activityType", FieldKind::Text),
    FieldSpec::optional("lastUpdated", FieldKind::Timestamp),
];

const LOCATE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("securityId", FieldKind::Text),
    FieldSpec::required("status", FieldKind::Text),
    FieldSpec::required("requestedQuantity", FieldKind::Number),
    FieldSpec::optional("approvedQuantity", FieldKind::Number),
    FieldSpec::required("requestTimestamp", FieldKind::Timestamp),
];

pub fn rule_set() -> RuleSet {
    RuleSet {
        domain: Domain::InventoryData,
        name: "inventory-data",
        indices: Vec::new(),
        rules: vec![
            Rule::new("inventory_duplicate_keys", inventory_duplicate_keys),
            Rule::new("inventory_fields", inventory_fields),
            Rule::new("inventory_calculation_type", inventory_calculation_type),
            Rule::new("inventory_quantity", inventory_quantity),
            Rule::new("inventory_business_before_expiry", inventory_business_before_expiry),
            Rule::new("locate_duplicate_keys", locate_duplicate_keys),
            Rule::new("locate_fields", locate_fields),
            Rule::new("locate_status", locate_status),
            Rule::new("locate_quantities", locate_quantities),
        ],
    }
}

fn inventory_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_INVENTORY, INVENTORY).keyed_by("securityId")
}

fn locate_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_LOCATE, LOCATES).keyed_by("locateId")
}

fn inventory_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        inventory_check(ctx),
        ctx.dataset.collection(INVENTORY),
        INVENTORY_KEY,
        "inventory record",
    )
}

fn inventory_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(inventory_check(ctx), ctx.dataset.collection(INVENTORY), INVENTORY_FIELDS)
}

fn inventory_calculation_type(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = inventory_check(ctx);
    ctx.dataset
        .collection(INVENTORY)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::member_of(check, i, r, "calculationType", VALID_CALCULATION_TYPES))
        .collect()
}

fn inventory_quantity(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = inventory_check(ctx);
    ctx.dataset
        .collection(INVENTORY)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::non_negative(check, i, r, "availableQuantity"))
        .collect()
}

fn inventory_business_before_expiry(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = inventory_check(ctx);
    ctx.dataset
        .collection(INVENTORY)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            checks::date_order(check, i, r, "businessDate", "expiryDate", DateOrder::Inclusive)
        })
        .collect()
}

fn locate_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(locate_check(ctx), ctx.dataset.collection(LOCATES), LOCATE_KEY, "locate")
}

fn locate_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(locate_check(ctx), ctx.dataset.collection(LOCATES), LOCATE_FIELDS)
}

fn locate_status(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = locate_check(ctx);
    ctx.dataset
        .collection(LOCATES)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::member_of(check, i, r, "status", VALID_LOCATE_STATUSES))
        .collect()
}

/// Requested > 0, approved within `[0, requested]`, and an approved locate
/// must actually approve something.
fn locate_quantities(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = locate_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(LOCATES).iter().enumerate() {
        violations.extend(checks::positive(check, index, record, "requestedQuantity"));
        violations.extend(checks::non_negative(check, index, record, "approvedQuantity"));

        let location = check.at(index, record);
        let approved = fields::number(record, "approvedQuantity");
        if let (Ok(approved), Ok(requested)) = (approved, fields::number(record, "requestedQuantity")) {
            if approved > requested {
                violations.push(check.violation(
                    index,
                    record,
                    format!(
                        "{location}: approvedQuantity ({approved}) exceeds requestedQuantity ({requested})"
                    ),
                ));
            }
        }

        if fields::text(record, "status") == Ok(LOCATE_STATUS_APPROVED) {
            match approved {
                Ok(q) if q <= 0.0 => violations.push(check.violation(
                    index,
                    record,
                    format!("{location}: APPROVED locate must have approvedQuantity > 0 (got {q})"),
                )),
                Err(FieldError::Missing) => violations.push(check.field_error(
                    index,
                    record,
                    "approvedQuantity",
                    FieldError::Missing,
                )),
                _ => {}
            }
        }
    }
    violations
}
