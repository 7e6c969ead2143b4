//! Reference data rules: securities, index compositions, aggregation units
//! and books.

use std::collections::HashMap;

use super::checks::{self, field_shapes, DateOrder};
use super::{Rule, RuleContext, RuleSet};
use crate::dataset::Domain;
use crate::fields::{self, FieldKind, FieldSpec};
use crate::index::IndexSpec;
use crate::keys::find_duplicates;
use crate::tolerance::{approx_equal, Tolerance};
use crate::violation::{Check, Violation};

pub const SECURITIES: &str = "securities";
pub const INDEX_COMPOSITIONS: &str = "indexCompositions";
pub const AGGREGATION_UNITS: &str = "aggregationUnits";
pub const BOOKS: &str = "books";

pub const CATEGORY_SECURITY: &str = "Security Reference Consistency";
pub const CATEGORY_INDEX_COMPOSITION: &str = "Index Composition Consistency";
pub const CATEGORY_AGGREGATION_UNIT: &str = "Aggregation Unit Hierarchy";
pub const CATEGORY_BOOK: &str = "Book Hierarchy";

pub const SECURITY_INDEX: IndexSpec = IndexSpec::new("securities", SECURITIES, "securityId");
/// Any composition record per index id; used only for existence checks.
pub const COMPOSITION_BY_INDEX: IndexSpec =
    IndexSpec::new("compositionsByIndex", INDEX_COMPOSITIONS, "indexId");
pub const AGGREGATION_UNIT_INDEX: IndexSpec =
    IndexSpec::new("aggregationUnits", AGGREGATION_UNITS, "aggregationUnitId");
pub const BOOK_INDEX: IndexSpec = IndexSpec::new("books", BOOKS, "bookId");

const SECURITY_KEY: &[&str] = &["securityId"];
const COMPOSITION_KEY: &[&str] = &["indexId", "constituentId"];
const AGGREGATION_UNIT_KEY: &[&str] = &["aggregationUnitId"];
const BOOK_KEY: &[&str] = &["bookId"];

const SECURITY_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("market", FieldKind::Text),
    FieldSpec::required("currency", FieldKind::Text),
    FieldSpec::optional("isBasket", FieldKind::Bool),
    FieldSpec::optional("isQuanto", FieldKind::Bool),
    FieldSpec::required("issueDate", FieldKind::Date),
    FieldSpec::optional("maturityDate", FieldKind::Date),
    FieldSpec::optional("settlementConvention", FieldKind::Text),
    FieldSpec::optional("settlementDays", FieldKind::Integer),
];

const COMPOSITION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("weight", FieldKind::Number),
    FieldSpec::optional("effectiveDate", FieldKind::Date),
];

const AGGREGATION_UNIT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("name", FieldKind::Text),
    FieldSpec::optional("parentId", FieldKind::Text),
];

const BOOK_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("aggregationUnitId", FieldKind::Text),
    FieldSpec::optional("parentBookId", FieldKind::Text),
];

pub fn rule_set() -> RuleSet {
    RuleSet {
        domain: Domain::ReferenceData,
        name: "reference-data",
        indices: vec![
            SECURITY_INDEX,
            COMPOSITION_BY_INDEX,
            AGGREGATION_UNIT_INDEX,
            BOOK_INDEX,
        ],
        rules: vec![
            Rule::new("security_duplicate_keys", security_duplicate_keys),
            Rule::new("security_fields", security_fields),
            Rule::new("security_issue_before_maturity", security_issue_before_maturity),
            Rule::new("basket_has_composition", basket_has_composition),
            Rule::new("composition_duplicate_keys", composition_duplicate_keys),
            Rule::new("composition_fields", composition_fields),
            Rule::new("composition_references", composition_references),
            Rule::new("composition_weights", composition_weights),
            Rule::new("aggregation_unit_duplicate_keys", aggregation_unit_duplicate_keys),
            Rule::new("aggregation_unit_fields", aggregation_unit_fields),
            Rule::new("aggregation_unit_hierarchy", aggregation_unit_hierarchy),
            Rule::new("book_duplicate_keys", book_duplicate_keys),
            Rule::new("book_fields", book_fields),
            Rule::new("book_hierarchy", book_hierarchy),
        ],
    }
}

fn security_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_SECURITY, SECURITIES).keyed_by("securityId")
}

fn composition_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_INDEX_COMPOSITION, INDEX_COMPOSITIONS).keyed_by("indexId")
}

fn aggregation_unit_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_AGGREGATION_UNIT, AGGREGATION_UNITS).keyed_by("aggregationUnitId")
}

fn book_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_BOOK, BOOKS).keyed_by("bookId")
}

// ---------------------------------------------------------------------------
// Securities
// ---------------------------------------------------------------------------

fn security_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(security_check(ctx), ctx.dataset.collection(SECURITIES), SECURITY_KEY, "security")
}

fn security_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(security_check(ctx), ctx.dataset.collection(SECURITIES), SECURITY_FIELDS)
}

fn security_issue_before_maturity(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = security_check(ctx);
    ctx.dataset
        .collection(SECURITIES)
        .iter()
        .enumerate()
        .filter_map(|(i, r)| checks::date_order(check, i, r, "issueDate", "maturityDate", DateOrder::Strict))
        .collect()
}

/// A basket-flagged security must be named as `indexId` by at least one
/// composition record.
fn basket_has_composition(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = security_check(ctx);
    let compositions = ctx.indices.get(COMPOSITION_BY_INDEX.name);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(SECURITIES).iter().enumerate() {
        if !fields::flag(record, "isBasket") {
            continue;
        }
        let Ok(security_id) = fields::text(record, "securityId") else {
            continue;
        };
        if !compositions.contains(security_id) {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "{}: basket security has no index composition records",
                    check.at(index, record)
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Index compositions
// ---------------------------------------------------------------------------

fn composition_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        composition_check(ctx),
        ctx.dataset.collection(INDEX_COMPOSITIONS),
        COMPOSITION_KEY,
        "index constituent",
    )
}

fn composition_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(composition_check(ctx), ctx.dataset.collection(INDEX_COMPOSITIONS), COMPOSITION_FIELDS)
}

/// Index and constituent must be known securities, and distinct.
fn composition_references(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = composition_check(ctx);
    let securities = ctx.indices.get(SECURITY_INDEX.name);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(INDEX_COMPOSITIONS).iter().enumerate() {
        violations.extend(checks::reference(check, index, record, "indexId", securities, "security"));
        violations.extend(checks::reference(check, index, record, "constituentId", securities, "security"));
        violations.extend(checks::self_reference(check, index, record, "indexId", "constituentId"));
    }
    violations
}

/// Negative weights per record, then each index's weight sum against 1.0
/// at the reference-data tolerance.
fn composition_weights(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = composition_check(ctx);
    let records = ctx.dataset.collection(INDEX_COMPOSITIONS);
    let mut violations = Vec::new();

    let mut order: Vec<&str> = Vec::new();
    let mut sums: HashMap<&str, (usize, Option<f64>)> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        violations.extend(checks::non_negative(check, index, record, "weight"));

        let Ok(index_id) = fields::text(record, "indexId") else {
            continue;
        };
        let entry = sums.entry(index_id).or_insert_with(|| {
            order.push(index_id);
            (index, Some(0.0))
        });
        match (fields::number(record, "weight").ok(), &mut entry.1) {
            (Some(weight), Some(sum)) => *sum += weight,
            (_, slot) => *slot = None,
        }
    }

    for index_id in order {
        let (first, sum) = sums[index_id];
        let Some(sum) = sum else {
            continue;
        };
        if !approx_equal(sum, 1.0, Tolerance::IndexWeightSum) {
            violations.push(check.violation(
                first,
                &records[first],
                format!(
                    "index '{index_id}' constituent weights sum to {sum:.6}, expected 1.0 (tolerance {})",
                    Tolerance::IndexWeightSum.epsilon()
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Hierarchies
// ---------------------------------------------------------------------------

fn aggregation_unit_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        aggregation_unit_check(ctx),
        ctx.dataset.collection(AGGREGATION_UNITS),
        AGGREGATION_UNIT_KEY,
        "aggregation unit",
    )
}

fn aggregation_unit_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(
        aggregation_unit_check(ctx),
        ctx.dataset.collection(AGGREGATION_UNITS),
        AGGREGATION_UNIT_FIELDS,
    )
}

fn aggregation_unit_hierarchy(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = aggregation_unit_check(ctx);
    let units = ctx.indices.get(AGGREGATION_UNIT_INDEX.name);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(AGGREGATION_UNITS).iter().enumerate() {
        if let Some(v) = checks::self_reference(check, index, record, "aggregationUnitId", "parentId") {
            violations.push(v);
            continue;
        }
        violations.extend(checks::reference(check, index, record, "parentId", units, "aggregation unit"));
    }
    violations
}

fn book_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(book_check(ctx), ctx.dataset.collection(BOOKS), BOOK_KEY, "book")
}

fn book_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(book_check(ctx), ctx.dataset.collection(BOOKS), BOOK_FIELDS)
}

fn book_hierarchy(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = book_check(ctx);
    let units = ctx.indices.get(AGGREGATION_UNIT_INDEX.name);
    let books = ctx.indices.get(BOOK_INDEX.name);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(BOOKS).iter().enumerate() {
        violations.extend(checks::reference(
            check,
            index,
            record,
            "aggregationUnitId",
            units,
            "aggregation unit",
        ));
        if let Some(v) = checks::self_reference(check, index, record, "bookId", "parentBookId") {
            violations.push(v);
            continue;
        }
        violations.extend(checks::reference(check, index, record, "parentBookId", books, "book"));
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
    use serde_json::json;

    fn run(rule: fn(&RuleContext<'_>) -> Vec<Violation>, ds: &Dataset) -> Vec<Violation> {
        let set = rule_set();
        let indices = Indices::build(ds, &set.indices);
        let ctx = RuleContext {
            domain: Domain::ReferenceData,
            dataset: ds,
            indices: &indices,
        };
        rule(&ctx)
    }

    fn security(id: &str) -> Record {
        record(&[
            ("securityId", json!(id)),
            ("market", json!("JP")),
            ("currency", json!("JPY")),
            ("issueDate", json!("2010-01-04")),
        ])
    }

    fn constituent(index_id: &str, constituent_id: &str, weight: f64) -> Record {
        record(&[
            ("indexId", json!(index_id)),
            ("constituentId", json!(constituent_id)),
            ("weight", json!(weight)),
        ])
    }

    fn index_dataset(weights: &[f64]) -> Dataset {
        let mut securities = vec![security("IDX")];
        let mut compositions = Vec::new();
        for (i, w) in weights.iter().enumerate() {
            let id = format!("S{i}");
            securities.push(security(&id));
            compositions.push(constituent("IDX", &id, *w));
        }
        Dataset::new()
            .with_collection(SECURITIES, securities)
            .with_collection(INDEX_COMPOSITIONS, compositions)
    }

    #[test]
    fn one_percent_weight_drift_fails_index_tolerance() {
        let v = run(composition_weights, &index_dataset(&[0.3, 0.3, 0.41]));
        assert_eq!(v.len(), 1);
        assert!(v[0].render().starts_with("Index Composition Consistency: index 'IDX'"));
    }

    #[test]
    fn weights_within_half_percent_pass() {
        assert!(run(composition_weights, &index_dataset(&[0.5, 0.498])).is_empty());
    }

    #[test]
    fn negative_composition_weight_reported() {
        let v = run(composition_weights, &index_dataset(&[1.1, -0.1]));
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("must not be negative"));
    }

    #[test]
    fn basket_without_composition_flagged() {
        let mut basket = security("BSKT");
        basket.insert("isBasket".into(), json!(true));
        let ds = Dataset::new().with_collection(SECURITIES, vec![basket]);
        let v = run(basket_has_composition, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("no index composition"));
    }

    #[test]
    fn basket_with_composition_passes() {
        let mut ds = index_dataset(&[1.0]);
        let mut securities = ds.collection(SECURITIES).to_vec();
        securities[0].insert("isBasket".into(), json!(true));
        ds.insert(SECURITIES, securities);
        assert!(run(basket_has_composition, &ds).is_empty());
    }

    #[test]
    fn composition_references_unknown_constituent() {
        let ds = Dataset::new()
            .with_collection(SECURITIES, vec![security("IDX")])
            .with_collection(INDEX_COMPOSITIONS, vec![constituent("IDX", "GHOST", 1.0)]);
        let v = run(composition_references, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("non-existent security 'GHOST'"));
    }

    #[test]
    fn maturity_must_follow_issue() {
        let mut s = security("BOND");
        s.insert("maturityDate".into(), json!("2009-12-31"));
        let ds = Dataset::new().with_collection(SECURITIES, vec![s]);
        assert_eq!(run(security_issue_before_maturity, &ds).len(), 1);
    }

    #[test]
    fn aggregation_unit_cannot_parent_itself() {
        let unit = record(&[
            ("aggregationUnitId", json!("AU-1")),
            ("name", json!("Tokyo Desk")),
            ("parentId", json!("AU-1")),
        ]);
        let ds = Dataset::new().with_collection(AGGREGATION_UNITS, vec![unit]);
        let v = run(aggregation_unit_hierarchy, &ds);
        assert_eq!(v.len(), 1);
        assert!(v[0].message.contains("must not reference itself"));
    }

    #[test]
    fn book_references_resolved() {
        let unit = record(&[("aggregationUnitId", json!("AU-1")), ("name", json!("Desk"))]);
        let ok = record(&[("bookId", json!("B-1")), ("aggregationUnitId", json!("AU-1"))]);
        let orphan = record(&[
            ("bookId", json!("B-2")),
            ("aggregationUnitId", json!("AU-9")),
            ("parentBookId", json!("B-7")),
        ]);
        let ds = Dataset::new()
            .with_collection(AGGREGATION_UNITS, vec![unit])
            .with_collection(BOOKS, vec![ok, orphan]);
        let v = run(book_hierarchy, &ds);
        assert_eq!(v.len(), 2);
        assert!(v[0].message.contains("non-existent aggregation unit 'AU-9'"));
        assert!(v[1].message.contains("non-existent book 'B-7'"));
    }
}
