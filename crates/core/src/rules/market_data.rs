//! Market data rules: prices, FX rates, volatility curves, basket NAVs.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use super::checks::{self, field_shapes, nested_field_shapes};
use super::{Rule, RuleContext, RuleSet};
use crate::dataset::{Domain, Record};
use crate::fields::{self, FieldKind, FieldSpec};
use crate::keys::find_duplicates;
use crate::tolerance::{approx_equal, Tolerance};
use crate::violation::{Check, Violation};

// ---------------------------------------------------------------------------
// Collections and categories
// ---------------------------------------------------------------------------

pub const PRICES: &str = "prices";
pub const FX_RATES: &str = "fxRates";
pub const VOLATILITY_CURVES: &str = "volatilityCurves";
pub const BASKET_NAVS: &str = "basketNavs";

pub const CATEGORY_PRICE: &str = "Price Consistency";
pub const CATEGORY_FX: &str = "FX Rate Consistency";
pub const CATEGORY_VOLATILITY: &str = "Volatility Curve Consistency";
pub const CATEGORY_BASKET_NAV: &str = "Basket NAV Consistency";

/// Volatilities above 200% are reported as suspicious, not invalid.
pub const VOLATILITY_HIGH_THRESHOLD: f64 = 2.0;

const PRICE_KEY: &[&str] = &["securityId", "market", "priceDate"];
const FX_KEY: &[&str] = &["baseCurrency", "quoteCurrency", "rateType", "rateDate"];
const CURVE_KEY: &[&str] = &["curveId"];
const NAV_KEY: &[&str] = &["basketId", "navDate"];

const PRICE_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("priceDate", FieldKind::Date),
    FieldSpec::required("currency", FieldKind::Text),
    FieldSpec::optional("price", FieldKind::Number),
    FieldSpec::optional("bidPrice", FieldKind::Number),
    FieldSpec::optional("askPrice", FieldKind::Number),
];

const FX_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("rateDate", FieldKind::Date),
    FieldSpec::required("rate", FieldKind::Number),
];

const CURVE_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("securityId", FieldKind::Text),
    FieldSpec::required("curveDate", FieldKind::Date),
    FieldSpec::required("points", FieldKind::Records),
];

const CURVE_POINT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("tenorDays", FieldKind::Number),
    FieldSpec::required("volatility", FieldKind::Number),
];

const NAV_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("navDate", FieldKind::Date),
    FieldSpec::required("nav", FieldKind::Number),
    FieldSpec::required("constituents", FieldKind::Records),
];

const NAV_CONSTITUENT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("securityId", FieldKind::Text),
    FieldSpec::required("weight", FieldKind::Number),
];

static CURRENCY_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid regex"));

pub fn rule_set() -> RuleSet {
    RuleSet {
        domain: Domain::MarketData,
        name: "market-data",
        indices: Vec::new(),
        rules: vec![
            Rule::new("price_duplicate_keys", price_duplicate_keys),
            Rule::new("price_fields", price_fields),
            Rule::new("price_source_exclusive", price_source_exclusive),
            Rule::new("price_positive", price_positive),
            Rule::new("price_bid_ask_order", price_bid_ask_order),
            Rule::new("fx_duplicate_keys", fx_duplicate_keys),
            Rule::new("fx_fields", fx_fields),
            Rule::new("fx_rate_positive", fx_rate_positive),
            Rule::new("fx_currency_codes", fx_currency_codes),
            Rule::new("fx_reciprocal_consistency", fx_reciprocal_consistency),
            Rule::new("volatility_duplicate_keys", volatility_duplicate_keys),
            Rule::new("volatility_fields", volatility_fields),
            Rule::new("volatility_points_present", volatility_points_present),
            Rule::new("volatility_levels", volatility_levels),
            Rule::new("volatility_tenor_order", volatility_tenor_order),
            Rule::new("basket_nav_duplicate_keys", basket_nav_duplicate_keys),
            Rule::new("basket_nav_fields", basket_nav_fields),
            Rule::new("basket_nav_positive", basket_nav_positive),
            Rule::new("basket_nav_weights", basket_nav_weights),
        ],
    }
}

fn price_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_PRICE, PRICES).keyed_by("securityId")
}

fn fx_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_FX, FX_RATES)
}

fn curve_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_VOLATILITY, VOLATILITY_CURVES).keyed_by("curveId")
}

fn nav_check(ctx: &RuleContext<'_>) -> Check<'static> {
    Check::new(ctx.domain, CATEGORY_BASKET_NAV, BASKET_NAVS).keyed_by("basketId")
}

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

fn price_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(price_check(ctx), ctx.dataset.collection(PRICES), PRICE_KEY, "price")
}

fn price_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(price_check(ctx), ctx.dataset.collection(PRICES), PRICE_FIELDS)
}

/// Exactly one of `price` or the full `bidPrice`/`askPrice` pair.
fn price_source_exclusive(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = price_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(PRICES).iter().enumerate() {
        let has_price = fields::has(record, "price");
        let has_bid = fields::has(record, "bidPrice");
        let has_ask = fields::has(record, "askPrice");
        let location = check.at(index, record);

        if has_price && (has_bid || has_ask) {
            violations.push(check.violation(
                index,
                record,
                format!("{location}: has both price and bid/ask; supply one or the other"),
            ));
        } else if !has_price && !(has_bid && has_ask) {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "{location}: missing required price information (price, or both bidPrice and askPrice)"
                ),
            ));
        }
    }
    violations
}

fn price_positive(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = price_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(PRICES).iter().enumerate() {
        for field in ["price", "bidPrice", "askPrice"] {
            violations.extend(checks::positive(check, index, record, field));
        }
    }
    violations
}

fn price_bid_ask_order(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = price_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(PRICES).iter().enumerate() {
        let (Ok(bid), Ok(ask)) = (
            fields::number(record, "bidPrice"),
            fields::number(record, "askPrice"),
        ) else {
            continue;
        };
        if bid > ask {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "{}: bidPrice ({bid}) must not exceed askPrice ({ask})",
                    check.at(index, record)
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// FX rates
// ---------------------------------------------------------------------------

fn fx_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(fx_check(ctx), ctx.dataset.collection(FX_RATES), FX_KEY, "FX rate")
}

fn fx_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    field_shapes(fx_check(ctx), ctx.dataset.collection(FX_RATES), FX_FIELDS)
}

fn fx_rate_positive(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = fx_check(ctx);
    ctx.dataset
        .collection(FX_RATES)
        .iter()
        .enumerate()
        .filter_map(|(index, record)| checks::positive(check, index, record, "rate"))
        .collect()
}

fn fx_currency_codes(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = fx_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(FX_RATES).iter().enumerate() {
        let location = check.at(index, record);
        for field in ["baseCurrency", "quoteCurrency"] {
            if let Ok(code) = fields::text(record, field) {
                if !CURRENCY_CODE_RE.is_match(code) {
                    violations.push(check.violation(
                        index,
                        record,
                        format!("{location}: {field} '{code}' is not a three-letter ISO currency code"),
                    ));
                }
            }
        }
        if let (Ok(base), Ok(quote)) = (
            fields::text(record, "baseCurrency"),
            fields::text(record, "quoteCurrency"),
        ) {
            if base == quote {
                violations.push(check.violation(
                    index,
                    record,
                    format!("{location}: baseCurrency and quoteCurrency are both '{base}'"),
                ));
            }
        }
    }
    violations
}

/// Identity of one observed rate: (base, quote, rate type, rate date).
type RateKey<'a> = (&'a str, &'a str, &'a str, &'a str);

fn rate_key(record: &Record) -> Option<RateKey<'_>> {
    Some((
        fields::text(record, "baseCurrency").ok()?,
        fields::text(record, "quoteCurrency").ok()?,
        fields::text(record, "rateType").ok()?,
        fields::text(record, "rateDate").ok()?,
    ))
}

/// Observed rates whose reciprocal is also observed must multiply to 1.
///
/// Two passes: collect every rate first, then visit records in order and
/// check each unordered pair exactly once, so the outcome does not depend
/// on which direction arrives first. Only the first occurrence of a key
/// takes part; repeats are the duplicate-key rule's concern.
fn fx_reciprocal_consistency(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = fx_check(ctx);
    let records = ctx.dataset.collection(FX_RATES);

    let mut observed: HashMap<RateKey<'_>, (usize, f64)> = HashMap::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if let (Some(key), Ok(rate)) = (rate_key(record), fields::number(record, "rate")) {
            observed.entry(key).or_insert((index, rate));
        }
    }

    let mut violations = Vec::new();
    let mut checked: HashSet<RateKey<'_>> = HashSet::new();
    for (index, record) in records.iter().enumerate() {
        let Some(key) = rate_key(record) else {
            continue;
        };
        let (base, quote, rate_type, rate_date) = key;
        if base == quote {
            continue;
        }
        let Some(&(first, rate)) = observed.get(&key) else {
            continue;
        };
        if first != index || checked.contains(&key) {
            continue;
        }
        let reverse = (quote, base, rate_type, rate_date);
        let Some(&(_, reverse_rate)) = observed.get(&reverse) else {
            continue;
        };
        checked.insert(key);
        checked.insert(reverse);

        let product = rate * reverse_rate;
        if !approx_equal(product, 1.0, Tolerance::FxReciprocal) {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "{base}/{quote} ({rate}) and {quote}/{base} ({reverse_rate}) {rate_type} rates on {rate_date} are not reciprocal (product {product:.6})"
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Volatility curves
// ---------------------------------------------------------------------------

fn volatility_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(
        curve_check(ctx),
        ctx.dataset.collection(VOLATILITY_CURVES),
        CURVE_KEY,
        "volatility curve",
    )
}

fn volatility_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = curve_check(ctx);
    let curves = ctx.dataset.collection(VOLATILITY_CURVES);
    let mut violations = field_shapes(check, curves, CURVE_FIELDS);
    violations.extend(nested_field_shapes(check, curves, "points", CURVE_POINT_FIELDS));
    violations
}

fn volatility_points_present(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = curve_check(ctx);
    ctx.dataset
        .collection(VOLATILITY_CURVES)
        .iter()
        .enumerate()
        .filter_map(|(index, record)| {
            checks::non_empty_children(check, index, record, "points", "volatility point")
        })
        .collect()
}

/// Non-positive and unusually high volatilities are distinct violations.
fn volatility_levels(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = curve_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(VOLATILITY_CURVES).iter().enumerate() {
        let Ok(points) = fields::records(record, "points") else {
            continue;
        };
        let location = check.at(index, record);
        for (pos, point) in points.iter().enumerate() {
            let Ok(vol) = fields::number(point, "volatility") else {
                continue;
            };
            if vol <= 0.0 {
                violations.push(check.violation(
                    index,
                    record,
                    format!("{location}: points[{pos}] volatility must be positive (got {vol})"),
                ));
            } else if vol > VOLATILITY_HIGH_THRESHOLD {
                violations.push(check.violation(
                    index,
                    record,
                    format!(
                        "{location}: points[{pos}] volatility {vol} is unusually high (above {VOLATILITY_HIGH_THRESHOLD})"
                    ),
                ));
            }
        }
    }
    violations
}

/// Tenors must be strictly ascending. Scanning a curve stops at its first
/// out-of-order point, so each curve yields at most one violation.
fn volatility_tenor_order(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = curve_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(VOLATILITY_CURVES).iter().enumerate() {
        let Ok(points) = fields::records(record, "points") else {
            continue;
        };
        let mut previous: Option<f64> = None;
        for (pos, point) in points.iter().enumerate() {
            let Ok(tenor) = fields::number(point, "tenorDays") else {
                continue;
            };
            if let Some(prev) = previous {
                if tenor <= prev {
                    violations.push(check.violation(
                        index,
                        record,
                        format!(
                            "{}: points[{pos}] tenorDays {tenor} is not greater than previous tenor {prev}",
                            check.at(index, record)
                        ),
                    ));
                    break;
                }
            }
            previous = Some(tenor);
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Basket NAVs
// ---------------------------------------------------------------------------

fn basket_nav_duplicate_keys(ctx: &RuleContext<'_>) -> Vec<Violation> {
    find_duplicates(nav_check(ctx), ctx.dataset.collection(BASKET_NAVS), NAV_KEY, "basket NAV")
}

fn basket_nav_fields(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = nav_check(ctx);
    let navs = ctx.dataset.collection(BASKET_NAVS);
    let mut violations = field_shapes(check, navs, NAV_FIELDS);
    violations.extend(nested_field_shapes(check, navs, "constituents", NAV_CONSTITUENT_FIELDS));
    violations
}

fn basket_nav_positive(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = nav_check(ctx);
    ctx.dataset
        .collection(BASKET_NAVS)
        .iter()
        .enumerate()
        .filter_map(|(index, record)| checks::positive(check, index, record, "nav"))
        .collect()
}

/// Negative constituent weights, then the weight sum against 1.0.
fn basket_nav_weights(ctx: &RuleContext<'_>) -> Vec<Violation> {
    let check = nav_check(ctx);
    let mut violations = Vec::new();
    for (index, record) in ctx.dataset.collection(BASKET_NAVS).iter().enumerate() {
        violations.extend(checks::non_empty_children(
            check,
            index,
            record,
            "constituents",
            "constituent",
        ));
        let Ok(constituents) = fields::records(record, "constituents") else {
            continue;
        };
        if constituents.is_empty() {
            continue;
        }
        let location = check.at(index, record);

        let mut sum = 0.0;
        let mut complete = true;
        for (pos, constituent) in constituents.iter().enumerate() {
            match fields::number(constituent, "weight") {
                Ok(weight) => {
                    if weight < 0.0 {
                        violations.push(check.violation(
                            index,
                            record,
                            format!("{location}: constituents[{pos}] has negative weight {weight}"),
                        ));
                    }
                    sum += weight;
                }
                Err(_) => complete = false,
            }
        }

        if complete && !approx_equal(sum, 1.0, Tolerance::NavWeightSum) {
            violations.push(check.violation(
                index,
                record,
                format!(
                    "{location}: constituent weights sum to {sum:.6}, expected 1.0 (tolerance {})",
                    Tolerance::NavWeightSum.epsilon()
                ),
            ));
        }
    }
    violations
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
