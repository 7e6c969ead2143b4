//! Market-specific regulatory rules, registered by (market, domain).
//!
//! Generic rule sets stay market-agnostic; every jurisdiction-gated check
//! lives here as a [`JurisdictionRule`] and only looks at records whose
//! `market` matches its own. Adding a jurisdiction means registering more
//! rules, never editing the generic catalog.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{FixedOffset, NaiveTime};

use crate::dataset::{Domain, Record};
use crate::fields::{self, FieldError};
use crate::rules::calculation_data::CALC_TYPE_FOR_LOAN;
use crate::rules::inventory_data::INVENTORY;
use crate::rules::position_data::POSITIONS;
use crate::rules::reference_data::SECURITIES;
use crate::rules::RuleContext;
use crate::violation::{Check, Violation};

// ---------------------------------------------------------------------------
// Markets and categories
// ---------------------------------------------------------------------------

pub const MARKET_JAPAN: &str = "JP";
pub const MARKET_TAIWAN: &str = "TW";

pub const CATEGORY_JAPAN: &str = "Japan market rule violation";
pub const CATEGORY_TAIWAN: &str = "Taiwan market rule violation";

/// Activity type for securities lending and borrowing.
pub const ACTIVITY_SLAB: &str = "SLAB";

/// JST is UTC+9 with no daylight saving.
const JST_OFFSET_SECS: i32 = 9 * 3600;

/// Position-data SLAB cutoff, local Tokyo time.
pub const JAPAN_POSITION_SLAB_CUTOFF: (u32, u32) = (13, 30);
/// Inventory-data SLAB cutoff, local Tokyo time. Distinct from
/// [`JAPAN_POSITION_SLAB_CUTOFF`].
pub const JAPAN_INVENTORY_SLAB_CUTOFF: (u32, u32) = (15, 0);

// ---------------------------------------------------------------------------
// Rule trait and table
// ---------------------------------------------------------------------------

/// An additional rule that applies only to one market within one domain.
pub trait JurisdictionRule: Send + Sync {
    fn market(&self) -> &'static str;
    fn domain(&self) -> Domain;
    fn name(&self) -> &'static str;
    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Violation>;
}

impl fmt::Debug for dyn JurisdictionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JurisdictionRule")
            .field("market", &self.market())
            .field("domain", &self.domain())
            .field("name", &self.name())
            .finish()
    }
}

/// Read-only registry of jurisdiction rules.
#[derive(Debug, Default)]
pub struct JurisdictionTable {
    entries: BTreeMap<Domain, BTreeMap<&'static str, Vec<Box<dyn JurisdictionRule>>>>,
}

impl JurisdictionTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in Japan and Taiwan rules.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(TaiwanNoRelending);
        table.register(JapanSlabCutoff {
            domain: Domain::PositionData,
            collection: POSITIONS,
            type_field: "positionType",
            timestamp_field: "tradeTimestamp",
            cutoff: JAPAN_POSITION_SLAB_CUTOFF,
            key_field: "positionId",
        });
        table.register(JapanSlabCutoff {
            domain: Domain::InventoryData,
            collection: INVENTORY,
            type_field: "activityType",
            timestamp_field: "lastUpdated",
            cutoff: JAPAN_INVENTORY_SLAB_CUTOFF,
            key_field: "securityId",
        });
        table.register(JapanQuantoSettlement);
        table
    }

    /// Add a rule. Tables are not modified once shared.
    pub fn register(&mut self, rule: impl JurisdictionRule + 'static) {
        self.entries
            .entry(rule.domain())
            .or_default()
            .entry(rule.market())
            .or_default()
            .push(Box::new(rule));
    }

    pub fn rules_for(&self, market: &str, domain: Domain) -> &[Box<dyn JurisdictionRule>] {
        self.entries
            .get(&domain)
            .and_then(|by_market| by_market.get(market))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All rules registered for `domain`, ordered by market code.
    pub fn rules_for_domain(&self, domain: Domain) -> impl Iterator<Item = &dyn JurisdictionRule> {
        self.entries
            .get(&domain)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flat_map(|rules| rules.iter().map(|r| &**r))
    }

    pub fn markets(&self) -> Vec<&'static str> {
        let mut markets: Vec<_> = self
            .entries
            .values()
            .flat_map(|by_market| by_market.keys().copied())
            .collect();
        markets.sort_unstable();
        markets.dedup();
        markets
    }

    pub fn len(&self) -> usize {
        self.entries
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Records of `collection` whose `market` equals `market`.
fn market_records<'a>(
    ctx: &RuleContext<'a>,
    collection: &str,
    market: &'a str,
) -> impl Iterator<Item = (usize, &'a Record)> + 'a {
    ctx.dataset
        .collection(collection)
        .iter()
        .enumerate()
        .filter(move |(_, r)| fields::text(r, "market") == Ok(market))
}

// ---------------------------------------------------------------------------
// Taiwan
// ---------------------------------------------------------------------------

/// Borrowed shares may not be offered for loan again.
#[derive(Debug)]
pub struct TaiwanNoRelending;

impl JurisdictionRule for TaiwanNoRelending {
    fn market(&self) -> &'static str {
        MARKET_TAIWAN
    }

    fn domain(&self) -> Domain {
        Domain::InventoryData
    }

    fn name(&self) -> &'static str {
        "taiwan_no_relending"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Violation> {
        let check = Check::new(ctx.domain, CATEGORY_TAIWAN, INVENTORY).keyed_by("securityId");
        market_records(ctx, INVENTORY, MARKET_TAIWAN)
            .filter(|(_, r)| {
                fields::flag(r, "isBorrowed")
                    && fields::text(r, "calculationType") == Ok(CALC_TYPE_FOR_LOAN)
            })
            .map(|(index, record)| {
                check.violation(
                    index,
                    record,
                    format!(
                        "{}: borrowed shares cannot be marked {CALC_TYPE_FOR_LOAN} (re-lending is not permitted)",
                        check.at(index, record)
                    ),
                )
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Japan
// ---------------------------------------------------------------------------

/// SLAB activity must be timestamped strictly before a Tokyo-time cutoff.
#[derive(Debug)]
pub struct JapanSlabCutoff {
    pub domain: Domain,
    pub collection: &'static str,
    pub type_field: &'static str,
    pub timestamp_field: &'static str,
    pub cutoff: (u32, u32),
    pub key_field: &'static str,
}

impl JurisdictionRule for JapanSlabCutoff {
    fn market(&self) -> &'static str {
        MARKET_JAPAN
    }

    fn domain(&self) -> Domain {
        self.domain
    }

    fn name(&self) -> &'static str {
        match self.domain {
            Domain::PositionData => "japan_position_slab_cutoff",
            Domain::InventoryData => "japan_inventory_slab_cutoff",
            _ => "japan_slab_cutoff",
        }
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Violation> {
        let check = Check::new(ctx.domain, CATEGORY_JAPAN, self.collection).keyed_by(self.key_field);
        let (Some(jst), Some(cutoff)) = (
            FixedOffset::east_opt(JST_OFFSET_SECS),
            NaiveTime::from_hms_opt(self.cutoff.0, self.cutoff.1, 0),
        ) else {
            return Vec::new();
        };

        let mut violations = Vec::new();
        for (index, record) in market_records(ctx, self.collection, MARKET_JAPAN) {
            if fields::text(record, self.type_field) != Ok(ACTIVITY_SLAB) {
                continue;
            }
            let stamp = match fields::timestamp(record, self.timestamp_field) {
                Ok(stamp) => stamp,
                Err(err) => {
                    violations.push(check.field_error(index, record, self.timestamp_field, err));
                    continue;
                }
            };
            let local = stamp.with_timezone(&jst).time();
            if local >= cutoff {
                violations.push(check.violation(
                    index,
                    record,
                    format!(
                        "{}: SLAB {} {} JST is not before the {:02}:{:02} JST cutoff",
                        check.at(index, record),
                        self.timestamp_field,
                        local.format("%H:%M:%S"),
                        self.cutoff.0,
                        self.cutoff.1,
                    ),
                ));
            }
        }
        violations
    }
}

/// A quanto security quoted T+1 actually settles T+2.
#[derive(Debug)]
pub struct JapanQuantoSettlement;

impl JurisdictionRule for JapanQuantoSettlement {
    fn market(&self) -> &'static str {
        MARKET_JAPAN
    }

    fn domain(&self) -> Domain {
        Domain::ReferenceData
    }

    fn name(&self) -> &'static str {
        "japan_quanto_settlement"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Violation> {
        let check = Check::new(ctx.domain, CATEGORY_JAPAN, SECURITIES).keyed_by("securityId");
        let mut violations = Vec::new();
        for (index, record) in market_records(ctx, SECURITIES, MARKET_JAPAN) {
            if !fields::flag(record, "isQuanto")
                || fields::text(record, "settlementConvention") != Ok("T+1")
            {
                continue;
            }
            match fields::integer(record, "settlementDays") {
                Ok(2) => {}
                Ok(days) => violations.push(check.violation(
                    index,
                    record,
                    format!(
                        "{}: quanto security with T+1 convention must settle T+2 (settlementDays is {days})",
                        check.at(index, record)
                    ),
                )),
                Err(FieldError::Missing) => violations.push(check.field_error(
                    index,
                    record,
                    "settlementDays",
                    FieldError::Missing,
                )),
                Err(_) => {}
            }
        }
        violations
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
