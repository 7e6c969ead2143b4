//! Rule catalog.
//!
//! A [`Rule`] is a pure function from a dataset and its indices to a list
//! of violations. A [`RuleSet`] groups the rules of one domain with the
//! indices they read. Rules never depend on each other's output, so the
//! order inside a set only affects the order of reported violations.

pub mod calculation_data;
pub mod checks;
pub mod inventory_data;
pub mod market_data;
pub mod position_data;
pub mod reference_data;

use crate::dataset::{Dataset, Domain};
use crate::index::{IndexSpec, Indices};
use crate::violation::Violation;

/// Everything a rule may read during one run.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub domain: Domain,
    pub dataset: &'a Dataset,
    pub indices: &'a Indices<'a>,
}

pub type RuleFn = fn(&RuleContext<'_>) -> Vec<Violation>;

/// A named, pure check.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    check: RuleFn,
}

impl Rule {
    pub const fn new(name: &'static str, check: RuleFn) -> Self {
        Self { name, check }
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<Violation> {
        (self.check)(ctx)
    }
}

/// Ordered rules for one domain plus the indices they need.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub domain: Domain,
    pub name: &'static str,
    pub indices: Vec<IndexSpec>,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// The standard catalog for `domain`.
    pub fn standard(domain: Domain) -> Self {
        match domain {
            Domain::MarketData => market_data::rule_set(),
            Domain::PositionData => position_data::rule_set(),
            Domain::CalculationData => calculation_data::rule_set(),
            Domain::ReferenceData => reference_data::rule_set(),
            Domain::InventoryData => inventory_data::rule_set(),
        }
    }

    /// Standard catalogs for all five domains.
    pub fn standard_all() -> Vec<Self> {
        Domain::ALL.into_iter().map(Self::standard).collect()
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}
