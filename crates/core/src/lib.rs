//! Consistency gates for securities-lending datasets.
//!
//! This crate is the rule engine behind the `invgate` tool:
//!
//! - [`Dataset`] -- named collections of JSON records for one [`Domain`].
//! - [`rules`] -- the generic rule catalog, one [`RuleSet`] per domain.
//! - [`jurisdiction`] -- market-specific rules keyed by (market, domain).
//! - [`ValidationEngine`] -- runs rule sets and collects every violation.
//! - [`aggregate`](aggregate::aggregate) -- merges schema and consistency results.

pub mod aggregate;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod fields;
pub mod index;
pub mod jurisdiction;
pub mod keys;
pub mod rules;
pub mod tolerance;
pub mod violation;

pub use aggregate::{SchemaIssue, SchemaOutcome};
pub use dataset::{Dataset, Domain, Record};
pub use engine::ValidationEngine;
pub use error::CoreError;
pub use jurisdiction::{JurisdictionRule, JurisdictionTable};
pub use rules::{Rule, RuleContext, RuleSet};
pub use tolerance::Tolerance;
pub use violation::{Layer, RecordRef, ValidationResult, Violation};
