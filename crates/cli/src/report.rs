//! Rendering a [`ValidationResult`] for people or for other tools.

use std::fmt::Write as _;

use invgate_core::{Layer, ValidationResult};

/// Output format for the rendered report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    /// Grouped, human-readable lines.
    Text,
    /// The result serialized as pretty-printed JSON.
    Json,
}

impl ReportFormat {
    /// Case-insensitive parse of `text` or `json`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn render(result: &ValidationResult, format: ReportFormat) -> serde_json::Result<String> {
    match format {
        ReportFormat::Text => Ok(render_text(result)),
        ReportFormat::Json => serde_json::to_string_pretty(result),
    }
}

/// Violations grouped by layer then category, each line in the
/// `"<category>: <message>"` form, followed by per-category counts.
pub fn render_text(result: &ValidationResult) -> String {
    let mut out = String::new();
    let status = if result.success { "PASSED" } else { "FAILED" };
    let _ = writeln!(out, "Validation {status}: {} violation(s)", result.len());

    for layer in [Layer::Schema, Layer::Consistency] {
        let violations: Vec<_> = result.violations.iter().filter(|v| v.layer == layer).collect();
        if violations.is_empty() {
            continue;
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", layer.as_str());
        for violation in violations {
            let _ = writeln!(out, "  - {}", violation.render());
        }
    }

    let summary = result.summary();
    if !summary.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Summary:");
        for ((layer, category), count) in summary {
            let _ = writeln!(out, "  {:<12} {category}: {count}", layer.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use invgate_core::{Domain, Violation};

    fn failing() -> ValidationResult {
        ValidationResult::from_violations(vec![
            Violation::consistency(
                Domain::MarketData,
                "Price Consistency",
                "prices[0] (AAPL): has both price and bid/ask; supply one or the other",
                None,
            ),
            Violation::consistency(
                Domain::InventoryData,
                "Taiwan market rule violation",
                "inventory[0] (2330): borrowed shares cannot be marked FOR_LOAN",
                None,
            ),
        ])
    }

    #[test]
    fn text_report_keeps_category_prefixes() {
        let text = render_text(&failing());
        assert!(text.starts_with("Validation FAILED: 2 violation(s)"));
        assert!(text.contains("  - Price Consistency: prices[0] (AAPL): has both price and bid/ask"));
        assert!(text.contains("  - Taiwan market rule violation: inventory[0] (2330)"));
        assert!(text.contains("Summary:"));
    }

    #[test]
    fn passing_text_report_is_one_line() {
        assert_eq!(render_text(&ValidationResult::passed()), "Validation PASSED: 0 violation(s)\n");
    }

    #[test]
    fn json_report_is_the_serialized_result() {
        let json = render(&failing(), ReportFormat::Json).unwrap();
        let back: ValidationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failing());
    }

    #[test]
    fn format_parse_is_case_insensitive() {
        assert_eq!(ReportFormat::parse(" Text "), Some(ReportFormat::Text));
        assert_eq!(ReportFormat::parse("JSON"), Some(ReportFormat::Json));
        assert_eq!(ReportFormat::parse("yaml"), None);
    }
}
