use crate::report::ReportFormat;

/// Default `tracing` filter when `INVGATE_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "invgate=info,invgate_cli=info,invgate_core=info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be one of text, json (got '{value}')")]
    InvalidFormat { var: &'static str, value: String },
}

/// Tool configuration loaded from environment variables.
///
/// Only presentation and logging are configurable; nothing here changes
/// which rules run or what they report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    /// `tracing_subscriber::EnvFilter` directive.
    pub log_filter: String,
    /// Report format used when `--format` is not given.
    pub report_format: ReportFormat,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.into(),
            report_format: ReportFormat::Text,
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                  |
    /// |-------------------------|--------------------------|
    /// | `INVGATE_LOG`           | [`DEFAULT_LOG_FILTER`]   |
    /// | `INVGATE_REPORT_FORMAT` | `text`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`CliConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let log_filter = lookup("INVGATE_LOG")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.log_filter);

        let report_format = match lookup("INVGATE_REPORT_FORMAT") {
            Some(value) if !value.trim().is_empty() => ReportFormat::parse(&value).ok_or_else(|| {
                ConfigError::InvalidFormat {
                    var: "INVGATE_REPORT_FORMAT",
                    value,
                }
            })?,
            _ => defaults.report_format,
        };

        Ok(Self {
            log_filter,
            report_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = CliConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn overrides_are_read() {
        let config = CliConfig::from_lookup(lookup(&[
            ("INVGATE_LOG", "invgate_core=debug"),
            ("INVGATE_REPORT_FORMAT", "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.log_filter, "invgate_core=debug");
        assert_eq!(config.report_format, ReportFormat::Json);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = CliConfig::from_lookup(lookup(&[("INVGATE_REPORT_FORMAT", "xml")])).unwrap_err();
        assert_matches!(err, ConfigError::InvalidFormat { value, .. } if value == "xml");
    }
}
