//! Value kind resolution for declared metric columns.

use std::collections::HashMap;
use std::fmt;

use crate::error::ConfigError;

/// Value semantics of an emitted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetricKind {
    #[default]
    Gauge,
    Counter,
}

impl MetricKind {
    /// Parses a kind token, case-insensitively.
    ///
    /// An empty token means "not declared" and yields `Gauge`.
    pub fn from_token(token: &str) -> Result<Self, ConfigError> {
        let token = token.trim();
        if token.is_empty() || token.eq_ignore_ascii_case("gauge") {
            Ok(MetricKind::Gauge)
        } else if token.eq_ignore_ascii_case("counter") {
            Ok(MetricKind::Counter)
        } else {
            Err(ConfigError::UnknownKind {
                column: String::new(),
                token: token.to_string(),
            })
        }
    }

    /// Resolves the kind of `column` from a definition's kind map.
    ///
    /// Column lookup is case-insensitive. Columns absent from the map are
    /// gauges; a present but unrecognized token is an error.
    pub fn resolve(column: &str, kinds: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let Some(token) = kinds
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, token)| token)
        else {
            return Ok(MetricKind::Gauge);
        };

        Self::from_token(token).map_err(|_| ConfigError::UnknownKind {
            column: column.to_string(),
            token: token.clone(),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn absent_column_defaults_to_gauge() {
        let map = kinds(&[("commits", "counter")]);
        assert_eq!(
            MetricKind::resolve("sessions", &map).unwrap(),
            MetricKind::Gauge
        );
    }

    #[test]
    fn token_and_column_are_case_insensitive() {
        let map = kinds(&[("Commits", "COUNTER"), ("size", "Gauge")]);
        assert_eq!(
            MetricKind::resolve("commits", &map).unwrap(),
            MetricKind::Counter
        );
        assert_eq!(
            MetricKind::resolve("SIZE", &map).unwrap(),
            MetricKind::Gauge
        );
    }

    #[test]
    fn empty_token_is_gauge() {
        let map = kinds(&[("commits", "")]);
        assert_eq!(
            MetricKind::resolve("commits", &map).unwrap(),
            MetricKind::Gauge
        );
    }

    #[test]
    fn unknown_token_is_rejected_with_column_name() {
        let map = kinds(&[("latency", "histogram")]);
        match MetricKind::resolve("latency", &map) {
            Err(ConfigError::UnknownKind { column, token }) => {
                assert_eq!(column, "latency");
                assert_eq!(token, "histogram");
            }
            other => panic!("expected UnknownKind, got {other:?}"),
        }
    }
}
