//! Emitted samples and metric name helpers.

use super::MetricKind;

/// Process-wide namespace prefixed to every metric name.
pub const NAMESPACE: &str = "querymon";

/// One emitted data point.
///
/// Produced by the translator and forwarded as-is to the exposition layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Fully-qualified name: `namespace_context_metric`.
    pub name: String,
    /// Help text from the definition's value column description.
    pub help: String,
    pub kind: MetricKind,
    pub value: f64,
    /// Label name/value pairs, in definition order.
    pub labels: Vec<(String, String)>,
}

/// Joins the non-empty name parts with `_`.
///
/// Returns an empty string when `name` itself is empty, so callers can
/// detect an unusable metric name.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Turns a database-sourced identifier into a metric name segment.
///
/// Spaces become underscores; parentheses, forward slashes and asterisks
/// are removed; the result is lower-cased.
pub fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| match c {
            ' ' => Some('_'),
            '(' | ')' | '/' | '*' => None,
            c => Some(c),
        })
        .collect::<String>()
        .to_lowercase()
}

/// Checks `name` against the exposition grammar `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Checks `name` against `[a-zA-Z_][a-zA-Z0-9_]*`. Names starting with `__`
/// are reserved.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    !name.starts_with("__")
        && chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// True when `segment` can follow `namespace_` in a metric name.
pub(crate) fn is_valid_name_segment(segment: &str) -> bool {
    segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
