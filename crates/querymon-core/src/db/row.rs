//! Row normalization.

use std::collections::HashMap;

use super::Value;

/// One result row as lower-cased column name → textual value.
///
/// Lookups are case-insensitive, so definitions may reference columns in
/// any case regardless of how the driver reports them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRow {
    values: HashMap<String, String>,
}

impl NormalizedRow {
    /// Converts a driver row into its normalized form.
    ///
    /// Columns without a value are treated as null.
    pub fn normalize(columns: &[String], values: &[Value]) -> Self {
        let values = columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let text = values.get(i).map(Value::to_text).unwrap_or_default();
                (column.to_lowercase(), text)
            })
            .collect();
        Self { values }
    }

    /// Returns the value of `column`, if the row has it.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(&column.to_lowercase()).map(String::as_str)
    }

    /// Returns the value of `column`, or an empty string when it is missing.
    pub fn value(&self, column: &str) -> &str {
        self.get(column).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for NormalizedRow
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
                .collect(),
        }
    }
}
