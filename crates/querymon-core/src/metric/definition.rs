//! Metric definitions and the TOML catalog they are loaded from.
//!
//! File format (one `[[metric]]` table per definition):
//!
//! ```toml
//! [[metric]]
//! context = "sessions"
//! labels = ["datname"]
//! request = "SELECT datname, count(*) AS active FROM pg_stat_activity GROUP BY datname"
//! ignorezeroresult = true
//! [metric.metricsdesc]
//! active = "Number of active sessions per database."
//! [metric.metricstype]
//! active = "gauge"
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use super::MetricKind;
use super::sample::{is_valid_label_name, is_valid_name_segment};
use crate::error::ConfigError;

/// One configured query-to-metrics mapping.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MetricDefinition {
    /// Name segment between the namespace and the metric name.
    pub context: String,
    /// Columns whose values become label values, in label order.
    pub labels: Vec<String>,
    /// Value column name → help text.
    #[serde(rename = "metricsdesc")]
    pub value_columns: BTreeMap<String, String>,
    /// Value column name → kind token (`gauge` or `counter`).
    #[serde(rename = "metricstype")]
    pub value_kinds: HashMap<String, String>,
    /// Column whose value replaces the column name in the metric name.
    #[serde(rename = "fieldtoappend")]
    pub name_field: Option<String>,
    /// When false, a scrape yielding no samples is reported as an error.
    #[serde(rename = "ignorezeroresult")]
    pub ignore_zero_rows: bool,
    /// SQL text to execute.
    #[serde(rename = "request")]
    pub query: String,
}

impl MetricDefinition {
    /// Returns the name field when field-derived naming is in effect.
    pub fn field_naming(&self) -> Option<&str> {
        self.name_field
            .as_deref()
            .map(str::trim)
            .filter(|field| !field.is_empty())
    }

    /// Checks the invariants every scrape relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.trim().is_empty() {
            return Err(ConfigError::EmptyQuery {
                context: self.context.clone(),
            });
        }
        if self.value_columns.is_empty() {
            return Err(ConfigError::NoValueColumns {
                context: self.context.clone(),
            });
        }
        for column in self.value_kinds.keys() {
            MetricKind::resolve(column, &self.value_kinds)?;
        }

        if !is_valid_name_segment(&self.context) {
            return Err(self.invalid_name("context", &self.context));
        }
        if let Some(label) = self.labels.iter().find(|l| !is_valid_label_name(l)) {
            return Err(self.invalid_name("label", label));
        }
        if self.field_naming().is_none() {
            if let Some(column) = self.value_columns.keys().find(|c| !is_valid_name_segment(c)) {
                return Err(self.invalid_name("value column", column));
            }
        }
        Ok(())
    }

    fn invalid_name(&self, what: &'static str, name: &str) -> ConfigError {
        ConfigError::InvalidName {
            context: self.context.clone(),
            what,
            name: name.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct DefinitionFile {
    #[serde(default)]
    metric: Vec<MetricDefinition>,
}

/// Validated, ordered set of metric definitions.
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    definitions: Vec<MetricDefinition>,
}

impl MetricCatalog {
    /// Builds a catalog, rejecting the first invalid definition.
    pub fn new(definitions: Vec<MetricDefinition>) -> Result<Self, ConfigError> {
        for definition in &definitions {
            definition.validate()?;
            if definition.field_naming().is_some() && !definition.labels.is_empty() {
                warn!(
                    context = %definition.context,
                    "fieldtoappend is set; labels of this definition are ignored"
                );
            }
        }
        Ok(Self { definitions })
    }

    /// Parses a TOML document. `origin` names the source in error messages.
    pub fn from_toml_str(origin: &str, text: &str) -> Result<Self, ConfigError> {
        let file: DefinitionFile =
            toml::from_str(text).map_err(|error| ConfigError::Definitions {
                origin: origin.to_string(),
                error,
            })?;
        Self::new(file.metric)
    }

    /// Loads definitions from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let catalog = Self::from_toml_str(&path.display().to_string(), &text)?;
        info!(path = %path.display(), definitions = catalog.len(), "loaded metric definitions");
        Ok(catalog)
    }

    /// Loads the default definitions and appends the custom ones, if any.
    pub fn load_with_custom(
        default_path: &Path,
        custom_path: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let mut catalog = Self::load(default_path)?;
        match custom_path {
            Some(path) => catalog.extend(Self::load(path)?),
            None => info!("no custom metrics defined"),
        }
        Ok(catalog)
    }

    /// Appends another catalog's definitions after this one's.
    pub fn extend(&mut self, other: MetricCatalog) {
        self.definitions.extend(other.definitions);
    }

    pub fn definitions(&self) -> &[MetricDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
