//! Declarative metric definitions and their translation into samples.
//!
//! A [`MetricDefinition`] maps one SQL query to one or more samples per
//! result row. Definitions are loaded from TOML into a [`MetricCatalog`],
//! validated once at startup and shared read-only by every scrape cycle.

mod definition;
mod kind;
mod sample;
mod translate;

pub use definition::{MetricCatalog, MetricDefinition};
pub use kind::MetricKind;
pub use sample::{
    NAMESPACE, Sample, build_fq_name, is_valid_label_name, is_valid_metric_name, sanitize_name,
};
pub use translate::translate;
