//! Row-to-sample translation.
//!
//! Two naming strategies, selected per definition:
//! - label-based (`fieldtoappend` unset): `namespace_context_column`, with
//!   the definition's labels resolved from the row;
//! - field-derived (`fieldtoappend` set): `namespace_context_<sanitized field value>`,
//!   with no labels at all.

use tracing::{debug, warn};

use super::{
    MetricDefinition, MetricKind, NAMESPACE, Sample, build_fq_name, is_valid_metric_name,
    sanitize_name,
};
use crate::db::NormalizedRow;

/// Translates one normalized row into samples, one per parsable value column.
///
/// Columns whose value is not a float are logged and skipped; the rest of
/// the row is still translated.
pub fn translate(definition: &MetricDefinition, row: &NormalizedRow) -> Vec<Sample> {
    let labels: Vec<(String, String)> = definition
        .labels
        .iter()
        .map(|label| (label.clone(), row.value(label).to_string()))
        .collect();

    let mut samples = Vec::with_capacity(definition.value_columns.len());

    for (column, help) in &definition.value_columns {
        let raw = row.value(column);
        let value = match raw.trim().parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    context = %definition.context,
                    metric = %column,
                    help = %help,
                    value = %raw,
                    "unable to convert current value to float"
                );
                continue;
            }
        };

        let kind = match MetricKind::resolve(column, &definition.value_kinds) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(context = %definition.context, error = %e, "skipping column");
                continue;
            }
        };

        let (name, sample_labels) = match definition.field_naming() {
            None => (
                build_fq_name(NAMESPACE, &definition.context, column),
                labels.clone(),
            ),
            Some(field) => (
                build_fq_name(
                    NAMESPACE,
                    &definition.context,
                    &sanitize_name(row.value(field)),
                ),
                Vec::new(),
            ),
        };

        if name.is_empty() {
            warn!(
                context = %definition.context,
                metric = %column,
                "empty metric name derived from row, skipping"
            );
            continue;
        }
        if !is_valid_metric_name(&name) {
            warn!(
                context = %definition.context,
                metric = %column,
                name = %name,
                "invalid metric name derived from row, skipping"
            );
            continue;
        }

        debug!(name = %name, value, "query result");
        samples.push(Sample {
            name,
            help: help.clone(),
            kind,
            value,
            labels: sample_labels,
        });
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> MetricDefinition {
        MetricDefinition {
            context: "tablespace".to_string(),
            labels: vec!["name".to_string(), "type".to_string()],
            value_columns: [
                ("bytes".to_string(), "Used bytes.".to_string()),
                ("max_bytes".to_string(), "Max bytes.".to_string()),
            ]
            .into_iter()
            .collect(),
            value_kinds: [("max_bytes".to_string(), "counter".to_string())]
                .into_iter()
                .collect(),
            query: "SELECT 1".to_string(),
            ..Default::default()
        }
    }

    fn row(entries: &[(&str, &str)]) -> NormalizedRow {
        entries.iter().copied().collect()
    }

    #[test]
    fn label_based_naming_emits_one_sample_per_column() {
        let samples = translate(
            &definition(),
            &row(&[
                ("name", "SYSTEM"),
                ("type", "PERMANENT"),
                ("bytes", " 1024 "),
                ("max_bytes", "4096.5"),
            ]),
        );

        assert_eq!(samples.len(), 2);
        let bytes = samples.iter().find(|s| s.name == "querymon_tablespace_bytes").unwrap();
        assert_eq!(bytes.value, 1024.0);
        assert_eq!(bytes.kind, MetricKind::Gauge);
        assert_eq!(bytes.help, "Used bytes.");
        assert_eq!(
            bytes.labels,
            vec![
                ("name".to_string(), "SYSTEM".to_string()),
                ("type".to_string(), "PERMANENT".to_string()),
            ]
        );

        let max = samples
            .iter()
            .find(|s| s.name == "querymon_tablespace_max_bytes")
            .unwrap();
        assert_eq!(max.value, 4096.5);
        assert_eq!(max.kind, MetricKind::Counter);
    }

    #[test]
    fn unparsable_column_is_skipped_without_dropping_others() {
        let samples = translate(
            &definition(),
            &row(&[("name", "USERS"), ("bytes", "n/a"), ("max_bytes", "10")]),
        );
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "querymon_tablespace_max_bytes");
    }

    #[test]
    fn missing_label_column_yields_empty_label_value() {
        let samples = translate(&definition(), &row(&[("bytes", "1"), ("max_bytes", "2")]));
        assert_eq!(samples.len(), 2);
        for sample in samples {
            assert_eq!(
                sample.labels,
                vec![
                    ("name".to_string(), String::new()),
                    ("type".to_string(), String::new()),
                ]
            );
        }
    }

    #[test]
    fn field_derived_naming_drops_labels() {
        let mut def = definition();
        def.value_columns = [("value".to_string(), "Wait time.".to_string())]
            .into_iter()
            .collect();
        def.name_field = Some("wait_class".to_string());

        let samples = translate(
            &def,
            &row(&[
                ("name", "ignored"),
                ("wait_class", "User I/O (Disk)"),
                ("value", "12"),
            ]),
        );
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "querymon_tablespace_user_io_disk");
        assert!(samples[0].labels.is_empty());
        assert_eq!(samples[0].value, 12.0);
    }

    #[test]
    fn empty_field_value_is_skipped() {
        let mut def = definition();
        def.name_field = Some("wait_class".to_string());
        let samples = translate(&def, &row(&[("bytes", "1"), ("max_bytes", "2")]));
        assert!(samples.is_empty());
    }

    #[test]
    fn field_value_outside_name_grammar_is_skipped() {
        let mut def = definition();
        def.context = "wait".to_string();
        def.value_columns = [("sessions".to_string(), "Waiting sessions.".to_string())]
            .into_iter()
            .collect();
        def.name_field = Some("kind".to_string());

        let bad = translate(&def, &row(&[("kind", "Client-IO"), ("sessions", "3")]));
        assert!(bad.is_empty());

        let dotted = translate(&def, &row(&[("kind", "io.read"), ("sessions", "1")]));
        assert!(dotted.is_empty());

        let good = translate(&def, &row(&[("kind", "Lock"), ("sessions", "2")]));
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].name, "querymon_wait_lock");
    }

    #[test]
    fn all_columns_unparsable_yields_no_samples() {
        let samples = translate(&definition(), &row(&[("bytes", ""), ("max_bytes", "x")]));
        assert!(samples.is_empty());
    }
}
