//! Conversion of samples into Prometheus metric families.

use std::collections::BTreeMap;

use prometheus::proto::{self, LabelPair, Metric, MetricFamily, MetricType};
use tracing::warn;

use crate::metric::{MetricKind, Sample};

fn metric_type(kind: MetricKind) -> MetricType {
    match kind {
        MetricKind::Gauge => MetricType::GAUGE,
        MetricKind::Counter => MetricType::COUNTER,
    }
}

/// Groups samples by name into metric families.
///
/// The first sample of a name fixes the family's help text and type; later
/// samples of a conflicting type are dropped.
pub(crate) fn into_families(samples: Vec<Sample>) -> Vec<MetricFamily> {
    let mut families: BTreeMap<String, MetricFamily> = BTreeMap::new();

    for sample in samples {
        let family = families.entry(sample.name.clone()).or_insert_with(|| {
            let mut family = MetricFamily::default();
            family.set_name(sample.name.clone());
            family.set_help(sample.help.clone());
            family.set_field_type(metric_type(sample.kind));
            family
        });

        if family.get_field_type() != metric_type(sample.kind) {
            warn!(
                name = %sample.name,
                kind = %sample.kind,
                "sample type conflicts with an earlier sample of the same name, dropping"
            );
            continue;
        }
        family.mut_metric().push(to_metric(&sample));
    }

    families.into_values().collect()
}

fn to_metric(sample: &Sample) -> Metric {
    let mut metric = Metric::default();
    for (name, value) in &sample.labels {
        let mut pair = LabelPair::default();
        pair.set_name(name.clone());
        pair.set_value(value.clone());
        metric.mut_label().push(pair);
    }
    match sample.kind {
        MetricKind::Gauge => {
            let mut gauge = proto::Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);
        }
        MetricKind::Counter => {
            let mut counter = proto::Counter::default();
            counter.set_value(sample.value);
            metric.set_counter(counter);
        }
    }
    metric
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, kind: MetricKind, value: f64, labels: &[(&str, &str)]) -> Sample {
        Sample {
            name: name.to_string(),
            help: format!("help for {name}"),
            kind,
            value,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn samples_with_same_name_share_a_family() {
        let families = into_families(vec![
            sample("querymon_db_size", MetricKind::Gauge, 1.0, &[("datname", "a")]),
            sample("querymon_db_size", MetricKind::Gauge, 2.0, &[("datname", "b")]),
            sample("querymon_db_commits", MetricKind::Counter, 7.0, &[]),
        ]);

        assert_eq!(families.len(), 2);
        let commits = &families[0];
        assert_eq!(commits.get_name(), "querymon_db_commits");
        assert_eq!(commits.get_field_type(), MetricType::COUNTER);
        assert_eq!(commits.get_metric()[0].get_counter().get_value(), 7.0);

        let size = &families[1];
        assert_eq!(size.get_metric().len(), 2);
        assert_eq!(size.get_help(), "help for querymon_db_size");
        let label = &size.get_metric()[1].get_label()[0];
        assert_eq!(label.get_name(), "datname");
        assert_eq!(label.get_value(), "b");
        assert_eq!(size.get_metric()[1].get_gauge().get_value(), 2.0);
    }

    #[test]
    fn conflicting_kind_is_dropped() {
        let families = into_families(vec![
            sample("querymon_x", MetricKind::Gauge, 1.0, &[]),
            sample("querymon_x", MetricKind::Counter, 2.0, &[]),
        ]);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].get_metric().len(), 1);
    }
}
