use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use super::{METRIC_LABEL, MetricName, MetricsError, MetricsSink, RESPONSE_INFO_METRIC, URL_LABEL};

/// One published value as seen by a reader of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub url: String,
    pub metric: String,
    pub value: f64,
}

/// Prometheus backed metrics store.
///
/// All samples live in a single `response_info` gauge family labelled by `url` and
/// `metric`, registered in a registry owned by the store. The gauge vector locks
/// internally, so concurrent `publish` calls from different probes are safe.
#[derive(Clone)]
pub struct GaugeStore {
    registry: Registry,
    gauges: GaugeVec,
}

impl GaugeStore {
    pub fn new() -> Result<Self, MetricsError> {
        let gauges = GaugeVec::new(
            Opts::new(
                RESPONSE_INFO_METRIC,
                "Latest HTTP probe measurements by url and metric",
            ),
            &[URL_LABEL, METRIC_LABEL],
        )?;

        let registry = Registry::new();
        registry.register(Box::new(gauges.clone()))?;

        Ok(Self { registry, gauges })
    }

    /// Render the store in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Every sample currently held.
    pub fn samples(&self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for family in self.registry.gather() {
            for metric in family.get_metric() {
                let label = |name: &str| {
                    metric
                        .get_label()
                        .iter()
                        .find(|pair| pair.get_name() == name)
                        .map(|pair| pair.get_value().to_string())
                        .unwrap_or_default()
                };
                samples.push(MetricSample {
                    url: label(URL_LABEL),
                    metric: label(METRIC_LABEL),
                    value: metric.get_gauge().get_value(),
                });
            }
        }
        samples
    }

    /// Latest value for `(url, metric)`, if one was ever published.
    pub fn value(&self, url: &str, metric: MetricName) -> Option<f64> {
        self.samples()
            .into_iter()
            .find(|sample| sample.url == url && sample.metric == metric.as_str())
            .map(|sample| sample.value)
    }

    pub fn samples_for(&self, url: &str) -> Vec<MetricSample> {
        self.samples()
            .into_iter()
            .filter(|sample| sample.url == url)
            .collect()
    }
}

impl MetricsSink for GaugeStore {
    fn publish(&self, url: &str, metric: MetricName, value: f64) {
        self.gauges
            .with_label_values(&[url, metric.as_str()])
            .set(value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_empty_store() {
        let store = GaugeStore::new().expect("store");
        assert!(store.samples().is_empty());
        assert_eq!(store.value("http://example.test", MetricName::StatusCode), None);
    }

    #[test]
    fn test_publish_overwrites() {
        let store = GaugeStore::new().expect("store");
        store.publish("http://example.test", MetricName::TotalTime, 10.0);
        store.publish("http://example.test", MetricName::TotalTime, 4.0);

        assert_eq!(store.samples().len(), 1);
        assert_eq!(store.value("http://example.test", MetricName::TotalTime), Some(4.0));
    }

    #[test]
    fn test_negative_values_are_kept() {
        let store = GaugeStore::new().expect("store");
        store.publish("https://expired.test", MetricName::CertExpiryDate, -12.0);
        assert_eq!(
            store.value("https://expired.test", MetricName::CertExpiryDate),
            Some(-12.0)
        );
    }

    #[test]
    fn test_encode_text_format() {
        let store = GaugeStore::new().expect("store");
        store.publish("http://example.test", MetricName::StatusCode, 200.0);

        let text = store.encode().expect("encode");
        assert!(text.contains("# TYPE response_info gauge"));
        assert!(text.contains(
            r#"response_info{metric="stataus_code",url="http://example.test"} 200"#
        ));
    }

    #[test]
    fn test_concurrent_publish_from_many_threads() {
        let store = Arc::new(GaugeStore::new().expect("store"));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let url = format!("http://host-{i}.test");
                    for round in 0..100 {
                        for metric in MetricName::ALL {
                            store.publish(&url, metric, f64::from(round));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("publisher thread");
        }

        assert_eq!(store.samples().len(), 16 * MetricName::ALL.len());
        for i in 0..16 {
            let url = format!("http://host-{i}.test");
            let samples = store.samples_for(&url);
            assert_eq!(samples.len(), MetricName::ALL.len());
            assert!(samples.iter().all(|sample| sample.value == 99.0));
        }
    }
}
