use log::error;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Once;

use crate::probe::ProbeOutcome;

/// Gauges describing the last probe of one endpoint.
///
/// Only the polling task writes them; scrapes read them through
/// [`CertificateMetrics::encode`]. The days and expiry gauges are left out of
/// the output until they hold a value.
pub struct CertificateMetrics {
    registry: Registry,
    days_remaining: IntGauge,
    days_published: Once,
    expiry_timestamp: IntGauge,
    expiry_published: Once,
    probe_success: IntGauge,
    probe_failures: IntCounterVec,
    probe_duration: Histogram,
}

impl CertificateMetrics {
    /// Creates the metrics in a fresh registry.
    pub fn new() -> Result<CertificateMetrics, prometheus::Error> {
        Self::with_registry(Registry::new())
    }

    /// Creates the metrics and registers them with `registry`.
    pub fn with_registry(registry: Registry) -> Result<CertificateMetrics, prometheus::Error> {
        let days_remaining = IntGauge::new(
            "certificate_days_remaining",
            "days before expiration of the leaf certificate",
        )?;
        let expiry_timestamp = IntGauge::new(
            "certificate_expiry_timestamp_seconds",
            "notAfter of the leaf certificate as a unix timestamp",
        )?;
        let probe_success = IntGauge::new(
            "certificate_probe_success",
            "1 if the last probe succeeded, 0 otherwise",
        )?;
        let probe_failures = IntCounterVec::new(
            Opts::new(
                "certificate_probe_failures_total",
                "failed probes by failure kind",
            ),
            &["kind"],
        )?;
        let probe_duration = Histogram::with_opts(HistogramOpts::new(
            "certificate_probe_duration_seconds",
            "time spent connecting and reading the certificate",
        ))?;

        registry.register(Box::new(probe_success.clone()))?;
        registry.register(Box::new(probe_failures.clone()))?;
        registry.register(Box::new(probe_duration.clone()))?;

        Ok(CertificateMetrics {
            registry,
            days_remaining,
            days_published: Once::new(),
            expiry_timestamp,
            expiry_published: Once::new(),
            probe_success,
            probe_failures,
            probe_duration,
        })
    }

    /// Publishes one probe outcome.
    ///
    /// On failure the days gauge is overwritten with `failure_value` when one
    /// is set and otherwise keeps the last successful reading. Before the
    /// first success without a `failure_value` it stays unpublished.
    pub fn record(&self, outcome: &ProbeOutcome, failure_value: Option<i64>) {
        match outcome {
            Ok(expiry) => {
                self.set_days_remaining(expiry.days_remaining);
                self.expiry_timestamp.set(expiry.expiry_date.timestamp());
                publish(&self.registry, &self.expiry_published, &self.expiry_timestamp);
                self.probe_success.set(1);
            }
            Err(err) => {
                self.probe_success.set(0);
                self.probe_failures
                    .with_label_values(&[err.kind().as_ref()])
                    .inc();
                if let Some(value) = failure_value {
                    self.set_days_remaining(value);
                }
            }
        }
    }

    fn set_days_remaining(&self, days: i64) {
        self.days_remaining.set(days);
        publish(&self.registry, &self.days_published, &self.days_remaining);
    }

    /// Records how long a probe took.
    pub fn observe_duration(&self, seconds: f64) {
        self.probe_duration.observe(seconds);
    }

    /// The published days value, `None` until one has been set.
    pub fn days_remaining(&self) -> Option<i64> {
        self.days_published
            .is_completed()
            .then(|| self.days_remaining.get())
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes every registered metric in the Prometheus text format.
    pub fn encode(&self) -> Result<Vec<u8>, String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| format!("could not encode metrics: {}", e))?;
        Ok(buffer)
    }
}

/// Registers `gauge` the first time it is written.
fn publish(registry: &Registry, published: &Once, gauge: &IntGauge) {
    published.call_once(|| {
        if let Err(e) = registry.register(Box::new(gauge.clone())) {
            error!("could not register metric: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use crate::probe::CertificateExpiry;
    use chrono::{TimeZone, Utc};

    fn success(days_remaining: i64) -> ProbeOutcome {
        Ok(CertificateExpiry {
            hostname: "example.com".to_string(),
            address: "example.com:443".to_string(),
            expiry_date: Utc.timestamp_opt(1_767_225_600, 0).unwrap(),
            days_remaining,
            subject: Some("example.com".to_string()),
            issuer: None,
        })
    }

    fn failure() -> ProbeOutcome {
        Err(ProbeError::OtherConnectionError {
            address: "example.com:443".to_string(),
            details: "Connection refused (os error 111)".to_string(),
        })
    }

    fn encoded(metrics: &CertificateMetrics) -> String {
        String::from_utf8(metrics.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_success_sets_gauges() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&success(42), None);

        assert_eq!(metrics.days_remaining(), Some(42));
        let output = encoded(&metrics);
        assert!(output.contains("certificate_days_remaining 42"));
        assert!(output.contains("certificate_expiry_timestamp_seconds 1767225600"));
        assert!(output.contains("certificate_probe_success 1"));
    }

    #[test]
    fn test_failure_keeps_last_value() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&success(42), None);
        metrics.record(&failure(), None);

        assert_eq!(metrics.days_remaining(), Some(42));
        let output = encoded(&metrics);
        assert!(output.contains("certificate_probe_success 0"));
        assert!(output.contains(
            "certificate_probe_failures_total{kind=\"other_connection_error\"} 1"
        ));
    }

    #[test]
    fn test_days_unpublished_before_first_success() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&failure(), None);

        assert_eq!(metrics.days_remaining(), None);
        let output = encoded(&metrics);
        assert!(!output.contains("certificate_days_remaining"));
        assert!(!output.contains("certificate_expiry_timestamp_seconds"));
        assert!(output.contains("certificate_probe_success 0"));

        metrics.record(&success(7), None);
        assert!(encoded(&metrics).contains("certificate_days_remaining 7"));
    }

    #[test]
    fn test_first_failure_seeds_failure_value() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&failure(), Some(-1));

        assert_eq!(metrics.days_remaining(), Some(-1));
        let output = encoded(&metrics);
        assert!(output.contains("certificate_days_remaining -1"));
        assert!(!output.contains("certificate_expiry_timestamp_seconds"));
    }

    #[test]
    fn test_failure_value_overwrites() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&success(42), Some(-1));
        metrics.record(&failure(), Some(-1));
        assert_eq!(metrics.days_remaining(), Some(-1));

        metrics.record(&success(41), Some(-1));
        assert_eq!(metrics.days_remaining(), Some(41));
    }

    #[test]
    fn test_negative_days_published() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&success(-3), None);
        assert!(encoded(&metrics).contains("certificate_days_remaining -3"));
    }

    #[test]
    fn test_registry_names() {
        let metrics = CertificateMetrics::new().unwrap();
        metrics.record(&success(42), None);
        metrics.record(&failure(), None);
        metrics.observe_duration(0.25);

        let names: Vec<String> = metrics
            .registry()
            .gather()
            .iter()
            .map(|family| family.name().to_string())
            .collect();

        assert!(names.contains(&"certificate_days_remaining".to_string()));
        assert!(names.contains(&"certificate_expiry_timestamp_seconds".to_string()));
        assert!(names.contains(&"certificate_probe_success".to_string()));
        assert!(names.contains(&"certificate_probe_failures_total".to_string()));
        assert!(names.contains(&"certificate_probe_duration_seconds".to_string()));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        let _first = CertificateMetrics::with_registry(registry.clone()).unwrap();
        assert!(CertificateMetrics::with_registry(registry).is_err());
    }
}
