use crate::address::TargetAddress;
use crate::config::ExporterSettings;
use crate::metrics::prom::CertificateMetrics;
use crate::probe::Prober;
use crate::report::log_outcome;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use log::error;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::{net::TcpListener, task, time};

/// Probes one target on a fixed interval and serves the result on `/metrics`.
pub struct Exporter {
    target: TargetAddress,
    prober: Arc<Prober>,
    metrics: Arc<CertificateMetrics>,
    interval: Duration,
    failure_value: Option<i64>,
}

impl Exporter {
    pub fn new(
        target: TargetAddress,
        prober: Prober,
        metrics: CertificateMetrics,
        settings: &ExporterSettings,
    ) -> Exporter {
        Exporter {
            target,
            prober: Arc::new(prober),
            metrics: Arc::new(metrics),
            interval: settings.interval,
            failure_value: settings.failure_value,
        }
    }

    pub fn metrics(&self) -> Arc<CertificateMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Runs one probe on the blocking pool and publishes its outcome.
    pub async fn probe_once(&self) {
        let prober = Arc::clone(&self.prober);
        let target = self.target.clone();
        let started = Instant::now();

        match task::spawn_blocking(move || prober.probe(&target)).await {
            Ok(outcome) => {
                self.metrics
                    .observe_duration(started.elapsed().as_secs_f64());
                log_outcome(&self.target, &outcome);
                self.metrics.record(&outcome, self.failure_value);
            }
            Err(e) => error!("probe of {} did not complete: {}", self.target, e),
        }
    }

    /// Probes forever, one probe at a time.
    pub async fn poll(self: Arc<Self>) {
        loop {
            self.probe_once().await;
            time::sleep(self.interval).await;
        }
    }

    /// Serves `/metrics` on `listener` while the polling loop runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails or the polling loop stops.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        let app = router(self.metrics());
        let exporter = Arc::new(self);
        let poller = task::spawn(exporter.poll());

        let server = axum::serve(listener, app).into_future();

        tokio::select! {
            result = server => {
                result?;
            }
            result = poller => {
                match result {
                    Ok(()) => anyhow::bail!("polling loop stopped"),
                    Err(e) => anyhow::bail!("polling loop panicked: {e}"),
                }
            }
        }

        Ok(())
    }
}

/// Routes `/metrics` to the text encoding of `metrics`.
pub fn router(metrics: Arc<CertificateMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<CertificateMetrics>>) -> Response {
    match metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!("{}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::normalize;

    fn refused_target() -> TargetAddress {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        normalize(&format!("127.0.0.1:{}", port))
    }

    #[tokio::test]
    async fn test_probe_once_records_failure() {
        let settings = ExporterSettings {
            port: 0,
            interval: Duration::from_secs(10),
            failure_value: Some(-1),
        };
        let exporter = Exporter::new(
            refused_target(),
            Prober::new().unwrap(),
            CertificateMetrics::new().unwrap(),
            &settings,
        );

        exporter.probe_once().await;

        let metrics = exporter.metrics();
        assert_eq!(metrics.days_remaining(), Some(-1));
        let output = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(output.contains("certificate_probe_success 0"));
        assert!(output.contains("kind=\"other_connection_error\""));
        assert!(output.contains("certificate_probe_duration_seconds_count 1"));
    }

    #[tokio::test]
    async fn test_first_failure_leaves_days_unpublished() {
        let settings = ExporterSettings {
            port: 0,
            interval: Duration::from_secs(10),
            failure_value: None,
        };
        let exporter = Exporter::new(
            refused_target(),
            Prober::new().unwrap(),
            CertificateMetrics::new().unwrap(),
            &settings,
        );

        exporter.probe_once().await;

        let metrics = exporter.metrics();
        assert_eq!(metrics.days_remaining(), None);
        let output = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(!output.contains("certificate_days_remaining"));
        assert!(output.contains("certificate_probe_success 0"));
    }
}
