//! Prometheus metrics shared by the controllers and the admission server

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Controller metrics, cheap to clone
#[derive(Clone)]
pub struct Metrics {
    /// Reconciles by controller and result
    pub reconcile_total: CounterVec,
    /// Reconcile latency in seconds
    pub reconcile_duration_seconds: HistogramVec,
    /// Admission requests by hook, operation and verdict
    pub admission_requests_total: CounterVec,
    pub registry: Arc<Registry>,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let reconcile_total = CounterVec::new(
            Opts::new("canal_reconcile_total", "Total reconciles"),
            &["controller", "result"],
        )?;

        let reconcile_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "canal_reconcile_duration_seconds",
                "Reconcile latency in seconds",
            ),
            &["controller"],
        )?;

        let admission_requests_total = CounterVec::new(
            Opts::new("canal_admission_requests_total", "Total admission requests"),
            &["hook", "operation", "allowed"],
        )?;

        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration_seconds.clone()))?;
        registry.register(Box::new(admission_requests_total.clone()))?;

        Ok(Self {
            reconcile_total,
            reconcile_duration_seconds,
            admission_requests_total,
            registry,
        })
    }

    pub fn record_reconcile(&self, controller: &str, success: bool, elapsed: Duration) {
        let result = if success { "success" } else { "error" };
        self.reconcile_total
            .with_label_values(&[controller, result])
            .inc();
        self.reconcile_duration_seconds
            .with_label_values(&[controller])
            .observe(elapsed.as_secs_f64());
    }

    pub fn record_admission(&self, hook: &str, operation: &str, allowed: bool) {
        let allowed = if allowed { "true" } else { "false" };
        self.admission_requests_total
            .with_label_values(&[hook, operation, allowed])
            .inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_reconcile("service-export", true, Duration::from_millis(5));
        metrics.record_reconcile("service-export", false, Duration::from_millis(5));

        let text = metrics.gather().unwrap();
        assert!(text.contains("canal_reconcile_total"));
        assert!(text.contains("result=\"error\""));
        assert!(text.contains("canal_reconcile_duration_seconds"));
    }

    #[test]
    fn test_admission_metrics_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.record_admission("globaltrafficpolicy", "CREATE", false);
        let text = metrics.gather().unwrap();
        assert!(text.contains("hook=\"globaltrafficpolicy\""));
        assert!(text.contains("allowed=\"false\""));
    }

    #[test]
    fn test_clones_share_registry() {
        let metrics = Metrics::new().unwrap();
        let clone = metrics.clone();
        clone.record_admission("serviceexport", "UPDATE", true);
        assert!(metrics.gather().unwrap().contains("serviceexport"));
    }
}
