use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Pipeline counters exposed on `GET /metrics`.
pub struct Metrics {
    registry: Registry,
    pub logs_ingested_total: IntCounter,
    pub logs_rejected_total: IntCounter,
    pub probes_total: IntCounter,
    pub probe_failures_total: IntCounter,
    pub analyses_total: IntCounter,
    pub alerts_created_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let logs_ingested_total =
            IntCounter::new("apiwatch_logs_ingested_total", "Logs accepted for ingestion")?;
        let logs_rejected_total =
            IntCounter::new("apiwatch_logs_rejected_total", "Logs rejected by validation")?;
        let probes_total = IntCounter::new("apiwatch_probes_total", "Probe firings")?;
        let probe_failures_total =
            IntCounter::new("apiwatch_probe_failures_total", "Probe firings with success=false")?;
        let analyses_total =
            IntCounter::new("apiwatch_analyses_total", "Analysis events produced")?;
        let alerts_created_total =
            IntCounter::new("apiwatch_alerts_created_total", "Alerts created")?;

        registry.register(Box::new(logs_ingested_total.clone()))?;
        registry.register(Box::new(logs_rejected_total.clone()))?;
        registry.register(Box::new(probes_total.clone()))?;
        registry.register(Box::new(probe_failures_total.clone()))?;
        registry.register(Box::new(analyses_total.clone()))?;
        registry.register(Box::new(alerts_created_total.clone()))?;

        Ok(Self {
            registry,
            logs_ingested_total,
            logs_rejected_total,
            probes_total,
            probe_failures_total,
            analyses_total,
            alerts_created_total,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
