//! Prometheus metrics for `/metrics`
use promptgate_core::{PipelineResponse, StageMetric, StageOutcome};
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct ApiMetrics {
    registry: Registry,
    requests: IntCounterVec,
    stage_duration: HistogramVec,
    stage_failures: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("promptgate_requests_total", "Executed requests by response status"),
            &["status"],
        )?;
        let stage_duration = HistogramVec::new(
            HistogramOpts::new("promptgate_stage_duration_ms", "Stage wall time in milliseconds")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 25.0, 100.0]),
            &["stage"],
        )?;
        let stage_failures = IntCounterVec::new(
            Opts::new("promptgate_stage_failures_total", "Requests halted by a failing stage"),
            &["stage"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;
        registry.register(Box::new(stage_failures.clone()))?;

        Ok(Self {
            registry,
            requests,
            stage_duration,
            stage_failures,
        })
    }

    pub fn observe_response(&self, response: &PipelineResponse) {
        let status = serde_json::to_value(response.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        self.requests.with_label_values(&[status.as_str()]).inc();
        self.observe_stages(&response.stages);
    }

    pub fn observe_failure(&self, stage: &str, metrics: &[StageMetric]) {
        self.requests.with_label_values(&["failed"]).inc();
        self.stage_failures.with_label_values(&[stage]).inc();
        self.observe_stages(metrics);
    }

    fn observe_stages(&self, metrics: &[StageMetric]) {
        for metric in metrics.iter().filter(|m| m.outcome != StageOutcome::Skipped) {
            self.stage_duration
                .with_label_values(&[metric.stage.as_str()])
                .observe(metric.duration_ms);
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_is_counted_per_stage() {
        let metrics = ApiMetrics::new().unwrap();
        let stages = vec![StageMetric {
            stage: "command.validate".to_string(),
            outcome: StageOutcome::Failed,
            duration_ms: 0.2,
        }];
        metrics.observe_failure("command.validate", &stages);

        let text = encode(metrics.registry()).unwrap();
        assert!(text.contains("promptgate_requests_total{status=\"failed\"} 1"));
        assert!(text.contains("promptgate_stage_failures_total{stage=\"command.validate\"} 1"));
        assert!(text.contains("promptgate_stage_duration_ms_count{stage=\"command.validate\"} 1"));
    }
}
