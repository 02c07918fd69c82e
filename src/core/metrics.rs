use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    if PROM_HANDLE.get().is_none() {
        let handle = PrometheusBuilder::new().install_recorder()?;
        let _ = PROM_HANDLE.set(handle);
    }
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("http_requests_total", "HTTP responses by status code");
    metrics::describe_histogram!("http_request_duration_seconds", "HTTP request latency");
    metrics::describe_counter!("variants_created_total", "Variants persisted, by strategy");
    metrics::describe_counter!("assignments_created_total", "Assignments created, by mode");
    metrics::describe_counter!("assignments_deactivated_total", "Assignments deactivated");
    metrics::describe_counter!("executions_finished_total", "Executions reaching a final status");
    metrics::describe_counter!(
        "maintenance_executions_deactivated_total",
        "Executions deactivated because their assignment is inactive"
    );
    metrics::describe_counter!(
        "maintenance_executions_linked_total",
        "Orphan executions linked to an assignment"
    );
}
