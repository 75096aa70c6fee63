use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}

fn describe() {
    metrics::describe_counter!("evaluations_total", "Submissions marked evaluated");
    metrics::describe_counter!(
        "evaluation_rejections_total",
        "Evaluation attempts rejected before any state was written"
    );
    metrics::describe_counter!("results_published_total", "Exams whose results were released");
    metrics::describe_counter!(
        "annotation_pages_rendered_total",
        "Answer pages composited with evaluator markings"
    );
}
