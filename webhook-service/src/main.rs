use metrics_exporter_prometheus::PrometheusBuilder;
use webhook_service::{Application, WebhookConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WebhookConfig::load()?;

    service_core::observability::init_tracing(
        "webhook-service",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    let metrics = PrometheusBuilder::new().install_recorder()?;

    let application = Application::build(config, Some(metrics)).await?;
    application.run_until_stopped().await?;

    Ok(())
}
