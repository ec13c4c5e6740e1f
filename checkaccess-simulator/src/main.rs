use checkaccess_simulator::{Application, SimulatorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SimulatorConfig::from_args()?;

    let log_level = if config.verbose { "info" } else { "warn,checkaccess_simulator=info" };
    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    service_core::observability::init_tracing(
        "checkaccess-simulator",
        log_level,
        otlp_endpoint.as_deref(),
    )?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
