use anyhow::Context;
use mux_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    mux_telemetry::init(&settings.telemetry);

    tracing::info!(
        env = ?settings.environment,
        engine = ?settings.database.engine,
        "mux-app bootstrap starting"
    );

    mux_app::serve(&settings).await
}
