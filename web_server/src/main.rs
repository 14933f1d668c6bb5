use anyhow::{Context, Result};
use web_server::{
    app_settings::get_app_settings,
    startup::Application,
    telemetry::{get_telemetry_subscriber, init_telemetry_subscriber},
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let env_name = std::env::var("DOCMERGE_ENV").unwrap_or_else(|_| "dev".to_owned());
    let subscriber = get_telemetry_subscriber(
        "docmerge",
        env!("CARGO_PKG_VERSION"),
        &env_name,
        "info",
        std::io::stdout,
    );
    init_telemetry_subscriber(subscriber)?;

    let app_settings = get_app_settings().context("Could not create AppSettings")?;
    let app = Application::build(app_settings).await?;
    app.run_until_stopped().await?;

    Ok(())
}
