use std::collections::HashMap;
use std::env;

use tracing::{Subscriber, subscriber::set_global_default};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
};

/// Environment variable naming a directory for an extra plain-text log file.
pub const LOGS_DIR_ENV: &str = "DOCMERGE_LOGS_DIR";

pub fn get_telemetry_subscriber<Sink>(
    name: &str,
    version: &str,
    env_name: &str,
    env_filter: &str,
    sink: Sink,
) -> impl Subscriber + Send + Sync + use<Sink>
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    // Every bunyan record carries the service version and environment
    let default_fields = HashMap::from([
        ("version".to_owned(), serde_json::Value::from(version)),
        ("env".to_owned(), serde_json::Value::from(env_name)),
    ]);
    let formatting_layer =
        BunyanFormattingLayer::with_default_fields(name.to_owned(), sink, default_fields);

    // Optionally mirror everything into a log file that outlives the process
    let maybe_file_layer = match env::var(LOGS_DIR_ENV) {
        Ok(logs_dir) => {
            let file_appender =
                tracing_appender::rolling::never(logs_dir, format!("{name}.log"));
            let file_layer = fmt::layer().with_ansi(false).with_writer(file_appender);
            Some(file_layer)
        }
        Err(_) => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .with(maybe_file_layer)
}

/// Initialise the telemetry stack by setting up the global
/// default telemetry subscriber. The subscriber will handle log and tracing
/// events based on the pre-configured layers.
pub fn init_telemetry_subscriber(subscriber: impl Subscriber + Send + Sync) -> anyhow::Result<()> {
    LogTracer::init()?;
    set_global_default(subscriber)?;
    Ok(())
}
