use std::path::PathBuf;

use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Clone, Deserialize)]
pub struct AppSettings {
    pub application: WebServerConfig,
    pub uploads: UploadsConfig,
}

#[derive(Clone, Deserialize)]
pub struct UploadsConfig {
    /// Upper bound for the whole multipart body of an upload request
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_payload_bytes: usize,
    /// Directory in which the process temp directory is created.
    /// Falls back to the system temp directory.
    #[serde(default)]
    pub temp_root: Option<String>,
}

#[derive(Clone, Deserialize)]
pub struct WebServerConfig {
    /// Host where to bind the web server
    pub host: String,
    /// Port to bind the web server to and listen for requests
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
}

pub fn get_app_settings() -> Result<AppSettings, config::ConfigError> {
    let mut base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("Cannot determine current dir: {e}")))?;

    // Integration tests run from within the crate directory
    let crate_name = env!("CARGO_CRATE_NAME");
    if base_path.ends_with(crate_name) {
        base_path.pop();
    }

    let config_dir = base_path.join("resources").join("config");

    // Optional extra YML file, e.g. one mounted into a container
    let env_config_file = std::env::var("ENV_CONFIG_FILE").ok();

    let builder =
        config::Config::builder().add_source(config::File::from(config_dir.join("base.yml")));

    let builder = match env_config_file {
        Some(file_path) => builder.add_source(config::File::from(PathBuf::from(file_path))),
        None => builder,
    };

    let builder = builder
        .add_source(
            // Any value can be overridden with `APP_` variables, e.g.
            // APP_APPLICATION__PORT=3000
            // APP_UPLOADS__MAX_PAYLOAD_BYTES=104857600
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    builder.try_deserialize::<AppSettings>()
}
