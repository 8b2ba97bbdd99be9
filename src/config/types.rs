use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::client::ClientConfig;
use super::logging::LoggingConfig;
use crate::error::Result;

/// Prefix of environment variables merged over the file, e.g.
/// `LEADMAKER_CLIENT__BASE_URL`.
pub const ENV_PREFIX: &str = "LEADMAKER_";

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0: client settings, logging and metrics.
#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
pub struct ConfigV1 {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Toggles the Prometheus recorder.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Load config from a YAML file, with `LEADMAKER_*` environment variables
/// taking precedence. A missing file is not an error: every field has a default.
pub fn load_config(path: impl AsRef<Path>) -> Result<ConfigV1> {
    let figment = Figment::new()
        .merge(Yaml::file(path.as_ref()))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .join(Serialized::default("version", "1.0.0"));
    extract(figment)
}

/// Parse a configuration from an in-memory YAML document.
pub fn load_config_str(yaml: &str) -> Result<ConfigV1> {
    let figment = Figment::new()
        .merge(Yaml::string(yaml))
        .join(Serialized::default("version", "1.0.0"));
    extract(figment)
}

fn extract(figment: Figment) -> Result<ConfigV1> {
    match figment.extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
    // handle configuration migration between versions here when necessary
}

/// The JSON schema for the configuration, pretty-printed.
pub fn config_schema() -> String {
    let schema = schema_for!(Config);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
