use anyhow::{anyhow, Context, Result};
use ::config::{Config, Environment, File, Map};
use std::path::Path;
use tracing::{debug, info};

use super::AppConfig;

const DEFAULT_CONFIG_FILE: &str = "regime.toml";
const ENV_PREFIX: &str = "MARKET";

/// Layers built-in defaults, the TOML file and `MARKET_<SECTION>__<KEY>`
/// environment variables, in that order of precedence.
///
/// An explicit `path` must exist; the default `regime.toml` is optional.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    load_layers(path, None)
}

/// `env` replaces the process environment when set.
fn load_layers(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<AppConfig> {
    let file = match path {
        Some(p) => File::from(p).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config: AppConfig = Config::builder()
        .add_source(Config::try_from(&AppConfig::default())?)
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to assemble configuration")?
        .try_deserialize()
        .context("Invalid configuration values")?;

    if let Err(errors) = config.validate() {
        return Err(anyhow!("Invalid configuration: {}", errors.join(", ")));
    }

    match path {
        Some(p) => info!("Configuration loaded from {}", p.display()),
        None => debug!("Configuration loaded from defaults and environment"),
    }

    Ok(config)
}

/// The built-in defaults rendered as a TOML document.
pub fn default_config_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to render default configuration")
}
