use crate::config::AggregatorConfig;
use crate::error::{Error, Result};
use crate::price_infra::registry::Slot;
use crate::types::ids::{OperatorId, PriceId};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    pub price_id: PriceId,
    #[serde(default)]
    pub sources: Vec<StaticSourceConfig>,
    #[serde(default)]
    pub operators: Vec<OperatorId>,
    #[serde(default)]
    pub log_json: bool,
}

/// A fixed-price source served from memory, for running the engine without
/// live providers.
#[derive(Clone, Debug, Deserialize)]
pub struct StaticSourceConfig {
    pub label: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub key: String,
    pub decimals: u8,
    pub price: i64,
    #[serde(default)]
    pub slot: Option<Slot>,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("PRICEINFRA").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        Self::from_config(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self> {
        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.aggregator.validate()?;
        Ok(app)
    }
}
