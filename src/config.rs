use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Storage provider settings.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TuskyConfig {
    /// API root. Default: "https://api.tusky.io".
    #[serde(default = "default_tusky_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Vault holding the game assets. Default: "sui-craft-vault".
    #[serde(default = "default_vault_name")]
    pub vault_name: String,
}

impl Default for TuskyConfig {
    fn default() -> Self {
        Self {
            base_url: default_tusky_base_url(),
            api_key: None,
            vault_name: default_vault_name(),
        }
    }
}

/// IPFS pinning settings used when publishing.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PinataConfig {
    #[serde(default = "default_pinata_api_url")]
    pub api_url: String,
    #[serde(default = "default_pinata_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub jwt: Option<String>,
}

impl Default for PinataConfig {
    fn default() -> Self {
        Self {
            api_url: default_pinata_api_url(),
            gateway_url: default_pinata_gateway_url(),
            jwt: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Asset downloads kept in flight by the player. Default: 4.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent_downloads(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub tusky: TuskyConfig,
    #[serde(default)]
    pub pinata: PinataConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl RuntimeConfig {
    /// Defaults, then the optional TOML file, then `CRAFT__*` variables
    /// (e.g. `CRAFT__TUSKY__API_KEY`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(Environment::with_prefix("CRAFT").separator("__"))
            .build()?;
        settings.try_deserialize()
    }
}

fn default_tusky_base_url() -> String {
    "https://api.tusky.io".into()
}
fn default_vault_name() -> String {
    "sui-craft-vault".into()
}
fn default_pinata_api_url() -> String {
    "https://api.pinata.cloud".into()
}
fn default_pinata_gateway_url() -> String {
    "https://gateway.pinata.cloud/ipfs".into()
}
fn default_max_concurrent_downloads() -> usize {
    4
}
