//! Wallet layer configuration.
//!
//! Values are layered with [figment]: built-in defaults, then an optional TOML file, then
//! `FORESIGHT_` prefixed environment variables (nested keys separated by `__`, e.g.
//! `FORESIGHT_SIWE__STATEMENT`). Fallback RPC urls additionally honour one named variable per
//! supported chain, see [`RpcFallbacks::apply_env_overrides`].

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use url::Url;

use crate::{balance::RpcFallbacks, error::ConfigError, network::ChainTable};

/// File read by [`WalletConfig::load`] when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "foresight.toml";

/// Prefix of every environment variable read by the configuration.
pub const ENV_PREFIX: &str = "FORESIGHT_";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Backend serving `/api/siwe/*`.
    pub api_url: Url,
    pub siwe: SiweConfig,
    pub approval: ApprovalConfig,
    /// Public RPC endpoints used when the wallet cannot answer balance queries.
    pub rpc: RpcFallbacks,
    /// Chains the wallet may be asked to add before switching.
    pub chains: ChainTable,
    pub timings: Timings,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("http://localhost:3000").expect("valid default url"),
            siwe: SiweConfig::default(),
            approval: ApprovalConfig::default(),
            rpc: RpcFallbacks::default(),
            chains: ChainTable::default(),
            timings: Timings::default(),
        }
    }
}

impl WalletConfig {
    /// The layered figment, without the per-chain RPC overrides.
    pub fn figment(path: Option<&Path>) -> Figment {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads the configuration from defaults, `path` (or [`DEFAULT_CONFIG_FILE`]) and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config: Self = Self::figment(path).extract()?;
        config.rpc.apply_env_overrides(|name| std::env::var(name).ok());
        trace!(?config, "loaded wallet config");
        Ok(config)
    }
}

/// Sign-In with Ethereum settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiweConfig {
    /// Human readable statement included in the message.
    pub statement: String,
    /// Used when the host has no page location.
    pub domain: Option<String>,
    /// Used when the host has no page location.
    pub uri: Option<Url>,
    /// Adds an `Expiration Time` this many seconds after issuance.
    pub expiration_secs: Option<u64>,
}

impl Default for SiweConfig {
    fn default() -> Self {
        Self {
            statement: "Sign in to Foresight".to_string(),
            domain: None,
            uri: None,
            expiration_secs: None,
        }
    }
}

/// EIP-712 domain of the typed approval signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub domain_name: String,
    pub version: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self { domain_name: "Foresight MultiSig".to_string(), version: "1".to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Delay before retrying OKX, which injects itself late.
    pub okx_retry_ms: u64,
    /// Time late wallets get to answer an EIP-6963 request.
    pub announce_settle_ms: u64,
    /// Timeout of backend and fallback RPC requests.
    pub http_timeout_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self { okx_retry_ms: 100, announce_settle_ms: 200, http_timeout_secs: 15 }
    }
}

impl Timings {
    pub fn okx_retry(&self) -> Duration {
        Duration::from_millis(self.okx_retry_ms)
    }

    pub fn announce_settle(&self) -> Duration {
        Duration::from_millis(self.announce_settle_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
