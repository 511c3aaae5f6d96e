//! Configuration for the vault agent

pub mod network;

use crate::units::coin_types;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use network::{SuiNetwork, SUI_NETWORK_ENV};

/// Environment variable names
pub mod env_vars {
    pub const PACKAGE_ID: &str = "PACKAGE_ID";
    pub const LLM_PROVIDER: &str = "LLM_PROVIDER";
    pub const LLM_MODEL: &str = "LLM_MODEL";

    pub const AGENT_PRIVATE_KEY: &str = "AGENT_PRIVATE_KEY";
    pub const SPONSOR_PRIVATE_KEY: &str = "SPONSOR_PRIVATE_KEY";

    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const GEMINI_API_KEY: &str = "GEMINI_API_KEY";
    pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
}

/// Deployed vault package on testnet
pub const DEFAULT_PACKAGE_ID: &str =
    "0xbf74c7a7717e74f5074d024e27a5f6d2838d5025e4c67afd758286e3ba6bb31b";

/// Deployed Stablelayer package on mainnet
pub const DEFAULT_STABLE_LAYER_PACKAGE_ID: &str =
    "0xb75744fadcbfc174627567ca29645d0af8f6e6fd01b6f57c75a08cd3fb97c567";

/// Decision source providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Gemini,
    Anthropic,
}

impl LlmProvider {
    pub fn name(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Gemini => "gemini",
            LlmProvider::Anthropic => "anthropic",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o",
            LlmProvider::Gemini => "gemini-2.0-flash",
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => env_vars::OPENAI_API_KEY,
            LlmProvider::Gemini => env_vars::GEMINI_API_KEY,
            LlmProvider::Anthropic => env_vars::ANTHROPIC_API_KEY,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Some(LlmProvider::OpenAi),
            "gemini" => Some(LlmProvider::Gemini),
            "anthropic" => Some(LlmProvider::Anthropic),
            _ => None,
        }
    }

    /// Pick the first provider with an API key present.
    ///
    /// Priority: OPENAI > GEMINI > ANTHROPIC.
    pub fn detect(has_key: impl Fn(&str) -> bool) -> Option<Self> {
        [
            LlmProvider::OpenAi,
            LlmProvider::Gemini,
            LlmProvider::Anthropic,
        ]
        .into_iter()
        .find(|provider| has_key(provider.api_key_env()))
    }
}

/// Vault contract location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Package that publishes the vault module
    pub package_id: String,
    /// Module name inside the package
    pub module_name: String,
    /// Shared clock object passed to time-aware calls
    pub clock_object_id: String,
}

impl ContractConfig {
    /// Fully qualified Move function target
    pub fn target(&self, function: &str) -> String {
        format!("{}::{}::{}", self.package_id, self.module_name, function)
    }
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            package_id: DEFAULT_PACKAGE_ID.to_string(),
            module_name: "agent_vault".to_string(),
            clock_object_id: "0x6".to_string(),
        }
    }
}

/// Coin types used by the swap recipes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinConfig {
    pub sui: String,
    pub usdc: String,
}

impl CoinConfig {
    pub fn for_network(network: SuiNetwork) -> Self {
        Self {
            sui: coin_types::SUI.to_string(),
            usdc: network.usdc_coin_type().to_string(),
        }
    }
}

/// Decision source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Forced provider; detected from API keys when absent
    #[serde(default)]
    pub provider: Option<LlmProvider>,
    /// Model override; provider default when absent
    #[serde(default)]
    pub model: Option<String>,
    /// Timeout for one decision call (milliseconds)
    pub timeout_ms: u64,
    /// Maximum response tokens
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn model_for(&self, provider: LlmProvider) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string())
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: None,
            timeout_ms: 30_000,
            max_tokens: 512,
        }
    }
}

/// Route aggregator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Aggregator base URL
    pub endpoint: String,
    /// Slippage used when the decision does not specify one (0.01 = 1%)
    pub default_slippage: f64,
    /// Largest slippage the builder accepts
    pub max_slippage: f64,
}

impl RouterConfig {
    pub fn for_network(network: SuiNetwork) -> Self {
        Self {
            endpoint: network.aggregator_endpoint().to_string(),
            default_slippage: 0.01,
            max_slippage: 0.05,
        }
    }
}

/// Yield protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StableLayerConfig {
    /// Whether yield actions may be built on this network
    pub available: bool,
    /// Package publishing the mint/burn/claim entry points
    pub package_id: String,
    /// Yield-bearing coin type
    pub stable_coin_type: String,
}

impl StableLayerConfig {
    pub fn for_network(network: SuiNetwork) -> Self {
        Self {
            available: network.stable_layer_available(),
            package_id: DEFAULT_STABLE_LAYER_PACKAGE_ID.to_string(),
            stable_coin_type: coin_types::LAKE_USDC.to_string(),
        }
    }

    pub fn target(&self, function: &str) -> String {
        format!("{}::stable_layer::{}", self.package_id, function)
    }
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Fee budget attached to every agent transaction (MIST)
    pub gas_budget: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            gas_budget: 50_000_000,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Ledger network
    pub network: SuiNetwork,
    /// Vault contract location
    #[serde(default)]
    pub contracts: ContractConfig,
    /// Coin types
    pub coins: CoinConfig,
    /// Decision source settings
    #[serde(default)]
    pub llm: LlmConfig,
    /// Route aggregator settings
    pub router: RouterConfig,
    /// Yield protocol settings
    pub stable_layer: StableLayerConfig,
    /// Execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Number of run results kept in memory
    pub run_log_capacity: usize,
    /// Agent loop interval (milliseconds)
    pub check_interval_ms: u64,
}

impl Config {
    /// Defaults for a specific network
    pub fn for_network(network: SuiNetwork) -> Self {
        Self {
            network,
            contracts: ContractConfig::default(),
            coins: CoinConfig::for_network(network),
            llm: LlmConfig::default(),
            router: RouterConfig::for_network(network),
            stable_layer: StableLayerConfig::for_network(network),
            execution: ExecutionConfig::default(),
            run_log_capacity: 50,
            check_interval_ms: 60_000,
        }
    }

    /// Load a JSON config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Apply environment overrides once, at load time.
    ///
    /// A network override re-derives the network presets, so it is applied
    /// before the finer-grained overrides.
    pub fn apply_env(self, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match env(SUI_NETWORK_ENV) {
            Some(name) => {
                let network: SuiNetwork = name.parse()?;
                if network == self.network {
                    self
                } else {
                    tracing::info!(network = %network, "Network overridden from environment");
                    Self {
                        contracts: self.contracts,
                        llm: self.llm,
                        execution: self.execution,
                        run_log_capacity: self.run_log_capacity,
                        check_interval_ms: self.check_interval_ms,
                        ..Self::for_network(network)
                    }
                }
            }
            None => self,
        };

        if let Some(package_id) = env(env_vars::PACKAGE_ID) {
            config.contracts.package_id = package_id;
        }
        if let Some(name) = env(env_vars::LLM_PROVIDER) {
            let provider = LlmProvider::parse(&name)
                .ok_or_else(|| Error::Config(format!("Unknown LLM provider: {}", name)))?;
            config.llm.provider = Some(provider);
        }
        if let Some(model) = env(env_vars::LLM_MODEL) {
            config.llm.model = Some(model);
        }

        Ok(config)
    }

    /// Resolve the decision provider: the configured one, otherwise the
    /// first provider with an API key in the environment.
    pub fn resolve_provider(&self, env: impl Fn(&str) -> Option<String>) -> Result<LlmProvider> {
        if let Some(provider) = self.llm.provider {
            return Ok(provider);
        }
        LlmProvider::detect(|var| env(var).is_some_and(|v| !v.trim().is_empty())).ok_or_else(
            || {
                Error::Config(format!(
                    "No LLM API key found. Set one of: {}, {}, {}",
                    env_vars::OPENAI_API_KEY,
                    env_vars::GEMINI_API_KEY,
                    env_vars::ANTHROPIC_API_KEY
                ))
            },
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::for_network(SuiNetwork::default())
    }
}

/// Read a process environment variable (the default `env` argument)
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
