//! Network presets
//!
//! Each network carries its own USDC coin type, route aggregator endpoint and
//! yield-protocol availability. Presets are only defaults; every value can be
//! overridden in the config file.
//!
//! ```bash
//! # Select a network without touching the config file
//! export SUI_NETWORK=mainnet
//! ```

use crate::units::coin_types;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable that overrides the configured network
pub const SUI_NETWORK_ENV: &str = "SUI_NETWORK";

/// Route aggregator endpoints
mod aggregator_endpoints {
    pub const MAINNET: &str = "https://api-sui.cetus.zone/router_v3";
    pub const TESTNET: &str = "https://api-sui-testnet.cetus.zone/router_v3";
}

/// Supported ledger networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SuiNetwork {
    Mainnet,
    #[default]
    Testnet,
    Devnet,
}

impl SuiNetwork {
    pub fn name(&self) -> &'static str {
        match self {
            SuiNetwork::Mainnet => "mainnet",
            SuiNetwork::Testnet => "testnet",
            SuiNetwork::Devnet => "devnet",
        }
    }

    /// USDC coin type on this network
    pub fn usdc_coin_type(&self) -> &'static str {
        match self {
            SuiNetwork::Mainnet => coin_types::USDC_MAINNET,
            SuiNetwork::Testnet | SuiNetwork::Devnet => coin_types::USDC_TESTNET,
        }
    }

    /// Default route aggregator endpoint
    pub fn aggregator_endpoint(&self) -> &'static str {
        match self {
            SuiNetwork::Mainnet => aggregator_endpoints::MAINNET,
            SuiNetwork::Testnet | SuiNetwork::Devnet => aggregator_endpoints::TESTNET,
        }
    }

    /// The yield protocol is only deployed on mainnet
    pub fn stable_layer_available(&self) -> bool {
        matches!(self, SuiNetwork::Mainnet)
    }
}

impl fmt::Display for SuiNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SuiNetwork {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mainnet" => Ok(SuiNetwork::Mainnet),
            "testnet" => Ok(SuiNetwork::Testnet),
            "devnet" => Ok(SuiNetwork::Devnet),
            other => Err(crate::Error::Config(format!("Unknown network: {}", other))),
        }
    }
}
