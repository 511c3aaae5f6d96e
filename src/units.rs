//! Coin metadata and amount conversion
//!
//! Centralizes coin types, decimals and on-chain action codes so the checker,
//! the transaction builder and the prompt all agree on the same numbers.
//!
//! Amounts travel through the engine as integer smallest units (`U256`);
//! decimal strings only exist at the decision boundary and in human-readable
//! reasons.

use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Decimals of the native coin (1 SUI = 10^9 MIST)
pub const SUI_DECIMALS: u8 = 9;
/// Decimals of the USDC coin
pub const USDC_DECIMALS: u8 = 6;

/// Well-known coin types
pub mod coin_types {
    pub const SUI: &str = "0x2::sui::SUI";
    pub const USDC_MAINNET: &str =
        "0xdba34672e30cb065b1f93e3ab55318768fd6fef66c15942c9f7cb846e2f900e7::usdc::USDC";
    pub const USDC_TESTNET: &str =
        "0xa1ec7fc00a6f40db9693ad1415d0c193ad3906494428cf252621037bd7117e29::usdc::USDC";
    /// Yield-bearing stablecoin minted by the Stablelayer protocol
    pub const LAKE_USDC: &str =
        "0xb75744fadcbfc174627567ca29645d0af8f6e6fd01b6f57c75a08cd3fb97c567::lake_usdc::LakeUSDC";
}

/// Coin metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinInfo {
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Look up metadata for a coin type. Unknown coins return `None`.
pub fn coin_info(coin_type: &str) -> Option<CoinInfo> {
    match coin_type {
        coin_types::SUI => Some(CoinInfo {
            symbol: "SUI",
            decimals: SUI_DECIMALS,
        }),
        coin_types::USDC_MAINNET | coin_types::USDC_TESTNET => Some(CoinInfo {
            symbol: "USDC",
            decimals: USDC_DECIMALS,
        }),
        coin_types::LAKE_USDC => Some(CoinInfo {
            symbol: "LakeUSDC",
            decimals: USDC_DECIMALS,
        }),
        _ => None,
    }
}

/// Action-kind codes understood by the vault contract.
///
/// The policy whitelist stores these codes; the withdraw call passes one of
/// them so the contract can check it against the same whitelist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Swap,
    StableMint,
    StableBurn,
    StableClaim,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Swap,
        ActionKind::StableMint,
        ActionKind::StableBurn,
        ActionKind::StableClaim,
    ];

    pub fn code(&self) -> u8 {
        match self {
            ActionKind::Swap => 0,
            ActionKind::StableMint => 1,
            ActionKind::StableBurn => 2,
            ActionKind::StableClaim => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Swap => "Swap",
            ActionKind::StableMint => "Stable Mint",
            ActionKind::StableBurn => "Stable Burn",
            ActionKind::StableClaim => "Stable Claim",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Human label for a raw whitelist code (codes the engine does not know
/// still render).
pub fn action_label(code: u8) -> String {
    ActionKind::from_code(code)
        .map(|kind| kind.label().to_string())
        .unwrap_or_else(|| format!("Action {}", code))
}

/// Parse a non-negative decimal string into integer units.
///
/// Fractional digits beyond `decimals` are truncated (floor), matching how
/// the contract would receive an integer amount.
pub fn parse_units(value: &str, decimals: u8) -> Result<U256> {
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) {
        return Err(Error::InvalidArgument(format!(
            "'{}' is not a non-negative decimal amount",
            value
        )));
    }
    if value.ends_with('.') {
        return Err(Error::InvalidArgument(format!(
            "'{}' has an empty fractional part",
            value
        )));
    }

    let decimals = decimals as usize;
    let mut scaled = String::with_capacity(whole.len() + decimals);
    scaled.push_str(whole);
    if fraction.len() >= decimals {
        scaled.push_str(&fraction[..decimals]);
    } else {
        scaled.push_str(fraction);
        scaled.extend(std::iter::repeat('0').take(decimals - fraction.len()));
    }

    U256::from_str_radix(&scaled, 10)
        .map_err(|e| Error::InvalidArgument(format!("amount '{}' out of range: {}", value, e)))
}

/// Render integer units as a decimal string without trailing zeros.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals + 1 - digits.len()), digits)
    } else {
        digits
    };
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Decimal SUI string -> MIST
pub fn sui_to_mist(sui: &str) -> Result<U256> {
    parse_units(sui, SUI_DECIMALS)
}

/// MIST -> decimal SUI string
pub fn mist_to_sui(mist: U256) -> String {
    format_units(mist, SUI_DECIMALS)
}

/// MIST -> approximate SUI as a float, for prompts and display only.
pub fn mist_to_sui_f64(mist: U256) -> f64 {
    mist_to_sui(mist).parse().unwrap_or(0.0)
}

/// Serde helpers that keep integer amounts as decimal strings in JSON,
/// the way the ledger's JSON-RPC renders `u64` fields.
pub mod decimal {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => U256::from_str_radix(s.trim(), 10).map_err(de::Error::custom),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }
}
