//! Atomic transaction model
//!
//! An agent transaction is an ordered list of commands the ledger executes as
//! one all-or-nothing unit. Later commands consume the outputs of earlier ones
//! through `Argument::Result`.

pub mod builder;
pub mod router;

pub use builder::{TransactionBuilder, VaultTarget};
pub use router::{CetusAggregator, FixedRateRouter, RouteFinder, RouteQuote};

use crate::units::{decimal, ActionKind};
use crate::Result;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Pure (non-object) input value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PureValue {
    U64(#[serde(with = "decimal")] U256),
    U8(u8),
    Bool(bool),
    Address(String),
}

/// Command input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Argument {
    GasCoin,
    /// Shared or owned object by id
    Object(String),
    Pure(PureValue),
    /// Output of an earlier command
    Result(u16),
}

impl Argument {
    pub fn amount(value: U256) -> Self {
        Argument::Pure(PureValue::U64(value))
    }

    pub fn address(value: &str) -> Self {
        Argument::Pure(PureValue::Address(value.to_string()))
    }

    pub fn object(id: &str) -> Self {
        Argument::Object(id.to_string())
    }
}

/// One step of an atomic transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    MoveCall {
        target: String,
        #[serde(default)]
        type_arguments: Vec<String>,
        arguments: Vec<Argument>,
    },
    /// Best-route exchange of `input` along a quoted route
    RouterSwap {
        route: RouteQuote,
        input: Argument,
        slippage: f64,
        /// Output floor derived from the quote and slippage
        #[serde(with = "decimal")]
        min_out: U256,
    },
    TransferObjects {
        objects: Vec<Argument>,
        recipient: Argument,
    },
}

/// Build recipes, in the order the builder may try them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipe {
    SimpleWithdraw,
    RouterSwap,
    StableMint,
    StableBurn,
    StableClaim,
}

impl Recipe {
    pub fn name(&self) -> &'static str {
        match self {
            Recipe::SimpleWithdraw => "simple_withdraw",
            Recipe::RouterSwap => "router_swap",
            Recipe::StableMint => "stable_mint",
            Recipe::StableBurn => "stable_burn",
            Recipe::StableClaim => "stable_claim",
        }
    }

    /// Whether the recipe withdraws from the vault
    pub fn withdraws(&self) -> bool {
        !matches!(self, Recipe::StableBurn | Recipe::StableClaim)
    }
}

impl std::fmt::Display for Recipe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A built agent transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTransaction {
    pub recipe: Recipe,
    /// Action code passed to the vault's withdraw call
    pub action: ActionKind,
    /// Amount withdrawn from the vault (zero for burn/claim)
    #[serde(with = "decimal")]
    pub amount: U256,
    pub commands: Vec<Command>,
}

/// A transaction with its sender and fee payer fixed, ready to sign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionData {
    pub sender: String,
    pub gas_owner: String,
    pub gas_budget: u64,
    pub transaction: AgentTransaction,
}

impl TransactionData {
    pub fn new(transaction: AgentTransaction, sender: &str, gas_owner: &str, gas_budget: u64) -> Self {
        Self {
            sender: sender.to_string(),
            gas_owner: gas_owner.to_string(),
            gas_budget,
            transaction,
        }
    }

    /// Whether a party other than the sender pays the fee
    pub fn is_sponsored(&self) -> bool {
        self.sender != self.gas_owner
    }

    /// Canonical bytes every signer signs over
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
