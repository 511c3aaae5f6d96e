//! Vault Agent
//!
//! Policy-gated execution engine for an autonomous agent spending from a
//! custodial Sui vault. Each cycle:
//! - reads the vault and a market snapshot
//! - asks a decision source for one action and parses it as untrusted text
//! - checks the action against the vault policy before anything is built
//! - builds an atomic transaction and submits it, sponsored first, then direct
//!
//! # Security Model
//!
//! - The vault contract is the final authority; the policy checker mirrors it
//!   so doomed transactions are never submitted
//! - Decision text is never trusted until parsed and validated
//! - Private keys never leave the wallet module and are never logged

pub mod clock;
pub mod config;
pub mod decision;
pub mod execution;
pub mod market;
pub mod policy;
pub mod ptb;
pub mod runner;
pub mod units;
pub mod vault;
pub mod wallet;

mod error;

// Re-export commonly used types
pub use config::{Config, SuiNetwork};
pub use decision::{parse_decision, Decision, DecisionAction};
pub use error::{Error, Result};
pub use policy::{check_policy, PolicyCheckResult};
pub use runner::{AgentRunner, CycleRequest, RunLog, RunResult};
pub use vault::{Ledger, Policy, Vault};
