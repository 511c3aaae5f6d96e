//! Vault model
//!
//! The vault is the custodial account an owner funds and delegates a spending
//! budget from. Amounts are integer MIST held as `U256`; JSON renders them as
//! decimal strings.

mod ledger;
pub mod memory;

pub use ledger::Ledger;
pub use memory::InMemoryLedger;

use crate::units::{self, decimal, ActionKind};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Spending limits attached to a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Lifetime spend ceiling (MIST)
    #[serde(with = "decimal")]
    pub max_budget: U256,
    /// Single-action ceiling (MIST)
    #[serde(with = "decimal")]
    pub max_per_tx: U256,
    /// Whitelisted action-kind codes
    pub allowed_actions: Vec<u8>,
    /// Minimum time between accepted spends
    pub cooldown_ms: u64,
    /// Absolute expiry timestamp (ms since epoch)
    pub expires_at: u64,
}

impl Policy {
    pub fn allows(&self, kind: ActionKind) -> bool {
        self.allowed_actions.contains(&kind.code())
    }

    /// Labels of the whitelisted actions, for prompts and display
    pub fn allowed_labels(&self) -> Vec<String> {
        self.allowed_actions
            .iter()
            .map(|code| units::action_label(*code))
            .collect()
    }
}

/// Snapshot of a vault as last confirmed by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub id: String,
    pub owner: String,
    #[serde(with = "decimal")]
    pub balance: U256,
    pub policy: Policy,
    /// Capability ids allowed to act on this vault
    pub authorized_caps: Vec<String>,
    #[serde(with = "decimal")]
    pub total_spent: U256,
    /// Timestamp of the last accepted spend (ms since epoch)
    pub last_tx_time: u64,
    pub tx_count: u64,
}

impl Vault {
    /// Budget still available to the agent
    pub fn remaining_budget(&self) -> U256 {
        self.policy.max_budget.saturating_sub(self.total_spent)
    }

    pub fn is_authorized(&self, cap_id: &str) -> bool {
        self.authorized_caps.iter().any(|id| id == cap_id)
    }
}

/// Bearer credential binding one agent address to one vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapability {
    pub id: String,
    pub vault_id: String,
    pub agent: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_remaining_budget_saturates() {
        let mut v = vault();
        v.total_spent = sui("12");
        assert_eq!(v.remaining_budget(), U256::ZERO);
        v.total_spent = sui("9.5");
        assert_eq!(v.remaining_budget(), sui("0.5"));
    }

    #[test]
    fn test_vault_json_shape() {
        let json = serde_json::to_value(vault()).unwrap();
        assert_eq!(json["balance"], "20000000000");
        assert_eq!(json["policy"]["maxPerTx"], "2000000000");
        assert_eq!(json["authorizedCaps"][0], "0xcap");

        let back: Vault = serde_json::from_value(json).unwrap();
        assert_eq!(back, vault());
    }

    #[test]
    fn test_allowed_labels() {
        let mut v = vault();
        v.policy.allowed_actions = vec![0, 7];
        assert_eq!(v.policy.allowed_labels(), vec!["Swap", "Action 7"]);
        assert!(v.policy.allows(ActionKind::Swap));
        assert!(!v.policy.allows(ActionKind::StableMint));
    }
}
