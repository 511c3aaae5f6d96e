//! Policy checker
//!
//! Pure pre-flight check of a proposed agent spend against the vault policy.
//! It mirrors the vault contract's enforcement so transactions the contract
//! would abort are never submitted. The contract stays the authority.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. amount > 0
//! 2. now < expiresAt
//! 3. cooldown elapsed (only after the first spend)
//! 4. amount <= maxPerTx
//! 5. amount <= remaining budget
//! 6. action whitelisted
//! 7. amount <= balance

pub mod stress;

use crate::units::{mist_to_sui, ActionKind};
use crate::vault::Vault;
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// Outcome of a policy check. Denials are normal results, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCheckResult {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyCheckResult {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Check a spend of `amount` MIST for `kind` at `now_ms`.
pub fn check_policy(vault: &Vault, amount: U256, kind: ActionKind, now_ms: u64) -> PolicyCheckResult {
    let policy = &vault.policy;

    if amount.is_zero() {
        return PolicyCheckResult::deny("Amount must be greater than zero");
    }

    if let Err(denied) = check_expiry(vault, now_ms) {
        return denied;
    }

    if vault.tx_count > 0 {
        let remaining = vault
            .last_tx_time
            .saturating_add(policy.cooldown_ms)
            .saturating_sub(now_ms);
        if remaining > 0 {
            return PolicyCheckResult::deny(format!("Cooldown active: {}ms remaining", remaining));
        }
    }

    if amount > policy.max_per_tx {
        return PolicyCheckResult::deny(format!(
            "Amount {} exceeds per-tx limit {} ({} SUI > {} SUI)",
            amount,
            policy.max_per_tx,
            mist_to_sui(amount),
            mist_to_sui(policy.max_per_tx)
        ));
    }

    let remaining = vault.remaining_budget();
    if amount > remaining {
        return PolicyCheckResult::deny(format!(
            "Amount {} exceeds remaining budget {} ({} SUI > {} SUI)",
            amount,
            remaining,
            mist_to_sui(amount),
            mist_to_sui(remaining)
        ));
    }

    if let Err(denied) = check_whitelist(vault, kind) {
        return denied;
    }

    if amount > vault.balance {
        return PolicyCheckResult::deny(format!(
            "Insufficient vault balance: {} < {} ({} SUI < {} SUI)",
            vault.balance,
            amount,
            mist_to_sui(vault.balance),
            mist_to_sui(amount)
        ));
    }

    PolicyCheckResult::allow("Policy check passed")
}

/// Check an action that moves no vault funds (yield burn/claim).
///
/// Only expiry and the whitelist apply; there is nothing to count against
/// the budget, the per-tx cap or the cooldown.
pub fn check_non_spending(vault: &Vault, kind: ActionKind, now_ms: u64) -> PolicyCheckResult {
    if let Err(denied) = check_expiry(vault, now_ms) {
        return denied;
    }
    if let Err(denied) = check_whitelist(vault, kind) {
        return denied;
    }
    PolicyCheckResult::allow("Policy check passed")
}

fn check_expiry(vault: &Vault, now_ms: u64) -> Result<(), PolicyCheckResult> {
    if now_ms >= vault.policy.expires_at {
        Err(PolicyCheckResult::deny("Policy has expired"))
    } else {
        Ok(())
    }
}

fn check_whitelist(vault: &Vault, kind: ActionKind) -> Result<(), PolicyCheckResult> {
    if vault.policy.allows(kind) {
        Ok(())
    } else {
        Err(PolicyCheckResult::deny(format!(
            "Action type {} is not whitelisted",
            kind.code()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::fixtures::{sui, vault};
    use proptest::prelude::*;

    const NOW: u64 = 1_700_000_000_000;

    #[test]
    fn test_allows_within_limits() {
        let result = check_policy(&vault(), sui("1"), ActionKind::Swap, NOW);
        assert_eq!(result, PolicyCheckResult::allow("Policy check passed"));
    }

    #[test]
    fn test_zero_amount_denied_first() {
        // Expired, on cooldown and not whitelisted: zero still wins
        let mut v = vault();
        v.policy.expires_at = 0;
        v.policy.allowed_actions.clear();
        v.tx_count = 1;
        v.last_tx_time = NOW;

        let result = check_policy(&v, U256::ZERO, ActionKind::Swap, NOW);
        assert!(!result.allowed);
        assert_eq!(result.reason, "Amount must be greater than zero");
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let mut v = vault();
        v.policy.expires_at = NOW;
        let result = check_policy(&v, sui("1"), ActionKind::Swap, NOW);
        assert!(!result.allowed);
        assert_eq!(result.reason, "Policy has expired");

        assert!(check_policy(&v, sui("1"), ActionKind::Swap, NOW - 1).allowed);
    }

    #[test]
    fn test_cooldown_reports_remaining() {
        let mut v = vault();
        v.tx_count = 1;
        v.last_tx_time = NOW;
        v.policy.cooldown_ms = 60_000;

        let result = check_policy(&v, sui("1"), ActionKind::Swap, NOW + 1);
        assert!(!result.allowed);
        assert_eq!(result.reason, "Cooldown active: 59999ms remaining");

        assert!(check_policy(&v, sui("1"), ActionKind::Swap, NOW + 60_000).allowed);
    }

    #[test]
    fn test_cooldown_counts_from_future_last_tx() {
        let mut v = vault();
        v.tx_count = 1;
        v.last_tx_time = NOW + 10_000;
        v.policy.cooldown_ms = 60_000;

        let result = check_policy(&v, sui("1"), ActionKind::Swap, NOW);
        assert_eq!(result.reason, "Cooldown active: 70000ms remaining");
        assert!(check_policy(&v, sui("1"), ActionKind::Swap, NOW + 70_000).allowed);
    }

    #[test]
    fn test_cooldown_skipped_before_first_spend() {
        let mut v = vault();
        v.last_tx_time = NOW;
        assert!(check_policy(&v, sui("1"), ActionKind::Swap, NOW).allowed);
    }

    #[test]
    fn test_per_tx_reason_has_both_values() {
        let result = check_policy(&vault(), sui("3"), ActionKind::Swap, NOW);
        assert!(!result.allowed);
        assert_eq!(
            result.reason,
            "Amount 3000000000 exceeds per-tx limit 2000000000 (3 SUI > 2 SUI)"
        );
    }

    #[test]
    fn test_budget_overflow() {
        let mut v = vault();
        v.total_spent = sui("9.5");
        let result = check_policy(&v, sui("1.0"), ActionKind::Swap, NOW);
        assert!(!result.allowed);
        assert!(result.reason.contains("remaining budget"));
        assert!(result.reason.contains("0.5 SUI"));
    }

    #[test]
    fn test_budget_already_overspent() {
        let mut v = vault();
        v.total_spent = sui("11");
        let result = check_policy(&v, sui("1"), ActionKind::Swap, NOW);
        assert!(result.reason.contains("remaining budget 0 "));
    }

    #[test]
    fn test_whitelist() {
        let mut v = vault();
        v.policy.allowed_actions = vec![0];
        let result = check_policy(&v, sui("1"), ActionKind::StableMint, NOW);
        assert!(!result.allowed);
        assert_eq!(result.reason, "Action type 1 is not whitelisted");
    }

    #[test]
    fn test_balance_checked_last() {
        let mut v = vault();
        v.balance = sui("0.5");
        let result = check_policy(&v, sui("1"), ActionKind::Swap, NOW);
        assert!(!result.allowed);
        assert!(result.reason.starts_with("Insufficient vault balance: 500000000 < 1000000000"));
    }

    #[test]
    fn test_non_spending_check() {
        let mut v = vault();
        v.tx_count = 1;
        v.last_tx_time = NOW;
        v.total_spent = v.policy.max_budget;
        assert!(check_non_spending(&v, ActionKind::StableClaim, NOW).allowed);

        v.policy.allowed_actions = vec![0];
        assert_eq!(
            check_non_spending(&v, ActionKind::StableClaim, NOW).reason,
            "Action type 3 is not whitelisted"
        );

        v.policy.expires_at = NOW;
        assert_eq!(
            check_non_spending(&v, ActionKind::StableClaim, NOW).reason,
            "Policy has expired"
        );
    }

    fn arb_vault() -> impl Strategy<Value = Vault> {
        (
            0u64..50_000_000_000,
            0u64..20_000_000_000,
            0u64..5_000_000_000,
            0u64..20_000_000_000,
            proptest::collection::vec(0u8..4, 0..4),
            0u64..120_000,
            0u64..10,
            (NOW - 200_000)..(NOW + 200_000),
            (NOW - 200_000)..=NOW,
        )
            .prop_map(
                |(balance, budget, per_tx, spent, actions, cooldown, tx_count, expires, last)| {
                    let mut v = vault();
                    v.balance = U256::from(balance);
                    v.policy.max_budget = U256::from(budget);
                    v.policy.max_per_tx = U256::from(per_tx);
                    v.total_spent = U256::from(spent);
                    v.policy.allowed_actions = actions;
                    v.policy.cooldown_ms = cooldown;
                    v.tx_count = tx_count;
                    v.policy.expires_at = expires;
                    v.last_tx_time = last;
                    v
                },
            )
    }

    fn arb_kind() -> impl Strategy<Value = ActionKind> {
        proptest::sample::select(ActionKind::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_above_per_tx_always_denied(v in arb_vault(), extra in 1u64..1_000_000_000, kind in arb_kind()) {
            let amount = v.policy.max_per_tx + U256::from(extra);
            prop_assert!(!check_policy(&v, amount, kind, NOW).allowed);
        }

        #[test]
        fn prop_expired_always_denied(v in arb_vault(), amount in 0u64..10_000_000_000, kind in arb_kind(), late in 0u64..1_000_000) {
            let now = v.policy.expires_at + late;
            prop_assert!(!check_policy(&v, U256::from(amount), kind, now).allowed);
            prop_assert!(!check_non_spending(&v, kind, now).allowed);
        }

        #[test]
        fn prop_check_is_deterministic(v in arb_vault(), amount in 0u64..10_000_000_000, kind in arb_kind()) {
            let first = check_policy(&v, U256::from(amount), kind, NOW);
            let second = check_policy(&v, U256::from(amount), kind, NOW);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_allowed_spend_keeps_budget_invariant(v in arb_vault(), amount in 0u64..10_000_000_000, kind in arb_kind()) {
            let amount = U256::from(amount);
            if check_policy(&v, amount, kind, NOW).allowed {
                prop_assert!(v.total_spent + amount <= v.policy.max_budget);
                prop_assert!(amount <= v.balance);
            }
        }
    }
}
