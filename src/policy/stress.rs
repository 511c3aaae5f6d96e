//! Guardrail stress scenarios
//!
//! Each scenario deliberately builds a violating request against a real vault
//! snapshot and reports whether the checker blocks it.

use super::check_policy;
use crate::units::{mist_to_sui_f64, sui_to_mist, ActionKind};
use crate::vault::Vault;
use crate::Result;
use alloy::primitives::U256;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Capability id used when the caller does not supply one
const ZERO_CAP_ID: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressScenario {
    ExceedBudget,
    BreakCooldown,
    ExceedPerTx,
    UnauthorizedAgent,
    ExpiredPolicy,
}

impl StressScenario {
    pub const ALL: [StressScenario; 5] = [
        StressScenario::ExceedBudget,
        StressScenario::BreakCooldown,
        StressScenario::ExceedPerTx,
        StressScenario::UnauthorizedAgent,
        StressScenario::ExpiredPolicy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StressScenario::ExceedBudget => "exceed_budget",
            StressScenario::BreakCooldown => "break_cooldown",
            StressScenario::ExceedPerTx => "exceed_per_tx",
            StressScenario::UnauthorizedAgent => "unauthorized_agent",
            StressScenario::ExpiredPolicy => "expired_policy",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StressScenario::ExceedBudget => "Budget Overflow Attack",
            StressScenario::BreakCooldown => "Cooldown Bypass Attack",
            StressScenario::ExceedPerTx => "Per-TX Limit Breach",
            StressScenario::UnauthorizedAgent => "Unauthorized Agent Access",
            StressScenario::ExpiredPolicy => "Expired Policy Exploit",
        }
    }
}

impl fmt::Display for StressScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StressScenario {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|scenario| scenario.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidArgument(format!("Unknown stress scenario: {}", s)))
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StressTestResult {
    pub scenario: StressScenario,
    pub name: String,
    pub description: String,
    pub attempted: BTreeMap<String, String>,
    pub blocked: bool,
    pub reason: String,
}

fn sui_label(mist: U256) -> String {
    format!("{:.4} SUI", mist_to_sui_f64(mist))
}

fn iso(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

fn mist(sui: &str) -> U256 {
    sui_to_mist(sui).unwrap_or(U256::ZERO)
}

/// Run one scenario against `vault` at `now_ms`.
pub fn run_scenario(
    vault: &Vault,
    scenario: StressScenario,
    cap_id: Option<&str>,
    now_ms: u64,
) -> StressTestResult {
    let policy = &vault.policy;
    let mut attempted = BTreeMap::new();

    let (description, blocked, reason) = match scenario {
        StressScenario::ExceedBudget => {
            let remaining = vault.remaining_budget();
            let amount = if remaining.is_zero() {
                mist("1")
            } else {
                remaining.saturating_add(mist("0.1"))
            };
            attempted.insert("amount".to_string(), sui_label(amount));
            attempted.insert("remainingBudget".to_string(), sui_label(remaining));

            let result = check_policy(vault, amount, ActionKind::Swap, now_ms);
            (
                "Attempting to withdraw more than the remaining budget".to_string(),
                !result.allowed,
                result.reason,
            )
        }
        StressScenario::BreakCooldown => {
            let last_tx_time = if vault.last_tx_time > 0 {
                vault.last_tx_time
            } else {
                now_ms
            };
            let simulated = Vault {
                tx_count: vault.tx_count.max(1),
                last_tx_time,
                ..vault.clone()
            };
            let half = policy.max_per_tx / U256::from(2u64);
            let amount = if half.is_zero() { mist("0.01") } else { half };

            attempted.insert("timeSinceLastTx".to_string(), "1ms".to_string());
            attempted.insert(
                "cooldownRequired".to_string(),
                format!("{}s", policy.cooldown_ms as f64 / 1000.0),
            );
            attempted.insert("amount".to_string(), sui_label(amount));

            let result = check_policy(
                &simulated,
                amount,
                ActionKind::Swap,
                last_tx_time.saturating_add(1),
            );
            (
                format!(
                    "Attempting to trade 1ms after last TX (cooldown: {}s)",
                    policy.cooldown_ms as f64 / 1000.0
                ),
                !result.allowed,
                result.reason,
            )
        }
        StressScenario::ExceedPerTx => {
            let amount = if policy.max_per_tx.is_zero() {
                mist("10")
            } else {
                policy.max_per_tx.saturating_mul(U256::from(2u64))
            };
            attempted.insert("amount".to_string(), sui_label(amount));
            attempted.insert("maxPerTx".to_string(), sui_label(policy.max_per_tx));

            let result = check_policy(vault, amount, ActionKind::Swap, now_ms);
            (
                "Attempting to withdraw 2x the per-transaction limit".to_string(),
                !result.allowed,
                result.reason,
            )
        }
        StressScenario::UnauthorizedAgent => {
            let cap = cap_id.unwrap_or(ZERO_CAP_ID);
            let authorized = vault.is_authorized(cap);
            let count = vault.authorized_caps.len();
            attempted.insert("capId".to_string(), cap.to_string());
            attempted.insert("authorizedCount".to_string(), count.to_string());

            let reason = if authorized {
                "Agent is authorized - test did not block".to_string()
            } else {
                format!(
                    "AgentCap not found in vault's {} authorized cap(s). On-chain TX would abort with E_NOT_AUTHORIZED.",
                    count
                )
            };
            (
                "Attempting to use a non-authorized AgentCap".to_string(),
                !authorized,
                reason,
            )
        }
        StressScenario::ExpiredPolicy => {
            let simulated_now = policy.expires_at.saturating_add(1);
            attempted.insert("simulatedTime".to_string(), iso(simulated_now));
            attempted.insert("expiresAt".to_string(), iso(policy.expires_at));

            let result = check_policy(vault, mist("0.01"), ActionKind::Swap, simulated_now);
            (
                "Attempting to trade after policy expiration".to_string(),
                !result.allowed,
                result.reason,
            )
        }
    };

    if !blocked {
        tracing::warn!(scenario = %scenario, vault_id = %vault.id, "Guardrail did not block stress scenario");
    }

    StressTestResult {
        scenario,
        name: scenario.title().to_string(),
        description,
        attempted,
        blocked,
        reason,
    }
}

/// Run every scenario
pub fn run_all(vault: &Vault, cap_id: Option<&str>, now_ms: u64) -> Vec<StressTestResult> {
    StressScenario::ALL
        .into_iter()
        .map(|scenario| run_scenario(vault, scenario, cap_id, now_ms))
        .collect()
}
