//! In-memory ledger
//!
//! Replays the vault contract's rules against local state so the engine can
//! run end to end without a network:
//! - owner operations (create, deposit, withdraw-all, policy update, caps)
//! - agent transactions executed atomically on a copy of the state
//! - fees charged to the gas owner, signatures required from sender and
//!   gas owner
//!
//! The capability-gated withdraw re-runs the same policy checker the engine
//! uses before submission, so both sides agree on every admission decision.

use super::{AgentCapability, Ledger, Policy, Vault};
use crate::clock::Clock;
use crate::config::Config;
use crate::policy::check_policy;
use crate::ptb::{Argument, Command, PureValue, TransactionData};
use crate::units::{coin_types, ActionKind};
use crate::wallet::TransactionSignature;
use crate::{Error, Result};
use alloy::primitives::U256;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Fee charged per executed transaction (MIST)
pub const DEFAULT_GAS_COST: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Coin {
    coin_type: String,
    amount: U256,
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    vaults: HashMap<String, Vault>,
    caps: HashMap<String, AgentCapability>,
    /// Owner capability id -> vault id
    owner_caps: HashMap<String, String>,
    /// (address, coin type) -> balance
    balances: HashMap<(String, String), U256>,
    /// Owner -> claimable yield in USDC
    accrued_yield: HashMap<String, U256>,
    digests: HashSet<String>,
    sequence: u64,
}

impl LedgerState {
    fn next_id(&mut self, kind: &str) -> String {
        self.sequence += 1;
        let hash = blake3::hash(format!("{}:{}", kind, self.sequence).as_bytes());
        format!("0x{}", hash.to_hex())
    }

    fn balance(&self, address: &str, coin_type: &str) -> U256 {
        self.balances
            .get(&(address.to_string(), coin_type.to_string()))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn credit(&mut self, address: &str, coin_type: &str, amount: U256) {
        let entry = self
            .balances
            .entry((address.to_string(), coin_type.to_string()))
            .or_insert(U256::ZERO);
        *entry += amount;
    }

    fn debit(&mut self, address: &str, coin_type: &str, amount: U256) -> Result<()> {
        let available = self.balance(address, coin_type);
        if available < amount {
            return Err(Error::Ledger(format!(
                "insufficient {} balance for {}: {} < {}",
                coin_type, address, available, amount
            )));
        }
        self.balances
            .insert((address.to_string(), coin_type.to_string()), available - amount);
        Ok(())
    }

    fn owned_vault(&mut self, vault_id: &str, owner_cap_id: &str) -> Result<&mut Vault> {
        match self.owner_caps.get(owner_cap_id) {
            Some(id) if id == vault_id => {}
            _ => return Err(abort("owner", "E_NOT_OWNER")),
        }
        self.vaults
            .get_mut(vault_id)
            .ok_or_else(|| Error::NotFound(format!("vault {}", vault_id)))
    }
}

fn abort(function: &str, reason: &str) -> Error {
    Error::Ledger(format!("MoveAbort in {}: {}", function, reason))
}

/// Local stand-in for the vault contract and the coins it touches
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
    clock: Arc<dyn Clock>,
    withdraw_target: String,
    clock_object_id: String,
    stable_targets: StableTargets,
    usdc: String,
    stable_coin: String,
    gas_cost: U256,
}

struct StableTargets {
    mint: String,
    burn: String,
    claim: String,
}

impl InMemoryLedger {
    pub fn new(config: &Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(RwLock::new(LedgerState::default())),
            clock,
            withdraw_target: config.contracts.target("agent_withdraw"),
            clock_object_id: config.contracts.clock_object_id.clone(),
            stable_targets: StableTargets {
                mint: config.stable_layer.target("mint"),
                burn: config.stable_layer.target("burn"),
                claim: config.stable_layer.target("claim"),
            },
            usdc: config.coins.usdc.clone(),
            stable_coin: config.stable_layer.stable_coin_type.clone(),
            gas_cost: U256::from(DEFAULT_GAS_COST),
        }
    }

    /// Mint coins to an address (test and demo faucet)
    pub async fn fund(&self, address: &str, coin_type: &str, amount: U256) {
        self.state.write().await.credit(address, coin_type, amount);
    }

    pub async fn balance(&self, address: &str, coin_type: &str) -> U256 {
        self.state.read().await.balance(address, coin_type)
    }

    /// Add claimable yield to an owner's position
    pub async fn accrue_yield(&self, owner: &str, amount: U256) {
        *self
            .state
            .write()
            .await
            .accrued_yield
            .entry(owner.to_string())
            .or_insert(U256::ZERO) += amount;
    }

    /// Create a vault funded from the owner's SUI. Returns (vault id, owner cap id).
    pub async fn create_vault(
        &self,
        owner: &str,
        deposit: U256,
        policy: Policy,
    ) -> Result<(String, String)> {
        let mut state = self.state.write().await;
        state.debit(owner, coin_types::SUI, deposit)?;

        let vault_id = state.next_id("vault");
        let owner_cap_id = state.next_id("owner_cap");
        state.vaults.insert(
            vault_id.clone(),
            Vault {
                id: vault_id.clone(),
                owner: owner.to_string(),
                balance: deposit,
                policy,
                authorized_caps: Vec::new(),
                total_spent: U256::ZERO,
                last_tx_time: 0,
                tx_count: 0,
            },
        );
        state.owner_caps.insert(owner_cap_id.clone(), vault_id.clone());

        tracing::info!(vault_id = %vault_id, owner = owner, deposit = %deposit, "Vault created");
        Ok((vault_id, owner_cap_id))
    }

    pub async fn deposit(&self, vault_id: &str, owner_cap_id: &str, amount: U256) -> Result<()> {
        let mut state = self.state.write().await;
        let owner = state.owned_vault(vault_id, owner_cap_id)?.owner.clone();
        state.debit(&owner, coin_types::SUI, amount)?;
        state.owned_vault(vault_id, owner_cap_id)?.balance += amount;
        Ok(())
    }

    /// Drain the vault to its owner. Returns the amount withdrawn.
    pub async fn withdraw_all(&self, vault_id: &str, owner_cap_id: &str) -> Result<U256> {
        let mut state = self.state.write().await;
        let vault = state.owned_vault(vault_id, owner_cap_id)?;
        let amount = std::mem::replace(&mut vault.balance, U256::ZERO);
        let owner = vault.owner.clone();
        state.credit(&owner, coin_types::SUI, amount);
        Ok(amount)
    }

    pub async fn update_policy(
        &self,
        vault_id: &str,
        owner_cap_id: &str,
        policy: Policy,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.owned_vault(vault_id, owner_cap_id)?.policy = policy;
        Ok(())
    }

    /// Issue a capability for `agent`. Returns the capability id.
    pub async fn create_agent_cap(
        &self,
        vault_id: &str,
        owner_cap_id: &str,
        agent: &str,
    ) -> Result<String> {
        let mut state = self.state.write().await;
        state.owned_vault(vault_id, owner_cap_id)?;
        let cap_id = state.next_id("agent_cap");
        state.caps.insert(
            cap_id.clone(),
            AgentCapability {
                id: cap_id.clone(),
                vault_id: vault_id.to_string(),
                agent: agent.to_string(),
            },
        );
        state
            .owned_vault(vault_id, owner_cap_id)?
            .authorized_caps
            .push(cap_id.clone());
        Ok(cap_id)
    }

    pub async fn revoke_agent_cap(
        &self,
        vault_id: &str,
        owner_cap_id: &str,
        cap_id: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let vault = state.owned_vault(vault_id, owner_cap_id)?;
        vault.authorized_caps.retain(|id| id != cap_id);
        Ok(())
    }

    fn check_signatures(data: &TransactionData, signatures: &[TransactionSignature]) -> Result<()> {
        let signed_by = |address: &str| {
            signatures
                .iter()
                .any(|s| s.signer == address && !s.signature.is_empty())
        };
        if !signed_by(&data.sender) {
            return Err(Error::Ledger(format!(
                "missing signature from sender {}",
                data.sender
            )));
        }
        if !signed_by(&data.gas_owner) {
            return Err(Error::Ledger(format!(
                "missing signature from gas owner {}",
                data.gas_owner
            )));
        }
        Ok(())
    }

    fn execute(&self, state: &mut LedgerState, data: &TransactionData, now_ms: u64) -> Result<()> {
        let mut results: Vec<Option<Coin>> = Vec::with_capacity(data.transaction.commands.len());

        for command in &data.transaction.commands {
            let output = match command {
                Command::MoveCall {
                    target,
                    type_arguments,
                    arguments,
                } => self.move_call(state, &mut results, data, target, type_arguments, arguments, now_ms)?,
                Command::RouterSwap {
                    route,
                    input,
                    min_out,
                    ..
                } => {
                    let coin = take_coin(&mut results, input)?;
                    if coin.coin_type != route.from || coin.amount != route.amount_in {
                        return Err(abort("router_swap", "input coin does not match route"));
                    }
                    if route.amount_out < *min_out {
                        return Err(abort("router_swap", "slippage exceeded"));
                    }
                    Some(Coin {
                        coin_type: route.target.clone(),
                        amount: route.amount_out,
                    })
                }
                Command::TransferObjects { objects, recipient } => {
                    let recipient = pure_address(recipient)?;
                    for object in objects {
                        let coin = take_coin(&mut results, object)?;
                        state.credit(&recipient, &coin.coin_type, coin.amount);
                    }
                    None
                }
            };
            results.push(output);
        }

        if results.iter().any(Option::is_some) {
            return Err(Error::Ledger("unused value without drop".to_string()));
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn move_call(
        &self,
        state: &mut LedgerState,
        results: &mut [Option<Coin>],
        data: &TransactionData,
        target: &str,
        type_arguments: &[String],
        arguments: &[Argument],
        now_ms: u64,
    ) -> Result<Option<Coin>> {
        if target == self.withdraw_target {
            return self.agent_withdraw(state, data, arguments, now_ms).map(Some);
        }

        let stable_type_ok = type_arguments.first().map(String::as_str) == Some(self.stable_coin.as_str());
        if target == self.stable_targets.mint {
            let [coin, _amount, recipient] = arguments else {
                return Err(abort("mint", "wrong argument count"));
            };
            if !stable_type_ok {
                return Err(abort("mint", "unknown stable coin type"));
            }
            let coin = take_coin(results, coin)?;
            if coin.coin_type != self.usdc {
                return Err(abort("mint", "mint requires USDC"));
            }
            state.credit(&pure_address(recipient)?, &self.stable_coin, coin.amount);
            Ok(None)
        } else if target == self.stable_targets.burn {
            let [_all, owner] = arguments else {
                return Err(abort("burn", "wrong argument count"));
            };
            if !stable_type_ok {
                return Err(abort("burn", "unknown stable coin type"));
            }
            let owner = pure_address(owner)?;
            let position = state.balance(&owner, &self.stable_coin);
            if position.is_zero() {
                return Err(abort("burn", "no stable position"));
            }
            state.debit(&owner, &self.stable_coin, position)?;
            state.credit(&owner, &self.usdc, position);
            Ok(None)
        } else if target == self.stable_targets.claim {
            let [owner] = arguments else {
                return Err(abort("claim", "wrong argument count"));
            };
            let owner = pure_address(owner)?;
            let accrued = state.accrued_yield.remove(&owner).unwrap_or(U256::ZERO);
            if accrued.is_zero() {
                return Err(abort("claim", "no yield to claim"));
            }
            state.credit(&owner, &self.usdc, accrued);
            Ok(None)
        } else {
            Err(Error::Ledger(format!("unknown function {}", target)))
        }
    }

    /// Capability-gated, policy-checked withdraw. Produces a SUI coin.
    fn agent_withdraw(
        &self,
        state: &mut LedgerState,
        data: &TransactionData,
        arguments: &[Argument],
        now_ms: u64,
    ) -> Result<Coin> {
        let [vault_id, cap_id, amount, action, clock] = arguments else {
            return Err(abort("agent_withdraw", "wrong argument count"));
        };
        let vault_id = object_id(vault_id)?;
        let cap_id = object_id(cap_id)?;
        let amount = match amount {
            Argument::Pure(PureValue::U64(v)) => *v,
            _ => return Err(abort("agent_withdraw", "amount must be u64")),
        };
        let code = match action {
            Argument::Pure(PureValue::U8(code)) => *code,
            _ => return Err(abort("agent_withdraw", "action must be u8")),
        };
        if object_id(clock)? != self.clock_object_id {
            return Err(abort("agent_withdraw", "expected the clock object"));
        }

        match state.caps.get(&cap_id) {
            Some(cap) if cap.vault_id == vault_id && cap.agent == data.sender => {}
            _ => return Err(abort("agent_withdraw", "E_NOT_AUTHORIZED")),
        }
        let vault = state
            .vaults
            .get_mut(&vault_id)
            .ok_or_else(|| Error::NotFound(format!("vault {}", vault_id)))?;
        if !vault.is_authorized(&cap_id) {
            return Err(abort("agent_withdraw", "E_NOT_AUTHORIZED"));
        }

        let Some(kind) = ActionKind::from_code(code) else {
            return Err(Error::PolicyDenied(format!(
                "Action type {} is not whitelisted",
                code
            )));
        };
        let check = check_policy(vault, amount, kind, now_ms);
        if !check.allowed {
            return Err(Error::PolicyDenied(check.reason));
        }

        vault.balance -= amount;
        vault.total_spent += amount;
        vault.last_tx_time = now_ms;
        vault.tx_count += 1;

        Ok(Coin {
            coin_type: coin_types::SUI.to_string(),
            amount,
        })
    }
}

fn take_coin(results: &mut [Option<Coin>], argument: &Argument) -> Result<Coin> {
    match argument {
        Argument::Result(index) => results
            .get_mut(usize::from(*index))
            .and_then(Option::take)
            .ok_or_else(|| Error::Ledger(format!("result {} is not an available coin", index))),
        other => Err(Error::Ledger(format!("expected a coin result, got {:?}", other))),
    }
}

fn pure_address(argument: &Argument) -> Result<String> {
    match argument {
        Argument::Pure(PureValue::Address(address)) => Ok(address.clone()),
        other => Err(Error::Ledger(format!("expected an address, got {:?}", other))),
    }
}

fn object_id(argument: &Argument) -> Result<String> {
    match argument {
        Argument::Object(id) => Ok(id.clone()),
        other => Err(Error::Ledger(format!("expected an object, got {:?}", other))),
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn get_vault(&self, vault_id: &str) -> Result<Vault> {
        self.state
            .read()
            .await
            .vaults
            .get(vault_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vault {}", vault_id)))
    }

    async fn submit(
        &self,
        data: &TransactionData,
        signatures: &[TransactionSignature],
    ) -> Result<String> {
        Self::check_signatures(data, signatures)?;

        let mut state = self.state.write().await;
        let budget = U256::from(data.gas_budget);
        let gas_balance = state.balance(&data.gas_owner, coin_types::SUI);
        if gas_balance < budget {
            return Err(Error::Ledger(format!(
                "gas owner {} cannot cover gas budget {} (balance {})",
                data.gas_owner, budget, gas_balance
            )));
        }

        let now_ms = self.clock.now_ms();
        let mut next = (*state).clone();
        self.execute(&mut next, data, now_ms)?;
        next.debit(&data.gas_owner, coin_types::SUI, self.gas_cost.min(budget))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&data.signing_bytes()?);
        hasher.update(&next.sequence.to_le_bytes());
        next.sequence += 1;
        let digest = hasher.finalize().to_hex().to_string();
        next.digests.insert(digest.clone());

        *state = next;
        tracing::debug!(
            digest = %digest,
            sender = %data.sender,
            gas_owner = %data.gas_owner,
            recipe = %data.transaction.recipe,
            "Transaction executed"
        );
        Ok(digest)
    }

    async fn wait_for_transaction(&self, digest: &str) -> Result<()> {
        if self.state.read().await.digests.contains(digest) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("transaction {}", digest)))
        }
    }

    fn name(&self) -> &'static str {
        "in_memory"
    }
}
