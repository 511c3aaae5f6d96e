//! Agent runner
//!
//! Drives one decision cycle against a vault:
//!
//! fetch vault -> market snapshot -> decide -> confidence gate -> policy check
//! -> (hold | build) -> execute -> confirm -> re-fetch vault
//!
//! Only a failed vault fetch is returned as `Err`. Every later failure is
//! captured in [`RunResult::error`] with the step it happened at, and the
//! cycle still reports its decision and policy result.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::decision::{parse_decision, prompt, Decision, DecisionSource};
use crate::execution::{ExecutionPath, Executor};
use crate::market::{MarketFeed, MarketSnapshot, DEFAULT_PAIR};
use crate::policy::{check_non_spending, check_policy, PolicyCheckResult};
use crate::ptb::builder::BuildRequest;
use crate::ptb::{AgentTransaction, RouteFinder, TransactionBuilder, VaultTarget};
use crate::units::{self, USDC_DECIMALS};
use crate::vault::{Ledger, Vault};
use crate::wallet::Signers;
use crate::{Error, Result};
use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const HOLD_REASON: &str = "Hold action - no transaction needed";
const NO_AMOUNT_REASON: &str = "No amount specified - no transaction needed";

/// Step of the cycle an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStep {
    MarketData,
    LlmDecision,
    PolicyCheck,
    PtbBuild,
    TxExecute,
}

impl CycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStep::MarketData => "market_data",
            CycleStep::LlmDecision => "llm_decision",
            CycleStep::PolicyCheck => "policy_check",
            CycleStep::PtbBuild => "ptb_build",
            CycleStep::TxExecute => "tx_execute",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleError {
    pub step: CycleStep,
    pub message: String,
}

/// Inputs for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleRequest {
    pub vault_id: String,
    pub agent_cap_id: String,
    pub agent_address: String,
    pub owner_address: String,
    /// Owner's free-text trading directive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

/// Everything one cycle decided and did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub run_id: Uuid,
    /// Cycle start (ms since epoch)
    pub timestamp: u64,
    pub decision: Decision,
    pub policy_check: PolicyCheckResult,
    pub transaction: Option<AgentTransaction>,
    pub tx_digest: Option<String>,
    pub execution_path: Option<ExecutionPath>,
    /// Vault state after the cycle (re-fetched after a confirmed transaction)
    pub vault: Vault,
    pub market: MarketSnapshot,
    pub error: Option<CycleError>,
}

impl RunResult {
    fn fail(&mut self, step: CycleStep, error: &Error) {
        warn!(run_id = %self.run_id, step = %step, error = %error, "Cycle step failed");
        self.error = Some(CycleError {
            step,
            message: error.to_string(),
        });
    }
}

/// Runs decision cycles against one ledger
pub struct AgentRunner {
    ledger: Arc<dyn Ledger>,
    market: Arc<dyn MarketFeed>,
    decisions: Arc<dyn DecisionSource>,
    builder: TransactionBuilder,
    executor: Executor,
    clock: Arc<dyn Clock>,
    decision_timeout: Duration,
    stable_layer_available: bool,
}

impl AgentRunner {
    pub fn new(
        config: &Config,
        ledger: Arc<dyn Ledger>,
        market: Arc<dyn MarketFeed>,
        decisions: Arc<dyn DecisionSource>,
        router: Arc<dyn RouteFinder>,
    ) -> Self {
        Self {
            builder: TransactionBuilder::new(config, router),
            executor: Executor::new(ledger.clone(), &config.execution),
            ledger,
            market,
            decisions,
            clock: Arc::new(SystemClock),
            decision_timeout: Duration::from_millis(config.llm.timeout_ms),
            stable_layer_available: config.stable_layer.available,
        }
    }

    /// Use a shared clock (the in-memory ledger's, in tests and demos)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    /// Run one cycle.
    ///
    /// Fails only when the vault cannot be fetched.
    pub async fn run_cycle(&self, request: &CycleRequest, signers: Signers<'_>) -> Result<RunResult> {
        let vault = self.ledger.get_vault(&request.vault_id).await?;
        let started = self.clock.now_ms();
        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, vault_id = %vault.id, ledger = self.ledger.name(), "Starting cycle");

        let (market, market_error) = match self.market.snapshot(&request.agent_address).await {
            Ok(snapshot) => (snapshot, None),
            Err(e) => (MarketSnapshot::fallback(DEFAULT_PAIR, started), Some(e)),
        };

        let mut result = RunResult {
            run_id,
            timestamp: started,
            decision: Decision::hold("Cycle did not reach a decision"),
            policy_check: PolicyCheckResult::allow(HOLD_REASON),
            transaction: None,
            tx_digest: None,
            execution_path: None,
            vault,
            market,
            error: None,
        };
        if let Some(e) = market_error {
            result.fail(CycleStep::MarketData, &e);
        }

        let decision = match self.decide(request, &result.vault, &result.market).await {
            Ok(decision) => decision,
            Err(e) => {
                result.decision = Decision::hold(format!("Decision unavailable: {}", e));
                result.fail(CycleStep::LlmDecision, &e);
                return Ok(result);
            }
        };

        result.decision = decision.gated();
        let decision = result.decision.clone();
        info!(
            run_id = %run_id,
            action = %decision.action,
            confidence = decision.confidence,
            amount = ?decision.amount(),
            "Decision"
        );

        let Some(kind) = decision.action.action_kind() else {
            return Ok(result);
        };

        let now = self.clock.now_ms();
        let amount = if decision.action.spends() {
            let amount = match decision.amount().map(units::sui_to_mist).transpose() {
                Ok(amount) => amount.unwrap_or(U256::ZERO),
                Err(e) => {
                    result.policy_check = PolicyCheckResult::deny(format!("Invalid amount: {}", e));
                    result.fail(CycleStep::PolicyCheck, &e);
                    return Ok(result);
                }
            };
            if amount.is_zero() {
                result.policy_check = PolicyCheckResult::allow(NO_AMOUNT_REASON);
                return Ok(result);
            }
            result.policy_check = check_policy(&result.vault, amount, kind, now);
            amount
        } else {
            result.policy_check = check_non_spending(&result.vault, kind, now);
            U256::ZERO
        };

        if !result.policy_check.allowed {
            info!(
                run_id = %run_id,
                action = %decision.action,
                amount = %amount,
                reason = %result.policy_check.reason,
                "Policy denied"
            );
            return Ok(result);
        }

        let transaction = match self.build(request, &decision, amount).await {
            Ok(tx) => tx,
            Err(e) => {
                result.fail(CycleStep::PtbBuild, &e);
                return Ok(result);
            }
        };
        debug!(run_id = %run_id, recipe = %transaction.recipe, commands = transaction.commands.len(), "Built transaction");
        result.transaction = Some(transaction.clone());

        let execution = match self.executor.execute(&transaction, signers).await {
            Ok(execution) => execution,
            Err(e) => {
                result.fail(CycleStep::TxExecute, &e);
                return Ok(result);
            }
        };
        result.tx_digest = Some(execution.digest.clone());
        result.execution_path = Some(execution.path);

        let refreshed = match self.executor.confirm(&execution.digest).await {
            Ok(()) => self.ledger.get_vault(&request.vault_id).await,
            Err(e) => Err(e),
        };
        match refreshed {
            Ok(vault) => result.vault = vault,
            Err(e) => result.fail(CycleStep::TxExecute, &e),
        }

        info!(
            run_id = %run_id,
            digest = %execution.digest,
            path = %execution.path,
            balance = %result.vault.balance,
            "Cycle complete"
        );
        Ok(result)
    }

    async fn decide(
        &self,
        request: &CycleRequest,
        vault: &Vault,
        market: &MarketSnapshot,
    ) -> Result<Decision> {
        let system = prompt::system_prompt(request.strategy.as_deref());
        let user = prompt::user_prompt(vault, market, self.stable_layer_available);

        let text = tokio::time::timeout(self.decision_timeout, self.decisions.complete(&system, &user))
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "decision source {} did not answer within {}ms",
                    self.decisions.name(),
                    self.decision_timeout.as_millis()
                ))
            })??;

        parse_decision(&text)
    }

    async fn build(
        &self,
        request: &CycleRequest,
        decision: &Decision,
        amount: U256,
    ) -> Result<AgentTransaction> {
        let params = decision.params.as_ref();
        let slippage = params
            .and_then(|p| p.slippage.as_deref())
            .map(|s| {
                s.parse::<f64>()
                    .map_err(|e| Error::PtbBuildFailed(format!("Invalid slippage {}: {}", s, e)))
            })
            .transpose()?;
        let min_out = params
            .and_then(|p| p.min_out.as_deref())
            .map(|m| units::parse_units(m, USDC_DECIMALS))
            .transpose()?;

        let target = VaultTarget {
            vault_id: request.vault_id.clone(),
            agent_cap_id: request.agent_cap_id.clone(),
            owner: request.owner_address.clone(),
        };
        self.builder
            .build(&BuildRequest {
                target: &target,
                action: decision.action,
                amount,
                slippage,
                min_out,
            })
            .await
    }
}

/// Bounded history of recent cycles, oldest first
#[derive(Debug, Clone)]
pub struct RunLog {
    capacity: usize,
    entries: VecDeque<RunResult>,
}

impl RunLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    /// Append a result, evicting the oldest when full.
    pub fn push(&mut self, result: RunResult) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn latest(&self) -> Option<&RunResult> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunResult> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::config::SuiNetwork;
    use crate::decision::{DecisionAction, ScriptedDecisionSource};
    use crate::market::{AggregatorMarketFeed, MarketSource};
    use crate::ptb::{FixedRateRouter, Recipe, RouteQuote};
    use crate::units::{coin_types, ActionKind};
    use crate::vault::fixtures::{sui, vault, OWNER};
    use crate::vault::{InMemoryLedger, Policy};
    use crate::wallet::{SecureWallet, TransactionSigner};
    use async_trait::async_trait;

    const NOW: u64 = 1_700_000_000_000;

    struct BrokenFeed;

    #[async_trait]
    impl MarketFeed for BrokenFeed {
        async fn snapshot(&self, _probe_address: &str) -> Result<MarketSnapshot> {
            Err(Error::Router("feed offline".to_string()))
        }
    }

    struct DownRouter;

    #[async_trait]
    impl RouteFinder for DownRouter {
        async fn find_route(&self, _from: &str, _target: &str, _amount_in: U256) -> Result<RouteQuote> {
            Err(Error::Router("Aggregator returned HTTP 503".to_string()))
        }

        fn name(&self) -> &'static str {
            "down"
        }
    }

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        clock: Arc<FixedClock>,
        config: Config,
        agent: SecureWallet,
        sponsor: SecureWallet,
        request: CycleRequest,
        owner_cap: String,
    }

    impl Harness {
        async fn new(network: SuiNetwork, policy: Policy) -> Self {
            let config = Config::for_network(network);
            let clock = Arc::new(FixedClock::new(NOW));
            let ledger = Arc::new(InMemoryLedger::new(&config, clock.clone()));
            let agent = SecureWallet::random();
            let sponsor = SecureWallet::random();

            ledger.fund(OWNER, coin_types::SUI, sui("100")).await;
            ledger.fund(&sponsor.address(), coin_types::SUI, sui("1")).await;
            let (vault_id, owner_cap) = ledger.create_vault(OWNER, sui("20"), policy).await.unwrap();
            let agent_cap_id = ledger
                .create_agent_cap(&vault_id, &owner_cap, &agent.address())
                .await
                .unwrap();

            let request = CycleRequest {
                vault_id,
                agent_cap_id,
                agent_address: agent.address(),
                owner_address: OWNER.to_string(),
                strategy: None,
            };
            Self {
                ledger,
                clock,
                config,
                agent,
                sponsor,
                request,
                owner_cap,
            }
        }

        async fn testnet() -> Self {
            Self::new(SuiNetwork::Testnet, vault().policy).await
        }

        fn runner_with(
            &self,
            source: ScriptedDecisionSource,
            router: impl RouteFinder + 'static,
        ) -> AgentRunner {
            let router: Arc<dyn RouteFinder> = Arc::new(router);
            let market = Arc::new(
                AggregatorMarketFeed::new(router.clone(), &self.config.coins.sui, &self.config.coins.usdc)
                    .with_clock(self.clock.clone()),
            );
            AgentRunner::new(&self.config, self.ledger.clone(), market, Arc::new(source), router)
                .with_clock(self.clock.clone())
        }

        fn runner(&self, response: &str) -> AgentRunner {
            self.runner_with(
                ScriptedDecisionSource::single(response),
                FixedRateRouter::new(&self.config.coins.usdc, 1.5),
            )
        }

        async fn run(&self, runner: &AgentRunner) -> RunResult {
            runner
                .run_cycle(&self.request, Signers::new(&self.agent, Some(&self.sponsor)))
                .await
                .unwrap()
        }
    }

    fn decision(action: &str, amount: &str, confidence: f64) -> String {
        format!(
            r#"{{"action":"{}","reasoning":"test","confidence":{},"params":{{"amount":"{}"}}}}"#,
            action, confidence, amount
        )
    }

    #[tokio::test]
    async fn test_swap_executes_and_refetches_vault() {
        let h = Harness::testnet().await;
        let runner = h.runner(&decision("swap_sui_to_usdc", "1", 0.8));
        let result = h.run(&runner).await;

        assert_eq!(result.error, None);
        assert!(result.policy_check.allowed);
        assert_eq!(result.transaction.as_ref().unwrap().recipe, Recipe::RouterSwap);
        assert!(result.tx_digest.is_some());
        assert_eq!(result.execution_path, Some(ExecutionPath::Sponsored));
        assert_eq!(result.market.source, MarketSource::Live);

        assert_eq!(result.vault.balance, sui("19"));
        assert_eq!(result.vault.total_spent, sui("1"));
        assert_eq!(result.vault.tx_count, 1);
        assert_eq!(
            h.ledger.balance(OWNER, &h.config.coins.usdc).await,
            U256::from(1_500_000u64)
        );
    }

    #[tokio::test]
    async fn test_budget_overflow_denied_without_ledger_interaction() {
        let mut policy = vault().policy;
        policy.max_per_tx = sui("5");
        let h = Harness::new(SuiNetwork::Testnet, policy).await;

        // Spend 9.5 of the 10 SUI budget: 2 + 2 + 2 + 2 + 1.5
        for amount in ["2", "2", "2", "2", "1.5"] {
            let r = h.runner(&decision("swap_usdc_to_sui", amount, 0.9));
            let result = h.run(&r).await;
            assert!(result.tx_digest.is_some(), "{:?}", result.error);
            h.clock.advance(60_000);
        }

        let over = h.runner(&decision("swap_usdc_to_sui", "1.0", 0.9));
        let result = h.run(&over).await;
        assert!(!result.policy_check.allowed);
        assert!(result.policy_check.reason.contains("remaining budget"));
        assert!(result.policy_check.reason.contains("0.5 SUI"));
        assert_eq!(result.transaction, None);
        assert_eq!(result.tx_digest, None);
        assert_eq!(result.error, None);
        assert_eq!(result.vault.tx_count, 5);
    }

    #[tokio::test]
    async fn test_cooldown_denies_second_cycle() {
        let h = Harness::testnet().await;
        let runner = h.runner(&decision("swap_usdc_to_sui", "1", 0.9));
        assert!(h.run(&runner).await.tx_digest.is_some());

        h.clock.advance(1);
        let result = h.run(&runner).await;
        assert!(!result.policy_check.allowed);
        assert_eq!(result.policy_check.reason, "Cooldown active: 59999ms remaining");
        assert_eq!(result.transaction, None);
    }

    #[tokio::test]
    async fn test_low_confidence_is_held_before_policy() {
        let mut policy = vault().policy;
        // Would be denied if the policy check ran
        policy.expires_at = NOW;
        let h = Harness::new(SuiNetwork::Testnet, policy).await;
        let runner = h.runner(&decision("swap_sui_to_usdc", "1", 0.42));
        let result = h.run(&runner).await;

        assert_eq!(result.decision.action, DecisionAction::Hold);
        assert!(result
            .decision
            .reasoning
            .starts_with("[Auto-hold: confidence 42% below 50% threshold]"));
        assert!(result.policy_check.allowed);
        assert_eq!(result.policy_check.reason, HOLD_REASON);
        assert_eq!(result.transaction, None);
    }

    #[tokio::test]
    async fn test_expiry_boundary_is_denied() {
        let mut policy = vault().policy;
        policy.expires_at = NOW;
        let h = Harness::new(SuiNetwork::Testnet, policy).await;
        let result = h.run(&h.runner(&decision("swap_sui_to_usdc", "1", 0.9))).await;

        assert!(!result.policy_check.allowed);
        assert_eq!(result.policy_check.reason, "Policy has expired");
        assert_eq!(result.transaction, None);
    }

    #[tokio::test]
    async fn test_zero_or_missing_amount_holds() {
        let h = Harness::testnet().await;
        let result = h.run(&h.runner(&decision("swap_sui_to_usdc", "0", 0.9))).await;
        assert!(result.policy_check.allowed);
        assert_eq!(result.policy_check.reason, NO_AMOUNT_REASON);
        assert_eq!(result.transaction, None);

        let no_params = r#"{"action":"swap_sui_to_usdc","reasoning":"go","confidence":0.9}"#;
        let result = h.run(&h.runner(no_params)).await;
        assert!(result.policy_check.allowed);
        assert_eq!(result.transaction, None);
        assert_eq!(result.vault.tx_count, 0);
    }

    #[tokio::test]
    async fn test_no_route_falls_back_to_simple_withdraw() {
        let h = Harness::testnet().await;
        let runner = h.runner_with(
            ScriptedDecisionSource::single(decision("swap_sui_to_usdc", "1", 0.9)),
            FixedRateRouter::new(&h.config.coins.usdc, 1.5).with_liquidity(U256::ZERO),
        );
        let result = h.run(&runner).await;

        let builder = TransactionBuilder::new(
            &h.config,
            Arc::new(FixedRateRouter::new(&h.config.coins.usdc, 1.5)),
        );
        let target = VaultTarget {
            vault_id: h.request.vault_id.clone(),
            agent_cap_id: h.request.agent_cap_id.clone(),
            owner: OWNER.to_string(),
        };
        assert_eq!(
            result.transaction,
            Some(builder.simple_withdraw(&target, sui("1"), ActionKind::Swap))
        );
        assert_eq!(result.market.source, MarketSource::Fallback);
        assert!(result.tx_digest.is_some());
        assert_eq!(h.ledger.balance(OWNER, coin_types::SUI).await, sui("81"));
    }

    #[tokio::test]
    async fn test_router_outage_falls_back_to_simple_withdraw() {
        let h = Harness::testnet().await;
        let runner = h.runner_with(
            ScriptedDecisionSource::single(decision("swap_sui_to_usdc", "1", 0.9)),
            DownRouter,
        );
        let result = h.run(&runner).await;

        let builder = TransactionBuilder::new(&h.config, Arc::new(DownRouter));
        let target = VaultTarget {
            vault_id: h.request.vault_id.clone(),
            agent_cap_id: h.request.agent_cap_id.clone(),
            owner: OWNER.to_string(),
        };
        assert_eq!(
            result.transaction,
            Some(builder.simple_withdraw(&target, sui("1"), ActionKind::Swap))
        );
        assert_eq!(result.error, None);
        assert!(result.tx_digest.is_some());
        assert_eq!(result.vault.total_spent, sui("1"));
    }

    #[tokio::test]
    async fn test_market_snapshot_uses_cycle_clock() {
        let h = Harness::testnet().await;
        h.clock.advance(5_000);
        let live = h.run(&h.runner(&decision("hold", "0", 0.9))).await;
        assert_eq!(live.timestamp, NOW + 5_000);
        assert_eq!(live.market.timestamp, live.timestamp);

        let down = h
            .run(&h.runner_with(ScriptedDecisionSource::single(decision("hold", "0", 0.9)), DownRouter))
            .await;
        assert_eq!(down.market.source, MarketSource::Fallback);
        assert_eq!(down.market.timestamp, NOW + 5_000);
    }

    #[tokio::test]
    async fn test_direct_path_when_no_sponsor() {
        let h = Harness::testnet().await;
        h.ledger.fund(&h.agent.address(), coin_types::SUI, sui("1")).await;
        let runner = h.runner(&decision("swap_usdc_to_sui", "1", 0.9));
        let result = runner
            .run_cycle(&h.request, Signers::new(&h.agent, None))
            .await
            .unwrap();

        assert_eq!(result.execution_path, Some(ExecutionPath::Direct));
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn test_execution_failure_keeps_decision_and_transaction() {
        let h = Harness::testnet().await;
        let runner = h.runner(&decision("swap_usdc_to_sui", "1", 0.9));
        let result = runner
            .run_cycle(&h.request, Signers::new(&h.agent, None))
            .await
            .unwrap();

        let error = result.error.unwrap();
        assert_eq!(error.step, CycleStep::TxExecute);
        assert!(error.message.contains("sponsored: "));
        assert!(error.message.contains("direct: "));
        assert!(result.policy_check.allowed);
        assert!(result.transaction.is_some());
        assert_eq!(result.tx_digest, None);
        assert_eq!(result.vault.tx_count, 0);
    }

    #[tokio::test]
    async fn test_contract_rejects_revoked_cap() {
        let h = Harness::testnet().await;
        h.ledger
            .revoke_agent_cap(&h.request.vault_id, &h.owner_cap, &h.request.agent_cap_id)
            .await
            .unwrap();
        let result = h.run(&h.runner(&decision("swap_usdc_to_sui", "1", 0.9))).await;

        assert!(result.policy_check.allowed);
        assert_eq!(result.error.unwrap().step, CycleStep::TxExecute);
    }

    #[tokio::test]
    async fn test_malformed_decision_synthesizes_hold() {
        let h = Harness::testnet().await;
        let result = h.run(&h.runner("I think we should buy")).await;

        assert_eq!(result.decision.action, DecisionAction::Hold);
        assert_eq!(result.decision.confidence, 0.0);
        assert!(result.policy_check.allowed);
        assert_eq!(result.transaction, None);
        let error = result.error.unwrap();
        assert_eq!(error.step, CycleStep::LlmDecision);
        assert!(error.message.contains("Malformed decision"));
    }

    #[tokio::test]
    async fn test_decision_timeout_synthesizes_hold() {
        let h = Harness::testnet().await;
        let runner = h
            .runner_with(
                ScriptedDecisionSource::single(decision("swap_sui_to_usdc", "1", 0.9))
                    .with_delay(Duration::from_millis(500)),
                FixedRateRouter::new(&h.config.coins.usdc, 1.5),
            )
            .with_decision_timeout(Duration::from_millis(20));
        let result = h.run(&runner).await;

        assert_eq!(result.decision.action, DecisionAction::Hold);
        let error = result.error.unwrap();
        assert_eq!(error.step, CycleStep::LlmDecision);
        assert!(error.message.starts_with("Timed out"));
    }

    #[tokio::test]
    async fn test_market_failure_degrades_and_continues() {
        let h = Harness::testnet().await;
        let router: Arc<dyn RouteFinder> = Arc::new(FixedRateRouter::new(&h.config.coins.usdc, 1.5));
        let runner = AgentRunner::new(
            &h.config,
            h.ledger.clone(),
            Arc::new(BrokenFeed),
            Arc::new(ScriptedDecisionSource::single(decision("swap_usdc_to_sui", "1", 0.9))),
            router,
        )
        .with_clock(h.clock.clone());
        let result = h.run(&runner).await;

        assert_eq!(result.market.source, MarketSource::Fallback);
        assert_eq!(result.market.timestamp, result.timestamp);
        assert!(result.tx_digest.is_some());
        assert_eq!(result.error.unwrap().step, CycleStep::MarketData);
    }

    #[tokio::test]
    async fn test_stable_mint_unavailable_on_testnet() {
        let h = Harness::testnet().await;
        let result = h.run(&h.runner(&decision("stable_mint", "1", 0.9))).await;

        assert!(result.policy_check.allowed);
        assert_eq!(result.error.unwrap().step, CycleStep::PtbBuild);
        assert_eq!(result.vault.tx_count, 0);
    }

    #[tokio::test]
    async fn test_stable_claim_skips_spend_checks() {
        let h = Harness::new(SuiNetwork::Mainnet, vault().policy).await;
        h.ledger.accrue_yield(OWNER, U256::from(25_000u64)).await;
        let claim = r#"{"action":"stable_claim","reasoning":"harvest","confidence":0.7}"#;
        let result = h.run(&h.runner(claim)).await;

        assert_eq!(result.error, None);
        assert_eq!(result.transaction.unwrap().recipe, Recipe::StableClaim);
        assert_eq!(result.vault.total_spent, U256::ZERO);
        assert_eq!(
            h.ledger.balance(OWNER, &h.config.coins.usdc).await,
            U256::from(25_000u64)
        );
    }

    #[tokio::test]
    async fn test_whitelist_denial() {
        let mut policy = vault().policy;
        policy.allowed_actions = vec![ActionKind::Swap.code()];
        let h = Harness::new(SuiNetwork::Mainnet, policy).await;
        let result = h.run(&h.runner(&decision("stable_mint", "1", 0.9))).await;

        assert!(!result.policy_check.allowed);
        assert_eq!(result.policy_check.reason, "Action type 1 is not whitelisted");
    }

    #[tokio::test]
    async fn test_missing_vault_is_an_error() {
        let h = Harness::testnet().await;
        let runner = h.runner(&decision("hold", "0", 0.9));
        let mut request = h.request.clone();
        request.vault_id = "0xmissing".to_string();
        let err = runner
            .run_cycle(&request, Signers::new(&h.agent, None))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_run_log_is_bounded() {
        let result = RunResult {
            run_id: Uuid::new_v4(),
            timestamp: NOW,
            decision: Decision::hold("idle"),
            policy_check: PolicyCheckResult::allow(HOLD_REASON),
            transaction: None,
            tx_digest: None,
            execution_path: None,
            vault: vault(),
            market: MarketSnapshot::fallback(DEFAULT_PAIR, NOW),
            error: None,
        };

        let mut log = RunLog::new(2);
        for timestamp in [1, 2, 3] {
            log.push(RunResult {
                timestamp,
                ..result.clone()
            });
        }
        assert_eq!(log.len(), 2);
        assert_eq!(log.iter().map(|r| r.timestamp).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(log.latest().map(|r| r.timestamp), Some(3));
    }
}
