//! Transaction builder
//!
//! Each decision action maps to an ordered list of recipes. The builder tries
//! them in order. A missing route or a failed route lookup moves on to the
//! next recipe; any other error ends the build. Builders never decide whether an action is allowed;
//! the policy checker has already run by the time they are called.

use super::router::RouteFinder;
use super::{AgentTransaction, Argument, Command, PureValue, Recipe};
use crate::config::{CoinConfig, Config, ContractConfig, StableLayerConfig};
use crate::decision::DecisionAction;
use crate::units::{self, ActionKind};
use crate::{Error, Result};
use alloy::primitives::U256;
use std::sync::Arc;

/// Vault objects and addresses a transaction acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultTarget {
    pub vault_id: String,
    pub agent_cap_id: String,
    /// Receives withdrawn funds and swap outputs
    pub owner: String,
}

/// What to build
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub target: &'a VaultTarget,
    pub action: DecisionAction,
    /// Withdraw amount (MIST); ignored by burn and claim
    pub amount: U256,
    /// Swap slippage fraction; config default when absent
    pub slippage: Option<f64>,
    /// Caller's output floor in target-coin units
    pub min_out: Option<U256>,
}

/// Recipes tried for an action, preferred first
pub fn attempts(action: DecisionAction) -> &'static [Recipe] {
    match action {
        DecisionAction::SwapSuiToUsdc => &[Recipe::RouterSwap, Recipe::SimpleWithdraw],
        DecisionAction::SwapUsdcToSui => &[Recipe::SimpleWithdraw],
        DecisionAction::StableMint => &[Recipe::StableMint, Recipe::SimpleWithdraw],
        DecisionAction::StableBurn => &[Recipe::StableBurn],
        DecisionAction::StableClaim => &[Recipe::StableClaim],
        DecisionAction::Hold => &[],
    }
}

/// Builds agent transactions against the vault contract
pub struct TransactionBuilder {
    contracts: ContractConfig,
    coins: CoinConfig,
    stable_layer: StableLayerConfig,
    router: Arc<dyn RouteFinder>,
    default_slippage: f64,
    max_slippage: f64,
}

impl TransactionBuilder {
    pub fn new(config: &Config, router: Arc<dyn RouteFinder>) -> Self {
        Self {
            contracts: config.contracts.clone(),
            coins: config.coins.clone(),
            stable_layer: config.stable_layer.clone(),
            router,
            default_slippage: config.router.default_slippage,
            max_slippage: config.router.max_slippage,
        }
    }

    /// Build the first recipe that succeeds for the requested action.
    pub async fn build(&self, request: &BuildRequest<'_>) -> Result<AgentTransaction> {
        let recipes = attempts(request.action);
        if recipes.is_empty() {
            return Err(Error::PtbBuildFailed(format!(
                "action {} has no transaction",
                request.action
            )));
        }

        let mut skipped: Vec<String> = Vec::new();
        for recipe in recipes {
            match self.build_recipe(*recipe, request).await {
                Ok(tx) => {
                    if !skipped.is_empty() {
                        tracing::warn!(
                            action = %request.action,
                            recipe = %recipe,
                            skipped = %skipped.join("; "),
                            "Built fallback recipe"
                        );
                    }
                    return Ok(tx);
                }
                Err(Error::NoRouteFound(reason)) | Err(Error::Router(reason)) => {
                    tracing::warn!(
                        action = %request.action,
                        recipe = %recipe,
                        reason = %reason,
                        "No route, trying next recipe"
                    );
                    skipped.push(format!("{}: {}", recipe, reason));
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::NoRouteFound(skipped.join("; ")))
    }

    /// Build one specific recipe.
    pub async fn build_recipe(
        &self,
        recipe: Recipe,
        request: &BuildRequest<'_>,
    ) -> Result<AgentTransaction> {
        let kind = request.action.action_kind().ok_or_else(|| {
            Error::PtbBuildFailed(format!("action {} has no action code", request.action))
        })?;

        match recipe {
            Recipe::SimpleWithdraw => {
                Ok(self.simple_withdraw(request.target, request.amount, kind))
            }
            Recipe::RouterSwap => {
                self.router_swap(
                    request.target,
                    request.amount,
                    request.slippage,
                    request.min_out,
                )
                .await
            }
            Recipe::StableMint => self.stable_mint(request.target, request.amount).await,
            Recipe::StableBurn => self.stable_burn(request.target),
            Recipe::StableClaim => self.stable_claim(request.target),
        }
    }

    fn withdraw_call(&self, target: &VaultTarget, amount: U256, kind: ActionKind) -> Command {
        Command::MoveCall {
            target: self.contracts.target("agent_withdraw"),
            type_arguments: vec![],
            arguments: vec![
                Argument::object(&target.vault_id),
                Argument::object(&target.agent_cap_id),
                Argument::amount(amount),
                Argument::Pure(PureValue::U8(kind.code())),
                Argument::object(&self.contracts.clock_object_id),
            ],
        }
    }

    /// Withdraw straight to the owner.
    pub fn simple_withdraw(
        &self,
        target: &VaultTarget,
        amount: U256,
        kind: ActionKind,
    ) -> AgentTransaction {
        AgentTransaction {
            recipe: Recipe::SimpleWithdraw,
            action: kind,
            amount,
            commands: vec![
                self.withdraw_call(target, amount, kind),
                Command::TransferObjects {
                    objects: vec![Argument::Result(0)],
                    recipient: Argument::address(&target.owner),
                },
            ],
        }
    }

    /// Withdraw SUI, swap it to USDC along the best route, send the output
    /// to the owner.
    pub async fn router_swap(
        &self,
        target: &VaultTarget,
        amount: U256,
        slippage: Option<f64>,
        min_out: Option<U256>,
    ) -> Result<AgentTransaction> {
        let slippage = self.checked_slippage(slippage)?;
        let (route_step, floor) = self
            .route_step(&self.coins.usdc, amount, slippage, min_out)
            .await?;
        tracing::debug!(amount = %amount, min_out = %floor, "Built swap step");

        Ok(AgentTransaction {
            recipe: Recipe::RouterSwap,
            action: ActionKind::Swap,
            amount,
            commands: vec![
                self.withdraw_call(target, amount, ActionKind::Swap),
                route_step,
                Command::TransferObjects {
                    objects: vec![Argument::Result(1)],
                    recipient: Argument::address(&target.owner),
                },
            ],
        })
    }

    /// Withdraw SUI, swap to USDC, mint the yield-bearing coin for the owner.
    pub async fn stable_mint(&self, target: &VaultTarget, amount: U256) -> Result<AgentTransaction> {
        self.require_stable_layer()?;
        let (route_step, _) = self
            .route_step(&self.coins.usdc, amount, self.default_slippage, None)
            .await?;
        let expected_usdc = match &route_step {
            Command::RouterSwap { route, .. } => route.amount_out,
            _ => U256::ZERO,
        };

        Ok(AgentTransaction {
            recipe: Recipe::StableMint,
            action: ActionKind::StableMint,
            amount,
            commands: vec![
                self.withdraw_call(target, amount, ActionKind::StableMint),
                route_step,
                Command::MoveCall {
                    target: self.stable_layer.target("mint"),
                    type_arguments: vec![self.stable_layer.stable_coin_type.clone()],
                    arguments: vec![
                        Argument::Result(1),
                        Argument::amount(expected_usdc),
                        Argument::address(&target.owner),
                    ],
                },
            ],
        })
    }

    /// Burn the owner's whole yield-coin position back to USDC. No withdraw.
    pub fn stable_burn(&self, target: &VaultTarget) -> Result<AgentTransaction> {
        self.require_stable_layer()?;
        Ok(AgentTransaction {
            recipe: Recipe::StableBurn,
            action: ActionKind::StableBurn,
            amount: U256::ZERO,
            commands: vec![Command::MoveCall {
                target: self.stable_layer.target("burn"),
                type_arguments: vec![self.stable_layer.stable_coin_type.clone()],
                arguments: vec![
                    Argument::Pure(PureValue::Bool(true)),
                    Argument::address(&target.owner),
                ],
            }],
        })
    }

    /// Claim accrued yield to the owner. No withdraw.
    pub fn stable_claim(&self, target: &VaultTarget) -> Result<AgentTransaction> {
        self.require_stable_layer()?;
        Ok(AgentTransaction {
            recipe: Recipe::StableClaim,
            action: ActionKind::StableClaim,
            amount: U256::ZERO,
            commands: vec![Command::MoveCall {
                target: self.stable_layer.target("claim"),
                type_arguments: vec![self.stable_layer.stable_coin_type.clone()],
                arguments: vec![Argument::address(&target.owner)],
            }],
        })
    }

    fn checked_slippage(&self, slippage: Option<f64>) -> Result<f64> {
        let slippage = slippage.unwrap_or(self.default_slippage);
        if !(0.0..=self.max_slippage).contains(&slippage) {
            return Err(Error::PtbBuildFailed(format!(
                "Slippage out of safe range: {}. Must be 0-{}%",
                slippage,
                self.max_slippage * 100.0
            )));
        }
        Ok(slippage)
    }

    fn require_stable_layer(&self) -> Result<()> {
        if self.stable_layer.available {
            Ok(())
        } else {
            Err(Error::PtbBuildFailed(
                "Stablelayer is not available on this network".to_string(),
            ))
        }
    }

    /// Quote SUI -> `target_coin` and wrap the quote as a swap step that
    /// consumes the withdrawn coin.
    async fn route_step(
        &self,
        target_coin: &str,
        amount: U256,
        slippage: f64,
        min_out: Option<U256>,
    ) -> Result<(Command, U256)> {
        let route = self
            .router
            .find_route(&self.coins.sui, target_coin, amount)
            .await?;

        let mut floor = route.min_out(slippage);
        if let Some(requested) = min_out {
            if requested > route.amount_out {
                let decimals = units::coin_info(target_coin)
                    .map(|info| info.decimals)
                    .unwrap_or(units::USDC_DECIMALS);
                return Err(Error::PtbBuildFailed(format!(
                    "Quoted output {} is below requested minimum {}",
                    units::format_units(route.amount_out, decimals),
                    units::format_units(requested, decimals)
                )));
            }
            floor = floor.max(requested);
        }

        tracing::debug!(
            router = self.router.name(),
            amount_out = %route.amount_out,
            paths = route.paths.len(),
            "Route found"
        );

        Ok((
            Command::RouterSwap {
                route,
                input: Argument::Result(0),
                slippage,
                min_out: floor,
            },
            floor,
        ))
    }
}
