//! Agent decisions
//!
//! A decision is what the external decision source proposes for one cycle. It
//! is untrusted text until it has gone through [`parse_decision`].

mod parser;
pub mod prompt;
pub mod source;

pub use parser::{parse_decision, validate_decision};
pub use source::{DecisionSource, LlmDecisionSource, ScriptedDecisionSource};

use crate::units::ActionKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence below which the orchestrator forces a hold
pub const CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Closed set of actions the decision source may propose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    SwapSuiToUsdc,
    SwapUsdcToSui,
    StableMint,
    StableBurn,
    StableClaim,
    Hold,
}

impl DecisionAction {
    pub const ALL: [DecisionAction; 6] = [
        DecisionAction::SwapSuiToUsdc,
        DecisionAction::SwapUsdcToSui,
        DecisionAction::StableMint,
        DecisionAction::StableBurn,
        DecisionAction::StableClaim,
        DecisionAction::Hold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::SwapSuiToUsdc => "swap_sui_to_usdc",
            DecisionAction::SwapUsdcToSui => "swap_usdc_to_sui",
            DecisionAction::StableMint => "stable_mint",
            DecisionAction::StableBurn => "stable_burn",
            DecisionAction::StableClaim => "stable_claim",
            DecisionAction::Hold => "hold",
        }
    }

    /// Whitelist code checked by the policy; `None` for hold
    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            DecisionAction::SwapSuiToUsdc | DecisionAction::SwapUsdcToSui => {
                Some(ActionKind::Swap)
            }
            DecisionAction::StableMint => Some(ActionKind::StableMint),
            DecisionAction::StableBurn => Some(ActionKind::StableBurn),
            DecisionAction::StableClaim => Some(ActionKind::StableClaim),
            DecisionAction::Hold => None,
        }
    }

    /// Whether the action withdraws funds from the vault
    pub fn spends(&self) -> bool {
        matches!(
            self,
            DecisionAction::SwapSuiToUsdc
                | DecisionAction::SwapUsdcToSui
                | DecisionAction::StableMint
        )
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional trade parameters, as decimal strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionParams {
    /// Amount in SUI, e.g. "0.5"
    pub amount: String,
    /// Minimum swap output in USDC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_out: Option<String>,
    /// Slippage fraction, e.g. "0.01"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage: Option<String>,
}

/// A validated decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub reasoning: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<DecisionParams>,
}

impl Decision {
    /// Hold synthesized by the engine rather than proposed by the source
    pub fn hold(reasoning: impl Into<String>) -> Self {
        Self {
            action: DecisionAction::Hold,
            reasoning: reasoning.into(),
            confidence: 0.0,
            params: None,
        }
    }

    pub fn amount(&self) -> Option<&str> {
        self.params.as_ref().map(|p| p.amount.as_str())
    }

    /// Rewrite a low-confidence decision into a hold, keeping the original
    /// reasoning after an annotation.
    pub fn gated(self) -> Self {
        if self.confidence >= CONFIDENCE_THRESHOLD || self.action == DecisionAction::Hold {
            return self;
        }
        let reasoning = format!(
            "[Auto-hold: confidence {}% below {}% threshold] {}",
            (self.confidence * 100.0).round(),
            (CONFIDENCE_THRESHOLD * 100.0).round(),
            self.reasoning
        );
        Self {
            action: DecisionAction::Hold,
            reasoning,
            confidence: self.confidence,
            params: self.params,
        }
    }
}
