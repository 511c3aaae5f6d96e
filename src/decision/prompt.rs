//! Prompt construction for the decision source

use crate::market::MarketSnapshot;
use crate::units::{mist_to_sui, mist_to_sui_f64};
use crate::vault::Vault;
use chrono::{TimeZone, Utc};

/// Owner strategy directives are cut to this many characters
pub const MAX_STRATEGY_CHARS: usize = 500;

/// Share of the remaining budget suggested as the largest single trade
const POSITION_SIZE_FRACTION: f64 = 0.3;

const BASE_SYSTEM_PROMPT: &str = r#"You are an AI trading agent managing a Sui blockchain vault.
Your job is to analyze market conditions and make trading decisions within your policy constraints.

You MUST respond with ONLY a JSON object (no markdown, no explanation outside JSON):
{
  "action": "swap_sui_to_usdc" | "swap_usdc_to_sui" | "stable_mint" | "stable_burn" | "stable_claim" | "hold",
  "reasoning": "Brief explanation of your decision",
  "confidence": 0.0 to 1.0,
  "params": {
    "amount": "amount in SUI as string (e.g. '0.5') - required for swap and stable_mint actions",
    "minOut": "minimum output amount in USDC as string (optional)",
    "slippage": "maximum slippage as a fraction, e.g. '0.01' (optional)"
  }
}

Available Actions:
- "swap_sui_to_usdc": Withdraw SUI from the vault, swap to USDC via the route aggregator, send USDC to the owner
- "swap_usdc_to_sui": Withdraw SUI from the vault and send it directly to the owner
- "stable_mint": Withdraw SUI, swap to USDC, then mint the yield-bearing stablecoin for the owner
- "stable_burn": Burn the owner's yield-bearing stablecoins back to USDC (no vault withdrawal, set amount to "0")
- "stable_claim": Claim accrued yield (no vault withdrawal, set amount to "0")
- "hold": Do nothing this cycle

Rules:
- Only execute trades when you see a clear opportunity
- Use "hold" if market conditions are unclear or unfavorable
- Never exceed the vault's remaining budget or per-tx limit
- Position sizing: never trade more than 30% of the remaining budget in a single transaction
- Consider the cooldown period between transactions
- Set confidence below 0.5 only when you want to signal "hold" (the system auto-holds below 50%)
- Be conservative with amounts - start small
- Only use stable_burn/stable_claim when the owner has existing yield positions
- IMPORTANT: Only use actions that are listed in the Allowed Actions for this vault"#;

/// System prompt, with the owner's strategy directive appended when given.
pub fn system_prompt(strategy: Option<&str>) -> String {
    let directive = strategy.map(str::trim).filter(|s| !s.is_empty());
    match directive {
        None => BASE_SYSTEM_PROMPT.to_string(),
        Some(directive) => {
            let capped: String = directive.chars().take(MAX_STRATEGY_CHARS).collect();
            format!(
                "{}\n\nIMPORTANT - User Strategy Directive:\nThe vault owner has specified the following trading strategy. \
                 Follow it as closely as possible while still respecting all policy constraints:\n---\n{}\n---",
                BASE_SYSTEM_PROMPT, capped
            )
        }
    }
}

/// Largest trade worth suggesting: 30% of the remaining budget, capped by
/// the per-tx limit. In SUI.
pub fn suggested_max_trade(vault: &Vault) -> f64 {
    let by_budget = mist_to_sui_f64(vault.remaining_budget()) * POSITION_SIZE_FRACTION;
    by_budget.min(mist_to_sui_f64(vault.policy.max_per_tx))
}

/// User prompt describing the vault and the market for this cycle.
pub fn user_prompt(vault: &Vault, market: &MarketSnapshot, stable_layer_available: bool) -> String {
    let remaining = vault.remaining_budget();
    let expires = i64::try_from(vault.policy.expires_at)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| vault.policy.expires_at.to_string());

    let level = |levels: &[crate::market::PriceLevel]| {
        levels
            .first()
            .map(|l| (l.price.to_string(), l.quantity.to_string()))
            .unwrap_or_else(|| ("N/A".to_string(), "N/A".to_string()))
    };
    let (bid, bid_qty) = level(&market.bid_levels);
    let (ask, ask_qty) = level(&market.ask_levels);

    let stable_line = if stable_layer_available {
        "- Stablelayer: Available (yield protocol)"
    } else {
        "- Stablelayer: Not available on current network"
    };

    format!(
        "Current Vault State:\n\
         - Balance: {balance} SUI\n\
         - Remaining Budget: {remaining} SUI (of {budget} total)\n\
         - Max Per TX (policy): {per_tx} SUI\n\
         - Suggested Max Trade: {suggested:.4} SUI (30% of remaining budget or per-tx limit, whichever is smaller)\n\
         - Total Transactions: {tx_count}\n\
         - Policy Expires: {expires}\n\
         - Allowed Actions: {allowed}\n\
         \n\
         Market Data ({pair}):\n\
         - Mid Price: {mid}\n\
         - Best Bid: {bid} (qty: {bid_qty})\n\
         - Best Ask: {ask} (qty: {ask_qty})\n\
         - Data Source: {source}\n\
         {stable_line}\n\
         \n\
         What trading action should I take? If confidence is below 50%, choose \"hold\".",
        balance = mist_to_sui(vault.balance),
        remaining = mist_to_sui(remaining),
        budget = mist_to_sui(vault.policy.max_budget),
        per_tx = mist_to_sui(vault.policy.max_per_tx),
        suggested = suggested_max_trade(vault),
        tx_count = vault.tx_count,
        allowed = vault.policy.allowed_labels().join(", "),
        pair = market.pair,
        mid = market.mid_price,
        source = market.source.as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketSnapshot, DEFAULT_PAIR};
    use crate::vault::fixtures::{sui, vault};

    #[test]
    fn test_strategy_is_trimmed_and_capped() {
        assert_eq!(system_prompt(None), BASE_SYSTEM_PROMPT);
        assert_eq!(system_prompt(Some("   ")), BASE_SYSTEM_PROMPT);

        let long = format!("  {}  ", "é".repeat(800));
        let prompt = system_prompt(Some(&long));
        assert!(prompt.contains("User Strategy Directive"));
        let directive = prompt.split("---\n").nth(1).unwrap().trim_end_matches("\n---");
        assert_eq!(directive.chars().count(), MAX_STRATEGY_CHARS);
    }

    #[test]
    fn test_suggested_trade_takes_smaller_bound() {
        let mut v = vault();
        // 30% of 10 SUI = 3 SUI, per-tx is 2
        assert!((suggested_max_trade(&v) - 2.0).abs() < 1e-9);

        v.total_spent = sui("9");
        // 30% of 1 SUI
        assert!((suggested_max_trade(&v) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_user_prompt_contents() {
        let v = vault();
        let market = MarketSnapshot::fallback(DEFAULT_PAIR, 1_700_000_000_000);
        let prompt = user_prompt(&v, &market, false);

        assert!(prompt.contains("- Balance: 20 SUI"));
        assert!(prompt.contains("- Remaining Budget: 10 SUI (of 10 total)"));
        assert!(prompt.contains("- Suggested Max Trade: 2.0000 SUI"));
        assert!(prompt.contains("Swap, Stable Mint, Stable Burn, Stable Claim"));
        assert!(prompt.contains("- Data Source: fallback"));
        assert!(prompt.contains("Not available on current network"));
        assert!(prompt.contains("- Policy Expires: 2033-05-18T03:33:20+00:00"));
    }
}
