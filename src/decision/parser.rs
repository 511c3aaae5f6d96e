//! Decision parser
//!
//! Accepts raw JSON or the first fenced code block (optionally language
//! tagged) and validates the result. No length cap is applied.

use super::Decision;
use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid fenced block regex")
});

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?$").expect("valid numeric regex"));

/// Parse free-form decision text into a validated [`Decision`].
pub fn parse_decision(text: &str) -> Result<Decision> {
    let json = extract_json(text)?;
    let decision: Decision = serde_json::from_str(json)
        .map_err(|e| Error::MalformedDecision(format!("invalid decision JSON: {}", e)))?;
    validate_decision(&decision)?;
    Ok(decision)
}

fn extract_json(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Ok(trimmed);
    }

    FENCED_BLOCK_RE
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .ok_or_else(|| {
            Error::MalformedDecision("no JSON object or fenced code block found".to_string())
        })
}

/// Check schema constraints serde cannot express.
pub fn validate_decision(decision: &Decision) -> Result<()> {
    if decision.reasoning.is_empty() {
        return Err(Error::MalformedDecision(
            "reasoning must not be empty".to_string(),
        ));
    }
    if !decision.confidence.is_finite() || !(0.0..=1.0).contains(&decision.confidence) {
        return Err(Error::MalformedDecision(format!(
            "confidence {} is outside [0, 1]",
            decision.confidence
        )));
    }

    if let Some(params) = &decision.params {
        check_numeric("amount", &params.amount)?;
        if let Some(min_out) = &params.min_out {
            check_numeric("minOut", min_out)?;
        }
        if let Some(slippage) = &params.slippage {
            check_numeric("slippage", slippage)?;
        }
    }
    Ok(())
}

fn check_numeric(field: &str, value: &str) -> Result<()> {
    if NUMERIC_RE.is_match(value) {
        Ok(())
    } else {
        Err(Error::MalformedDecision(format!(
            "{} must be a numeric string, got '{}'",
            field, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{DecisionAction, DecisionParams};
    use proptest::prelude::*;

    #[test]
    fn test_raw_json() {
        let d = parse_decision(
            r#"  {"action":"swap_sui_to_usdc","reasoning":"r","confidence":0.8,"params":{"amount":"0.5"}}  "#,
        )
        .unwrap();
        assert_eq!(d.action, DecisionAction::SwapSuiToUsdc);
        assert_eq!(d.amount(), Some("0.5"));
    }

    #[test]
    fn test_fenced_json_block() {
        let text = "Here is my call:\n```json\n{\"action\":\"hold\",\"reasoning\":\"quiet\",\"confidence\":0.9}\n```\nThanks";
        assert_eq!(parse_decision(text).unwrap().action, DecisionAction::Hold);
    }

    #[test]
    fn test_untagged_fence_and_first_block_wins() {
        let text = "```\n{\"action\":\"stable_claim\",\"reasoning\":\"y\",\"confidence\":1}\n```\n```json\n{\"action\":\"hold\",\"reasoning\":\"n\",\"confidence\":1}\n```";
        assert_eq!(
            parse_decision(text).unwrap().action,
            DecisionAction::StableClaim
        );
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = parse_decision("I think we should hold.").unwrap_err();
        assert!(matches!(err, Error::MalformedDecision(_)));
    }

    #[test]
    fn test_schema_violations() {
        let cases = [
            r#"{"action":"buy_everything","reasoning":"r","confidence":0.5}"#,
            r#"{"action":"hold","reasoning":"","confidence":0.5}"#,
            r#"{"action":"hold","reasoning":"r","confidence":1.01}"#,
            r#"{"action":"hold","reasoning":"r","confidence":-0.1}"#,
            r#"{"action":"hold","reasoning":"r"}"#,
            r#"{"action":"swap_sui_to_usdc","reasoning":"r","confidence":0.9,"params":{"amount":"-1"}}"#,
            r#"{"action":"swap_sui_to_usdc","reasoning":"r","confidence":0.9,"params":{"amount":"1e9"}}"#,
            r#"{"action":"swap_sui_to_usdc","reasoning":"r","confidence":0.9,"params":{"amount":"1","minOut":"abc"}}"#,
            r#"{"action":"swap_sui_to_usdc","reasoning":"r","confidence":0.9,"params":{"amount":"1","slippage":".5"}}"#,
            r#"{"action":"swap_sui_to_usdc","reasoning":"r","confidence":0.9,"params":{}}"#,
        ];
        for case in cases {
            assert!(
                matches!(parse_decision(case), Err(Error::MalformedDecision(_))),
                "accepted {}",
                case
            );
        }
    }

    #[test]
    fn test_large_and_non_ascii_reasoning() {
        let reasoning = "流動性が高い ✓ ".repeat(4_000);
        let decision = Decision {
            action: DecisionAction::Hold,
            reasoning: reasoning.clone(),
            confidence: 0.7,
            params: None,
        };
        let text = format!("```json\n{}\n```", serde_json::to_string(&decision).unwrap());
        assert!(text.len() > 40_000);
        assert_eq!(parse_decision(&text).unwrap().reasoning, reasoning);
    }

    fn numeric() -> impl Strategy<Value = String> {
        ("[0-9]{1,12}", proptest::option::of("[0-9]{1,9}")).prop_map(|(whole, frac)| match frac {
            Some(f) => format!("{}.{}", whole, f),
            None => whole,
        })
    }

    fn decision() -> impl Strategy<Value = Decision> {
        let action = proptest::sample::select(DecisionAction::ALL.to_vec());
        let confidence = prop_oneof![Just(0.0), Just(1.0), 0.0f64..=1.0];
        let params = proptest::option::of(
            (
                numeric(),
                proptest::option::of(numeric()),
                proptest::option::of(numeric()),
            )
                .prop_map(|(amount, min_out, slippage)| DecisionParams {
                    amount,
                    min_out,
                    slippage,
                }),
        );
        (action, "[^`]{1,64}", confidence, params).prop_map(
            |(action, reasoning, confidence, params)| Decision {
                action,
                reasoning,
                confidence,
                params,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_serialize_then_parse_is_identity(d in decision()) {
            let raw = serde_json::to_string(&d).unwrap();
            prop_assert_eq!(parse_decision(&raw).unwrap(), d.clone());

            let fenced = format!("```json\n{}\n```", serde_json::to_string_pretty(&d).unwrap());
            prop_assert_eq!(parse_decision(&fenced).unwrap(), d);
        }
    }
}
