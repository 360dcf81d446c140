//! LLM-backed strategy synthesis.
//!
//! Shared prompt rendering and response parsing; the transport lives in
//! the provider modules.

pub mod openrouter;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde::Deserialize;
use std::fmt::Write as _;
use tracing::debug;

use crate::strategy::StrategyContext;
use crate::types::{Direction, Strategy};

pub const SYSTEM_PROMPT: &str = "You are a disciplined trading strategist. \
Given a market summary, propose at most three bracket trades as a JSON array. \
Each element: {\"name\": str, \"direction\": \"long\"|\"short\", \"entry\": number, \
\"stop_loss\": number, \"take_profit\": number, \"confidence\": number 0-1, \
\"rationale\": str}. Reply with [] when nothing is worth trading. \
Reply with the JSON array only.";

/// Render the market summary sent as the user message.
pub fn build_prompt(ctx: &StrategyContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Symbol: {} ({})", ctx.symbol, ctx.timeframe);
    match &ctx.indicators {
        Some(ind) => {
            let _ = writeln!(out, "Last close: {}", ind.last_close);
            let _ = writeln!(out, "Window change: {:+.2}%", ind.change_pct);
            let _ = writeln!(out, "Window range: {:.2}%", ind.range_pct);
            let _ = writeln!(out, "Average bar range: {}", ind.avg_bar_range);
        }
        None => {
            let _ = writeln!(out, "No market data available.");
        }
    }
    let _ = writeln!(out, "Regime: {}", ctx.regime);
    let _ = writeln!(out, "Historical pattern bias: {}", ctx.bias);
    for p in ctx.patterns.iter().take(5) {
        let _ = writeln!(
            out,
            "- similar setup ({:.0}% match, regime {}) was followed by {}",
            p.similarity * 100.0,
            p.regime,
            p.outcome
        );
    }
    out
}

#[derive(Debug, Deserialize)]
struct RawStrategy {
    #[serde(default)]
    name: String,
    direction: String,
    entry: f64,
    stop_loss: f64,
    take_profit: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    rationale: String,
}

/// Pull the JSON strategy array out of a model reply.
///
/// Errors only when no array can be parsed at all; individual entries that
/// are malformed are dropped.
pub fn parse_strategies(text: &str) -> Result<Vec<Strategy>> {
    let start = text.find('[').context("No JSON array in LLM response")?;
    let end = text.rfind(']').context("Unterminated JSON array in LLM response")?;
    if end < start {
        anyhow::bail!("Malformed JSON array in LLM response");
    }

    let raw: Vec<serde_json::Value> = serde_json::from_str(&text[start..=end])
        .context("Failed to parse strategy array")?;

    let strategies = raw
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<RawStrategy>(v) {
            Ok(r) => convert(r),
            Err(e) => {
                debug!(error = %e, "Dropping unparseable strategy entry");
                None
            }
        })
        .collect();
    Ok(strategies)
}

fn convert(raw: RawStrategy) -> Option<Strategy> {
    let direction = match raw.direction.to_lowercase().as_str() {
        "long" | "buy" => Direction::Long,
        "short" | "sell" => Direction::Short,
        _ => return None,
    };
    let entry = Decimal::from_f64(raw.entry)?;
    let stop_loss = Decimal::from_f64(raw.stop_loss)?;
    let take_profit = Decimal::from_f64(raw.take_profit)?;
    if entry <= Decimal::ZERO {
        return None;
    }
    Some(Strategy {
        name: if raw.name.is_empty() {
            format!("llm-{}", direction.to_string().to_lowercase())
        } else {
            raw.name
        },
        direction,
        entry,
        stop_loss,
        take_profit,
        confidence: raw.confidence.clamp(0.0, 1.0),
        rationale: raw.rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TradingState;
    use crate::types::Timeframe;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_fenced_array() {
        let text = "Here you go:\n```json\n[{\"name\":\"pullback\",\"direction\":\"long\",\
                    \"entry\":100.5,\"stop_loss\":98,\"take_profit\":106,\"confidence\":0.7,\
                    \"rationale\":\"trend\"}]\n```";
        let s = parse_strategies(text).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].name, "pullback");
        assert_eq!(s[0].direction, Direction::Long);
        assert_eq!(s[0].entry, dec!(100.5));
        assert_eq!(s[0].stop_loss, dec!(98));
    }

    #[test]
    fn test_parse_empty_array_is_valid() {
        assert!(parse_strategies("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_no_array_is_error() {
        assert!(parse_strategies("I would not trade today.").is_err());
    }

    #[test]
    fn test_parse_drops_bad_entries_and_clamps() {
        let text = r#"[
            {"direction": "sideways", "entry": 1, "stop_loss": 1, "take_profit": 1},
            {"direction": "SELL", "entry": 50, "stop_loss": 52, "take_profit": 45, "confidence": 1.7}
        ]"#;
        let s = parse_strategies(text).unwrap();
        assert_eq!(s.len(), 1);
        assert_eq!(s[0].direction, Direction::Short);
        assert_eq!(s[0].name, "llm-short");
        assert_eq!(s[0].confidence, 1.0);
    }

    #[test]
    fn test_prompt_mentions_missing_data() {
        let ctx = StrategyContext::from_state(&TradingState::new("ETHUSDT", Timeframe::H4));
        let p = build_prompt(&ctx);
        assert!(p.contains("ETHUSDT (4h)"));
        assert!(p.contains("No market data available."));
        assert!(p.contains("Regime: Unknown"));
    }
}
