//! Rule-based strategy advisor.
//!
//! Turns pattern bias and regime into a single bracket order around the last
//! close. Used when no LLM is configured, and as the deterministic baseline.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use tracing::debug;

use super::{StrategyAdvisor, StrategyContext};
use crate::types::{Bias, Direction, MarketRegime, Strategy};

#[derive(Debug, Clone)]
pub struct RulesConfig {
    /// Stop distance in average bar ranges.
    pub stop_multiple: Decimal,
    /// Target distance in average bar ranges.
    pub target_multiple: Decimal,
    /// Confidence before pattern / regime agreement is added.
    pub base_confidence: f64,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            stop_multiple: Decimal::new(15, 1),  // 1.5
            target_multiple: Decimal::new(30, 1), // 3.0
            base_confidence: 0.45,
        }
    }
}

pub struct RuleBasedAdvisor {
    config: RulesConfig,
}

impl RuleBasedAdvisor {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Direction to trade, and whether the regime agrees with it.
    fn direction(bias: Bias, regime: MarketRegime) -> Option<(Direction, bool)> {
        match (bias, regime) {
            (_, MarketRegime::Volatile) => None,
            (Bias::Bullish, r) => Some((Direction::Long, r == MarketRegime::TrendingUp)),
            (Bias::Bearish, r) => Some((Direction::Short, r == MarketRegime::TrendingDown)),
            (Bias::Neutral, MarketRegime::TrendingUp) => Some((Direction::Long, true)),
            (Bias::Neutral, MarketRegime::TrendingDown) => Some((Direction::Short, true)),
            (Bias::Neutral, _) => None,
        }
    }
}

#[async_trait]
impl StrategyAdvisor for RuleBasedAdvisor {
    async fn propose(&self, ctx: &StrategyContext) -> Result<Vec<Strategy>> {
        let Some(ind) = ctx.indicators.as_ref() else {
            debug!(symbol = %ctx.symbol, "No indicators — no rule-based proposal");
            return Ok(Vec::new());
        };
        if ind.avg_bar_range <= Decimal::ZERO || ind.last_close <= Decimal::ZERO {
            return Ok(Vec::new());
        }
        let Some((direction, regime_agrees)) = Self::direction(ctx.bias, ctx.regime) else {
            return Ok(Vec::new());
        };

        let entry = ind.last_close;
        let stop_dist = ind.avg_bar_range * self.config.stop_multiple;
        let target_dist = ind.avg_bar_range * self.config.target_multiple;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (entry - stop_dist, entry + target_dist),
            Direction::Short => (entry + stop_dist, entry - target_dist),
        };
        if stop_loss <= Decimal::ZERO || take_profit <= Decimal::ZERO {
            return Ok(Vec::new());
        }

        let pattern_bias = match direction {
            Direction::Long => Bias::Bullish,
            Direction::Short => Bias::Bearish,
        };
        let mut confidence =
            self.config.base_confidence + 0.3 * ctx.agreeing_similarity(pattern_bias);
        if regime_agrees {
            confidence += 0.1;
        }

        let rr = (target_dist / stop_dist).to_f64().unwrap_or(0.0);
        Ok(vec![Strategy {
            name: format!("rules-{}", direction.to_string().to_lowercase()),
            direction,
            entry,
            stop_loss,
            take_profit,
            confidence: confidence.clamp(0.0, 0.95),
            rationale: format!(
                "bias={} regime={} patterns={} r:r={rr:.1}",
                ctx.bias,
                ctx.regime,
                ctx.patterns.len(),
            ),
        }])
    }

    fn name(&self) -> &'static str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Indicators, Timeframe};
    use rust_decimal_macros::dec;

    fn ctx(bias: Bias, regime: MarketRegime) -> StrategyContext {
        StrategyContext {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::H1,
            indicators: Some(Indicators {
                last_close: dec!(100),
                change_pct: 2.0,
                range_pct: 4.0,
                avg_bar_range: dec!(2),
                avg_volume: dec!(10),
                candle_count: 50,
            }),
            regime,
            bias,
            patterns: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_bullish_trend_goes_long() {
        let adv = RuleBasedAdvisor::new(RulesConfig::default());
        let out = adv.propose(&ctx(Bias::Bullish, MarketRegime::TrendingUp)).await.unwrap();
        assert_eq!(out.len(), 1);
        let s = &out[0];
        assert_eq!(s.direction, Direction::Long);
        assert_eq!(s.stop_loss, dec!(97));
        assert_eq!(s.take_profit, dec!(106));
        assert!(s.is_well_formed());
        assert!((s.confidence - 0.55).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_bearish_goes_short() {
        let adv = RuleBasedAdvisor::new(RulesConfig::default());
        let out = adv.propose(&ctx(Bias::Bearish, MarketRegime::Ranging)).await.unwrap();
        assert_eq!(out[0].direction, Direction::Short);
        assert!(out[0].is_well_formed());
    }

    #[tokio::test]
    async fn test_volatile_or_flat_proposes_nothing() {
        let adv = RuleBasedAdvisor::new(RulesConfig::default());
        assert!(adv.propose(&ctx(Bias::Bullish, MarketRegime::Volatile)).await.unwrap().is_empty());
        assert!(adv.propose(&ctx(Bias::Neutral, MarketRegime::Ranging)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_indicators_is_empty_not_error() {
        let adv = RuleBasedAdvisor::new(RulesConfig::default());
        let mut c = ctx(Bias::Bullish, MarketRegime::TrendingUp);
        c.indicators = None;
        assert!(adv.propose(&c).await.unwrap().is_empty());
    }
}
