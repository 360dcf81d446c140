//! Strategy engine: regime classification, strategy synthesis and risk
//! gating.

pub mod regime;
pub mod risk;
pub mod rules;

use anyhow::Result;
use async_trait::async_trait;

use crate::state::TradingState;
use crate::types::{Bias, Indicators, MarketRegime, PatternMatch, Strategy, Timeframe};

/// What a strategy advisor gets to see.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub indicators: Option<Indicators>,
    pub regime: MarketRegime,
    pub bias: Bias,
    pub patterns: Vec<PatternMatch>,
}

impl StrategyContext {
    /// Read the upstream fields, substituting neutral values for any that
    /// are missing.
    pub fn from_state(state: &TradingState) -> Self {
        Self {
            symbol: state.symbol.clone(),
            timeframe: state.timeframe,
            indicators: state.indicators.clone(),
            regime: state.regime.unwrap_or(MarketRegime::Unknown),
            bias: state.bias.unwrap_or(Bias::Neutral),
            patterns: state.pattern_matches.clone().unwrap_or_default(),
        }
    }

    /// Mean similarity of patterns whose outcome agrees with `bias`.
    pub fn agreeing_similarity(&self, bias: Bias) -> f64 {
        let agreeing: Vec<f64> = self
            .patterns
            .iter()
            .filter(|p| p.outcome == bias)
            .map(|p| p.similarity)
            .collect();
        if agreeing.is_empty() {
            0.0
        } else {
            agreeing.iter().sum::<f64>() / agreeing.len() as f64
        }
    }
}

/// Abstraction over strategy proposers (rules engine, LLM, ...).
///
/// An empty proposal list is a valid answer ("nothing worth trading").
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StrategyAdvisor: Send + Sync {
    async fn propose(&self, ctx: &StrategyContext) -> Result<Vec<Strategy>>;

    /// Advisor identifier for logging.
    fn name(&self) -> &'static str;
}

/// Highest-confidence proposal, if any.
pub fn select_best(strategies: &[Strategy]) -> Option<Strategy> {
    strategies
        .iter()
        .max_by(|a, b| {
            a.confidence
                .partial_cmp(&b.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned()
}
