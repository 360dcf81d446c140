//! Pattern recall stage.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use super::with_timeout;
use crate::engine::{Stage, StageKind};
use crate::memory::{aggregate_bias, PatternMemory, PatternQuery};
use crate::state::{StateUpdate, TradingState};
use crate::types::{Bias, StageFault};

#[derive(Debug, Clone)]
pub struct PatternRecallConfig {
    pub max_matches: usize,
    pub min_similarity: f64,
    /// Fewer candles than this is "insufficient history".
    pub min_candles: usize,
    pub timeout_secs: u64,
}

impl Default for PatternRecallConfig {
    fn default() -> Self {
        Self {
            max_matches: 10,
            min_similarity: 0.2,
            min_candles: 20,
            timeout_secs: 5,
        }
    }
}

pub struct PatternRecallStage {
    memory: Arc<dyn PatternMemory>,
    config: PatternRecallConfig,
}

impl PatternRecallStage {
    pub fn new(memory: Arc<dyn PatternMemory>, config: PatternRecallConfig) -> Self {
        Self { memory, config }
    }

    fn insufficient(reason: String) -> StateUpdate {
        StateUpdate {
            pattern_matches: Some(Vec::new()),
            bias: Some(Bias::Neutral),
            ..Default::default()
        }
        .note(reason)
    }
}

#[async_trait]
impl Stage for PatternRecallStage {
    fn name(&self) -> &'static str {
        StageKind::PatternRecall.as_str()
    }

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault> {
        let Some(ind) = state.indicators.as_ref() else {
            return Ok(Self::insufficient(
                "insufficient history for pattern recall: no indicators".to_string(),
            ));
        };
        if ind.candle_count < self.config.min_candles {
            return Ok(Self::insufficient(format!(
                "insufficient history for pattern recall: {} of {} candles",
                ind.candle_count, self.config.min_candles
            )));
        }

        let query = PatternQuery {
            symbol: state.symbol.clone(),
            timeframe: state.timeframe,
            change_pct: ind.change_pct,
            range_pct: ind.range_pct,
            min_similarity: self.config.min_similarity,
        };
        let matches = with_timeout(
            "recall patterns",
            self.config.timeout_secs,
            self.memory.recall(&query, self.config.max_matches),
        )
        .await?;

        let bias = aggregate_bias(&matches);
        let mut update = StateUpdate {
            bias: Some(bias),
            ..Default::default()
        };
        if matches.is_empty() {
            debug!(symbol = %state.symbol, "No similar patterns on record");
            update = update.note("no similar patterns on record");
        } else {
            info!(
                symbol = %state.symbol,
                matches = matches.len(),
                top_similarity = format!("{:.2}", matches[0].similarity),
                bias = %bias,
                "Patterns recalled"
            );
        }
        update.pattern_matches = Some(matches);
        Ok(update)
    }
}
