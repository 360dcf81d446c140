//! Market data stage: fetch candles and summarise the window.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use super::with_timeout;
use crate::data::MarketDataSource;
use crate::engine::{Stage, StageKind};
use crate::state::{StateUpdate, TradingState};
use crate::types::{Candle, Indicators, MarketData, StageFault};

pub struct MarketDataStage {
    source: Arc<dyn MarketDataSource>,
    candle_limit: u32,
    timeout_secs: u64,
}

impl MarketDataStage {
    pub fn new(source: Arc<dyn MarketDataSource>, candle_limit: u32, timeout_secs: u64) -> Self {
        Self {
            source,
            candle_limit,
            timeout_secs,
        }
    }
}

/// Window summary. `None` below two candles or with a non-positive price.
pub fn compute_indicators(candles: &[Candle]) -> Option<Indicators> {
    if candles.len() < 2 {
        return None;
    }
    let first = candles.first()?;
    let last = candles.last()?;
    if first.open <= Decimal::ZERO || last.close <= Decimal::ZERO {
        return None;
    }

    let high = candles.iter().map(|c| c.high).max()?;
    let low = candles.iter().map(|c| c.low).min()?;
    let n = Decimal::from(candles.len());
    let hundred = Decimal::ONE_HUNDRED;

    let change_pct = ((last.close - first.open) / first.open * hundred)
        .to_f64()
        .unwrap_or(0.0);
    let range_pct = ((high - low) / last.close * hundred).to_f64().unwrap_or(0.0);

    Some(Indicators {
        last_close: last.close,
        change_pct,
        range_pct,
        avg_bar_range: candles.iter().map(Candle::range).sum::<Decimal>() / n,
        avg_volume: candles.iter().map(|c| c.volume).sum::<Decimal>() / n,
        candle_count: candles.len(),
    })
}

#[async_trait]
impl Stage for MarketDataStage {
    fn name(&self) -> &'static str {
        StageKind::MarketData.as_str()
    }

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault> {
        let candles = with_timeout(
            "fetch candles",
            self.timeout_secs,
            self.source
                .fetch_candles(&state.symbol, state.timeframe, self.candle_limit),
        )
        .await?;

        let indicators = compute_indicators(&candles);
        let count = candles.len();
        let data = MarketData {
            symbol: state.symbol.clone(),
            timeframe: state.timeframe,
            candles,
            fetched_at: Utc::now(),
        };

        let mut update = StateUpdate {
            market_data: Some(data),
            ..Default::default()
        };
        match indicators {
            Some(ind) => {
                info!(
                    symbol = %state.symbol,
                    source = self.source.name(),
                    indicators = %ind,
                    "Market data fetched"
                );
                update.indicators = Some(ind);
            }
            None => {
                debug!(symbol = %state.symbol, candles = count, "Too few candles for indicators");
                update = update.note(format!(
                    "{count} candle(s) from {}; not enough for indicators",
                    self.source.name()
                ));
            }
        }
        Ok(update)
    }
}
