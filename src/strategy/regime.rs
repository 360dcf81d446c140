//! Regime classification.
//!
//! Labels the market from the window summary: a wide range means volatile,
//! otherwise a large net move means trending, otherwise ranging.

use crate::types::{Indicators, MarketRegime};

#[derive(Debug, Clone)]
pub struct RegimeConfig {
    /// Net change (percent) beyond which the market is trending.
    pub trend_threshold_pct: f64,
    /// Window range (percent of close) beyond which the market is volatile.
    pub volatile_range_pct: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            trend_threshold_pct: 1.5,
            volatile_range_pct: 8.0,
        }
    }
}

pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, indicators: Option<&Indicators>) -> MarketRegime {
        let Some(ind) = indicators else {
            return MarketRegime::Unknown;
        };
        if ind.candle_count < 2 {
            return MarketRegime::Unknown;
        }

        if ind.range_pct >= self.config.volatile_range_pct {
            MarketRegime::Volatile
        } else if ind.change_pct >= self.config.trend_threshold_pct {
            MarketRegime::TrendingUp
        } else if ind.change_pct <= -self.config.trend_threshold_pct {
            MarketRegime::TrendingDown
        } else {
            MarketRegime::Ranging
        }
    }
}
