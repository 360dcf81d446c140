//! Market data providers.
//!
//! Defines the `MarketDataSource` trait and the exchange-backed
//! implementations that feed the market-data stage.

pub mod binance;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{Candle, Timeframe};

/// Abstraction over candle feeds.
///
/// Implementors return bars oldest-first. An unknown or quiet symbol may
/// legitimately return an empty list; that is not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}
