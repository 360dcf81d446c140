//! Binance spot klines.
//!
//! API: `GET {base}/api/v3/klines?symbol=BTCUSDT&interval=1h&limit=100`
//! Auth: none (public market data).
//! Rate limit: request weight 2 per call, 6000 weight/min.
//!
//! Each kline is a heterogeneous JSON array:
//! `[open_time_ms, "open", "high", "low", "close", "volume", close_time_ms, ...]`

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::debug;

use super::MarketDataSource;
use crate::types::{Candle, Timeframe};

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";

/// Binance caps a single klines request at 1000 bars.
const MAX_LIMIT: u32 = 1000;

pub struct BinanceClient {
    http: Client,
    base_url: String,
}

impl BinanceClient {
    pub fn new(base_url: Option<String>, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("TRADECYCLE/0.1.0")
            .build()
            .context("Failed to build Binance HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Parse the raw klines payload into candles.
    fn parse_klines(body: &Value) -> Result<Vec<Candle>> {
        let rows = body
            .as_array()
            .context("Klines response is not an array")?;

        rows.iter()
            .enumerate()
            .map(|(i, row)| Self::parse_row(row).with_context(|| format!("Bad kline at index {i}")))
            .collect()
    }

    fn parse_row(row: &Value) -> Result<Candle> {
        let fields = row.as_array().context("Kline is not an array")?;
        if fields.len() < 6 {
            anyhow::bail!("Kline has {} fields, expected at least 6", fields.len());
        }

        let open_ms = fields[0].as_i64().context("open_time is not an integer")?;
        let open_time = DateTime::<Utc>::from_timestamp_millis(open_ms)
            .context("open_time out of range")?;

        let dec = |idx: usize, field: &str| -> Result<Decimal> {
            let raw = fields[idx]
                .as_str()
                .with_context(|| format!("{field} is not a string"))?;
            Decimal::from_str(raw).with_context(|| format!("{field} is not a decimal: {raw}"))
        };

        Ok(Candle {
            open_time,
            open: dec(1, "open")?,
            high: dec(2, "high")?,
            low: dec(3, "low")?,
            close: dec(4, "close")?,
            volume: dec(5, "volume")?,
        })
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let limit = limit.clamp(1, MAX_LIMIT).to_string();

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", timeframe.as_interval()),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("Binance klines request failed for {symbol}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error for {symbol}: {status} {text}");
        }

        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Binance response for {symbol}"))?;

        let candles = Self::parse_klines(&body)?;
        debug!(symbol, timeframe = %timeframe, count = candles.len(), "Klines fetched");
        Ok(candles)
    }

    fn name(&self) -> &'static str {
        "binance"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
