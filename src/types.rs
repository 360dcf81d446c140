//! Shared types for the TRADECYCLE agent.
//!
//! Value types produced and consumed by the pipeline stages. The per-cycle
//! state record that carries them lives in [`crate::state`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

/// Candle interval for a trading cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// Interval string used by exchange REST APIs ("1m", "1h", ...).
    pub fn as_interval(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_interval())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" | "60m" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" | "d" | "daily" => Ok(Timeframe::D1),
            _ => Err(anyhow::anyhow!("Unknown timeframe: {s}")),
        }
    }
}

/// One OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// High minus low.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }
}

/// Candles fetched for one symbol/timeframe, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub fetched_at: DateTime<Utc>,
}

impl MarketData {
    pub fn last_close(&self) -> Option<Decimal> {
        self.candles.last().map(|c| c.close)
    }
}

/// Summary statistics over the fetched window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub last_close: Decimal,
    /// First open → last close, in percent.
    pub change_pct: f64,
    /// (highest high − lowest low) / last close, in percent.
    pub range_pct: f64,
    /// Mean high − low per bar.
    pub avg_bar_range: Decimal,
    pub avg_volume: Decimal,
    pub candle_count: usize,
}

impl fmt::Display for Indicators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "close={} change={:+.2}% range={:.2}% bars={}",
            self.last_close, self.change_pct, self.range_pct, self.candle_count,
        )
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Directional lean derived from historical patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "BULLISH"),
            Bias::Bearish => write!(f, "BEARISH"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Market regime label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Unknown,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketRegime::TrendingUp => write!(f, "Trending Up"),
            MarketRegime::TrendingDown => write!(f, "Trending Down"),
            MarketRegime::Ranging => write!(f, "Ranging"),
            MarketRegime::Volatile => write!(f, "Volatile"),
            MarketRegime::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// A historical snapshot that resembles the current market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub id: String,
    /// 0.0 (unrelated) – 1.0 (identical).
    pub similarity: f64,
    pub regime: MarketRegime,
    /// What price did after the snapshot was taken.
    pub outcome: Bias,
    pub recorded_at: DateTime<Utc>,
}

/// A candidate trade plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub name: String,
    pub direction: Direction,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// 0.0 – 1.0
    pub confidence: f64,
    pub rationale: String,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} entry={} sl={} tp={} conf={:.0}%",
            self.name,
            self.direction,
            self.entry,
            self.stop_loss,
            self.take_profit,
            self.confidence * 100.0,
        )
    }
}

impl Strategy {
    /// Distance between entry and stop.
    pub fn risk_per_unit(&self) -> Decimal {
        (self.entry - self.stop_loss).abs()
    }

    /// Distance between entry and target.
    pub fn reward_per_unit(&self) -> Decimal {
        (self.take_profit - self.entry).abs()
    }

    /// Whether stop and target sit on the correct sides of the entry.
    pub fn is_well_formed(&self) -> bool {
        match self.direction {
            Direction::Long => self.stop_loss < self.entry && self.take_profit > self.entry,
            Direction::Short => self.stop_loss > self.entry && self.take_profit < self.entry,
        }
    }
}

/// Outcome of the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub approved: bool,
    pub position_size: Decimal,
    pub reward_to_risk: f64,
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    /// A no-trade assessment.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            position_size: Decimal::ZERO,
            reward_to_risk: 0.0,
            reasons: vec![reason.into()],
        }
    }
}

impl fmt::Display for RiskAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.approved { "APPROVED" } else { "REJECTED" };
        write!(
            f,
            "{verdict} size={} r:r={:.2} ({})",
            self.position_size,
            self.reward_to_risk,
            self.reasons.join("; "),
        )
    }
}

/// What the execution stage did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub executed: bool,
    pub order_id: Option<String>,
    pub direction: Option<Direction>,
    pub size: Decimal,
    pub fill_price: Option<Decimal>,
    pub dry_run: bool,
    pub note: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Nothing was sent to a venue.
    pub fn not_executed(note: impl Into<String>) -> Self {
        Self {
            executed: false,
            order_id: None,
            direction: None,
            size: Decimal::ZERO,
            fill_price: None,
            dry_run: false,
            note: note.into(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle bookkeeping
// ---------------------------------------------------------------------------

/// The `currentStep` marker: last stage completed, skipped or substituted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "stage", rename_all = "snake_case")]
pub enum StepMarker {
    Initialized,
    Completed(String),
    Skipped(String),
    Fallback(String),
    BreakerOpen(String),
    UnknownFallback,
}

impl fmt::Display for StepMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepMarker::Initialized => write!(f, "INITIALIZED"),
            StepMarker::Completed(s) => write!(f, "{s}"),
            StepMarker::Skipped(s) => write!(f, "skipped:{s}"),
            StepMarker::Fallback(s) => write!(f, "fallback:{s}"),
            StepMarker::BreakerOpen(s) => write!(f, "breaker_open:{s}"),
            StepMarker::UnknownFallback => write!(f, "UNKNOWN_FALLBACK"),
        }
    }
}

/// Structured error log entry appended when a stage faults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorNote {
    pub stage: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorNote {
    pub fn new(stage: &str, message: impl Into<String>) -> Self {
        Self {
            stage: stage.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for ErrorNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why a stage call failed.
///
/// Only genuine failures belong here. Expected-but-degraded outcomes
/// (no data, no matches, rejected trade) are returned as ordinary values.
#[derive(Debug, thiserror::Error)]
pub enum StageFault {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Timed out after {after_secs}s: {operation}")]
    Timeout { operation: String, after_secs: u64 },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Stage panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
