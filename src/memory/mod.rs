//! Pattern memory.
//!
//! Stores a compact snapshot of every finished cycle and recalls the past
//! snapshots that most resemble the current market. A snapshot's outcome
//! (what price did next) is only known once the following snapshot for the
//! same symbol/timeframe arrives, so only resolved snapshots are recalled.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::state::TradingState;
use crate::types::{Bias, MarketRegime, PatternMatch, Timeframe};

/// Close-to-close move (in percent) below which an outcome counts as flat.
const FLAT_BAND_PCT: f64 = 0.1;

/// Net weighted vote needed before patterns express a directional bias.
const BIAS_CONVICTION: f64 = 0.25;

// ---------------------------------------------------------------------------
// Snapshots & queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PatternSnapshot {
    pub id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub regime: MarketRegime,
    pub change_pct: f64,
    pub range_pct: f64,
    pub close: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl PatternSnapshot {
    /// Snapshot a finished cycle. `None` if the cycle never got indicators.
    pub fn from_state(state: &TradingState) -> Option<Self> {
        let ind = state.indicators.as_ref()?;
        Some(Self {
            id: state.cycle_id.to_string(),
            symbol: state.symbol.clone(),
            timeframe: state.timeframe,
            regime: state.regime.unwrap_or(MarketRegime::Unknown),
            change_pct: ind.change_pct,
            range_pct: ind.range_pct,
            close: ind.last_close,
            recorded_at: state.started_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternQuery {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub change_pct: f64,
    pub range_pct: f64,
    pub min_similarity: f64,
}

/// Abstraction over the historical pattern store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatternMemory: Send + Sync {
    /// Most similar resolved snapshots, best first, at most `limit`.
    async fn recall(&self, query: &PatternQuery, limit: usize) -> Result<Vec<PatternMatch>>;

    async fn record(&self, snapshot: PatternSnapshot) -> Result<()>;
}

/// Similarity-weighted vote over the matched outcomes.
pub fn aggregate_bias(matches: &[PatternMatch]) -> Bias {
    let total: f64 = matches.iter().map(|m| m.similarity).sum();
    if total <= 0.0 {
        return Bias::Neutral;
    }
    let net: f64 = matches
        .iter()
        .map(|m| match m.outcome {
            Bias::Bullish => m.similarity,
            Bias::Bearish => -m.similarity,
            Bias::Neutral => 0.0,
        })
        .sum::<f64>()
        / total;

    if net > BIAS_CONVICTION {
        Bias::Bullish
    } else if net < -BIAS_CONVICTION {
        Bias::Bearish
    } else {
        Bias::Neutral
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredSnapshot {
    snapshot: PatternSnapshot,
    outcome: Option<Bias>,
}

/// Process-local pattern store, bounded per symbol/timeframe.
pub struct InMemoryPatternMemory {
    entries: RwLock<HashMap<(String, Timeframe), Vec<StoredSnapshot>>>,
    capacity: usize,
}

impl InMemoryPatternMemory {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(2),
        }
    }

    fn similarity(query: &PatternQuery, s: &PatternSnapshot) -> f64 {
        let distance =
            (query.change_pct - s.change_pct).abs() + 0.5 * (query.range_pct - s.range_pct).abs();
        1.0 / (1.0 + distance)
    }

    fn outcome(from: Decimal, to: Decimal) -> Bias {
        if from.is_zero() {
            return Bias::Neutral;
        }
        let move_pct = ((to - from) / from * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0);
        if move_pct > FLAT_BAND_PCT {
            Bias::Bullish
        } else if move_pct < -FLAT_BAND_PCT {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }
}

#[async_trait]
impl PatternMemory for InMemoryPatternMemory {
    async fn recall(&self, query: &PatternQuery, limit: usize) -> Result<Vec<PatternMatch>> {
        let entries = self.entries.read().await;
        let Some(history) = entries.get(&(query.symbol.clone(), query.timeframe)) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<PatternMatch> = history
            .iter()
            .filter_map(|stored| {
                let outcome = stored.outcome?;
                let similarity = Self::similarity(query, &stored.snapshot);
                (similarity >= query.min_similarity).then(|| PatternMatch {
                    id: stored.snapshot.id.clone(),
                    similarity,
                    regime: stored.snapshot.regime,
                    outcome,
                    recorded_at: stored.snapshot.recorded_at,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn record(&self, snapshot: PatternSnapshot) -> Result<()> {
        let mut entries = self.entries.write().await;
        let history = entries
            .entry((snapshot.symbol.clone(), snapshot.timeframe))
            .or_default();

        if let Some(prev) = history.last_mut() {
            prev.outcome = Some(Self::outcome(prev.snapshot.close, snapshot.close));
        }

        debug!(
            symbol = %snapshot.symbol,
            regime = %snapshot.regime,
            stored = history.len() + 1,
            "Pattern snapshot recorded"
        );
        history.push(StoredSnapshot {
            snapshot,
            outcome: None,
        });

        if history.len() > self.capacity {
            let excess = history.len() - self.capacity;
            history.drain(..excess);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
