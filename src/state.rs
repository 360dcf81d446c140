//! Per-cycle state record and the partial updates merged into it.
//!
//! A [`TradingState`] is built from (symbol, timeframe), moved through the
//! orchestrator and returned at cycle end. Stages never mutate it directly:
//! they return a [`StateUpdate`] which is merged with [`TradingState::apply`].
//!
//! Merge policy: `Some` scalars overwrite, `None` leaves the field alone,
//! log vectors are appended to. Nothing a stage did not mention is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{
    Bias, ErrorNote, ExecutionResult, Indicators, MarketData, MarketRegime, PatternMatch,
    RiskAssessment, StepMarker, Strategy, Timeframe,
};

// ---------------------------------------------------------------------------
// State record
// ---------------------------------------------------------------------------

/// Everything known about one in-flight trading cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingState {
    pub cycle_id: Uuid,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub started_at: DateTime<Utc>,
    pub market_data: Option<MarketData>,
    pub indicators: Option<Indicators>,
    /// Diagnostic notes, append-only.
    pub notes: Vec<String>,
    /// Stage faults, append-only.
    pub errors: Vec<ErrorNote>,
    pub current_step: StepMarker,
    pub pattern_matches: Option<Vec<PatternMatch>>,
    pub bias: Option<Bias>,
    pub regime: Option<MarketRegime>,
    pub strategies: Option<Vec<Strategy>>,
    pub selected_strategy: Option<Strategy>,
    pub risk: Option<RiskAssessment>,
    pub execution: Option<ExecutionResult>,
    /// Set once the circuit breaker forces the rest of the cycle to no-trade.
    pub trading_halted: bool,
}

impl TradingState {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            symbol: symbol.into(),
            timeframe,
            started_at: Utc::now(),
            market_data: None,
            indicators: None,
            notes: Vec::new(),
            errors: Vec::new(),
            current_step: StepMarker::Initialized,
            pattern_matches: None,
            bias: None,
            regime: None,
            strategies: None,
            selected_strategy: None,
            risk: None,
            execution: None,
            trading_halted: false,
        }
    }

    /// Pre-populate market data (the market-data stage is then skipped).
    pub fn with_market_data(mut self, data: MarketData, indicators: Option<Indicators>) -> Self {
        self.market_data = Some(data);
        self.indicators = indicators;
        self
    }

    /// Merge a stage's partial output into this state.
    pub fn apply(&mut self, update: StateUpdate) {
        let StateUpdate {
            market_data,
            indicators,
            notes,
            errors,
            current_step,
            pattern_matches,
            bias,
            regime,
            strategies,
            selected_strategy,
            risk,
            execution,
            trading_halted,
        } = update;

        if let Some(v) = market_data {
            self.market_data = Some(v);
        }
        if let Some(v) = indicators {
            self.indicators = Some(v);
        }
        self.notes.extend(notes);
        self.errors.extend(errors);
        if let Some(v) = current_step {
            self.current_step = v;
        }
        if let Some(v) = pattern_matches {
            self.pattern_matches = Some(v);
        }
        if let Some(v) = bias {
            self.bias = Some(v);
        }
        if let Some(v) = regime {
            self.regime = Some(v);
        }
        if let Some(v) = strategies {
            self.strategies = Some(v);
        }
        if let Some(v) = selected_strategy {
            self.selected_strategy = Some(v);
        }
        if let Some(v) = risk {
            self.risk = Some(v);
        }
        if let Some(v) = execution {
            self.execution = Some(v);
        }
        if let Some(v) = trading_halted {
            self.trading_halted = v;
        }
    }

    /// Risk was assessed and approved.
    pub fn risk_approved(&self) -> bool {
        self.risk.as_ref().is_some_and(|r| r.approved)
    }

    /// Whether an order actually went out this cycle.
    pub fn traded(&self) -> bool {
        self.execution.as_ref().is_some_and(|e| e.executed)
    }
}

impl fmt::Display for TradingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} step={} regime={} bias={} strategy={} traded={} errors={}",
            self.symbol,
            self.timeframe,
            self.current_step,
            self.regime.map(|r| r.to_string()).unwrap_or_else(|| "-".into()),
            self.bias.map(|b| b.to_string()).unwrap_or_else(|| "-".into()),
            self.selected_strategy
                .as_ref()
                .map(|s| s.name.as_str())
                .unwrap_or("-"),
            self.traded(),
            self.errors.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Partial update
// ---------------------------------------------------------------------------

/// A stage's partial contribution to the state record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub market_data: Option<MarketData>,
    pub indicators: Option<Indicators>,
    pub notes: Vec<String>,
    pub errors: Vec<ErrorNote>,
    pub current_step: Option<StepMarker>,
    pub pattern_matches: Option<Vec<PatternMatch>>,
    pub bias: Option<Bias>,
    pub regime: Option<MarketRegime>,
    pub strategies: Option<Vec<Strategy>>,
    pub selected_strategy: Option<Strategy>,
    pub risk: Option<RiskAssessment>,
    pub execution: Option<ExecutionResult>,
    pub trading_halted: Option<bool>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn error(mut self, error: ErrorNote) -> Self {
        self.errors.push(error);
        self
    }

    pub fn step(mut self, marker: StepMarker) -> Self {
        self.current_step = Some(marker);
        self
    }

    /// Fold `other` on top of `self` with the same policy as [`TradingState::apply`].
    pub fn merge(mut self, other: StateUpdate) -> Self {
        self.notes.extend(other.notes);
        self.errors.extend(other.errors);
        Self {
            market_data: other.market_data.or(self.market_data),
            indicators: other.indicators.or(self.indicators),
            notes: self.notes,
            errors: self.errors,
            current_step: other.current_step.or(self.current_step),
            pattern_matches: other.pattern_matches.or(self.pattern_matches),
            bias: other.bias.or(self.bias),
            regime: other.regime.or(self.regime),
            strategies: other.strategies.or(self.strategies),
            selected_strategy: other.selected_strategy.or(self.selected_strategy),
            risk: other.risk.or(self.risk),
            execution: other.execution.or(self.execution),
            trading_halted: other.trading_halted.or(self.trading_halted),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
