//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::{HealthStatus, TradingCycleOrchestrator};
use crate::state::TradingState;

/// Cycle summaries kept in memory.
const MAX_CYCLE_LOG: usize = 100;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub orchestrator: Arc<TradingCycleOrchestrator>,
    pub cycle_log: RwLock<Vec<CycleLogEntry>>,
}

impl DashboardState {
    pub fn new(orchestrator: Arc<TradingCycleOrchestrator>) -> Self {
        Self {
            orchestrator,
            cycle_log: RwLock::new(Vec::new()),
        }
    }

    /// Append a finished cycle, dropping the oldest past the cap.
    pub async fn record_cycle(&self, state: &TradingState) {
        let mut log = self.cycle_log.write().await;
        log.push(CycleLogEntry::from_state(state));
        if log.len() > MAX_CYCLE_LOG {
            let excess = log.len() - MAX_CYCLE_LOG;
            log.drain(..excess);
        }
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct CycleLogEntry {
    pub cycle_id: String,
    pub timestamp: String,
    pub symbol: String,
    pub timeframe: String,
    pub step: String,
    pub regime: Option<String>,
    pub bias: Option<String>,
    pub strategy: Option<String>,
    pub approved: bool,
    pub executed: bool,
    pub trading_halted: bool,
    pub errors: usize,
}

impl CycleLogEntry {
    pub fn from_state(state: &TradingState) -> Self {
        Self {
            cycle_id: state.cycle_id.to_string(),
            timestamp: state.started_at.to_rfc3339(),
            symbol: state.symbol.clone(),
            timeframe: state.timeframe.to_string(),
            step: state.current_step.to_string(),
            regime: state.regime.map(|r| r.to_string()),
            bias: state.bias.map(|b| b.to_string()),
            strategy: state.selected_strategy.as_ref().map(|s| s.name.clone()),
            approved: state.risk_approved(),
            executed: state.traded(),
            trading_halted: state.trading_halted,
            errors: state.errors.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
    pub health: HealthStatus,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

pub type AppState = Arc<DashboardState>;

/// GET /api/health
pub async fn get_health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.orchestrator.health_status())
}

/// POST /api/health/reset
pub async fn reset_health(State(state): State<AppState>) -> Json<ResetResponse> {
    let before = state.orchestrator.health_status();
    state.orchestrator.reset_error_counters();
    warn!(
        consecutive_errors = before.consecutive_errors,
        breaker_was_open = before.breaker_open,
        "Circuit breaker manually reset"
    );
    Json(ResetResponse {
        reset: true,
        health: state.orchestrator.health_status(),
    })
}

/// GET /api/cycles
pub async fn get_cycles(State(state): State<AppState>) -> Json<Vec<CycleLogEntry>> {
    let log = state.cycle_log.read().await;
    // Return last 100 cycles
    let start = log.len().saturating_sub(MAX_CYCLE_LOG);
    Json(log[start..].to_vec())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
