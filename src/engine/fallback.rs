//! Conservative substitute state for faulted stages.
//!
//! Every fallback leaves the state well-formed for the next stage in the
//! standard order: pattern recall always finds a pattern list and a bias,
//! synthesis always finds a regime, risk assessment is only reached with a
//! selected strategy, and execution is only reached with an approved
//! assessment.

use crate::engine::StageKind;
use crate::state::StateUpdate;
use crate::types::{Bias, ExecutionResult, MarketRegime, RiskAssessment, StepMarker};

pub struct FallbackPolicy;

impl FallbackPolicy {
    /// Substitute output for a stage that faulted while the breaker is closed.
    pub fn fallback_for(stage_name: &str) -> StateUpdate {
        let Some(kind) = StageKind::from_name(stage_name) else {
            return StateUpdate::new().step(StepMarker::UnknownFallback);
        };

        let update = match kind {
            StageKind::MarketData => {
                StateUpdate::new().note("market data unavailable; continuing without it")
            }
            StageKind::PatternRecall => StateUpdate {
                pattern_matches: Some(Vec::new()),
                bias: Some(Bias::Neutral),
                ..Default::default()
            },
            StageKind::RegimeClassification => StateUpdate {
                regime: Some(MarketRegime::Unknown),
                ..Default::default()
            },
            StageKind::StrategySynthesis => StateUpdate {
                strategies: Some(Vec::new()),
                ..Default::default()
            },
            StageKind::RiskAssessment => StateUpdate {
                risk: Some(RiskAssessment::rejected("risk assessment unavailable")),
                ..Default::default()
            },
            StageKind::Execution => StateUpdate {
                execution: Some(ExecutionResult::not_executed("execution unavailable")),
                ..Default::default()
            },
        };

        update.step(StepMarker::Fallback(stage_name.to_string()))
    }

    /// Substitute output once the breaker is open: the stage's own fallback
    /// plus a forced no-trade for the rest of the cycle.
    pub fn hard_fail(stage_name: &str) -> StateUpdate {
        Self::fallback_for(stage_name).merge(StateUpdate {
            risk: Some(RiskAssessment::rejected("circuit breaker open")),
            trading_halted: Some(true),
            current_step: Some(StepMarker::BreakerOpen(stage_name.to_string())),
            ..Default::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
