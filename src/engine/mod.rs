//! Core engine: the circuit-breaking stage pipeline that drives one
//! trading cycle.

pub mod breaker;
pub mod fallback;
pub mod orchestrator;

use async_trait::async_trait;
use std::fmt;

use crate::state::{StateUpdate, TradingState};
use crate::types::StageFault;

pub use breaker::{CircuitBreaker, HealthLevel, HealthStatus};
pub use fallback::FallbackPolicy;
pub use orchestrator::{CycleStages, PipelineStep, TradingCycleOrchestrator};

/// One named unit of work in the pipeline.
///
/// `Ok` covers every well-formed outcome, including degraded ones such as
/// "no patterns found" or "trade rejected". `Err` is reserved for genuine
/// failures (network, malformed response, timeout) and is what the circuit
/// breaker counts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable identifier, used for fallbacks, markers and error notes.
    fn name(&self) -> &'static str;

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault>;
}

/// The stages of the standard trading cycle, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    MarketData,
    PatternRecall,
    RegimeClassification,
    StrategySynthesis,
    RiskAssessment,
    Execution,
}

impl StageKind {
    pub const ALL: &'static [StageKind] = &[
        StageKind::MarketData,
        StageKind::PatternRecall,
        StageKind::RegimeClassification,
        StageKind::StrategySynthesis,
        StageKind::RiskAssessment,
        StageKind::Execution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::MarketData => "market_data",
            StageKind::PatternRecall => "pattern_recall",
            StageKind::RegimeClassification => "regime_classification",
            StageKind::StrategySynthesis => "strategy_synthesis",
            StageKind::RiskAssessment => "risk_assessment",
            StageKind::Execution => "execution",
        }
    }

    /// Look up a stage by name. `None` for stages outside the standard cycle.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_names_roundtrip() {
        for kind in StageKind::ALL {
            assert_eq!(StageKind::from_name(kind.as_str()), Some(*kind));
        }
        assert_eq!(StageKind::from_name("news_scoring"), None);
    }
}
