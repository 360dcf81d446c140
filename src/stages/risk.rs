//! Risk assessment stage.

use async_trait::async_trait;
use tracing::info;

use crate::engine::{Stage, StageKind};
use crate::state::{StateUpdate, TradingState};
use crate::strategy::risk::RiskManager;
use crate::types::{MarketRegime, RiskAssessment, StageFault};

pub struct RiskStage {
    manager: RiskManager,
}

impl RiskStage {
    pub fn new(manager: RiskManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl Stage for RiskStage {
    fn name(&self) -> &'static str {
        StageKind::RiskAssessment.as_str()
    }

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault> {
        let assessment = match state.selected_strategy.as_ref() {
            Some(strategy) => self
                .manager
                .assess(strategy, state.regime.unwrap_or(MarketRegime::Unknown)),
            None => RiskAssessment::rejected("no strategy selected"),
        };

        info!(symbol = %state.symbol, assessment = %assessment, "Risk assessed");
        Ok(StateUpdate {
            risk: Some(assessment),
            ..Default::default()
        })
    }
}
