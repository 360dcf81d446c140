//! Strategy synthesis stage: ask the advisor, keep the best proposal.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use super::with_timeout;
use crate::engine::{Stage, StageKind};
use crate::state::{StateUpdate, TradingState};
use crate::strategy::{select_best, StrategyAdvisor, StrategyContext};
use crate::types::StageFault;

pub struct SynthesisStage {
    advisor: Arc<dyn StrategyAdvisor>,
    timeout_secs: u64,
}

impl SynthesisStage {
    pub fn new(advisor: Arc<dyn StrategyAdvisor>, timeout_secs: u64) -> Self {
        Self {
            advisor,
            timeout_secs,
        }
    }
}

#[async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> &'static str {
        StageKind::StrategySynthesis.as_str()
    }

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault> {
        let ctx = StrategyContext::from_state(state);
        let strategies = with_timeout(
            "propose strategies",
            self.timeout_secs,
            self.advisor.propose(&ctx),
        )
        .await?;

        let selected = select_best(&strategies);
        let mut update = StateUpdate::new();
        match &selected {
            Some(best) => info!(
                symbol = %state.symbol,
                advisor = self.advisor.name(),
                proposals = strategies.len(),
                selected = %best.name,
                direction = %best.direction,
                confidence = format!("{:.0}%", best.confidence * 100.0),
                "Strategy selected"
            ),
            None => {
                update = update.note(format!("{} proposed no strategy", self.advisor.name()));
            }
        }
        update.strategies = Some(strategies);
        update.selected_strategy = selected;
        Ok(update)
    }
}
