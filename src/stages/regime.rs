//! Regime classification stage.

use async_trait::async_trait;
use tracing::info;

use crate::engine::{Stage, StageKind};
use crate::state::{StateUpdate, TradingState};
use crate::strategy::regime::RegimeClassifier;
use crate::types::StageFault;

pub struct RegimeStage {
    classifier: RegimeClassifier,
}

impl RegimeStage {
    pub fn new(classifier: RegimeClassifier) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Stage for RegimeStage {
    fn name(&self) -> &'static str {
        StageKind::RegimeClassification.as_str()
    }

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault> {
        let regime = self.classifier.classify(state.indicators.as_ref());
        info!(symbol = %state.symbol, regime = %regime, "Regime classified");
        Ok(StateUpdate {
            regime: Some(regime),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::regime::RegimeConfig;
    use crate::types::{MarketRegime, Timeframe};

    #[tokio::test]
    async fn test_no_indicators_is_unknown() {
        let stage = RegimeStage::new(RegimeClassifier::new(RegimeConfig::default()));
        let update = stage
            .run(&TradingState::new("SOLUSDT", Timeframe::M15))
            .await
            .unwrap();
        assert_eq!(update.regime, Some(MarketRegime::Unknown));
    }
}
