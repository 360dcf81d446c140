//! Risk manager.
//!
//! Gates a selected strategy on confidence, bracket orientation,
//! reward-to-risk and regime, then sizes the position so that hitting the
//! stop loses at most `max_risk_pct` of account equity.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::types::{MarketRegime, RiskAssessment, Strategy};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub account_equity: Decimal,
    /// Fraction of equity risked per trade (0.01 = 1%).
    pub max_risk_pct: Decimal,
    pub min_confidence: f64,
    pub min_reward_to_risk: f64,
    pub block_volatile: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_equity: dec!(10000),
            max_risk_pct: dec!(0.01),
            min_confidence: 0.55,
            min_reward_to_risk: 1.5,
            block_volatile: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk manager
// ---------------------------------------------------------------------------

pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Assess a strategy. A rejection is an ordinary result, not an error.
    pub fn assess(&self, strategy: &Strategy, regime: MarketRegime) -> RiskAssessment {
        let mut reasons = Vec::new();

        if !strategy.is_well_formed() {
            reasons.push(format!(
                "stop/target on wrong side of entry for {}",
                strategy.direction
            ));
        }

        let risk_per_unit = strategy.risk_per_unit();
        let reward_to_risk = if risk_per_unit > Decimal::ZERO {
            (strategy.reward_per_unit() / risk_per_unit)
                .to_f64()
                .unwrap_or(0.0)
        } else {
            reasons.push("zero stop distance".to_string());
            0.0
        };

        if strategy.confidence < self.config.min_confidence {
            reasons.push(format!(
                "confidence {:.0}% below {:.0}%",
                strategy.confidence * 100.0,
                self.config.min_confidence * 100.0
            ));
        }
        if reward_to_risk < self.config.min_reward_to_risk {
            reasons.push(format!(
                "reward:risk {reward_to_risk:.2} below {:.2}",
                self.config.min_reward_to_risk
            ));
        }
        if self.config.block_volatile && regime == MarketRegime::Volatile {
            reasons.push("volatile regime".to_string());
        }

        if !reasons.is_empty() {
            debug!(strategy = %strategy.name, reasons = ?reasons, "Strategy rejected");
            return RiskAssessment {
                approved: false,
                position_size: Decimal::ZERO,
                reward_to_risk,
                reasons,
            };
        }

        let risk_budget = self.config.account_equity * self.config.max_risk_pct;
        let position_size = (risk_budget / risk_per_unit).round_dp(6);
        if position_size <= Decimal::ZERO {
            return RiskAssessment {
                approved: false,
                position_size: Decimal::ZERO,
                reward_to_risk,
                reasons: vec!["position size rounds to zero".to_string()],
            };
        }

        RiskAssessment {
            approved: true,
            position_size,
            reward_to_risk,
            reasons: vec![format!("risking {risk_budget} of {}", self.config.account_equity)],
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn strategy(confidence: f64, stop: Decimal, target: Decimal) -> Strategy {
        Strategy {
            name: "t".into(),
            direction: Direction::Long,
            entry: dec!(100),
            stop_loss: stop,
            take_profit: target,
            confidence,
            rationale: String::new(),
        }
    }

    #[test]
    fn test_approves_and_sizes() {
        let rm = RiskManager::new(RiskConfig::default());
        let r = rm.assess(&strategy(0.7, dec!(98), dec!(106)), MarketRegime::TrendingUp);
        assert!(r.approved);
        // 1% of 10_000 = 100 risk; 2 per unit → 50 units
        assert_eq!(r.position_size, dec!(50));
        assert!((r.reward_to_risk - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_low_confidence() {
        let rm = RiskManager::new(RiskConfig::default());
        let r = rm.assess(&strategy(0.3, dec!(98), dec!(106)), MarketRegime::TrendingUp);
        assert!(!r.approved);
        assert!(r.reasons[0].contains("confidence"));
    }

    #[test]
    fn test_rejects_poor_reward_to_risk() {
        let rm = RiskManager::new(RiskConfig::default());
        let r = rm.assess(&strategy(0.8, dec!(95), dec!(102)), MarketRegime::Ranging);
        assert!(!r.approved);
        assert_eq!(r.position_size, Decimal::ZERO);
    }

    #[test]
    fn test_rejects_inverted_bracket() {
        let rm = RiskManager::new(RiskConfig::default());
        let r = rm.assess(&strategy(0.8, dec!(105), dec!(120)), MarketRegime::Ranging);
        assert!(!r.approved);
        assert!(r.reasons.iter().any(|s| s.contains("wrong side")));
    }

    #[test]
    fn test_volatile_regime_blocked_only_when_configured() {
        let s = strategy(0.8, dec!(98), dec!(106));
        let blocked = RiskManager::new(RiskConfig::default()).assess(&s, MarketRegime::Volatile);
        assert!(!blocked.approved);

        let permissive = RiskManager::new(RiskConfig {
            block_volatile: false,
            ..RiskConfig::default()
        });
        assert!(permissive.assess(&s, MarketRegime::Volatile).approved);
    }

    #[test]
    fn test_zero_stop_distance_rejected() {
        let rm = RiskManager::new(RiskConfig::default());
        let r = rm.assess(&strategy(0.8, dec!(100), dec!(110)), MarketRegime::Ranging);
        assert!(!r.approved);
        assert!(r.reasons.iter().any(|s| s.contains("zero stop")));
    }
}
