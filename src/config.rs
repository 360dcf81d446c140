//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`, then held as `Secret<String>`.
//! Every section has defaults, so a partial file is valid.

use anyhow::{Context, Result};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

use crate::engine::breaker::DEFAULT_THRESHOLD;
use crate::stages::execution::ExecutionConfig as ExecutionStageConfig;
use crate::stages::patterns::PatternRecallConfig;
use crate::strategy::regime::RegimeConfig as RegimeRules;
use crate::strategy::risk::RiskConfig as RiskRules;
use crate::strategy::rules::RulesConfig;
use crate::types::Timeframe;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub orchestrator: OrchestratorConfig,
    pub market_data: MarketDataConfig,
    pub memory: MemoryConfig,
    pub regime: RegimeConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub storage: StorageConfig,
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub cycle_interval_secs: u64,
    pub symbols: Vec<String>,
    pub timeframe: Timeframe,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "TRADECYCLE-001".to_string(),
            cycle_interval_secs: 300,
            symbols: vec!["BTCUSDT".to_string()],
            timeframe: Timeframe::H1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Consecutive stage faults before the breaker opens.
    pub breaker_threshold: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            breaker_threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MarketDataConfig {
    pub provider: String,
    pub base_url: Option<String>,
    pub candle_limit: u32,
    pub timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            provider: "binance".to_string(),
            base_url: None,
            candle_limit: 100,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    /// Snapshots kept per symbol/timeframe.
    pub capacity: usize,
    pub max_matches: usize,
    pub min_similarity: f64,
    pub min_candles: usize,
    pub timeout_secs: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        let recall = PatternRecallConfig::default();
        Self {
            capacity: 500,
            max_matches: recall.max_matches,
            min_similarity: recall.min_similarity,
            min_candles: recall.min_candles,
            timeout_secs: recall.timeout_secs,
        }
    }
}

impl MemoryConfig {
    pub fn recall(&self) -> PatternRecallConfig {
        PatternRecallConfig {
            max_matches: self.max_matches,
            min_similarity: self.min_similarity,
            min_candles: self.min_candles,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RegimeConfig {
    pub trend_threshold_pct: f64,
    pub volatile_range_pct: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        let rules = RegimeRules::default();
        Self {
            trend_threshold_pct: rules.trend_threshold_pct,
            volatile_range_pct: rules.volatile_range_pct,
        }
    }
}

impl RegimeConfig {
    pub fn rules(&self) -> RegimeRules {
        RegimeRules {
            trend_threshold_pct: self.trend_threshold_pct,
            volatile_range_pct: self.volatile_range_pct,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    /// "rules" or "openrouter".
    pub advisor: String,
    pub api_key_env: String,
    pub model: Option<String>,
    /// Fallback model for OpenRouter (used when primary model fails).
    pub fallback_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub stop_multiple: f64,
    pub target_multiple: f64,
    pub base_confidence: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            advisor: "rules".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            model: None,
            fallback_model: None,
            max_tokens: None,
            timeout_secs: 60,
            stop_multiple: 1.5,
            target_multiple: 3.0,
            base_confidence: 0.45,
        }
    }
}

impl StrategyConfig {
    pub fn rules(&self) -> Result<RulesConfig> {
        Ok(RulesConfig {
            stop_multiple: to_decimal("strategy.stop_multiple", self.stop_multiple)?,
            target_multiple: to_decimal("strategy.target_multiple", self.target_multiple)?,
            base_confidence: self.base_confidence,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub account_equity: f64,
    /// Fraction of equity risked per trade (0.01 = 1%).
    pub max_risk_pct: f64,
    pub min_confidence: f64,
    pub min_reward_to_risk: f64,
    pub block_volatile: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_equity: 10_000.0,
            max_risk_pct: 0.01,
            min_confidence: 0.55,
            min_reward_to_risk: 1.5,
            block_volatile: true,
        }
    }
}

impl RiskConfig {
    pub fn rules(&self) -> Result<RiskRules> {
        Ok(RiskRules {
            account_equity: to_decimal("risk.account_equity", self.account_equity)?,
            max_risk_pct: to_decimal("risk.max_risk_pct", self.max_risk_pct)?,
            min_confidence: self.min_confidence,
            min_reward_to_risk: self.min_reward_to_risk,
            block_volatile: self.block_volatile,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    pub dry_run: bool,
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let stage = ExecutionStageConfig::default();
        Self {
            dry_run: stage.dry_run,
            timeout_secs: stage.timeout_secs,
        }
    }
}

impl ExecutionConfig {
    pub fn stage(&self) -> ExecutionStageConfig {
        ExecutionStageConfig {
            dry_run: self.dry_run,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub save_traces: bool,
    pub trace_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_traces: true,
            trace_dir: PathBuf::from("traces"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
        }
    }
}

fn to_decimal(field: &str, value: f64) -> Result<Decimal> {
    Decimal::from_f64(value).with_context(|| format!("{field} is not a finite number: {value}"))
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.agent.symbols.is_empty(), "agent.symbols must not be empty");
        anyhow::ensure!(
            self.agent.cycle_interval_secs > 0,
            "agent.cycle_interval_secs must be positive"
        );
        anyhow::ensure!(
            self.orchestrator.breaker_threshold > 0,
            "orchestrator.breaker_threshold must be at least 1"
        );
        anyhow::ensure!(
            self.risk.max_risk_pct > 0.0 && self.risk.max_risk_pct < 1.0,
            "risk.max_risk_pct must be in (0, 1)"
        );
        anyhow::ensure!(
            matches!(self.strategy.advisor.as_str(), "rules" | "openrouter"),
            "strategy.advisor must be \"rules\" or \"openrouter\", got {:?}",
            self.strategy.advisor
        );
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Like [`resolve_env`](Self::resolve_env), wrapped so it never ends up in logs.
    pub fn resolve_secret(env_name: &str) -> Result<Secret<String>> {
        Self::resolve_env(env_name).map(Secret::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_load_config() {
        // This test requires config.toml to be in the working directory.
        let result = AppConfig::load("config.toml");
        if let Ok(cfg) = result {
            assert_eq!(cfg.agent.name, "TRADECYCLE-001");
            assert!(!cfg.agent.symbols.is_empty());
            assert_eq!(cfg.orchestrator.breaker_threshold, 3);
            assert!(cfg.execution.dry_run);
        }
        // If config.toml isn't found, that's acceptable in some test environments
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.agent.timeframe, Timeframe::H1);
        assert_eq!(cfg.orchestrator.breaker_threshold, DEFAULT_THRESHOLD);
        assert_eq!(cfg.strategy.advisor, "rules");
        assert_eq!(cfg.storage.trace_dir, PathBuf::from("traces"));
    }

    #[test]
    fn test_partial_sections() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [agent]
            symbols = ["ETHUSDT", "SOLUSDT"]
            timeframe = "4h"

            [orchestrator]
            breaker_threshold = 5

            [risk]
            account_equity = 2500.0
            max_risk_pct = 0.02
            "#,
        )
        .unwrap();
        assert_eq!(cfg.agent.symbols.len(), 2);
        assert_eq!(cfg.agent.timeframe, Timeframe::H4);
        assert_eq!(cfg.agent.cycle_interval_secs, 300);
        assert_eq!(cfg.orchestrator.breaker_threshold, 5);

        let risk = cfg.risk.rules().unwrap();
        assert_eq!(risk.account_equity, dec!(2500));
        assert_eq!(risk.max_risk_pct, dec!(0.02));
        assert!(risk.block_volatile);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(AppConfig::from_toml_str("[orchestrator]\nbreaker_threshold = 0").is_err());
        assert!(AppConfig::from_toml_str("[agent]\nsymbols = []").is_err());
        assert!(AppConfig::from_toml_str("[strategy]\nadvisor = \"gpt\"").is_err());
        assert!(AppConfig::from_toml_str("[risk]\nmax_risk_pct = 1.5").is_err());
    }

    #[test]
    fn test_section_conversions() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.strategy.rules().unwrap().stop_multiple, dec!(1.5));
        assert_eq!(cfg.memory.recall().max_matches, 10);
        assert_eq!(cfg.regime.rules().volatile_range_pct, 8.0);
        assert!(cfg.execution.stage().dry_run);
    }

    #[test]
    fn test_missing_secret_errors() {
        assert!(AppConfig::resolve_secret("TRADECYCLE_TEST_DEFINITELY_UNSET").is_err());
    }
}
