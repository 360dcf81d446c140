//! End-to-end orchestrator scenarios.
//!
//! Drives both bare scripted pipelines (breaker semantics) and the standard
//! six-stage cycle wired with real stages over a scripted candle feed.

use std::sync::Arc;

use futures::future::join_all;
use rust_decimal_macros::dec;

use tradecycle::engine::{
    CycleStages, HealthLevel, PipelineStep, Stage, StageKind, TradingCycleOrchestrator,
};
use tradecycle::memory::InMemoryPatternMemory;
use tradecycle::stages::{
    ExecutionConfig, ExecutionStage, MarketDataStage, PatternRecallConfig, PatternRecallStage,
    RegimeStage, RiskStage, SynthesisStage,
};
use tradecycle::state::{StateUpdate, TradingState};
use tradecycle::strategy::regime::{RegimeClassifier, RegimeConfig};
use tradecycle::strategy::risk::{RiskConfig, RiskManager};
use tradecycle::strategy::rules::{RuleBasedAdvisor, RulesConfig};
use tradecycle::types::{Bias, MarketData, MarketRegime, StepMarker, Timeframe};

use crate::scripted::{Script, ScriptedFeed, ScriptedStage};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn pipeline(stages: &[Arc<ScriptedStage>], threshold: u32) -> TradingCycleOrchestrator {
    let steps = stages
        .iter()
        .map(|s| PipelineStep::new(s.clone() as Arc<dyn Stage>))
        .collect();
    TradingCycleOrchestrator::new(steps, threshold)
}

/// Standard cycle over real stages. `replace` swaps one stage for a stand-in.
fn standard(
    feed: Arc<ScriptedFeed>,
    threshold: u32,
    replace: Option<(StageKind, Arc<dyn Stage>)>,
) -> TradingCycleOrchestrator {
    let mut stages = CycleStages {
        market_data: Arc::new(MarketDataStage::new(feed, 100, 5)),
        pattern_recall: Arc::new(PatternRecallStage::new(
            Arc::new(InMemoryPatternMemory::new(100)),
            PatternRecallConfig::default(),
        )),
        regime: Arc::new(RegimeStage::new(RegimeClassifier::new(RegimeConfig::default()))),
        synthesis: Arc::new(SynthesisStage::new(
            Arc::new(RuleBasedAdvisor::new(RulesConfig::default())),
            5,
        )),
        risk: Arc::new(RiskStage::new(RiskManager::new(RiskConfig {
            min_confidence: 0.5,
            ..RiskConfig::default()
        }))),
        execution: Arc::new(ExecutionStage::new(None, ExecutionConfig::default())),
    };

    if let Some((kind, stage)) = replace {
        let slot = match kind {
            StageKind::MarketData => &mut stages.market_data,
            StageKind::PatternRecall => &mut stages.pattern_recall,
            StageKind::RegimeClassification => &mut stages.regime,
            StageKind::StrategySynthesis => &mut stages.synthesis,
            StageKind::RiskAssessment => &mut stages.risk,
            StageKind::Execution => &mut stages.execution,
        };
        *slot = stage;
    }

    TradingCycleOrchestrator::standard(stages, threshold)
}

// ---------------------------------------------------------------------------
// Breaker semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_three_faults_open_breaker_and_skip_invocation() {
    let a = ScriptedStage::failing("a", "boom a");
    let b = ScriptedStage::failing("b", "boom b");
    let c = ScriptedStage::failing("c", "boom c");
    let d = ScriptedStage::succeeding("d");
    let orc = pipeline(&[a.clone(), b.clone(), c.clone(), d.clone()], 3);

    let state = orc.run_cycle("BTCUSDT", Timeframe::H1).await;

    assert_eq!(d.calls(), 0, "stage after the breaker opened must not run");
    assert_eq!(state.errors.len(), 3);
    assert_eq!(
        state.errors.iter().map(|e| e.stage.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    assert!(state.trading_halted);
    assert!(!state.risk_approved());
    assert_eq!(state.current_step, StepMarker::BreakerOpen("d".into()));

    let health = orc.health_status();
    assert_eq!(health.status, HealthLevel::Critical);
    assert_eq!(health.consecutive_errors, 3);
    assert!(health.breaker_open);
}

#[tokio::test]
async fn test_transient_fault_recovers_on_next_success() {
    let a = ScriptedStage::failing("a", "blip");
    let b = ScriptedStage::succeeding("b");
    let orc = pipeline(&[a, b], 3);

    let state = orc.run_cycle("ETHUSDT", Timeframe::M15).await;

    assert_eq!(state.errors.len(), 1);
    assert!(!state.trading_halted);
    assert_eq!(orc.health_status().status, HealthLevel::Healthy);
    assert_eq!(orc.health_status().consecutive_errors, 0);
}

#[tokio::test]
async fn test_every_stage_panicking_still_resolves() {
    let stages: Vec<_> = ["a", "b", "c", "d", "e"]
        .into_iter()
        .map(|n| ScriptedStage::new(n, Script::Panic(format!("{n} exploded"))))
        .collect();
    let orc = pipeline(&stages, 3);

    let state = orc.run_cycle("SOLUSDT", Timeframe::M5).await;

    // Only the first three ran; the rest were short-circuited.
    assert_eq!(stages.iter().map(|s| s.calls()).sum::<usize>(), 3);
    assert_eq!(state.errors.len(), 3);
    assert!(state.errors[0].message.contains("a exploded"));
    assert!(state.trading_halted);
    assert!(orc.is_critical());
}

#[tokio::test]
async fn test_concurrent_cycles_share_breaker_but_not_state() {
    let flaky = ScriptedStage::failing("flaky", "rate limited");
    let orc = Arc::new(pipeline(&[flaky.clone()], 2));

    let states = join_all(
        ["BTCUSDT", "ETHUSDT"]
            .into_iter()
            .map(|sym| orc.run_cycle(sym, Timeframe::H1)),
    )
    .await;

    assert_eq!(flaky.calls(), 2);
    assert!(orc.is_critical());
    for state in &states {
        assert_eq!(state.errors.len(), 1, "each cycle logs only its own fault");
    }
    assert_ne!(states[0].cycle_id, states[1].cycle_id);
    assert_eq!(states.iter().filter(|s| s.trading_halted).count(), 1);

    // Open breaker blocks later cycles until an operator resets it.
    let blocked = orc.run_cycle("BTCUSDT", Timeframe::H1).await;
    assert_eq!(flaky.calls(), 2);
    assert!(blocked.trading_halted);
    assert!(blocked.errors.is_empty());

    orc.reset_error_counters();
    flaky.set_script(Script::Succeed(StateUpdate::new().note("ok")));
    let recovered = orc.run_cycle("BTCUSDT", Timeframe::H1).await;
    assert_eq!(flaky.calls(), 3);
    assert!(!recovered.trading_halted);
    assert_eq!(orc.health_status().status, HealthLevel::Healthy);
}

// ---------------------------------------------------------------------------
// Standard cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_standard_cycle_trades_uptrend_in_dry_run() {
    let feed = ScriptedFeed::uptrend(30);
    let orc = standard(feed.clone(), 3, None);

    let state = orc.run_cycle("BTCUSDT", Timeframe::H1).await;

    assert_eq!(feed.calls(), 1);
    assert!(state.errors.is_empty(), "errors: {:?}", state.errors);
    assert_eq!(state.indicators.as_ref().unwrap().candle_count, 30);
    assert_eq!(state.regime, Some(MarketRegime::TrendingUp));
    assert_eq!(state.bias, Some(Bias::Neutral));
    assert_eq!(state.pattern_matches, Some(Vec::new()));

    let strategy = state.selected_strategy.as_ref().unwrap();
    assert_eq!(strategy.entry, dec!(103.0));
    assert_eq!(strategy.stop_loss, dec!(102.7));
    assert_eq!(strategy.take_profit, dec!(103.6));

    let risk = state.risk.as_ref().unwrap();
    assert!(risk.approved, "risk: {risk}");
    assert_eq!(risk.position_size, dec!(333.333333));

    let exec = state.execution.as_ref().unwrap();
    assert!(exec.executed && exec.dry_run);
    assert!(exec.order_id.as_deref().unwrap().starts_with("dry-run-"));
    assert_eq!(state.current_step, StepMarker::Completed("execution".into()));
    assert_eq!(orc.health_status().status, HealthLevel::Healthy);
}

#[tokio::test]
async fn test_feed_outage_degrades_to_no_trade() {
    let feed = ScriptedFeed::uptrend(30);
    feed.set_failing(true);
    let orc = standard(feed, 3, None);

    let state = orc.run_cycle("BTCUSDT", Timeframe::H1).await;

    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].stage, "market_data");
    assert!(state.market_data.is_none());
    assert_eq!(state.bias, Some(Bias::Neutral));
    assert_eq!(state.regime, Some(MarketRegime::Unknown));
    assert!(state.selected_strategy.is_none());
    assert!(state.risk.is_none());
    assert!(!state.traded());
    assert_eq!(state.current_step, StepMarker::Skipped("execution".into()));
    // The pattern stage succeeded right after, clearing the counter.
    assert_eq!(orc.health_status().status, HealthLevel::Healthy);
}

#[tokio::test]
async fn test_supplied_market_data_skips_fetch() {
    let feed = ScriptedFeed::uptrend(30);
    let orc = standard(feed.clone(), 3, None);

    let candles = ScriptedFeed::uptrend_candles(30);
    let indicators = tradecycle::stages::market_data::compute_indicators(&candles);
    let initial = TradingState::new("BTCUSDT", Timeframe::H1).with_market_data(
        MarketData {
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::H1,
            candles,
            fetched_at: chrono::Utc::now(),
        },
        indicators,
    );

    let state = orc.invoke(initial).await;

    assert_eq!(feed.calls(), 0);
    assert!(state.notes.iter().any(|n| n == "market_data skipped"));
    assert!(state.traded());
}

#[tokio::test]
async fn test_threshold_one_halts_and_persists_until_reset() {
    let feed = ScriptedFeed::uptrend(30);
    feed.set_failing(true);
    let orc = standard(feed.clone(), 1, None);

    let first = orc.run_cycle("BTCUSDT", Timeframe::H1).await;
    assert_eq!(feed.calls(), 1);
    assert!(first.trading_halted);
    assert!(!first.traded());
    assert_eq!(first.errors.len(), 1);

    let second = orc.run_cycle("BTCUSDT", Timeframe::H1).await;
    assert_eq!(feed.calls(), 1, "open breaker must not call the feed");
    assert!(second.trading_halted);

    orc.reset_error_counters();
    feed.set_failing(false);
    let third = orc.run_cycle("BTCUSDT", Timeframe::H1).await;
    assert_eq!(feed.calls(), 2);
    assert!(!third.trading_halted);
    assert!(third.traded());
}

#[tokio::test]
async fn test_each_stage_fallback_feeds_the_next_stage() {
    for kind in StageKind::ALL.iter().copied().skip(1) {
        let stand_in: Arc<dyn Stage> = ScriptedStage::failing(kind.as_str(), "injected");
        let orc = standard(ScriptedFeed::uptrend(30), 3, Some((kind, stand_in)));

        let state = orc.run_cycle("BTCUSDT", Timeframe::H1).await;

        assert_eq!(state.errors.len(), 1, "{kind}: {:?}", state.errors);
        assert_eq!(state.errors[0].stage, kind.as_str());
        assert!(!orc.is_critical(), "{kind}");
        assert!(!state.trading_halted, "{kind}");

        match kind {
            StageKind::PatternRecall => {
                // Neutral fallback still lets a trend trade through.
                assert_eq!(state.bias, Some(Bias::Neutral));
                assert_eq!(state.regime, Some(MarketRegime::TrendingUp));
                assert!(state.traded());
            }
            StageKind::RegimeClassification => {
                assert_eq!(state.regime, Some(MarketRegime::Unknown));
                assert!(state.selected_strategy.is_none());
                assert!(!state.traded());
            }
            StageKind::StrategySynthesis => {
                assert_eq!(state.strategies, Some(Vec::new()));
                assert!(state.risk.is_none());
                assert!(!state.traded());
            }
            StageKind::RiskAssessment => {
                assert!(!state.risk_approved());
                assert_eq!(state.current_step, StepMarker::Skipped("execution".into()));
            }
            StageKind::Execution => {
                assert!(!state.traded());
                assert_eq!(state.current_step, StepMarker::Fallback("execution".into()));
            }
            StageKind::MarketData => unreachable!(),
        }
    }
}
