//! TRADECYCLE: circuit-breaking trading cycle agent.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the stage collaborators into one shared orchestrator, and runs
//! one cycle per configured symbol on every tick with graceful shutdown.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use tradecycle::config::{self, AppConfig};
use tradecycle::dashboard::{self, DashboardState};
use tradecycle::data::binance::BinanceClient;
use tradecycle::data::MarketDataSource;
use tradecycle::engine::{CycleStages, HealthLevel, TradingCycleOrchestrator};
use tradecycle::llm::openrouter::OpenRouterAdvisor;
use tradecycle::memory::{InMemoryPatternMemory, PatternMemory, PatternSnapshot};
use tradecycle::stages::{
    ExecutionStage, MarketDataStage, PatternRecallStage, RegimeStage, RiskStage, SynthesisStage,
};
use tradecycle::state::TradingState;
use tradecycle::storage;
use tradecycle::strategy::regime::RegimeClassifier;
use tradecycle::strategy::risk::RiskManager;
use tradecycle::strategy::rules::RuleBasedAdvisor;
use tradecycle::strategy::StrategyAdvisor;

const BANNER: &str = r#"
 _____ ____      _    ____  _____ ______   ______ _     _____
|_   _|  _ \    / \  |  _ \| ____/ ___\ \ / / ___| |   | ____|
  | | | |_) |  / _ \ | | | |  _|| |    \ V / |   | |   |  _|
  | | |  _ <  / ___ \| |_| | |__| |___  | || |___| |___| |___
  |_| |_| \_\/_/   \_\____/|_____\____| |_| \____|_____|_____|

  Circuit-breaking trading cycle orchestrator
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = config::AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        cycle_interval_secs = cfg.agent.cycle_interval_secs,
        symbols = ?cfg.agent.symbols,
        timeframe = %cfg.agent.timeframe,
        breaker_threshold = cfg.orchestrator.breaker_threshold,
        dry_run = cfg.execution.dry_run,
        "TRADECYCLE starting up"
    );

    // -- Initialise components -------------------------------------------

    let memory = Arc::new(InMemoryPatternMemory::new(cfg.memory.capacity));
    let orchestrator = Arc::new(build_orchestrator(&cfg, memory.clone())?);
    info!(steps = ?orchestrator.step_names(), "Pipeline assembled");

    let dashboard_state = Arc::new(DashboardState::new(orchestrator.clone()));
    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(dashboard_state.clone(), cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let cycle_interval = Duration::from_secs(cfg.agent.cycle_interval_secs);
    let mut interval = tokio::time::interval(cycle_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.cycle_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut tick: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                tick += 1;
                let states = run_tick(&cfg, &orchestrator, tick).await;
                for state in &states {
                    finish_cycle(&cfg, state, memory.as_ref(), &dashboard_state).await;
                }
                log_health(&orchestrator);
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    let health = orchestrator.health_status();
    info!(
        ticks = tick,
        status = %health.status,
        consecutive_errors = health.consecutive_errors,
        "TRADECYCLE shut down cleanly."
    );

    Ok(())
}

/// Wire the configured collaborators into the standard six-stage cycle.
fn build_orchestrator(
    cfg: &AppConfig,
    memory: Arc<InMemoryPatternMemory>,
) -> Result<TradingCycleOrchestrator> {
    let source: Arc<dyn MarketDataSource> = match cfg.market_data.provider.as_str() {
        "binance" => Arc::new(BinanceClient::new(
            cfg.market_data.base_url.clone(),
            cfg.market_data.timeout_secs,
        )?),
        other => anyhow::bail!("Unknown market data provider: {other}"),
    };

    let advisor: Arc<dyn StrategyAdvisor> = match cfg.strategy.advisor.as_str() {
        "openrouter" => match AppConfig::resolve_secret(&cfg.strategy.api_key_env) {
            Ok(key) => {
                info!(
                    model = ?cfg.strategy.model,
                    fallback = ?cfg.strategy.fallback_model,
                    "Using OpenRouter strategy advisor"
                );
                Arc::new(OpenRouterAdvisor::new(
                    key,
                    cfg.strategy.model.clone(),
                    cfg.strategy.fallback_model.clone(),
                    cfg.strategy.max_tokens,
                    cfg.strategy.timeout_secs,
                )?)
            }
            Err(e) => {
                warn!(error = %e, "No LLM API key configured — using rule-based advisor");
                Arc::new(RuleBasedAdvisor::new(cfg.strategy.rules()?))
            }
        },
        _ => Arc::new(RuleBasedAdvisor::new(cfg.strategy.rules()?)),
    };

    if !cfg.execution.dry_run {
        warn!("Live execution requested but no broker is configured; orders will not be placed");
    }

    let stages = CycleStages {
        market_data: Arc::new(MarketDataStage::new(
            source,
            cfg.market_data.candle_limit,
            cfg.market_data.timeout_secs,
        )),
        pattern_recall: Arc::new(PatternRecallStage::new(memory, cfg.memory.recall())),
        regime: Arc::new(RegimeStage::new(RegimeClassifier::new(cfg.regime.rules()))),
        synthesis: Arc::new(SynthesisStage::new(advisor, cfg.strategy.timeout_secs)),
        risk: Arc::new(RiskStage::new(RiskManager::new(
            cfg.risk.rules().context("Invalid risk configuration")?,
        ))),
        execution: Arc::new(ExecutionStage::new(None, cfg.execution.stage())),
    };

    Ok(TradingCycleOrchestrator::standard(
        stages,
        cfg.orchestrator.breaker_threshold,
    ))
}

/// Run one cycle per symbol concurrently. Cycles share the breaker.
async fn run_tick(
    cfg: &AppConfig,
    orchestrator: &TradingCycleOrchestrator,
    tick: u64,
) -> Vec<TradingState> {
    info!(tick, symbols = cfg.agent.symbols.len(), "Starting tick");
    let cycles = cfg
        .agent
        .symbols
        .iter()
        .map(|symbol| orchestrator.run_cycle(symbol, cfg.agent.timeframe));
    join_all(cycles).await
}

/// Persist, remember and publish one finished cycle.
async fn finish_cycle(
    cfg: &AppConfig,
    state: &TradingState,
    memory: &dyn PatternMemory,
    dashboard: &DashboardState,
) {
    log_cycle_summary(state);

    if cfg.storage.save_traces {
        if let Err(e) = storage::save_trace(state, &cfg.storage.trace_dir) {
            error!(cycle_id = %state.cycle_id, error = %e, "Failed to save trace");
        }
    }

    if let Some(snapshot) = PatternSnapshot::from_state(state) {
        if let Err(e) = memory.record(snapshot).await {
            warn!(symbol = %state.symbol, error = %e, "Failed to record pattern snapshot");
        }
    }

    dashboard.record_cycle(state).await;
}

/// Log a human-readable cycle summary.
fn log_cycle_summary(state: &TradingState) {
    info!(
        cycle_id = %state.cycle_id,
        symbol = %state.symbol,
        step = %state.current_step,
        regime = ?state.regime,
        bias = ?state.bias,
        strategy = state.selected_strategy.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
        approved = state.risk_approved(),
        executed = state.traded(),
        halted = state.trading_halted,
        errors = state.errors.len(),
        "Cycle complete"
    );
    for note in &state.errors {
        warn!(cycle_id = %state.cycle_id, error = %note, "Stage fault this cycle");
    }
}

fn log_health(orchestrator: &TradingCycleOrchestrator) {
    let health = orchestrator.health_status();
    match health.status {
        HealthLevel::Critical => error!(
            consecutive_errors = health.consecutive_errors,
            threshold = health.threshold,
            "Circuit breaker OPEN — trading halted until POST /api/health/reset"
        ),
        HealthLevel::Degraded => warn!(
            consecutive_errors = health.consecutive_errors,
            threshold = health.threshold,
            "Pipeline degraded"
        ),
        HealthLevel::Healthy => info!(status = %health.status, "Pipeline healthy"),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tradecycle=info"));

    let json_logging = std::env::var("TRADECYCLE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
