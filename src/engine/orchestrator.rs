//! Trading cycle orchestrator.
//!
//! Runs the fixed stage list for one cycle, merging each stage's output into
//! the running state. Every stage call goes through [`protected_call`], which
//! never fails: faults are counted by the shared circuit breaker, logged into
//! the state's error log and masked by a fallback.
//!
//! Instantiate once per process, wrap in `Arc`, and launch as many concurrent
//! cycles as needed; they share the breaker but never the state.
//!
//! [`protected_call`]: TradingCycleOrchestrator::protected_call

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::breaker::{CircuitBreaker, HealthLevel, HealthStatus};
use super::fallback::FallbackPolicy;
use super::Stage;
use crate::state::{StateUpdate, TradingState};
use crate::types::{ErrorNote, StageFault, StepMarker, Timeframe};

// ---------------------------------------------------------------------------
// Pipeline steps
// ---------------------------------------------------------------------------

/// Predicate over the already-merged state deciding whether a step runs.
pub type BranchGuard = fn(&TradingState) -> bool;

/// A stage plus its branch predicate.
pub struct PipelineStep {
    stage: Arc<dyn Stage>,
    guard: Option<BranchGuard>,
    terminal: bool,
}

impl PipelineStep {
    pub fn new(stage: Arc<dyn Stage>) -> Self {
        Self {
            stage,
            guard: None,
            terminal: false,
        }
    }

    /// Run only when `guard` holds for the merged state.
    pub fn when(mut self, guard: BranchGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Stop the cycle after this step has run.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.stage.name()
    }

    fn should_run(&self, state: &TradingState) -> bool {
        self.guard.map_or(true, |guard| guard(state))
    }
}

/// Branch predicates of the standard cycle.
pub mod branches {
    use crate::state::TradingState;

    /// Skip fetching when the caller already supplied market data.
    pub fn needs_market_data(state: &TradingState) -> bool {
        state.market_data.is_none()
    }

    pub fn not_halted(state: &TradingState) -> bool {
        !state.trading_halted
    }

    pub fn has_selected_strategy(state: &TradingState) -> bool {
        state.selected_strategy.is_some()
    }

    pub fn cleared_to_execute(state: &TradingState) -> bool {
        !state.trading_halted && state.risk_approved()
    }
}

/// The collaborators that make up the standard trading cycle.
pub struct CycleStages {
    pub market_data: Arc<dyn Stage>,
    pub pattern_recall: Arc<dyn Stage>,
    pub regime: Arc<dyn Stage>,
    pub synthesis: Arc<dyn Stage>,
    pub risk: Arc<dyn Stage>,
    pub execution: Arc<dyn Stage>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct TradingCycleOrchestrator {
    steps: Vec<PipelineStep>,
    breaker: CircuitBreaker,
}

impl TradingCycleOrchestrator {
    pub fn new(steps: Vec<PipelineStep>, breaker_threshold: u32) -> Self {
        Self {
            steps,
            breaker: CircuitBreaker::new(breaker_threshold),
        }
    }

    /// market data → pattern recall → regime → synthesis → risk → execution.
    pub fn standard(stages: CycleStages, breaker_threshold: u32) -> Self {
        let steps = vec![
            PipelineStep::new(stages.market_data).when(branches::needs_market_data),
            PipelineStep::new(stages.pattern_recall),
            PipelineStep::new(stages.regime),
            PipelineStep::new(stages.synthesis).when(branches::not_halted),
            PipelineStep::new(stages.risk).when(branches::has_selected_strategy),
            PipelineStep::new(stages.execution)
                .when(branches::cleared_to_execute)
                .terminal(),
        ];
        Self::new(steps, breaker_threshold)
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(PipelineStep::name).collect()
    }

    /// Drive one cycle to completion. Never fails: every fault ends up as
    /// data in the returned state.
    pub async fn invoke(&self, initial: TradingState) -> TradingState {
        let mut state = initial;
        info!(
            cycle_id = %state.cycle_id,
            symbol = %state.symbol,
            timeframe = %state.timeframe,
            "Starting trading cycle"
        );

        for step in &self.steps {
            let name = step.name();

            if !step.should_run(&state) {
                debug!(cycle_id = %state.cycle_id, stage = name, "Stage skipped by branch");
                state.apply(
                    StateUpdate::new()
                        .note(format!("{name} skipped"))
                        .step(StepMarker::Skipped(name.to_string())),
                );
                continue;
            }

            let update = self.protected_call(step.stage.as_ref(), &state).await;
            state.apply(update);

            if step.terminal {
                debug!(cycle_id = %state.cycle_id, stage = name, "Terminal stage reached");
                break;
            }
        }

        info!(
            cycle_id = %state.cycle_id,
            symbol = %state.symbol,
            step = %state.current_step,
            errors = state.errors.len(),
            traded = state.traded(),
            health = %self.breaker.health().status,
            "Trading cycle complete"
        );

        state
    }

    /// Build a fresh state for (symbol, timeframe) and run one cycle.
    pub async fn run_cycle(&self, symbol: &str, timeframe: Timeframe) -> TradingState {
        self.invoke(TradingState::new(symbol, timeframe)).await
    }

    /// Execute one stage with fault containment, breaker bookkeeping and
    /// fallback substitution. Always returns a partial state.
    async fn protected_call(&self, stage: &dyn Stage, state: &TradingState) -> StateUpdate {
        let name = stage.name();

        if self.breaker.is_open() {
            warn!(
                cycle_id = %state.cycle_id,
                stage = name,
                consecutive_errors = self.breaker.consecutive_faults(),
                "Circuit breaker open — stage not invoked"
            );
            return FallbackPolicy::hard_fail(name)
                .note(format!("{name} not invoked: circuit breaker open"));
        }

        let call = async { stage.run(state).await };
        let outcome = match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(StageFault::Panicked(panic_message(panic.as_ref()))),
        };

        match outcome {
            Ok(mut update) => {
                if self.breaker.record_success() {
                    info!(stage = name, "Stage recovered — error counter reset");
                }
                update
                    .current_step
                    .get_or_insert_with(|| StepMarker::Completed(name.to_string()));
                update
            }
            Err(fault) => {
                let count = self.breaker.record_fault();
                let note = ErrorNote::new(name, fault.to_string());

                if count >= self.breaker.threshold() {
                    error!(
                        cycle_id = %state.cycle_id,
                        stage = name,
                        error = %fault,
                        consecutive_errors = count,
                        threshold = self.breaker.threshold(),
                        "Circuit breaker OPEN — forcing no-trade"
                    );
                    FallbackPolicy::hard_fail(name).error(note)
                } else {
                    warn!(
                        cycle_id = %state.cycle_id,
                        stage = name,
                        error = %fault,
                        consecutive_errors = count,
                        "Stage failed — using fallback"
                    );
                    FallbackPolicy::fallback_for(name).error(note)
                }
            }
        }
    }

    /// Current breaker health. Reads only.
    pub fn health_status(&self) -> HealthStatus {
        self.breaker.health()
    }

    /// Operator action: clear the fault counter and close the breaker.
    pub fn reset_error_counters(&self) {
        let cleared = self.breaker.reset();
        info!(cleared, "Error counters reset");
    }

    pub fn is_critical(&self) -> bool {
        self.health_status().status == HealthLevel::Critical
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
