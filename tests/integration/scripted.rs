//! Scripted collaborators for integration testing.
//!
//! Provides deterministic `Stage` and `MarketDataSource` implementations
//! whose behaviour is fully controllable from test code, with call
//! counters so tests can assert what was (and was not) invoked.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tradecycle::data::MarketDataSource;
use tradecycle::engine::Stage;
use tradecycle::state::{StateUpdate, TradingState};
use tradecycle::types::{Candle, StageFault, Timeframe};

/// What a scripted stage does when invoked.
#[derive(Debug, Clone)]
pub enum Script {
    Succeed(StateUpdate),
    Fail(String),
    Panic(String),
}

/// A stage that follows a script and counts its invocations.
pub struct ScriptedStage {
    name: &'static str,
    script: Mutex<Script>,
    calls: AtomicUsize,
}

impl ScriptedStage {
    pub fn new(name: &'static str, script: Script) -> Arc<Self> {
        Arc::new(Self {
            name,
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(name: &'static str) -> Arc<Self> {
        Self::new(name, Script::Succeed(StateUpdate::new()))
    }

    pub fn failing(name: &'static str, message: &str) -> Arc<Self> {
        Self::new(name, Script::Fail(message.to_string()))
    }

    /// Change behaviour for subsequent calls.
    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, _state: &TradingState) -> Result<StateUpdate, StageFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.lock().unwrap().clone();
        // Yield so concurrent cycles interleave.
        tokio::task::yield_now().await;
        match script {
            Script::Succeed(update) => Ok(update),
            Script::Fail(message) => Err(StageFault::Network(message)),
            Script::Panic(message) => panic!("{message}"),
        }
    }
}

/// A candle feed returning a steady uptrend, or a forced error.
pub struct ScriptedFeed {
    candles: usize,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn uptrend(candles: usize) -> Arc<Self> {
        Arc::new(Self {
            candles,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `n` bars stepping up 0.1 each from 100.0, every bar 0.2 high-to-low.
    pub fn uptrend_candles(n: usize) -> Vec<Candle> {
        let start = Utc::now() - Duration::hours(n as i64);
        (0..n)
            .map(|i| {
                let open = Decimal::new(1000 + i as i64, 1);
                let close = open + Decimal::new(1, 1);
                Candle {
                    open_time: start + Duration::hours(i as i64),
                    open,
                    high: close + Decimal::new(5, 2),
                    low: open - Decimal::new(5, 2),
                    close,
                    volume: Decimal::new(10, 0),
                }
            })
            .collect()
    }
}

#[async_trait]
impl MarketDataSource for ScriptedFeed {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        _limit: u32,
    ) -> Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("exchange unreachable"));
        }
        Ok(Self::uptrend_candles(self.candles))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
