//! Trade execution stage.
//!
//! Sends the approved strategy to a broker. In dry-run mode nothing leaves
//! the process: the order is logged and a `dry-run-<uuid>` receipt is
//! recorded instead. Live mode without a broker is a degraded no-trade,
//! not a fault; broker errors are faults.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::with_timeout;
use crate::engine::{Stage, StageKind};
use crate::state::{StateUpdate, TradingState};
use crate::types::{Direction, ExecutionResult, StageFault};

// ---------------------------------------------------------------------------
// Broker seam
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub size: Decimal,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub order_id: String,
    pub fill_price: Decimal,
}

/// Abstraction over order-routing venues.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Broker: Send + Sync {
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderReceipt>;

    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub dry_run: bool,
    pub timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            timeout_secs: 10,
        }
    }
}

pub struct ExecutionStage {
    broker: Option<Arc<dyn Broker>>,
    config: ExecutionConfig,
}

impl ExecutionStage {
    pub fn new(broker: Option<Arc<dyn Broker>>, config: ExecutionConfig) -> Self {
        Self { broker, config }
    }

    fn no_trade(note: &str) -> StateUpdate {
        StateUpdate {
            execution: Some(ExecutionResult::not_executed(note)),
            ..Default::default()
        }
        .note(note)
    }
}

#[async_trait]
impl Stage for ExecutionStage {
    fn name(&self) -> &'static str {
        StageKind::Execution.as_str()
    }

    async fn run(&self, state: &TradingState) -> Result<StateUpdate, StageFault> {
        if state.trading_halted {
            return Ok(Self::no_trade("trading halted"));
        }
        let (Some(strategy), Some(risk)) = (state.selected_strategy.as_ref(), state.risk.as_ref())
        else {
            return Ok(Self::no_trade("nothing to execute"));
        };
        if !risk.approved {
            return Ok(Self::no_trade("risk not approved"));
        }

        let order = OrderRequest {
            symbol: state.symbol.clone(),
            direction: strategy.direction,
            size: risk.position_size,
            entry: strategy.entry,
            stop_loss: strategy.stop_loss,
            take_profit: strategy.take_profit,
        };

        if self.config.dry_run {
            info!(
                symbol = %order.symbol,
                direction = %order.direction,
                size = %order.size,
                entry = %order.entry,
                stop = %order.stop_loss,
                target = %order.take_profit,
                "[DRY RUN] Would place order"
            );
            return Ok(StateUpdate {
                execution: Some(ExecutionResult {
                    executed: true,
                    order_id: Some(format!("dry-run-{}", Uuid::new_v4())),
                    direction: Some(order.direction),
                    size: order.size,
                    fill_price: Some(order.entry),
                    dry_run: true,
                    note: "dry run".to_string(),
                    timestamp: Utc::now(),
                }),
                ..Default::default()
            });
        }

        let Some(broker) = self.broker.as_ref() else {
            warn!(symbol = %order.symbol, "Live mode but no broker configured");
            return Ok(Self::no_trade("no broker configured"));
        };

        let receipt = with_timeout(
            "place order",
            self.config.timeout_secs,
            broker.place_order(&order),
        )
        .await?;

        info!(
            symbol = %order.symbol,
            broker = broker.name(),
            order_id = %receipt.order_id,
            direction = %order.direction,
            size = %order.size,
            fill = %receipt.fill_price,
            "Order placed"
        );
        Ok(StateUpdate {
            execution: Some(ExecutionResult {
                executed: true,
                order_id: Some(receipt.order_id),
                direction: Some(order.direction),
                size: order.size,
                fill_price: Some(receipt.fill_price),
                dry_run: false,
                note: format!("placed via {}", broker.name()),
                timestamp: Utc::now(),
            }),
            ..Default::default()
        })
    }
}
