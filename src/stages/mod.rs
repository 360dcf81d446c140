//! Concrete pipeline stages.
//!
//! Each stage adapts one collaborator (data feed, pattern store, advisor,
//! risk manager, broker) to the [`Stage`](crate::engine::Stage) contract.
//! Stages bound their own I/O and translate collaborator errors into
//! [`StageFault`]s; degraded-but-valid outcomes are returned as `Ok`.

pub mod execution;
pub mod market_data;
pub mod patterns;
pub mod regime;
pub mod risk;
pub mod synthesis;

use std::future::Future;
use std::time::Duration;

use crate::types::StageFault;

pub use execution::{Broker, ExecutionConfig, ExecutionStage, OrderReceipt, OrderRequest};
pub use market_data::MarketDataStage;
pub use patterns::{PatternRecallConfig, PatternRecallStage};
pub use regime::RegimeStage;
pub use risk::RiskStage;
pub use synthesis::SynthesisStage;

/// Run `fut` with an upper bound, mapping collaborator errors through
/// [`classify`] and elapsed deadlines to [`StageFault::Timeout`].
pub async fn with_timeout<T, F>(operation: &str, secs: u64, fut: F) -> Result<T, StageFault>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify(operation, secs, e)),
        Err(_) => Err(StageFault::Timeout {
            operation: operation.to_string(),
            after_secs: secs,
        }),
    }
}

/// Map an `anyhow` error onto the stage fault taxonomy.
///
/// `timeout_secs` is the bound the caller ran under; a client-side HTTP
/// timeout is reported against it.
pub fn classify(operation: &str, timeout_secs: u64, err: anyhow::Error) -> StageFault {
    let http = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<reqwest::Error>());

    match http {
        Some(e) if e.is_timeout() => StageFault::Timeout {
            operation: operation.to_string(),
            after_secs: timeout_secs,
        },
        Some(e) if e.is_connect() || e.is_request() => {
            StageFault::Network(format!("{operation}: {err:#}"))
        }
        Some(e) if e.is_decode() => StageFault::MalformedResponse(format!("{operation}: {err:#}")),
        Some(e) if e.status().is_some_and(|s| s.is_server_error()) => {
            StageFault::Unavailable(format!("{operation}: {err:#}"))
        }
        _ => StageFault::Internal(anyhow::anyhow!("{operation}: {err:#}")),
    }
}
