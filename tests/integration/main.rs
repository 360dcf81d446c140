//! Integration test harness.

mod pipeline;
mod scripted;
