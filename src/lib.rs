//! TRADECYCLE: circuit-breaking trading cycle orchestrator
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod state;
pub mod engine;
pub mod data;
pub mod memory;
pub mod llm;
pub mod strategy;
pub mod stages;
pub mod storage;
pub mod dashboard;
