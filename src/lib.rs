//! Meridian - inference routing and workflow orchestration engine
//!
//! This library accepts generic text-generation requests, selects one of several
//! heterogeneous LLM backends according to a per-scenario policy, executes the call
//! with retry, and records cost, latency and success telemetry. A workflow
//! orchestrator composes such calls with retrieval, compression and tool steps.

pub mod agent;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod health;
pub mod history;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod routing;
pub mod security;
pub mod workflow;
