//! # wt-search
//!
//! Black-box parameter search over short-strategy backtests for WindTunnel.
//!
//! Provides candidate generation (grid, randomized, hybrid), throttled and
//! retrying evaluation against a backtest service, randomized held-out
//! validation, and an orchestrator that drives whole searches with live
//! progress reporting.

mod cancel;
mod client;
mod crossval;
mod evaluator;
mod gate;
mod generator;
mod orchestrator;
mod progress;
mod store;

pub use cancel::CancelToken;
pub use client::{
    BacktestClient, BacktestData, BacktestRequest, BacktestResponse, ClientError, ClientResult,
    HttpBacktestClient, SyntheticBacktestClient,
};
pub use crossval::CrossValidationScorer;
pub use evaluator::{EvaluatorConfig, RetryingEvaluator};
pub use gate::{ConcurrencyGate, GatePermit};
pub use generator::{CandidateGenerator, ELITE_POOL};
pub use orchestrator::SearchOrchestrator;
pub use progress::{ProgressReporter, ProgressUpdate, ResourceUsage};
pub use store::ResultStore;
