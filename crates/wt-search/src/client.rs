//! Boundary to the backtest service that scores candidates.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;

use wt_types::{ParameterCombination, PerformanceMetrics, TimePeriod};

/// Errors surfaced by a backtest client. The evaluator treats every
/// variant as transient and retries.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backtest service returned HTTP {status}")]
    Status { status: u16 },

    #[error("Malformed response body: {0}")]
    MalformedBody(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// One backtest run: the merged strategy parameters plus the evaluation
/// window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub parameters: Value,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl BacktestRequest {
    /// Merges a candidate into the base strategy parameters. Candidate
    /// fields win over base fields of the same name.
    pub fn new(base: &Value, candidate: &ParameterCombination, period: &TimePeriod) -> Self {
        let mut parameters = match base {
            Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        parameters.insert(
            "price_change_weight".to_string(),
            json!(candidate.weights.price_change),
        );
        parameters.insert("volume_weight".to_string(), json!(candidate.weights.volume));
        parameters.insert(
            "volatility_weight".to_string(),
            json!(candidate.weights.volatility),
        );
        parameters.insert(
            "funding_rate_weight".to_string(),
            json!(candidate.weights.funding_rate),
        );
        parameters.insert(
            "max_short_positions".to_string(),
            json!(candidate.max_short_positions),
        );
        if let Some(ratio) = candidate.max_single_position_ratio {
            parameters.insert("max_single_position_ratio".to_string(), json!(ratio));
        }
        parameters.insert(
            "allocation_strategy".to_string(),
            json!(candidate.allocation_strategy.as_str()),
        );

        Self {
            parameters: Value::Object(parameters),
            start_date: period.start_date,
            end_date: period.end_date,
        }
    }
}

/// Response envelope from the backtest service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Option<BacktestData>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestData {
    #[serde(default)]
    pub performance: Option<PerformanceMetrics>,
}

impl BacktestResponse {
    pub fn ok(performance: PerformanceMetrics) -> Self {
        Self {
            success: true,
            data: Some(BacktestData {
                performance: Some(performance),
            }),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// The usable performance block, if the run produced one
    pub fn performance(&self) -> Option<&PerformanceMetrics> {
        self.data.as_ref().and_then(|d| d.performance.as_ref())
    }
}

/// A backend that can execute backtests
#[async_trait]
pub trait BacktestClient: Send + Sync + std::fmt::Debug {
    async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse>;

    /// Get client name
    fn name(&self) -> &str;
}

/// HTTP client for a remote backtest service
#[derive(Debug)]
pub struct HttpBacktestClient {
    pub base_url: String,
    client: reqwest::Client,
}

impl HttpBacktestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl BacktestClient for HttpBacktestClient {
    async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse> {
        let url = format!("{}/api/backtest/run", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<BacktestResponse>()
            .await
            .map_err(|e| ClientError::MalformedBody(format!("Failed to parse JSON response: {e}")))
    }

    fn name(&self) -> &str {
        "http-backtest"
    }
}

/// In-process stand-in for the remote service.
///
/// Scores candidates with a smooth deterministic function of their
/// parameters so searches have a real optimum to converge on. Latency
/// and periodic transient failures can be injected to exercise the
/// retry and concurrency paths without a network.
#[derive(Debug)]
pub struct SyntheticBacktestClient {
    latency: Duration,
    /// every n-th call fails with a transport error; 0 disables
    fail_every: usize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SyntheticBacktestClient {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
            fail_every: 0,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_transient_failures(mut self, fail_every: usize) -> Self {
        self.fail_every = fail_every;
        self
    }

    /// Total calls issued so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in flight at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn score(request: &BacktestRequest) -> PerformanceMetrics {
        let weight = |key: &str| {
            request
                .parameters
                .get(key)
                .and_then(Value::as_f64)
                .unwrap_or(0.0)
        };
        let shorts = request
            .parameters
            .get("max_short_positions")
            .and_then(Value::as_u64)
            .unwrap_or(5) as f64;

        // single optimum at (0.5, 0.2, 0.2, 0.1) and 8 short positions
        let distance = (weight("price_change_weight") - 0.5).abs()
            + (weight("volume_weight") - 0.2).abs()
            + (weight("volatility_weight") - 0.2).abs()
            + (weight("funding_rate_weight") - 0.1).abs();
        // small window-dependent wobble keeps validation periods from
        // scoring identically
        let wobble = (request.start_date.num_days_from_ce() % 7) as f64 * 0.01;

        let sharpe = (2.2 - 2.0 * distance - 0.03 * (shorts - 8.0).abs() + wobble).max(-1.0);
        let total_return = 0.12 * sharpe;
        let max_drawdown = (0.08 + 0.1 * distance).min(0.6);

        PerformanceMetrics {
            total_return,
            max_drawdown,
            sharpe_ratio: Some(sharpe),
            calmar_ratio: Some(total_return / max_drawdown),
            volatility: Some(0.2 + 0.1 * distance),
            win_rate: Some((0.5 + 0.1 * sharpe).clamp(0.0, 1.0)),
        }
    }
}

impl Default for SyntheticBacktestClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BacktestClient for SyntheticBacktestClient {
    async fn run_backtest(&self, request: &BacktestRequest) -> ClientResult<BacktestResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let live = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(live, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_every > 0 && call % self.fail_every == 0 {
            return Err(ClientError::Transport(format!(
                "injected transient failure on call {call}"
            )));
        }

        Ok(BacktestResponse::ok(Self::score(request)))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
