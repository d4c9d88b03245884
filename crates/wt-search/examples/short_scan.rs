use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use wt_search::{
    BacktestClient, HttpBacktestClient, ProgressReporter, SearchOrchestrator,
    SyntheticBacktestClient,
};
use wt_types::{
    CrossValidationConfig, Objective, ParameterSpace, RatioBounds, SearchConfig, SearchMethod,
    TaskExport, TimePeriod, WindowLength,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("🔎 WindTunnel short-strategy parameter scan");

    // point WINDTUNNEL_BACKTEST_URL at a real service to score candidates
    // remotely; without it the synthetic client stands in
    let client: Arc<dyn BacktestClient> = match std::env::var("WINDTUNNEL_BACKTEST_URL") {
        Ok(url) => {
            println!("Scoring against the backtest service at {url}");
            Arc::new(HttpBacktestClient::new(url))
        }
        Err(_) => {
            println!("WINDTUNNEL_BACKTEST_URL not set, using the synthetic client");
            Arc::new(SyntheticBacktestClient::new().with_latency(Duration::from_millis(25)))
        }
    };

    let space = ParameterSpace::default().with_position_ratio(RatioBounds::new(0.1, 0.3, 0.05));

    let training = TimePeriod::new(date(2024, 1, 1), date(2024, 3, 31), "training");
    let cross_validation = CrossValidationConfig::new(
        3,
        WindowLength::Random {
            min_days: 20,
            max_days: 45,
        },
        date(2023, 1, 1),
        date(2023, 12, 31),
    );
    let config = SearchConfig::new(SearchMethod::Hybrid, Objective::Sharpe, training)
        .with_max_iterations(40)
        .with_time_limit(300)
        .with_top_k(5)
        .with_base_parameters(serde_json::json!({
            "initial_capital": 100_000.0,
            "fee_rate": 0.0006,
        }))
        .with_cross_validation(cross_validation);

    let (reporter, mut updates) = ProgressReporter::channel();
    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            let best = update
                .current_best
                .as_ref()
                .map(|b| format!("{:.4}", b.objective_value))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  [{:>3}/{:>3}] best objective {best}, {} evaluations in flight",
                update.current_iteration, update.total_iterations, update.resource_usage.in_flight
            );
        }
    });

    let orchestrator = SearchOrchestrator::new(client).with_gate_capacity(3);
    let task = orchestrator.run(config, space, reporter).await;
    printer.await?;

    println!("\nSearch {} with status {:?}", task.id, task.status);
    println!("Top candidates:");
    for (rank, result) in task.results.iter().enumerate() {
        let c = &result.combination;
        println!(
            "  #{} objective {:.4}  weights [{:.2} {:.2} {:.2} {:.2}]  shorts {}  {}",
            rank + 1,
            result.objective_value,
            c.weights.price_change,
            c.weights.volume,
            c.weights.volatility,
            c.weights.funding_rate,
            c.max_short_positions,
            c.allocation_strategy,
        );
        if let Some(cv) = &result.cross_validation {
            println!(
                "     training {:.4}, {} validation windows, stability {:.3}",
                cv.training.objective_value,
                cv.validation.len(),
                cv.consistency.stability_score,
            );
        }
    }

    let json = TaskExport::from_task(&task).to_json()?;
    std::fs::write("short_scan_results.json", &json)?;
    println!("\nExported the leaderboard to short_scan_results.json");

    Ok(())
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid calendar date")
}
