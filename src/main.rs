use anyhow::Result;
use clap::Parser;
use log::{error, info};
use risk_desk::args::Args;
use risk_desk::bootstrap;
use risk_desk::engine::{Engine, EngineError};
use risk_desk::market::{MarketModel, MarketWorker};
use risk_desk::models::InstrumentSet;
use risk_desk::settings::Settings;
use risk_desk::store::{MemoryStore, StateStore};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;
    let instruments = InstrumentSet::new(settings.instruments.clone())?;
    info!(
        "risk-desk starting: {} instruments, VaR limit ${:.0}",
        instruments.len(),
        settings.var_limit
    );

    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    if bootstrap::ensure_seeded(store.as_ref(), &instruments, &settings).await? {
        info!("store seeded with initial market and portfolio state");
    }

    let model = MarketModel::new(settings.tick_volatility, settings.ewma_decay)?;
    let worker = MarketWorker::new(store.clone(), instruments.clone(), model, &settings);
    tokio::spawn(worker.run());

    let engine = Engine::new(store, instruments, settings);
    let mut report = tokio::time::interval(Duration::from_millis(args.report_interval_ms.max(1)));
    loop {
        report.tick().await;
        match engine.get_dashboard_metrics().await {
            Ok(metrics) => {
                info!(
                    "NAV ${:.0} (cash ${:.0}) | VaR ${:.2} / ${:.0} | daily vol {:.2}% | stress ${:.2}{}",
                    metrics.total_value,
                    metrics.cash,
                    metrics.portfolio_var,
                    metrics.var_limit,
                    metrics.portfolio_vol_daily * 100.0,
                    metrics.stress.stressed_var,
                    if metrics.stress.breach { " BREACH" } else { "" }
                );
            }
            Err(EngineError::NotReady) => info!("waiting for market data"),
            Err(err) => error!("dashboard metrics failed: {err}"),
        }
    }
}
