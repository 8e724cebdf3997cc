use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Service configuration. Defaults describe the demo book; any field can be
/// overridden from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Symbols of the book, in index order.
    pub instruments: Vec<String>,
    /// Starting cash written by the seeder.
    pub initial_cash: f64,
    /// Dollar ceiling on portfolio VaR.
    pub var_limit: f64,
    /// EWMA decay factor λ.
    pub ewma_decay: f64,
    /// Per-tick lognormal shock standard deviation.
    pub tick_volatility: f64,
    /// Market update cadence.
    pub tick_interval_ms: u64,
    /// Backoff for the worker while waiting for seed data or after a
    /// failed cycle.
    pub seed_backoff_ms: u64,
    /// Ticks per trading day, for daily volatility scaling.
    pub ticks_per_day: u32,
    /// Full synthetic bid/ask spread around the snapshot price, in bps.
    pub spread_bps: f64,
    /// Average daily volume assumed for the impact model.
    pub avg_daily_volume: f64,
    /// Seed price for every instrument.
    pub start_price: f64,
    /// Stressed covariance = current seed covariance times this factor.
    pub stress_multiplier: f64,
    /// Store retry policy on request paths.
    pub store_retry_attempts: u32,
    pub store_retry_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instruments: vec![
                "AAPL".to_string(),
                "GOOG".to_string(),
                "MSFT".to_string(),
                "AMZN".to_string(),
                "TSLA".to_string(),
            ],
            initial_cash: 1_000_000.0,
            // 0.5% of starting capital.
            var_limit: 5_000.0,
            ewma_decay: 0.94,
            tick_volatility: 0.002,
            tick_interval_ms: 2_000,
            seed_backoff_ms: 5_000,
            ticks_per_day: 390,
            spread_bps: 2.0,
            avg_daily_volume: 10_000_000.0,
            start_price: 150.0,
            stress_multiplier: 25.0,
            store_retry_attempts: 3,
            store_retry_delay_ms: 100,
        }
    }
}

impl Settings {
    /// Defaults overlaid with an optional TOML file.
    pub fn load(path: &str) -> Result<Self, SettingsError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(path).required(false))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.instruments.is_empty() {
            return Err(SettingsError::Validation("instruments must not be empty".into()));
        }
        if !(self.ewma_decay > 0.0 && self.ewma_decay <= 1.0) {
            return Err(SettingsError::Validation(format!(
                "ewma_decay must lie in (0, 1], got {}",
                self.ewma_decay
            )));
        }
        if !(self.tick_volatility > 0.0 && self.tick_volatility.is_finite()) {
            return Err(SettingsError::Validation(format!(
                "tick_volatility must be positive, got {}",
                self.tick_volatility
            )));
        }
        if self.var_limit <= 0.0 {
            return Err(SettingsError::Validation(format!(
                "var_limit must be positive, got {}",
                self.var_limit
            )));
        }
        if self.initial_cash < 0.0 {
            return Err(SettingsError::Validation("initial_cash must not be negative".into()));
        }
        if self.start_price <= 0.0 {
            return Err(SettingsError::Validation(format!(
                "start_price must be positive, got {}",
                self.start_price
            )));
        }
        if self.spread_bps < 0.0 {
            return Err(SettingsError::Validation("spread_bps must not be negative".into()));
        }
        if self.ticks_per_day == 0 {
            return Err(SettingsError::Validation("ticks_per_day must be positive".into()));
        }
        if self.stress_multiplier < 1.0 {
            return Err(SettingsError::Validation(format!(
                "stress_multiplier must be at least 1, got {}",
                self.stress_multiplier
            )));
        }
        Ok(())
    }
}
