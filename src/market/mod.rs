//! Synthetic market: lognormal price ticks and the EWMA covariance estimate,
//! plus the background worker that owns all market-state writes.

use crate::models::{InstrumentSet, MarketRecord, MarketState, MatrixRecord};
use crate::settings::Settings;
use crate::store::{self, keys, StateStore, StoreError};
use chrono::Utc;
use log::{error, info, warn};
use nalgebra::{DMatrix, DVector};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("tick volatility must be a positive finite number, got {0}")]
    InvalidVolatility(f64),

    #[error("EWMA decay must lie in (0, 1], got {0}")]
    InvalidDecay(f64),
}

/// Price tick generator and covariance updater.
///
/// Ticks are independent multiplicative lognormal shocks, `p * exp(N(0, σ))`,
/// so prices stay strictly positive by construction.
pub struct MarketModel {
    decay: f64,
    shock: Normal<f64>,
    rng: SmallRng,
}

impl MarketModel {
    pub fn new(tick_volatility: f64, decay: f64) -> Result<Self, MarketError> {
        Self::build(tick_volatility, decay, SmallRng::from_entropy())
    }

    /// Deterministic variant for tests.
    pub fn with_seed(tick_volatility: f64, decay: f64, seed: u64) -> Result<Self, MarketError> {
        Self::build(tick_volatility, decay, SmallRng::seed_from_u64(seed))
    }

    fn build(tick_volatility: f64, decay: f64, rng: SmallRng) -> Result<Self, MarketError> {
        if !(tick_volatility.is_finite() && tick_volatility > 0.0) {
            return Err(MarketError::InvalidVolatility(tick_volatility));
        }
        if !(decay > 0.0 && decay <= 1.0) {
            return Err(MarketError::InvalidDecay(decay));
        }
        let shock = Normal::new(0.0, tick_volatility)
            .map_err(|_| MarketError::InvalidVolatility(tick_volatility))?;
        Ok(Self { decay, shock, rng })
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }

    pub fn next_tick(&mut self, prices: &DVector<f64>) -> DVector<f64> {
        prices.map(|p| p * self.shock.sample(&mut self.rng).exp())
    }

    pub fn log_returns(old: &DVector<f64>, new: &DVector<f64>) -> DVector<f64> {
        new.zip_map(old, |n, o| (n / o).ln())
    }

    /// EWMA recursion: `Σ_new = λ Σ_old + (1 - λ) r r'`.
    ///
    /// A convex combination of a PSD matrix and an outer product, so PSD is
    /// preserved by construction. Keep it exact; no approximation may
    /// replace this form.
    pub fn update_covariance(
        old: &DMatrix<f64>,
        returns: &DVector<f64>,
        decay: f64,
    ) -> DMatrix<f64> {
        let shock = returns * returns.transpose();
        old * decay + shock * (1.0 - decay)
    }
}

struct WorkerState {
    version: u64,
    prices: DVector<f64>,
    covariance: DMatrix<f64>,
}

/// Background task owning all writes to the market record.
///
/// Single writer: every other context reads immutable snapshots through the
/// engine. Each cycle commits prices + covariance + heartbeat as one
/// versioned record via compare-and-swap, mirrors the heartbeat to its
/// standalone key, and clears the error key. Failures are written to the
/// error key and retried after a fixed backoff; the loop never terminates
/// on a transient error.
pub struct MarketWorker {
    store: Arc<dyn StateStore>,
    instruments: InstrumentSet,
    model: MarketModel,
    tick_interval: Duration,
    backoff: Duration,
}

impl MarketWorker {
    pub fn new(
        store: Arc<dyn StateStore>,
        instruments: InstrumentSet,
        model: MarketModel,
        settings: &Settings,
    ) -> Self {
        Self {
            store,
            instruments,
            model,
            tick_interval: Duration::from_millis(settings.tick_interval_ms),
            backoff: Duration::from_millis(settings.seed_backoff_ms),
        }
    }

    pub async fn run(mut self) {
        let mut state = self.wait_for_seed().await;
        self.set_status("streaming").await;
        info!(
            "market worker streaming {} instruments every {:?}",
            self.instruments.len(),
            self.tick_interval
        );

        loop {
            match self.cycle(&mut state).await {
                Ok(()) => tokio::time::sleep(self.tick_interval).await,
                Err(err) => {
                    error!("market update cycle failed: {err}");
                    self.record_error(&format!("update cycle failed: {err}")).await;
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }

    /// Blocks until the bootstrap collaborator has seeded the market record,
    /// checking at a fixed backoff. Missing data is "not ready", not an
    /// error; store failures are recorded and retried.
    async fn wait_for_seed(&self) -> WorkerState {
        loop {
            match self.load_state().await {
                Ok(Some(state)) => return state,
                Ok(None) => {
                    self.set_status("waiting for seed data").await;
                    info!("market record not seeded yet; retrying in {:?}", self.backoff);
                }
                Err(err) => {
                    error!("failed to load market record: {err}");
                    self.record_error(&format!("init failed: {err}")).await;
                }
            }
            tokio::time::sleep(self.backoff).await;
        }
    }

    async fn load_state(&self) -> Result<Option<WorkerState>, StoreError> {
        let Some((version, bytes)) = self.store.get_versioned(keys::MARKET_SNAPSHOT).await? else {
            return Ok(None);
        };
        let decoded = MarketState::from_bytes(version, &bytes, &self.instruments)?;
        Ok(Some(WorkerState {
            version,
            prices: decoded.prices,
            covariance: decoded.covariance,
        }))
    }

    async fn cycle(&mut self, state: &mut WorkerState) -> Result<(), StoreError> {
        let new_prices = self.model.next_tick(&state.prices);
        let returns = MarketModel::log_returns(&state.prices, &new_prices);
        let new_covariance =
            MarketModel::update_covariance(&state.covariance, &returns, self.model.decay());

        let heartbeat = Utc::now().to_rfc3339();
        let prices: HashMap<String, f64> = self
            .instruments
            .iter()
            .cloned()
            .zip(new_prices.iter().copied())
            .collect();
        let record = MarketRecord {
            prices,
            covariance: MatrixRecord::from_matrix(&self.instruments, &new_covariance),
            heartbeat: heartbeat.clone(),
        };

        let committed = self
            .store
            .put_if_version(keys::MARKET_SNAPSHOT, state.version, store::encode(&record)?)
            .await?;
        if !committed {
            // Another writer touched our record. Should not happen under
            // single-writer ownership; reload rather than clobber.
            warn!("market record version moved underneath the worker; reloading");
            if let Some(fresh) = self.load_state().await? {
                *state = fresh;
            }
            return Ok(());
        }

        state.version += 1;
        state.prices = new_prices;
        state.covariance = new_covariance;

        self.store
            .put(keys::HEARTBEAT, store::encode(&heartbeat)?)
            .await?;
        self.store.delete(keys::ERROR).await?;
        Ok(())
    }

    /// Best-effort: status/error signals must never take the loop down.
    async fn set_status(&self, status: &str) {
        let Ok(bytes) = store::encode(&status) else { return };
        if let Err(err) = self.store.put(keys::STATUS, bytes).await {
            warn!("failed to write status signal: {err}");
        }
    }

    async fn record_error(&self, message: &str) {
        let Ok(bytes) = store::encode(&message) else { return };
        if let Err(err) = self.store.put(keys::ERROR, bytes).await {
            warn!("failed to write error signal: {err}");
        }
    }
}
