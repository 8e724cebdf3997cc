//! Once-only synthetic seeding of the store.
//!
//! Stands in for the external historical-data bootstrap job and honors the
//! same contract: both covariance matrices, the price snapshot, cash and
//! flat holdings are written exactly once, with the cash key doubling as the
//! "already bootstrapped" marker (it is written last).

use crate::models::{Holding, HoldingsMap, InstrumentSet, MarketRecord, MatrixRecord};
use crate::settings::Settings;
use crate::store::{self, keys, StateStore, StoreError};
use chrono::Utc;
use log::info;
use nalgebra::DMatrix;
use std::collections::HashMap;

/// Seeds market and portfolio state unless the store is already
/// bootstrapped. Returns whether seeding happened.
///
/// The current covariance starts as a diagonal per-tick matrix (σ² on the
/// diagonal, trivially PSD); the stressed matrix is a configured multiple of
/// it, standing in for the historical-crisis estimate.
pub async fn ensure_seeded(
    store: &dyn StateStore,
    instruments: &InstrumentSet,
    settings: &Settings,
) -> Result<bool, StoreError> {
    if store.get(keys::CASH).await?.is_some() {
        return Ok(false);
    }

    let n = instruments.len();
    let variance = settings.tick_volatility * settings.tick_volatility;
    let current = DMatrix::identity(n, n) * variance;
    let stressed = &current * settings.stress_multiplier;

    let prices: HashMap<String, f64> = instruments
        .iter()
        .map(|s| (s.clone(), settings.start_price))
        .collect();
    let record = MarketRecord {
        prices,
        covariance: MatrixRecord::from_matrix(instruments, &current),
        heartbeat: Utc::now().to_rfc3339(),
    };
    store
        .put_if_version(keys::MARKET_SNAPSHOT, 0, store::encode(&record)?)
        .await?;

    store
        .put(
            keys::STRESSED_MATRIX,
            store::encode(&MatrixRecord::from_matrix(instruments, &stressed))?,
        )
        .await?;

    let holdings: HoldingsMap = instruments
        .iter()
        .map(|s| (s.clone(), Holding::default()))
        .collect();
    store.put(keys::HOLDINGS, store::encode(&holdings)?).await?;
    store
        .put(keys::INSTRUMENTS, store::encode(&instruments.symbols().to_vec())?)
        .await?;

    // Written last: its existence marks the bootstrap as complete.
    store.put(keys::CASH, store::encode(&settings.initial_cash)?).await?;

    info!(
        "seeded {} instruments at ${:.2} with ${:.0} cash",
        n, settings.start_price, settings.initial_cash
    );
    Ok(true)
}
