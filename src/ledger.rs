//! Portfolio ledger: the sole owner of cash/holdings mutation.
//!
//! One trade is in flight at a time; the async mutex is held across the full
//! read-check-write so no other trade can observe or apply against an
//! intermediate state.

use crate::models::{AppliedTrade, HoldingsMap, InstrumentSet, PortfolioState, Side};
use crate::store::{self, keys, StateStore, StoreError};
use log::info;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Cash or holdings keys are absent: the bootstrap has not run yet.
    #[error("portfolio state is not seeded yet")]
    NotReady,

    #[error("unknown instrument {0}")]
    UnknownInstrument(String),

    #[error("insufficient funds: need ${required:.2}, cash ${available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("insufficient position: selling {requested} with only {held} held")]
    InsufficientPosition { requested: u64, held: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PortfolioLedger {
    store: Arc<dyn StateStore>,
    instruments: InstrumentSet,
    write_lock: Mutex<()>,
}

impl PortfolioLedger {
    pub fn new(store: Arc<dyn StateStore>, instruments: InstrumentSet) -> Self {
        Self {
            store,
            instruments,
            write_lock: Mutex::new(()),
        }
    }

    /// Read-only snapshot of cash and holdings, validated against the
    /// instrument set.
    pub async fn snapshot(&self) -> Result<PortfolioState, LedgerError> {
        let Some(cash_bytes) = self.store.get(keys::CASH).await? else {
            return Err(LedgerError::NotReady);
        };
        let Some(holdings_bytes) = self.store.get(keys::HOLDINGS).await? else {
            return Err(LedgerError::NotReady);
        };

        let cash: f64 = store::decode(&cash_bytes)?;
        let holdings: HoldingsMap = store::decode(&holdings_bytes)?;
        let state = PortfolioState { cash, holdings };
        state.validate(&self.instruments)?;
        Ok(state)
    }

    /// Applies one trade atomically with respect to other trades.
    ///
    /// Buy fails when the notional exceeds cash; sell fails when the
    /// quantity exceeds the position. On success cash and holdings are
    /// written back together under the lock.
    pub async fn apply_trade(
        &self,
        instrument: &str,
        side: Side,
        quantity: u64,
        price: f64,
    ) -> Result<AppliedTrade, LedgerError> {
        if !self.instruments.contains(instrument) {
            return Err(LedgerError::UnknownInstrument(instrument.to_string()));
        }

        let _guard = self.write_lock.lock().await;
        let mut state = self.snapshot().await?;
        let mut holding = state.holding(instrument);
        let notional = quantity as f64 * price;

        match side {
            Side::Buy => {
                if notional > state.cash {
                    return Err(LedgerError::InsufficientFunds {
                        required: notional,
                        available: state.cash,
                    });
                }
                let invested = holding.quantity as f64 * holding.average_cost + notional;
                holding.quantity += quantity;
                holding.average_cost = invested / holding.quantity as f64;
                state.cash -= notional;
            }
            Side::Sell => {
                if quantity > holding.quantity {
                    return Err(LedgerError::InsufficientPosition {
                        requested: quantity,
                        held: holding.quantity,
                    });
                }
                holding.quantity -= quantity;
                if holding.quantity == 0 {
                    holding.average_cost = 0.0;
                }
                state.cash += notional;
            }
        }

        state.holdings.insert(instrument.to_string(), holding);
        self.store
            .put(keys::HOLDINGS, store::encode(&state.holdings)?)
            .await?;
        self.store
            .put(keys::CASH, store::encode(&state.cash)?)
            .await?;

        info!(
            "{side} {quantity} {instrument} @ ${price:.2} committed, cash ${:.2}",
            state.cash
        );
        Ok(AppliedTrade {
            instrument: instrument.to_string(),
            side,
            quantity,
            price,
            cash_after: state.cash,
            quantity_after: holding.quantity,
            average_cost_after: holding.average_cost,
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Holding;
    use crate::store::MemoryStore;

    async fn seeded_ledger(cash: f64) -> PortfolioLedger {
        let store = Arc::new(MemoryStore::new());
        let instruments = InstrumentSet::new(vec!["AAPL".into(), "GOOG".into()]).unwrap();
        store
            .put(keys::CASH, store::encode(&cash).unwrap())
            .await
            .unwrap();
        let holdings: HoldingsMap = instruments
            .iter()
            .map(|s| (s.clone(), Holding::default()))
            .collect();
        store
            .put(keys::HOLDINGS, store::encode(&holdings).unwrap())
            .await
            .unwrap();
        PortfolioLedger::new(store, instruments)
    }

    #[tokio::test]
    async fn buy_updates_cash_and_average_cost() {
        let ledger = seeded_ledger(100_000.0).await;

        let applied = ledger.apply_trade("AAPL", Side::Buy, 100, 150.0).await.unwrap();
        assert_eq!(applied.quantity_after, 100);
        assert!((applied.cash_after - 85_000.0).abs() < 1e-9);
        assert!((applied.average_cost_after - 150.0).abs() < 1e-9);

        // Second buy at a higher price averages in.
        let applied = ledger.apply_trade("AAPL", Side::Buy, 100, 160.0).await.unwrap();
        assert_eq!(applied.quantity_after, 200);
        assert!((applied.average_cost_after - 155.0).abs() < 1e-9);
        assert!((applied.cash_after - 69_000.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn buy_beyond_cash_fails() {
        let ledger = seeded_ledger(10_000.0).await;

        let err = ledger.apply_trade("AAPL", Side::Buy, 100, 150.0).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

        // Nothing moved.
        let state = ledger.snapshot().await.unwrap();
        assert_eq!(state.cash, 10_000.0);
        assert_eq!(state.holding("AAPL").quantity, 0);
    }

    #[tokio::test]
    async fn sell_beyond_position_fails() {
        let ledger = seeded_ledger(100_000.0).await;
        ledger.apply_trade("AAPL", Side::Buy, 50, 100.0).await.unwrap();

        let err = ledger.apply_trade("AAPL", Side::Sell, 60, 100.0).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientPosition { requested: 60, held: 50 }
        ));
    }

    #[tokio::test]
    async fn round_trip_restores_cash_and_quantity() {
        let ledger = seeded_ledger(100_000.0).await;

        ledger.apply_trade("GOOG", Side::Buy, 40, 250.0).await.unwrap();
        let applied = ledger.apply_trade("GOOG", Side::Sell, 40, 250.0).await.unwrap();

        assert!((applied.cash_after - 100_000.0).abs() < 1e-9);
        assert_eq!(applied.quantity_after, 0);
        // Average cost resets once the position is fully closed.
        assert_eq!(applied.average_cost_after, 0.0);
    }

    #[tokio::test]
    async fn partial_sell_keeps_average_cost() {
        let ledger = seeded_ledger(100_000.0).await;
        ledger.apply_trade("AAPL", Side::Buy, 100, 120.0).await.unwrap();

        let applied = ledger.apply_trade("AAPL", Side::Sell, 40, 130.0).await.unwrap();
        assert_eq!(applied.quantity_after, 60);
        assert!((applied.average_cost_after - 120.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unseeded_store_is_not_ready() {
        let store = Arc::new(MemoryStore::new());
        let instruments = InstrumentSet::new(vec!["AAPL".into()]).unwrap();
        let ledger = PortfolioLedger::new(store, instruments);

        assert!(matches!(ledger.snapshot().await, Err(LedgerError::NotReady)));
        assert!(matches!(
            ledger.apply_trade("AAPL", Side::Buy, 1, 1.0).await,
            Err(LedgerError::NotReady)
        ));
    }

    #[tokio::test]
    async fn unknown_instrument_is_typed() {
        let ledger = seeded_ledger(100_000.0).await;
        assert!(matches!(
            ledger.apply_trade("TSLA", Side::Buy, 1, 1.0).await,
            Err(LedgerError::UnknownInstrument(_))
        ));
    }
}
