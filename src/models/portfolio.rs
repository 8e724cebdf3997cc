use super::instrument::InstrumentSet;
use crate::store::StoreError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One position. `average_cost` is meaningful only while `quantity > 0`;
/// it resets to 0 when the position is fully closed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Holding {
    pub quantity: u64,
    pub average_cost: f64,
}

pub type HoldingsMap = HashMap<String, Holding>;

/// Snapshot of the book: cash plus per-instrument holdings.
///
/// Read-only everywhere except the ledger, which is the sole mutator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub holdings: HoldingsMap,
}

impl PortfolioState {
    pub fn holding(&self, symbol: &str) -> Holding {
        self.holdings.get(symbol).copied().unwrap_or_default()
    }

    /// Quantities in instrument-set order, as floats for the risk math.
    pub fn quantity_vector(&self, instruments: &InstrumentSet) -> DVector<f64> {
        DVector::from_iterator(
            instruments.len(),
            instruments.iter().map(|s| self.holding(s).quantity as f64),
        )
    }

    /// Holdings naming an instrument outside the configured set indicate a
    /// consistency bug upstream.
    pub fn validate(&self, instruments: &InstrumentSet) -> Result<(), StoreError> {
        for symbol in self.holdings.keys() {
            if !instruments.contains(symbol) {
                return Err(StoreError::Malformed(format!(
                    "holdings name unknown instrument {symbol}"
                )));
            }
        }
        Ok(())
    }
}
