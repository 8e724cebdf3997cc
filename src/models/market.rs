use super::instrument::InstrumentSet;
use crate::store::{decode, StoreError};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialized square matrix, keyed to an instrument list.
///
/// `data` is row-major, `data.len() == n*n`. Decoding validates the shape
/// and the instrument order against the configured set, so a mismatched
/// record surfaces as `StoreError::Malformed` instead of silently shifting
/// indices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub instruments: Vec<String>,
    pub data: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_matrix(instruments: &InstrumentSet, matrix: &DMatrix<f64>) -> Self {
        let n = instruments.len();
        let mut data = Vec::with_capacity(n * n);
        for i in 0..n {
            for j in 0..n {
                data.push(matrix[(i, j)]);
            }
        }
        Self {
            instruments: instruments.symbols().to_vec(),
            data,
        }
    }

    pub fn to_matrix(&self, instruments: &InstrumentSet) -> Result<DMatrix<f64>, StoreError> {
        let n = instruments.len();
        if self.instruments.as_slice() != instruments.symbols() {
            return Err(StoreError::Malformed(format!(
                "matrix record instruments {:?} do not match configured set {:?}",
                self.instruments,
                instruments.symbols()
            )));
        }
        if self.data.len() != n * n {
            return Err(StoreError::Malformed(format!(
                "matrix record holds {} values, expected {}",
                self.data.len(),
                n * n
            )));
        }
        Ok(DMatrix::from_row_slice(n, n, &self.data))
    }
}

/// The single versioned market record: price snapshot, live covariance and
/// heartbeat written together by the market worker, so no reader can tear
/// prices from one cycle against a matrix from another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub prices: HashMap<String, f64>,
    pub covariance: MatrixRecord,
    pub heartbeat: String,
}

impl MarketRecord {
    /// Price vector in instrument-set order. Missing or non-positive prices
    /// are malformed state.
    pub fn price_vector(&self, instruments: &InstrumentSet) -> Result<DVector<f64>, StoreError> {
        let mut prices = Vec::with_capacity(instruments.len());
        for symbol in instruments.iter() {
            match self.prices.get(symbol) {
                Some(p) if *p > 0.0 && p.is_finite() => prices.push(*p),
                Some(p) => {
                    return Err(StoreError::Malformed(format!(
                        "non-positive price {p} for {symbol}"
                    )))
                }
                None => {
                    return Err(StoreError::Malformed(format!(
                        "price snapshot is missing {symbol}"
                    )))
                }
            }
        }
        Ok(DVector::from_vec(prices))
    }
}

/// Decoded, validated market snapshot handed to read-only consumers.
#[derive(Debug, Clone)]
pub struct MarketState {
    pub version: u64,
    pub prices: DVector<f64>,
    pub covariance: DMatrix<f64>,
    pub heartbeat: String,
}

impl MarketState {
    pub fn from_bytes(
        version: u64,
        bytes: &[u8],
        instruments: &InstrumentSet,
    ) -> Result<Self, StoreError> {
        let record: MarketRecord = decode(bytes)?;
        let prices = record.price_vector(instruments)?;
        let covariance = record.covariance.to_matrix(instruments)?;
        Ok(Self {
            version,
            prices,
            covariance,
            heartbeat: record.heartbeat,
        })
    }
}

/// Market data served to the display layer.
#[derive(Debug, Clone, Serialize)]
pub struct MarketData {
    pub heartbeat: String,
    pub version: u64,
    pub prices: HashMap<String, f64>,
    pub covariance: MatrixRecord,
    pub correlation: MatrixRecord,
}
