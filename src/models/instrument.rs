use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("instrument set must not be empty")]
    Empty,

    #[error("duplicate instrument symbol {0}")]
    Duplicate(String),
}

/// Ordered, fixed list of instrument symbols.
///
/// The position of a symbol in this set defines its index in every price
/// vector and covariance matrix in the system. Immutable after construction;
/// built once at startup and passed explicitly into each component.
#[derive(Debug, Clone)]
pub struct InstrumentSet {
    symbols: Vec<String>,
    index: HashMap<String, usize>,
}

impl InstrumentSet {
    pub fn new(symbols: Vec<String>) -> Result<Self, InstrumentError> {
        if symbols.is_empty() {
            return Err(InstrumentError::Empty);
        }
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            if index.insert(symbol.clone(), i).is_some() {
                return Err(InstrumentError::Duplicate(symbol.clone()));
            }
        }
        Ok(Self { symbols, index })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.index.contains_key(symbol)
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.symbols.iter()
    }
}
