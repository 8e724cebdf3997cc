pub mod instrument;
pub mod market;
pub mod portfolio;
pub mod trade;

pub use instrument::{InstrumentError, InstrumentSet};
pub use market::{MarketData, MarketRecord, MarketState, MatrixRecord};
pub use portfolio::{Holding, HoldingsMap, PortfolioState};
pub use trade::{
    AppliedTrade, ExecutionReport, ExecutionStatus, ImpactStatus, Side, TradeImpact, TradeProposal,
};

#[cfg(test)]
mod tests;
