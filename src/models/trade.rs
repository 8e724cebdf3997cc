use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A trade the user wants checked and, after confirmation, executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeProposal {
    pub id: Uuid,
    pub instrument: String,
    pub side: Side,
    pub quantity: u64,
}

impl TradeProposal {
    pub fn new(instrument: impl Into<String>, side: Side, quantity: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            instrument: instrument.into(),
            side,
            quantity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImpactStatus {
    Approved,
    Rejected,
    Error,
}

/// Outcome of the admission check. Computed, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TradeImpact {
    pub proposal_id: Uuid,
    pub status: ImpactStatus,
    pub incremental_var: f64,
    pub liquidity_cost: f64,
    pub post_trade_var: f64,
    pub limit: f64,
    pub trade_value: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionStatus {
    Committed,
    Failed,
}

/// Outcome of an execution attempt. Re-validation failures come back as
/// `Failed` with a reason; they are expected when the world moved between
/// check and confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub proposal_id: Uuid,
    pub status: ExecutionStatus,
    pub reason: Option<String>,
    pub fill: Option<AppliedTrade>,
}

/// A committed trade as the ledger applied it.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedTrade {
    pub instrument: String,
    pub side: Side,
    pub quantity: u64,
    pub price: f64,
    pub cash_after: f64,
    pub quantity_after: u64,
    pub average_cost_after: f64,
    pub timestamp: i64,
}
