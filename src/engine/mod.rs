//! Trade admission engine: the four operations the display layer calls.
//!
//! All market reads go through the versioned snapshot record; the engine
//! never writes market keys. Evaluation (`check_trade_impact`) is pure
//! computation over one snapshot; execution re-fetches live state and
//! re-validates before touching the ledger, because confirmation is a
//! separate user-paced step and the world may have moved in between.

use crate::ledger::{LedgerError, PortfolioLedger};
use crate::models::{
    ExecutionReport, ExecutionStatus, ImpactStatus, InstrumentSet, MarketData, MarketState,
    MatrixRecord, Side, TradeImpact, TradeProposal,
};
use crate::risk::{self, StressReport};
use crate::settings::Settings;
use crate::store::{self, keys, with_retry, StateStore, StoreError};
use log::{info, warn};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Market or portfolio state has not been bootstrapped yet. "No data",
    /// not a failure; callers render it as such.
    #[error("market or portfolio state is not seeded yet")]
    NotReady,

    #[error("unknown instrument {0}")]
    UnknownInstrument(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Per-instrument dashboard row, mark-to-market.
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentRow {
    pub symbol: String,
    pub price: f64,
    pub quantity: u64,
    pub average_cost: f64,
    pub invested: f64,
    pub market_value: f64,
    pub weight_pct: f64,
    pub daily_volatility_pct: f64,
    pub isolated_var: f64,
    pub component_var: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardMetrics {
    pub cash: f64,
    pub equity_value: f64,
    pub total_value: f64,
    pub portfolio_var: f64,
    /// Per-tick volatility scaled to a trading day (fractional).
    pub portfolio_vol_daily: f64,
    pub var_limit: f64,
    pub stress: StressReport,
    pub heartbeat: String,
    pub rows: Vec<InstrumentRow>,
}

pub struct Engine {
    store: Arc<dyn StateStore>,
    instruments: InstrumentSet,
    settings: Settings,
    ledger: PortfolioLedger,
}

impl Engine {
    pub fn new(store: Arc<dyn StateStore>, instruments: InstrumentSet, settings: Settings) -> Self {
        let ledger = PortfolioLedger::new(store.clone(), instruments.clone());
        Self {
            store,
            instruments,
            settings,
            ledger,
        }
    }

    pub fn ledger(&self) -> &PortfolioLedger {
        &self.ledger
    }

    fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.settings.store_retry_delay_ms)
    }

    /// Decoded, validated market snapshot. One versioned record, so prices
    /// and covariance are always from the same update cycle.
    async fn market_state(&self) -> Result<MarketState, EngineError> {
        let attempts = self.settings.store_retry_attempts;
        let versioned = with_retry(attempts, self.retry_delay(), || {
            self.store.get_versioned(keys::MARKET_SNAPSHOT)
        })
        .await?;
        let Some((version, bytes)) = versioned else {
            return Err(EngineError::NotReady);
        };
        Ok(MarketState::from_bytes(version, &bytes, &self.instruments)?)
    }

    async fn stressed_covariance(&self) -> Result<DMatrix<f64>, EngineError> {
        let attempts = self.settings.store_retry_attempts;
        let bytes = with_retry(attempts, self.retry_delay(), || {
            self.store.get(keys::STRESSED_MATRIX)
        })
        .await?
        .ok_or(EngineError::NotReady)?;
        let record: MatrixRecord = store::decode(&bytes)?;
        Ok(record.to_matrix(&self.instruments)?)
    }

    /// Market data for the display layer: prices, covariance, correlation,
    /// heartbeat.
    pub async fn get_market_data(&self) -> Result<MarketData, EngineError> {
        let state = self.market_state().await?;
        let prices = self
            .instruments
            .iter()
            .cloned()
            .zip(state.prices.iter().copied())
            .collect();
        Ok(MarketData {
            heartbeat: state.heartbeat,
            version: state.version,
            prices,
            covariance: MatrixRecord::from_matrix(&self.instruments, &state.covariance),
            correlation: MatrixRecord::from_matrix(
                &self.instruments,
                &risk::correlation_matrix(&state.covariance),
            ),
        })
    }

    /// Full mark-to-market view: account KPIs, per-instrument risk
    /// decomposition, and the stress check against the crisis matrix.
    pub async fn get_dashboard_metrics(&self) -> Result<DashboardMetrics, EngineError> {
        let market = self.market_state().await?;
        let book = self.ledger.snapshot().await.map_err(map_snapshot_err)?;
        let stressed = self.stressed_covariance().await?;

        let quantities = book.quantity_vector(&self.instruments);
        let market_values = quantities.component_mul(&market.prices);
        let equity_value = market_values.sum();
        let total_value = book.cash + equity_value;
        let daily_factor = (self.settings.ticks_per_day as f64).sqrt();

        let weights = if equity_value > 0.0 {
            &market_values / equity_value
        } else {
            DVector::zeros(self.instruments.len())
        };
        let estimate = risk::portfolio_var(&weights, &market.covariance, equity_value);
        let components =
            risk::component_var(&weights, &market.covariance, estimate.std, equity_value);
        let isolated = risk::isolated_var(&market.covariance, &market_values);
        let stress = risk::stress_var(&weights, &stressed, equity_value, self.settings.var_limit);
        let tick_vols = market.covariance.diagonal().map(|v| v.max(0.0).sqrt());

        let rows = self
            .instruments
            .iter()
            .enumerate()
            .map(|(i, symbol)| {
                let holding = book.holding(symbol);
                InstrumentRow {
                    symbol: symbol.clone(),
                    price: market.prices[i],
                    quantity: holding.quantity,
                    average_cost: holding.average_cost,
                    invested: holding.quantity as f64 * holding.average_cost,
                    market_value: market_values[i],
                    weight_pct: if total_value > 0.0 {
                        market_values[i] / total_value * 100.0
                    } else {
                        0.0
                    },
                    daily_volatility_pct: tick_vols[i] * daily_factor * 100.0,
                    isolated_var: isolated[i],
                    component_var: components[i],
                }
            })
            .collect();

        Ok(DashboardMetrics {
            cash: book.cash,
            equity_value,
            total_value,
            portfolio_var: estimate.dollars,
            portfolio_vol_daily: estimate.std * daily_factor,
            var_limit: self.settings.var_limit,
            stress,
            heartbeat: market.heartbeat,
            rows,
        })
    }

    /// Pure evaluation of a proposal against the current snapshot.
    ///
    /// Hard pre-conditions (funds, position) reject before any risk math.
    /// Otherwise the post-trade book is projected and gated on
    /// `post_trade_var < var_limit`. Unavailable data is an `Error` impact,
    /// not an `Err`: the display renders it, nothing crashes.
    pub async fn check_trade_impact(
        &self,
        proposal: &TradeProposal,
    ) -> Result<TradeImpact, EngineError> {
        let idx = self
            .instruments
            .index_of(&proposal.instrument)
            .ok_or_else(|| EngineError::UnknownInstrument(proposal.instrument.clone()))?;

        if proposal.quantity == 0 {
            return Ok(self.rejected(proposal, 0.0, "quantity must be positive"));
        }

        let market = match self.market_state().await {
            Ok(state) => state,
            Err(EngineError::NotReady) => {
                return Ok(self.errored(proposal, "market data unavailable"))
            }
            Err(err) => return Err(err),
        };
        let book = match self.ledger.snapshot().await {
            Ok(book) => book,
            Err(LedgerError::NotReady) => {
                return Ok(self.errored(proposal, "portfolio state unavailable"))
            }
            Err(err) => return Err(err.into()),
        };

        let price = market.prices[idx];
        let trade_value = proposal.quantity as f64 * price;

        // Hard pre-conditions, independent of any risk metric.
        if proposal.side == Side::Buy && trade_value > book.cash {
            return Ok(self.rejected(
                proposal,
                trade_value,
                format!(
                    "insufficient funds: need ${trade_value:.2}, cash ${:.2}",
                    book.cash
                ),
            ));
        }
        let held = book.holding(&proposal.instrument).quantity;
        if proposal.side == Side::Sell && proposal.quantity > held {
            return Ok(self.rejected(
                proposal,
                trade_value,
                format!(
                    "insufficient position: selling {} with only {held} held",
                    proposal.quantity
                ),
            ));
        }

        // Project the post-trade book.
        let quantities = book.quantity_vector(&self.instruments);
        let market_values = quantities.component_mul(&market.prices);
        let equity_value = market_values.sum();
        let signed_qty = match proposal.side {
            Side::Buy => proposal.quantity as f64,
            Side::Sell => -(proposal.quantity as f64),
        };
        let mut new_quantities = quantities.clone();
        new_quantities[idx] += signed_qty;
        let new_values = new_quantities.component_mul(&market.prices);
        let new_equity = new_values.sum();

        let pre_var = if equity_value > 0.0 {
            let weights = &market_values / equity_value;
            risk::portfolio_var(&weights, &market.covariance, equity_value).dollars
        } else {
            0.0
        };
        let post_trade_var = if new_equity > 0.0 {
            let new_weights = &new_values / new_equity;
            risk::portfolio_var(&new_weights, &market.covariance, new_equity).dollars
        } else {
            0.0
        };

        // Reported delta uses the constant-value formula (trade funded from
        // cash, normalizer unchanged); undefined on an all-cash book, where
        // it falls back to the plain difference.
        let incremental_var = if equity_value > 0.0 {
            let weights = &market_values / equity_value;
            let mut delta = DVector::zeros(self.instruments.len());
            delta[idx] = signed_qty * price / equity_value;
            risk::incremental_var(&weights, &delta, &market.covariance, equity_value)
        } else {
            post_trade_var - pre_var
        };

        let half_spread = self.settings.spread_bps * 1e-4;
        let liquidity_cost = risk::liquidity_cost(
            proposal.quantity as f64,
            price,
            price * (1.0 - half_spread),
            price * (1.0 + half_spread),
            self.settings.avg_daily_volume,
        );

        let limit = self.settings.var_limit;
        if post_trade_var < limit {
            info!(
                "approved {} {} {} (post-trade VaR ${post_trade_var:.2} < ${limit:.2})",
                proposal.side, proposal.quantity, proposal.instrument
            );
            Ok(TradeImpact {
                proposal_id: proposal.id,
                status: ImpactStatus::Approved,
                incremental_var,
                liquidity_cost,
                post_trade_var,
                limit,
                trade_value,
                reason: None,
            })
        } else {
            warn!(
                "rejected {} {} {}: post-trade VaR ${post_trade_var:.2} breaches limit ${limit:.2}",
                proposal.side, proposal.quantity, proposal.instrument
            );
            Ok(TradeImpact {
                proposal_id: proposal.id,
                status: ImpactStatus::Rejected,
                incremental_var,
                liquidity_cost,
                post_trade_var,
                limit,
                trade_value,
                reason: Some(format!(
                    "limit breach: post-trade VaR ${post_trade_var:.2} >= ${limit:.2}"
                )),
            })
        }
    }

    /// Applies a confirmed proposal.
    ///
    /// Live state is re-fetched and re-validated by the ledger: the approval
    /// snapshot may be stale because confirmation is user-paced. Every
    /// re-validation failure is a `Failed` report, never a panic.
    pub async fn execute_trade(
        &self,
        proposal: &TradeProposal,
    ) -> Result<ExecutionReport, EngineError> {
        let idx = self
            .instruments
            .index_of(&proposal.instrument)
            .ok_or_else(|| EngineError::UnknownInstrument(proposal.instrument.clone()))?;

        if proposal.quantity == 0 {
            return Ok(self.failed(proposal, "quantity must be positive"));
        }

        let market = match self.market_state().await {
            Ok(state) => state,
            Err(EngineError::NotReady) => {
                return Ok(self.failed(proposal, "market data unavailable"))
            }
            Err(err) => return Err(err),
        };
        let price = market.prices[idx];

        match self
            .ledger
            .apply_trade(&proposal.instrument, proposal.side, proposal.quantity, price)
            .await
        {
            Ok(fill) => Ok(ExecutionReport {
                proposal_id: proposal.id,
                status: ExecutionStatus::Committed,
                reason: None,
                fill: Some(fill),
            }),
            Err(
                err @ (LedgerError::NotReady
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::InsufficientPosition { .. }),
            ) => {
                warn!("execution failed for {}: {err}", proposal.instrument);
                Ok(self.failed(proposal, err.to_string()))
            }
            Err(LedgerError::UnknownInstrument(symbol)) => {
                Err(EngineError::UnknownInstrument(symbol))
            }
            Err(LedgerError::Store(err @ StoreError::Unavailable(_))) => {
                warn!("execution aborted, store unavailable: {err}");
                Ok(self.failed(proposal, err.to_string()))
            }
            Err(LedgerError::Store(err)) => Err(err.into()),
        }
    }

    fn rejected(
        &self,
        proposal: &TradeProposal,
        trade_value: f64,
        reason: impl Into<String>,
    ) -> TradeImpact {
        let reason = reason.into();
        warn!(
            "rejected {} {} {}: {reason}",
            proposal.side, proposal.quantity, proposal.instrument
        );
        TradeImpact {
            proposal_id: proposal.id,
            status: ImpactStatus::Rejected,
            incremental_var: 0.0,
            liquidity_cost: 0.0,
            post_trade_var: 0.0,
            limit: self.settings.var_limit,
            trade_value,
            reason: Some(reason),
        }
    }

    fn errored(&self, proposal: &TradeProposal, reason: impl Into<String>) -> TradeImpact {
        TradeImpact {
            proposal_id: proposal.id,
            status: ImpactStatus::Error,
            incremental_var: 0.0,
            liquidity_cost: 0.0,
            post_trade_var: 0.0,
            limit: self.settings.var_limit,
            trade_value: 0.0,
            reason: Some(reason.into()),
        }
    }

    fn failed(&self, proposal: &TradeProposal, reason: impl Into<String>) -> ExecutionReport {
        ExecutionReport {
            proposal_id: proposal.id,
            status: ExecutionStatus::Failed,
            reason: Some(reason.into()),
            fill: None,
        }
    }
}

fn map_snapshot_err(err: LedgerError) -> EngineError {
    match err {
        LedgerError::NotReady => EngineError::NotReady,
        other => EngineError::Ledger(other),
    }
}
