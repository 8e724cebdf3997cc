//! Pure, stateless risk metrics over a weights vector and a covariance
//! matrix. No component here reads the store or holds state; everything is
//! a function of its arguments.

use nalgebra::{DMatrix, DVector};
use serde::Serialize;

/// One-sided z-score for 95% confidence.
pub const CONFIDENCE_Z: f64 = 1.65;

/// Square-root-law market impact constant; conservative default for liquid
/// US equities.
pub const MARKET_IMPACT_K: f64 = 0.1;

/// Flat impact penalty applied when no volume data is available, as a
/// fraction of trade notional.
pub const NO_VOLUME_PENALTY: f64 = 0.05;

#[derive(Debug, Clone, Copy)]
pub struct VarEstimate {
    /// Dollar VaR at `CONFIDENCE_Z`.
    pub dollars: f64,
    /// Per-tick portfolio standard deviation (fractional).
    pub std: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StressReport {
    pub stressed_var: f64,
    pub breach: bool,
    pub limit: f64,
}

/// Portfolio VaR: `z * V * sqrt(w' Σ w)`.
///
/// The quadratic form is clamped at zero before the square root; floating
/// round-off on a near-singular matrix can push it slightly negative.
pub fn portfolio_var(
    weights: &DVector<f64>,
    covariance: &DMatrix<f64>,
    portfolio_value: f64,
) -> VarEstimate {
    let variance = weights.dot(&(covariance * weights)).max(0.0);
    let std = variance.sqrt();
    VarEstimate {
        dollars: std * CONFIDENCE_Z * portfolio_value,
        std,
    }
}

/// Marginal VaR per instrument: `(Σ w) / std * z`.
///
/// Reads as "how much portfolio VaR rises per extra dollar in asset i".
/// Returns the zero vector for a flat book (`std == 0`).
pub fn marginal_var(
    weights: &DVector<f64>,
    covariance: &DMatrix<f64>,
    portfolio_std: f64,
) -> DVector<f64> {
    if portfolio_std == 0.0 {
        return DVector::zeros(weights.len());
    }
    (covariance * weights) / portfolio_std * CONFIDENCE_Z
}

/// Exact VaR change from a discrete trade, holding portfolio value constant.
///
/// The constant `V` models a trade funded by reallocating between cash and
/// a single position rather than external leverage: weights shift, the value
/// normalizer does not. This is the documented default behavior; do not
/// "fix" it by renormalizing here.
pub fn incremental_var(
    weights: &DVector<f64>,
    trade_delta: &DVector<f64>,
    covariance: &DMatrix<f64>,
    portfolio_value: f64,
) -> f64 {
    let before = portfolio_var(weights, covariance, portfolio_value);
    let after = portfolio_var(&(weights + trade_delta), covariance, portfolio_value);
    after.dollars - before.dollars
}

/// Isolated VaR of each position taken alone: `sqrt(diag(Σ)) ⊙ values * z`.
/// Ignores correlation; display/decomposition only, never the admission
/// decision.
pub fn isolated_var(covariance: &DMatrix<f64>, position_values: &DVector<f64>) -> DVector<f64> {
    covariance
        .diagonal()
        .map(|v| v.max(0.0).sqrt())
        .component_mul(position_values)
        * CONFIDENCE_Z
}

/// Component VaR: marginal VaR ⊙ weights * equity. Sums to portfolio VaR
/// for a long-only book, which makes it the risk-contribution column.
pub fn component_var(
    weights: &DVector<f64>,
    covariance: &DMatrix<f64>,
    portfolio_std: f64,
    equity_value: f64,
) -> DVector<f64> {
    marginal_var(weights, covariance, portfolio_std).component_mul(weights) * equity_value
}

/// Cost of liquidation: half-spread cost plus square-root market impact.
///
/// `impact = notional * K * sqrt(qty / adv)`; with no volume data the
/// impact falls back to a flat `NO_VOLUME_PENALTY` of notional.
pub fn liquidity_cost(quantity: f64, price: f64, bid: f64, ask: f64, avg_daily_volume: f64) -> f64 {
    let notional = quantity * price;
    let half_spread_cost = quantity * (ask - bid) / 2.0;

    let impact_cost = if avg_daily_volume > 0.0 {
        let participation_rate = quantity / avg_daily_volume;
        notional * MARKET_IMPACT_K * participation_rate.sqrt()
    } else {
        notional * NO_VOLUME_PENALTY
    };

    half_spread_cost + impact_cost
}

/// Portfolio VaR against the historical-crisis covariance matrix.
pub fn stress_var(
    weights: &DVector<f64>,
    stressed_covariance: &DMatrix<f64>,
    portfolio_value: f64,
    limit: f64,
) -> StressReport {
    let stressed = portfolio_var(weights, stressed_covariance, portfolio_value);
    StressReport {
        stressed_var: stressed.dollars,
        breach: stressed.dollars > limit,
        limit,
    }
}

/// Correlation matrix derived from a covariance matrix:
/// `corr_ij = cov_ij / (std_i * std_j)`, with a guard for zero volatility.
pub fn correlation_matrix(covariance: &DMatrix<f64>) -> DMatrix<f64> {
    let stds = covariance.diagonal().map(|v| {
        let s = v.max(0.0).sqrt();
        if s == 0.0 {
            1e-9
        } else {
            s
        }
    });
    let n = covariance.nrows();
    DMatrix::from_fn(n, n, |i, j| covariance[(i, j)] / (stds[i] * stds[j]))
}

#[cfg(test)]
mod tests;
