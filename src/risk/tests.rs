use super::*;
use nalgebra::{DMatrix, DVector};

fn diag2(a: f64, b: f64) -> DMatrix<f64> {
    DMatrix::from_row_slice(2, 2, &[a, 0.0, 0.0, b])
}

#[test]
fn portfolio_var_known_value() {
    // w = [1, 0], Σ = diag(0.04, 0.01), V = 1000
    // std = 0.2, VaR = 1.65 * 0.2 * 1000 = 330
    let w = DVector::from_vec(vec![1.0, 0.0]);
    let sigma = diag2(0.04, 0.01);

    let est = portfolio_var(&w, &sigma, 1000.0);
    assert!((est.std - 0.2).abs() < 1e-12);
    assert!((est.dollars - 330.0).abs() < 1e-9);
}

#[test]
fn portfolio_var_never_negative() {
    let sigma = diag2(0.04, 0.01);
    let weights = [
        DVector::from_vec(vec![0.0, 0.0]),
        DVector::from_vec(vec![0.5, 0.5]),
        DVector::from_vec(vec![-1.0, 1.0]),
        DVector::from_vec(vec![3.0, -2.0]),
    ];
    for w in &weights {
        let est = portfolio_var(w, &sigma, 1_000_000.0);
        assert!(est.dollars >= 0.0);
        assert!(est.std >= 0.0);
    }
}

#[test]
fn portfolio_var_clamps_roundoff_variance() {
    // A rank-one matrix evaluated on an orthogonal weight vector lands at
    // zero up to round-off; the clamp must keep sqrt away from NaN.
    let sigma = DMatrix::from_row_slice(2, 2, &[0.01, -0.01, -0.01, 0.01]);
    let w = DVector::from_vec(vec![1.0, 1.0]);

    let est = portfolio_var(&w, &sigma, 1_000_000.0);
    assert!(est.std >= 0.0);
    assert!(!est.dollars.is_nan());
}

#[test]
fn marginal_var_zero_for_flat_book() {
    let sigma = diag2(0.04, 0.01);
    let w = DVector::from_vec(vec![0.0, 0.0]);

    let mvar = marginal_var(&w, &sigma, 0.0);
    assert!(mvar.iter().all(|&v| v == 0.0));
}

#[test]
fn marginal_var_known_value() {
    // Σw = [0.04, 0], std = 0.2 -> marginal = [0.04/0.2 * 1.65, 0] = [0.33, 0]
    let w = DVector::from_vec(vec![1.0, 0.0]);
    let sigma = diag2(0.04, 0.01);
    let std = portfolio_var(&w, &sigma, 1.0).std;

    let mvar = marginal_var(&w, &sigma, std);
    assert!((mvar[0] - 0.33).abs() < 1e-12);
    assert!((mvar[1]).abs() < 1e-12);
}

#[test]
fn incremental_var_matches_explicit_difference() {
    let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.005, 0.005, 0.01]);
    let w = DVector::from_vec(vec![0.6, 0.4]);
    let dw = DVector::from_vec(vec![0.1, 0.0]);
    let value = 500_000.0;

    let expected = portfolio_var(&(&w + &dw), &sigma, value).dollars
        - portfolio_var(&w, &sigma, value).dollars;
    let got = incremental_var(&w, &dw, &sigma, value);
    assert!((got - expected).abs() < 1e-9);
}

#[test]
fn isolated_var_ignores_correlation() {
    // Heavy off-diagonals must not matter: only diag(Σ) enters.
    let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.02, 0.02, 0.01]);
    let values = DVector::from_vec(vec![10_000.0, 20_000.0]);

    let iso = isolated_var(&sigma, &values);
    assert!((iso[0] - 0.2 * 10_000.0 * CONFIDENCE_Z).abs() < 1e-9);
    assert!((iso[1] - 0.1 * 20_000.0 * CONFIDENCE_Z).abs() < 1e-9);
}

#[test]
fn component_var_sums_to_portfolio_var_long_only() {
    let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.005, 0.005, 0.01]);
    let w = DVector::from_vec(vec![0.7, 0.3]);
    let equity = 250_000.0;

    let est = portfolio_var(&w, &sigma, equity);
    let components = component_var(&w, &sigma, est.std, equity);
    assert!((components.sum() - est.dollars).abs() < 1e-6);
}

#[test]
fn liquidity_cost_flat_penalty_without_volume_data() {
    // Zero spread isolates the impact term: exactly 5% of notional.
    let cost = liquidity_cost(100.0, 150.0, 150.0, 150.0, 0.0);
    assert!((cost - 0.05 * 100.0 * 150.0).abs() < 1e-9);
}

#[test]
fn liquidity_cost_spread_and_impact_terms() {
    let qty = 10_000.0;
    let price = 100.0;
    let (bid, ask) = (99.98, 100.02);
    let adv = 10_000_000.0;

    let half_spread = qty * (ask - bid) / 2.0;
    let impact = qty * price * MARKET_IMPACT_K * (qty / adv).sqrt();
    let cost = liquidity_cost(qty, price, bid, ask, adv);
    assert!((cost - (half_spread + impact)).abs() < 1e-9);
}

#[test]
fn stress_var_flags_breach() {
    let w = DVector::from_vec(vec![1.0, 0.0]);
    let stressed = diag2(0.09, 0.04);

    let report = stress_var(&w, &stressed, 100_000.0, 10_000.0);
    // std 0.3 -> 1.65 * 0.3 * 100k = 49,500 > 10,000
    assert!((report.stressed_var - 49_500.0).abs() < 1e-6);
    assert!(report.breach);

    let calm = stress_var(&w, &stressed, 100_000.0, 100_000.0);
    assert!(!calm.breach);
}

#[test]
fn correlation_matrix_unit_diagonal() {
    let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.01, 0.01, 0.01]);

    let corr = correlation_matrix(&sigma);
    assert!((corr[(0, 0)] - 1.0).abs() < 1e-12);
    assert!((corr[(1, 1)] - 1.0).abs() < 1e-12);
    // corr_01 = 0.01 / (0.2 * 0.1) = 0.5
    assert!((corr[(0, 1)] - 0.5).abs() < 1e-12);
    assert!((corr[(0, 1)] - corr[(1, 0)]).abs() < 1e-12);
}
