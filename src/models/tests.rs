use super::*;
use nalgebra::DMatrix;
use std::collections::HashMap;

fn set(symbols: &[&str]) -> InstrumentSet {
    InstrumentSet::new(symbols.iter().map(|s| s.to_string()).collect()).unwrap()
}

#[test]
fn instrument_set_defines_index_order() {
    let instruments = set(&["AAPL", "GOOG", "MSFT"]);
    assert_eq!(instruments.len(), 3);
    assert_eq!(instruments.index_of("AAPL"), Some(0));
    assert_eq!(instruments.index_of("MSFT"), Some(2));
    assert_eq!(instruments.index_of("TSLA"), None);
    assert!(instruments.contains("GOOG"));
}

#[test]
fn instrument_set_rejects_duplicates_and_empty() {
    assert!(matches!(
        InstrumentSet::new(vec![]),
        Err(InstrumentError::Empty)
    ));
    assert!(matches!(
        InstrumentSet::new(vec!["AAPL".into(), "AAPL".into()]),
        Err(InstrumentError::Duplicate(_))
    ));
}

#[test]
fn matrix_record_roundtrip() {
    let instruments = set(&["A", "B"]);
    let matrix = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 4.0]);

    let record = MatrixRecord::from_matrix(&instruments, &matrix);
    assert_eq!(record.data, vec![1.0, 2.0, 2.0, 4.0]);
    let back = record.to_matrix(&instruments).unwrap();
    assert_eq!(back, matrix);
}

#[test]
fn matrix_record_rejects_wrong_shape() {
    let instruments = set(&["A", "B"]);
    let record = MatrixRecord {
        instruments: vec!["A".into(), "B".into()],
        data: vec![1.0, 2.0, 3.0],
    };
    assert!(record.to_matrix(&instruments).is_err());
}

#[test]
fn matrix_record_rejects_instrument_mismatch() {
    let instruments = set(&["A", "B"]);
    let record = MatrixRecord {
        // Same length, different order: indices would silently shift.
        instruments: vec!["B".into(), "A".into()],
        data: vec![1.0, 0.0, 0.0, 1.0],
    };
    assert!(record.to_matrix(&instruments).is_err());
}

#[test]
fn market_record_price_vector_validates() {
    let instruments = set(&["A", "B"]);
    let covariance = MatrixRecord {
        instruments: vec!["A".into(), "B".into()],
        data: vec![1.0, 0.0, 0.0, 1.0],
    };

    let mut record = MarketRecord {
        prices: HashMap::from([("A".to_string(), 100.0), ("B".to_string(), 50.0)]),
        covariance,
        heartbeat: String::new(),
    };
    let v = record.price_vector(&instruments).unwrap();
    assert_eq!(v[0], 100.0);
    assert_eq!(v[1], 50.0);

    record.prices.remove("B");
    assert!(record.price_vector(&instruments).is_err());

    record.prices.insert("B".to_string(), -1.0);
    assert!(record.price_vector(&instruments).is_err());
}

#[test]
fn portfolio_state_rejects_unknown_holding() {
    let instruments = set(&["A"]);
    let state = PortfolioState {
        cash: 0.0,
        holdings: HashMap::from([(
            "Z".to_string(),
            Holding {
                quantity: 1,
                average_cost: 1.0,
            },
        )]),
    };
    assert!(state.validate(&instruments).is_err());
}

#[test]
fn quantity_vector_defaults_missing_holdings_to_zero() {
    let instruments = set(&["A", "B"]);
    let state = PortfolioState {
        cash: 0.0,
        holdings: HashMap::from([(
            "B".to_string(),
            Holding {
                quantity: 7,
                average_cost: 10.0,
            },
        )]),
    };
    let q = state.quantity_vector(&instruments);
    assert_eq!(q[0], 0.0);
    assert_eq!(q[1], 7.0);
}

#[test]
fn proposal_carries_fresh_id() {
    let a = TradeProposal::new("AAPL", Side::Buy, 10);
    let b = TradeProposal::new("AAPL", Side::Buy, 10);
    assert_ne!(a.id, b.id);
}
