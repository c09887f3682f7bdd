//! Shared result-set fixtures for tests.

use crate::groundtruth::{Column, ColumnType, ColumnValue, ResultSet};

/// Per-player damage totals: Ana 114622, Bo 98410.
#[must_use]
pub fn damage_result_set() -> ResultSet {
    ResultSet::new(vec![
        Column::new("Player", ColumnType::Text),
        Column::new("TotalDamage", ColumnType::Integer),
    ])
    .with_row(vec![
        ColumnValue::Text("Ana".to_string()),
        ColumnValue::Integer(114_622),
    ])
    .with_row(vec![
        ColumnValue::Text("Bo".to_string()),
        ColumnValue::Integer(98_410),
    ])
}

/// A declining gold-per-minute series over three phases.
#[must_use]
pub fn declining_gold_result_set() -> ResultSet {
    ResultSet::new(vec![Column::new("GoldPerMinute", ColumnType::Float)])
        .with_row(vec![ColumnValue::Float(402.0)])
        .with_row(vec![ColumnValue::Float(355.0)])
        .with_row(vec![ColumnValue::Float(310.0)])
}
