//! Counter totals and the values bounds are checked against.

use super::decimal::Decimal;
use super::rule::{Counter, ValueType};
use crate::model::{CoverageSummary, Totals};

/// Totals of `counter` within `summary`
#[must_use]
pub const fn totals(summary: &CoverageSummary, counter: Counter) -> Totals {
    match counter {
        Counter::Line => summary.lines,
        Counter::Branch => summary.branches,
        Counter::Instruction => summary.instructions,
        Counter::Method => summary.methods,
    }
}

/// Value of `value_type` for `totals`
#[must_use]
pub fn value(totals: Totals, value_type: ValueType) -> Decimal {
    match value_type {
        ValueType::Covered => Decimal::from_count(totals.covered),
        ValueType::Missed => Decimal::from_count(totals.missed),
        ValueType::CoveredRate => Decimal::ratio(totals.covered, totals.total()),
        ValueType::MissedRate => Decimal::ratio(totals.covered, totals.total()).complement(),
    }
}
