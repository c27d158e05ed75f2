//! Storage traits for the engine's read-only collaborators.
//!
//! The engine is a pure function of (date, row-fetch capability, rate-fetch
//! capability); these traits are the fetch capabilities. Implementations
//! never see writes from the engine, so concurrent calculations only need
//! one store handle (connection/session) per worker.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::error::PolarsError;
use thiserror::Error;

use super::types::{OptionQuoteRow, RateCurvePoint};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read access to option-chain rows.
pub trait OptionStore {
    /// Rows for one trading date with `dte_min < dte < dte_max` (both bounds
    /// exclusive), filtered to nonzero bids on both sides, ordered by DTE.
    fn fetch_rows(
        &self,
        trade_date: NaiveDate,
        dte_min: i32,
        dte_max: i32,
    ) -> Result<Vec<OptionQuoteRow>, StoreError>;

    /// Distinct trading dates with any option data in the span, ascending.
    fn trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError>;
}

/// Read access to the published constant-maturity yield curve.
pub trait RateStore {
    /// Curve observations in `[start, end]`, ascending by date.
    fn curves_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateCurvePoint>, StoreError>;
}

/// Read access to known-good index closes, used for validation only.
pub trait IndexStore {
    fn index_close(&self, date: NaiveDate) -> Result<Option<f64>, StoreError>;
}

/// In-memory store over pre-loaded rows and curves.
///
/// Used by tests and by callers that already hold the data (e.g. a fresh
/// vendor download that has not been persisted yet).
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    rows: Vec<OptionQuoteRow>,
    curves: Vec<RateCurvePoint>,
    index_closes: BTreeMap<NaiveDate, f64>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(mut self, rows: Vec<OptionQuoteRow>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_curves(mut self, mut curves: Vec<RateCurvePoint>) -> Self {
        curves.sort_by_key(|c| c.date);
        self.curves = curves;
        self
    }

    pub fn with_index_close(mut self, date: NaiveDate, close: f64) -> Self {
        self.index_closes.insert(date, close);
        self
    }

    pub fn push_row(&mut self, row: OptionQuoteRow) {
        self.rows.push(row);
    }
}

impl OptionStore for InMemoryStore {
    fn fetch_rows(
        &self,
        trade_date: NaiveDate,
        dte_min: i32,
        dte_max: i32,
    ) -> Result<Vec<OptionQuoteRow>, StoreError> {
        let mut rows: Vec<OptionQuoteRow> = self
            .rows
            .iter()
            .filter(|r| {
                r.trade_date == trade_date
                    && r.dte > dte_min
                    && r.dte < dte_max
                    && r.is_two_sided()
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.dte);
        Ok(rows)
    }

    fn trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let mut dates: Vec<NaiveDate> = self
            .rows
            .iter()
            .map(|r| r.trade_date)
            .filter(|d| *d >= start && *d <= end)
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }
}

impl RateStore for InMemoryStore {
    fn curves_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateCurvePoint>, StoreError> {
        Ok(self
            .curves
            .iter()
            .filter(|c| c.date >= start && c.date <= end)
            .cloned()
            .collect())
    }
}

impl IndexStore for InMemoryStore {
    fn index_close(&self, date: NaiveDate) -> Result<Option<f64>, StoreError> {
        Ok(self.index_closes.get(&date).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::RootSymbol;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn row(trade_date: NaiveDate, dte: i32, strike: f64, call_bid: f64) -> OptionQuoteRow {
        let d = |x: f64| Decimal::from_f64(x).unwrap();
        OptionQuoteRow {
            quote_timestamp: trade_date.and_hms_opt(16, 15, 0).unwrap(),
            trade_date,
            symbol: "SPXW".to_string(),
            root: RootSymbol::Weekly,
            expiration: trade_date + chrono::Days::new(dte as u64),
            dte,
            strike: d(strike),
            call_bid: d(call_bid),
            call_mid: d(call_bid + 0.5),
            call_ask: d(call_bid + 1.0),
            put_bid: d(1.0),
            put_mid: d(1.5),
            put_ask: d(2.0),
            call_volume: 10,
            put_volume: 20,
            call_open_interest: 100,
            put_open_interest: 200,
            call_iv: 0.2,
            put_iv: 0.25,
            underlying_close: 3000.0,
        }
    }

    #[test]
    fn test_fetch_rows_filters_window_and_bids() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let store = InMemoryStore::new().with_rows(vec![
            row(date, 22, 3000.0, 1.0), // at lower bound, excluded
            row(date, 30, 3000.0, 1.0),
            row(date, 25, 3000.0, 1.0),
            row(date, 38, 3000.0, 1.0), // at upper bound, excluded
            row(date, 30, 3050.0, 0.0), // zero call bid, excluded
        ]);

        let rows = store.fetch_rows(date, 22, 38).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dte, 25);
        assert_eq!(rows[1].dte, 30);
    }

    #[test]
    fn test_trading_dates_dedup() {
        let d1 = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2020, 6, 16).unwrap();
        let store = InMemoryStore::new().with_rows(vec![
            row(d2, 25, 3000.0, 1.0),
            row(d1, 25, 3000.0, 1.0),
            row(d1, 30, 3000.0, 1.0),
        ]);

        let dates = store.trading_dates(d1, d2).unwrap();
        assert_eq!(dates, vec![d1, d2]);
    }
}
