//! Parquet-backed stores.
//!
//! Reads normalized end-of-day parquet files into the type system. Option
//! files hold one row per (trade_date, expiration, strike) with both sides
//! of the market on the row, partitioned by year:
//! - {data_dir}/options/spx_{year}.parquet
//! - {data_dir}/rates/treasury_par_yield.parquet
//! - {data_dir}/index/vix_close.parquet
//!
//! Dates are stored as "%Y-%m-%d" strings, matching the upstream export.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use rust_decimal::Decimal;

use super::store::{IndexStore, OptionStore, RateStore, StoreError};
use super::types::{OptionQuoteRow, RateCurvePoint, RootSymbol, CMT_TENOR_LABELS};

/// Expected columns in the option parquet files.
pub const EXPECTED_OPTION_COLUMNS: &[&str] = &[
    "quote_time",
    "trade_date",
    "root",
    "expiration",
    "dte",
    "strike",
    "call_bid",
    "call_mid",
    "call_ask",
    "put_bid",
    "put_mid",
    "put_ask",
    "call_volume",
    "put_volume",
    "call_open_interest",
    "put_open_interest",
    "call_iv",
    "put_iv",
    "underlying_close",
];

/// End-of-day snapshot clock time used when a row carries no quote time.
const DEFAULT_QUOTE_TIME: (u32, u32) = (16, 15);

/// Parquet data store for option chains, yield curves and index closes.
#[derive(Debug, Clone)]
pub struct ParquetStore {
    data_dir: String,
}

impl ParquetStore {
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
        }
    }

    /// Path to the option parquet file for a given year.
    fn options_path(&self, year: i32) -> String {
        format!("{}/options/spx_{}.parquet", self.data_dir, year)
    }

    fn rates_path(&self) -> String {
        format!("{}/rates/treasury_par_yield.parquet", self.data_dir)
    }

    fn index_path(&self) -> String {
        format!("{}/index/vix_close.parquet", self.data_dir)
    }

    /// Load the option file for one year as a LazyFrame.
    fn options_lazy(&self, year: i32) -> Result<LazyFrame, StoreError> {
        let path = self.options_path(year);
        if !Path::new(&path).exists() {
            return Err(StoreError::FileNotFound(path));
        }
        let lf = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?;
        Ok(lf)
    }

    /// Option files across a span of years, concatenated. Missing years are
    /// skipped; an entirely empty span is an error.
    fn options_range_lazy(&self, start_year: i32, end_year: i32) -> Result<LazyFrame, StoreError> {
        let mut frames = Vec::new();
        for year in start_year..=end_year {
            match self.options_lazy(year) {
                Ok(lf) => frames.push(lf),
                Err(StoreError::FileNotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        if frames.is_empty() {
            return Err(StoreError::InvalidData(format!(
                "No option data found for years {}-{}",
                start_year, end_year
            )));
        }

        Ok(concat(&frames, UnionArgs::default())?)
    }
}

impl OptionStore for ParquetStore {
    fn fetch_rows(
        &self,
        trade_date: NaiveDate,
        dte_min: i32,
        dte_max: i32,
    ) -> Result<Vec<OptionQuoteRow>, StoreError> {
        let lf = self.options_lazy(trade_date.year())?;

        let df = lf
            .filter(
                col("trade_date")
                    .eq(lit(trade_date.to_string()))
                    .and(col("dte").gt(lit(dte_min)))
                    .and(col("dte").lt(lit(dte_max)))
                    .and(col("call_bid").gt(lit(0.0)))
                    .and(col("put_bid").gt(lit(0.0))),
            )
            .sort(["dte", "strike"], SortMultipleOptions::default())
            .collect()?;

        dataframe_to_rows(&df, trade_date)
    }

    fn trading_dates(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StoreError> {
        let lf = self.options_range_lazy(start.year(), end.year())?;

        let df = lf
            .filter(
                col("trade_date")
                    .gt_eq(lit(start.to_string()))
                    .and(col("trade_date").lt_eq(lit(end.to_string()))),
            )
            .select([col("trade_date").unique()])
            .collect()?;

        let mut dates: Vec<NaiveDate> = df
            .column("trade_date")?
            .str()?
            .into_iter()
            .filter_map(|s| s.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
            .collect();
        dates.sort();
        Ok(dates)
    }
}

impl RateStore for ParquetStore {
    fn curves_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RateCurvePoint>, StoreError> {
        let path = self.rates_path();
        if !Path::new(&path).exists() {
            return Err(StoreError::FileNotFound(path));
        }

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?
            .filter(
                col("date")
                    .gt_eq(lit(start.to_string()))
                    .and(col("date").lt_eq(lit(end.to_string()))),
            )
            .sort(["date"], SortMultipleOptions::default())
            .collect()?;

        let date_col = df.column("date")?;
        let mut curves = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let Some(date) = date_col
                .str()
                .ok()
                .and_then(|c| c.get(idx))
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            else {
                continue;
            };

            // Missing tenors come through as nulls and stay None.
            let mut tenors = [None; 12];
            for (slot, label) in tenors.iter_mut().zip(CMT_TENOR_LABELS) {
                *slot = df
                    .column(label)
                    .ok()
                    .and_then(|c| c.f64().ok())
                    .and_then(|c| c.get(idx));
            }
            curves.push(RateCurvePoint::new(date, tenors));
        }
        Ok(curves)
    }
}

impl IndexStore for ParquetStore {
    fn index_close(&self, date: NaiveDate) -> Result<Option<f64>, StoreError> {
        let path = self.index_path();
        if !Path::new(&path).exists() {
            return Err(StoreError::FileNotFound(path));
        }

        let df = LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?
            .filter(col("date").eq(lit(date.to_string())))
            .select([col("close")])
            .collect()?;

        Ok(df.column("close")?.f64()?.get(0))
    }
}

/// Convert a filtered option DataFrame to typed rows.
fn dataframe_to_rows(
    df: &DataFrame,
    trade_date: NaiveDate,
) -> Result<Vec<OptionQuoteRow>, StoreError> {
    let time_col = df.column("quote_time")?;
    let root_col = df.column("root")?;
    let expiration_col = df.column("expiration")?;
    let dte_col = df.column("dte")?;
    let strike_col = df.column("strike")?;
    let call_bid_col = df.column("call_bid")?;
    let call_mid_col = df.column("call_mid")?;
    let call_ask_col = df.column("call_ask")?;
    let put_bid_col = df.column("put_bid")?;
    let put_mid_col = df.column("put_mid")?;
    let put_ask_col = df.column("put_ask")?;
    let call_volume_col = df.column("call_volume")?;
    let put_volume_col = df.column("put_volume")?;
    let call_oi_col = df.column("call_open_interest")?;
    let put_oi_col = df.column("put_open_interest")?;
    let call_iv_col = df.column("call_iv")?;
    let put_iv_col = df.column("put_iv")?;
    let close_col = df.column("underlying_close")?;

    let f64_at = |col: &Column, idx: usize| col.f64().ok().and_then(|c| c.get(idx)).unwrap_or(0.0);
    let i64_at = |col: &Column, idx: usize| col.i64().ok().and_then(|c| c.get(idx)).unwrap_or(0);
    let decimal_at =
        |col: &Column, idx: usize| Decimal::from_f64_retain(f64_at(col, idx)).unwrap_or_default();

    let mut rows = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        let root_str = root_col.str().ok().and_then(|c| c.get(idx)).unwrap_or("");
        let Some(root) = RootSymbol::from_str(root_str) else {
            return Err(StoreError::InvalidData(format!(
                "unknown root symbol {root_str:?} on {trade_date}"
            )));
        };

        let expiration = expiration_col
            .str()
            .ok()
            .and_then(|c| c.get(idx))
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .ok_or_else(|| {
                StoreError::InvalidData(format!("unparseable expiration on {trade_date}"))
            })?;

        rows.push(OptionQuoteRow {
            quote_timestamp: quote_timestamp(time_col, idx, trade_date),
            trade_date,
            symbol: root.as_str().to_string(),
            root,
            expiration,
            dte: dte_col.i32().ok().and_then(|c| c.get(idx)).unwrap_or(0),
            strike: decimal_at(strike_col, idx),
            call_bid: decimal_at(call_bid_col, idx),
            call_mid: decimal_at(call_mid_col, idx),
            call_ask: decimal_at(call_ask_col, idx),
            put_bid: decimal_at(put_bid_col, idx),
            put_mid: decimal_at(put_mid_col, idx),
            put_ask: decimal_at(put_ask_col, idx),
            call_volume: i64_at(call_volume_col, idx),
            put_volume: i64_at(put_volume_col, idx),
            call_open_interest: i64_at(call_oi_col, idx),
            put_open_interest: i64_at(put_oi_col, idx),
            call_iv: f64_at(call_iv_col, idx),
            put_iv: f64_at(put_iv_col, idx),
            underlying_close: f64_at(close_col, idx),
        });
    }
    Ok(rows)
}

/// Parse an "HH:MM" quote time, falling back to the end-of-day snapshot.
fn quote_timestamp(time_col: &Column, idx: usize, trade_date: NaiveDate) -> NaiveDateTime {
    let (h, m) = DEFAULT_QUOTE_TIME;
    let time = time_col
        .str()
        .ok()
        .and_then(|c| c.get(idx))
        .and_then(|s| NaiveTime::parse_from_str(s, "%H:%M").ok())
        .unwrap_or_else(|| NaiveTime::from_hms_opt(h, m, 0).unwrap_or_default());
    NaiveDateTime::new(trade_date, time)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_creation() {
        let store = ParquetStore::new("data/spx");
        assert_eq!(store.data_dir, "data/spx");
    }

    #[test]
    fn test_paths() {
        let store = ParquetStore::new("data/spx");
        assert_eq!(store.options_path(2020), "data/spx/options/spx_2020.parquet");
        assert_eq!(store.rates_path(), "data/spx/rates/treasury_par_yield.parquet");
        assert_eq!(store.index_path(), "data/spx/index/vix_close.parquet");
    }

    #[test]
    fn test_expected_columns() {
        assert_eq!(EXPECTED_OPTION_COLUMNS.len(), 19);
        assert!(EXPECTED_OPTION_COLUMNS.contains(&"trade_date"));
        assert!(EXPECTED_OPTION_COLUMNS.contains(&"call_bid"));
        assert!(EXPECTED_OPTION_COLUMNS.contains(&"underlying_close"));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let store = ParquetStore::new("/nonexistent");
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        assert!(matches!(
            store.fetch_rows(date, 22, 38),
            Err(StoreError::FileNotFound(_))
        ));
        assert!(matches!(
            store.index_close(date),
            Err(StoreError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_quote_time_fallback() {
        let col = Column::new("quote_time".into(), &["bogus"]);
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let ts = quote_timestamp(&col, 0, date);
        assert_eq!(ts, date.and_hms_opt(16, 15, 0).unwrap());

        let col = Column::new("quote_time".into(), &["15:45"]);
        let ts = quote_timestamp(&col, 0, date);
        assert_eq!(ts, date.and_hms_opt(15, 45, 0).unwrap());
    }
}
