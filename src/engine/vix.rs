//! VIX calculation orchestrator.
//!
//! Sequences the per-date pipeline: fetch rows, select expirations, split
//! chains, derive the term clocks, interpolate rates, compute forwards and
//! ladders, compute variances, and time-weight to the 30-day horizon. One
//! run per date, stateless across calls apart from the retained audit rows.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::store::{OptionStore, RateStore};
use crate::data::types::{OptionQuoteRow, RootSymbol};
use crate::engine::calendar::ExpirationCalendar;
use crate::engine::chain;
use crate::engine::error::{CalcStep, EngineError};
use crate::engine::expiration::{ExpirationSelector, SelectorConfig};
use crate::engine::forward;
use crate::engine::rates::{RateConfig, RateInterpolator};
use crate::engine::variance;

pub const MINUTES_PER_DAY: f64 = 1440.0;
pub const MINUTES_PER_YEAR: f64 = 525_600.0;
pub const MINUTES_30_DAYS: f64 = 30.0 * MINUTES_PER_DAY;

/// Minutes decomposition of one term's time to expiration.
#[derive(Debug, Clone, Copy)]
pub struct TermClock {
    /// Minutes remaining in the quote day.
    pub current_mins: f64,
    /// Minutes from midnight to settlement on the expiration day.
    pub settlement_mins: f64,
    /// Whole days to expiration, in minutes.
    pub other_mins: f64,
}

impl TermClock {
    /// Decompose the clock for a term. An unresolved root falls back to
    /// the weekly (PM-settled) convention.
    pub fn new(timestamp: NaiveDateTime, dte: i32, root: Option<RootSymbol>) -> Self {
        let current_mins =
            MINUTES_PER_DAY - f64::from(timestamp.hour() * 60 + timestamp.minute());
        let settlement_mins = root.unwrap_or(RootSymbol::Weekly).settlement_minutes();
        let other_mins = f64::from(dte) * MINUTES_PER_DAY;
        Self {
            current_mins,
            settlement_mins,
            other_mins,
        }
    }

    /// Time to expiration as a fraction of a 365-day year.
    pub fn year_fraction(&self) -> f64 {
        (self.current_mins + self.settlement_mins + self.other_mins) / MINUTES_PER_YEAR
    }
}

/// Immutable result record: the final index value plus every intermediate
/// quantity. Created once per successful calculation, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VixComponents {
    pub date: NaiveDate,
    pub dte1: f64,
    pub dte2: f64,
    pub t1: f64,
    pub t2: f64,
    pub r1: f64,
    pub r2: f64,
    pub f1: f64,
    pub f2: f64,
    pub k0_1: f64,
    pub k0_2: f64,
    pub sigma1: f64,
    pub sigma2: f64,
    pub vix: f64,
}

/// Time-weight the two term variances to a constant 30-day horizon.
/// `n1`/`n2` are the whole-day minutes to each expiration.
pub fn weighted_variance_30d(
    t1: f64,
    sigma1: f64,
    n1: f64,
    t2: f64,
    sigma2: f64,
    n2: f64,
) -> f64 {
    debug_assert!(n2 > n1, "next term must expire after near term");
    let w1 = (n2 - MINUTES_30_DAYS) / (n2 - n1);
    let w2 = (MINUTES_30_DAYS - n1) / (n2 - n1);
    (t1 * sigma1 * w1 + t2 * sigma2 * w2) * MINUTES_PER_YEAR / MINUTES_30_DAYS
}

/// Final index from the weighted variance. The absolute value guards
/// against a negative weighted variance from noisy inputs; the result is
/// always a real, non-negative number.
pub fn index_from_variance(variance_30d: f64) -> f64 {
    100.0 * variance_30d.abs().sqrt()
}

/// CBOE-methodology VIX calculator over injected read-only stores.
#[derive(Debug, Clone)]
pub struct VixCalculator<S, R> {
    options: S,
    rates: R,
    selector: ExpirationSelector,
    interpolator: RateInterpolator,
    last_rows: Vec<OptionQuoteRow>,
}

impl<S: OptionStore, R: RateStore> VixCalculator<S, R> {
    pub fn new(options: S, rates: R, calendar: ExpirationCalendar) -> Self {
        Self {
            options,
            rates,
            selector: ExpirationSelector::new(calendar),
            interpolator: RateInterpolator::new(),
            last_rows: Vec::new(),
        }
    }

    pub fn with_selector_config(mut self, config: SelectorConfig) -> Self {
        self.selector = self.selector.with_config(config);
        self
    }

    pub fn with_rate_config(mut self, config: RateConfig) -> Self {
        self.interpolator = self.interpolator.with_config(config);
        self
    }

    /// Compute the index for one trading date.
    ///
    /// Any failure aborts the run for the date with no partial result; the
    /// audit rows from a previous successful run are left untouched.
    pub fn calculate(&mut self, date: NaiveDate) -> Result<VixComponents, EngineError> {
        let selection = self.selector.select(&self.options, date)?;
        let pair = chain::split(date, &selection.near, &selection.next, &selection.rows)?;

        // split guarantees non-empty series for both terms
        let near_ts = pair.near_calls.quotes[0].quote_timestamp;
        let next_ts = pair.next_calls.quotes[0].quote_timestamp;
        let clock1 = TermClock::new(near_ts, selection.near.dte, pair.near_root);
        let clock2 = TermClock::new(next_ts, selection.next.dte, pair.next_root);
        let t1 = clock1.year_fraction();
        let t2 = clock2.year_fraction();

        let (r1, r2) = self.interpolator.rates_for_terms(
            &self.rates,
            date,
            f64::from(selection.near.dte),
            f64::from(selection.next.dte),
        );

        let f1 = forward::forward_price(&pair.near_calls, &pair.near_puts, r1, t1)
            .map_err(|e| invariant(date, CalcStep::ForwardPrice, e))?;
        let f2 = forward::forward_price(&pair.next_calls, &pair.next_puts, r2, t2)
            .map_err(|e| invariant(date, CalcStep::ForwardPrice, e))?;

        let ladder1 = forward::strike_ladder(&pair.near_calls, &pair.near_puts, f1)
            .map_err(|e| invariant(date, CalcStep::StrikeLadder, e))?;
        let ladder2 = forward::strike_ladder(&pair.next_calls, &pair.next_puts, f2)
            .map_err(|e| invariant(date, CalcStep::StrikeLadder, e))?;

        let sigma1 = variance::sigma(&ladder1, f1, t1, r1);
        let sigma2 = variance::sigma(&ladder2, f2, t2, r2);

        let variance_30d = weighted_variance_30d(
            t1,
            sigma1,
            clock1.other_mins,
            t2,
            sigma2,
            clock2.other_mins,
        );
        let vix = index_from_variance(variance_30d);

        self.last_rows = selection.rows;

        let components = VixComponents {
            date,
            dte1: f64::from(selection.near.dte),
            dte2: f64::from(selection.next.dte),
            t1,
            t2,
            r1,
            r2,
            f1,
            f2,
            k0_1: ladder1.central_strike,
            k0_2: ladder2.central_strike,
            sigma1,
            sigma2,
            vix,
        };
        info!(
            date = %date,
            dte1 = components.dte1,
            dte2 = components.dte2,
            vix = components.vix,
            "calculation complete"
        );
        Ok(components)
    }

    /// The exact option rows used by the most recent successful run, for
    /// downstream auditing and metrics.
    pub fn last_rows(&self) -> &[OptionQuoteRow] {
        &self.last_rows
    }

    /// Whether a result matches a known-good index value.
    pub fn validate(&self, components: &VixComponents, actual: f64) -> bool {
        (components.vix - actual).abs() < 0.001
    }
}

fn invariant(date: NaiveDate, step: CalcStep, err: impl std::fmt::Display) -> EngineError {
    EngineError::InvariantViolation {
        date,
        step,
        detail: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::InMemoryStore;
    use crate::data::types::RateCurvePoint;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    #[test]
    fn test_term_clock_standard_settlement() {
        let ts = NaiveDate::from_ymd_opt(2020, 6, 15)
            .unwrap()
            .and_hms_opt(16, 15, 0)
            .unwrap();
        let clock = TermClock::new(ts, 25, Some(RootSymbol::Standard));
        assert_eq!(clock.current_mins, 465.0);
        assert_eq!(clock.settlement_mins, 570.0);
        assert_eq!(clock.other_mins, 36_000.0);

        let expected = (465.0 + 570.0 + 36_000.0) / MINUTES_PER_YEAR;
        assert!((clock.year_fraction() - expected).abs() < 1e-15);
    }

    #[test]
    fn test_term_clock_default_convention_is_weekly() {
        let ts = NaiveDate::from_ymd_opt(2020, 6, 15)
            .unwrap()
            .and_hms_opt(16, 15, 0)
            .unwrap();
        let clock = TermClock::new(ts, 25, None);
        assert_eq!(clock.settlement_mins, 960.0);
    }

    #[test]
    fn test_weighting_hand_computed() {
        // Near 25 days, next 32 days: 30 days sits between.
        let n1 = 25.0 * MINUTES_PER_DAY;
        let n2 = 32.0 * MINUTES_PER_DAY;
        let (t1, t2) = (25.5 / 365.0, 32.5 / 365.0);

        let got = weighted_variance_30d(t1, 0.04, n1, t2, 0.05, n2);
        let w1 = (n2 - MINUTES_30_DAYS) / (n2 - n1);
        let w2 = (MINUTES_30_DAYS - n1) / (n2 - n1);
        let expected = (t1 * 0.04 * w1 + t2 * 0.05 * w2) * MINUTES_PER_YEAR / MINUTES_30_DAYS;
        assert!((got - expected).abs() < 1e-15);
        assert!((w1 + w2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_index_is_real_for_negative_variance() {
        let vix = index_from_variance(-0.04);
        assert!(vix.is_finite());
        assert!(vix >= 0.0);
        assert!((vix - 20.0).abs() < 1e-12);
    }

    // --- end-to-end over a synthetic chain ---

    fn d(x: f64) -> Decimal {
        Decimal::from_f64(x).unwrap()
    }

    fn row(
        trade_date: NaiveDate,
        dte: i32,
        root: RootSymbol,
        strike: f64,
        call_mid: f64,
        put_mid: f64,
    ) -> OptionQuoteRow {
        OptionQuoteRow {
            quote_timestamp: trade_date.and_hms_opt(16, 15, 0).unwrap(),
            trade_date,
            symbol: root.as_str().to_string(),
            root,
            expiration: trade_date + chrono::Days::new(dte as u64),
            dte,
            strike: d(strike),
            call_bid: d((call_mid - 0.5).max(0.1)),
            call_mid: d(call_mid),
            call_ask: d(call_mid + 0.5),
            put_bid: d((put_mid - 0.5).max(0.1)),
            put_mid: d(put_mid),
            put_ask: d(put_mid + 0.5),
            call_volume: 100,
            put_volume: 150,
            call_open_interest: 1000,
            put_open_interest: 1500,
            call_iv: 0.22,
            put_iv: 0.25,
            underlying_close: 3000.0,
        }
    }

    /// Monday 2020-06-15: Fridays fall 25 days out (weekly 2020-07-10)
    /// and 32 days out (standard third-Friday 2020-07-17).
    fn synthetic_store() -> InMemoryStore {
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let near = [
            (2900.0, 120.0, 10.0),
            (2950.0, 80.0, 20.0),
            (3000.0, 50.0, 48.0),
            (3050.0, 30.0, 70.0),
            (3100.0, 15.0, 100.0),
        ];
        let next = [
            (2900.0, 125.0, 12.0),
            (2950.0, 85.0, 22.0),
            (3000.0, 52.0, 49.0),
            (3050.0, 32.0, 72.0),
            (3100.0, 17.0, 103.0),
        ];

        let mut rows = Vec::new();
        for &(k, c, p) in &near {
            rows.push(row(date, 25, RootSymbol::Weekly, k, c, p));
        }
        for &(k, c, p) in &next {
            rows.push(row(date, 32, RootSymbol::Standard, k, c, p));
        }

        InMemoryStore::new()
            .with_rows(rows)
            .with_curves(vec![RateCurvePoint::new(date, [Some(1.0); 12])])
    }

    fn calculator() -> VixCalculator<InMemoryStore, InMemoryStore> {
        let store = synthetic_store();
        VixCalculator::new(store.clone(), store, ExpirationCalendar::fridays(2019, 2021))
    }

    #[test]
    fn test_end_to_end_synthetic_chain() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let mut calc = calculator();
        let c = calc.calculate(date).unwrap();

        assert_eq!(c.dte1, 25.0);
        assert_eq!(c.dte2, 32.0);
        assert!(c.dte1 < c.dte2);

        // Parity gap is smallest at 3000 on both terms.
        assert_eq!(c.k0_1, 3000.0);
        assert_eq!(c.k0_2, 3000.0);
        assert!((c.f1 - 3002.0).abs() < 0.1);
        assert!((c.f2 - 3003.0).abs() < 0.1);

        // Standard vs weekly settlement: near term is PM, next is AM.
        assert!(c.t1 > 0.0 && c.t2 > c.t1);

        assert!(c.sigma1 > 0.0);
        assert!(c.sigma2 > 0.0);
        assert!(c.vix.is_finite() && c.vix > 0.0);

        assert_eq!(calc.last_rows().len(), 10);
    }

    #[test]
    fn test_idempotent_recalculation() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let mut calc = calculator();
        let first = calc.calculate(date).unwrap();
        let second = calc.calculate(date).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_date_is_data_gap() {
        let date = NaiveDate::from_ymd_opt(2021, 1, 4).unwrap();
        let mut calc = calculator();
        match calc.calculate(date) {
            Err(EngineError::DataGap { .. }) => {}
            other => panic!("expected DataGap, got {other:?}"),
        }
        assert!(calc.last_rows().is_empty());
    }

    #[test]
    fn test_validate_tolerance() {
        let date = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        let mut calc = calculator();
        let c = calc.calculate(date).unwrap();
        assert!(calc.validate(&c, c.vix + 0.0005));
        assert!(!calc.validate(&c, c.vix + 0.01));
    }
}
