//! Core data types for the VIX calculation engine.
//!
//! These types mirror the CBOE end-of-day option chain layout: one row per
//! (expiration, strike) carrying both the call and the put quote, which is
//! what the forward-price step needs for put-call pair matching.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quoting series for SPX options.
///
/// Standard (SPX) contracts are AM-settled on the third Friday; weekly
/// (SPXW) contracts are PM-settled. The settlement convention changes the
/// minutes-to-expiry clock, so the distinction matters to the final index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RootSymbol {
    /// Standard AM-settled series ("SPX").
    Standard,
    /// Weekly PM-settled series ("SPXW").
    Weekly,
}

impl RootSymbol {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SPX" => Some(Self::Standard),
            "SPXW" => Some(Self::Weekly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "SPX",
            Self::Weekly => "SPXW",
        }
    }

    /// The other quoting series.
    pub fn other(&self) -> Self {
        match self {
            Self::Standard => Self::Weekly,
            Self::Weekly => Self::Standard,
        }
    }

    /// Minutes from midnight to settlement: 9:30 AM for the standard
    /// series, 4:00 PM for weeklies.
    pub fn settlement_minutes(&self) -> f64 {
        match self {
            Self::Standard => 570.0,
            Self::Weekly => 960.0,
        }
    }
}

/// Call or put side of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    Call,
    Put,
}

/// One observed end-of-day quote: both sides of a single (expiration, strike).
///
/// Invariant: for a given (expiration, strike) there is at most one row.
/// Rows with a zero bid on either side are excluded upstream (the nonzero-bid
/// filter is the only data-quality gate in the methodology).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuoteRow {
    /// Quote timestamp (end-of-day snapshot clock time).
    pub quote_timestamp: NaiveDateTime,

    /// Trading date of the quote.
    pub trade_date: NaiveDate,

    /// Full contract symbol.
    pub symbol: String,

    /// Quoting series (standard vs weekly).
    pub root: RootSymbol,

    /// Option expiration date.
    pub expiration: NaiveDate,

    /// Days to expiration.
    pub dte: i32,

    /// Strike price. Decimal so strike equality is exact.
    pub strike: Decimal,

    pub call_bid: Decimal,
    pub call_mid: Decimal,
    pub call_ask: Decimal,

    pub put_bid: Decimal,
    pub put_mid: Decimal,
    pub put_ask: Decimal,

    pub call_volume: i64,
    pub put_volume: i64,

    pub call_open_interest: i64,
    pub put_open_interest: i64,

    pub call_iv: f64,
    pub put_iv: f64,

    /// Underlying close at the quote snapshot.
    pub underlying_close: f64,
}

impl OptionQuoteRow {
    /// Absolute put-call mid-price discrepancy at this strike.
    pub fn mid_gap(&self) -> Decimal {
        (self.call_mid - self.put_mid).abs()
    }

    /// Whether both sides carry a nonzero bid.
    pub fn is_two_sided(&self) -> bool {
        !self.call_bid.is_zero() && !self.put_bid.is_zero()
    }

    /// Project one side of this row into a single-sided quote.
    pub fn side(&self, side: OptionSide) -> OptionQuote {
        let (bid, mid, open_interest, volume, iv) = match side {
            OptionSide::Call => (
                self.call_bid,
                self.call_mid,
                self.call_open_interest,
                self.call_volume,
                self.call_iv,
            ),
            OptionSide::Put => (
                self.put_bid,
                self.put_mid,
                self.put_open_interest,
                self.put_volume,
                self.put_iv,
            ),
        };
        OptionQuote {
            quote_timestamp: self.quote_timestamp,
            root: self.root,
            expiration: self.expiration,
            dte: self.dte,
            strike: self.strike,
            bid,
            mid,
            open_interest,
            volume,
            iv,
        }
    }
}

/// One side of a quote projected out of an [`OptionQuoteRow`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionQuote {
    pub quote_timestamp: NaiveDateTime,
    pub root: RootSymbol,
    pub expiration: NaiveDate,
    pub dte: i32,
    pub strike: Decimal,
    pub bid: Decimal,
    pub mid: Decimal,
    pub open_interest: i64,
    pub volume: i64,
    pub iv: f64,
}

/// A strike-ordered sequence of single-sided quotes sharing one expiration.
#[derive(Debug, Clone, Default)]
pub struct OptionSeries {
    pub side: Option<OptionSide>,
    pub dte: i32,
    pub expiration: Option<NaiveDate>,
    pub quotes: Vec<OptionQuote>,
}

impl OptionSeries {
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Quote at an exact strike, if present.
    pub fn at_strike(&self, strike: Decimal) -> Option<&OptionQuote> {
        self.quotes.iter().find(|q| q.strike == strike)
    }

    /// Index of the quote whose strike is nearest the target.
    pub fn nearest_strike_idx(&self, target: Decimal) -> Option<usize> {
        self.quotes
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| (a.strike - target).abs().cmp(&(b.strike - target).abs()))
            .map(|(i, _)| i)
    }

    /// The unique root symbol quoting this series, or `None` when both
    /// the standard and weekly series appear.
    pub fn unique_root(&self) -> Option<RootSymbol> {
        let mut roots = self.quotes.iter().map(|q| q.root);
        let first = roots.next()?;
        roots.all(|r| r == first).then_some(first)
    }
}

/// The four strike-ordered series the variance steps consume, plus the
/// resolved quoting series for each term.
#[derive(Debug, Clone)]
pub struct OptionChainPair {
    pub near_calls: OptionSeries,
    pub near_puts: OptionSeries,
    pub next_calls: OptionSeries,
    pub next_puts: OptionSeries,

    /// Resolved near-term root; `None` when disambiguation failed on both
    /// sides and the settlement convention falls back to its default.
    pub near_root: Option<RootSymbol>,
    /// Resolved next-term root.
    pub next_root: Option<RootSymbol>,
}

/// Month lengths of the published constant-maturity treasury tenors.
pub const CMT_TENOR_MONTHS: [f64; 12] = [
    1.0, 2.0, 3.0, 6.0, 12.0, 24.0, 36.0, 60.0, 84.0, 120.0, 240.0, 360.0,
];

/// Column labels matching [`CMT_TENOR_MONTHS`].
pub const CMT_TENOR_LABELS: [&str; 12] = [
    "1mo", "2mo", "3mo", "6mo", "1yr", "2yr", "3yr", "5yr", "7yr", "10yr", "20yr", "30yr",
];

/// One published yield-curve observation: per-tenor rates in percent.
///
/// Individual tenors may be missing on a given date (newly introduced
/// tenors, suspended columns); the interpolator handles the gaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCurvePoint {
    pub date: NaiveDate,
    /// Percent rates aligned with [`CMT_TENOR_MONTHS`].
    pub tenors: [Option<f64>; 12],
}

impl RateCurvePoint {
    pub fn new(date: NaiveDate, tenors: [Option<f64>; 12]) -> Self {
        Self { date, tenors }
    }

    /// Linearly blend two curve observations, weighting each tenor column
    /// independently. A tenor missing on one side takes the other side's
    /// value; missing on both stays missing.
    pub fn blend(date: NaiveDate, before: &Self, after: &Self, weight_after: f64) -> Self {
        let mut tenors = [None; 12];
        for (i, slot) in tenors.iter_mut().enumerate() {
            *slot = match (before.tenors[i], after.tenors[i]) {
                (Some(a), Some(b)) => Some(a * (1.0 - weight_after) + b * weight_after),
                (Some(a), None) => Some(a),
                (None, Some(b)) => Some(b),
                (None, None) => None,
            };
        }
        Self { date, tenors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn d(x: f64) -> Decimal {
        Decimal::from_f64(x).unwrap()
    }

    fn quote(strike: f64, root: RootSymbol) -> OptionQuote {
        OptionQuote {
            quote_timestamp: NaiveDate::from_ymd_opt(2020, 6, 15)
                .unwrap()
                .and_hms_opt(16, 15, 0)
                .unwrap(),
            root,
            expiration: NaiveDate::from_ymd_opt(2020, 7, 10).unwrap(),
            dte: 25,
            strike: d(strike),
            bid: d(1.0),
            mid: d(1.5),
            open_interest: 10,
            volume: 5,
            iv: 0.2,
        }
    }

    #[test]
    fn test_root_symbol_parsing() {
        assert_eq!(RootSymbol::from_str("SPX"), Some(RootSymbol::Standard));
        assert_eq!(RootSymbol::from_str("spxw"), Some(RootSymbol::Weekly));
        assert_eq!(RootSymbol::from_str("NDX"), None);
        assert_eq!(RootSymbol::Standard.other(), RootSymbol::Weekly);
    }

    #[test]
    fn test_settlement_minutes() {
        assert_eq!(RootSymbol::Standard.settlement_minutes(), 570.0);
        assert_eq!(RootSymbol::Weekly.settlement_minutes(), 960.0);
    }

    #[test]
    fn test_nearest_strike() {
        let series = OptionSeries {
            side: Some(OptionSide::Call),
            dte: 25,
            expiration: None,
            quotes: vec![
                quote(2900.0, RootSymbol::Weekly),
                quote(2950.0, RootSymbol::Weekly),
                quote(3000.0, RootSymbol::Weekly),
            ],
        };
        assert_eq!(series.nearest_strike_idx(d(2940.0)), Some(1));
        assert_eq!(series.nearest_strike_idx(d(5000.0)), Some(2));
        assert!(series.at_strike(d(2950.0)).is_some());
        assert!(series.at_strike(d(2949.0)).is_none());
    }

    #[test]
    fn test_unique_root() {
        let mut series = OptionSeries {
            side: Some(OptionSide::Call),
            dte: 25,
            expiration: None,
            quotes: vec![
                quote(2900.0, RootSymbol::Weekly),
                quote(2950.0, RootSymbol::Weekly),
            ],
        };
        assert_eq!(series.unique_root(), Some(RootSymbol::Weekly));

        series.quotes.push(quote(3000.0, RootSymbol::Standard));
        assert_eq!(series.unique_root(), None);
    }

    #[test]
    fn test_curve_blend() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 24).unwrap();
        let mut before = [Some(1.0); 12];
        let mut after = [Some(2.0); 12];
        before[3] = None;
        after[4] = None;
        before[5] = None;
        after[5] = None;

        let a = RateCurvePoint::new(date.pred_opt().unwrap(), before);
        let b = RateCurvePoint::new(date.succ_opt().unwrap(), after);
        let mid = RateCurvePoint::blend(date, &a, &b, 0.5);

        assert_eq!(mid.tenors[0], Some(1.5));
        assert_eq!(mid.tenors[3], Some(2.0));
        assert_eq!(mid.tenors[4], Some(1.0));
        assert_eq!(mid.tenors[5], None);
    }
}
