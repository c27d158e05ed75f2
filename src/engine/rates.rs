//! Term-matched risk-free rate interpolation.
//!
//! Rates come from the published constant-maturity treasury curve. Two
//! interpolations happen: across calendar dates when the quote date has no
//! published curve, and across tenors to match the option term. The
//! published semi-annual bond-equivalent percentage is then converted to a
//! continuously-compounded decimal rate.
//!
//! Unlike every other engine input, a missing curve does not abort the
//! calculation: a stale or default rate has bounded impact on the final
//! index, so total curve gaps recover to a configurable fallback rate.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::store::{RateStore, StoreError};
use crate::data::types::{RateCurvePoint, CMT_TENOR_LABELS, CMT_TENOR_MONTHS};

/// Rate-recovery policy. The fallback and floor values are methodology
/// policy rather than derived constants, so they are configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateConfig {
    /// Days to search backwards for a published curve.
    pub lookback_days: u64,
    /// Days to search forwards for a published curve.
    pub lookahead_days: u64,
    /// Continuous rate used when no curve data exists at all.
    pub fallback_rate: f64,
    /// Floor applied when the converted annual rate is numerically invalid.
    pub min_continuous_rate: f64,
}

impl Default for RateConfig {
    fn default() -> Self {
        Self {
            lookback_days: 5,
            lookahead_days: 5,
            fallback_rate: 0.001,
            min_continuous_rate: 0.0001,
        }
    }
}

/// Recovered internally by [`RateInterpolator::rates_for_terms`]; exposed
/// for callers that want the hard-failing variant.
#[derive(Error, Debug)]
pub enum CurveGapError {
    #[error("no curve data within -{lookback}/+{lookahead} days of {date}")]
    NoData {
        date: NaiveDate,
        lookback: u64,
        lookahead: u64,
    },

    #[error("curve observations do not bracket {date}")]
    OneSided { date: NaiveDate },

    #[error("rate store failure")]
    Store(#[from] StoreError),
}

/// Interpolates term-matched continuous rates from a [`RateStore`].
#[derive(Debug, Clone, Default)]
pub struct RateInterpolator {
    config: RateConfig,
}

impl RateInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RateConfig {
        &self.config
    }

    /// Continuous rates for the two option terms. Curve gaps recover to
    /// the fallback rate instead of failing the calculation.
    pub fn rates_for_terms<R: RateStore>(
        &self,
        store: &R,
        quote_date: NaiveDate,
        near_dte: f64,
        next_dte: f64,
    ) -> (f64, f64) {
        match self.curve_for_date(store, quote_date) {
            Ok(curve) => (
                self.rate_for_expiry(near_dte, &curve),
                self.rate_for_expiry(next_dte, &curve),
            ),
            Err(err) => {
                warn!(
                    date = %quote_date,
                    fallback = self.config.fallback_rate,
                    error = %err,
                    "curve gap, using fallback rate for both terms"
                );
                (self.config.fallback_rate, self.config.fallback_rate)
            }
        }
    }

    /// The curve for `date`: the published observation when one exists,
    /// otherwise a calendar-weighted blend of the nearest observations
    /// before and after, each tenor column weighted independently.
    pub fn curve_for_date<R: RateStore>(
        &self,
        store: &R,
        date: NaiveDate,
    ) -> Result<RateCurvePoint, CurveGapError> {
        let start = date
            .checked_sub_days(Days::new(self.config.lookback_days))
            .unwrap_or(date);
        let end = date
            .checked_add_days(Days::new(self.config.lookahead_days))
            .unwrap_or(date);

        let curves = store.curves_between(start, end)?;
        if curves.is_empty() {
            return Err(CurveGapError::NoData {
                date,
                lookback: self.config.lookback_days,
                lookahead: self.config.lookahead_days,
            });
        }

        if let Some(exact) = curves.iter().find(|c| c.date == date) {
            return Ok(exact.clone());
        }

        let before = curves.iter().filter(|c| c.date < date).max_by_key(|c| c.date);
        let after = curves.iter().filter(|c| c.date > date).min_by_key(|c| c.date);
        let (before, after) = match (before, after) {
            (Some(b), Some(a)) => (b, a),
            _ => return Err(CurveGapError::OneSided { date }),
        };

        let total_days = (after.date - before.date).num_days() as f64;
        let weight_after = (date - before.date).num_days() as f64 / total_days;
        debug!(
            date = %date,
            before = %before.date,
            after = %after.date,
            weight_after,
            "interpolating curve between published dates"
        );
        Ok(RateCurvePoint::blend(date, before, after, weight_after))
    }

    /// Continuous rate for a term of `dte` days against one curve.
    pub fn rate_for_expiry(&self, dte: f64, curve: &RateCurvePoint) -> f64 {
        let months = dte / 30.0;
        let (lo, hi) = bracketing_tenors(months);

        let percent = match (curve.tenors[lo], curve.tenors[hi]) {
            (None, None) => {
                warn!(
                    tenors = ?(CMT_TENOR_LABELS[lo], CMT_TENOR_LABELS[hi]),
                    date = %curve.date,
                    "both bracketing tenors missing, using fallback rate"
                );
                return self.config.fallback_rate;
            }
            (Some(r), None) | (None, Some(r)) => r,
            (Some(rl), Some(rh)) => {
                let (ml, mh) = (CMT_TENOR_MONTHS[lo], CMT_TENOR_MONTHS[hi]);
                if ml == mh {
                    rl
                } else {
                    rl + (rh - rl) * (months - ml) / (mh - ml)
                }
            }
        };

        convert_to_continuous(percent, self.config.min_continuous_rate)
    }
}

/// Indexes of the tenors bracketing `months`, clamped to the shortest and
/// longest published tenors.
fn bracketing_tenors(months: f64) -> (usize, usize) {
    for (i, &m) in CMT_TENOR_MONTHS.iter().enumerate() {
        if m > months {
            return if i == 0 { (0, 0) } else { (i - 1, i) };
        }
    }
    let last = CMT_TENOR_MONTHS.len() - 1;
    (last, last)
}

/// Convert a semi-annual bond-equivalent percentage to a continuous
/// decimal rate: `annual = (1 + r/200)² − 1`, `continuous = ln(1 + annual)`.
/// The conversion degenerates at r = −200% (annual = −1); floor instead of
/// propagating −∞.
pub fn convert_to_continuous(percent: f64, min_continuous_rate: f64) -> f64 {
    let decimal = percent / 100.0;
    let annual = (1.0 + decimal / 2.0).powi(2) - 1.0;
    if annual > -1.0 {
        annual.ln_1p()
    } else {
        min_continuous_rate
    }
}
