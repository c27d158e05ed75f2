//! Error taxonomy for the calculation engine.
//!
//! Every failure is attributed to a trading date and a calculation step so
//! batch runs can report per-date reasons without losing successful dates.
//! The engine never retries internally; retry policy belongs to the caller.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::data::store::StoreError;

/// The step of the per-date pipeline an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalcStep {
    FetchRows,
    SelectExpirations,
    SplitChains,
    TimeToExpiry,
    Rates,
    ForwardPrice,
    StrikeLadder,
    Variance,
    Weighting,
}

impl fmt::Display for CalcStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FetchRows => "fetch-rows",
            Self::SelectExpirations => "select-expirations",
            Self::SplitChains => "split-chains",
            Self::TimeToExpiry => "time-to-expiry",
            Self::Rates => "rates",
            Self::ForwardPrice => "forward-price",
            Self::StrikeLadder => "strike-ladder",
            Self::Variance => "variance",
            Self::Weighting => "weighting",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by a per-date calculation.
///
/// Curve gaps are absent here: the rate interpolator recovers from them
/// internally with a fallback rate (a stale rate has bounded impact on the
/// index, unlike every other input).
#[derive(Error, Debug)]
pub enum EngineError {
    /// No valid expiration pair after exhausting window expansions, or no
    /// rows at all for the date. The caller may skip the date or flag it
    /// for re-ingestion.
    #[error("{date} [{step}]: data gap: {detail}")]
    DataGap {
        date: NaiveDate,
        step: CalcStep,
        detail: String,
    },

    /// A methodology invariant failed (missing central strike, ladder too
    /// short). Fatal for the date, not retried.
    #[error("{date} [{step}]: invariant violation: {detail}")]
    InvariantViolation {
        date: NaiveDate,
        step: CalcStep,
        detail: String,
    },

    /// The backing store failed.
    #[error("{date} [{step}]: store failure")]
    Store {
        date: NaiveDate,
        step: CalcStep,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::DataGap { date, .. }
            | Self::InvariantViolation { date, .. }
            | Self::Store { date, .. } => *date,
        }
    }

    pub fn step(&self) -> CalcStep {
        match self {
            Self::DataGap { step, .. }
            | Self::InvariantViolation { step, .. }
            | Self::Store { step, .. } => *step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_attribution() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 24).unwrap();
        let err = EngineError::DataGap {
            date,
            step: CalcStep::SelectExpirations,
            detail: "no valid Friday pair".to_string(),
        };
        assert_eq!(err.date(), date);
        assert_eq!(err.step(), CalcStep::SelectExpirations);
        assert!(err.to_string().contains("select-expirations"));
        assert!(err.to_string().contains("2020-03-24"));
    }
}
