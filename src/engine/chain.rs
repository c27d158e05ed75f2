//! Chain validation and splitting.
//!
//! Partitions the selected rows into four strike-ordered series (near
//! calls, near puts, next calls, next puts) and resolves which quoting
//! series (standard vs weekly) each term belongs to. Two series can quote
//! the same underlying at the same expiration, so resolution is a small
//! decision table rather than a guess from the first row.

use chrono::NaiveDate;

use crate::data::types::{OptionChainPair, OptionQuoteRow, OptionSeries, OptionSide, RootSymbol};
use crate::engine::error::{CalcStep, EngineError};
use crate::engine::expiration::ExpirationCandidate;

/// Root-symbol situation across the two terms.
///
/// Each branch is independently testable; `resolve` collapses it to the
/// per-term roots the settlement convention needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootResolution {
    /// Each term quotes a single series.
    BothUnique(RootSymbol, RootSymbol),
    /// Near term mixes series; it takes the series the next term does not use.
    NearAmbiguous(RootSymbol),
    /// Next term mixes series; it takes the series the near term does not use.
    NextAmbiguous(RootSymbol),
    /// Both terms mix series; roots stay unresolved and the settlement
    /// convention falls back to its default.
    BothAmbiguous,
}

impl RootResolution {
    pub fn classify(near: Option<RootSymbol>, next: Option<RootSymbol>) -> Self {
        match (near, next) {
            (Some(a), Some(b)) => Self::BothUnique(a, b),
            (None, Some(b)) => Self::NearAmbiguous(b),
            (Some(a), None) => Self::NextAmbiguous(a),
            (None, None) => Self::BothAmbiguous,
        }
    }

    /// Resolved (near, next) roots.
    pub fn resolve(self) -> (Option<RootSymbol>, Option<RootSymbol>) {
        match self {
            Self::BothUnique(a, b) => (Some(a), Some(b)),
            Self::NearAmbiguous(b) => (Some(b.other()), Some(b)),
            Self::NextAmbiguous(a) => (Some(a), Some(a.other())),
            Self::BothAmbiguous => (None, None),
        }
    }
}

/// Split rows into the four per-term, per-side series.
///
/// Each output series is sorted ascending by strike with duplicate strikes
/// collapsed (first row wins). Fails with a data gap when either term has
/// no rows at all.
pub fn split(
    quote_date: NaiveDate,
    near: &ExpirationCandidate,
    next: &ExpirationCandidate,
    rows: &[OptionQuoteRow],
) -> Result<OptionChainPair, EngineError> {
    let near_calls = project(rows, near.dte, OptionSide::Call);
    let near_puts = project(rows, near.dte, OptionSide::Put);
    let next_calls = project(rows, next.dte, OptionSide::Call);
    let next_puts = project(rows, next.dte, OptionSide::Put);

    for (name, series) in [
        ("near calls", &near_calls),
        ("near puts", &near_puts),
        ("next calls", &next_calls),
        ("next puts", &next_puts),
    ] {
        if series.is_empty() {
            return Err(EngineError::DataGap {
                date: quote_date,
                step: CalcStep::SplitChains,
                detail: format!("{name} series is empty (DTE {})", series.dte),
            });
        }
    }

    let resolution =
        RootResolution::classify(near_calls.unique_root(), next_calls.unique_root());
    let (near_root, next_root) = resolution.resolve();

    Ok(OptionChainPair {
        near_calls,
        near_puts,
        next_calls,
        next_puts,
        near_root,
        next_root,
    })
}

fn project(rows: &[OptionQuoteRow], dte: i32, side: OptionSide) -> OptionSeries {
    let mut quotes: Vec<_> = rows
        .iter()
        .filter(|r| r.dte == dte)
        .map(|r| r.side(side))
        .collect();
    quotes.sort_by(|a, b| a.strike.cmp(&b.strike));
    quotes.dedup_by(|a, b| a.strike == b.strike);

    OptionSeries {
        side: Some(side),
        dte,
        expiration: quotes.first().map(|q| q.expiration),
        quotes,
    }
}
