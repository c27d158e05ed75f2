//! Expiration selection.
//!
//! Finds the near-term/next-term expiration pair bracketing the 30-day
//! constant maturity. The raw DTE window can land on weeks without two
//! valid Friday expirations (holidays, missing quotes), so the search
//! widens its ceiling one day at a time, up to a bounded number of
//! expansions, and always keeps the *largest two* DTEs found: widening only
//! raises the ceiling, so the freshest valid pair is the top two by DTE and
//! the near term stays above the floor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::store::OptionStore;
use crate::data::types::{OptionQuoteRow, RootSymbol};
use crate::engine::calendar::ExpirationCalendar;
use crate::engine::error::{CalcStep, EngineError};

/// Search-window policy for expiration selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Minimum acceptable near-term DTE (exclusive lower query bound).
    pub dte_floor: i32,
    /// Initial exclusive upper query bound.
    pub initial_ceiling: i32,
    /// How far the ceiling moves per expansion.
    pub expansion_step: i32,
    /// Maximum number of queries before giving up.
    pub max_expansions: u32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            dte_floor: 22,
            initial_ceiling: 38,
            expansion_step: 1,
            max_expansions: 12,
        }
    }
}

/// A valid expiration found in the option data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationCandidate {
    pub expiration: NaiveDate,
    pub dte: i32,
    /// Unique quoting series across the candidate's rows, if unambiguous.
    pub root: Option<RootSymbol>,
}

/// Outcome of a successful selection: the pair plus the exact rows the
/// final query returned (downstream steps consume the same rows).
#[derive(Debug, Clone)]
pub struct Selection {
    pub near: ExpirationCandidate,
    pub next: ExpirationCandidate,
    pub rows: Vec<OptionQuoteRow>,
}

/// Configurable expiration selector over an injected calendar.
#[derive(Debug, Clone)]
pub struct ExpirationSelector {
    config: SelectorConfig,
    calendar: ExpirationCalendar,
}

impl ExpirationSelector {
    pub fn new(calendar: ExpirationCalendar) -> Self {
        Self {
            config: SelectorConfig::default(),
            calendar,
        }
    }

    pub fn with_config(mut self, config: SelectorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Select near/next expirations for `quote_date`, widening the DTE
    /// window until a valid pair appears or expansions are exhausted.
    pub fn select<S: OptionStore>(
        &self,
        store: &S,
        quote_date: NaiveDate,
    ) -> Result<Selection, EngineError> {
        let floor = self.config.dte_floor;
        let mut ceiling = self.config.initial_ceiling;

        for expansion in 0..self.config.max_expansions {
            let rows = store
                .fetch_rows(quote_date, floor, ceiling)
                .map_err(|source| EngineError::Store {
                    date: quote_date,
                    step: CalcStep::FetchRows,
                    source,
                })?;

            if !rows.is_empty() {
                let candidates = self.candidates_from_rows(&rows);
                if let Some((near, next)) = pick_pair(&candidates) {
                    if near.dte >= floor {
                        debug!(
                            date = %quote_date,
                            near = near.dte,
                            next = next.dte,
                            expansion,
                            "selected expiration pair"
                        );
                        return Ok(Selection { near, next, rows });
                    }
                    debug!(
                        date = %quote_date,
                        near = near.dte,
                        floor,
                        "near-term DTE below floor, widening window"
                    );
                }
            }

            ceiling += self.config.expansion_step;
            debug!(date = %quote_date, floor, ceiling, expansion, "expanding DTE window");
        }

        Err(EngineError::DataGap {
            date: quote_date,
            step: CalcStep::SelectExpirations,
            detail: format!(
                "no valid expiration pair in DTE window ({}, {}) after {} expansions",
                floor, ceiling, self.config.max_expansions
            ),
        })
    }

    /// Distinct (DTE, expiration) pairs that land on a valid calendar date,
    /// ascending by DTE. This is the one place candidate validity is
    /// decided; both the widening search and prefetched-row callers use it.
    pub fn candidates_from_rows(&self, rows: &[OptionQuoteRow]) -> Vec<ExpirationCandidate> {
        let mut seen: Vec<(i32, NaiveDate)> = rows
            .iter()
            .map(|r| (r.dte, r.expiration))
            .collect();
        seen.sort();
        seen.dedup();

        seen.into_iter()
            .filter(|(_, expiration)| self.calendar.contains(*expiration))
            .map(|(dte, expiration)| {
                let root = unique_root(rows, dte, expiration);
                ExpirationCandidate {
                    expiration,
                    dte,
                    root,
                }
            })
            .collect()
    }

    /// Largest-two pair from prefetched rows, without window expansion.
    pub fn pair_from_rows(
        &self,
        rows: &[OptionQuoteRow],
    ) -> Option<(ExpirationCandidate, ExpirationCandidate)> {
        pick_pair(&self.candidates_from_rows(rows))
    }
}

/// The largest two candidates by DTE, as (near, next).
fn pick_pair(
    candidates: &[ExpirationCandidate],
) -> Option<(ExpirationCandidate, ExpirationCandidate)> {
    if candidates.len() < 2 {
        return None;
    }
    let next = candidates[candidates.len() - 1].clone();
    let near = candidates[candidates.len() - 2].clone();
    Some((near, next))
}

fn unique_root(rows: &[OptionQuoteRow], dte: i32, expiration: NaiveDate) -> Option<RootSymbol> {
    let mut roots = rows
        .iter()
        .filter(|r| r.dte == dte && r.expiration == expiration)
        .map(|r| r.root);
    let first = roots.next()?;
    roots.all(|r| r == first).then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::store::InMemoryStore;
    use rust_decimal::prelude::FromPrimitive;
    use rust_decimal::Decimal;

    fn row(trade_date: NaiveDate, dte: i32, strike: f64, root: RootSymbol) -> OptionQuoteRow {
        let d = |x: f64| Decimal::from_f64(x).unwrap();
        OptionQuoteRow {
            quote_timestamp: trade_date.and_hms_opt(16, 15, 0).unwrap(),
            trade_date,
            symbol: root.as_str().to_string(),
            root,
            expiration: trade_date + chrono::Days::new(dte as u64),
            dte,
            strike: d(strike),
            call_bid: d(10.0),
            call_mid: d(10.5),
            call_ask: d(11.0),
            put_bid: d(9.0),
            put_mid: d(9.5),
            put_ask: d(10.0),
            call_volume: 1,
            put_volume: 1,
            call_open_interest: 1,
            put_open_interest: 1,
            call_iv: 0.2,
            put_iv: 0.2,
            underlying_close: 3000.0,
        }
    }

    fn selector() -> ExpirationSelector {
        ExpirationSelector::new(ExpirationCalendar::fridays(2019, 2021))
    }

    // 2020-06-15 was a Monday; +25 and +32 days land on Fridays
    // (2020-07-10, 2020-07-17).
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 6, 15).unwrap()
    }

    #[test]
    fn test_select_largest_two_in_initial_window() {
        let date = monday();
        let store = InMemoryStore::new().with_rows(vec![
            row(date, 25, 3000.0, RootSymbol::Weekly),
            row(date, 25, 3050.0, RootSymbol::Weekly),
            row(date, 32, 3000.0, RootSymbol::Standard),
        ]);

        let sel = selector().select(&store, date).unwrap();
        assert_eq!(sel.near.dte, 25);
        assert_eq!(sel.next.dte, 32);
        assert!(sel.near.dte < sel.next.dte);
        assert_eq!(sel.near.root, Some(RootSymbol::Weekly));
        assert_eq!(sel.next.root, Some(RootSymbol::Standard));
        assert_eq!(sel.rows.len(), 3);
    }

    #[test]
    fn test_non_friday_expirations_rejected() {
        let date = monday();
        // +30 days is 2020-07-15, a Wednesday
        let store = InMemoryStore::new().with_rows(vec![
            row(date, 25, 3000.0, RootSymbol::Weekly),
            row(date, 30, 3000.0, RootSymbol::Weekly),
            row(date, 32, 3000.0, RootSymbol::Standard),
        ]);

        let sel = selector().select(&store, date).unwrap();
        assert_eq!((sel.near.dte, sel.next.dte), (25, 32));
    }

    #[test]
    fn test_window_expansion_reaches_far_pair() {
        let date = monday();
        // 39 and 46 days out are Fridays (2020-07-24, 2020-07-31), both
        // beyond the initial ceiling of 38. Nine expansions are needed
        // before 46 < ceiling holds.
        let store = InMemoryStore::new().with_rows(vec![
            row(date, 39, 3000.0, RootSymbol::Weekly),
            row(date, 46, 3000.0, RootSymbol::Weekly),
        ]);

        let sel = selector().select(&store, date).unwrap();
        assert_eq!((sel.near.dte, sel.next.dte), (39, 46));
    }

    #[test]
    fn test_floor_forces_expansion() {
        // Quote date 2020-06-17 (Wednesday): Fridays fall 23, 30 and 44
        // days out. With a floor of 25 the 23-day expiration never enters
        // the window, so the single candidate at 30 forces widening until
        // the pair (30, 44) is visible.
        let date = NaiveDate::from_ymd_opt(2020, 6, 17).unwrap();
        let store = InMemoryStore::new().with_rows(vec![
            row(date, 23, 3000.0, RootSymbol::Weekly),
            row(date, 30, 3000.0, RootSymbol::Weekly),
            row(date, 44, 3000.0, RootSymbol::Weekly),
        ]);

        let config = SelectorConfig {
            dte_floor: 25,
            initial_ceiling: 38,
            expansion_step: 1,
            max_expansions: 12,
        };
        let sel = ExpirationSelector::new(ExpirationCalendar::fridays(2019, 2021))
            .with_config(config)
            .select(&store, date)
            .unwrap();
        assert_eq!((sel.near.dte, sel.next.dte), (30, 44));
    }

    #[test]
    fn test_data_gap_after_exhausted_expansions() {
        let date = monday();
        let store = InMemoryStore::new();

        let err = selector().select(&store, date).unwrap_err();
        match err {
            EngineError::DataGap { date: d, step, .. } => {
                assert_eq!(d, date);
                assert_eq!(step, CalcStep::SelectExpirations);
            }
            other => panic!("expected DataGap, got {other:?}"),
        }
    }

    #[test]
    fn test_single_candidate_is_not_a_pair() {
        let date = monday();
        let store =
            InMemoryStore::new().with_rows(vec![row(date, 25, 3000.0, RootSymbol::Weekly)]);

        assert!(selector().select(&store, date).is_err());
    }

    #[test]
    fn test_mixed_roots_leave_candidate_root_unresolved() {
        let date = monday();
        let rows = vec![
            row(date, 25, 3000.0, RootSymbol::Weekly),
            row(date, 25, 3050.0, RootSymbol::Standard),
            row(date, 32, 3000.0, RootSymbol::Standard),
        ];
        let candidates = selector().candidates_from_rows(&rows);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].root, None);
        assert_eq!(candidates[1].root, Some(RootSymbol::Standard));
    }
}
