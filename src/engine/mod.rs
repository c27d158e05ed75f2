//! The VIX calculation engine.
//!
//! Per-date pipeline: select the bracketing expirations, split the chains,
//! derive forwards and strike ladders, compute the two term variances, and
//! time-weight them to the 30-day constant-maturity index.

pub mod calendar;
pub mod chain;
pub mod error;
pub mod expiration;
pub mod forward;
pub mod rates;
pub mod variance;
pub mod vix;

pub use calendar::ExpirationCalendar;
pub use chain::RootResolution;
pub use error::{CalcStep, EngineError};
pub use expiration::{ExpirationCandidate, ExpirationSelector, Selection, SelectorConfig};
pub use forward::{LadderPoint, StrikeLadder};
pub use rates::{CurveGapError, RateConfig, RateInterpolator};
pub use vix::{TermClock, VixCalculator, VixComponents};
