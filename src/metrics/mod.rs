//! Option-chain aggregate metrics.
//!
//! Computed by a collaborator over the exact rows a calculation used; the
//! engine itself never touches these.

pub mod options;

pub use options::OptionMetrics;
