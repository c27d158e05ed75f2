//! Batch orchestration over many trading dates.

pub mod runner;

pub use runner::{BatchFailure, BatchRecord, BatchReport, BatchRunner};
