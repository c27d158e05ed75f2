//! Discretized model-free variance for one expiration term.

use crate::engine::forward::StrikeLadder;

/// Variance contribution of one strike ladder:
///
/// `sigma² = (2/T)·Σ ΔK·exp(R·T)·mid/K² − (1/T)·(F/K0 − 1)²`
///
/// No smoothing or outlier rejection: every quoted strike that survived the
/// nonzero-bid filter contributes.
pub fn sigma(ladder: &StrikeLadder, forward: f64, year_fraction: f64, rate: f64) -> f64 {
    let growth = (rate * year_fraction).exp();
    let sum: f64 = ladder
        .points
        .iter()
        .map(|p| p.interval * growth * p.mid / (p.strike * p.strike))
        .sum();

    let parity = (forward / ladder.central_strike - 1.0).powi(2);
    (2.0 * sum - parity) / year_fraction
}
