//! Forward price derivation and strike-ladder assembly.
//!
//! The forward for a term comes from put-call parity at the strike where
//! the call and put mids diverge least, which is the point least distorted
//! by bid/ask noise. The ladder is the ordered out-of-the-money strip the
//! variance sum integrates over: puts below the central strike, calls
//! above, and the central strike contributing once from each side.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::data::types::OptionSeries;

/// Local failures mapped to `EngineError::InvariantViolation` by the
/// orchestrator, which attaches the date and step.
#[derive(Error, Debug)]
pub enum LadderError {
    #[error("option series is empty")]
    EmptySeries,

    #[error("no strike quoted on both sides")]
    NoParityPair,

    #[error("no strike at or near the central strike {0}")]
    MissingCentralStrike(Decimal),

    #[error("ladder has {0} strikes, need at least 2")]
    TooFewStrikes(usize),
}

/// One variance-sum position: strike, out-of-the-money mid, and the strike
/// interval it represents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderPoint {
    pub strike: f64,
    pub mid: f64,
    pub interval: f64,
}

/// The assembled strike ladder for one term.
#[derive(Debug, Clone)]
pub struct StrikeLadder {
    /// Central strike K0: the traded strike nearest the forward.
    pub central_strike: f64,
    pub points: Vec<LadderPoint>,
}

/// Forward price from the put-call pair with minimum mid discrepancy:
/// `F = K + exp(R·T)·(call_mid − put_mid)`.
pub fn forward_price(
    calls: &OptionSeries,
    puts: &OptionSeries,
    rate: f64,
    year_fraction: f64,
) -> Result<f64, LadderError> {
    if calls.is_empty() || puts.is_empty() {
        return Err(LadderError::EmptySeries);
    }

    let mut best: Option<(Decimal, f64, f64)> = None; // (gap, strike, signed diff)
    for call in &calls.quotes {
        let Some(put) = puts.at_strike(call.strike) else {
            continue;
        };
        let gap = (call.mid - put.mid).abs();
        if best.as_ref().map_or(true, |(g, _, _)| gap < *g) {
            let diff = (call.mid - put.mid).to_f64().unwrap_or(0.0);
            best = Some((gap, call.strike.to_f64().unwrap_or(0.0), diff));
        }
    }

    let (_, strike, diff) = best.ok_or(LadderError::NoParityPair)?;
    Ok(strike + (rate * year_fraction).exp() * diff)
}

/// Assemble the variance ladder around the forward price.
///
/// The central strike K0 appears twice: once carrying the put mid (the
/// put-side at-the-money boundary) and once carrying the call mid (the
/// call-side boundary). Together with half-interval spacing this gives K0
/// the average of its two mids over a full interval, which is how the
/// reference methodology treats the at-the-money strike. It looks like a
/// duplication bug; it is not.
///
/// If a side has no quote at exactly K0 (possible on the next-term side),
/// the nearest available strike substitutes and the same construction
/// applies.
pub fn strike_ladder(
    calls: &OptionSeries,
    puts: &OptionSeries,
    forward: f64,
) -> Result<StrikeLadder, LadderError> {
    if calls.is_empty() || puts.is_empty() {
        return Err(LadderError::EmptySeries);
    }

    let k0_idx = nearest_to_forward(calls, forward).ok_or(LadderError::EmptySeries)?;
    let k0 = calls.quotes[k0_idx].strike;

    let put_boundary_idx = match puts.quotes.iter().position(|q| q.strike == k0) {
        Some(idx) => idx,
        None => puts
            .nearest_strike_idx(k0)
            .ok_or(LadderError::MissingCentralStrike(k0))?,
    };

    let mut entries: Vec<(Decimal, f64)> = Vec::with_capacity(calls.len() + puts.len());

    // Puts strictly below the put-side boundary, then the boundary itself.
    for q in &puts.quotes[..put_boundary_idx] {
        entries.push((q.strike, q.mid.to_f64().unwrap_or(0.0)));
    }
    let put_boundary = &puts.quotes[put_boundary_idx];
    entries.push((put_boundary.strike, put_boundary.mid.to_f64().unwrap_or(0.0)));

    // Call-side boundary at K0, then calls strictly above it.
    let call_boundary = &calls.quotes[k0_idx];
    entries.push((call_boundary.strike, call_boundary.mid.to_f64().unwrap_or(0.0)));
    for q in &calls.quotes[k0_idx + 1..] {
        entries.push((q.strike, q.mid.to_f64().unwrap_or(0.0)));
    }

    // Stable sort keeps the put-side boundary ahead of the call-side one.
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    if entries.len() < 2 {
        return Err(LadderError::TooFewStrikes(entries.len()));
    }

    let strikes: Vec<f64> = entries
        .iter()
        .map(|(k, _)| k.to_f64().unwrap_or(0.0))
        .collect();
    let intervals = strike_intervals(&strikes);

    let points = entries
        .iter()
        .enumerate()
        .map(|(i, &(_, mid))| LadderPoint {
            strike: strikes[i],
            mid,
            interval: intervals[i],
        })
        .collect();

    Ok(StrikeLadder {
        central_strike: k0.to_f64().unwrap_or(0.0),
        points,
    })
}

/// Half-distance strike intervals: `(K[i+1] − K[i−1]) / 2` in the
/// interior; boundary intervals duplicate the adjacent interior interval.
fn strike_intervals(strikes: &[f64]) -> Vec<f64> {
    let n = strikes.len();
    let mut intervals = vec![0.0; n];
    for i in 1..n - 1 {
        intervals[i] = (strikes[i + 1] - strikes[i - 1]) / 2.0;
    }
    if n >= 2 {
        intervals[0] = intervals.get(1).copied().unwrap_or(0.0);
        intervals[n - 1] = intervals[n - 2];
    }
    intervals
}

fn nearest_to_forward(calls: &OptionSeries, forward: f64) -> Option<usize> {
    calls
        .quotes
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let da = (a.strike.to_f64().unwrap_or(f64::MAX) - forward).abs();
            let db = (b.strike.to_f64().unwrap_or(f64::MAX) - forward).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
}
