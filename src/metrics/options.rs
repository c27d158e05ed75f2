//! Volume, open-interest and implied-volatility aggregates for the option
//! rows used in a calculation.

use serde::{Deserialize, Serialize};

use crate::data::types::OptionQuoteRow;

/// How far below the underlying a put counts as out-of-the-money for the
/// skew metric.
const OTM_PUT_MONEYNESS: f64 = 0.95;

/// Aggregates over one run's option rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OptionMetrics {
    pub call_volume: i64,
    pub put_volume: i64,
    pub put_call_volume_ratio: f64,

    pub call_oi: i64,
    pub put_oi: i64,
    pub put_call_oi_ratio: f64,

    pub avg_call_iv: f64,
    pub avg_put_iv: f64,
    pub put_call_iv_ratio: f64,

    /// Mean OTM-put IV over mean put IV; 1.0 when no OTM puts exist.
    pub otm_put_iv_skew: f64,
}

impl OptionMetrics {
    pub fn from_rows(rows: &[OptionQuoteRow]) -> Self {
        if rows.is_empty() {
            return Self {
                otm_put_iv_skew: 1.0,
                ..Self::default()
            };
        }

        let call_volume: i64 = rows.iter().map(|r| r.call_volume).sum();
        let put_volume: i64 = rows.iter().map(|r| r.put_volume).sum();
        let call_oi: i64 = rows.iter().map(|r| r.call_open_interest).sum();
        let put_oi: i64 = rows.iter().map(|r| r.put_open_interest).sum();

        let avg_call_iv = mean(rows.iter().map(|r| r.call_iv));
        let avg_put_iv = mean(rows.iter().map(|r| r.put_iv));

        let underlying = rows[0].underlying_close;
        let otm_cutoff = underlying * OTM_PUT_MONEYNESS;
        let otm_put_iv = mean(
            rows.iter()
                .filter(|r| strike_f64(r) < otm_cutoff)
                .map(|r| r.put_iv),
        );

        Self {
            call_volume,
            put_volume,
            put_call_volume_ratio: ratio(put_volume as f64, call_volume as f64),
            call_oi,
            put_oi,
            put_call_oi_ratio: ratio(put_oi as f64, call_oi as f64),
            avg_call_iv,
            avg_put_iv,
            put_call_iv_ratio: ratio(avg_put_iv, avg_call_iv),
            otm_put_iv_skew: if otm_put_iv > 0.0 && avg_put_iv > 0.0 {
                otm_put_iv / avg_put_iv
            } else {
                1.0
            },
        }
    }
}

fn strike_f64(row: &OptionQuoteRow) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    row.strike.to_f64().unwrap_or(0.0)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
