//! Parallel batch runner.
//!
//! Calculations for distinct dates are embarrassingly parallel: each worker
//! gets its own store handles (cloned) and its own calculator, so nothing
//! is shared or mutated across dates. Per-date failures are captured with
//! their step attribution instead of aborting the batch, and retry policy
//! (e.g. after re-ingestion) stays with the caller.

use std::path::Path;

use chrono::NaiveDate;
use indicatif::ProgressBar;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::data::store::{IndexStore, InMemoryStore, OptionStore, RateStore, StoreError};
use crate::engine::calendar::ExpirationCalendar;
use crate::engine::expiration::SelectorConfig;
use crate::engine::rates::RateConfig;
use crate::engine::vix::{VixCalculator, VixComponents};
use crate::metrics::OptionMetrics;

/// One successfully calculated date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRecord {
    pub components: VixComponents,
    pub metrics: OptionMetrics,
    /// Published index close for the date, when an index store is wired in.
    pub market_index: Option<f64>,
    /// |calculated − market|.
    pub index_diff: Option<f64>,
    pub calc_secs: f64,
}

/// One failed date with its step attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub date: NaiveDate,
    pub step: String,
    pub reason: String,
}

/// Outcome of a batch run: successes and failures, both date-ordered.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub records: Vec<BatchRecord>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    /// Human-readable accuracy summary against the market index.
    pub fn summary(&self) -> String {
        let diffs: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.index_diff)
            .collect();

        let mut out = format!(
            "Calculated {} dates ({} failed)\n",
            self.records.len(),
            self.failures.len()
        );
        if !diffs.is_empty() {
            let n = diffs.len() as f64;
            let mean = diffs.iter().sum::<f64>() / n;
            let (max_idx, max) = diffs
                .iter()
                .enumerate()
                .fold((0, f64::MIN), |acc, (i, &d)| {
                    if d > acc.1 {
                        (i, d)
                    } else {
                        acc
                    }
                });
            let max_date = self
                .records
                .iter()
                .filter(|r| r.index_diff.is_some())
                .nth(max_idx)
                .map(|r| r.components.date.to_string())
                .unwrap_or_default();
            let within = |tol: f64| diffs.iter().filter(|&&d| d < tol).count() as f64 / n * 100.0;

            out.push_str(&format!("Mean difference: {mean:.6}\n"));
            out.push_str(&format!("Max difference: {max:.6} ({max_date})\n"));
            out.push_str(&format!("Within 0.01: {:.1}%\n", within(0.01)));
            out.push_str(&format!("Within 0.1: {:.1}%\n", within(0.1)));
        }
        for f in &self.failures {
            out.push_str(&format!("FAILED {} [{}]: {}\n", f.date, f.step, f.reason));
        }
        out
    }

    /// Flatten results to a frame matching the historical results schema.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let r = &self.records;
        df!(
            "date" => r.iter().map(|x| x.components.date.to_string()).collect::<Vec<_>>(),
            "calculated_vix" => r.iter().map(|x| x.components.vix).collect::<Vec<_>>(),
            "market_vix" => r.iter().map(|x| x.market_index).collect::<Vec<_>>(),
            "vix_diff" => r.iter().map(|x| x.index_diff).collect::<Vec<_>>(),
            "dte1" => r.iter().map(|x| x.components.dte1).collect::<Vec<_>>(),
            "dte2" => r.iter().map(|x| x.components.dte2).collect::<Vec<_>>(),
            "f1" => r.iter().map(|x| x.components.f1).collect::<Vec<_>>(),
            "f2" => r.iter().map(|x| x.components.f2).collect::<Vec<_>>(),
            "k0_1" => r.iter().map(|x| x.components.k0_1).collect::<Vec<_>>(),
            "k0_2" => r.iter().map(|x| x.components.k0_2).collect::<Vec<_>>(),
            "sigma1" => r.iter().map(|x| x.components.sigma1).collect::<Vec<_>>(),
            "sigma2" => r.iter().map(|x| x.components.sigma2).collect::<Vec<_>>(),
            "r1" => r.iter().map(|x| x.components.r1).collect::<Vec<_>>(),
            "r2" => r.iter().map(|x| x.components.r2).collect::<Vec<_>>(),
            "call_volume" => r.iter().map(|x| x.metrics.call_volume).collect::<Vec<_>>(),
            "put_volume" => r.iter().map(|x| x.metrics.put_volume).collect::<Vec<_>>(),
            "put_call_volume_ratio" => r.iter().map(|x| x.metrics.put_call_volume_ratio).collect::<Vec<_>>(),
            "call_oi" => r.iter().map(|x| x.metrics.call_oi).collect::<Vec<_>>(),
            "put_oi" => r.iter().map(|x| x.metrics.put_oi).collect::<Vec<_>>(),
            "put_call_oi_ratio" => r.iter().map(|x| x.metrics.put_call_oi_ratio).collect::<Vec<_>>(),
            "avg_call_iv" => r.iter().map(|x| x.metrics.avg_call_iv).collect::<Vec<_>>(),
            "avg_put_iv" => r.iter().map(|x| x.metrics.avg_put_iv).collect::<Vec<_>>(),
            "otm_put_iv_skew" => r.iter().map(|x| x.metrics.otm_put_iv_skew).collect::<Vec<_>>(),
            "calc_secs" => r.iter().map(|x| x.calc_secs).collect::<Vec<_>>(),
        )
    }

    /// Export the results to CSV.
    pub fn write_csv(&self, path: &Path) -> Result<(), StoreError> {
        let mut df = self.to_dataframe()?;
        let mut file = std::fs::File::create(path)?;
        CsvWriter::new(&mut file).finish(&mut df)?;
        info!(path = %path.display(), rows = df.height(), "wrote batch results");
        Ok(())
    }
}

/// Runs the calculator over a set of dates with a bounded worker pool.
#[derive(Debug, Clone)]
pub struct BatchRunner<S, R, I = InMemoryStore> {
    options: S,
    rates: R,
    index: Option<I>,
    calendar: ExpirationCalendar,
    selector_config: SelectorConfig,
    rate_config: RateConfig,
}

impl<S, R, I> BatchRunner<S, R, I>
where
    S: OptionStore + Clone + Send + Sync,
    R: RateStore + Clone + Send + Sync,
    I: IndexStore + Sync,
{
    pub fn new(options: S, rates: R, calendar: ExpirationCalendar) -> Self {
        Self {
            options,
            rates,
            index: None,
            calendar,
            selector_config: SelectorConfig::default(),
            rate_config: RateConfig::default(),
        }
    }

    /// Wire in a source of known-good index closes for validation columns.
    pub fn with_index_store(mut self, index: I) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_selector_config(mut self, config: SelectorConfig) -> Self {
        self.selector_config = config;
        self
    }

    pub fn with_rate_config(mut self, config: RateConfig) -> Self {
        self.rate_config = config;
        self
    }

    /// Calculate every date, in parallel, capturing per-date failures.
    pub fn run(&self, dates: &[NaiveDate]) -> BatchReport {
        info!(dates = dates.len(), "starting batch run");
        let progress = ProgressBar::new(dates.len() as u64);

        let outcomes: Vec<Result<BatchRecord, BatchFailure>> = dates
            .par_iter()
            .map(|&date| {
                let outcome = self.run_one(date);
                progress.inc(1);
                outcome
            })
            .collect();
        progress.finish_and_clear();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(record) => report.records.push(record),
                Err(failure) => {
                    error!(date = %failure.date, step = %failure.step, reason = %failure.reason, "date failed");
                    report.failures.push(failure);
                }
            }
        }
        info!(
            ok = report.records.len(),
            failed = report.failures.len(),
            "batch run complete"
        );
        report
    }

    fn run_one(&self, date: NaiveDate) -> Result<BatchRecord, BatchFailure> {
        // Cloned stores: each parallel date gets its own session.
        let mut calc =
            VixCalculator::new(self.options.clone(), self.rates.clone(), self.calendar.clone())
                .with_selector_config(self.selector_config)
                .with_rate_config(self.rate_config);

        let start = std::time::Instant::now();
        let components = calc.calculate(date).map_err(|e| BatchFailure {
            date,
            step: e.step().to_string(),
            reason: e.to_string(),
        })?;
        let calc_secs = start.elapsed().as_secs_f64();

        let metrics = OptionMetrics::from_rows(calc.last_rows());
        let market_index = match &self.index {
            Some(store) => store.index_close(date).unwrap_or_else(|e| {
                error!(date = %date, error = %e, "index close lookup failed");
                None
            }),
            None => None,
        };
        let index_diff = market_index.map(|m| (components.vix - m).abs());

        Ok(BatchRecord {
            components,
            metrics,
            market_index,
            index_diff,
            calc_secs,
        })
    }
}
