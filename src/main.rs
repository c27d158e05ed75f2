//! # Calculate one date
//! vixcalc run --date 2020-11-24 --data data/spx
//!
//! # Calculate a range and export results
//! vixcalc batch --start 2020-01-02 --end 2020-12-31 --data data/spx --output results/vix_2020.csv

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vixcalc::batch::BatchRunner;
use vixcalc::data::{IndexStore, OptionStore, ParquetStore};
use vixcalc::engine::{ExpirationCalendar, VixCalculator, VixComponents};
use vixcalc::metrics::OptionMetrics;

#[derive(Parser)]
#[command(name = "vixcalc")]
#[command(about = "CBOE-methodology VIX calculation engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calculate the index for a single trading date
    Run {
        /// Trading date (YYYY-MM-DD)
        #[arg(short = 'D', long)]
        date: NaiveDate,

        /// Path to data directory
        #[arg(short, long, default_value = "data/spx")]
        data: String,
    },

    /// Calculate a date range in parallel and export results
    Batch {
        /// First trading date (YYYY-MM-DD)
        #[arg(short, long)]
        start: NaiveDate,

        /// Last trading date (YYYY-MM-DD)
        #[arg(short, long)]
        end: NaiveDate,

        /// Path to data directory
        #[arg(short, long, default_value = "data/spx")]
        data: String,

        /// Output CSV path
        #[arg(short, long, default_value = "results/vix.csv")]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { date, data } => run_single(date, &data),
        Commands::Batch {
            start,
            end,
            data,
            output,
        } => run_batch(start, end, &data, &output),
    }
}

fn run_single(date: NaiveDate, data: &str) -> anyhow::Result<()> {
    let store = ParquetStore::new(data);
    let calendar = calendar_for(date.year(), date.year());
    let mut calc = VixCalculator::new(store.clone(), store.clone(), calendar);

    let components = calc
        .calculate(date)
        .with_context(|| format!("calculation failed for {date}"))?;
    let metrics = OptionMetrics::from_rows(calc.last_rows());

    print_components(&components);
    println!(
        "put/call volume ratio: {:.3}  OTM put IV skew: {:.3}",
        metrics.put_call_volume_ratio, metrics.otm_put_iv_skew
    );

    match store.index_close(date) {
        Ok(Some(market)) => {
            let diff = (components.vix - market).abs();
            println!("market close: {market:.2}  difference: {diff:.4}");
        }
        Ok(None) => {}
        Err(e) => eprintln!("index close unavailable: {e}"),
    }
    Ok(())
}

fn run_batch(
    start: NaiveDate,
    end: NaiveDate,
    data: &str,
    output: &std::path::Path,
) -> anyhow::Result<()> {
    anyhow::ensure!(start <= end, "start date {start} is after end date {end}");

    let store = ParquetStore::new(data);
    let dates = store
        .trading_dates(start, end)
        .with_context(|| format!("no trading dates found in {start}..{end}"))?;
    anyhow::ensure!(!dates.is_empty(), "no option data between {start} and {end}");

    let runner = BatchRunner::new(store.clone(), store.clone(), calendar_for(start.year(), end.year()))
        .with_index_store(store);
    let report = runner.run(&dates);

    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    report
        .write_csv(output)
        .with_context(|| format!("writing {}", output.display()))?;

    print!("{}", report.summary());
    Ok(())
}

// Expirations can land up to the widened window past year end.
fn calendar_for(start_year: i32, end_year: i32) -> ExpirationCalendar {
    ExpirationCalendar::fridays(start_year, end_year + 1)
}

fn print_components(c: &VixComponents) {
    println!("{}  VIX {:.4}", c.date, c.vix);
    println!(
        "  near: dte {:>3}  T {:.6}  R {:.6}  F {:.2}  K0 {:.0}  sigma {:.6}",
        c.dte1, c.t1, c.r1, c.f1, c.k0_1, c.sigma1
    );
    println!(
        "  next: dte {:>3}  T {:.6}  R {:.6}  F {:.2}  K0 {:.0}  sigma {:.6}",
        c.dte2, c.t2, c.r2, c.f2, c.k0_2, c.sigma2
    );
}
