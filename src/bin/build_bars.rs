//! Build sealed range bars from a raw tick CSV export.
//!
//! Reads a tick export (DateTime, Price, Volume, Side, with aliases accepted),
//! aggregates it into fixed-range bars and writes them back out as CSV.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rangeflow::{
    import::load_ticks_csv, AggregatorConfig, BarSource, SessionClock, TickAggregator,
};

#[derive(Parser, Debug)]
#[command(name = "build-bars")]
#[command(about = "Convert a raw tick CSV export into fixed-range bars")]
struct Args {
    /// Path to the tick CSV export
    #[arg(short, long)]
    input: PathBuf,

    /// Output CSV path for sealed bars
    #[arg(short, long)]
    output: PathBuf,

    /// Bar range in points (ES: 20 points = 80 ticks)
    #[arg(short, long, default_value = "20.0")]
    range: f64,

    /// Session open time, Eastern ("HH:MM"); resets CVD and bar indices
    #[arg(long, default_value = "18:00")]
    session_start: String,

    /// Symbol stamped on the bars
    #[arg(short, long, default_value = "ES")]
    symbol: String,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG overrides; --verbose sets the fallback level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.range <= 0.0 {
        bail!("--range must be positive, got {}", args.range);
    }
    let session = SessionClock::parse(&args.session_start)
        .with_context(|| format!("invalid --session-start {:?}", args.session_start))?;

    let ticks = load_ticks_csv(&args.input)?;
    info!("Loaded {} ticks from {:?}", ticks.len(), args.input);

    let mut aggregator = TickAggregator::new(AggregatorConfig {
        range_points: args.range,
        symbol: args.symbol,
        session,
        source: BarSource::Backfill,
        ..AggregatorConfig::default()
    });

    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("failed to create {:?}", args.output))?;

    let mut sealed = 0usize;
    for (i, tick) in ticks.iter().enumerate() {
        let bar = aggregator
            .ingest(tick)
            .with_context(|| format!("tick {} rejected", i + 1))?;
        if let Some(bar) = bar {
            writer.serialize(&bar)?;
            sealed += 1;
        }
    }
    writer.flush()?;

    if let Some(forming) = aggregator.forming() {
        info!(
            "Leftover forming bar with {} contracts (range {:.2}) not written",
            forming.volume,
            forming.range()
        );
    }
    info!("Wrote {} sealed bars to {:?}", sealed, args.output);

    Ok(())
}
