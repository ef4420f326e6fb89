//! BackLab CLI — run, validate and monitor commands.
//!
//! Commands:
//! - `run` — backtest a bar file through the dispatcher and write artifacts
//! - `validate` — print data, parameter and result validation reports
//! - `monitor` — replay a bar file in chunks, printing events as JSON lines

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use tracing::{info, warn};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::prelude::*;

use backlab_core::data::{bars_from_frame, random_walk, read_bar_frame};
use backlab_core::domain::Bar;
use backlab_runner::monitor::{CsvStore, MemoryStore, MetricsStore};
use backlab_runner::{
    run_backtest, validate_data, validate_parameters, validate_results, BacktestConfig,
    BacktestJob, BenchmarkSeries, PerformanceTier, RealTimeMonitor,
};

#[derive(Parser)]
#[command(name = "backlab", about = "BackLab — signal backtesting and monitoring")]
struct Cli {
    /// Log at DEBUG instead of INFO.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Bar table (.csv or .parquet).
    #[arg(long)]
    data: Option<PathBuf>,

    /// TOML config file. Every section is optional.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backtest a bar file and write equity_curve.csv and trades.json.
    Run {
        #[command(flatten)]
        source: Source,

        /// Benchmark bar file for relative metrics.
        #[arg(long)]
        benchmark: Option<PathBuf>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        output: PathBuf,

        /// Performance tier: standard, fast or maximum.
        #[arg(long)]
        tier: Option<PerformanceTier>,
    },
    /// Print validation reports for a bar file and the configured parameters.
    Validate {
        #[command(flatten)]
        source: Source,
    },
    /// Replay bars in growing chunks, printing metrics and alert events.
    Monitor {
        #[command(flatten)]
        source: Source,

        /// Use N synthetic bars instead of a data file.
        #[arg(long, conflicts_with = "data")]
        synthetic: Option<usize>,

        /// Seed for synthetic bars.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Directory for metrics_history.csv and alerts_history.csv.
        /// Without it, history is kept in memory only.
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Seconds to wait for the session before stopping it.
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            source,
            benchmark,
            output,
            tier,
        } => run_cmd(&source, benchmark.as_deref(), &output, tier),
        Commands::Validate { source } => validate_cmd(&source),
        Commands::Monitor {
            source,
            synthetic,
            seed,
            store_dir,
            timeout_secs,
        } => monitor_cmd(
            &source,
            synthetic,
            seed,
            store_dir.as_deref(),
            Duration::from_secs(timeout_secs),
        ),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    // Logs go to stderr so stdout stays machine-readable.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(
            Targets::new()
                .with_target("polars", tracing::Level::WARN)
                .with_default(level),
        );
    tracing_subscriber::registry().with(fmt_layer).init();
}

fn load_config(source: &Source) -> Result<BacktestConfig> {
    match &source.config {
        Some(path) => BacktestConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(BacktestConfig::default()),
    }
}

/// The data file from `--data`, falling back to `[data] path` in the config.
fn data_path(source: &Source, config: &BacktestConfig) -> Result<PathBuf> {
    match source.data.as_ref().or(config.data.path.as_ref()) {
        Some(path) => Ok(path.clone()),
        None => bail!("no bar data: pass --data or set [data] path in the config"),
    }
}

fn load_frame(path: &Path) -> Result<DataFrame> {
    read_bar_frame(path).with_context(|| format!("reading bars from {}", path.display()))
}

fn load_bars(df: &DataFrame, signal_column: &str, path: &Path) -> Result<Vec<Bar>> {
    bars_from_frame(df, signal_column)
        .with_context(|| format!("converting bars from {}", path.display()))
}

fn run_cmd(
    source: &Source,
    benchmark: Option<&Path>,
    output: &Path,
    tier: Option<PerformanceTier>,
) -> Result<()> {
    let config = load_config(source)?;
    let path = data_path(source, &config)?;
    let df = load_frame(&path)?;
    let bars = load_bars(&df, &config.data.signal_column, &path)?;

    let mut job = BacktestJob::new(bars, config.simulation.clone());
    if let Some(bench_path) = benchmark.or(config.data.benchmark.as_deref()) {
        let series = BenchmarkSeries::from_frame(&load_frame(bench_path)?)
            .with_context(|| format!("reading benchmark {}", bench_path.display()))?;
        job = job.with_benchmark(series);
    }

    let dispatcher = config
        .dispatch
        .build()
        .context("building backend dispatcher")?;
    let tier = tier.unwrap_or(config.dispatch.tier);
    let dispatched = dispatcher.run(tier, &job).context("backtest failed")?;
    info!(
        backend = %dispatched.backend,
        fell_back = dispatched.fell_back,
        rows = job.row_count(),
        "backtest dispatched"
    );

    let result = &dispatched.result;
    if result.dropped_rows > 0 {
        warn!(dropped = result.dropped_rows, "rows with unusable prices were skipped");
    }
    println!("{}", serde_json::to_string_pretty(&result.metrics)?);

    fs::create_dir_all(output)
        .with_context(|| format!("creating output directory {}", output.display()))?;

    let curve_path = output.join("equity_curve.csv");
    let mut curve = result
        .equity_curve
        .to_frame()
        .context("building equity curve table")?;
    let mut file = fs::File::create(&curve_path)
        .with_context(|| format!("creating {}", curve_path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut curve)
        .with_context(|| format!("writing {}", curve_path.display()))?;

    let trades_path = output.join("trades.json");
    fs::write(&trades_path, serde_json::to_string_pretty(&result.trades)?)
        .with_context(|| format!("writing {}", trades_path.display()))?;

    info!(dir = %output.display(), "artifacts written");
    Ok(())
}

fn validate_cmd(source: &Source) -> Result<()> {
    let config = load_config(source)?;
    let path = data_path(source, &config)?;
    let df = load_frame(&path)?;

    let data_report = validate_data(&df, &config.data.signal_column);
    println!("=== Data: {} ===", path.display());
    print!("{data_report}");

    let param_report = validate_parameters(&config.simulation);
    println!();
    println!("=== Parameters ===");
    print!("{param_report}");

    // A result report needs a runnable table.
    match bars_from_frame(&df, &config.data.signal_column) {
        Ok(bars) => match run_backtest(&BacktestJob::new(bars, config.simulation.clone())) {
            Ok(result) => {
                println!();
                println!("=== Results ===");
                print!("{}", validate_results(&result.equity_curve, &result.trades));
            }
            Err(e) => warn!(error = %e, "skipping result validation"),
        },
        Err(e) => warn!(error = %e, "skipping result validation"),
    }

    Ok(())
}

fn monitor_cmd(
    source: &Source,
    synthetic: Option<usize>,
    seed: u64,
    store_dir: Option<&Path>,
    timeout: Duration,
) -> Result<()> {
    let config = load_config(source)?;
    let bars = match synthetic {
        Some(n) => random_walk(n, seed),
        None => {
            let path = data_path(source, &config)?;
            load_bars(&load_frame(&path)?, &config.data.signal_column, &path)?
        }
    };

    let store: Box<dyn MetricsStore> = match store_dir {
        Some(dir) => Box::new(
            CsvStore::open(dir)
                .with_context(|| format!("opening metrics store in {}", dir.display()))?,
        ),
        None => Box::new(MemoryStore::new()),
    };

    let monitor_config = config.monitor_config();
    let capacity = monitor_config.channel_capacity;
    let dispatcher = Arc::new(
        config
            .dispatch
            .build()
            .context("building backend dispatcher")?,
    );
    let mut monitor = RealTimeMonitor::new(dispatcher, monitor_config, store);
    let events = monitor.subscribe(capacity);

    monitor
        .start(bars, config.simulation.clone())
        .context("starting monitor")?;

    // The publisher closes the channel once the session ends.
    let printer = std::thread::spawn(move || {
        for event in events {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "failed to encode event"),
            }
        }
    });

    let report = match monitor.wait(timeout) {
        Some(report) => report,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "monitor still running, stopping it");
            monitor.stop().context("monitor did not stop cleanly")?
        }
    };
    drop(monitor);
    if printer.join().is_err() {
        warn!("event printer panicked");
    }

    info!(
        chunks = report.chunks_processed,
        failed = report.chunks_failed,
        alerts = report.alerts_raised,
        completed = report.completed,
        "monitor finished"
    );
    Ok(())
}
