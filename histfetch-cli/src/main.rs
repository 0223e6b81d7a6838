//! histfetch CLI: batch download of daily price history.
//!
//! Commands:
//! - `download`: fetch history for one or more tickers and print it to stdout
//! - `credentials`: print the current crumb and session cookie

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use histfetch_core::data::{
    BatchDownloader, CombinedTable, DownloadOptions, DownloadProgress, NoProgress, PriceData,
    ProgressBar,
};
use histfetch_core::{FetchConfig, GroupBy, Interval, TickerTable, TimeRange};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "histfetch",
    about = "histfetch: batch download of daily price history"
)]
struct Cli {
    /// TOML config file (endpoints, TTL, throttle, watchlists).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download price history and print it to stdout.
    Download {
        /// Ticker symbols (e.g., SPY QQQ AAPL).
        tickers: Vec<String>,

        /// Add the tickers of a named watchlist from the config file.
        #[arg(long)]
        watchlist: Option<String>,

        /// Start date (YYYY-MM-DD). Defaults to 1950-01-01.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        end: Option<String>,

        /// Bar interval passed through to the data source.
        #[arg(long, default_value = "1d")]
        interval: String,

        /// Rewrite OHLC for dividends and splits.
        #[arg(long, default_value_t = false)]
        auto_adjust: bool,

        /// Outer axis of multi-ticker output: column or ticker.
        #[arg(long, default_value = "column")]
        group_by: GroupBy,

        /// Align every series to the union date axis.
        #[arg(long, default_value_t = false)]
        legacy_shape: bool,

        /// Do not draw the progress bar.
        #[arg(long, default_value_t = false)]
        no_progress: bool,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
    },
    /// Print the current crumb and session cookie.
    Credentials {
        /// Refresh even if the cached pair is still valid.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => FetchConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => FetchConfig::default(),
    };

    match cli.command {
        Commands::Download {
            tickers,
            watchlist,
            start,
            end,
            interval,
            auto_adjust,
            group_by,
            legacy_shape,
            no_progress,
            format,
        } => {
            let mut tickers = tickers;
            if let Some(name) = watchlist {
                tickers.extend(config.watchlist(&name)?.iter().cloned());
            }
            let opts = DownloadOptions {
                range: TimeRange::from_bounds(parse_date(start)?, parse_date(end)?),
                interval: Interval::new(interval),
                auto_adjust,
                group_by,
                legacy_shape,
                show_progress: !no_progress,
            };
            run_download(&config, &tickers, &opts, format)
        }
        Commands::Credentials { force } => run_credentials(&config, force),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn parse_date(value: Option<String>) -> Result<Option<NaiveDate>> {
    value
        .as_deref()
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .transpose()
        .context("dates must be YYYY-MM-DD")
}

fn run_download(
    config: &FetchConfig,
    tickers: &[String],
    opts: &DownloadOptions,
    format: OutputFormat,
) -> Result<()> {
    let downloader = BatchDownloader::new(config)?;
    debug!(tickers = tickers.len(), interval = %opts.interval, "starting download");

    // stdout carries the data, so the bar goes to stderr
    let mut bar;
    let mut none = NoProgress;
    let progress: &mut dyn DownloadProgress = if opts.show_progress {
        bar = ProgressBar::stderr(tickers.len(), "downloaded");
        &mut bar
    } else {
        &mut none
    };

    let download = downloader.download_with_progress(tickers, opts, progress)?;

    let failed = download.report.failed();
    if !failed.is_empty() {
        eprintln!(
            "\nThe following tickers failed to download: {}",
            failed.join(", ")
        );
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &download.data)?;
            writeln!(out)?;
        }
        OutputFormat::Csv => match &download.data {
            PriceData::Single(table) => write_table_csv(&mut out, table)?,
            PriceData::Combined(combined) => write_combined_csv(&mut out, combined)?,
        },
    }
    Ok(())
}

fn write_table_csv<W: Write>(out: W, table: &TickerTable) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let mut header = vec!["Date".to_string()];
    header.extend(table.columns().iter().map(|f| f.label().to_string()));
    writer.write_record(&header)?;

    for row in table.rows() {
        let mut record = vec![row.date.to_string()];
        record.extend(
            table
                .columns()
                .iter()
                .map(|&f| row.value(f).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_combined_csv<W: Write>(out: W, combined: &CombinedTable) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    let (keys, rows) = combined.wide_rows();

    let mut header = vec!["Date".to_string()];
    header.extend(keys.iter().map(|k| k.column_name(combined.group_by())));
    writer.write_record(&header)?;

    for (date, cells) in rows {
        let mut record = vec![date.to_string()];
        record.extend(
            cells
                .into_iter()
                .map(|c| c.map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn run_credentials(config: &FetchConfig, force: bool) -> Result<()> {
    let downloader = BatchDownloader::new(config)?;
    let (crumb, cookie) = downloader.get_credentials(force);
    println!("crumb:  {crumb}");
    println!("cookie: {cookie}");
    Ok(())
}
