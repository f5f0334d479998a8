mod aggregate;
mod config;
mod error;
mod indicator;
mod model;
mod pipeline;
mod series;
mod storage;
mod writer;

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use indicator::IndicatorEngine;
use model::{Candle, TableRef, TimeFrame};
use pipeline::PipelineOrchestrator;
use storage::sqlite::SqliteStorage;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("invalid argument: {name}")]
    Argument { name: String },
    #[display("failed to read input file")]
    Input,
    #[display("pipeline run failed")]
    Pipeline,
}

#[derive(Parser)]
#[command(name = "ohlc-pipeline", about = "Layered OHLC candle pipeline")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upsert raw candles from a CSV file into a bronze-layer table
    Load {
        /// CSV with columns: time, pair, open, high, low, close, volume, count
        #[arg(long)]
        file: String,
        #[arg(long, default_value = "bronze.ohlc")]
        target: String,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Aggregate bronze bars into daily silver bars for a date range
    Daily {
        #[arg(long)]
        pair: String,
        #[arg(long, default_value = "bronze.ohlc")]
        source: String,
        #[arg(long, default_value = "silver.ohlc_daily")]
        target: String,
        /// Bar width of the source table (e.g. "1h")
        #[arg(long, default_value = "1h")]
        source_timeframe: String,
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Enrich silver bars with indicator columns into the gold table
    Indicators {
        #[arg(long)]
        pair: String,
        #[arg(long, default_value = "silver.ohlc_daily")]
        source: String,
        #[arg(long, default_value = "gold.ohlc_ta")]
        target: String,
        #[arg(long)]
        start_date: NaiveDate,
        #[arg(long)]
        end_date: NaiveDate,
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/ohlc-pipeline.db");
    let storage = SqliteStorage::open(Path::new(&db_path))
        .await
        .change_context(AppError::Storage)?;

    let engine =
        IndicatorEngine::new(config.indicators.params()).change_context(AppError::Config)?;
    let offset = config.pipeline.offset().change_context(AppError::Config)?;

    // The pool lives for exactly one run: opened above, dropped when this
    // function returns on any path.
    match cli.command {
        Command::Load {
            file,
            target,
            batch_size,
        } => {
            let target = parse_table(&target)?;
            let candles = read_candles_csv(Path::new(&file))?;
            let pipeline = PipelineOrchestrator::new(
                &storage,
                engine,
                resolve_batch_size(batch_size, config.pipeline.batch_size)?,
                config.pipeline.upper_bound,
                offset,
            );
            let written = pipeline
                .load(&target, &candles)
                .await
                .change_context(AppError::Pipeline)?;
            info!(written, "load finished");
        }
        Command::Daily {
            pair,
            source,
            target,
            source_timeframe,
            start_date,
            end_date,
            batch_size,
        } => {
            let source = parse_table(&source)?;
            let target = parse_table(&target)?;
            let source_frame = TimeFrame::from_str(&source_timeframe).ok_or_else(|| {
                Report::new(AppError::Argument {
                    name: format!("--source-timeframe \"{source_timeframe}\""),
                })
            })?;
            let pipeline = PipelineOrchestrator::new(
                &storage,
                engine,
                resolve_batch_size(batch_size, config.pipeline.batch_size)?,
                config.pipeline.upper_bound,
                offset,
            );
            let written = pipeline
                .run_aggregate(
                    &pair,
                    &source,
                    &target,
                    source_frame,
                    TimeFrame::Day1,
                    midnight_utc(start_date),
                    midnight_utc(end_date),
                )
                .await
                .change_context(AppError::Pipeline)?;
            info!(written, "daily aggregation finished");
        }
        Command::Indicators {
            pair,
            source,
            target,
            start_date,
            end_date,
            batch_size,
        } => {
            let source = parse_table(&source)?;
            let target = parse_table(&target)?;
            let pipeline = PipelineOrchestrator::new(
                &storage,
                engine,
                resolve_batch_size(batch_size, config.pipeline.batch_size)?,
                config.pipeline.upper_bound,
                offset,
            );
            let written = pipeline
                .run_indicators(
                    &pair,
                    &source,
                    &target,
                    midnight_utc(start_date),
                    midnight_utc(end_date),
                )
                .await
                .change_context(AppError::Pipeline)?;
            info!(written, "indicator enrichment finished");
        }
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

// The config file value is validated on load; an override from the command
// line has to be checked here or a zero would reach the batch chunker.
fn resolve_batch_size(
    override_size: Option<usize>,
    config_size: usize,
) -> Result<usize, Report<AppError>> {
    let size = override_size.unwrap_or(config_size);
    if size == 0 {
        return Err(Report::new(AppError::Argument {
            name: "--batch-size must be positive".into(),
        }));
    }
    Ok(size)
}

fn parse_table(s: &str) -> Result<TableRef, Report<AppError>> {
    TableRef::parse(s).ok_or_else(|| {
        Report::new(AppError::Argument {
            name: format!("table identifier \"{s}\" (expected schema.table)"),
        })
    })
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Debug, serde::Deserialize)]
struct CandleRecord {
    time: DateTime<Utc>,
    pair: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    count: i64,
}

fn read_candles_csv(path: &Path) -> Result<Vec<Candle>, Report<AppError>> {
    let mut reader = csv::Reader::from_path(path)
        .change_context(AppError::Input)
        .attach_with(|| format!("path: {}", path.display()))?;

    reader
        .deserialize::<CandleRecord>()
        .map(|record| {
            let record = record
                .change_context(AppError::Input)
                .attach_with(|| format!("path: {}", path.display()))?;
            Ok(Candle {
                time: record.time,
                pair: record.pair,
                open: record.open,
                high: record.high,
                low: record.low,
                close: record.close,
                volume: record.volume,
                trade_count: record.count,
            })
        })
        .collect()
}
