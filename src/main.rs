use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use smc_signals::history::DEFAULT_HISTORY_FILE;
use smc_signals::{
    CandleProvider, CsvProvider, EngineConfig, JsonlHistory, OandaProvider, SignalEngine,
    SignalResult,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-timeframe smart-money-concepts signal engine")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Candle source
    #[arg(long, value_enum, env = "SMC_SOURCE", default_value = "csv", global = true)]
    source: Source,

    /// Directory of <SYMBOL>_<TF>.csv files (csv source)
    #[arg(long, env = "SMC_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,

    /// Reward multiple for the second target
    #[arg(long, default_value_t = 2.0, global = true)]
    risk_r: f64,

    /// Deadline for fetching all three timeframes
    #[arg(long, default_value_t = 30, global = true)]
    timeout_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze a single symbol
    Analyze {
        #[arg(short, long)]
        symbol: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        /// Append the result to a JSON-lines history file
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Analyze several symbols concurrently
    Scan {
        /// Comma-separated symbols; defaults to every symbol the source lists
        #[arg(short, long, value_delimiter = ',')]
        symbols: Vec<String>,

        #[arg(long)]
        json: bool,

        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// List symbols available from the source
    Symbols,
    /// Print recent history records
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(short, long, default_value = DEFAULT_HISTORY_FILE)]
        file: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Source {
    Csv,
    Oanda,
}

fn build_provider(args: &Args) -> Result<Arc<dyn CandleProvider>> {
    Ok(match args.source {
        Source::Csv => Arc::new(CsvProvider::new(&args.data_dir)),
        Source::Oanda => Arc::new(OandaProvider::from_env()?),
    })
}

fn print_results(results: &[SignalResult], json: bool) -> Result<()> {
    if json {
        let body = if results.len() == 1 {
            serde_json::to_string_pretty(&results[0])?
        } else {
            serde_json::to_string_pretty(results)?
        };
        println!("{}", body);
    } else {
        for result in results {
            println!("{}", result);
        }
    }
    Ok(())
}

fn record_history(path: Option<PathBuf>, results: &[SignalResult]) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let history = JsonlHistory::new(&path);
    for result in results {
        history.append(&result.to_record())?;
    }
    info!("Appended {} record(s) to {}", results.len(), path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smc_signals=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Commands::History { limit, file } = &args.command {
        let records = JsonlHistory::new(file).recent(*limit)?;
        for record in records {
            println!("{}", serde_json::to_string(&record)?);
        }
        return Ok(());
    }

    let provider = build_provider(&args)?;
    let config = EngineConfig::default()
        .with_risk_r(args.risk_r)
        .with_fetch_timeout(Duration::from_secs(args.timeout_secs));

    info!("Using {} provider", provider.name());

    match args.command {
        Commands::Analyze {
            symbol,
            json,
            history,
        } => {
            let engine = SignalEngine::new(provider, config);
            let result = engine.analyze_symbol(&symbol).await;
            let results = [result];
            print_results(&results, json)?;
            record_history(history, &results)?;
        }
        Commands::Scan {
            symbols,
            json,
            history,
        } => {
            let symbols = if symbols.is_empty() {
                provider
                    .get_symbols()
                    .await
                    .context("Failed to list symbols for scan")?
            } else {
                symbols
            };
            let engine = SignalEngine::new(provider, config);
            let results = engine.scan(&symbols).await;

            let trades = results.iter().filter(|r| r.decision.is_trade()).count();
            info!("Scan complete: {} symbols, {} trade signals", results.len(), trades);

            print_results(&results, json)?;
            record_history(history, &results)?;
        }
        Commands::Symbols => {
            let symbols = provider
                .get_symbols()
                .await
                .context("Failed to list symbols")?;
            for symbol in symbols {
                println!("{}", symbol);
            }
        }
        Commands::History { .. } => {}
    }

    Ok(())
}
