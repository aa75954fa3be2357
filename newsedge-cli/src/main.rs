//! NewsEdge CLI: engine runs, backtests, config validation.
//!
//! Commands:
//! - `run`: drive the engine from a JSONL signal file against recorded ticks
//! - `backtest`: seeded perturbation sweeps over recorded events
//! - `check-config`: parse and validate an engine or backtest config

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use newsedge_core::config::EngineConfig;
use newsedge_core::domain::Signal;
use newsedge_core::gateway::{ExecutionMode, Gateway, ReplayVenue};
use newsedge_core::orchestrator::{Orchestrator, RunSummary};
use newsedge_core::sinks::{JsonlTradeLog, LogAlerts};
use newsedge_runner::{load_events, load_ticks, save_reports, sweep_events, BacktestConfig};

#[derive(Parser)]
#[command(
    name = "newsedge",
    about = "NewsEdge: news-signal confirmation, sizing and trailing-stop engine"
)]
struct Cli {
    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine on a JSONL signal file, replaying recorded ticks as the feed.
    Run {
        /// Engine TOML config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Signals, one JSON object per line.
        #[arg(long)]
        signals: PathBuf,

        /// Directory holding `<SYMBOL>.csv` tick recordings.
        #[arg(long)]
        ticks_dir: PathBuf,

        /// Execution mode override: dry_run or testnet.
        #[arg(long)]
        mode: Option<String>,

        /// Starting quote-asset balance of the replay venue.
        #[arg(long, default_value_t = 10_000.0)]
        balance: f64,

        /// Trade log (JSONL, appended).
        #[arg(long, default_value = "trades.jsonl")]
        trades: PathBuf,

        /// Stop after this many seconds, aborting open lifecycles.
        #[arg(long)]
        max_runtime_secs: Option<u64>,
    },
    /// Sweep recorded events across seeds and write reports.
    Backtest {
        /// Backtest TOML config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Events manifest (JSON).
        #[arg(long)]
        events: PathBuf,

        /// Output directory for reports.csv and summary.json.
        #[arg(long, default_value = "backtest-out")]
        output: PathBuf,

        /// Seeded runs per event (overrides config).
        #[arg(long)]
        seeds: Option<usize>,

        /// Master seed (overrides config).
        #[arg(long)]
        master_seed: Option<u64>,

        /// Only the unperturbed run per event.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Validate a config file and print the effective configuration.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,

        /// Treat the file as a backtest config.
        #[arg(long, default_value_t = false)]
        backtest: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    match cli.command {
        Commands::Run {
            config,
            signals,
            ticks_dir,
            mode,
            balance,
            trades,
            max_runtime_secs,
        } => run_engine_cmd(
            config.as_deref(),
            &signals,
            &ticks_dir,
            mode.as_deref(),
            balance,
            trades,
            max_runtime_secs,
        ),
        Commands::Backtest {
            config,
            events,
            output,
            seeds,
            master_seed,
            strict,
        } => run_backtest_cmd(config.as_deref(), &events, &output, seeds, master_seed, strict),
        Commands::CheckConfig { config, backtest } => run_check_config(&config, backtest),
    }
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level '{level}'"))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn parse_mode(raw: &str) -> Result<ExecutionMode> {
    match raw {
        "dry_run" | "dry-run" => Ok(ExecutionMode::DryRun),
        "testnet" => Ok(ExecutionMode::Testnet),
        "live" => Ok(ExecutionMode::Live),
        other => bail!("unknown mode '{other}' (expected dry_run or testnet)"),
    }
}

fn read_signals(path: &Path) -> Result<Vec<Signal>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read signals {}", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Signal>(line)
                .with_context(|| format!("{}:{}: malformed signal", path.display(), n + 1))
        })
        .collect()
}

fn run_engine_cmd(
    config_path: Option<&Path>,
    signals_path: &Path,
    ticks_dir: &Path,
    mode: Option<&str>,
    balance: f64,
    trades_path: PathBuf,
    max_runtime_secs: Option<u64>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(raw) = mode {
        config.gateway.mode = parse_mode(raw)?;
    }
    if config.gateway.mode == ExecutionMode::Live {
        bail!("live mode needs a venue adapter; this binary only replays recorded ticks");
    }

    let signals = read_signals(signals_path)?;
    let symbols: BTreeSet<&str> = signals.iter().map(|s| s.symbol.as_str()).collect();
    let mut feeds = HashMap::new();
    for symbol in symbols {
        let path = ticks_dir.join(format!("{symbol}.csv"));
        let ticks = load_ticks(&path)
            .with_context(|| format!("no tick recording for {symbol}"))?;
        feeds.insert(symbol.to_string(), ticks);
    }
    info!(
        signals = signals.len(),
        symbols = feeds.len(),
        mode = %config.gateway.mode,
        "starting engine"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    let summary: RunSummary = runtime.block_on(async move {
        let venue = Arc::new(
            ReplayVenue::new(feeds).with_balance(config.sizing.quote_asset.clone(), balance),
        );
        let mode = config.gateway.mode;
        let gateway = Arc::new(Gateway::connect(venue, mode)?);
        let orchestrator = Orchestrator::new(
            gateway,
            config,
            Arc::new(JsonlTradeLog::new(trades_path)),
            Arc::new(LogAlerts),
        );

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            for signal in signals {
                if tx.send(signal).await.is_err() {
                    warn!("engine stopped before every signal was delivered");
                    break;
                }
            }
        });

        let shutdown = async move {
            let deadline = async {
                match max_runtime_secs {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("interrupted"),
                _ = deadline => info!("max runtime reached"),
            }
        };
        let summary = orchestrator.run_until(rx, shutdown).await?;
        Ok::<_, anyhow::Error>(summary)
    })?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_backtest_cmd(
    config_path: Option<&Path>,
    events_path: &Path,
    output: &Path,
    seeds: Option<usize>,
    master_seed: Option<u64>,
    strict: bool,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => BacktestConfig::from_file(path)?,
        None => BacktestConfig::default(),
    };
    if let Some(n) = seeds {
        config.perturbation.seeds = n;
    }
    if let Some(seed) = master_seed {
        config.perturbation.master_seed = seed;
    }
    if strict {
        config.perturbation.seeds = 0;
    }

    let events = load_events(events_path)?;
    info!(
        events = events.len(),
        seeds = config.perturbation.seeds,
        master_seed = config.perturbation.master_seed,
        "starting backtest"
    );
    let sweeps = sweep_events(&config.simulator()?, &events)?;
    let written = save_reports(&sweeps, output)?;

    println!(
        "{:<18} {:<10} {:>6} {:>9} {:>10} {:>12} {:>8}",
        "event", "symbol", "runs", "confirmed", "strict_pnl", "mean_pnl", "win"
    );
    for sweep in &sweeps {
        println!(
            "{:<18} {:<10} {:>6} {:>9} {:>9.2}% {:>11.2}% {:>7.0}%",
            sweep.event_id.as_str(),
            sweep.symbol,
            sweep.summary.runs,
            sweep.summary.confirmed,
            sweep.strict.pnl_pct * 100.0,
            sweep.summary.mean_pnl_pct * 100.0,
            sweep.summary.win_rate * 100.0,
        );
    }
    for path in written {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn run_check_config(path: &Path, backtest: bool) -> Result<()> {
    let effective = if backtest {
        serde_json::to_string_pretty(&BacktestConfig::from_file(path)?)?
    } else {
        serde_json::to_string_pretty(&EngineConfig::from_file(path)?)?
    };
    println!("{effective}");
    println!("{}: ok", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_arguments() {
        let cli = Cli::try_parse_from([
            "newsedge",
            "run",
            "--signals",
            "s.jsonl",
            "--ticks-dir",
            "ticks",
            "--mode",
            "testnet",
            "--max-runtime-secs",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                mode,
                max_runtime_secs,
                balance,
                ..
            } => {
                assert_eq!(mode.as_deref(), Some("testnet"));
                assert_eq!(max_runtime_secs, Some(30));
                assert_eq!(balance, 10_000.0);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn modes_parse() {
        assert_eq!(parse_mode("dry_run").unwrap(), ExecutionMode::DryRun);
        assert_eq!(parse_mode("testnet").unwrap(), ExecutionMode::Testnet);
        assert!(parse_mode("mainnet").is_err());
    }

    #[test]
    fn signals_file_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signals.jsonl");
        fs::write(
            &path,
            "{\"symbol\":\"BTCUSDT\",\"direction\":\"long\",\"confidence\":0.9,\"impact\":8}\n\n\
             {\"symbol\":\"ETHUSDT\",\"direction\":\"short\",\"confidence\":0.6,\"impact\":3}\n",
        )
        .unwrap();
        let signals = read_signals(&path).unwrap();
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1].symbol, "ETHUSDT");

        fs::write(&path, "not json\n").unwrap();
        assert!(read_signals(&path).is_err());
    }
}
