//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvHistoryAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{self, FxConfig};
use crate::domain::engine::Engine;
use crate::domain::error::FxError;
use crate::domain::metrics::Metrics;
use crate::domain::run_result::RunResults;
use crate::ports::history_port::HistoryPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "fxtrader", about = "Multi-currency FX strategy backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run every configured strategy over a price history
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Overrides `[data] history`
        #[arg(long)]
        history: Option<PathBuf>,
        /// Write a CSV report here
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        sequential: bool,
        #[arg(short, long)]
        jobs: Option<usize>,
        #[arg(long, default_value = "info")]
        log_level: String,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Command-line overrides applied on top of the INI file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub history: Option<PathBuf>,
    pub sequential: bool,
    pub jobs: Option<usize>,
}

/// Everything a run produced, metrics lined up with results.
#[derive(Debug)]
pub struct RunOutcome {
    pub results: RunResults,
    pub metrics: Vec<Metrics>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            history,
            output,
            sequential,
            jobs,
            log_level,
        } => {
            init_logging(&log_level);
            let overrides = RunOverrides {
                history,
                sequential,
                jobs,
            };
            run_backtest(&config, &overrides, output.as_deref())
        }
        Command::Validate { config } => run_validate(&config),
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
    {
        debug!("Keeping existing tracing subscriber: {}", e);
    }
}

pub fn load_config(path: &Path) -> Result<FxConfig, FxError> {
    let adapter = FileConfigAdapter::from_file(path).map_err(|e| FxError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })?;
    config_validation::load_config(&adapter)
}

fn run_backtest(config_path: &Path, overrides: &RunOverrides, output: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let outcome = load_config(config_path).and_then(|config| {
        let outcome = run_pipeline(&config, overrides)?;
        print_summary(&outcome);
        if let Some(path) = output {
            CsvReportAdapter::new().write(&outcome.results, &outcome.metrics, path)?;
            eprintln!("\nReport written to: {}", path.display());
        }
        Ok(outcome)
    });
    match outcome {
        Ok(outcome) => {
            let failed = outcome.results.failed().count();
            if failed > 0 {
                warn!("{failed} of {} strategies failed", outcome.results.len());
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Loads history, runs the engine and computes metrics for every result.
pub fn run_pipeline(config: &FxConfig, overrides: &RunOverrides) -> Result<RunOutcome, FxError> {
    let ctx = config.context()?;
    let mut params = config.run_params(&ctx)?;
    if overrides.sequential {
        params.parallel = false;
    }
    if let Some(jobs) = overrides.jobs {
        params.n_jobs = Some(jobs);
    }

    let history_path = overrides
        .history
        .clone()
        .or_else(|| config.history_path.clone())
        .ok_or_else(|| FxError::ConfigMissing {
            section: "data".to_string(),
            key: "history".to_string(),
        })?;
    let history = CsvHistoryAdapter::new(&history_path).load(&ctx)?;
    info!(
        "loaded {} steps for {} pairs from {}",
        history.len(),
        history.pairs().len(),
        history_path.display()
    );

    let mut engine = Engine::new(ctx.clone());
    for strategy in config.build_strategies(&ctx)? {
        engine.add_strategy(strategy)?;
    }
    let results = engine.run(&history, &params)?;

    let metrics = results
        .iter()
        .map(|result| Metrics::compute(result, &ctx, &config.metrics))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RunOutcome { results, metrics })
}

fn print_summary(outcome: &RunOutcome) {
    eprintln!("\n=== Results ===");
    for (result, metrics) in outcome.results.iter().zip(&outcome.metrics) {
        eprintln!("\n[{}] {}", result.strategy_id, result.status);
        eprintln!("  Windows:          {}", result.windows_processed);
        for (currency, balance) in &result.final_snapshot.balances {
            eprintln!("  Balance {:<9} {}", currency.as_str(), balance);
        }
        if let Some(equity) = metrics.final_equity {
            eprintln!("  Final Equity:     {:.2} {}", equity, result.base_currency);
        }
        eprintln!("  Total Return:     {:.2}%", metrics.total_return * 100.0);
        eprintln!("  Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
        eprintln!("  Sortino Ratio:    {:.2}", metrics.sortino_ratio);
        eprintln!("  Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
        eprintln!(
            "  Trades:           {} executed, {} skipped",
            metrics.executed_trades, metrics.skipped_trades
        );
        if let Some(err) = &result.error {
            eprintln!("  Error:            {err}");
        }
    }
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    match load_config(config_path) {
        Ok(config) => {
            eprintln!("Config validated successfully");
            eprintln!(
                "  arithmetic: {} (precision {}, {} fraction digits, {})",
                config.arithmetic.backend,
                config.arithmetic.precision,
                config.arithmetic.max_fraction_digits,
                config.arithmetic.rounding_mode
            );
            for spec in &config.strategies {
                eprintln!("  strategy {}: {} on {}", spec.name, spec.kind.as_str(), spec.pair);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}
