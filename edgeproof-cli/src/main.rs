//! Edgeproof CLI: statistical validation and guarded model updates.
//!
//! Commands:
//! - `validate`: run the validation pipeline over the trade history
//! - `update`: fold new closed trades into the meta-label model
//!
//! Logs go to stderr; stdout carries only the rendered summary.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use edgeproof_core::{ContextStore, TradeRecord};
use edgeproof_runner::{
    open_source, render_update, render_validation, run_validation, EdgeproofConfig, IncrementalUpdater,
    SourceKind, UpdateOptions, UpdateStatus,
};

const DEFAULT_CONFIG: &str = "edgeproof.toml";

#[derive(Parser)]
#[command(
    name = "edgeproof",
    about = "Edgeproof: validate trading edges and maintain the meta-label model"
)]
struct Cli {
    /// Debug-level logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run walk-forward validation, deflated Sharpe, Monte Carlo and decay checks.
    Validate {
        /// Trade source. `auto` tries db, then api, then csv.
        #[arg(long, value_enum, default_value_t = SourceArg::Auto)]
        source: SourceArg,

        /// Path to a TOML config file. Defaults to ./edgeproof.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory for the report JSON (overrides paths.report_dir).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Monte Carlo seed (overrides monte_carlo.seed).
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Train the model on trades closed since the last update.
    Update {
        /// Evaluate everything but write nothing.
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Bypass the batch-size and cooldown checks.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Trade source. `auto` tries db, then api, then csv.
        #[arg(long, value_enum, default_value_t = SourceArg::Auto)]
        source: SourceArg,

        /// Path to a TOML config file. Defaults to ./edgeproof.toml if present.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Auto,
    Db,
    Api,
    Csv,
}

impl From<SourceArg> for SourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Auto => SourceKind::Auto,
            SourceArg::Db => SourceKind::Db,
            SourceArg::Api => SourceKind::Api,
            SourceArg::Csv => SourceKind::Csv,
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate {
            source,
            config,
            output,
            seed,
        } => run_validate_cmd(source, config.as_deref(), output, seed),
        Commands::Update {
            dry_run,
            force,
            source,
            config,
        } => run_update_cmd(source, config.as_deref(), UpdateOptions { force, dry_run }),
    }
}

fn load_config(path: Option<&Path>) -> Result<EdgeproofConfig> {
    match path {
        Some(p) => EdgeproofConfig::from_file(p).with_context(|| format!("loading config {}", p.display())),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            EdgeproofConfig::from_file(Path::new(DEFAULT_CONFIG)).context("loading ./edgeproof.toml")
        }
        None => {
            info!("no config file, using defaults");
            Ok(EdgeproofConfig::default())
        }
    }
}

fn fetch(kind: SourceArg, config: &EdgeproofConfig) -> Result<(Vec<TradeRecord>, ContextStore)> {
    let source = open_source(kind.into(), &config.source).context("opening trade source")?;
    let trades = source
        .fetch_trades()
        .with_context(|| format!("fetching trades from {}", source.name()))?;
    let context = source
        .fetch_context()
        .with_context(|| format!("fetching context from {}", source.name()))?;
    info!(
        source = source.name(),
        trades = trades.len(),
        regimes = context.regime_count(),
        "trade history loaded"
    );
    Ok((trades, context))
}

fn run_validate_cmd(
    source: SourceArg,
    config_path: Option<&Path>,
    output: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<ExitCode> {
    let mut config = load_config(config_path)?;
    if let Some(seed) = seed {
        config.monte_carlo.seed = seed;
    }
    if let Some(dir) = output {
        config.paths.report_dir = dir;
    }

    let (trades, context) = fetch(source, &config)?;
    if trades.is_empty() {
        bail!("trade source returned no closed trades");
    }

    let report = run_validation(&trades, &context, &config, Utc::now());
    let path = report
        .write_to(&config.paths.report_dir)
        .context("writing validation report")?;

    print!("{}", render_validation(&report));
    println!("Report: {}", path.display());

    Ok(if report.verdict.is_sound() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_update_cmd(source: SourceArg, config_path: Option<&Path>, opts: UpdateOptions) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let (trades, context) = fetch(source, &config)?;

    let updater = IncrementalUpdater::from_config(&config);
    let report = updater
        .run(&trades, &context, Utc::now(), opts)
        .context("model update failed")?;

    print!("{}", render_update(&report));

    Ok(if report.status == UpdateStatus::Rejected {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
