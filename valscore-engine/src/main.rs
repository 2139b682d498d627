//! Valscore - sector-relative valuation and risk-adjusted scoring.
//!
//! Scores a JSON file of records, appends calibration history and writes an
//! auditable export bundle.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use valscore_common::config::config_dir;
use valscore_common::config_loader::check_modular_files;
use valscore_common::logging::init_logging_with_exclusions;
use valscore_common::util::{expand_path, truncate_with_ellipsis};
use valscore_common::Config;
use valscore_engine::{
    BatchScorer, CalibrationHistory, ExportBundle, JsonFileSource, RecordAssembler,
    StaticRegimeSource,
};

/// Sector-relative valuation and risk-adjusted scoring engine.
#[derive(Parser, Debug)]
#[command(name = "valscore")]
#[command(version)]
#[command(about = "Sector-relative valuation and risk-adjusted scoring", long_about = None)]
struct Cli {
    /// Configuration directory (default: ~/.valscore)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score a JSON array of records
    Score {
        /// Records file
        #[arg(short, long)]
        input: PathBuf,

        /// Export directory (default: output.export_dir)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Computation date, YYYY-MM-DD (default: today)
        #[arg(long)]
        as_of: Option<NaiveDate>,

        /// Sector regime file used to refresh (r, b)
        #[arg(long)]
        regimes: Option<PathBuf>,

        /// Distribution snapshot file, reused by later runs for the same date
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Rows to print
        #[arg(long, default_value_t = 20)]
        top: usize,
    },

    /// Show recent calibration snapshots
    Calibration {
        #[arg(long, default_value_t = 6)]
        last: usize,
    },

    /// Validate configuration and print its fingerprint
    CheckConfig,
}

fn load_config(dir: Option<&PathBuf>) -> Result<Config> {
    match dir {
        Some(dir) => {
            let mut config = Config::load_from_dir(dir)?;
            config.apply_env_overrides();
            Ok(config)
        }
        None => Config::load_with_env(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config_dir.as_ref())?;
    config
        .validate()
        .context("Invalid configuration, refusing to start")?;

    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );
    tracing::info!("Valscore v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Score {
            input,
            out,
            as_of,
            regimes,
            snapshot,
            top,
        } => score(config, input, out, as_of, regimes, snapshot, top).await,
        Commands::Calibration { last } => calibration(&config, last),
        Commands::CheckConfig => check_config(&config, cli.config_dir),
    }
}

async fn score(
    config: Config,
    input: PathBuf,
    out: Option<PathBuf>,
    as_of: Option<NaiveDate>,
    regimes: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    top: usize,
) -> Result<()> {
    let source = Arc::new(JsonFileSource::load(&input)?);
    let assembler =
        RecordAssembler::from_config(source.clone(), &config.batch).with_filings(source.clone());

    let history = CalibrationHistory::from_config_path(&config.calibration.history_path);
    let export_dir = out.unwrap_or_else(|| expand_path(&config.output.export_dir));

    let mut scorer = BatchScorer::new(config)?.with_history(history);
    if let Some(path) = regimes {
        scorer = scorer.with_regime_source(Arc::new(StaticRegimeSource::load(&path)?));
    }
    if let Some(path) = snapshot {
        scorer = scorer.with_snapshot_file(path);
    }

    let as_of = as_of.unwrap_or_else(|| Local::now().date_naive());
    let report = scorer.run(&source.symbols(), &assembler, as_of).await;

    println!("{}", report.summary());
    println!();
    println!(
        "{:<10} {:<18} {:<14} {:>7} {:>7} {:<11} {}",
        "SYMBOL", "NAME", "SECTOR", "TOTAL", "RISK", "REC", "REASONS"
    );
    for result in report.scored.iter().take(top) {
        println!(
            "{:<10} {:<18} {:<14} {:>7.2} {:>7.2} {:<11} {}",
            result.symbol,
            truncate_with_ellipsis(&result.name, 15),
            truncate_with_ellipsis(&result.sector, 11),
            result.total_score,
            result.risk_penalty,
            result.recommendation.as_str(),
            result.risk_codes().join(",")
        );
    }

    if let Some(cutoffs) = report.proposed_cutoffs {
        println!();
        println!(
            "Cutoffs matching targets: strong_buy {:.2}%, buy {:.2}%, hold {:.2}%",
            cutoffs.strong_buy_pct, cutoffs.buy_pct, cutoffs.hold_pct
        );
    }

    let path = ExportBundle::from_report(&report).save_to_file(&export_dir)?;
    println!();
    println!("Export: {}", path.display());

    Ok(())
}

fn calibration(config: &Config, last: usize) -> Result<()> {
    let history = CalibrationHistory::from_config_path(&config.calibration.history_path);
    let snapshots = history
        .last(last)
        .with_context(|| format!("Failed to read {}", history.path().display()))?;

    if snapshots.is_empty() {
        println!("No calibration history at {}", history.path().display());
        return Ok(());
    }

    println!(
        "{:<8} {:<10} {:>6} {:>7} {:>6} {:>6} {:>6} {:>6}  {}",
        "PERIOD", "RUN", "N", "MEAN", "SB", "BUY", "HOLD", "SELL", "DRIFT"
    );
    for s in snapshots {
        let mean = s.stats.map_or(0.0, |st| st.mean);
        let drift = if !s.drift_evaluated {
            "n/a".to_string()
        } else if s.drift.is_empty() {
            "-".to_string()
        } else {
            s.drift
                .iter()
                .map(|d| format!("{}{:+.2}", d.tier, d.deviation))
                .collect::<Vec<_>>()
                .join(" ")
        };
        let p = s.proportions;
        println!(
            "{:<8} {:<10} {:>6} {:>7.2} {:>6.2} {:>6.2} {:>6.2} {:>6.2}  {}",
            s.period,
            truncate_with_ellipsis(&s.run_id, 7),
            s.batch_size,
            mean,
            p.strong_buy,
            p.buy,
            p.hold,
            p.sell,
            drift
        );
    }

    Ok(())
}

fn check_config(config: &Config, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(config_dir);
    println!("Configuration directory: {}", dir.display());
    for (file, present) in check_modular_files(Some(dir)) {
        println!("  {:<18} {}", file, if present { "found" } else { "absent" });
    }
    println!("Configuration valid");
    println!("Fingerprint: {}", config.fingerprint());
    Ok(())
}
