//! COURTSIDE — exchange snapshots to value bets to bankroll trajectories.
//!
//! Entry point. Loads configuration, initialises structured logging and
//! runs one pipeline stage per invocation.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use courtside::backtest::{BankrollSimulator, StakingStrategy};
use courtside::config::AppConfig;
use courtside::model::implied::ImpliedProbabilityModel;
use courtside::model::{build_candidates, ProbabilityModel};
use courtside::snapshots::scanner::{DateRange, DirectoryScanner};
use courtside::snapshots::ExtractionMode;
use courtside::storage::{self, OutputGuard};
use courtside::strategy::detect_value_bets;
use courtside::strategy::filter::ValueBetFilter;
use courtside::strategy::odds::{build_match_odds, MatchOdds};

#[derive(Parser, Debug)]
#[command(name = "courtside", version, about = "Exchange snapshots to value bets to bankroll trajectories")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, env = "COURTSIDE_CONFIG", default_value = "config.toml")]
    config: String,

    /// Replace output files that already exist.
    #[arg(long, global = true)]
    overwrite: bool,

    /// Run the stage but write nothing.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract rows from a directory of stream files.
    Parse(ParseArgs),
    /// Reduce full-mode rows to one odds row per market.
    Features(FeaturesArgs),
    /// Predict both sides of every market and write bet candidates.
    Candidates(CandidatesArgs),
    /// Compute EV/Kelly and keep the value bets.
    Detect(DetectArgs),
    /// Replay value bets against a bankroll.
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct ParseArgs {
    /// Root of the `<year>/<Mon>/<day>/<event>/<file>` tree.
    #[arg(long, env = "COURTSIDE_INPUT_DIR")]
    input_dir: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// First date, YYYY-MM-DD (inclusive).
    #[arg(long)]
    start: String,
    /// Last date, YYYY-MM-DD (inclusive).
    #[arg(long)]
    end: String,
    /// metadata, ltp_only or full. Defaults to the config value.
    #[arg(long)]
    mode: Option<ExtractionMode>,
    #[arg(long)]
    max_parallel_files: Option<usize>,
}

#[derive(Args, Debug)]
struct FeaturesArgs {
    /// Full-mode rows written by `parse`.
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct CandidatesArgs {
    /// Odds rows written by `features`.
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Candidate bets with `odds` and `predicted_prob`.
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    ev_threshold: Option<f64>,
    #[arg(long)]
    confidence_threshold: Option<f64>,
    #[arg(long)]
    max_odds: Option<f64>,
    #[arg(long)]
    max_margin: Option<f64>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Value bets in the order they are to be placed.
    #[arg(long)]
    input: PathBuf,
    /// Trajectory CSV, one row per input bet.
    #[arg(long)]
    output: PathBuf,
    /// JSON summary. Defaults to the trajectory path with a `.json` extension.
    #[arg(long)]
    summary: Option<PathBuf>,
    #[arg(long)]
    initial_bankroll: Option<f64>,
    /// kelly or flat.
    #[arg(long)]
    strategy: Option<StakingStrategy>,
    #[arg(long)]
    fixed_stake: Option<f64>,
    #[arg(long)]
    cap_fraction: Option<f64>,
    #[arg(long)]
    kelly_multiplier: Option<f64>,
    #[arg(long)]
    odds_cap: Option<f64>,
    #[arg(long)]
    ev_threshold: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load_or_default(&cli.config)?;
    let guard = OutputGuard::new(cli.overwrite, cli.dry_run);

    match cli.command {
        Command::Parse(args) => run_parse(cfg, args, guard).await,
        Command::Features(args) => run_features(args, guard),
        Command::Candidates(args) => run_candidates(args, guard),
        Command::Detect(args) => run_detect(cfg, args, guard),
        Command::Simulate(args) => run_simulate(cfg, args, guard),
    }
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

async fn run_parse(mut cfg: AppConfig, args: ParseArgs, guard: OutputGuard) -> Result<()> {
    if let Some(mode) = args.mode {
        cfg.scan.mode = mode;
    }
    if let Some(n) = args.max_parallel_files {
        cfg.scan.max_parallel_files = n;
    }
    let range = DateRange::parse(&args.start, &args.end)?;

    let scanner = DirectoryScanner::new(cfg.scan);
    let report = scanner.scan(&args.input_dir, &range).await?;

    info!(
        files_seen = report.files_seen,
        files_in_range = report.files_in_range,
        files_parsed = report.files_parsed,
        files_failed = report.files_failed,
        rows = report.rows.len(),
        stats = %report.stats,
        "Parse complete"
    );
    if report.rows.is_empty() {
        warn!("No rows extracted");
    }

    if guard.permits(&args.output) {
        storage::write_snapshot_rows(&args.output, &report.rows)?;
    }
    Ok(())
}

fn run_features(args: FeaturesArgs, guard: OutputGuard) -> Result<()> {
    let ticks = storage::read_ticks(&args.input)?;
    let odds = build_match_odds(&ticks.records);
    let with_features = odds.iter().filter(|m| m.features().is_some()).count();
    info!(
        rows = ticks.records.len(),
        skipped_rows = ticks.skipped,
        markets = odds.len(),
        with_features,
        "Odds features built"
    );

    if guard.permits(&args.output) {
        storage::write_records(&args.output, &odds)?;
    }
    Ok(())
}

fn run_candidates(args: CandidatesArgs, guard: OutputGuard) -> Result<()> {
    let markets = storage::read_records::<MatchOdds>(&args.input)?;
    let model = ImpliedProbabilityModel;
    info!(model = model.name(), markets = markets.records.len(), "Predicting");

    let candidates = build_candidates(&model, &markets.records);
    if guard.permits(&args.output) {
        storage::write_records(&args.output, &candidates)?;
    }
    Ok(())
}

fn run_detect(mut cfg: AppConfig, args: DetectArgs, guard: OutputGuard) -> Result<()> {
    let f = &mut cfg.filter;
    f.ev_threshold = args.ev_threshold.unwrap_or(f.ev_threshold);
    f.confidence_threshold = args.confidence_threshold.unwrap_or(f.confidence_threshold);
    f.max_odds = args.max_odds.unwrap_or(f.max_odds);
    f.max_margin = args.max_margin.unwrap_or(f.max_margin);

    let candidates = storage::read_bets(&args.input)
        .with_context(|| format!("Failed to load candidates from {}", args.input.display()))?;
    let filter = ValueBetFilter::new(cfg.filter);
    let (bets, summary) = detect_value_bets(candidates.records, &filter);

    info!(
        considered = summary.considered,
        selected = summary.selected,
        low_ev = summary.low_ev,
        low_confidence = summary.low_confidence,
        odds_too_long = summary.odds_too_long,
        margin_too_wide = summary.margin_too_wide,
        skipped_rows = candidates.skipped,
        "Value bets detected"
    );

    if guard.permits(&args.output) {
        storage::write_records(&args.output, &bets)?;
    }
    Ok(())
}

fn run_simulate(mut cfg: AppConfig, args: SimulateArgs, guard: OutputGuard) -> Result<()> {
    let s = &mut cfg.simulation;
    s.initial_bankroll = args.initial_bankroll.unwrap_or(s.initial_bankroll);
    s.strategy = args.strategy.unwrap_or(s.strategy);
    s.fixed_stake = args.fixed_stake.unwrap_or(s.fixed_stake);
    s.cap_fraction = args.cap_fraction.unwrap_or(s.cap_fraction);
    s.kelly_multiplier = args.kelly_multiplier.unwrap_or(s.kelly_multiplier);
    s.odds_cap = args.odds_cap.unwrap_or(s.odds_cap);
    s.ev_threshold = args.ev_threshold.unwrap_or(s.ev_threshold);
    s.validate()?;

    let bets = storage::read_bets(&args.input)
        .with_context(|| format!("Failed to load value bets from {}", args.input.display()))?;
    let report = BankrollSimulator::new(cfg.simulation).run(&bets.records);
    println!("{report}");

    if guard.permits(&args.output) {
        storage::write_records(&args.output, &report.trajectory)?;
    }
    let summary_path = args.summary.unwrap_or_else(|| summary_path_for(&args.output));
    if guard.permits(&summary_path) {
        storage::write_json(&summary_path, &report)?;
    }
    Ok(())
}

fn summary_path_for(trajectory: &Path) -> PathBuf {
    trajectory.with_extension("json")
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("courtside=info"));

    let json_logging = std::env::var("COURTSIDE_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
