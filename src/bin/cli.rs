//! golf-backtest CLI - PIT builds, strategy replay and experiment management

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use golf_backtest::adaptive::{self, BlendConfig, SuppressionConfig};
use golf_backtest::backtesting::metrics::{analyze_by_market, analyze_by_odds_range};
use golf_backtest::backtesting::{
    ArchiveSource, DimensionAnalysis, SimulationConfig, StrategyConfig, StrategySimulator, WalkForwardConfig,
};
use golf_backtest::config::AppConfig;
use golf_backtest::core::odds::parse_odds_to_decimal;
use golf_backtest::data::{EventCalendar, OddsArchive, RoundHistory};
use golf_backtest::experiments::{
    generate_neighbors, ExperimentTracker, ExploreConfig, NewExperiment, SignificanceConfig, GLOBAL_SCOPE,
};
use golf_backtest::models::{EventKey, Market};
use golf_backtest::pit::{PitBuilder, PitConfig, PitStore};
use golf_backtest::scoring::{score_event, ScoringWeights};
use golf_backtest::store::Store;

#[derive(Parser)]
#[command(name = "golf-backtest")]
#[command(author, version, about = "Point-in-time golf strategy backtesting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// SQLite database path (overrides GOLF_BACKTEST_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory with rounds.csv, events.csv and odds.csv (overrides GOLF_BACKTEST_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build PIT tables for one or more seasons
    BuildPit {
        #[arg(long, value_delimiter = ',', default_value = "2024,2025")]
        years: Vec<i32>,

        /// Rebuild events that already have rows
        #[arg(long)]
        force: bool,
    },

    /// Check an event's stored PIT rows for leakage
    Audit {
        #[arg(long)]
        event: String,

        #[arg(long)]
        year: i32,

        /// Restrict the audit to one player
        #[arg(long)]
        player: Option<String>,
    },

    /// Replay a strategy over historical seasons
    Simulate {
        /// Strategy JSON file; defaults to the scope's active strategy
        #[arg(long)]
        strategy: Option<PathBuf>,

        #[arg(long, default_value = GLOBAL_SCOPE)]
        scope: String,

        #[arg(long, value_delimiter = ',', default_value = "2024,2025")]
        years: Vec<i32>,

        /// Replay only the first N events of each season
        #[arg(long)]
        max_events: Option<usize>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Train/test split of one strategy
    WalkForward {
        #[arg(long)]
        strategy: Option<PathBuf>,

        #[arg(long, default_value = GLOBAL_SCOPE)]
        scope: String,

        #[arg(long, value_delimiter = ',', default_value = "2022,2023")]
        train: Vec<i32>,

        #[arg(long, value_delimiter = ',', default_value = "2024,2025")]
        test: Vec<i32>,
    },

    /// Manage strategy experiments
    #[command(subcommand)]
    Experiment(ExperimentCommand),

    /// Report the suppression state of each market
    MarketState {
        /// Lift the freeze on this market first
        #[arg(long)]
        unfreeze: Option<String>,
    },

    /// Bankroll ledger and stake sizing
    Bankroll {
        /// Record a settled tournament's profit (units)
        #[arg(long, allow_hyphen_values = true)]
        profit: Option<f64>,

        /// Settlement date, YYYY-MM-DD
        #[arg(long)]
        date: Option<String>,

        #[arg(long, default_value = "")]
        notes: String,

        /// Size a bet at this model probability (needs --odds)
        #[arg(long, requires = "odds")]
        prob: Option<f64>,

        /// American odds of the bet to size, e.g. +400 or -150
        #[arg(long, allow_hyphen_values = true, value_parser = parse_american_odds)]
        odds: Option<f64>,
    },

    /// Current external/model blend weights per market
    Blend,

    /// Score an event's field from its PIT rows
    ScoreEvent {
        #[arg(long)]
        event: String,

        #[arg(long)]
        year: i32,

        #[arg(long, default_value = "20")]
        top: usize,
    },
}

#[derive(Subcommand)]
enum ExperimentCommand {
    /// Register a strategy as a pending experiment
    Create {
        #[arg(long)]
        hypothesis: String,

        #[arg(long)]
        strategy: PathBuf,

        #[arg(long, default_value = GLOBAL_SCOPE)]
        scope: String,
    },

    /// Register perturbed neighbours of the active strategy
    Explore {
        #[arg(long, default_value = GLOBAL_SCOPE)]
        scope: String,

        #[arg(long, default_value = "5")]
        neighbors: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print each registered strategy as JSON
        #[arg(long)]
        show: bool,
    },

    /// Run one experiment, or every pending one
    Run {
        #[arg(long)]
        id: Option<i64>,

        #[arg(long, value_delimiter = ',', default_value = "2024,2025")]
        years: Vec<i32>,
    },

    /// Test a completed experiment for significance
    Evaluate {
        #[arg(long)]
        id: i64,

        #[arg(long, default_value = "0.05")]
        alpha: f64,

        #[arg(long, default_value = "50")]
        min_bets: usize,
    },

    /// Promote a significant experiment to its scope's active strategy
    Promote {
        #[arg(long)]
        id: i64,
    },

    Leaderboard {
        #[arg(long, default_value = GLOBAL_SCOPE)]
        scope: String,

        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

/// Archives loaded from the data directory
struct Archives {
    history: RoundHistory,
    calendar: EventCalendar,
    odds: OddsArchive,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")?;

    let mut config = AppConfig::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }

    println!("{}", format!("golf-backtest v{}", env!("CARGO_PKG_VERSION")).cyan().bold());
    println!();

    let store = Store::open(&config.db_path)
        .with_context(|| format!("Failed to open store at {:?}", config.db_path))?;

    match cli.command {
        Commands::BuildPit { years, force } => run_build_pit(&config, &store, &years, force),
        Commands::Audit { event, year, player } => run_audit(&config, &store, &EventKey::new(event, year), player),
        Commands::Simulate {
            strategy,
            scope,
            years,
            max_events,
            json,
        } => {
            let strategy = resolve_strategy(&store, strategy.as_deref(), &scope)?;
            run_simulate(&config, &store, &strategy, years, max_events, json)
        }
        Commands::WalkForward {
            strategy,
            scope,
            train,
            test,
        } => {
            let strategy = resolve_strategy(&store, strategy.as_deref(), &scope)?;
            run_walk_forward(&config, &store, &strategy, train, test)
        }
        Commands::Experiment(command) => run_experiment(&config, &store, command),
        Commands::MarketState { unfreeze } => run_market_state(&store, unfreeze),
        Commands::Bankroll {
            profit,
            date,
            notes,
            prob,
            odds,
        } => run_bankroll(&store, profit, date, &notes, prob.zip(odds)),
        Commands::Blend => run_blend(&store),
        Commands::ScoreEvent { event, year, top } => run_score_event(&store, &EventKey::new(event, year), top),
    }
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    pb.set_message(message.to_string());
    Ok(pb)
}

fn load_archives(config: &AppConfig) -> Result<Archives> {
    let pb = spinner("Loading archives...")?;

    let rounds_path = config.rounds_csv();
    let history = RoundHistory::load(&rounds_path)
        .with_context(|| format!("Failed to load rounds from {:?}", rounds_path))?;

    let events_path = config.events_csv();
    let calendar = if events_path.exists() {
        EventCalendar::load(&events_path, &history)
            .with_context(|| format!("Failed to load events from {:?}", events_path))?
    } else {
        info!("No events file at {:?}, deriving the calendar from rounds", events_path);
        EventCalendar::build(Vec::new(), &history)
    };

    let odds_path = config.odds_csv();
    let odds = if odds_path.exists() {
        OddsArchive::load(&odds_path).with_context(|| format!("Failed to load odds from {:?}", odds_path))?
    } else {
        OddsArchive::from_quotes(Vec::new())
    };

    pb.finish_and_clear();
    println!(
        "Loaded {} rounds, {} events, odds for {} events",
        history.round_count(),
        calendar.len(),
        odds.len()
    );
    Ok(Archives {
        history,
        calendar,
        odds,
    })
}

/// Strategy from a JSON file, or the scope's active strategy
fn resolve_strategy(store: &Store, path: Option<&Path>, scope: &str) -> Result<StrategyConfig> {
    match path {
        Some(path) => {
            let json =
                std::fs::read_to_string(path).with_context(|| format!("Failed to read strategy {:?}", path))?;
            StrategyConfig::from_json(&json).with_context(|| format!("Invalid strategy in {:?}", path))
        }
        None => Ok(ExperimentTracker::new(store).active_strategy(scope)?),
    }
}

/// clap value parser: American odds text to decimal odds
fn parse_american_odds(text: &str) -> std::result::Result<f64, String> {
    parse_odds_to_decimal(text).ok_or_else(|| format!("invalid American odds: {}", text))
}

fn parse_market(label: &str) -> Result<Market> {
    match Market::parse(label) {
        Some(market) => Ok(market),
        None => bail!("Unknown market: {}", label),
    }
}

fn run_build_pit(config: &AppConfig, store: &Store, years: &[i32], force: bool) -> Result<()> {
    let archives = load_archives(config)?;
    let builder = PitBuilder::new(
        &archives.history,
        &archives.calendar,
        PitConfig {
            force_rebuild: force,
            ..PitConfig::default()
        },
    );

    let pb = spinner(&format!("Building PIT tables for {:?}...", years))?;
    let summary = builder.build_years(store, years);
    pb.finish_and_clear();

    println!(
        "{} {} built, {} skipped, {} rows written",
        "PIT build:".green().bold(),
        summary.events_built,
        summary.events_skipped,
        summary.rows_written
    );
    for (event, reason) in &summary.failures {
        println!("  {} {}: {}", "failed".red(), event, reason);
    }
    Ok(())
}

fn run_audit(config: &AppConfig, store: &Store, event: &EventKey, player: Option<String>) -> Result<()> {
    let archives = load_archives(config)?;
    let builder = PitBuilder::new(&archives.history, &archives.calendar, PitConfig::default());

    match builder.audit_leakage(store, event, player.as_deref()) {
        Ok(report) => {
            println!(
                "{} {} (cutoff {}): {} rows across {} players",
                "CLEAN".green().bold(),
                report.event,
                report.cutoff,
                report.rows_checked,
                report.players_checked
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "LEAKAGE".red().bold(), e);
            Err(e.into())
        }
    }
}

fn run_simulate(
    config: &AppConfig,
    store: &Store,
    strategy: &StrategyConfig,
    years: Vec<i32>,
    max_events: Option<usize>,
    json: bool,
) -> Result<()> {
    let archives = load_archives(config)?;
    let source = ArchiveSource::new(&archives.history, &archives.calendar, &archives.odds, store);
    let simulator = StrategySimulator::new(
        &source,
        SimulationConfig {
            years,
            max_events_per_year: max_events,
        },
    );

    let pb = spinner(&format!("Replaying {}...", strategy.name))?;
    let result = simulator.run(strategy);
    pb.finish_and_clear();

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        result.print_summary();
        print_breakdown("By market", &analyze_by_market(&result.bets));
        print_breakdown("By odds range", &analyze_by_odds_range(&result.bets));
        for error in &result.errors {
            println!("  {} {}", "skipped".yellow(), error);
        }
    }
    Ok(())
}

fn print_breakdown(title: &str, rows: &[DimensionAnalysis]) {
    if rows.is_empty() {
        return;
    }
    println!("{}", title.yellow().bold());
    println!("{:<12} {:>6} {:>6} {:>8} {:>9}", "key", "bets", "wins", "hit%", "ROI%");
    for row in rows {
        let roi = format!("{:>9.2}", row.roi_pct);
        println!(
            "{:<12} {:>6} {:>6} {:>8.1} {}",
            row.key,
            row.bets,
            row.wins,
            row.hit_rate * 100.0,
            if row.roi_pct >= 0.0 { roi.green() } else { roi.red() }
        );
    }
    println!();
}

fn run_walk_forward(
    config: &AppConfig,
    store: &Store,
    strategy: &StrategyConfig,
    train: Vec<i32>,
    test: Vec<i32>,
) -> Result<()> {
    let archives = load_archives(config)?;
    let source = ArchiveSource::new(&archives.history, &archives.calendar, &archives.odds, store);
    let simulator = StrategySimulator::new(&source, SimulationConfig::default());

    let pb = spinner("Running walk-forward split...")?;
    let report = simulator.walk_forward(
        strategy,
        &WalkForwardConfig {
            train_years: train,
            test_years: test,
            ..WalkForwardConfig::default()
        },
    );
    pb.finish_and_clear();

    report.print_summary();
    Ok(())
}

fn run_experiment(config: &AppConfig, store: &Store, command: ExperimentCommand) -> Result<()> {
    let tracker = ExperimentTracker::new(store);

    match command {
        ExperimentCommand::Create {
            hypothesis,
            strategy,
            scope,
        } => {
            let strategy = resolve_strategy(store, Some(strategy.as_path()), &scope)?;
            let id = tracker.create(&NewExperiment {
                hypothesis,
                source: "manual".to_string(),
                scope,
                strategy,
            })?;
            println!("{} experiment {}", "Registered".green(), id);
        }
        ExperimentCommand::Explore {
            scope,
            neighbors,
            seed,
            show,
        } => {
            let base = tracker.active_strategy(&scope)?;
            let explore = ExploreConfig {
                neighbors,
                seed,
                ..ExploreConfig::default()
            };
            for candidate in generate_neighbors(&base, &explore) {
                if show {
                    println!("{}", candidate.to_json_pretty()?);
                }
                let id = tracker.create(&NewExperiment {
                    hypothesis: format!("Neighbour of {}: {}", base.name, candidate.name),
                    source: "explore".to_string(),
                    scope: scope.clone(),
                    strategy: candidate,
                })?;
                println!("  registered experiment {}", id);
            }
        }
        ExperimentCommand::Run { id, years } => {
            let archives = load_archives(config)?;
            let source = ArchiveSource::new(&archives.history, &archives.calendar, &archives.odds, store);
            let sim_config = SimulationConfig {
                years,
                max_events_per_year: None,
            };

            match id {
                Some(id) => {
                    let summary = tracker.run(id, &source, &sim_config)?;
                    println!(
                        "{} experiment {}: ROI {:.2}% over {} bets, Sharpe {:.3}",
                        "Completed".green(),
                        id,
                        summary.roi_pct,
                        summary.total_bets,
                        summary.sharpe
                    );
                }
                None => {
                    let pb = spinner("Running pending experiments...")?;
                    let outcomes = tracker.run_pending(&source, &sim_config)?;
                    pb.finish_and_clear();
                    for (id, ok) in outcomes {
                        let status = if ok { "completed".green() } else { "error".red() };
                        println!("  experiment {}: {}", id, status);
                    }
                }
            }
        }
        ExperimentCommand::Evaluate { id, alpha, min_bets } => {
            let tracker = tracker.with_significance(SignificanceConfig {
                alpha,
                min_bets,
                ..SignificanceConfig::default()
            });
            let verdict = tracker.evaluate(id)?;
            let label = if verdict.significant {
                "SIGNIFICANT".green().bold()
            } else {
                "not significant".yellow()
            };
            println!(
                "Experiment {}: {} (delta {:.2} pts, p {})",
                id,
                label,
                verdict.delta,
                verdict.p_value.map_or("n/a".to_string(), |p| format!("{:.4}", p))
            );
            if let Some(interval) = &verdict.bootstrap {
                println!(
                    "  bootstrap ROI CI [{:.2}%, {:.2}%], {:.1}% of resamples at or below baseline",
                    interval.ci_lower,
                    interval.ci_upper,
                    interval.p_at_or_below_baseline * 100.0
                );
            }
            if let Some(reason) = verdict.reason {
                println!("  {}", reason);
            }
        }
        ExperimentCommand::Promote { id } => {
            if tracker.promote(id)? {
                println!("{} experiment {}", "Promoted".green().bold(), id);
            } else {
                println!("Experiment {} {}", id, "not promoted".yellow());
            }
        }
        ExperimentCommand::Leaderboard { scope, limit } => {
            let entries = tracker.leaderboard(&scope, limit)?;
            println!("{}", format!("Leaderboard ({})", scope).yellow().bold());
            println!(
                "{:>5} {:>9} {:>6} {:>8} {:>8} {:>4} {:<30}",
                "id", "ROI%", "bets", "Sharpe", "CLV", "sig", "hypothesis"
            );
            println!("{}", "-".repeat(80));
            for entry in entries {
                let marker = if entry.promoted { "*" } else { "" };
                println!(
                    "{:>5} {:>9.2} {:>6} {:>8.3} {:>8.4} {:>4} {:<30}{}",
                    entry.id,
                    entry.roi_pct,
                    entry.total_bets,
                    entry.sharpe,
                    entry.clv_avg,
                    if entry.significant { "yes" } else { "no" },
                    entry.hypothesis,
                    marker
                );
            }
        }
    }
    Ok(())
}

fn run_market_state(store: &Store, unfreeze: Option<String>) -> Result<()> {
    if let Some(label) = unfreeze {
        adaptive::unfreeze(store, parse_market(&label)?)?;
    }

    let config = SuppressionConfig::default();
    println!(
        "{:<10} {:<8} {:>5} {:>9} {:>7} {:>6}",
        "market", "state", "bets", "ROI%", "EV min", "stake"
    );
    println!("{}", "-".repeat(52));
    for market in Market::FIELD_MARKETS {
        let a = adaptive::assess(store, market, &config)?;
        let state = match a.state {
            adaptive::MarketState::Normal => a.state.to_string().green(),
            adaptive::MarketState::Caution => a.state.to_string().yellow(),
            adaptive::MarketState::Cold | adaptive::MarketState::Frozen => a.state.to_string().red(),
        };
        println!(
            "{:<10} {:<8} {:>5} {:>9} {:>7} {:>6.2}",
            market.as_str(),
            state,
            a.performance.total_bets,
            a.performance.roi_pct.map_or("-".to_string(), |r| format!("{:.1}", r)),
            a.ev_threshold.map_or("-".to_string(), |t| format!("{:.2}", t)),
            a.stake_multiplier
        );
    }
    Ok(())
}

fn run_bankroll(
    store: &Store,
    profit: Option<f64>,
    date: Option<String>,
    notes: &str,
    bet: Option<(f64, f64)>,
) -> Result<()> {
    if let Some(profit) = profit {
        let date = match date {
            Some(text) => NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .with_context(|| format!("Invalid date {}", text))?,
            None => chrono::Local::now().date_naive(),
        };
        adaptive::record_tournament(store, date, profit, notes)?;
    }

    let latest = adaptive::BankrollLedger::latest_bankroll(store)?;
    match &latest {
        Some(state) => {
            let calc = state.calculator();
            println!(
                "Balance {:.2}u (peak {:.2}u), Kelly multiplier {:.3}{}",
                state.balance,
                state.peak_balance,
                calc.effective_multiplier(),
                if calc.in_drawdown() { " (drawdown)".red().to_string() } else { String::new() }
            );
        }
        None => println!("{}", "Bankroll ledger is empty.".yellow()),
    }

    if let Some((probability, decimal_odds)) = bet {
        golf_backtest::error::validate_probability(probability)?;
        golf_backtest::error::validate_odds(decimal_odds)?;
        let calc = latest.map(|state| state.calculator()).unwrap_or_default();
        let sizing = calc.calculate_single(probability, decimal_odds);
        println!(
            "p {:.3} @ {:.2}: EV {:.3}, full Kelly {:.4}, stake {:.4} of bankroll ({:.2}u)",
            sizing.probability,
            sizing.odds,
            sizing.expected_value,
            sizing.kelly_fraction,
            sizing.recommended_fraction,
            sizing.stake
        );
    }
    Ok(())
}

fn run_blend(store: &Store) -> Result<()> {
    let config = BlendConfig::default();
    println!("{:<10} {:>9} {:>7}", "market", "external", "model");
    for market in Market::FIELD_MARKETS {
        let weights = adaptive::blend_ratio(store, market, &config)?;
        println!("{:<10} {:>9.3} {:>7.3}", market.as_str(), weights.external, weights.model);
    }
    Ok(())
}

fn run_score_event(store: &Store, event: &EventKey, top: usize) -> Result<()> {
    let rolling = store.rolling_stats(event, None)?;
    if rolling.is_empty() {
        println!("{} {}; run build-pit first", "No PIT rows for".red(), event);
        return Ok(());
    }
    let course = store.course_stats(event)?;
    let scores = score_event(&rolling, &course, &ScoringWeights::default());

    let mut ranked: Vec<_> = scores.into_iter().collect();
    ranked.sort_by(|a, b| b.1.composite.total_cmp(&a.1.composite).then_with(|| a.0.cmp(&b.0)));

    println!("{}", format!("Composite scores: {}", event).yellow().bold());
    println!(
        "{:>4} {:<24} {:>9} {:>6} {:>6} {:>8} {:<8}",
        "#", "player", "composite", "form", "course", "momentum", "trend"
    );
    println!("{}", "-".repeat(72));
    for (i, (player, score)) in ranked.iter().take(top).enumerate() {
        println!(
            "{:>4} {:<24} {:>9.1} {:>6.1} {:>6.1} {:>8.1} {:<8}",
            i + 1,
            player,
            score.composite,
            score.form,
            score.course_fit,
            score.momentum,
            format!("{:?}", score.momentum_direction)
        );
    }
    Ok(())
}
