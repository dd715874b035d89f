//! Main entry point for the Song Battle engine
//!
//! Every subcommand builds the same `AppState`, so the command line and the
//! HTTP server share storage, logging and metrics.

use anyhow::Result;
use clap::{Parser, Subcommand};
use song_battle::catalog::{import_items, load_catalog_file};
use song_battle::config::{AppConfig, StorageBackend};
use song_battle::error::{BattleError, ErrorKind};
use song_battle::export::{write_playlist, ExportSelection};
use song_battle::service::{AppState, HttpServer};
use song_battle::types::{Outcome, RankedItem, RatingChange};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

/// Song Battle - rank your music collection one duel at a time
#[derive(Parser)]
#[command(
    name = "song-battle",
    version,
    about = "Rank a personal music collection through pairwise Elo battles",
    long_about = "Song Battle pits two tracks against each other, turns every win, loss, draw \
                 or skip into Elo rating updates, and picks the next pair so new tracks get \
                 played and established ones meet opponents of similar strength."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Database path override
    #[arg(long, value_name = "FILE", help = "Override SQLite database path")]
    db_path: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Matchmaker seed override
    #[arg(long, value_name = "SEED", help = "Seed the matchmaker for reproducible pairings")]
    seed: Option<u64>,

    /// Dry run mode (validate config and exit)
    #[arg(long, help = "Validate configuration and exit without touching storage")]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Battle(BattleCommand),
    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
}

/// Commands that run once against the store and exit
#[derive(Subcommand)]
enum BattleCommand {
    /// Import catalog entries from a JSON file
    Import {
        /// JSON array of catalog entries
        file: PathBuf,
    },
    /// Show the next pair to battle
    Next,
    /// Record the outcome of a duel
    Duel {
        left_id: i64,
        right_id: i64,
        /// left, right, draw or skip
        outcome: String,
    },
    /// Show what a duel would do to both ratings without recording it
    Preview {
        left_id: i64,
        right_id: i64,
        /// left, right, draw or skip
        outcome: String,
    },
    /// Print the current ranking
    Ranking {
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Print rating and matchmaking statistics
    Stats,
    /// Print the most recent duels
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
    /// Write a JSON playlist: the top of the ranking, chosen ids or an Elo band
    Export {
        /// Output file
        output: PathBuf,
        /// Number of top-ranked items (1 to 1000)
        #[arg(short = 'n', long, conflicts_with_all = ["ids", "min_elo"])]
        limit: Option<usize>,
        /// Comma-separated item ids, in playlist order
        #[arg(long, value_delimiter = ',', conflicts_with = "min_elo")]
        ids: Vec<i64>,
        /// Lowest rating to include
        #[arg(long, requires = "max_elo")]
        min_elo: Option<i32>,
        /// Highest rating to include
        #[arg(long, requires = "min_elo")]
        max_elo: Option<i32>,
        #[arg(long)]
        name: Option<String>,
    },
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🎵 Song Battle");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    match config.storage.backend {
        StorageBackend::Sqlite => {
            info!("   Database: {}", config.storage.database_path.display())
        }
        StorageBackend::Memory => info!("   Database: in memory"),
    }
    match config.matchmaking.seed {
        Some(seed) => info!("   Matchmaker seed: {}", seed),
        None => info!("   Matchmaker seed: random"),
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from file or environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if let Some(db_path) = &args.db_path {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.database_path = db_path.clone();
    }

    if let Some(seed) = args.seed {
        config.matchmaking.seed = Some(seed);
    }

    if let Some(Command::Serve { host, port }) = &args.command {
        if let Some(host) = host {
            config.server.host = host.clone();
        }
        if let Some(port) = port {
            config.server.port = *port;
        }
    }

    song_battle::config::validate_config(&config)?;
    Ok(config)
}

fn print_item(rank: usize, ranked: &RankedItem) {
    println!(
        "{:>4}. {:>5}  {} - {}  [{}W {}L {}D]  #{}",
        rank,
        ranked.elo(),
        ranked.item.artist,
        ranked.item.title,
        ranked.rating.wins,
        ranked.rating.losses,
        ranked.rating.draws,
        ranked.id()
    );
}

fn print_change(label: &str, change: &RatingChange) {
    println!(
        "{:<6} #{:<5} {} -> {} ({:+})",
        label, change.item_id, change.old_rating, change.new_rating, change.change
    );
}

fn run_command(state: &AppState, command: BattleCommand) -> Result<()> {
    match command {
        BattleCommand::Import { file } => {
            let entries = load_catalog_file(&file)?;
            let store = state.store();
            let summary = import_items(store.as_ref(), entries)?;
            println!(
                "Imported {} items ({} already known)",
                summary.imported, summary.skipped
            );
        }
        BattleCommand::Next => {
            let proposal = state.next_match()?;
            println!("{} match, quality {}", proposal.mode, proposal.quality);
            print_item(1, &proposal.left);
            print_item(2, &proposal.right);
        }
        BattleCommand::Duel {
            left_id,
            right_id,
            outcome,
        } => {
            let outcome: Outcome = outcome.parse()?;
            let result = state.submit_duel(left_id, right_id, outcome)?;
            println!("Recorded {} (match #{})", outcome, result.record.id.unwrap_or_default());
            print_change("left", &result.left);
            print_change("right", &result.right);
        }
        BattleCommand::Preview {
            left_id,
            right_id,
            outcome,
        } => {
            let outcome: Outcome = outcome.parse()?;
            let preview = state.preview_duel(left_id, right_id, outcome)?;
            println!("If {}:", outcome);
            print_change("left", &preview.left);
            print_change("right", &preview.right);
        }
        BattleCommand::Ranking { limit } => {
            for (index, ranked) in state.ranking(limit)?.iter().enumerate() {
                print_item(index + 1, ranked);
            }
        }
        BattleCommand::Stats => {
            let stats = state.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        BattleCommand::History { limit } => {
            for record in state.history(limit)? {
                let winner = record
                    .winner_item_id
                    .map(|id| format!("#{}", id))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  #{} vs #{}  winner {}",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.left_item_id,
                    record.right_item_id,
                    winner
                );
            }
        }
        BattleCommand::Export {
            output,
            limit,
            ids,
            min_elo,
            max_elo,
            name,
        } => {
            let selection = match (min_elo, max_elo) {
                (Some(min), Some(max)) => ExportSelection::EloRange { min, max },
                _ if !ids.is_empty() => ExportSelection::Items(ids),
                _ => ExportSelection::Top { limit },
            };
            let playlist = state.export_playlist(&selection, name.as_deref())?;
            write_playlist(&output, &playlist)?;
            println!(
                "Wrote '{}' ({} tracks) to {}",
                playlist.name,
                playlist.track_count,
                output.display()
            );
        }
    }
    Ok(())
}

async fn serve(state: Arc<AppState>) -> Result<()> {
    state.start();

    let server = Arc::new(HttpServer::new(state.clone()));
    let mut server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    info!("✅ Song Battle is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            info!("🛑 Shutdown signal received, beginning graceful shutdown...");
            server.stop();
        }
        result = &mut server_task => {
            // The server only returns on its own when it failed to start
            state.shutdown();
            return result.map_err(|e| anyhow::anyhow!("HTTP server task panicked: {}", e))?;
        }
    }

    match tokio::time::timeout(state.config().shutdown_timeout(), server_task).await {
        Ok(Ok(Ok(()))) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Ok(Err(e))) => error!("HTTP server failed: {:#}", e),
        Ok(Err(e)) => error!("HTTP server task panicked: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    state.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without opening storage");
        return Ok(());
    }

    let Some(command) = args.command else {
        eprintln!("No command given, see --help");
        std::process::exit(2);
    };

    let app_state = match AppState::new(config.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let command = match command {
        Command::Serve { .. } => {
            display_startup_banner(&config);
            return serve(app_state).await;
        }
        Command::Battle(command) => command,
    };

    if let Err(e) = run_command(&app_state, command) {
        eprintln!("Error: {:#}", e);
        std::process::exit(match BattleError::kind_of(&e) {
            ErrorKind::InsufficientData => 3,
            ErrorKind::NotFound => 4,
            ErrorKind::InvalidOutcome => 5,
            _ => 1,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("song-battle").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_serve_is_split_from_battle_commands() {
        let args = parse(&["serve", "--port", "9000"]);
        assert!(matches!(args.command, Some(Command::Serve { port: Some(9000), .. })));

        let args = parse(&["ranking", "-n", "5"]);
        assert!(matches!(
            args.command,
            Some(Command::Battle(BattleCommand::Ranking { limit: Some(5) }))
        ));
    }

    #[test]
    fn test_export_selection_flags() {
        let args = parse(&["export", "out.json", "--ids", "3,1"]);
        match args.command {
            Some(Command::Battle(BattleCommand::Export { ids, limit, .. })) => {
                assert_eq!(ids, vec![3, 1]);
                assert_eq!(limit, None);
            }
            _ => panic!("expected export"),
        }

        let args = parse(&["export", "out.json", "--min-elo", "1200", "--max-elo", "1300"]);
        assert!(matches!(
            args.command,
            Some(Command::Battle(BattleCommand::Export {
                min_elo: Some(1200),
                max_elo: Some(1300),
                ..
            }))
        ));

        let argv = |extra: &[&'static str]| {
            let mut argv = vec!["song-battle", "export", "out.json"];
            argv.extend_from_slice(extra);
            argv
        };
        assert!(Args::try_parse_from(argv(&["--min-elo", "1200"])).is_err());
        assert!(Args::try_parse_from(argv(&["--ids", "1", "-n", "5"])).is_err());
        assert!(Args::try_parse_from(argv(&["--ids", "1", "--min-elo", "1", "--max-elo", "2"])).is_err());
    }
}
