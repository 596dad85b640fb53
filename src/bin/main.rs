//! Operator CLI: history administration and mirroring.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use slipway::config::{self, Config};
use slipway::core::ObjectKind;
use slipway::history::{HistoryRepo, SnapshotReader};
use slipway::index::Index;
use slipway::jobs::run_with_index;
use slipway::{Error, mirror, paths, telemetry};

#[derive(Parser, Debug)]
#[command(
    name = "slipway",
    version,
    about = "Git-native forge core",
    arg_required_else_help = true
)]
struct Cli {
    /// Configuration file (default: $SLIPWAY_CONFIG or /etc/slipway/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Debug output (repeat for more).
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the history repositories for a project.
    InitHistory {
        /// Project fullname, e.g. `infra/tools`.
        #[arg(long)]
        project: String,
    },

    /// Rebuild the index from a project's history repository.
    Replay {
        #[arg(long)]
        project: String,
        /// Which tracked-object class to replay.
        #[arg(long, value_parser = parse_kind)]
        kind: ObjectKind,
    },

    /// Mirroring administration.
    #[command(subcommand)]
    Mirror(MirrorCommands),
}

#[derive(Subcommand, Debug)]
enum MirrorCommands {
    /// Provision the deploy key and enable mirroring.
    Setup {
        #[arg(long)]
        project: String,
    },
    /// Remove the deploy key and disable mirroring.
    Teardown {
        #[arg(long)]
        project: String,
    },
    /// Replace the list of push targets (ssh URLs).
    SetTargets {
        #[arg(long)]
        project: String,
        targets: Vec<String>,
    },
    /// Push the project to its mirrors now.
    Run {
        #[arg(long)]
        project: String,
    },
}

fn parse_kind(raw: &str) -> Result<ObjectKind, String> {
    ObjectKind::parse(raw).map_err(|e| e.to_string())
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    telemetry::init(&config.logging, cli.verbose);

    if let Err(e) = run(&config, cli.command) {
        tracing::error!("error: {e}");
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> slipway::Result<Config> {
    match &cli.config {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

fn run(config: &Config, command: Commands) -> slipway::Result<()> {
    match command {
        Commands::InitHistory { project } => {
            HistoryRepo::init(&paths::tickets_repo_path(&config.storage, &project))?;
            HistoryRepo::init(&paths::requests_repo_path(&config.storage, &project))?;
            println!("history repositories created for {project}");
            Ok(())
        }

        Commands::Replay { project, kind } => {
            let path = match kind {
                ObjectKind::Ticket => paths::tickets_repo_path(&config.storage, &project),
                ObjectKind::Request => paths::requests_repo_path(&config.storage, &project),
            };
            let repo = HistoryRepo::open(&path)?;
            let reader = SnapshotReader::new();
            let report = run_with_index(&config.storage.index_db, |index| {
                reader.replay_repository(index, &repo)
            })?;
            println!(
                "replayed {} commits, {} documents; {} edges resolved, {} dropped",
                report.commits,
                report.documents,
                report.resolved_edges,
                report.dropped_edges.len()
            );
            for edge in &report.dropped_edges {
                println!("  dropped: {edge}");
            }
            Ok(())
        }

        Commands::Mirror(cmd) => run_mirror(config, cmd),
    }
}

fn run_mirror(config: &Config, command: MirrorCommands) -> slipway::Result<()> {
    match command {
        MirrorCommands::Setup { project } => {
            run_with_index(&config.storage.index_db, |index| {
                mirror::setup_mirroring(config, index, &project)?;
                if let Some(state) = index.mirror_state(&project).map_err(Error::from)?
                    && let Some(key) = state.public_key
                {
                    println!("{key}");
                }
                Ok(())
            })
        }
        MirrorCommands::Teardown { project } => {
            run_with_index(&config.storage.index_db, |index| {
                mirror::teardown_mirroring(config, index, &project).map_err(Error::from)
            })
        }
        MirrorCommands::SetTargets { project, targets } => {
            run_with_index(&config.storage.index_db, |index| {
                index
                    .set_mirror_targets(&project, &targets)
                    .map_err(Error::from)
            })
        }
        MirrorCommands::Run { project } => {
            let outcome = run_with_index(&config.storage.index_db, |index| {
                mirror::mirror_project(config, index, &project).map_err(Error::from)
            })?;
            match outcome {
                mirror::MirrorOutcome::Skipped(reason) => println!("skipped: {reason}"),
                mirror::MirrorOutcome::Completed {
                    pushed,
                    failed,
                    timed_out,
                } => {
                    println!("pushed {pushed} remote(s), {failed} failed");
                    if timed_out {
                        println!("push budget exhausted before all remotes were tried");
                    }
                }
            }
            Ok(())
        }
    }
}
