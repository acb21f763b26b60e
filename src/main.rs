use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

mod cli;
mod confidence;
mod config;
mod graph;
mod orchestrator;
mod preserve;
mod reindex;
mod resolve;
mod strategies;
mod watcher;

#[derive(Parser)]
#[command(name = "symgraph")]
#[command(version)]
#[command(about = "Multi-strategy symbol graph extractor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project
    Index {
        /// Project directory to index
        #[arg(default_value = ".")]
        project: String,

        /// Rebuild the index from scratch
        #[arg(short, long)]
        rebuild: bool,

        /// Keep watching for changes after indexing
        #[arg(short, long)]
        watch: bool,
    },

    /// Watch a project, re-indexing on changes
    Watch {
        /// Project directory to watch
        #[arg(default_value = ".")]
        project: String,
    },

    /// Show index statistics
    Stats {
        /// Project directory
        #[arg(default_value = ".")]
        project: String,
    },

    /// Resolve a call target against the project's symbols
    Resolve {
        /// Caller qualified name (e.g. engine::Engine::start)
        from: String,

        /// Target name as written at the call site
        to: String,

        /// Project directory
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

fn init_logging(debug: bool, verbose: bool) {
    let level = if debug {
        Level::DEBUG
    } else if verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.debug, cli.verbose);

    match cli.command {
        Commands::Index {
            project,
            rebuild,
            watch,
        } => {
            info!("Indexing project: {}", project);
            cli::index::index_project(project, rebuild, watch).await?;
        }

        Commands::Watch { project } => {
            info!("Watching project: {}", project);
            cli::watch::watch_project(project).await?;
        }

        Commands::Stats { project } => {
            cli::stats::show_stats(project)?;
        }

        Commands::Resolve { from, to, project } => {
            cli::resolve::resolve_target(project, from, to).await?;
        }
    }

    Ok(())
}
