mod config_cmd;
mod context;
mod list;
mod output;
mod sync_cmd;
mod watch_cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use programsync_core::QueryKey;

#[derive(Parser)]
#[command(name = "programsync", about = "Sync and browse remote programs", version)]
struct Cli {
    /// Config file (defaults to $PROGRAMSYNC_CONFIG or ~/.config/programsync/programsync.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync session and refresh cached lists
    Sync,

    /// List programs for a query key
    List {
        /// Status key (CURRENT, ALL or a single status)
        #[arg(long)]
        key: Option<QueryKey>,

        /// Only programs of this type
        #[arg(long = "type")]
        program_type: Option<String>,

        /// Only programs referencing this business identifier
        #[arg(long)]
        business: Option<String>,

        /// Ignore cached data
        #[arg(long)]
        force: bool,

        #[arg(long)]
        json: bool,
    },

    /// List selectable businesses for a query key
    Options {
        #[arg(long)]
        key: Option<QueryKey>,

        #[arg(long = "type")]
        program_type: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Sync now and then periodically until interrupted
    Watch,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("programsync={level}").parse().expect("valid log directive"))
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Config => config_cmd::run(config_path),
        Commands::Sync => sync_cmd::run(config_path).await,
        Commands::List {
            key,
            program_type,
            business,
            force,
            json,
        } => {
            list::run_list(
                config_path,
                list::ListArgs {
                    key,
                    program_type,
                    business,
                    force,
                    json,
                },
            )
            .await
        }
        Commands::Options {
            key,
            program_type,
            json,
        } => list::run_options(config_path, key, program_type, json).await,
        Commands::Watch => watch_cmd::run(config_path).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
