mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::feature::FeatureSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "forge",
    about = "Generate Gherkin features and keep their complexity analysis in step with the text",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .forge/ or .git/)
    #[arg(long, global = true, env = "FORGE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize .forge/ in the current project
    Init,

    /// Manage features
    Feature {
        #[command(subcommand)]
        subcommand: FeatureSubcommand,
    },

    /// Recompute a feature's complexity analysis if its text or count changed
    Analyze {
        slug: String,
        /// Reanalyze even when the stored analysis is current
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP service
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "4180")]
        port: u16,
        /// Don't open a browser
        #[arg(long)]
        no_open: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Feature { subcommand } => cmd::feature::run(&root, subcommand, cli.json),
        Commands::Analyze { slug, force } => cmd::analyze::run(&root, &slug, force, cli.json),
        Commands::Serve { port, no_open } => cmd::serve::run(&root, port, no_open),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
