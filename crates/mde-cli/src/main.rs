mod cmd;
mod connect;
mod output;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, machine::MachineSubcommand, remediate::RemediateArgs};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "mde-response",
    about = "Acquire alert evidence and run containment actions on Defender for Endpoint machines",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file
    #[arg(
        long,
        global = true,
        env = "MDE_RESPONSE_CONFIG",
        default_value = "mde-response.yaml"
    )]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect evidence from recent alerts and fetch the files via live response
    Acquire {
        /// Show which files would be acquired; submit nothing, record nothing
        #[arg(long)]
        dry_run: bool,
        /// Resolve download links but do not download the files
        #[arg(long)]
        no_download: bool,
    },

    /// Comment a sample verdict onto its alerts and run the configured
    /// containment actions
    Remediate(RemediateArgs),

    /// Inspect a machine
    Machine {
        #[command(subcommand)]
        subcommand: MachineSubcommand,
    },

    /// Validate or print the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Acquire { .. } | Commands::Remediate(_) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_path();
    let result = match cli.command {
        Commands::Acquire {
            dry_run,
            no_download,
        } => cmd::acquire::run(config, dry_run, no_download, cli.json),
        Commands::Remediate(args) => cmd::remediate::run(config, args, cli.json),
        Commands::Machine { subcommand } => cmd::machine::run(config, subcommand, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
