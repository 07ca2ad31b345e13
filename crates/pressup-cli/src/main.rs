use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;

mod commands;
mod completion;
mod config;
mod render;

use commands::{
    run_auto_update_command, run_check_command, run_maintenance_command, run_unlock_command,
    run_upgrade_command, run_verify_command, UpgradeOptions,
};
use completion::write_completions_script;
use config::PressupConfig;
use render::current_output_style;

#[derive(Parser, Debug)]
#[command(name = "pressup")]
#[command(about = "Core self-upgrade tool for ClassicPress installations", long_about = None)]
struct Cli {
    /// Configuration file; `pressup.toml` in the working directory when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Installation root, overriding the configuration file.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask the update service for offers and cache them.
    Check,
    /// Upgrade core to the best cached or freshly fetched offer.
    Upgrade {
        /// Read the offer from a JSON file instead of the update service.
        #[arg(long)]
        offer: Option<PathBuf>,
        /// Reinstall the previous release when the copy phase damages the tree.
        #[arg(long)]
        attempt_rollback: bool,
        /// Reinstall the offered release even when it is already installed.
        #[arg(long)]
        reinstall: bool,
        /// Skip the pre-check that decides whether a partial package is usable.
        #[arg(long)]
        no_checksum_precheck: bool,
    },
    /// Unattended upgrade governed by the configured auto-update policy.
    AutoUpdate,
    /// Compare installed core files against the release checksums.
    Verify,
    Maintenance {
        #[command(subcommand)]
        action: MaintenanceAction,
    },
    /// Drop the core updater lock left behind by a crashed run.
    Unlock,
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum MaintenanceAction {
    Status,
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run_cli(cli)
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn,pressup_upgrader=info",
        1 => "info,pressup_upgrader=debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .try_init();
}

fn run_cli(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut stdout = std::io::stdout();
        return write_completions_script(shell, &mut stdout);
    }

    let config = PressupConfig::load_for_cli(cli.config.as_deref(), cli.root.as_deref())?;
    let style = current_output_style();

    match cli.command {
        Commands::Check => run_check_command(&config, style),
        Commands::Upgrade {
            offer,
            attempt_rollback,
            reinstall,
            no_checksum_precheck,
        } => run_upgrade_command(
            &config,
            style,
            UpgradeOptions {
                offer_path: offer,
                attempt_rollback,
                reinstall,
                pre_check_checksums: !no_checksum_precheck,
            },
        ),
        Commands::AutoUpdate => run_auto_update_command(&config, style),
        Commands::Verify => run_verify_command(&config, style),
        Commands::Maintenance { action } => {
            run_maintenance_command(&config, style, action == MaintenanceAction::Clear)
        }
        Commands::Unlock => run_unlock_command(&config, style),
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests;
