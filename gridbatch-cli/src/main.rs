//! gridbatch CLI - Command-line interface
//!
//! Drives batch executions through the gridbatch engine and manages the
//! configuration file.

mod commands;
mod error;
mod runner;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "gridbatch", version = gridbatch::VERSION)]
#[command(about = "Run jobs on batch environments with adaptive polling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of jobs on the in-process loopback environment
    Run(RunArgs),

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Config { command } => commands::config::run(command),
    };

    if let Err(e) = result {
        e.exit();
    }
}
