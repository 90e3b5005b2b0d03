mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "gantry",
    version,
    about = "A matrix-expanding task runner for YAML-declared tools and tasks"
)]
struct Cli {
    /// Path to the gantry.yml config file (discovered upward by default)
    #[arg(long, short = 'f', global = true, value_name = "FILE")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a task across its matrix
    Run(commands::run::RunArgs),
    /// List configured tools and tasks
    List(commands::list::ListArgs),
    /// Parse and validate the configuration
    Validate(commands::validate::ValidateArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => commands::run::execute(cli.file, args).await,
        Command::List(args) => commands::list::execute(cli.file, args),
        Command::Validate(args) => commands::validate::execute(cli.file, args),
    }
}
