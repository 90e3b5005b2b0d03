use crate::commands::load_config;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use gantry_engine::Registry;

/// Parse and validate the configuration
#[derive(Args, Debug)]
pub struct ValidateArgs {}

pub fn execute(file: Option<PathBuf>, _args: ValidateArgs) -> Result<()> {
    let config = load_config(&file)?;
    Registry::builtin().check(&config)?;

    let tools = config.tools.len();
    let tasks: usize = config.tools.values().map(|tool| tool.tasks.len()).sum();
    output::success(&format!(
        "configuration is valid ({} tools, {} tasks)",
        tools, tasks
    ));
    Ok(())
}
