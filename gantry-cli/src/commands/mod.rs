pub mod list;
pub mod run;
pub mod validate;

use color_eyre::Result;
use gantry_engine::config;
use gantry_engine::Config;
use std::path::PathBuf;

/// Load the configuration from an explicit file or by upward discovery
pub fn load_config(file: &Option<PathBuf>) -> Result<Config> {
    let path = match file {
        Some(path) => path.clone(),
        None => config::discover(&std::env::current_dir()?)?,
    };
    Ok(config::load_file(&path)?)
}

/// Resolve `tool:task` or a unique bare task name to `(tool, task)`
pub fn resolve_target(config: &Config, target: &str) -> Result<(String, String)> {
    if let Some((tool, task)) = target.split_once(':') {
        return Ok((tool.to_string(), task.to_string()));
    }

    let mut matches: Vec<String> = config
        .tools
        .iter()
        .filter(|(_, tool)| tool.tasks.contains_key(target))
        .map(|(name, _)| name.clone())
        .collect();
    matches.sort();

    match matches.len() {
        0 => color_eyre::eyre::bail!("no tool defines a task named '{}'", target),
        1 => Ok((matches.remove(0), target.to_string())),
        _ => color_eyre::eyre::bail!(
            "task '{}' is ambiguous; use one of: {}",
            target,
            matches
                .iter()
                .map(|tool| format!("{}:{}", tool, target))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}
