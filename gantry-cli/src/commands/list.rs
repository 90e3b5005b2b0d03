use crate::commands::load_config;
use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

/// List configured tools and tasks
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list tasks for this tool
    #[arg(long, value_name = "TOOL")]
    pub tool: Option<String>,
}

pub fn execute(file: Option<PathBuf>, args: ListArgs) -> Result<()> {
    let config = load_config(&file)?;

    let mut tool_names: Vec<&String> = config.tools.keys().collect();
    tool_names.sort();

    for tool_name in tool_names {
        if let Some(only) = &args.tool {
            if only != tool_name {
                continue;
            }
        }
        let tool = &config.tools[tool_name];
        output::header(&format!("{} ({})", tool_name, tool.kind));

        let mut task_names: Vec<&String> = tool.tasks.keys().collect();
        task_names.sort();
        for task_name in task_names {
            let task = &tool.tasks[task_name];
            let description = task.description.as_deref().unwrap_or("");
            println!("  {:<20} {:<10} {}", task_name, task.kind, description);
        }
    }

    Ok(())
}
