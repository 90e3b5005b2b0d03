use crate::commands::{load_config, resolve_target};
use crate::output;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use color_eyre::Result;

use gantry_engine::{
    progress_channel, run_task, LogLevel, MatrixFilter, Registry, RunContext, RunEvent,
    TaskExecRequest,
};

/// Run a task across its matrix
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Task to run: "tool:task", or a bare task name when unambiguous
    pub target: String,

    /// Restrict the matrix (repeatable): os=linux,arch=amd64
    #[arg(long = "matrix", short = 'm', value_name = "DIMS")]
    pub matrix: Vec<String>,

    /// Maximum concurrent matrix entries (overrides the config)
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Keep running sibling entries after a failure
    #[arg(long)]
    pub no_fail_fast: bool,

    /// Working directory for execution
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Emit one JSON event per line instead of formatted output
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(file: Option<PathBuf>, args: RunArgs) -> Result<()> {
    let config = load_config(&file)?;
    let registry = Registry::builtin();
    registry.check(&config)?;

    let (tool, task) = resolve_target(&config, &args.target)?;

    let mut rules = Vec::new();
    for rule in &args.matrix {
        rules.push(
            MatrixFilter::parse_rule(rule)
                .map_err(|e| color_eyre::eyre::eyre!("invalid --matrix rule: {}", e))?,
        );
    }
    let filter = MatrixFilter::new(rules);

    let (tx, mut rx) = progress_channel();

    let mut ctx = RunContext::new(Arc::new(config), Arc::new(registry)).with_events(tx);
    if let Some(jobs) = args.jobs {
        ctx = ctx.with_workers(jobs);
    }
    if args.no_fail_fast {
        ctx = ctx.with_fail_fast(false);
    }
    if let Some(dir) = &args.working_dir {
        ctx = ctx.with_dir(dir.clone());
    }

    let request = TaskExecRequest::new(tool, task).with_filter(filter);
    let handle = tokio::spawn(run_task(ctx, request));

    let json = args.json;
    while let Some(event) = rx.recv().await {
        if json {
            println!("{}", event.to_json_line());
        } else {
            render(&event);
        }
    }

    match handle.await? {
        Ok(()) => Ok(()),
        Err(err) => {
            output::error(&err.to_string());
            std::process::exit(1);
        }
    }
}

fn render(event: &RunEvent) {
    match event {
        RunEvent::TaskStarted { tool, task } => {
            output::header(&format!("Task '{}:{}'", tool, task));
        }
        RunEvent::TaskCompleted {
            tool,
            task,
            success,
            duration,
        } => {
            if *success {
                output::success(&format!(
                    "'{}:{}' completed in {:.2}s",
                    tool,
                    task,
                    duration.as_secs_f64()
                ));
            } else {
                output::failure(&format!(
                    "'{}:{}' failed after {:.2}s",
                    tool,
                    task,
                    duration.as_secs_f64()
                ));
            }
        }
        RunEvent::HookStarted { label, .. } => {
            output::dim(&format!("  hook {}", label));
        }
        RunEvent::EntryStarted {
            entry,
            index,
            total,
            ..
        } => {
            output::status("Entry", &format!("{} ({}/{})", entry, index + 1, total));
        }
        RunEvent::EntryCompleted {
            entry,
            success,
            duration,
            ..
        } => {
            if *success {
                output::success(&format!("{} ({:.2}s)", entry, duration.as_secs_f64()));
            } else {
                output::failure(&format!("{} ({:.2}s)", entry, duration.as_secs_f64()));
            }
        }
        RunEvent::EntrySkipped { entry, reason, .. } => {
            output::warning(&format!("skipped {} ({})", entry, reason));
        }
        RunEvent::StepStarted { .. } => {}
        RunEvent::StepOutput {
            label,
            line,
            is_error,
        } => {
            if *is_error {
                output::step_error(label, line);
            } else {
                output::step_output(label, line);
            }
        }
        RunEvent::StepCompleted {
            label,
            name,
            success,
            exit_code,
            ..
        } => {
            if !success {
                output::failure(&format!(
                    "step '{}' in {} (exit code {:?})",
                    name, label, exit_code
                ));
            }
        }
        RunEvent::Log {
            level,
            label,
            message,
        } => match level {
            LogLevel::Warning => output::warning(&format!("{}: {}", label, message)),
            LogLevel::Error => output::error(&format!("{}: {}", label, message)),
            _ => output::info(&format!("{}: {}", label, message)),
        },
    }
}
