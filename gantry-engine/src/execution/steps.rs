// Step Executor
// Runs an exec-spec list strictly in order: delay, substitution, shell
// resolution, launch, capture, and per-step error policy. Parallelism only
// exists across matrix entries, never inside one list.

use crate::error::{EngineError, Result, StepError};
use crate::execution::context::RunContext;
use crate::execution::events::RunEvent;
use crate::execution::replace::ReplaceStore;
use crate::execution::runner::run_task;
use crate::execution::spec::{CaptureSpec, CommandSpec, Computed, ExecSpec, RunAction, ShellMode};
use crate::execution::BoxFuture;
use crate::runners::shell::LaunchRequest;
use std::collections::HashSet;
use std::time::Instant;

/// Execute a spec list sequentially against one replace store.
///
/// Captures from earlier specs are visible to later ones, including through
/// nested compute recursion, because the same store is threaded throughout.
pub fn run_specs<'a>(
    ctx: &'a RunContext,
    specs: &'a [ExecSpec],
    store: &'a mut ReplaceStore,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for spec in specs {
            if let Some(delay) = spec.delay {
                tokio::select! {
                    _ = ctx.cancelled() => return Err(StepError::Canceled.into()),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if ctx.is_cancelled() {
                return Err(StepError::Canceled.into());
            }

            match &spec.action {
                RunAction::Compute(compute) => {
                    run_compute_spec(ctx, spec, compute(store), store).await?;
                }
                RunAction::Command(command) => {
                    run_command_spec(ctx, spec, command, store).await?;
                }
            }
        }
        Ok(())
    })
}

async fn run_compute_spec(
    ctx: &RunContext,
    spec: &ExecSpec,
    computed: Result<Computed>,
    store: &mut ReplaceStore,
) -> Result<()> {
    let started = Instant::now();
    ctx.emit(RunEvent::StepStarted {
        label: ctx.label().to_string(),
        name: spec.name.clone(),
    });

    let result = match computed {
        Ok(Computed::Skip) => Ok(()),
        Ok(Computed::Value(data)) => {
            if let Some(capture) = &spec.capture {
                record_capture(store, capture, data, None);
            }
            Ok(())
        }
        Ok(Computed::Specs(next)) => run_specs(ctx, &next, store).await,
        Ok(Computed::Task(request)) => {
            let ignore_task_error = request.ignore_error;
            match run_task(ctx.clone(), request).await {
                Ok(()) => Ok(()),
                Err(err) if ignore_task_error => {
                    ctx.emit(RunEvent::info(
                        ctx.label(),
                        format!("ignoring nested task failure: {}", err),
                    ));
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
        Err(err) => Err(err),
    };

    finish_step(ctx, spec, store, result, None, started.elapsed())
}

async fn run_command_spec(
    ctx: &RunContext,
    spec: &ExecSpec,
    command: &CommandSpec,
    store: &mut ReplaceStore,
) -> Result<()> {
    let started = Instant::now();

    let substituted = store.apply_argv(&command.argv);
    let argv = match command.shell_mode {
        ShellMode::Direct => substituted,
        ShellMode::Command => {
            let shell = ctx.shell(spec.shell.as_deref())?;
            shell.wrap_command(&substituted.join(" "))
        }
        ShellMode::File => {
            let shell = ctx.shell(spec.shell.as_deref())?;
            shell.wrap_file(&substituted.join(" "))
        }
    };
    let program = argv.first().cloned().unwrap_or_default();

    let dir = match &spec.dir {
        Some(dir) => ctx.dir().join(dir),
        None => ctx.dir().clone(),
    };

    ctx.emit(RunEvent::StepStarted {
        label: ctx.label().to_string(),
        name: spec.name.clone(),
    });

    let request = LaunchRequest {
        label: ctx.label().to_string(),
        argv,
        env: assemble_env(ctx, spec, store),
        dir,
        stdin: spec.stdin.clone(),
        timeout: spec.timeout,
        capture: spec.capture.is_some(),
        show_stdout: spec.show_stdout,
        show_stderr: spec.show_stderr,
        cancel: ctx.cancel_token(),
        events: ctx.events(),
    };

    match ctx.launcher().launch(request).await {
        Ok(outcome) => {
            let exit_code = outcome.exit_code;
            let result = if outcome.success() {
                Ok(())
            } else {
                Err(EngineError::Step(StepError::ExitStatus {
                    program,
                    code: exit_code,
                }))
            };
            if let Some(capture) = &spec.capture {
                let error = result.as_ref().err().map(ToString::to_string);
                record_capture(store, capture, outcome.captured, error);
            }
            finish_step(ctx, spec, store, result, exit_code, started.elapsed())
        }
        Err(err) => {
            let result = Err(EngineError::Step(err));
            if let Some(capture) = &spec.capture {
                let error = result.as_ref().err().map(ToString::to_string);
                record_capture(store, capture, Vec::new(), error);
            }
            finish_step(ctx, spec, store, result, None, started.elapsed())
        }
    }
}

/// Emit the completion event and apply the spec's error policy.
///
/// Cancellation is never ignorable: the rest of the list must not run.
fn finish_step(
    ctx: &RunContext,
    spec: &ExecSpec,
    store: &mut ReplaceStore,
    result: Result<()>,
    exit_code: Option<i32>,
    duration: std::time::Duration,
) -> Result<()> {
    ctx.emit(RunEvent::StepCompleted {
        label: ctx.label().to_string(),
        name: spec.name.clone(),
        success: result.is_ok(),
        exit_code,
        duration,
    });

    let err = match result {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    if matches!(err, EngineError::Step(StepError::Canceled)) {
        return Err(err);
    }

    if let Some(capture) = &spec.capture {
        store.record_error(&capture.token, err.to_string());
    }

    if spec.ignore_error {
        ctx.emit(RunEvent::info(
            ctx.label(),
            format!("step '{}' failed (ignored): {}", spec.name, err),
        ));
        Ok(())
    } else {
        Err(err)
    }
}

fn record_capture(
    store: &mut ReplaceStore,
    capture: &CaptureSpec,
    data: Vec<u8>,
    error: Option<String>,
) {
    let data = match &capture.fixup {
        Some(fixup) => fixup(data),
        None => data,
    };
    store.record(capture.token.clone(), data, error);
}

/// Layer the environment for one launch.
///
/// Precedence, low to high: suggested context env, suggested spec env
/// (both skipped when the ambient process env already sets the name),
/// context overrides, spec overrides. Spec env goes through substitution.
fn assemble_env(ctx: &RunContext, spec: &ExecSpec, store: &ReplaceStore) -> Vec<(String, String)> {
    let mut env = Vec::new();

    let overridden: HashSet<&str> = ctx
        .env_override()
        .iter()
        .map(|(k, _)| k.as_str())
        .chain(spec.env_override.iter().map(|(k, _)| k.as_str()))
        .collect();

    for (name, value) in ctx.env_suggest() {
        if !overridden.contains(name.as_str()) && std::env::var_os(name).is_none() {
            env.push((name.clone(), value.clone()));
        }
    }
    for (name, value) in store.apply_env(&spec.env_suggest) {
        if !overridden.contains(name.as_str()) && std::env::var_os(&name).is_none() {
            env.push((name, value));
        }
    }
    for (name, value) in ctx.env_override() {
        env.push((name.clone(), value.clone()));
    }
    env.extend(store.apply_env(&spec.env_override));

    env
}
