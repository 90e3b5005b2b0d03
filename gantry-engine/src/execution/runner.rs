// Matrix Runner
// One task invocation: before hook, matrix expansion, semaphore-gated entry
// fan-out, per-entry hooks, join, success/failure hooks, and the always-run
// after hook. Entry failures aggregate; fail-fast cancels the invocation.

use crate::config::models::HookStage;
use crate::error::{ConfigError, EngineError, EntryFailure, Result, TaskFailure};
use crate::execution::context::RunContext;
use crate::execution::events::RunEvent;
use crate::execution::matrix::MatrixEntry;
use crate::execution::replace::ReplaceStore;
use crate::execution::spec::TaskExecRequest;
use crate::execution::steps::run_specs;
use crate::execution::BoxFuture;
use crate::registry::TaskBlueprint;
use crate::tasks::TaskKind;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;

/// Run one task invocation to completion.
///
/// Returns a single aggregated error or `Ok`. The `after` hook is always
/// attempted exactly once, whatever happened before it; its error is
/// appended to the primary error, never replacing it.
pub fn run_task(ctx: RunContext, request: TaskExecRequest) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let started = Instant::now();

        let tool = ctx
            .config()
            .tools
            .get(&request.tool)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTool(request.tool.clone()))?;
        let task = tool
            .tasks
            .get(&request.task)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownTask {
                tool: request.tool.clone(),
                task: request.task.clone(),
            })?;

        let kind = ctx.registry().build(TaskBlueprint {
            tool_key: request.tool.clone(),
            tool: tool.clone(),
            task_name: request.task.clone(),
            task: task.clone(),
        })?;

        let mut tctx = ctx
            .entered(&request.tool, &request.task)?
            .with_filter(request.filter.clone());
        tctx.add_env(true, tool.env.clone());
        tctx.add_env(true, task.env.clone());

        tctx.emit(RunEvent::TaskStarted {
            tool: request.tool.clone(),
            task: request.task.clone(),
        });

        let main = run_stages(&tctx, kind.clone(), &request).await;
        let after = run_hook(&tctx, &*kind, HookStage::After, None).await;

        let result = match (main, after) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(after_err)) => Err(after_err),
            (Err(primary), Ok(())) => Err(primary),
            (Err(primary), Err(after_err)) => {
                Err(primary.with_secondary(format!("hook 'after' failed: {}", after_err)))
            }
        };

        tctx.emit(RunEvent::TaskCompleted {
            tool: request.tool.clone(),
            task: request.task.clone(),
            success: result.is_ok(),
            duration: started.elapsed(),
        });

        result
    })
}

/// Everything between (and including) the `before` and `after-failure` /
/// `after-success` hooks.
async fn run_stages(
    ctx: &RunContext,
    kind: Arc<dyn TaskKind>,
    request: &TaskExecRequest,
) -> Result<()> {
    run_hook(ctx, &*kind, HookStage::Before, None).await?;

    let entries = kind.matrix_specs(ctx)?;
    if entries.is_empty() {
        return Err(ConfigError::NoMatrixMatch {
            tool: request.tool.clone(),
            task: request.task.clone(),
        }
        .into());
    }

    let total = entries.len();
    let workers = ctx.claim_workers(total);
    let semaphore = Arc::new(Semaphore::new(workers));
    let failures: Arc<Mutex<Vec<EntryFailure>>> = Arc::new(Mutex::new(Vec::new()));

    let mut handles = Vec::with_capacity(total);
    for (index, entry) in entries.into_iter().enumerate() {
        let ctx = ctx.scoped(&entry.to_string());
        let kind = kind.clone();
        let semaphore = semaphore.clone();
        let failures = failures.clone();

        handles.push(tokio::spawn(async move {
            let _permit = tokio::select! {
                _ = ctx.cancelled() => {
                    emit_skipped(&ctx, &entry);
                    return;
                }
                permit = semaphore.acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };
            // The permit and a cancellation can become ready together; a
            // canceled entry must not start.
            if ctx.is_cancelled() {
                emit_skipped(&ctx, &entry);
                return;
            }

            ctx.emit(RunEvent::EntryStarted {
                label: ctx.label().to_string(),
                entry: entry.to_string(),
                index,
                total,
            });
            let started = Instant::now();

            let result = run_entry(&ctx, &*kind, &entry).await;
            let success = result.is_ok();
            if let Err(err) = result {
                failures
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(EntryFailure {
                        entry: entry.to_string(),
                        error: err.to_string(),
                    });
                if ctx.fail_fast() {
                    ctx.cancel();
                }
            }

            ctx.emit(RunEvent::EntryCompleted {
                label: ctx.label().to_string(),
                entry: entry.to_string(),
                success,
                duration: started.elapsed(),
            });
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let failures = std::mem::take(
        &mut *failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()),
    );

    if failures.is_empty() {
        run_hook(ctx, &*kind, HookStage::AfterSuccess, None).await
    } else {
        let primary: EngineError = TaskFailure { failures }.into();
        match run_hook(ctx, &*kind, HookStage::AfterFailure, None).await {
            Ok(()) => Err(primary),
            Err(hook_err) => {
                Err(primary.with_secondary(format!("hook 'after-failure' failed: {}", hook_err)))
            }
        }
    }
}

fn emit_skipped(ctx: &RunContext, entry: &MatrixEntry) {
    ctx.emit(RunEvent::EntrySkipped {
        label: ctx.label().to_string(),
        entry: entry.to_string(),
        reason: "canceled before start".to_string(),
    });
}

/// One matrix entry: before-matrix hook, exec specs, then the result-
/// dependent and unconditional after-matrix hooks. Hook errors append to
/// the entry's primary error.
async fn run_entry(ctx: &RunContext, kind: &dyn TaskKind, entry: &MatrixEntry) -> Result<()> {
    run_hook(ctx, kind, HookStage::BeforeMatrix, Some(entry)).await?;

    let specs = kind.exec_specs(ctx, entry)?;
    let mut store = ReplaceStore::seeded(entry);
    let mut result = run_specs(ctx, &specs, &mut store).await;

    let outcome_stage = if result.is_ok() {
        HookStage::AfterMatrixSuccess
    } else {
        HookStage::AfterMatrixFailure
    };
    for stage in [outcome_stage, HookStage::AfterMatrix] {
        if let Err(hook_err) = run_hook(ctx, kind, stage, Some(entry)).await {
            result = Err(match result {
                Ok(()) => hook_err,
                Err(primary) => {
                    primary.with_secondary(format!("hook '{}' failed: {}", stage, hook_err))
                }
            });
        }
    }

    result
}

/// Resolve and run one hook stage, best effort for the caller to combine.
async fn run_hook(
    ctx: &RunContext,
    kind: &dyn TaskKind,
    stage: HookStage,
    entry: Option<&MatrixEntry>,
) -> Result<()> {
    let hctx = ctx.scoped(stage.name());
    let specs = kind.hook_specs(&hctx, stage)?;
    if specs.is_empty() {
        return Ok(());
    }

    hctx.emit(RunEvent::HookStarted {
        label: hctx.label().to_string(),
        stage: stage.name(),
    });

    let mut store = match entry {
        Some(entry) => ReplaceStore::seeded(entry),
        None => ReplaceStore::new(),
    };
    run_specs(&hctx, &specs, &mut store).await
}
