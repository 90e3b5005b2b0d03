// Run Context
// Per-invocation state threaded through the engine: configuration, registry,
// launcher, env layering, cancellation, worker budget, and output labels.

use crate::config::models::Config;
use crate::error::{ConfigError, ConfigResult};
use crate::execution::events::{EventSender, ProgressSender, RunEvent};
use crate::execution::matrix::MatrixFilter;
use crate::registry::Registry;
use crate::runners::shell::{resolve_shell, Launcher, ProcessLauncher, ShellSpec};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Execution context for one task invocation tree.
///
/// Cloning is cheap; derived clones share the cancellation token and the
/// immutable configuration but own their label, env, and task stack.
#[derive(Clone)]
pub struct RunContext {
    config: Arc<Config>,
    registry: Arc<Registry>,
    launcher: Arc<dyn Launcher>,
    events: Option<ProgressSender>,
    cancel: CancellationToken,
    fail_fast: bool,
    worker_budget: usize,
    label: String,
    dir: PathBuf,
    env_override: Vec<(String, String)>,
    env_suggest: Vec<(String, String)>,
    filter: MatrixFilter,
    task_stack: Vec<String>,
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("fail_fast", &self.fail_fast)
            .field("worker_budget", &self.worker_budget)
            .field("label", &self.label)
            .field("dir", &self.dir)
            .field("env_override", &self.env_override)
            .field("env_suggest", &self.env_suggest)
            .field("filter", &self.filter)
            .field("task_stack", &self.task_stack)
            .finish_non_exhaustive()
    }
}

impl RunContext {
    pub fn new(config: Arc<Config>, registry: Arc<Registry>) -> Self {
        let fail_fast = config.fail_fast;
        let worker_budget = config.workers.unwrap_or(0);
        let env_suggest = config
            .env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            config,
            registry,
            launcher: Arc::new(ProcessLauncher),
            events: None,
            cancel: CancellationToken::new(),
            fail_fast,
            worker_budget,
            label: String::new(),
            dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_override: Vec::new(),
            env_suggest,
            filter: MatrixFilter::default(),
            task_stack: Vec::new(),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_events(mut self, events: ProgressSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_filter(mut self, filter: MatrixFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_budget = workers;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.dir = dir;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn launcher(&self) -> Arc<dyn Launcher> {
        self.launcher.clone()
    }

    pub fn events(&self) -> Option<ProgressSender> {
        self.events.clone()
    }

    pub fn emit(&self, event: RunEvent) {
        self.events.send_event(event);
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn filter(&self) -> &MatrixFilter {
        &self.filter
    }

    /// Derive a child context with an extended output label
    pub fn scoped(&self, suffix: &str) -> Self {
        let mut child = self.clone();
        child.label = if self.label.is_empty() {
            suffix.to_string()
        } else {
            format!("{}/{}", self.label, suffix)
        };
        child
    }

    /// Cancel the whole invocation tree
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for cancellation (for use in `select!`)
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Claim workers for `requested` entries against the global budget.
    ///
    /// A budget of 0 means unlimited; the claim is never below 1.
    pub fn claim_workers(&self, requested: usize) -> usize {
        let requested = requested.max(1);
        if self.worker_budget == 0 {
            requested
        } else {
            requested.min(self.worker_budget)
        }
    }

    /// Accumulate environment; overriding entries win over ambient env,
    /// suggested ones apply only when nothing else sets the name.
    pub fn add_env(&mut self, overriding: bool, pairs: impl IntoIterator<Item = (String, String)>) {
        if overriding {
            self.env_override.extend(pairs);
        } else {
            self.env_suggest.extend(pairs);
        }
    }

    pub fn env_override(&self) -> &[(String, String)] {
        &self.env_override
    }

    pub fn env_suggest(&self) -> &[(String, String)] {
        &self.env_suggest
    }

    /// Resolve a named shell (context default when `None`)
    pub fn shell(&self, name: Option<&str>) -> ConfigResult<ShellSpec> {
        resolve_shell(&self.config, name)
    }

    /// Push a task onto the recursion guard, failing on a cycle
    pub fn entered(&self, tool: &str, task: &str) -> ConfigResult<Self> {
        let key = format!("{}:{}", tool, task);
        if self.task_stack.contains(&key) {
            let mut chain = self.task_stack.clone();
            chain.push(key);
            return Err(ConfigError::CircularTaskReference(chain.join(" -> ")));
        }
        let mut child = self.scoped(&key);
        child.task_stack.push(key);
        Ok(child)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn context() -> RunContext {
        RunContext::new(Arc::new(Config::default()), Arc::new(Registry::builtin()))
    }

    #[test]
    fn test_claim_workers_unlimited_by_default() {
        let ctx = context();
        assert_eq!(ctx.claim_workers(7), 7);
        assert_eq!(ctx.claim_workers(0), 1);
    }

    #[test]
    fn test_claim_workers_bounded() {
        let ctx = context().with_workers(2);
        assert_eq!(ctx.claim_workers(7), 2);
        assert_eq!(ctx.claim_workers(1), 1);
    }

    #[test]
    fn test_scoped_labels_compose() {
        let ctx = context();
        let child = ctx.scoped("go:build").scoped("before-matrix");
        assert_eq!(child.label(), "go:build/before-matrix");
        assert_eq!(ctx.label(), "");
    }

    #[test]
    fn test_cancellation_is_shared_with_children() {
        let ctx = context();
        let child = ctx.scoped("child");
        child.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_recursion_guard() {
        let ctx = context();
        let inner = ctx.entered("go", "build").unwrap();
        let err = inner.entered("go", "build").unwrap_err();
        assert!(matches!(err, ConfigError::CircularTaskReference(_)));

        // A sibling entry is fine.
        assert!(inner.entered("go", "test").is_ok());
    }

    #[test]
    fn test_env_layering_accumulates() {
        let mut ctx = context();
        ctx.add_env(true, vec![("A".to_string(), "1".to_string())]);
        ctx.add_env(false, vec![("B".to_string(), "2".to_string())]);
        assert_eq!(ctx.env_override().len(), 1);
        assert!(ctx.env_suggest().iter().any(|(k, _)| k == "B"));
    }
}
