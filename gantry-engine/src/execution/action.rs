// Action Chain
// Resolves an ordered, branching action list into paired run/advance exec
// specs. The name table is snapshotted once before anything executes, so
// later re-resolution can never break an established jump target.

use crate::config::models::{ActionConfig, ActionKind};
use crate::error::{ConfigError, ConfigResult};
use crate::execution::matrix::MatrixFilter;
use crate::execution::spec::{Computed, ExecSpec, TaskExecRequest};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// A fully resolved action, immutable once built
#[derive(Debug)]
struct ResolvedAction {
    name: String,
    kind: ActionKind,
    env: Vec<(String, String)>,
    dir: Option<String>,
    shell: Option<String>,
    continue_on_error: bool,
    next: Option<String>,
    enabled: bool,
}

/// Continuation builder over an action list
#[derive(Debug, Clone)]
pub struct ActionChain {
    tool: String,
    actions: Arc<Vec<ResolvedAction>>,
    index_by_name: Arc<HashMap<String, usize>>,
    filter: MatrixFilter,
}

impl ActionChain {
    /// Build a chain, validating action forms and jump targets up front.
    ///
    /// `filter` is inherited by task-reference actions so a nested task
    /// expands against the same external matrix filter.
    pub fn new(
        tool: impl Into<String>,
        actions: &[ActionConfig],
        filter: MatrixFilter,
    ) -> ConfigResult<Self> {
        let mut index_by_name = HashMap::new();
        for (index, action) in actions.iter().enumerate() {
            if let ActionConfig::Detailed(detail) = action {
                if let Some(name) = &detail.name {
                    index_by_name.insert(name.clone(), index);
                }
            }
        }

        let resolved: Vec<ResolvedAction> = actions
            .iter()
            .enumerate()
            .map(|(index, action)| {
                let detail = action.detail();
                Ok(ResolvedAction {
                    name: action.display_name(index),
                    kind: detail.action()?,
                    env: detail.env.into_iter().collect(),
                    dir: detail.dir,
                    shell: detail.shell,
                    continue_on_error: detail.continue_on_error,
                    next: detail.next,
                    enabled: detail.enabled,
                })
            })
            .collect::<ConfigResult<_>>()?;

        for action in &resolved {
            if let Some(target) = &action.next {
                if !index_by_name.contains_key(target) {
                    return Err(ConfigError::UnknownJumpTarget {
                        action: action.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self {
            tool: tool.into(),
            actions: Arc::new(resolved),
            index_by_name: Arc::new(index_by_name),
            filter,
        })
    }

    /// The continuation for the whole list, starting at the first action
    pub fn specs(&self) -> Vec<ExecSpec> {
        self.link(0)
    }

    /// Specs for the link at `index`: a run spec and an advance spec.
    ///
    /// Disabled actions advance directly, emitting nothing.
    fn link(&self, mut index: usize) -> Vec<ExecSpec> {
        while index < self.actions.len() && !self.actions[index].enabled {
            index += 1;
        }
        if index >= self.actions.len() {
            return Vec::new();
        }
        vec![self.run_spec(index), self.advance_spec(index)]
    }

    fn run_spec(&self, index: usize) -> ExecSpec {
        let action = &self.actions[index];
        let computed = self.resolve_work(action);
        ExecSpec::compute(
            action.name.clone(),
            Arc::new(move |_store| Ok(computed.to_computed())),
        )
        .with_ignore_error(action.continue_on_error)
    }

    /// What running this action means: a nested task request for references,
    /// a single command spec for the three command-like forms.
    fn resolve_work(&self, action: &ResolvedAction) -> ComputedWork {
        match &action.kind {
            ActionKind::Task(reference) => {
                let (tool, task) = match reference.split_once(':') {
                    Some((tool, task)) => (tool.to_string(), task.to_string()),
                    None => (self.tool.clone(), reference.clone()),
                };
                ComputedWork::Task(
                    TaskExecRequest::new(tool, task).with_filter(self.filter.clone()),
                )
            }
            ActionKind::Run(line) => ComputedWork::Spec(Box::new(self.command_spec(
                action,
                ExecSpec::shell_command(action.name.clone(), line.clone()),
            ))),
            ActionKind::Script(script) => ComputedWork::Spec(Box::new(self.command_spec(
                action,
                ExecSpec::shell_command(action.name.clone(), script.clone()),
            ))),
            ActionKind::ScriptFile(path) => ComputedWork::Spec(Box::new(self.command_spec(
                action,
                ExecSpec::shell_file(action.name.clone(), path.clone()),
            ))),
        }
    }

    fn command_spec(&self, action: &ResolvedAction, spec: ExecSpec) -> ExecSpec {
        spec.with_env_override(action.env.clone())
            .with_dir(action.dir.as_ref().map(PathBuf::from))
            .with_shell(action.shell.clone())
    }

    fn advance_spec(&self, index: usize) -> ExecSpec {
        let chain = self.clone();
        let name = format!("{}:next", self.actions[index].name);
        ExecSpec::compute(
            name,
            Arc::new(move |_store| {
                let action = &chain.actions[index];
                let next_index = match &action.next {
                    Some(target) => {
                        *chain.index_by_name.get(target).ok_or_else(|| {
                            ConfigError::UnknownJumpTarget {
                                action: action.name.clone(),
                                target: target.clone(),
                            }
                        })?
                    }
                    None => index + 1,
                };
                Ok(Computed::Specs(chain.link(next_index)))
            }),
        )
    }
}

/// Work resolved once at chain-build time, cloned into each compute call
#[derive(Clone)]
enum ComputedWork {
    Task(TaskExecRequest),
    Spec(Box<ExecSpec>),
}

impl ComputedWork {
    fn to_computed(&self) -> Computed {
        match self {
            ComputedWork::Task(request) => Computed::Task(request.clone()),
            ComputedWork::Spec(spec) => Computed::Specs(vec![(**spec).clone()]),
        }
    }
}
