// Kind Registry
// Explicit (tool kind, task kind) -> constructor dispatch, populated at
// startup. Task objects are built from configuration, never introspected.

use crate::config::models::{Config, TaskConfig, ToolConfig};
use crate::error::{ConfigError, ConfigResult};
use crate::tasks::{CommandTask, TaskKind, WorkflowTask};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a constructor needs to build a task kind
#[derive(Debug, Clone)]
pub struct TaskBlueprint {
    pub tool_key: String,
    pub tool: ToolConfig,
    pub task_name: String,
    pub task: TaskConfig,
}

/// Constructor for one registered kind pair
pub type Constructor = fn(TaskBlueprint) -> ConfigResult<Arc<dyn TaskKind>>;

/// Registry of task-kind constructors
#[derive(Default)]
pub struct Registry {
    constructors: HashMap<(String, String), Constructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in kinds registered
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register("system", "command", CommandTask::build);
        registry.register("system", "workflow", WorkflowTask::build);
        registry
    }

    pub fn register(&mut self, tool_kind: &str, task_kind: &str, constructor: Constructor) {
        self.constructors
            .insert((tool_kind.to_string(), task_kind.to_string()), constructor);
    }

    /// Build the task kind for a blueprint
    pub fn build(&self, blueprint: TaskBlueprint) -> ConfigResult<Arc<dyn TaskKind>> {
        let key = (blueprint.tool.kind.clone(), blueprint.task.kind.clone());
        let constructor = self
            .constructors
            .get(&key)
            .ok_or_else(|| ConfigError::UnknownKind {
                tool_kind: key.0.clone(),
                task_kind: key.1.clone(),
            })?;
        constructor(blueprint)
    }

    /// Verify every configured kind pair resolves to a constructor
    pub fn check(&self, config: &Config) -> ConfigResult<()> {
        for tool in config.tools.values() {
            for task in tool.tasks.values() {
                let key = (tool.kind.clone(), task.kind.clone());
                if !self.constructors.contains_key(&key) {
                    return Err(ConfigError::UnknownKind {
                        tool_kind: key.0,
                        task_kind: key.1,
                    });
                }
            }
        }
        Ok(())
    }
}
