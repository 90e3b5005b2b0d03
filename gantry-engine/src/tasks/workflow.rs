// Workflow Task Kind
// A task whose body is an ordered, branching action list instead of steps.
// The whole body runs once per matrix entry through the action chain.

use crate::config::models::HookStage;
use crate::error::Result;
use crate::execution::action::ActionChain;
use crate::execution::context::RunContext;
use crate::execution::hooks::HookStager;
use crate::execution::matrix::{MatrixEntry, MatrixExpander};
use crate::execution::spec::ExecSpec;
use crate::registry::TaskBlueprint;
use crate::tasks::TaskKind;
use std::sync::Arc;

pub struct WorkflowTask {
    blueprint: TaskBlueprint,
    stager: HookStager,
}

impl WorkflowTask {
    pub fn build(blueprint: TaskBlueprint) -> crate::error::ConfigResult<Arc<dyn TaskKind>> {
        // Surface malformed actions at build time, not mid-run.
        ActionChain::new(
            &blueprint.tool_key,
            &blueprint.task.actions,
            Default::default(),
        )?;
        let stager = HookStager::new(&blueprint.tool_key, blueprint.task.hooks.clone());
        Ok(Arc::new(Self { blueprint, stager }))
    }
}

impl TaskKind for WorkflowTask {
    fn kind(&self) -> &'static str {
        "workflow"
    }

    fn matrix_specs(&self, ctx: &RunContext) -> Result<Vec<MatrixEntry>> {
        let matrix = self.blueprint.task.matrix.clone().unwrap_or_default();
        Ok(MatrixExpander::expand(&matrix, ctx.filter()))
    }

    fn exec_specs(&self, ctx: &RunContext, _entry: &MatrixEntry) -> Result<Vec<ExecSpec>> {
        let chain = ActionChain::new(
            &self.blueprint.tool_key,
            &self.blueprint.task.actions,
            ctx.filter().clone(),
        )?;
        Ok(chain.specs())
    }

    fn hook_specs(&self, ctx: &RunContext, stage: HookStage) -> Result<Vec<ExecSpec>> {
        Ok(self.stager.specs(ctx, stage)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::Config;
    use crate::registry::Registry;

    #[test]
    fn test_workflow_body_is_a_chain() {
        let yaml = r#"
tools:
  release:
    tasks:
      ship:
        kind: workflow
        actions:
          - name: build
            run: make build
          - name: upload
            run: make upload
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let tool = config.tools.get("release").unwrap().clone();
        let task = tool.tasks.get("ship").unwrap().clone();
        let blueprint = TaskBlueprint {
            tool_key: "release".to_string(),
            tool,
            task_name: "ship".to_string(),
            task,
        };

        let kind = WorkflowTask::build(blueprint).unwrap();
        let ctx = RunContext::new(Arc::new(config), Arc::new(Registry::builtin()));

        let entries = kind.matrix_specs(&ctx).unwrap();
        let specs = kind.exec_specs(&ctx, &entries[0]).unwrap();
        // First link: run spec plus advance spec.
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "build");
    }

    #[test]
    fn test_malformed_actions_fail_at_build() {
        let yaml = r#"
tools:
  release:
    tasks:
      ship:
        kind: workflow
        actions:
          - name: bad
            run: make build
            script: also-this
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let tool = config.tools.get("release").unwrap().clone();
        let task = tool.tasks.get("ship").unwrap().clone();
        let blueprint = TaskBlueprint {
            tool_key: "release".to_string(),
            tool,
            task_name: "ship".to_string(),
            task,
        };

        assert!(WorkflowTask::build(blueprint).is_err());
    }
}
