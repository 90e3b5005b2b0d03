// Command Task Kind
// The default kind: an ordered list of shell steps from configuration.

use crate::config::models::{HookStage, MatrixConfig};
use crate::error::Result;
use crate::execution::context::RunContext;
use crate::execution::hooks::HookStager;
use crate::execution::matrix::{MatrixEntry, MatrixExpander};
use crate::execution::replace::capture_token;
use crate::execution::spec::{CaptureSpec, ExecSpec, StdinSpec};
use crate::registry::TaskBlueprint;
use crate::tasks::TaskKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct CommandTask {
    blueprint: TaskBlueprint,
    stager: HookStager,
}

impl CommandTask {
    pub fn build(blueprint: TaskBlueprint) -> crate::error::ConfigResult<Arc<dyn TaskKind>> {
        let stager = HookStager::new(&blueprint.tool_key, blueprint.task.hooks.clone());
        Ok(Arc::new(Self { blueprint, stager }))
    }

    fn matrix(&self) -> MatrixConfig {
        self.blueprint.task.matrix.clone().unwrap_or_default()
    }
}

impl TaskKind for CommandTask {
    fn kind(&self) -> &'static str {
        "command"
    }

    fn matrix_specs(&self, ctx: &RunContext) -> Result<Vec<MatrixEntry>> {
        Ok(MatrixExpander::expand(&self.matrix(), ctx.filter()))
    }

    fn exec_specs(&self, _ctx: &RunContext, _entry: &MatrixEntry) -> Result<Vec<ExecSpec>> {
        let tool_shell = self.blueprint.tool.shell.clone();
        let specs = self
            .blueprint
            .task
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let detail = step.detail();
                let name = detail
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("step[{}]", index));
                ExecSpec::shell_command(name, detail.run.clone())
                    .with_env_override(detail.env.clone().into_iter().collect())
                    .with_dir(detail.dir.as_ref().map(PathBuf::from))
                    .with_shell(detail.shell.clone().or_else(|| tool_shell.clone()))
                    .with_ignore_error(detail.ignore_error)
                    .with_delay(detail.delay_ms.map(Duration::from_millis))
                    .with_timeout(detail.timeout_ms.map(Duration::from_millis))
                    .with_capture(
                        detail
                            .capture
                            .as_ref()
                            .map(|name| CaptureSpec::new(capture_token(name))),
                    )
                    .with_show_output(detail.show_stdout, detail.show_stderr)
                    .with_stdin(match detail.stdin {
                        Some(bytes) => StdinSpec::Bytes(bytes.into_bytes()),
                        None => StdinSpec::Inherit,
                    })
            })
            .collect();
        Ok(specs)
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

    fn build(yaml: &str) -> (RunContext, Arc<dyn TaskKind>) {
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let tool = config.tools.get("go").unwrap().clone();
        let task = tool.tasks.get("build").unwrap().clone();
        let blueprint = TaskBlueprint {
            tool_key: "go".to_string(),
            tool,
            task_name: "build".to_string(),
            task,
        };
        let ctx = RunContext::new(Arc::new(config), Arc::new(Registry::builtin()));
        (ctx, CommandTask::build(blueprint).unwrap())
    }

    #[test]
    fn test_steps_become_shell_specs() {
        let (ctx, kind) = build(
            r#"
tools:
  go:
    shell: bash
    tasks:
      build:
        steps:
          - run: go vet ./...
          - name: compile
            run: go build ./...
            capture: out
            ignore-error: true
"#,
        );

        let entries = kind.matrix_specs(&ctx).unwrap();
        assert_eq!(entries.len(), 1);

        let specs = kind.exec_specs(&ctx, &entries[0]).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].name, "step[0]");
        assert_eq!(specs[0].shell.as_deref(), Some("bash"));
        assert_eq!(specs[1].name, "compile");
        assert!(specs[1].ignore_error);
        assert_eq!(
            specs[1].capture.as_ref().unwrap().token,
            capture_token("out")
        );
    }

    #[test]
    fn test_matrix_dimensions_expand() {
        let (ctx, kind) = build(
            r#"
tools:
  go:
    tasks:
      build:
        matrix:
          os: [linux, darwin]
          arch: amd64
        steps: go build ./...
"#,
        );

        let entries = kind.matrix_specs(&ctx).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get("os"), Some("linux"));
        assert_eq!(entries[1].get("os"), Some("darwin"));
    }
}
