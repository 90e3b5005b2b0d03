// Configuration models
// Typed representation of a gantry.yml document: tools own tasks, tasks own
// steps or actions, matrices, and lifecycle hooks.

use serde::de::Error as DeError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;

/// Top-level configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    /// Project name (optional, used for display only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Environment suggested for every command (loses to the ambient env)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Worker budget for concurrent matrix entries (0 or absent = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Whether the first entry failure cancels not-yet-started entries
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,

    /// Named shells usable by steps and actions, in addition to the built-ins
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub shells: HashMap<String, ShellConfig>,

    /// Tools defined in the configuration
    #[serde(default)]
    pub tools: HashMap<String, ToolConfig>,
}

fn default_fail_fast() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: None,
            env: HashMap::new(),
            workers: None,
            fail_fast: default_fail_fast(),
            shells: HashMap::new(),
            tools: HashMap::new(),
        }
    }
}

/// A named shell: program plus the arguments that precede the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

/// A tool: an executable context that owns tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ToolConfig {
    /// Tool kind for registry dispatch
    #[serde(default = "default_tool_kind")]
    pub kind: String,

    /// Environment applied to every command of this tool (wins over ambient)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Default shell for this tool's commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Tasks defined for this tool
    #[serde(default)]
    pub tasks: HashMap<String, TaskConfig>,
}

fn default_tool_kind() -> String {
    "system".to_string()
}

/// A task: a parameterized recipe expanded over a matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TaskConfig {
    /// Task kind for registry dispatch ("command" or "workflow")
    #[serde(default = "default_task_kind")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Matrix configuration; absent means a single host-derived entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix: Option<MatrixConfig>,

    /// Lifecycle hooks around the task and its matrix entries
    #[serde(default)]
    pub hooks: HookConfig,

    /// Steps for `command` tasks
    #[serde(default, deserialize_with = "one_or_many")]
    pub steps: Vec<StepConfig>,

    /// Actions for `workflow` tasks
    #[serde(default, deserialize_with = "one_or_many")]
    pub actions: Vec<ActionConfig>,

    /// Environment applied to this task's commands (wins over tool env)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

fn default_task_kind() -> String {
    "command".to_string()
}

/// One of the 8 lifecycle hook stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookStage {
    Before,
    BeforeMatrix,
    AfterMatrixSuccess,
    AfterMatrixFailure,
    AfterMatrix,
    AfterSuccess,
    AfterFailure,
    After,
}

impl HookStage {
    /// All stages, in lifecycle order
    pub const ALL: [HookStage; 8] = [
        HookStage::Before,
        HookStage::BeforeMatrix,
        HookStage::AfterMatrixSuccess,
        HookStage::AfterMatrixFailure,
        HookStage::AfterMatrix,
        HookStage::AfterSuccess,
        HookStage::AfterFailure,
        HookStage::After,
    ];

    /// The configuration key / display name of the stage
    pub fn name(&self) -> &'static str {
        match self {
            HookStage::Before => "before",
            HookStage::BeforeMatrix => "before-matrix",
            HookStage::AfterMatrixSuccess => "after-matrix-success",
            HookStage::AfterMatrixFailure => "after-matrix-failure",
            HookStage::AfterMatrix => "after-matrix",
            HookStage::AfterSuccess => "after-success",
            HookStage::AfterFailure => "after-failure",
            HookStage::After => "after",
        }
    }

    /// Whether actions at this stage may reference matrix-scoped values
    pub fn is_matrix_scoped(&self) -> bool {
        matches!(
            self,
            HookStage::BeforeMatrix
                | HookStage::AfterMatrixSuccess
                | HookStage::AfterMatrixFailure
                | HookStage::AfterMatrix
        )
    }
}

impl std::fmt::Display for HookStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Action lists for each lifecycle stage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct HookConfig {
    #[serde(default, deserialize_with = "one_or_many")]
    pub before: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub before_matrix: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub after_matrix_success: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub after_matrix_failure: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub after_matrix: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub after_success: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub after_failure: Vec<ActionConfig>,

    #[serde(default, deserialize_with = "one_or_many")]
    pub after: Vec<ActionConfig>,
}

impl HookConfig {
    /// The configured action list for a stage
    pub fn stage(&self, stage: HookStage) -> &[ActionConfig] {
        match stage {
            HookStage::Before => &self.before,
            HookStage::BeforeMatrix => &self.before_matrix,
            HookStage::AfterMatrixSuccess => &self.after_matrix_success,
            HookStage::AfterMatrixFailure => &self.after_matrix_failure,
            HookStage::AfterMatrix => &self.after_matrix,
            HookStage::AfterSuccess => &self.after_success,
            HookStage::AfterFailure => &self.after_failure,
            HookStage::After => &self.after,
        }
    }
}

/// A step: one command, possibly with capture and error policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepConfig {
    /// Bare command line
    Simple(String),

    /// Full step specification
    Detailed(StepDetail),
}

impl StepConfig {
    pub fn run(&self) -> &str {
        match self {
            StepConfig::Simple(run) => run,
            StepConfig::Detailed(detail) => &detail.run,
        }
    }

    pub fn detail(&self) -> StepDetail {
        match self {
            StepConfig::Simple(run) => StepDetail {
                run: run.clone(),
                ..StepDetail::default()
            },
            StepConfig::Detailed(detail) => detail.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StepDetail {
    /// The command line, executed through a shell
    pub run: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Working directory, relative to the invocation directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Environment for this step (wins over ambient)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Continue with the next step even if this one fails
    #[serde(default)]
    pub ignore_error: bool,

    /// Delay before the step starts, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,

    /// Kill the step if it runs longer than this, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Capture stdout under `${capture.<name>}` for later steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,

    #[serde(default = "default_true")]
    pub show_stdout: bool,

    #[serde(default = "default_true")]
    pub show_stderr: bool,

    /// Literal stdin content; absent means the step inherits stdin
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for StepDetail {
    fn default() -> Self {
        Self {
            run: String::new(),
            name: None,
            shell: None,
            dir: None,
            env: HashMap::new(),
            ignore_error: false,
            delay_ms: None,
            timeout_ms: None,
            capture: None,
            show_stdout: true,
            show_stderr: true,
            stdin: None,
        }
    }
}

/// An action: one link in a workflow or hook chain
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionConfig {
    /// Bare command line
    Simple(String),

    /// Full action specification
    Detailed(ActionDetail),
}

impl ActionConfig {
    pub fn detail(&self) -> ActionDetail {
        match self {
            ActionConfig::Simple(run) => ActionDetail {
                run: Some(run.clone()),
                ..ActionDetail::default()
            },
            ActionConfig::Detailed(detail) => detail.clone(),
        }
    }

    /// Display name: explicit name or a positional placeholder
    pub fn display_name(&self, index: usize) -> String {
        match self {
            ActionConfig::Simple(_) => format!("action[{}]", index),
            ActionConfig::Detailed(detail) => detail
                .name
                .clone()
                .unwrap_or_else(|| format!("action[{}]", index)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ActionDetail {
    /// Name, usable as a `next` jump target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Run another task: `"task"` (same tool) or `"tool:task"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Inline command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,

    /// Embedded shell script (multi-line)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    /// External shell script file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_file: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,

    /// Advance to the next action even if this one fails
    #[serde(default)]
    pub continue_on_error: bool,

    /// Jump target: the name of the action to run after this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,

    /// Disabled actions are skipped without running
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ActionDetail {
    fn default() -> Self {
        Self {
            name: None,
            task: None,
            run: None,
            script: None,
            script_file: None,
            env: HashMap::new(),
            dir: None,
            shell: None,
            continue_on_error: false,
            next: None,
            enabled: true,
        }
    }
}

/// What an action does: exactly one of the four forms
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    /// Run another task (`"task"` or `"tool:task"`)
    Task(String),
    /// Inline command line
    Run(String),
    /// Embedded shell script
    Script(String),
    /// External shell script file
    ScriptFile(String),
}

impl ActionDetail {
    /// Resolve which of the four action forms is configured.
    ///
    /// Exactly one of `task`, `run`, `script`, `script-file` must be set.
    pub fn action(&self) -> Result<ActionKind, crate::error::ConfigError> {
        let mut kinds = Vec::new();
        if let Some(task) = &self.task {
            kinds.push(ActionKind::Task(task.clone()));
        }
        if let Some(run) = &self.run {
            kinds.push(ActionKind::Run(run.clone()));
        }
        if let Some(script) = &self.script {
            kinds.push(ActionKind::Script(script.clone()));
        }
        if let Some(file) = &self.script_file {
            kinds.push(ActionKind::ScriptFile(file.clone()));
        }

        match kinds.len() {
            1 => Ok(kinds.remove(0)),
            _ => Err(crate::error::ConfigError::AmbiguousAction(
                self.name.clone().unwrap_or_else(|| "<unnamed>".to_string()),
            )),
        }
    }
}

/// Matrix configuration: dimensions plus include/exclude rules
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct MatrixConfig {
    /// Operating systems; defaults to the host OS when empty
    #[serde(default, deserialize_with = "one_or_many")]
    pub os: Vec<String>,

    /// Architectures; defaults to the host architecture when empty
    #[serde(default, deserialize_with = "one_or_many")]
    pub arch: Vec<String>,

    /// Custom dimensions, in declaration order
    #[serde(default, skip_serializing_if = "DimensionMap::is_empty")]
    pub dimensions: DimensionMap,

    /// Combinations appended after product and exclusion
    #[serde(default, deserialize_with = "one_or_many")]
    pub include: Vec<DimensionMap>,

    /// Combinations removed from the product
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<DimensionMap>,
}

/// An ordered `dimension -> values` mapping
///
/// Declaration order matters: the cartesian product is row-major over it.
/// A plain `HashMap` would lose the order, so this deserializes straight
/// from the YAML mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DimensionMap(pub Vec<(String, Vec<String>)>);

impl DimensionMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Vec<String>)> {
        self.0.iter()
    }
}

impl Serialize for DimensionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, values) in &self.0 {
            map.serialize_entry(key, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DimensionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_yaml::Value::deserialize(deserializer)?;
        let mapping = match value {
            serde_yaml::Value::Null => return Ok(DimensionMap::default()),
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => return Err(D::Error::custom("expected a mapping of dimension values")),
        };

        let mut dims = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let name = key
                .as_str()
                .ok_or_else(|| D::Error::custom("dimension names must be strings"))?
                .to_string();
            dims.push((name, scalar_list::<D>(value)?));
        }
        Ok(DimensionMap(dims))
    }
}

/// Accept a scalar or a sequence of scalars as a list of strings
fn scalar_list<'de, D: Deserializer<'de>>(
    value: serde_yaml::Value,
) -> Result<Vec<String>, D::Error> {
    match value {
        serde_yaml::Value::Sequence(seq) => seq.into_iter().map(scalar_string::<D>).collect(),
        other => Ok(vec![scalar_string::<D>(other)?]),
    }
}

fn scalar_string<'de, D: Deserializer<'de>>(value: serde_yaml::Value) -> Result<String, D::Error> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        _ => Err(D::Error::custom("dimension values must be scalars")),
    }
}

/// Deserializer accepting a single value or a sequence of values
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    match value {
        serde_yaml::Value::Null => Ok(Vec::new()),
        serde_yaml::Value::Sequence(seq) => seq
            .into_iter()
            .map(|item| T::deserialize(item).map_err(D::Error::custom))
            .collect(),
        other => Ok(vec![T::deserialize(other).map_err(D::Error::custom)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let yaml = r#"
tools:
  go:
    tasks:
      build:
        steps: go build ./...
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let tool = config.tools.get("go").unwrap();
        assert_eq!(tool.kind, "system");

        let task = tool.tasks.get("build").unwrap();
        assert_eq!(task.kind, "command");
        assert_eq!(task.steps.len(), 1);
        assert_eq!(task.steps[0].run(), "go build ./...");
    }

    #[test]
    fn test_deserialize_matrix_preserves_dimension_order() {
        let yaml = r#"
os: [linux, windows]
arch: amd64
dimensions:
  compiler: [gcc, clang]
  mode: [debug, release]
exclude:
  - os: windows
    compiler: clang
"#;
        let matrix: MatrixConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(matrix.os, vec!["linux", "windows"]);
        assert_eq!(matrix.arch, vec!["amd64"]);

        let names: Vec<_> = matrix.dimensions.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["compiler", "mode"]);

        assert_eq!(matrix.exclude.len(), 1);
        assert_eq!(matrix.exclude[0].0[0].0, "os");
        assert_eq!(matrix.exclude[0].0[0].1, vec!["windows"]);
    }

    #[test]
    fn test_deserialize_hooks_one_or_many() {
        let yaml = r#"
kind: command
steps: make
hooks:
  before: echo starting
  after:
    - run: echo done
    - name: cleanup
      run: rm -rf tmp
"#;
        let task: TaskConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.hooks.before.len(), 1);
        assert_eq!(task.hooks.after.len(), 2);
        assert_eq!(
            task.hooks.stage(HookStage::After)[1].display_name(1),
            "cleanup"
        );
        assert!(task.hooks.stage(HookStage::BeforeMatrix).is_empty());
    }

    #[test]
    fn test_deserialize_workflow_actions() {
        let yaml = r#"
kind: workflow
actions:
  - name: build
    task: build
  - name: sign
    run: sign-artifact out/app
    continue-on-error: true
    next: publish
  - name: publish
    script: |
      set -e
      upload out/app
"#;
        let task: TaskConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(task.actions.len(), 3);

        let sign = task.actions[1].detail();
        assert!(sign.continue_on_error);
        assert_eq!(sign.next.as_deref(), Some("publish"));
        assert!(task.actions[2].detail().script.is_some());
    }

    #[test]
    fn test_deserialize_step_detail() {
        let yaml = r#"
run: git describe --tags
capture: version
ignore-error: true
delay-ms: 250
show-stdout: false
"#;
        let step: StepDetail = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.capture.as_deref(), Some("version"));
        assert!(step.ignore_error);
        assert_eq!(step.delay_ms, Some(250));
        assert!(!step.show_stdout);
        assert!(step.show_stderr);
    }

    #[test]
    fn test_hook_stage_names_round_trip() {
        for stage in HookStage::ALL {
            assert!(!stage.name().is_empty());
        }
        assert!(HookStage::BeforeMatrix.is_matrix_scoped());
        assert!(!HookStage::After.is_matrix_scoped());
        assert_eq!(HookStage::AfterMatrixFailure.name(), "after-matrix-failure");
    }
}
