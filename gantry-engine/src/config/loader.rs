// Configuration loading and validation
// File discovery walks the working directory upward, then falls back to the
// user config directory. Parse errors carry line/column and a fix suggestion.

use crate::config::models::{
    ActionConfig, ActionKind, Config, HookStage, TaskConfig, ToolConfig,
};
use crate::error::{ConfigError, ConfigResult, ParseError};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file names searched in each directory
const CONFIG_FILE_NAMES: &[&str] = &["gantry.yml", "gantry.yaml"];

/// Find the configuration file starting from a directory, walking upward.
///
/// Falls back to `<user config dir>/gantry/gantry.yml` before giving up.
pub fn discover(start_dir: &Path) -> ConfigResult<PathBuf> {
    let mut current = start_dir.to_path_buf();
    let mut searched = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let candidate = current.join(file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate.display().to_string());
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        for file_name in CONFIG_FILE_NAMES {
            let candidate = config_dir.join("gantry").join(file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
            searched.push(candidate.display().to_string());
        }
    }

    Err(ConfigError::NotFound(searched.join(", ")))
}

/// Load and validate a configuration file
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("failed to read {}: {}", path.display(), e)))?;
    load_str(&contents)
}

/// Parse and validate configuration from a YAML string
pub fn load_str(yaml: &str) -> ConfigResult<Config> {
    let config: Config =
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(parse_error(&e, yaml)))?;
    validate(&config)?;
    Ok(config)
}

/// Build a located parse error from a serde_yaml error
fn parse_error(err: &serde_yaml::Error, source: &str) -> ParseError {
    let (line, column) = err
        .location()
        .map(|loc| (loc.line(), loc.column()))
        .unwrap_or((1, 1));

    let mut parsed = ParseError::new(err.to_string(), line, column);
    if let Some(suggestion) = suggest_fix(err, source, line) {
        parsed = parsed.with_suggestion(suggestion);
    }
    parsed
}

/// Suggest fixes for common configuration mistakes
fn suggest_fix(err: &serde_yaml::Error, source: &str, line: usize) -> Option<String> {
    let msg = err.to_string();
    let error_line = source.lines().nth(line.saturating_sub(1)).unwrap_or("");

    if msg.contains("expected") && error_line.starts_with('\t') {
        return Some("YAML uses spaces for indentation, not tabs".to_string());
    }

    let typo_suggestions = [
        ("stpes", "steps"),
        ("continueonerror", "continue-on-error"),
        ("continue_on_error", "continue-on-error"),
        ("ignore_error", "ignore-error"),
        ("script_file", "script-file"),
        ("failfast", "fail-fast"),
    ];
    let lower = error_line.to_lowercase();
    for (typo, correct) in typo_suggestions {
        if lower.contains(typo) {
            return Some(format!("did you mean '{}'?", correct));
        }
    }

    None
}

/// Validate a parsed configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    for (tool_name, tool) in &config.tools {
        for (task_name, task) in &tool.tasks {
            validate_task(config, tool_name, tool, task_name, task)?;
        }
    }

    detect_task_cycles(config)?;
    Ok(())
}

fn validate_task(
    config: &Config,
    tool_name: &str,
    tool: &ToolConfig,
    task_name: &str,
    task: &TaskConfig,
) -> ConfigResult<()> {
    match task.kind.as_str() {
        "command" if !task.actions.is_empty() => {
            return Err(ConfigError::Invalid(format!(
                "task '{}:{}' is a command task and cannot declare actions",
                tool_name, task_name
            )));
        }
        "workflow" if !task.steps.is_empty() => {
            return Err(ConfigError::Invalid(format!(
                "task '{}:{}' is a workflow task and cannot declare steps",
                tool_name, task_name
            )));
        }
        _ => {}
    }

    for step in &task.steps {
        let detail = step.detail();
        if let Some(shell) = &detail.shell {
            validate_shell(config, shell)?;
        }
    }
    if let Some(shell) = &tool.shell {
        validate_shell(config, shell)?;
    }

    validate_actions(config, tool_name, &task.actions)?;
    for stage in HookStage::ALL {
        let actions = task.hooks.stage(stage);
        validate_actions(config, tool_name, actions)?;
        if !stage.is_matrix_scoped() {
            validate_matrix_scope(stage, actions)?;
        }
    }

    Ok(())
}

fn validate_shell(config: &Config, name: &str) -> ConfigResult<()> {
    if crate::runners::shell::is_known_shell(config, name) {
        Ok(())
    } else {
        Err(ConfigError::UnknownShell(name.to_string()))
    }
}

/// Validate an action list: exactly one form per action, resolvable jump
/// targets, resolvable task references.
fn validate_actions(
    config: &Config,
    tool_name: &str,
    actions: &[ActionConfig],
) -> ConfigResult<()> {
    let names: HashSet<&str> = actions
        .iter()
        .filter_map(|a| match a {
            ActionConfig::Detailed(detail) => detail.name.as_deref(),
            ActionConfig::Simple(_) => None,
        })
        .collect();

    for (index, action) in actions.iter().enumerate() {
        let detail = action.detail();
        let kind = detail.action()?;

        if let Some(target) = &detail.next {
            if !names.contains(target.as_str()) {
                return Err(ConfigError::UnknownJumpTarget {
                    action: action.display_name(index),
                    target: target.clone(),
                });
            }
        }

        if let Some(shell) = &detail.shell {
            validate_shell(config, shell)?;
        }

        if let ActionKind::Task(reference) = kind {
            resolve_task_ref(config, tool_name, &reference)?;
        }
    }

    Ok(())
}

/// Resolve a `"task"` or `"tool:task"` reference to `(tool, task)` keys
pub fn resolve_task_ref<'a>(
    config: &'a Config,
    current_tool: &str,
    reference: &str,
) -> ConfigResult<(String, String, &'a TaskConfig)> {
    let (tool_name, task_name) = match reference.split_once(':') {
        Some((tool, task)) => (tool.to_string(), task.to_string()),
        None => (current_tool.to_string(), reference.to_string()),
    };

    let tool = config
        .tools
        .get(&tool_name)
        .ok_or_else(|| ConfigError::UnknownTool(tool_name.clone()))?;
    let task = tool
        .tasks
        .get(&task_name)
        .ok_or_else(|| ConfigError::UnknownTask {
            tool: tool_name.clone(),
            task: task_name.clone(),
        })?;

    Ok((tool_name, task_name, task))
}

/// Task-scoped hook stages must not reference matrix placeholders
fn validate_matrix_scope(stage: HookStage, actions: &[ActionConfig]) -> ConfigResult<()> {
    for action in actions {
        let detail = action.detail();
        let mut texts: Vec<&str> = Vec::new();
        if let Some(run) = &detail.run {
            texts.push(run.as_str());
        }
        if let Some(script) = &detail.script {
            texts.push(script.as_str());
        }
        if let Some(dir) = &detail.dir {
            texts.push(dir.as_str());
        }
        for value in detail.env.values() {
            texts.push(value.as_str());
        }

        for text in texts {
            if let Some(start) = text.find("${matrix.") {
                let end = text[start..].find('}').map(|i| start + i + 1);
                let placeholder = end
                    .map(|end| text[start..end].to_string())
                    .unwrap_or_else(|| "${matrix.".to_string());
                return Err(ConfigError::MatrixScope {
                    stage: stage.name(),
                    placeholder,
                });
            }
        }
    }
    Ok(())
}

/// Detect circular task references through workflow actions and hooks
fn detect_task_cycles(config: &Config) -> ConfigResult<()> {
    for (tool_name, tool) in &config.tools {
        for task_name in tool.tasks.keys() {
            let mut visited = HashSet::new();
            let mut stack = Vec::new();
            check_cycle(config, tool_name, task_name, &mut visited, &mut stack)?;
        }
    }
    Ok(())
}

fn check_cycle(
    config: &Config,
    tool_name: &str,
    task_name: &str,
    visited: &mut HashSet<String>,
    stack: &mut Vec<String>,
) -> ConfigResult<()> {
    let key = format!("{}:{}", tool_name, task_name);
    if stack.contains(&key) {
        stack.push(key);
        return Err(ConfigError::CircularTaskReference(stack.join(" -> ")));
    }
    if visited.contains(&key) {
        return Ok(());
    }

    let tool = match config.tools.get(tool_name) {
        Some(tool) => tool,
        None => return Ok(()),
    };
    let task = match tool.tasks.get(task_name) {
        Some(task) => task,
        None => return Ok(()),
    };

    stack.push(key.clone());

    let mut referenced = Vec::new();
    collect_task_refs(&task.actions, &mut referenced);
    for stage in HookStage::ALL {
        collect_task_refs(task.hooks.stage(stage), &mut referenced);
    }

    for reference in referenced {
        let (next_tool, next_task, _) = resolve_task_ref(config, tool_name, &reference)?;
        check_cycle(config, &next_tool, &next_task, visited, stack)?;
    }

    stack.pop();
    visited.insert(key);
    Ok(())
}

fn collect_task_refs(actions: &[ActionConfig], out: &mut Vec<String>) {
    for action in actions {
        if let ActionConfig::Detailed(detail) = action {
            if let Some(task) = &detail.task {
                out.push(task.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_in_current_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.yml");
        fs::write(&path, "tools: {}\n").unwrap();

        let found = discover(temp.path()).unwrap();
        assert_eq!(found, path);
    }

    #[test]
    fn test_discover_in_parent_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.yaml");
        let sub = temp.path().join("nested").join("deeper");
        fs::create_dir_all(&sub).unwrap();
        fs::write(&path, "tools: {}\n").unwrap();

        let found = discover(&sub).unwrap();
        assert_eq!(found, path);
    }

    #[test]
    fn test_parse_error_has_location() {
        let yaml = "tools:\n  go:\n    tasks:\n      build:\n        stpes: make\n";
        let err = load_str(yaml).unwrap_err();
        match err {
            ConfigError::Parse(parse) => {
                assert!(parse.line > 0);
                assert_eq!(parse.suggestion.as_deref(), Some("did you mean 'steps'?"));
            }
            other => panic!("expected parse error, got {}", other),
        }
    }

    #[test]
    fn test_unknown_jump_target_rejected() {
        let yaml = r#"
tools:
  go:
    tasks:
      release:
        kind: workflow
        actions:
          - name: build
            run: go build ./...
            next: missing
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownJumpTarget { .. }));
    }

    #[test]
    fn test_ambiguous_action_rejected() {
        let yaml = r#"
tools:
  go:
    tasks:
      release:
        kind: workflow
        actions:
          - name: both
            run: echo hi
            script: echo there
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousAction(_)));
    }

    #[test]
    fn test_circular_task_reference_rejected() {
        let yaml = r#"
tools:
  go:
    tasks:
      a:
        kind: workflow
        actions:
          - task: b
      b:
        kind: workflow
        actions:
          - task: a
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::CircularTaskReference(_)));
    }

    #[test]
    fn test_matrix_scope_violation_in_task_level_hook() {
        let yaml = r#"
tools:
  go:
    tasks:
      build:
        steps: go build ./...
        hooks:
          before: echo ${matrix.os}
"#;
        let err = load_str(yaml).unwrap_err();
        match err {
            ConfigError::MatrixScope { stage, placeholder } => {
                assert_eq!(stage, "before");
                assert_eq!(placeholder, "${matrix.os}");
            }
            other => panic!("expected matrix scope error, got {}", other),
        }
    }

    #[test]
    fn test_matrix_placeholder_allowed_in_matrix_hook() {
        let yaml = r#"
tools:
  go:
    tasks:
      build:
        steps: go build ./...
        hooks:
          before-matrix: echo ${matrix.os}
"#;
        assert!(load_str(yaml).is_ok());
    }

    #[test]
    fn test_unknown_shell_rejected() {
        let yaml = r#"
tools:
  go:
    shell: zish
    tasks:
      build:
        steps: go build ./...
"#;
        let err = load_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownShell(_)));
    }

    #[test]
    fn test_configured_shell_accepted() {
        let yaml = r#"
shells:
  zish: {command: zish, args: ["-c"]}
tools:
  go:
    shell: zish
    tasks:
      build:
        steps: go build ./...
"#;
        assert!(load_str(yaml).is_ok());
    }

    #[test]
    fn test_load_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gantry.yml");
        fs::write(
            &path,
            r#"
name: demo
tools:
  sh:
    tasks:
      hello:
        steps: echo hello
"#,
        )
        .unwrap();

        let config = load_file(&path).unwrap();
        assert_eq!(config.name.as_deref(), Some("demo"));
        assert!(config.fail_fast);
    }
}
