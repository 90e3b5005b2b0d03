// Exec Specs
// One executable unit: either a command to launch, or a computation that
// yields further specs or a nested task request at execution time.

use crate::error::Result;
use crate::execution::matrix::MatrixFilter;
use crate::execution::replace::ReplaceStore;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A computation invoked with the current replace store
pub type ComputeFn = Arc<dyn Fn(&ReplaceStore) -> Result<Computed> + Send + Sync>;

/// A transform applied to captured output before it is recorded
pub type FixupFn = Arc<dyn Fn(Vec<u8>) -> Vec<u8> + Send + Sync>;

/// What a compute produced
pub enum Computed {
    /// Further specs, executed with the same store
    Specs(Vec<ExecSpec>),
    /// A nested task invocation
    Task(TaskExecRequest),
    /// A direct value, recorded under the spec's capture token
    Value(Vec<u8>),
    /// Nothing to do
    Skip,
}

/// How a spec runs
#[derive(Clone)]
pub enum RunAction {
    /// Launch a command
    Command(CommandSpec),
    /// Compute further work from the current store
    Compute(ComputeFn),
}

impl fmt::Debug for RunAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunAction::Command(cmd) => f.debug_tuple("Command").field(&cmd.argv).finish(),
            RunAction::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// The command half of a spec
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Argv tokens; for shell modes this is the single payload element
    pub argv: Vec<String>,
    pub shell_mode: ShellMode,
}

/// How a command reaches the operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellMode {
    /// Launch the argv directly
    Direct,
    /// Wrap the payload as a shell command line (`sh -c <payload>`)
    Command,
    /// Run the payload as a script file (`sh <payload>`)
    File,
}

/// Stdin source for a launched command
#[derive(Debug, Clone, Default)]
pub enum StdinSpec {
    /// Inherit the parent's stdin
    #[default]
    Inherit,
    /// No stdin
    Null,
    /// Feed literal bytes
    Bytes(Vec<u8>),
}

/// Output capture request: record stdout under `token`
#[derive(Clone)]
pub struct CaptureSpec {
    pub token: String,
    pub fixup: Option<FixupFn>,
}

impl fmt::Debug for CaptureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSpec")
            .field("token", &self.token)
            .field("fixup", &self.fixup.is_some())
            .finish()
    }
}

impl CaptureSpec {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            fixup: None,
        }
    }

    pub fn with_fixup(mut self, fixup: FixupFn) -> Self {
        self.fixup = Some(fixup);
        self
    }
}

/// One executable unit produced from a step, an action, or a task kind
#[derive(Debug, Clone)]
pub struct ExecSpec {
    /// Display name for events
    pub name: String,
    pub action: RunAction,
    /// Environment that wins over the ambient env
    pub env_override: Vec<(String, String)>,
    /// Environment applied only when not already set
    pub env_suggest: Vec<(String, String)>,
    pub dir: Option<PathBuf>,
    /// Named shell; `None` uses the context default
    pub shell: Option<String>,
    pub stdin: StdinSpec,
    /// Log and continue on failure instead of stopping the list
    pub ignore_error: bool,
    /// Wait before starting (canceled waits abort the whole list)
    pub delay: Option<Duration>,
    /// Kill the command if it runs longer than this
    pub timeout: Option<Duration>,
    pub capture: Option<CaptureSpec>,
    pub show_stdout: bool,
    pub show_stderr: bool,
}

impl ExecSpec {
    /// A command-line spec, run through a shell
    pub fn shell_command(name: impl Into<String>, line: impl Into<String>) -> Self {
        Self::with_action(
            name,
            RunAction::Command(CommandSpec {
                argv: vec![line.into()],
                shell_mode: ShellMode::Command,
            }),
        )
    }

    /// A script-file spec, run by a shell
    pub fn shell_file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_action(
            name,
            RunAction::Command(CommandSpec {
                argv: vec![path.into()],
                shell_mode: ShellMode::File,
            }),
        )
    }

    /// A raw argv spec, launched directly
    pub fn argv(name: impl Into<String>, argv: Vec<String>) -> Self {
        Self::with_action(
            name,
            RunAction::Command(CommandSpec {
                argv,
                shell_mode: ShellMode::Direct,
            }),
        )
    }

    /// A compute spec
    pub fn compute(name: impl Into<String>, compute: ComputeFn) -> Self {
        Self::with_action(name, RunAction::Compute(compute))
    }

    fn with_action(name: impl Into<String>, action: RunAction) -> Self {
        Self {
            name: name.into(),
            action,
            env_override: Vec::new(),
            env_suggest: Vec::new(),
            dir: None,
            shell: None,
            stdin: StdinSpec::Inherit,
            ignore_error: false,
            delay: None,
            timeout: None,
            capture: None,
            show_stdout: true,
            show_stderr: true,
        }
    }

    pub fn with_env_override(mut self, pairs: Vec<(String, String)>) -> Self {
        self.env_override = pairs;
        self
    }

    pub fn with_env_suggest(mut self, pairs: Vec<(String, String)>) -> Self {
        self.env_suggest = pairs;
        self
    }

    pub fn with_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.dir = dir;
        self
    }

    pub fn with_shell(mut self, shell: Option<String>) -> Self {
        self.shell = shell;
        self
    }

    pub fn with_stdin(mut self, stdin: StdinSpec) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn with_ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }

    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_capture(mut self, capture: Option<CaptureSpec>) -> Self {
        self.capture = capture;
        self
    }

    pub fn with_show_output(mut self, stdout: bool, stderr: bool) -> Self {
        self.show_stdout = stdout;
        self.show_stderr = stderr;
        self
    }
}

/// The unit of work submitted to the matrix runner
#[derive(Debug, Clone)]
pub struct TaskExecRequest {
    pub tool: String,
    pub task: String,
    /// External matrix filter, inherited by referenced tasks
    pub filter: MatrixFilter,
    /// Log and continue if the nested task fails
    pub ignore_error: bool,
}

impl TaskExecRequest {
    pub fn new(tool: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            task: task.into(),
            filter: MatrixFilter::default(),
            ignore_error: false,
        }
    }

    pub fn with_filter(mut self, filter: MatrixFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_ignore_error(mut self, ignore: bool) -> Self {
        self.ignore_error = ignore;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let spec = ExecSpec::shell_command("compile", "make all");
        assert!(
            matches!(&spec.action, RunAction::Command(c) if c.shell_mode == ShellMode::Command)
        );
        assert!(!spec.ignore_error);
        assert!(spec.show_stdout && spec.show_stderr);
        assert!(spec.capture.is_none());
    }

    #[test]
    fn test_compute_spec_invocation() {
        let compute: ComputeFn = Arc::new(|_store| Ok(Computed::Value(b"ok".to_vec())));
        let spec = ExecSpec::compute("probe", compute);

        match &spec.action {
            RunAction::Compute(f) => match f(&ReplaceStore::new()).unwrap() {
                Computed::Value(data) => assert_eq!(data, b"ok"),
                _ => panic!("expected a value"),
            },
            _ => panic!("expected a compute action"),
        }
    }

    #[test]
    fn test_capture_spec_debug_hides_fixup() {
        let capture = CaptureSpec::new("${capture.v}")
            .with_fixup(Arc::new(|mut data: Vec<u8>| {
                data.retain(|b| *b != b'\n');
                data
            }));
        let text = format!("{:?}", capture);
        assert!(text.contains("${capture.v}"));
    }
}
