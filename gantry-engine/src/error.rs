// Engine error types
// Configuration errors abort before any process runs; step errors are
// recoverable when the step allows it; entry failures aggregate without
// masking each other.

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Top-level error for a task invocation
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration errors (fatal, nothing was executed)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A single step failed and was not ignorable
    #[error(transparent)]
    Step(#[from] StepError),

    /// One or more matrix entries failed
    #[error(transparent)]
    Task(#[from] TaskFailure),

    /// A primary error with secondary (hook) errors appended
    #[error("{primary} (additionally: {})", .secondary.join("; "))]
    Compound {
        primary: Box<EngineError>,
        secondary: Vec<String>,
    },

    /// I/O error outside of process execution
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Append a secondary error (from a best-effort hook) to a primary one.
    ///
    /// The primary error is never replaced; the secondary text is folded into
    /// an existing `Compound` or wraps the primary in a new one.
    pub fn with_secondary(self, secondary: String) -> Self {
        match self {
            EngineError::Compound {
                primary,
                secondary: mut existing,
            } => {
                existing.push(secondary);
                EngineError::Compound {
                    primary,
                    secondary: existing,
                }
            }
            other => EngineError::Compound {
                primary: Box::new(other),
                secondary: vec![secondary],
            },
        }
    }
}

/// Configuration parsing and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no config file found (searched: {0})")]
    NotFound(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("tool '{0}' is not defined")]
    UnknownTool(String),

    #[error("task '{task}' is not defined for tool '{tool}'")]
    UnknownTask { tool: String, task: String },

    #[error("no task kind registered for tool kind '{tool_kind}', task kind '{task_kind}'")]
    UnknownKind {
        tool_kind: String,
        task_kind: String,
    },

    #[error("shell '{0}' is not defined")]
    UnknownShell(String),

    #[error("action '{action}' jumps to unknown action '{target}'")]
    UnknownJumpTarget { action: String, target: String },

    #[error("action '{0}' must set exactly one of: task, run, script, script-file")]
    AmbiguousAction(String),

    #[error("circular task reference: {0}")]
    CircularTaskReference(String),

    #[error("hook stage '{stage}' is task-scoped and cannot reference '{placeholder}'")]
    MatrixScope {
        stage: &'static str,
        placeholder: String,
    },

    #[error("no matrix entry matched for task '{task}' of tool '{tool}'")]
    NoMatrixMatch { tool: String, task: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Step execution errors
#[derive(Error, Debug)]
pub enum StepError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("command '{program}' exited with {}", exit_code_text(.code))]
    ExitStatus {
        program: String,
        code: Option<i32>,
    },

    #[error("command '{program}' timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("execution canceled")]
    Canceled,
}

fn exit_code_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "unknown status (killed by signal?)".to_string(),
    }
}

/// One matrix entry's failure record
#[derive(Debug, Clone)]
pub struct EntryFailure {
    /// Human-readable entry description, e.g. `arch=amd64 os=linux`
    pub entry: String,
    /// Error text for that entry
    pub error: String,
}

/// Aggregated failure of a task invocation across matrix entries
#[derive(Debug)]
pub struct TaskFailure {
    pub failures: Vec<EntryFailure>,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} matrix {} failed:",
            self.failures.len(),
            if self.failures.len() == 1 {
                "entry"
            } else {
                "entries"
            }
        )?;
        for failure in &self.failures {
            writeln!(f, "  [{}] {}", failure.entry, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for TaskFailure {}

/// YAML parse error with location and an optional fix suggestion
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub suggestion: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {}:{})", self.message, self.line, self.column)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nhelp: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Specialized result for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_display() {
        let failure = TaskFailure {
            failures: vec![
                EntryFailure {
                    entry: "arch=amd64 os=linux".to_string(),
                    error: "command 'false' exited with status 1".to_string(),
                },
                EntryFailure {
                    entry: "arch=amd64 os=darwin".to_string(),
                    error: "execution canceled".to_string(),
                },
            ],
        };

        let text = failure.to_string();
        assert!(text.contains("2 matrix entries failed"));
        assert!(text.contains("[arch=amd64 os=linux]"));
        assert!(text.contains("status 1"));
    }

    #[test]
    fn test_with_secondary_wraps_once() {
        let err = EngineError::Config(ConfigError::NoMatrixMatch {
            tool: "go".to_string(),
            task: "build".to_string(),
        });

        let combined = err
            .with_secondary("hook 'after' failed: exit 1".to_string())
            .with_secondary("hook 'after-failure' failed: exit 2".to_string());

        match combined {
            EngineError::Compound { secondary, .. } => assert_eq!(secondary.len(), 2),
            other => panic!("expected compound error, got {}", other),
        }
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unknown field 'stpes'", 12, 3)
            .with_suggestion("did you mean 'steps'?");
        let text = err.to_string();
        assert!(text.contains("line 12:3"));
        assert!(text.contains("help:"));
    }
}
