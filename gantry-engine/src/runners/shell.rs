// Shell Runner
// Named shell resolution and process launching with line-wise output
// streaming, capture, timeout kill, and cancellation kill.

use crate::config::models::Config;
use crate::error::{ConfigError, ConfigResult, StepError};
use crate::execution::events::{EventSender, ProgressSender, RunEvent};
use crate::execution::spec::StdinSpec;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// A resolved shell: program plus the arguments preceding the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ShellSpec {
    /// Argv for running a command line through this shell
    pub fn wrap_command(&self, line: &str) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 2);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv.push(line.to_string());
        argv
    }

    /// Argv for running a script file with this shell
    pub fn wrap_file(&self, path: &str) -> Vec<String> {
        vec![self.program.clone(), path.to_string()]
    }
}

/// The platform default shell
pub fn default_shell() -> ShellSpec {
    if cfg!(target_os = "windows") {
        ShellSpec {
            program: "cmd".to_string(),
            args: vec!["/C".to_string()],
        }
    } else {
        ShellSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
        }
    }
}

fn builtin_shell(name: &str) -> Option<ShellSpec> {
    match name {
        "default" => Some(default_shell()),
        "sh" => Some(ShellSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
        }),
        "bash" => Some(ShellSpec {
            program: "bash".to_string(),
            args: vec!["-c".to_string()],
        }),
        "pwsh" => Some(ShellSpec {
            program: "pwsh".to_string(),
            args: vec![
                "-NoLogo".to_string(),
                "-NoProfile".to_string(),
                "-Command".to_string(),
            ],
        }),
        "powershell" => {
            if cfg!(target_os = "windows") {
                Some(ShellSpec {
                    program: "powershell.exe".to_string(),
                    args: vec![
                        "-NoLogo".to_string(),
                        "-NoProfile".to_string(),
                        "-Command".to_string(),
                    ],
                })
            } else {
                builtin_shell("pwsh")
            }
        }
        _ => None,
    }
}

/// Resolve a shell by name against the configuration, then the built-ins
pub fn resolve_shell(config: &Config, name: Option<&str>) -> ConfigResult<ShellSpec> {
    let name = match name {
        Some(name) => name,
        None => return Ok(default_shell()),
    };

    if let Some(shell) = config.shells.get(name) {
        return Ok(ShellSpec {
            program: shell.command.clone(),
            args: shell.args.clone(),
        });
    }
    builtin_shell(name).ok_or_else(|| ConfigError::UnknownShell(name.to_string()))
}

/// Whether a shell name resolves (used by config validation)
pub fn is_known_shell(config: &Config, name: &str) -> bool {
    config.shells.contains_key(name) || builtin_shell(name).is_some()
}

/// A fully resolved process launch
pub struct LaunchRequest {
    /// Event label for output lines
    pub label: String,
    /// Resolved argv (shell wrapping already applied)
    pub argv: Vec<String>,
    /// Environment additions layered over the inherited env
    pub env: Vec<(String, String)>,
    pub dir: PathBuf,
    pub stdin: StdinSpec,
    pub timeout: Option<Duration>,
    pub capture: bool,
    pub show_stdout: bool,
    pub show_stderr: bool,
    pub cancel: CancellationToken,
    pub events: Option<ProgressSender>,
}

/// What a completed (possibly failed) launch produced
#[derive(Debug, Default)]
pub struct LaunchOutcome {
    pub exit_code: Option<i32>,
    /// Captured stdout bytes (empty unless capture was requested)
    pub captured: Vec<u8>,
    /// Collected stderr text, for error context
    pub stderr: String,
}

impl LaunchOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The seam between the step executor and the operating system.
///
/// `launch` returns `Ok` with the exit outcome for completed processes and
/// `Err` only for spawn failures, timeouts, and cancellation.
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchOutcome, StepError>;
}

/// Launcher backed by real OS processes
#[derive(Debug, Default)]
pub struct ProcessLauncher;

#[async_trait]
impl Launcher for ProcessLauncher {
    async fn launch(&self, request: LaunchRequest) -> Result<LaunchOutcome, StepError> {
        let program = match request.argv.first() {
            Some(program) => program.clone(),
            None => {
                return Err(StepError::Spawn {
                    program: String::new(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "empty command",
                    ),
                })
            }
        };

        // Resolve through PATH up front so a missing program reports its
        // name instead of a bare ENOENT from spawn.
        let resolved = if program.contains(std::path::MAIN_SEPARATOR) {
            PathBuf::from(&program)
        } else {
            which::which(&program).map_err(|e| StepError::Spawn {
                program: program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, e),
            })?
        };

        let mut cmd = Command::new(resolved);
        cmd.args(&request.argv[1..]);
        cmd.current_dir(&request.dir);
        for (name, value) in &request.env {
            cmd.env(name, value);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        match &request.stdin {
            StdinSpec::Inherit => cmd.stdin(Stdio::inherit()),
            StdinSpec::Null => cmd.stdin(Stdio::null()),
            StdinSpec::Bytes(_) => cmd.stdin(Stdio::piped()),
        };

        let mut child = cmd.spawn().map_err(|e| StepError::Spawn {
            program: program.clone(),
            source: e,
        })?;

        if let StdinSpec::Bytes(bytes) = &request.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let bytes = bytes.clone();
                tokio::spawn(async move {
                    let _ = stdin.write_all(&bytes).await;
                    let _ = stdin.shutdown().await;
                });
            }
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_handle = {
            let events = request.events.clone();
            let label = request.label.clone();
            let show = request.show_stdout;
            let capture = request.capture;
            tokio::spawn(async move {
                let mut buffer = Vec::new();
                if let Some(stdout) = stdout {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if show {
                            events.send_event(RunEvent::StepOutput {
                                label: label.clone(),
                                line: line.clone(),
                                is_error: false,
                            });
                        }
                        if capture {
                            if !buffer.is_empty() {
                                buffer.push(b'\n');
                            }
                            buffer.extend_from_slice(line.as_bytes());
                        }
                    }
                }
                buffer
            })
        };

        let stderr_handle = {
            let events = request.events.clone();
            let label = request.label.clone();
            let show = request.show_stderr;
            tokio::spawn(async move {
                let mut collected = String::new();
                if let Some(stderr) = stderr {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if show {
                            events.send_event(RunEvent::StepOutput {
                                label: label.clone(),
                                line: line.clone(),
                                is_error: true,
                            });
                        }
                        if !collected.is_empty() {
                            collected.push('\n');
                        }
                        collected.push_str(&line);
                    }
                }
                collected
            })
        };

        let status = tokio::select! {
            _ = request.cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(StepError::Canceled);
            }
            _ = tokio::time::sleep(request.timeout.unwrap_or(Duration::ZERO)),
                if request.timeout.is_some() =>
            {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(StepError::Timeout {
                    program,
                    after: request.timeout.unwrap_or(Duration::ZERO),
                });
            }
            status = child.wait() => status.map_err(|e| StepError::Spawn {
                program: program.clone(),
                source: e,
            })?,
        };

        let captured = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();

        Ok(LaunchOutcome {
            exit_code: status.code(),
            captured,
            stderr,
        })
    }
}
