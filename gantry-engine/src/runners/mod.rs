// Runners Module
// Process launching and shell resolution

pub mod shell;

pub use shell::{
    default_shell, resolve_shell, LaunchOutcome, LaunchRequest, Launcher, ProcessLauncher,
    ShellSpec,
};
