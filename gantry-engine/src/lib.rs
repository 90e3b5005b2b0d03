// Gantry Engine Library
// Core library for matrix-expanding task execution: configuration models,
// the kind registry, and the concurrent execution engine.

pub mod config;
pub mod error;
pub mod execution;
pub mod registry;
pub mod runners;
pub mod tasks;

// Re-export commonly used types
pub use error::{ConfigError, EngineError, EntryFailure, Result, StepError, TaskFailure};

// Re-export configuration types
pub use config::{Config, HookStage, MatrixConfig, TaskConfig, ToolConfig};

// Re-export execution types
pub use execution::{
    progress_channel, run_task, ExecSpec, LogLevel, MatrixEntry, MatrixExpander, MatrixFilter,
    ProgressReceiver, ProgressSender, ReplaceStore, RunContext, RunEvent, TaskExecRequest,
};

// Re-export registry and runner types
pub use registry::{Registry, TaskBlueprint};
pub use runners::{Launcher, ProcessLauncher};
pub use tasks::TaskKind;
