// Configuration Module
// Typed models for gantry.yml plus discovery, parsing, and validation

pub mod loader;
pub mod models;

pub use loader::{discover, load_file, load_str, resolve_task_ref, validate};
pub use models::{
    ActionConfig, ActionDetail, ActionKind, Config, DimensionMap, HookConfig, HookStage,
    MatrixConfig, ShellConfig, StepConfig, StepDetail, TaskConfig, ToolConfig,
};
