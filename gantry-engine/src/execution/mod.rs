// Execution Engine Module
// Matrix expansion, action chaining, the step kernel, hooks, and the
// concurrent matrix runner.

pub mod action;
pub mod context;
pub mod events;
pub mod hooks;
pub mod matrix;
pub mod replace;
pub mod runner;
pub mod spec;
pub mod steps;

use std::future::Future;
use std::pin::Pin;

/// Boxed future used to break async recursion between the step kernel and
/// the matrix runner.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Re-export key types
pub use action::ActionChain;
pub use context::RunContext;
pub use events::{progress_channel, LogLevel, ProgressReceiver, ProgressSender, RunEvent};
pub use hooks::HookStager;
pub use matrix::{MatrixEntry, MatrixExpander, MatrixFilter};
pub use replace::{capture_token, matrix_token, ReplaceEntry, ReplaceStore};
pub use runner::run_task;
pub use spec::{
    CaptureSpec, CommandSpec, Computed, ComputeFn, ExecSpec, RunAction, ShellMode, StdinSpec,
    TaskExecRequest,
};
pub use steps::run_specs;
