// Task Kinds
// The closed capability interface task kinds implement, plus the built-ins.
// Kinds are dispatched through the registry, never through introspection.

pub mod command;
pub mod workflow;

use crate::config::models::HookStage;
use crate::error::Result;
use crate::execution::context::RunContext;
use crate::execution::matrix::MatrixEntry;
use crate::execution::spec::ExecSpec;

pub use command::CommandTask;
pub use workflow::WorkflowTask;

/// Capability interface for a task kind.
///
/// Implementations are immutable once built and shared across the matrix
/// entries of one invocation.
pub trait TaskKind: Send + Sync {
    /// The registered kind name
    fn kind(&self) -> &'static str;

    /// Expand the task's matrix against the context's external filter
    fn matrix_specs(&self, ctx: &RunContext) -> Result<Vec<MatrixEntry>>;

    /// The exec specs for one matrix entry
    fn exec_specs(&self, ctx: &RunContext, entry: &MatrixEntry) -> Result<Vec<ExecSpec>>;

    /// The continuation for one hook stage (empty when unconfigured)
    fn hook_specs(&self, ctx: &RunContext, stage: HookStage) -> Result<Vec<ExecSpec>>;
}
