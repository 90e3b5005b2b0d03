// Hook Stager
// Resolves one lifecycle stage at a time into an action-chain continuation.
// Only the requested stage's actions are resolved, so matrix-scoped fields
// are never forced at task scope.

use crate::config::models::{HookConfig, HookStage};
use crate::error::ConfigResult;
use crate::execution::action::ActionChain;
use crate::execution::context::RunContext;
use crate::execution::spec::ExecSpec;

/// Resolves hook stages for one task
pub struct HookStager {
    tool: String,
    hooks: HookConfig,
}

impl HookStager {
    pub fn new(tool: impl Into<String>, hooks: HookConfig) -> Self {
        Self {
            tool: tool.into(),
            hooks,
        }
    }

    /// Whether any action is configured for a stage
    pub fn has_stage(&self, stage: HookStage) -> bool {
        !self.hooks.stage(stage).is_empty()
    }

    /// The continuation for one stage; empty when nothing is configured
    pub fn specs(&self, ctx: &RunContext, stage: HookStage) -> ConfigResult<Vec<ExecSpec>> {
        let actions = self.hooks.stage(stage);
        if actions.is_empty() {
            return Ok(Vec::new());
        }
        let chain = ActionChain::new(&self.tool, actions, ctx.filter().clone())?;
        Ok(chain.specs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{ActionConfig, Config};
    use crate::registry::Registry;
    use std::sync::Arc;

    fn context() -> RunContext {
        RunContext::new(Arc::new(Config::default()), Arc::new(Registry::builtin()))
    }

    #[test]
    fn test_unconfigured_stage_resolves_to_nothing() {
        let stager = HookStager::new("tool", HookConfig::default());
        for stage in HookStage::ALL {
            assert!(!stager.has_stage(stage));
            assert!(stager.specs(&context(), stage).unwrap().is_empty());
        }
    }

    #[test]
    fn test_configured_stage_resolves_to_a_chain() {
        let hooks = HookConfig {
            before: vec![ActionConfig::Simple("echo hi".to_string())],
            ..HookConfig::default()
        };
        let stager = HookStager::new("tool", hooks);

        assert!(stager.has_stage(HookStage::Before));
        let specs = stager.specs(&context(), HookStage::Before).unwrap();
        // One run spec plus one advance spec per link.
        assert_eq!(specs.len(), 2);
        assert!(stager.specs(&context(), HookStage::After).unwrap().is_empty());
    }
}
