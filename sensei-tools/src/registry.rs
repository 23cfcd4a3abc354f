use crate::confirmation::ConfirmationQueue;
use crate::error::{Result, ToolError};
use crate::fertilizers::{FERTILIZER_STOREKEEPER, FertilizerOp, FertilizerTool};
use crate::governor::govern_with_limit;
use crate::records::RecordStore;
use crate::species::{BOTANIST, SpeciesOp, SpeciesTool};
use crate::specimens::{GARDENER, SpecimenOp, SpecimenTool};
use crate::traits::{Tool, ToolEffect, to_llm_tool_def};
use crate::treatments::{TREATMENT_STOREKEEPER, TreatmentOp, TreatmentTool};
use std::sync::Arc;

/// The set of tools exposed to the agent runtime.
///
/// Registration refuses a proposal tool that is not wrapped by the governor,
/// so an ungoverned mutation path can never reach the model.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let spec = tool.spec();
        sensei_llm::validate_tool_name(&spec.name)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        if spec.effect == ToolEffect::ProposeMutation && tool.governed_by().is_none() {
            return Err(ToolError::InvalidArguments(format!(
                "tool {} proposes mutations and must be governed",
                spec.name
            )));
        }
        if self.find(&spec.name).is_some() {
            return Err(ToolError::InvalidArguments(format!(
                "tool {} registered twice",
                spec.name
            )));
        }
        tracing::debug!(
            tool_name = %spec.name,
            governed_by = tool.governed_by().unwrap_or("-"),
            "tool registered"
        );
        self.tools.push(tool);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name).cloned()
    }

    pub fn definitions(&self) -> Vec<sensei_llm::ToolDefinition> {
        self.tools.iter().map(|t| to_llm_tool_def(t.as_ref())).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Builds every botanical tool, governing each proposal tool under its agent.
pub fn build_toolset(
    store: Arc<dyn RecordStore>,
    queue: Arc<ConfirmationQueue>,
    identical_call_limit: u32,
) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let mut add = |agent: &str, tool: Arc<dyn Tool>| -> Result<()> {
        let tool = match tool.spec().effect {
            ToolEffect::Read => tool,
            ToolEffect::ProposeMutation => govern_with_limit(agent, identical_call_limit, tool),
        };
        registry.register(tool)
    };

    for op in SpeciesOp::ALL {
        add(
            BOTANIST,
            Arc::new(SpeciesTool::new(op, store.clone(), queue.clone())),
        )?;
    }
    for op in SpecimenOp::ALL {
        add(
            GARDENER,
            Arc::new(SpecimenTool::new(op, store.clone(), queue.clone())),
        )?;
    }
    for op in FertilizerOp::ALL {
        add(
            FERTILIZER_STOREKEEPER,
            Arc::new(FertilizerTool::new(op, store.clone(), queue.clone())),
        )?;
    }
    for op in TreatmentOp::ALL {
        add(
            TREATMENT_STOREKEEPER,
            Arc::new(TreatmentTool::new(op, store.clone(), queue.clone())),
        )?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ToolContext;
    use crate::governor::FnTool;
    use crate::records::SqliteRecordStore;
    use serde_json::json;

    fn toolset() -> ToolRegistry {
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::open_in_memory().expect("store"));
        build_toolset(store, Arc::new(ConfirmationQueue::new()), 3).expect("toolset")
    }

    #[test]
    fn every_proposal_tool_is_governed_by_its_agent() {
        let registry = toolset();
        assert_eq!(registry.len(), 19);
        let create = registry.find("propose_create_species").expect("registered");
        assert_eq!(create.governed_by(), Some(BOTANIST));
        let delete = registry.find("propose_delete_specimen").expect("registered");
        assert_eq!(delete.governed_by(), Some(GARDENER));
        let read = registry.find("list_fertilizers").expect("registered");
        assert_eq!(read.governed_by(), None);
        assert_eq!(registry.definitions().len(), registry.len());
    }

    #[test]
    fn ungoverned_proposal_tools_are_refused() {
        let raw: Arc<dyn Tool> = Arc::new(FnTool::new(
            "propose_anything",
            "test",
            json!({"type": "object"}),
            ToolEffect::ProposeMutation,
            |_ctx: &ToolContext, args: serde_json::Value| Ok(args),
        ));
        let mut registry = ToolRegistry::new();
        assert!(registry.register(raw.clone()).is_err());
        registry
            .register(govern_with_limit("botanist", 3, raw))
            .expect("governed tool registers");
    }

    #[test]
    fn duplicate_names_are_refused() {
        let mut registry = toolset();
        let dup = registry.find("list_species").expect("registered");
        assert!(registry.register(dup).is_err());
    }
}
