//! Storekeeper tools for phytosanitary treatments.

use crate::confirmation::ConfirmationQueue;
use crate::context::ToolContext;
use crate::error::Result;
use crate::proposal::{OWNER_REQUIRED, require_owner, submit, summary_property};
use crate::records::{Mutation, NewTreatment, RecordStore, TreatmentUpdate};
use crate::traits::{Tool, ToolEffect, ToolSpec, optional_string, optional_string_list, tool_error};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const TREATMENT_STOREKEEPER: &str = "treatment_storekeeper";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreatmentOp {
    List,
    Get,
    ProposeCreate,
    ProposeUpdate,
    ProposeDelete,
}

impl TreatmentOp {
    pub const ALL: [TreatmentOp; 5] = [
        Self::List,
        Self::Get,
        Self::ProposeCreate,
        Self::ProposeUpdate,
        Self::ProposeDelete,
    ];
}

pub struct TreatmentTool {
    op: TreatmentOp,
    store: Arc<dyn RecordStore>,
    queue: Arc<ConfirmationQueue>,
}

impl TreatmentTool {
    pub fn new(op: TreatmentOp, store: Arc<dyn RecordStore>, queue: Arc<ConfirmationQueue>) -> Self {
        Self { op, store, queue }
    }

    async fn get(&self, args: &serde_json::Value) -> Result<serde_json::Value> {
        let Some(name) = optional_string(args, "name")? else {
            return Ok(tool_error("treatment_name_required"));
        };
        match self.store.get_treatment(&name).await? {
            Some(treatment) => Ok(json!({ "status": "success", "treatment": treatment })),
            None => Ok(tool_error("treatment_not_found")),
        }
    }

    async fn propose_create(
        &self,
        ctx: &ToolContext,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let Some(owner) = require_owner(ctx) else {
            return Ok(tool_error(OWNER_REQUIRED));
        };
        let Some(name) = optional_string(args, "name")? else {
            return Ok(tool_error("treatment_name_required"));
        };
        let Some(usage_sheet) = optional_string(args, "usage_sheet")? else {
            return Ok(tool_error("usage_sheet_required"));
        };
        let Some(recommended_for) = optional_string(args, "recommended_for")? else {
            return Ok(tool_error("recommended_for_required"));
        };
        if self.store.get_treatment(&name).await?.is_some() {
            return Ok(tool_error("treatment_already_exists"));
        }
        let new = NewTreatment {
            name,
            usage_sheet,
            recommended_amount: optional_string(args, "recommended_amount")?.unwrap_or_default(),
            recommended_for,
            sources: optional_string_list(args, "sources")?.unwrap_or_default(),
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(&self.queue, owner, summary, Mutation::CreateTreatment(new)))
    }

    async fn propose_update(
        &self,
        ctx: &ToolContext,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let Some(owner) = require_owner(ctx) else {
            return Ok(tool_error(OWNER_REQUIRED));
        };
        let Some(name) = optional_string(args, "name")? else {
            return Ok(tool_error("treatment_name_required"));
        };
        let update = TreatmentUpdate {
            usage_sheet: optional_string(args, "usage_sheet")?,
            recommended_amount: optional_string(args, "recommended_amount")?,
            recommended_for: optional_string(args, "recommended_for")?,
            sources: optional_string_list(args, "sources")?,
        };
        if update.is_empty() {
            return Ok(tool_error("treatment_update_required"));
        }
        let Some(treatment) = self.store.get_treatment(&name).await? else {
            return Ok(tool_error("treatment_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::UpdateTreatment {
                name: treatment.name,
                update,
            },
        ))
    }

    async fn propose_delete(
        &self,
        ctx: &ToolContext,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let Some(owner) = require_owner(ctx) else {
            return Ok(tool_error(OWNER_REQUIRED));
        };
        let Some(name) = optional_string(args, "name")? else {
            return Ok(tool_error("treatment_name_required"));
        };
        let Some(treatment) = self.store.get_treatment(&name).await? else {
            return Ok(tool_error("treatment_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::DeleteTreatment {
                name: treatment.name,
            },
        ))
    }
}

fn treatment_properties() -> serde_json::Value {
    json!({
        "name": { "type": "string" },
        "usage_sheet": { "type": "string" },
        "recommended_amount": { "type": "string" },
        "recommended_for": { "type": "string", "description": "Pests or diseases it treats." },
        "sources": { "type": "array", "items": { "type": "string" } },
        "summary": summary_property()
    })
}

#[async_trait]
impl Tool for TreatmentTool {
    fn spec(&self) -> ToolSpec {
        let (name, description, effect, schema) = match self.op {
            TreatmentOp::List => (
                "list_treatments",
                "List registered phytosanitary treatments.",
                ToolEffect::Read,
                json!({ "type": "object", "properties": {} }),
            ),
            TreatmentOp::Get => (
                "get_treatment",
                "Fetch one phytosanitary treatment by exact name.",
                ToolEffect::Read,
                json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }),
            ),
            TreatmentOp::ProposeCreate => (
                "propose_create_treatment",
                "Ask the user to approve registering a phytosanitary treatment.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": treatment_properties(),
                    "required": ["name", "usage_sheet", "recommended_for"]
                }),
            ),
            TreatmentOp::ProposeUpdate => (
                "propose_update_treatment",
                "Ask the user to approve changes to a phytosanitary treatment.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": treatment_properties(),
                    "required": ["name"]
                }),
            ),
            TreatmentOp::ProposeDelete => (
                "propose_delete_treatment",
                "Ask the user to approve deleting a phytosanitary treatment.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "summary": summary_property()
                    },
                    "required": ["name"]
                }),
            ),
        };
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            parameters_schema: schema,
            effect,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(op = ?self.op))]
    async fn execute(
        &self,
        ctx: &ToolContext,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match self.op {
            TreatmentOp::List => {
                let treatments = self.store.list_treatments().await?;
                Ok(json!({ "status": "success", "treatments": treatments }))
            }
            TreatmentOp::Get => self.get(&arguments).await,
            TreatmentOp::ProposeCreate => self.propose_create(ctx, &arguments).await,
            TreatmentOp::ProposeUpdate => self.propose_update(ctx, &arguments).await,
            TreatmentOp::ProposeDelete => self.propose_delete(ctx, &arguments).await,
        }
    }
}
