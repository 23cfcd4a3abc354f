//! Storekeeper tools for fertilizers.

use crate::confirmation::ConfirmationQueue;
use crate::context::ToolContext;
use crate::error::Result;
use crate::proposal::{OWNER_REQUIRED, require_owner, submit, summary_property};
use crate::records::{FertilizerUpdate, Mutation, NewFertilizer, RecordStore};
use crate::traits::{Tool, ToolEffect, ToolSpec, optional_string, optional_string_list, tool_error};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const FERTILIZER_STOREKEEPER: &str = "fertilizer_storekeeper";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FertilizerOp {
    List,
    Get,
    ProposeCreate,
    ProposeUpdate,
    ProposeDelete,
}

impl FertilizerOp {
    pub const ALL: [FertilizerOp; 5] = [
        Self::List,
        Self::Get,
        Self::ProposeCreate,
        Self::ProposeUpdate,
        Self::ProposeDelete,
    ];
}

pub struct FertilizerTool {
    op: FertilizerOp,
    store: Arc<dyn RecordStore>,
    queue: Arc<ConfirmationQueue>,
}

impl FertilizerTool {
    pub fn new(
        op: FertilizerOp,
        store: Arc<dyn RecordStore>,
        queue: Arc<ConfirmationQueue>,
    ) -> Self {
        Self { op, store, queue }
    }

    async fn get(&self, args: &serde_json::Value) -> Result<serde_json::Value> {
        let Some(name) = optional_string(args, "name")? else {
            return Ok(tool_error("fertilizer_name_required"));
        };
        match self.store.get_fertilizer(&name).await? {
            Some(fertilizer) => Ok(json!({ "status": "success", "fertilizer": fertilizer })),
            None => Ok(tool_error("fertilizer_not_found")),
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
            return Ok(tool_error("fertilizer_name_required"));
        };
        let Some(usage_sheet) = optional_string(args, "usage_sheet")? else {
            return Ok(tool_error("usage_sheet_required"));
        };
        let Some(recommended_amount) = optional_string(args, "recommended_amount")? else {
            return Ok(tool_error("recommended_amount_required"));
        };
        if self.store.get_fertilizer(&name).await?.is_some() {
            return Ok(tool_error("fertilizer_already_exists"));
        }
        let sources = optional_string_list(args, "sources")?.unwrap_or_default();
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::CreateFertilizer(NewFertilizer {
                name,
                usage_sheet,
                recommended_amount,
                sources,
            }),
        ))
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
            return Ok(tool_error("fertilizer_name_required"));
        };
        let update = FertilizerUpdate {
            usage_sheet: optional_string(args, "usage_sheet")?,
            recommended_amount: optional_string(args, "recommended_amount")?,
            sources: optional_string_list(args, "sources")?,
        };
        if update.is_empty() {
            return Ok(tool_error("fertilizer_update_required"));
        }
        let Some(fertilizer) = self.store.get_fertilizer(&name).await? else {
            return Ok(tool_error("fertilizer_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::UpdateFertilizer {
                name: fertilizer.name,
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
            return Ok(tool_error("fertilizer_name_required"));
        };
        let Some(fertilizer) = self.store.get_fertilizer(&name).await? else {
            return Ok(tool_error("fertilizer_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::DeleteFertilizer {
                name: fertilizer.name,
            },
        ))
    }
}

#[async_trait]
impl Tool for FertilizerTool {
    fn spec(&self) -> ToolSpec {
        let (name, description, effect, schema) = match self.op {
            FertilizerOp::List => (
                "list_fertilizers",
                "List registered fertilizers.",
                ToolEffect::Read,
                json!({ "type": "object", "properties": {} }),
            ),
            FertilizerOp::Get => (
                "get_fertilizer",
                "Fetch one fertilizer by exact name, including its usage sheet.",
                ToolEffect::Read,
                json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }),
            ),
            FertilizerOp::ProposeCreate => (
                "propose_create_fertilizer",
                "Ask the user to approve registering a fertilizer.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "usage_sheet": { "type": "string" },
                        "recommended_amount": { "type": "string" },
                        "sources": { "type": "array", "items": { "type": "string" } },
                        "summary": summary_property()
                    },
                    "required": ["name", "usage_sheet", "recommended_amount"]
                }),
            ),
            FertilizerOp::ProposeUpdate => (
                "propose_update_fertilizer",
                "Ask the user to approve changes to a fertilizer's usage sheet, amount or sources.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "usage_sheet": { "type": "string" },
                        "recommended_amount": { "type": "string" },
                        "sources": { "type": "array", "items": { "type": "string" } },
                        "summary": summary_property()
                    },
                    "required": ["name"]
                }),
            ),
            FertilizerOp::ProposeDelete => (
                "propose_delete_fertilizer",
                "Ask the user to approve deleting a fertilizer.",
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
            FertilizerOp::List => {
                let fertilizers = self.store.list_fertilizers().await?;
                Ok(json!({ "status": "success", "fertilizers": fertilizers }))
            }
            FertilizerOp::Get => self.get(&arguments).await,
            FertilizerOp::ProposeCreate => self.propose_create(ctx, &arguments).await,
            FertilizerOp::ProposeUpdate => self.propose_update(ctx, &arguments).await,
            FertilizerOp::ProposeDelete => self.propose_delete(ctx, &arguments).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OwnerId;
    use crate::records::SqliteRecordStore;

    fn fixture() -> (Arc<dyn RecordStore>, Arc<ConfirmationQueue>) {
        (
            Arc::new(SqliteRecordStore::open_in_memory().expect("store")),
            Arc::new(ConfirmationQueue::new()),
        )
    }

    #[tokio::test]
    async fn create_requires_usage_sheet_and_amount() {
        let (store, queue) = fixture();
        let tool = FertilizerTool::new(FertilizerOp::ProposeCreate, store, queue.clone());
        let ctx = ToolContext::for_owner(OwnerId::new("u1"));
        let cases = [
            (json!({"usage_sheet": "x", "recommended_amount": "y"}), "fertilizer_name_required"),
            (json!({"name": "Biogold", "recommended_amount": "y"}), "usage_sheet_required"),
            (json!({"name": "Biogold", "usage_sheet": "x"}), "recommended_amount_required"),
        ];
        for (args, message) in cases {
            let result = tool.execute(&ctx, args).await.expect("execute");
            assert_eq!(result["message"], message);
        }
        let ok = tool
            .execute(
                &ctx,
                json!({"name": "Biogold", "usage_sheet": "x", "recommended_amount": "y"}),
            )
            .await
            .expect("execute");
        assert_eq!(ok["summary"], "create fertilizer Biogold");
        assert_eq!(queue.len(&OwnerId::new("u1")), 1);
    }

    #[tokio::test]
    async fn get_and_update_use_the_stored_name() {
        let (store, queue) = fixture();
        store
            .create_fertilizer(NewFertilizer {
                name: "Biogold".to_string(),
                usage_sheet: "pellets".to_string(),
                recommended_amount: "1 basket".to_string(),
                sources: vec![],
            })
            .await
            .expect("seed");
        let ctx = ToolContext::for_owner(OwnerId::new("u1"));

        let get = FertilizerTool::new(FertilizerOp::Get, store.clone(), queue.clone());
        let found = get
            .execute(&ToolContext::detached(), json!({"name": "biogold"}))
            .await
            .expect("execute");
        assert_eq!(found["fertilizer"]["recommended_amount"], "1 basket");

        let update = FertilizerTool::new(FertilizerOp::ProposeUpdate, store, queue.clone());
        let empty = update
            .execute(&ctx, json!({"name": "Biogold"}))
            .await
            .expect("execute");
        assert_eq!(empty["message"], "fertilizer_update_required");
        update
            .execute(&ctx, json!({"name": "biogold", "recommended_amount": "half"}))
            .await
            .expect("execute");
        let command = queue.pop_oldest(&OwnerId::new("u1")).expect("queued");
        assert!(matches!(
            command.mutation(),
            Mutation::UpdateFertilizer { name, .. } if name == "Biogold"
        ));
    }
}
