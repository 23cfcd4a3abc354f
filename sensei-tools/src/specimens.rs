//! Gardener tools: the user's bonsai collection.

use crate::confirmation::ConfirmationQueue;
use crate::context::ToolContext;
use crate::error::Result;
use crate::proposal::{OWNER_REQUIRED, require_owner, submit, summary_property};
use crate::records::{Mutation, NewSpecimen, RecordId, RecordStore, SpecimenUpdate};
use crate::traits::{Tool, ToolEffect, ToolSpec, optional_i64, optional_string, tool_error};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const GARDENER: &str = "gardener";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecimenOp {
    List,
    ProposeCreate,
    ProposeUpdate,
    ProposeDelete,
}

impl SpecimenOp {
    pub const ALL: [SpecimenOp; 4] = [
        Self::List,
        Self::ProposeCreate,
        Self::ProposeUpdate,
        Self::ProposeDelete,
    ];
}

pub struct SpecimenTool {
    op: SpecimenOp,
    store: Arc<dyn RecordStore>,
    queue: Arc<ConfirmationQueue>,
}

impl SpecimenTool {
    pub fn new(op: SpecimenOp, store: Arc<dyn RecordStore>, queue: Arc<ConfirmationQueue>) -> Self {
        Self { op, store, queue }
    }

    async fn species_exists(&self, id: RecordId) -> Result<bool> {
        Ok(self.store.get_species(id).await?.is_some())
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
            return Ok(tool_error("specimen_name_required"));
        };
        let Some(species_id) = optional_i64(args, "species_id")? else {
            return Ok(tool_error("species_id_required"));
        };
        if !self.species_exists(species_id).await? {
            return Ok(tool_error("species_not_found"));
        }
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::CreateSpecimen(NewSpecimen { name, species_id }),
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
        let Some(id) = optional_i64(args, "specimen_id")? else {
            return Ok(tool_error("specimen_id_required"));
        };
        let update = SpecimenUpdate {
            name: optional_string(args, "name")?,
            species_id: optional_i64(args, "species_id")?,
        };
        if update.is_empty() {
            return Ok(tool_error("specimen_update_required"));
        }
        if let Some(species_id) = update.species_id {
            if !self.species_exists(species_id).await? {
                return Ok(tool_error("species_not_found"));
            }
        }
        let Some(specimen) = self.store.get_specimen(id).await? else {
            return Ok(tool_error("specimen_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::UpdateSpecimen {
                id,
                name: specimen.name,
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
        let Some(id) = optional_i64(args, "specimen_id")? else {
            return Ok(tool_error("specimen_id_required"));
        };
        let Some(specimen) = self.store.get_specimen(id).await? else {
            return Ok(tool_error("specimen_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::DeleteSpecimen {
                id,
                name: specimen.name,
            },
        ))
    }
}

#[async_trait]
impl Tool for SpecimenTool {
    fn spec(&self) -> ToolSpec {
        let (name, description, effect, schema) = match self.op {
            SpecimenOp::List => (
                "list_specimens",
                "List the bonsai in the user's collection.",
                ToolEffect::Read,
                json!({ "type": "object", "properties": {} }),
            ),
            SpecimenOp::ProposeCreate => (
                "propose_create_specimen",
                "Ask the user to approve adding a bonsai of an existing species to the collection.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "species_id": { "type": "integer" },
                        "summary": summary_property()
                    },
                    "required": ["name", "species_id"]
                }),
            ),
            SpecimenOp::ProposeUpdate => (
                "propose_update_specimen",
                "Ask the user to approve renaming a bonsai or changing its species.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": {
                        "specimen_id": { "type": "integer" },
                        "name": { "type": "string" },
                        "species_id": { "type": "integer" },
                        "summary": summary_property()
                    },
                    "required": ["specimen_id"]
                }),
            ),
            SpecimenOp::ProposeDelete => (
                "propose_delete_specimen",
                "Ask the user to approve removing a bonsai from the collection.",
                ToolEffect::ProposeMutation,
                json!({
                    "type": "object",
                    "properties": {
                        "specimen_id": { "type": "integer" },
                        "summary": summary_property()
                    },
                    "required": ["specimen_id"]
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
            SpecimenOp::List => {
                let specimens = self.store.list_specimens().await?;
                Ok(json!({ "status": "success", "specimens": specimens }))
            }
            SpecimenOp::ProposeCreate => self.propose_create(ctx, &arguments).await,
            SpecimenOp::ProposeUpdate => self.propose_update(ctx, &arguments).await,
            SpecimenOp::ProposeDelete => self.propose_delete(ctx, &arguments).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OwnerId;
    use crate::records::{NewSpecies, SqliteRecordStore};

    async fn seeded() -> (Arc<dyn RecordStore>, Arc<ConfirmationQueue>, RecordId) {
        let store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::open_in_memory().expect("store"));
        let species = store
            .create_species(NewSpecies {
                name: "Juniper".to_string(),
                scientific_name: Some("Juniperus chinensis".to_string()),
                care_guide: json!({}),
            })
            .await
            .expect("seed species");
        (store, Arc::new(ConfirmationQueue::new()), species.id)
    }

    #[tokio::test]
    async fn propose_create_checks_species_and_queues() {
        let (store, queue, species_id) = seeded().await;
        let tool = SpecimenTool::new(SpecimenOp::ProposeCreate, store.clone(), queue.clone());
        let ctx = ToolContext::for_owner(OwnerId::new("u1"));

        let missing = tool
            .execute(&ctx, json!({"name": "Shimpaku", "species_id": species_id + 100}))
            .await
            .expect("execute");
        assert_eq!(missing["message"], "species_not_found");

        let ok = tool
            .execute(&ctx, json!({"name": "Shimpaku", "species_id": species_id.to_string()}))
            .await
            .expect("execute");
        assert_eq!(ok["status"], "pending_confirmation");
        assert_eq!(queue.len(&OwnerId::new("u1")), 1);
        assert!(store.list_specimens().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn update_and_delete_validate_target() {
        let (store, queue, species_id) = seeded().await;
        let ctx = ToolContext::for_owner(OwnerId::new("u1"));
        let update = SpecimenTool::new(SpecimenOp::ProposeUpdate, store.clone(), queue.clone());
        let delete = SpecimenTool::new(SpecimenOp::ProposeDelete, store.clone(), queue.clone());

        let cases = [
            (&update, json!({}), "specimen_id_required"),
            (&update, json!({"specimen_id": 1}), "specimen_update_required"),
            (&update, json!({"specimen_id": 1, "species_id": 999}), "species_not_found"),
            (&update, json!({"specimen_id": 1, "name": "New"}), "specimen_not_found"),
            (&delete, json!({"specimen_id": 7}), "specimen_not_found"),
        ];
        for (tool, args, message) in cases {
            let result = tool.execute(&ctx, args).await.expect("execute");
            assert_eq!(result["message"], message);
        }

        let specimen = store
            .create_specimen(NewSpecimen {
                name: "Shimpaku".to_string(),
                species_id,
            })
            .await
            .expect("seed specimen");
        let result = delete
            .execute(&ctx, json!({"specimen_id": specimen.id}))
            .await
            .expect("execute");
        assert_eq!(result["summary"], "delete specimen Shimpaku");
    }
}
