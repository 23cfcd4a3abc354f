//! Botanist tools: the species herbarium.

use crate::confirmation::ConfirmationQueue;
use crate::context::ToolContext;
use crate::error::Result;
use crate::proposal::{OWNER_REQUIRED, require_owner, submit, summary_property};
use crate::records::{Mutation, NewSpecies, RecordStore, SpeciesUpdate};
use crate::traits::{Tool, ToolEffect, ToolSpec, optional_string, optional_string_list, tool_error};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub const BOTANIST: &str = "botanist";

const CARE_FIELDS: [&str; 5] = ["watering", "light", "soil", "pruning", "pests"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeciesOp {
    List,
    Find,
    ProposeCreate,
    ProposeUpdate,
    ProposeDelete,
}

impl SpeciesOp {
    pub const ALL: [SpeciesOp; 5] = [
        Self::List,
        Self::Find,
        Self::ProposeCreate,
        Self::ProposeUpdate,
        Self::ProposeDelete,
    ];
}

pub struct SpeciesTool {
    op: SpeciesOp,
    store: Arc<dyn RecordStore>,
    queue: Arc<ConfirmationQueue>,
}

impl SpeciesTool {
    pub fn new(op: SpeciesOp, store: Arc<dyn RecordStore>, queue: Arc<ConfirmationQueue>) -> Self {
        Self { op, store, queue }
    }

    async fn list(&self) -> Result<serde_json::Value> {
        let species = self.store.list_species().await?;
        Ok(json!({ "status": "success", "species": species }))
    }

    async fn find(&self, args: &serde_json::Value) -> Result<serde_json::Value> {
        let Some(name) = optional_string(args, "name")? else {
            return Ok(tool_error("species_name_required"));
        };
        let species = self.store.search_species(&name).await?;
        Ok(json!({ "status": "success", "species": species }))
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
            return Ok(tool_error("species_name_required"));
        };
        let Some(scientific_name) = optional_string(args, "scientific_name")? else {
            return Ok(tool_error("scientific_name_required"));
        };
        if self.store.get_species_by_name(&name).await?.is_some() {
            return Ok(tool_error("species_already_exists"));
        }
        let care_guide = serde_json::Value::Object(care_guide(args)?);
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::CreateSpecies(NewSpecies {
                name,
                scientific_name: Some(normalize_scientific_name(&scientific_name)),
                care_guide,
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
            return Ok(tool_error("species_name_required"));
        };
        let care = care_guide(args)?;
        let mut update = SpeciesUpdate {
            name: optional_string(args, "new_name")?,
            scientific_name: optional_string(args, "scientific_name")?
                .map(|s| normalize_scientific_name(&s)),
            care_guide: None,
        };
        if update.is_empty() && care.is_empty() {
            return Ok(tool_error("species_update_required"));
        }
        let Some(species) = self.store.get_species_by_name(&name).await? else {
            return Ok(tool_error("species_not_found"));
        };
        if !care.is_empty() {
            // Care fields are merged into the stored guide, not replacing it.
            let mut merged = match species.care_guide {
                serde_json::Value::Object(existing) => existing,
                _ => serde_json::Map::new(),
            };
            merged.extend(care);
            update.care_guide = Some(serde_json::Value::Object(merged));
        }
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::UpdateSpecies {
                id: species.id,
                name: species.name,
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
            return Ok(tool_error("species_name_required"));
        };
        let Some(species) = self.store.get_species_by_name(&name).await? else {
            return Ok(tool_error("species_not_found"));
        };
        let summary = optional_string(args, "summary")?;
        Ok(submit(
            &self.queue,
            owner,
            summary,
            Mutation::DeleteSpecies {
                id: species.id,
                name: species.name,
            },
        ))
    }
}

/// Collects the optional care fields; absent fields are omitted.
fn care_guide(args: &serde_json::Value) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut guide = serde_json::Map::new();
    for field in CARE_FIELDS {
        if let Some(value) = optional_string(args, field)? {
            guide.insert(field.to_string(), json!(value));
        }
    }
    if let Some(sources) = optional_string_list(args, "sources")? {
        guide.insert("sources".to_string(), json!(sources));
    }
    Ok(guide)
}

/// `ulmus  PARVIFOLIA` -> `Ulmus parvifolia`.
fn normalize_scientific_name(raw: &str) -> String {
    let mut words = raw.split_whitespace();
    let mut out = String::new();
    if let Some(genus) = words.next() {
        let mut chars = genus.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    for word in words {
        out.push(' ');
        out.push_str(&word.to_lowercase());
    }
    out
}

fn care_properties() -> serde_json::Map<String, serde_json::Value> {
    let mut props = serde_json::Map::new();
    for field in CARE_FIELDS {
        props.insert(field.to_string(), json!({ "type": "string" }));
    }
    props.insert(
        "sources".to_string(),
        json!({ "type": "array", "items": { "type": "string" } }),
    );
    props
}

#[async_trait]
impl Tool for SpeciesTool {
    fn spec(&self) -> ToolSpec {
        let (name, description, effect, schema) = match self.op {
            SpeciesOp::List => (
                "list_species",
                "List every species in the herbarium with its care guide.",
                ToolEffect::Read,
                json!({ "type": "object", "properties": {} }),
            ),
            SpeciesOp::Find => (
                "find_species",
                "Search species by common or scientific name (case-insensitive substring).",
                ToolEffect::Read,
                json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"]
                }),
            ),
            SpeciesOp::ProposeCreate => {
                let mut props = care_properties();
                props.insert("name".to_string(), json!({ "type": "string" }));
                props.insert("scientific_name".to_string(), json!({ "type": "string" }));
                props.insert("summary".to_string(), summary_property());
                (
                    "propose_create_species",
                    "Ask the user to approve adding a species. Nothing is written until they confirm.",
                    ToolEffect::ProposeMutation,
                    json!({
                        "type": "object",
                        "properties": props,
                        "required": ["name", "scientific_name"]
                    }),
                )
            }
            SpeciesOp::ProposeUpdate => {
                let mut props = care_properties();
                props.insert(
                    "name".to_string(),
                    json!({ "type": "string", "description": "Current common name." }),
                );
                props.insert("new_name".to_string(), json!({ "type": "string" }));
                props.insert("scientific_name".to_string(), json!({ "type": "string" }));
                props.insert("summary".to_string(), summary_property());
                (
                    "propose_update_species",
                    "Ask the user to approve changes to a species found by common name.",
                    ToolEffect::ProposeMutation,
                    json!({ "type": "object", "properties": props, "required": ["name"] }),
                )
            }
            SpeciesOp::ProposeDelete => (
                "propose_delete_species",
                "Ask the user to approve deleting a species found by common name.",
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
            SpeciesOp::List => self.list().await,
            SpeciesOp::Find => self.find(&arguments).await,
            SpeciesOp::ProposeCreate => self.propose_create(ctx, &arguments).await,
            SpeciesOp::ProposeUpdate => self.propose_update(ctx, &arguments).await,
            SpeciesOp::ProposeDelete => self.propose_delete(ctx, &arguments).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::OwnerId;
    use crate::records::SqliteRecordStore;

    struct Fixture {
        store: Arc<dyn RecordStore>,
        queue: Arc<ConfirmationQueue>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(SqliteRecordStore::open_in_memory().expect("store")),
                queue: Arc::new(ConfirmationQueue::new()),
            }
        }

        fn tool(&self, op: SpeciesOp) -> SpeciesTool {
            SpeciesTool::new(op, self.store.clone(), self.queue.clone())
        }
    }

    fn owner_ctx() -> ToolContext {
        ToolContext::for_owner(OwnerId::new("u1"))
    }

    #[tokio::test]
    async fn propose_create_queues_without_writing() {
        let fx = Fixture::new();
        let result = fx
            .tool(SpeciesOp::ProposeCreate)
            .execute(
                &owner_ctx(),
                json!({
                    "name": "Chinese elm",
                    "scientific_name": "ulmus PARVIFOLIA",
                    "watering": "keep moist",
                    "sources": ["https://example.org/elm"]
                }),
            )
            .await
            .expect("execute");
        assert_eq!(result["status"], "pending_confirmation");
        assert_eq!(result["summary"], "create species Chinese elm");
        assert!(fx.store.list_species().await.expect("list").is_empty());

        let pending = fx.queue.list_pending(&OwnerId::new("u1"));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id().as_str(), result["confirmation_id"]);
        let Mutation::CreateSpecies(new) = pending[0].mutation() else {
            panic!("unexpected mutation {:?}", pending[0].mutation());
        };
        assert_eq!(new.scientific_name.as_deref(), Some("Ulmus parvifolia"));
        assert_eq!(new.care_guide["watering"], "keep moist");
    }

    #[tokio::test]
    async fn proposals_require_an_owner() {
        let fx = Fixture::new();
        let result = fx
            .tool(SpeciesOp::ProposeCreate)
            .execute(
                &ToolContext::detached(),
                json!({"name": "Elm", "scientific_name": "Ulmus"}),
            )
            .await
            .expect("execute");
        assert_eq!(result, tool_error(OWNER_REQUIRED));
        assert_eq!(fx.queue.tracked_owners(), 0);
    }

    #[tokio::test]
    async fn validation_errors_never_reach_the_queue() {
        let fx = Fixture::new();
        let ctx = owner_ctx();
        let cases = [
            (SpeciesOp::ProposeCreate, json!({"scientific_name": "Ulmus"}), "species_name_required"),
            (SpeciesOp::ProposeCreate, json!({"name": "Elm"}), "scientific_name_required"),
            (SpeciesOp::ProposeUpdate, json!({"name": "Elm"}), "species_update_required"),
            (SpeciesOp::ProposeUpdate, json!({"name": "Elm", "light": "sun"}), "species_not_found"),
            (SpeciesOp::ProposeDelete, json!({"name": "  "}), "species_name_required"),
            (SpeciesOp::ProposeDelete, json!({"name": "Elm"}), "species_not_found"),
        ];
        for (op, args, message) in cases {
            let result = fx.tool(op).execute(&ctx, args).await.expect("execute");
            assert_eq!(result["message"], message, "op {op:?}");
        }
        assert_eq!(fx.queue.tracked_owners(), 0);
    }

    #[tokio::test]
    async fn propose_delete_targets_existing_species_by_id() {
        let fx = Fixture::new();
        let elm = fx
            .store
            .create_species(NewSpecies {
                name: "Elm".to_string(),
                scientific_name: None,
                care_guide: json!({}),
            })
            .await
            .expect("seed");
        let result = fx
            .tool(SpeciesOp::ProposeDelete)
            .execute(&owner_ctx(), json!({"name": "elm", "summary": "Remove the elm"}))
            .await
            .expect("execute");
        assert_eq!(result["summary"], "Remove the elm");
        let command = fx.queue.peek_oldest(&OwnerId::new("u1")).expect("queued");
        assert_eq!(
            command.mutation(),
            &Mutation::DeleteSpecies {
                id: elm.id,
                name: "Elm".to_string()
            }
        );

        let dup = fx
            .tool(SpeciesOp::ProposeCreate)
            .execute(&owner_ctx(), json!({"name": "Elm", "scientific_name": "Ulmus"}))
            .await
            .expect("execute");
        assert_eq!(dup["message"], "species_already_exists");
    }

    #[tokio::test]
    async fn find_searches_without_an_owner() {
        let fx = Fixture::new();
        fx.store
            .create_species(NewSpecies {
                name: "Japanese maple".to_string(),
                scientific_name: Some("Acer palmatum".to_string()),
                care_guide: json!({}),
            })
            .await
            .expect("seed");
        let result = fx
            .tool(SpeciesOp::Find)
            .execute(&ToolContext::detached(), json!({"name": "acer"}))
            .await
            .expect("execute");
        assert_eq!(result["species"][0]["name"], "Japanese maple");
    }

    #[test]
    fn scientific_names_are_normalized() {
        assert_eq!(normalize_scientific_name("  juniperus   CHINENSIS "), "Juniperus chinensis");
        assert_eq!(normalize_scientific_name(""), "");
    }

    #[test]
    fn every_op_has_a_distinct_valid_name() {
        let fx = Fixture::new();
        let mut names: Vec<_> = SpeciesOp::ALL.iter().map(|op| fx.tool(*op).spec().name).collect();
        for name in &names {
            sensei_llm::validate_tool_name(name).expect("valid tool name");
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SpeciesOp::ALL.len());
    }
}
