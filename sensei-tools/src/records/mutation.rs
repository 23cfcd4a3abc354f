use super::store::{RecordStore, Result, StoreError};
use super::{
    FertilizerUpdate, NewFertilizer, NewSpecies, NewSpecimen, NewTreatment, RecordId,
    SpeciesUpdate, SpecimenUpdate, TreatmentUpdate,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Species,
    Specimen,
    Fertilizer,
    Treatment,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Species => "species",
            Self::Specimen => "specimen",
            Self::Fertilizer => "fertilizer",
            Self::Treatment => "treatment",
        })
    }
}

/// A write held back until a human approves it.
///
/// Each variant carries everything needed to perform the write later; names
/// on update/delete variants are for display only, ids are authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mutation {
    CreateSpecies(NewSpecies),
    UpdateSpecies {
        id: RecordId,
        name: String,
        update: SpeciesUpdate,
    },
    DeleteSpecies {
        id: RecordId,
        name: String,
    },
    CreateSpecimen(NewSpecimen),
    UpdateSpecimen {
        id: RecordId,
        name: String,
        update: SpecimenUpdate,
    },
    DeleteSpecimen {
        id: RecordId,
        name: String,
    },
    CreateFertilizer(NewFertilizer),
    UpdateFertilizer {
        name: String,
        update: FertilizerUpdate,
    },
    DeleteFertilizer {
        name: String,
    },
    CreateTreatment(NewTreatment),
    UpdateTreatment {
        name: String,
        update: TreatmentUpdate,
    },
    DeleteTreatment {
        name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MutationOutcome {
    Created {
        kind: RecordKind,
        record: serde_json::Value,
    },
    Updated {
        kind: RecordKind,
        record: serde_json::Value,
    },
    Deleted {
        kind: RecordKind,
        target: String,
    },
    /// The target disappeared between proposal and approval.
    NotFound {
        kind: RecordKind,
        target: String,
    },
}

impl MutationOutcome {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl Mutation {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::CreateSpecies(_) | Self::UpdateSpecies { .. } | Self::DeleteSpecies { .. } => {
                RecordKind::Species
            }
            Self::CreateSpecimen(_) | Self::UpdateSpecimen { .. } | Self::DeleteSpecimen { .. } => {
                RecordKind::Specimen
            }
            Self::CreateFertilizer(_)
            | Self::UpdateFertilizer { .. }
            | Self::DeleteFertilizer { .. } => RecordKind::Fertilizer,
            Self::CreateTreatment(_)
            | Self::UpdateTreatment { .. }
            | Self::DeleteTreatment { .. } => RecordKind::Treatment,
        }
    }

    /// Default human-readable summary, e.g. `delete species Elm`.
    pub fn describe(&self) -> String {
        let kind = self.kind();
        match self {
            Self::CreateSpecies(new) => format!("create {kind} {}", new.name),
            Self::CreateSpecimen(new) => format!("create {kind} {}", new.name),
            Self::CreateFertilizer(new) => format!("create {kind} {}", new.name),
            Self::CreateTreatment(new) => format!("create {kind} {}", new.name),
            Self::UpdateSpecies { name, .. }
            | Self::UpdateSpecimen { name, .. }
            | Self::UpdateFertilizer { name, .. }
            | Self::UpdateTreatment { name, .. } => format!("update {kind} {name}"),
            Self::DeleteSpecies { name, .. }
            | Self::DeleteSpecimen { name, .. }
            | Self::DeleteFertilizer { name }
            | Self::DeleteTreatment { name } => format!("delete {kind} {name}"),
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(kind = %self.kind()))]
    pub async fn apply(&self, store: &dyn RecordStore) -> Result<MutationOutcome> {
        let kind = self.kind();
        let outcome = match self {
            Self::CreateSpecies(new) => created(kind, store.create_species(new.clone()).await?)?,
            Self::CreateSpecimen(new) => created(kind, store.create_specimen(new.clone()).await?)?,
            Self::CreateFertilizer(new) => {
                created(kind, store.create_fertilizer(new.clone()).await?)?
            }
            Self::CreateTreatment(new) => {
                created(kind, store.create_treatment(new.clone()).await?)?
            }
            Self::UpdateSpecies { id, name, update } => updated(
                kind,
                name,
                store.update_species(*id, update.clone()).await?,
            )?,
            Self::UpdateSpecimen { id, name, update } => updated(
                kind,
                name,
                store.update_specimen(*id, update.clone()).await?,
            )?,
            Self::UpdateFertilizer { name, update } => updated(
                kind,
                name,
                store.update_fertilizer(name, update.clone()).await?,
            )?,
            Self::UpdateTreatment { name, update } => updated(
                kind,
                name,
                store.update_treatment(name, update.clone()).await?,
            )?,
            Self::DeleteSpecies { id, name } => {
                deleted(kind, name, store.delete_species(*id).await?)
            }
            Self::DeleteSpecimen { id, name } => {
                deleted(kind, name, store.delete_specimen(*id).await?)
            }
            Self::DeleteFertilizer { name } => {
                deleted(kind, name, store.delete_fertilizer(name).await?)
            }
            Self::DeleteTreatment { name } => {
                deleted(kind, name, store.delete_treatment(name).await?)
            }
        };
        if outcome.is_not_found() {
            tracing::warn!(summary = %self.describe(), "mutation target no longer exists");
        }
        Ok(outcome)
    }
}

fn record_value<T: Serialize>(record: &T) -> Result<serde_json::Value> {
    serde_json::to_value(record).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn created<T: Serialize>(kind: RecordKind, record: T) -> Result<MutationOutcome> {
    Ok(MutationOutcome::Created {
        kind,
        record: record_value(&record)?,
    })
}

fn updated<T: Serialize>(
    kind: RecordKind,
    target: &str,
    record: Option<T>,
) -> Result<MutationOutcome> {
    Ok(match record {
        Some(record) => MutationOutcome::Updated {
            kind,
            record: record_value(&record)?,
        },
        None => MutationOutcome::NotFound {
            kind,
            target: target.to_string(),
        },
    })
}

fn deleted(kind: RecordKind, target: &str, removed: bool) -> MutationOutcome {
    let target = target.to_string();
    if removed {
        MutationOutcome::Deleted { kind, target }
    } else {
        MutationOutcome::NotFound { kind, target }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::SqliteRecordStore;
    use serde_json::json;

    #[test]
    fn describe_names_the_action_kind_and_target() {
        let delete = Mutation::DeleteSpecies {
            id: 4,
            name: "Elm".to_string(),
        };
        assert_eq!(delete.describe(), "delete species Elm");
        let create = Mutation::CreateFertilizer(NewFertilizer {
            name: "Biogold".to_string(),
            usage_sheet: String::new(),
            recommended_amount: String::new(),
            sources: vec![],
        });
        assert_eq!(create.describe(), "create fertilizer Biogold");
    }

    #[test]
    fn mutation_serializes_with_kind_tag() {
        let value = serde_json::to_value(Mutation::DeleteTreatment {
            name: "Neem oil".to_string(),
        })
        .expect("serialize");
        assert_eq!(value, json!({"kind": "delete_treatment", "name": "Neem oil"}));
    }

    #[tokio::test]
    async fn apply_create_then_delete() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let outcome = Mutation::CreateSpecies(NewSpecies {
            name: "Juniper".to_string(),
            scientific_name: None,
            care_guide: json!({}),
        })
        .apply(&store)
        .await
        .expect("create");
        let MutationOutcome::Created { kind, record } = outcome else {
            panic!("expected created outcome, got {outcome:?}");
        };
        assert_eq!(kind, RecordKind::Species);
        let id = record["id"].as_i64().expect("id");

        let delete = Mutation::DeleteSpecies {
            id,
            name: "Juniper".to_string(),
        };
        assert_eq!(
            delete.apply(&store).await.expect("delete"),
            MutationOutcome::Deleted {
                kind: RecordKind::Species,
                target: "Juniper".to_string()
            }
        );
        assert!(delete.apply(&store).await.expect("repeat").is_not_found());
    }

    #[tokio::test]
    async fn apply_update_of_missing_target_is_not_found() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let outcome = Mutation::UpdateTreatment {
            name: "Neem oil".to_string(),
            update: TreatmentUpdate {
                recommended_for: Some("spider mites".to_string()),
                ..TreatmentUpdate::default()
            },
        }
        .apply(&store)
        .await
        .expect("apply");
        let value = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(value["status"], "not_found");
        assert_eq!(value["kind"], "treatment");
    }

    #[tokio::test]
    async fn store_constraint_errors_propagate() {
        let store = SqliteRecordStore::open_in_memory().expect("store");
        let err = Mutation::CreateSpecimen(NewSpecimen {
            name: "Orphan".to_string(),
            species_id: 42,
        })
        .apply(&store)
        .await
        .expect_err("unknown species");
        assert!(matches!(err, StoreError::Constraint(_)));
    }
}
