//! Botanical records and their persistence.

mod mutation;
mod sqlite;
mod store;

pub use mutation::{Mutation, MutationOutcome, RecordKind};
pub use sqlite::SqliteRecordStore;
pub use store::{RecordStore, StoreError};

use serde::{Deserialize, Serialize};

pub type RecordId = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: RecordId,
    pub name: String,
    pub scientific_name: Option<String>,
    /// Free-form care guide (watering, light, substrate, pruning...).
    pub care_guide: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSpecies {
    pub name: String,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub care_guide: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub scientific_name: Option<String>,
    #[serde(default)]
    pub care_guide: Option<serde_json::Value>,
}

impl SpeciesUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.scientific_name.is_none() && self.care_guide.is_none()
    }
}

/// A bonsai in the user's collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Specimen {
    pub id: RecordId,
    pub name: String,
    pub species_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSpecimen {
    pub name: String,
    pub species_id: RecordId,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecimenUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub species_id: Option<RecordId>,
}

impl SpecimenUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.species_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fertilizer {
    pub id: RecordId,
    pub name: String,
    pub usage_sheet: String,
    pub recommended_amount: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFertilizer {
    pub name: String,
    #[serde(default)]
    pub usage_sheet: String,
    #[serde(default)]
    pub recommended_amount: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FertilizerUpdate {
    #[serde(default)]
    pub usage_sheet: Option<String>,
    #[serde(default)]
    pub recommended_amount: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl FertilizerUpdate {
    pub fn is_empty(&self) -> bool {
        self.usage_sheet.is_none() && self.recommended_amount.is_none() && self.sources.is_none()
    }
}

/// Phytosanitary product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treatment {
    pub id: RecordId,
    pub name: String,
    pub usage_sheet: String,
    pub recommended_amount: String,
    pub recommended_for: String,
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTreatment {
    pub name: String,
    #[serde(default)]
    pub usage_sheet: String,
    #[serde(default)]
    pub recommended_amount: String,
    #[serde(default)]
    pub recommended_for: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreatmentUpdate {
    #[serde(default)]
    pub usage_sheet: Option<String>,
    #[serde(default)]
    pub recommended_amount: Option<String>,
    #[serde(default)]
    pub recommended_for: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

impl TreatmentUpdate {
    pub fn is_empty(&self) -> bool {
        self.usage_sheet.is_none()
            && self.recommended_amount.is_none()
            && self.recommended_for.is_none()
            && self.sources.is_none()
    }
}
