use super::{
    Fertilizer, FertilizerUpdate, NewFertilizer, NewSpecies, NewSpecimen, NewTreatment, RecordId,
    Species, SpeciesUpdate, Specimen, SpecimenUpdate, Treatment, TreatmentUpdate,
};
use async_trait::async_trait;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique or foreign-key violation (duplicate name, unknown species id).
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Persistence for botanical records.
///
/// Updates of a missing record return `Ok(None)`, deletes return `Ok(false)`.
/// Fertilizers and treatments are addressed by their unique name.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_species(&self, new: NewSpecies) -> Result<Species>;
    async fn list_species(&self) -> Result<Vec<Species>>;
    async fn get_species(&self, id: RecordId) -> Result<Option<Species>>;
    async fn get_species_by_name(&self, name: &str) -> Result<Option<Species>>;
    /// Case-insensitive substring match on common or scientific name.
    async fn search_species(&self, query: &str) -> Result<Vec<Species>>;
    async fn update_species(&self, id: RecordId, update: SpeciesUpdate)
    -> Result<Option<Species>>;
    async fn delete_species(&self, id: RecordId) -> Result<bool>;

    async fn create_specimen(&self, new: NewSpecimen) -> Result<Specimen>;
    async fn list_specimens(&self) -> Result<Vec<Specimen>>;
    async fn get_specimen(&self, id: RecordId) -> Result<Option<Specimen>>;
    async fn update_specimen(
        &self,
        id: RecordId,
        update: SpecimenUpdate,
    ) -> Result<Option<Specimen>>;
    async fn delete_specimen(&self, id: RecordId) -> Result<bool>;

    async fn create_fertilizer(&self, new: NewFertilizer) -> Result<Fertilizer>;
    async fn list_fertilizers(&self) -> Result<Vec<Fertilizer>>;
    async fn get_fertilizer(&self, name: &str) -> Result<Option<Fertilizer>>;
    async fn update_fertilizer(
        &self,
        name: &str,
        update: FertilizerUpdate,
    ) -> Result<Option<Fertilizer>>;
    async fn delete_fertilizer(&self, name: &str) -> Result<bool>;

    async fn create_treatment(&self, new: NewTreatment) -> Result<Treatment>;
    async fn list_treatments(&self) -> Result<Vec<Treatment>>;
    async fn get_treatment(&self, name: &str) -> Result<Option<Treatment>>;
    async fn update_treatment(
        &self,
        name: &str,
        update: TreatmentUpdate,
    ) -> Result<Option<Treatment>>;
    async fn delete_treatment(&self, name: &str) -> Result<bool>;
}
