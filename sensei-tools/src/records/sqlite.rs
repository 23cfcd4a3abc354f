use super::store::{RecordStore, Result, StoreError};
use super::{
    Fertilizer, FertilizerUpdate, NewFertilizer, NewSpecies, NewSpecimen, NewTreatment, RecordId,
    Species, SpeciesUpdate, Specimen, SpecimenUpdate, Treatment, TreatmentUpdate,
};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS species (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE COLLATE NOCASE,
  scientific_name TEXT,
  care_guide TEXT NOT NULL DEFAULT 'null'
);
CREATE TABLE IF NOT EXISTS specimens (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  species_id INTEGER NOT NULL REFERENCES species(id)
);
CREATE TABLE IF NOT EXISTS fertilizers (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE COLLATE NOCASE,
  usage_sheet TEXT NOT NULL DEFAULT '',
  recommended_amount TEXT NOT NULL DEFAULT '',
  sources TEXT NOT NULL DEFAULT '[]'
);
CREATE TABLE IF NOT EXISTS treatments (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL UNIQUE COLLATE NOCASE,
  usage_sheet TEXT NOT NULL DEFAULT '',
  recommended_amount TEXT NOT NULL DEFAULT '',
  recommended_for TEXT NOT NULL DEFAULT '',
  sources TEXT NOT NULL DEFAULT '[]'
);
"#;

const SPECIES_COLUMNS: &str = "id, name, scientific_name, care_guide";
const SPECIMEN_COLUMNS: &str = "id, name, species_id";
const FERTILIZER_COLUMNS: &str = "id, name, usage_sheet, recommended_amount, sources";
const TREATMENT_COLUMNS: &str =
    "id, name, usage_sheet, recommended_amount, recommended_for, sources";

/// SQLite-backed record store.
///
/// A single connection sits behind a mutex; every statement runs on the
/// blocking pool so the async executor never waits on disk I/O.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(format!("create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| StoreError::Database(format!("open {}: {e}", path.display())))?;
        conn.busy_timeout(Duration::from_millis(1000))
            .map_err(map_db_err)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_db_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_db_err)?;
        conn.execute_batch(SCHEMA).map_err(map_db_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Database(format!("store task join error: {e}")))?
    }
}

fn map_db_err(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Constraint(e.to_string())
        }
        rusqlite::Error::FromSqlConversionFailure(..) => StoreError::Corrupt(e.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn species_row(row: &Row<'_>) -> rusqlite::Result<Species> {
    Ok(Species {
        id: row.get(0)?,
        name: row.get(1)?,
        scientific_name: row.get(2)?,
        care_guide: json_column(row, 3)?,
    })
}

fn specimen_row(row: &Row<'_>) -> rusqlite::Result<Specimen> {
    Ok(Specimen {
        id: row.get(0)?,
        name: row.get(1)?,
        species_id: row.get(2)?,
    })
}

fn fertilizer_row(row: &Row<'_>) -> rusqlite::Result<Fertilizer> {
    Ok(Fertilizer {
        id: row.get(0)?,
        name: row.get(1)?,
        usage_sheet: row.get(2)?,
        recommended_amount: row.get(3)?,
        sources: json_column(row, 4)?,
    })
}

fn treatment_row(row: &Row<'_>) -> rusqlite::Result<Treatment> {
    Ok(Treatment {
        id: row.get(0)?,
        name: row.get(1)?,
        usage_sheet: row.get(2)?,
        recommended_amount: row.get(3)?,
        recommended_for: row.get(4)?,
        sources: json_column(row, 5)?,
    })
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare_cached(sql).map_err(map_db_err)?;
    let rows = stmt.query_map(params, map).map_err(map_db_err)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.map_err(map_db_err)?);
    }
    Ok(out)
}

fn query_one<T>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    conn.query_row(sql, params, map)
        .optional()
        .map_err(map_db_err)
}

fn load_species(conn: &Connection, id: RecordId) -> Result<Option<Species>> {
    query_one(
        conn,
        &format!("SELECT {SPECIES_COLUMNS} FROM species WHERE id = ?1"),
        params![id],
        species_row,
    )
}

fn load_specimen(conn: &Connection, id: RecordId) -> Result<Option<Specimen>> {
    query_one(
        conn,
        &format!("SELECT {SPECIMEN_COLUMNS} FROM specimens WHERE id = ?1"),
        params![id],
        specimen_row,
    )
}

fn load_fertilizer(conn: &Connection, name: &str) -> Result<Option<Fertilizer>> {
    query_one(
        conn,
        &format!("SELECT {FERTILIZER_COLUMNS} FROM fertilizers WHERE name = ?1"),
        params![name],
        fertilizer_row,
    )
}

fn load_treatment(conn: &Connection, name: &str) -> Result<Option<Treatment>> {
    query_one(
        conn,
        &format!("SELECT {TREATMENT_COLUMNS} FROM treatments WHERE name = ?1"),
        params![name],
        treatment_row,
    )
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    #[tracing::instrument(level = "debug", skip_all, fields(name = %new.name))]
    async fn create_species(&self, new: NewSpecies) -> Result<Species> {
        self.run(move |conn| {
            let care_guide = to_json(&new.care_guide)?;
            conn.execute(
                "INSERT INTO species (name, scientific_name, care_guide) VALUES (?1, ?2, ?3)",
                params![new.name, new.scientific_name, care_guide],
            )
            .map_err(map_db_err)?;
            Ok(Species {
                id: conn.last_insert_rowid(),
                name: new.name,
                scientific_name: new.scientific_name,
                care_guide: new.care_guide,
            })
        })
        .await
    }

    async fn list_species(&self) -> Result<Vec<Species>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {SPECIES_COLUMNS} FROM species ORDER BY name"),
                [],
                species_row,
            )
        })
        .await
    }

    async fn get_species(&self, id: RecordId) -> Result<Option<Species>> {
        self.run(move |conn| load_species(conn, id)).await
    }

    async fn get_species_by_name(&self, name: &str) -> Result<Option<Species>> {
        let name = name.to_string();
        self.run(move |conn| {
            query_one(
                conn,
                &format!("SELECT {SPECIES_COLUMNS} FROM species WHERE name = ?1"),
                params![name],
                species_row,
            )
        })
        .await
    }

    async fn search_species(&self, query: &str) -> Result<Vec<Species>> {
        let pattern = like_pattern(query.trim());
        self.run(move |conn| {
            query_all(
                conn,
                &format!(
                    "SELECT {SPECIES_COLUMNS} FROM species \
                     WHERE name LIKE ?1 ESCAPE '\\' OR scientific_name LIKE ?1 ESCAPE '\\' \
                     ORDER BY name"
                ),
                params![pattern],
                species_row,
            )
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self, update))]
    async fn update_species(
        &self,
        id: RecordId,
        update: SpeciesUpdate,
    ) -> Result<Option<Species>> {
        self.run(move |conn| {
            let Some(mut species) = load_species(conn, id)? else {
                return Ok(None);
            };
            if let Some(name) = update.name {
                species.name = name;
            }
            if let Some(scientific_name) = update.scientific_name {
                species.scientific_name = Some(scientific_name);
            }
            if let Some(care_guide) = update.care_guide {
                species.care_guide = care_guide;
            }
            conn.execute(
                "UPDATE species SET name = ?1, scientific_name = ?2, care_guide = ?3 WHERE id = ?4",
                params![
                    species.name,
                    species.scientific_name,
                    to_json(&species.care_guide)?,
                    id
                ],
            )
            .map_err(map_db_err)?;
            Ok(Some(species))
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_species(&self, id: RecordId) -> Result<bool> {
        self.run(move |conn| {
            let n = conn
                .execute("DELETE FROM species WHERE id = ?1", params![id])
                .map_err(map_db_err)?;
            Ok(n > 0)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(name = %new.name))]
    async fn create_specimen(&self, new: NewSpecimen) -> Result<Specimen> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO specimens (name, species_id) VALUES (?1, ?2)",
                params![new.name, new.species_id],
            )
            .map_err(map_db_err)?;
            Ok(Specimen {
                id: conn.last_insert_rowid(),
                name: new.name,
                species_id: new.species_id,
            })
        })
        .await
    }

    async fn list_specimens(&self) -> Result<Vec<Specimen>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {SPECIMEN_COLUMNS} FROM specimens ORDER BY id"),
                [],
                specimen_row,
            )
        })
        .await
    }

    async fn get_specimen(&self, id: RecordId) -> Result<Option<Specimen>> {
        self.run(move |conn| load_specimen(conn, id)).await
    }

    #[tracing::instrument(level = "debug", skip(self, update))]
    async fn update_specimen(
        &self,
        id: RecordId,
        update: SpecimenUpdate,
    ) -> Result<Option<Specimen>> {
        self.run(move |conn| {
            let Some(mut specimen) = load_specimen(conn, id)? else {
                return Ok(None);
            };
            if let Some(name) = update.name {
                specimen.name = name;
            }
            if let Some(species_id) = update.species_id {
                specimen.species_id = species_id;
            }
            conn.execute(
                "UPDATE specimens SET name = ?1, species_id = ?2 WHERE id = ?3",
                params![specimen.name, specimen.species_id, id],
            )
            .map_err(map_db_err)?;
            Ok(Some(specimen))
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_specimen(&self, id: RecordId) -> Result<bool> {
        self.run(move |conn| {
            let n = conn
                .execute("DELETE FROM specimens WHERE id = ?1", params![id])
                .map_err(map_db_err)?;
            Ok(n > 0)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(name = %new.name))]
    async fn create_fertilizer(&self, new: NewFertilizer) -> Result<Fertilizer> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO fertilizers (name, usage_sheet, recommended_amount, sources) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    new.name,
                    new.usage_sheet,
                    new.recommended_amount,
                    to_json(&new.sources)?
                ],
            )
            .map_err(map_db_err)?;
            Ok(Fertilizer {
                id: conn.last_insert_rowid(),
                name: new.name,
                usage_sheet: new.usage_sheet,
                recommended_amount: new.recommended_amount,
                sources: new.sources,
            })
        })
        .await
    }

    async fn list_fertilizers(&self) -> Result<Vec<Fertilizer>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {FERTILIZER_COLUMNS} FROM fertilizers ORDER BY name"),
                [],
                fertilizer_row,
            )
        })
        .await
    }

    async fn get_fertilizer(&self, name: &str) -> Result<Option<Fertilizer>> {
        let name = name.to_string();
        self.run(move |conn| load_fertilizer(conn, &name)).await
    }

    #[tracing::instrument(level = "debug", skip(self, update))]
    async fn update_fertilizer(
        &self,
        name: &str,
        update: FertilizerUpdate,
    ) -> Result<Option<Fertilizer>> {
        let name = name.to_string();
        self.run(move |conn| {
            let Some(mut fertilizer) = load_fertilizer(conn, &name)? else {
                return Ok(None);
            };
            if let Some(usage_sheet) = update.usage_sheet {
                fertilizer.usage_sheet = usage_sheet;
            }
            if let Some(recommended_amount) = update.recommended_amount {
                fertilizer.recommended_amount = recommended_amount;
            }
            if let Some(sources) = update.sources {
                fertilizer.sources = sources;
            }
            conn.execute(
                "UPDATE fertilizers SET usage_sheet = ?1, recommended_amount = ?2, sources = ?3 \
                 WHERE id = ?4",
                params![
                    fertilizer.usage_sheet,
                    fertilizer.recommended_amount,
                    to_json(&fertilizer.sources)?,
                    fertilizer.id
                ],
            )
            .map_err(map_db_err)?;
            Ok(Some(fertilizer))
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_fertilizer(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.run(move |conn| {
            let n = conn
                .execute("DELETE FROM fertilizers WHERE name = ?1", params![name])
                .map_err(map_db_err)?;
            Ok(n > 0)
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(name = %new.name))]
    async fn create_treatment(&self, new: NewTreatment) -> Result<Treatment> {
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO treatments \
                 (name, usage_sheet, recommended_amount, recommended_for, sources) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    new.name,
                    new.usage_sheet,
                    new.recommended_amount,
                    new.recommended_for,
                    to_json(&new.sources)?
                ],
            )
            .map_err(map_db_err)?;
            Ok(Treatment {
                id: conn.last_insert_rowid(),
                name: new.name,
                usage_sheet: new.usage_sheet,
                recommended_amount: new.recommended_amount,
                recommended_for: new.recommended_for,
                sources: new.sources,
            })
        })
        .await
    }

    async fn list_treatments(&self) -> Result<Vec<Treatment>> {
        self.run(|conn| {
            query_all(
                conn,
                &format!("SELECT {TREATMENT_COLUMNS} FROM treatments ORDER BY name"),
                [],
                treatment_row,
            )
        })
        .await
    }

    async fn get_treatment(&self, name: &str) -> Result<Option<Treatment>> {
        let name = name.to_string();
        self.run(move |conn| load_treatment(conn, &name)).await
    }

    #[tracing::instrument(level = "debug", skip(self, update))]
    async fn update_treatment(
        &self,
        name: &str,
        update: TreatmentUpdate,
    ) -> Result<Option<Treatment>> {
        let name = name.to_string();
        self.run(move |conn| {
            let Some(mut treatment) = load_treatment(conn, &name)? else {
                return Ok(None);
            };
            if let Some(usage_sheet) = update.usage_sheet {
                treatment.usage_sheet = usage_sheet;
            }
            if let Some(recommended_amount) = update.recommended_amount {
                treatment.recommended_amount = recommended_amount;
            }
            if let Some(recommended_for) = update.recommended_for {
                treatment.recommended_for = recommended_for;
            }
            if let Some(sources) = update.sources {
                treatment.sources = sources;
            }
            conn.execute(
                "UPDATE treatments SET usage_sheet = ?1, recommended_amount = ?2, \
                 recommended_for = ?3, sources = ?4 WHERE id = ?5",
                params![
                    treatment.usage_sheet,
                    treatment.recommended_amount,
                    treatment.recommended_for,
                    to_json(&treatment.sources)?,
                    treatment.id
                ],
            )
            .map_err(map_db_err)?;
            Ok(Some(treatment))
        })
        .await
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete_treatment(&self, name: &str) -> Result<bool> {
        let name = name.to_string();
        self.run(move |conn| {
            let n = conn
                .execute("DELETE FROM treatments WHERE name = ?1", params![name])
                .map_err(map_db_err)?;
            Ok(n > 0)
        })
        .await
    }
}
