//! MySQL catalog backend.
//!
//! Term variations are stored as a JSON array in a TEXT column; ids are
//! UUIDv4 strings except the fixed `umdns`/`gmdn` seed system ids. All
//! queries are runtime-bound, no compile-time checking against a live schema.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySqlPool, Row};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::models::{CanonicalTerm, Catalog, NomenclatureSystem, ReferenceDb, ReferenceField};

use super::{default_catalog, CatalogStore, WriteProbe};

pub struct SqlCatalogStore {
    pool: MySqlPool,
}

pub async fn make_pool(cfg: &DatabaseConfig) -> Result<MySqlPool, StoreError> {
    let max_conn: u32 = std::env::var("INV_STANDARDIZER_POOL_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(8);
    let acquire_ms: u64 = std::env::var("INV_STANDARDIZER_ACQUIRE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30_000);

    MySqlPoolOptions::new()
        .max_connections(max_conn)
        .acquire_timeout(Duration::from_millis(acquire_ms))
        .connect(&cfg.to_url())
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))
}

fn qerr(e: sqlx::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

fn encode_variations(variations: &[String]) -> String {
    serde_json::to_string(variations).unwrap_or_else(|_| "[]".to_string())
}

fn decode_variations(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("undecodable variations column ({e}); treating as empty");
        Vec::new()
    })
}

impl SqlCatalogStore {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pool: make_pool(cfg).await?,
        })
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Create the catalog tables if they do not exist.
    pub async fn create_schema(&self) -> Result<(), StoreError> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS nomenclature_systems (
                id VARCHAR(64) NOT NULL PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                description TEXT NOT NULL,
                last_updated DATETIME(6) NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS device_type_terms (
                id VARCHAR(36) NOT NULL PRIMARY KEY,
                system_id VARCHAR(64) NOT NULL,
                standard VARCHAR(255) NOT NULL,
                variations TEXT NOT NULL,
                INDEX idx_dtt_system (system_id),
                INDEX idx_dtt_standard (standard)
            )",
            "CREATE TABLE IF NOT EXISTS reference_terms (
                id VARCHAR(36) NOT NULL PRIMARY KEY,
                field VARCHAR(16) NOT NULL,
                standard VARCHAR(255) NOT NULL,
                variations TEXT NOT NULL,
                INDEX idx_rt_field (field),
                INDEX idx_rt_standard (standard)
            )",
        ];
        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await.map_err(qerr)?;
        }
        info!("catalog schema ensured");
        Ok(())
    }

    async fn touch_system(&self, system_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE nomenclature_systems SET last_updated = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(system_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        Ok(())
    }

    async fn device_term_row(
        &self,
        term_id: &str,
    ) -> Result<(String, String, Vec<String>), StoreError> {
        let row = sqlx::query(
            "SELECT system_id, standard, variations FROM device_type_terms WHERE id = ?",
        )
        .bind(term_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(qerr)?
        .ok_or_else(|| StoreError::NotFound {
            what: "device type term",
            id: term_id.to_string(),
        })?;
        let system_id: String = row.try_get("system_id").map_err(qerr)?;
        let standard: String = row.try_get("standard").map_err(qerr)?;
        let variations: String = row.try_get("variations").map_err(qerr)?;
        Ok((system_id, standard, decode_variations(&variations)))
    }

    async fn reference_term_row(&self, term_id: &str) -> Result<Vec<String>, StoreError> {
        let row = sqlx::query("SELECT variations FROM reference_terms WHERE id = ?")
            .bind(term_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(qerr)?
            .ok_or_else(|| StoreError::NotFound {
                what: "reference term",
                id: term_id.to_string(),
            })?;
        let variations: String = row.try_get("variations").map_err(qerr)?;
        Ok(decode_variations(&variations))
    }
}

#[async_trait]
impl CatalogStore for SqlCatalogStore {
    async fn load_catalog(&self) -> Result<Catalog, StoreError> {
        let system_rows = sqlx::query(
            "SELECT id, name, description, last_updated FROM nomenclature_systems ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(qerr)?;

        let mut systems = Vec::with_capacity(system_rows.len());
        for row in system_rows {
            let id: String = row.try_get("id").map_err(qerr)?;
            let name: String = row.try_get("name").map_err(qerr)?;
            let description: String = row.try_get("description").map_err(qerr)?;
            let last_updated: DateTime<Utc> = row.try_get("last_updated").map_err(qerr)?;
            systems.push(NomenclatureSystem {
                id,
                name,
                description,
                last_updated,
                device_type_terms: Vec::new(),
            });
        }

        let term_rows = sqlx::query(
            "SELECT id, system_id, standard, variations FROM device_type_terms ORDER BY standard",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(qerr)?;
        for row in term_rows {
            let system_id: String = row.try_get("system_id").map_err(qerr)?;
            let term = CanonicalTerm {
                id: row.try_get("id").map_err(qerr)?,
                standard: row.try_get("standard").map_err(qerr)?,
                variations: decode_variations(&row.try_get::<String, _>("variations").map_err(qerr)?),
            };
            if let Some(system) = systems.iter_mut().find(|s| s.id == system_id) {
                system.device_type_terms.push(term);
            } else {
                warn!("device type term {} references unknown system {}", term.id, system_id);
            }
        }

        let mut reference_db = ReferenceDb::default();
        let ref_rows = sqlx::query(
            "SELECT id, field, standard, variations FROM reference_terms ORDER BY standard",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(qerr)?;
        for row in ref_rows {
            let field: String = row.try_get("field").map_err(qerr)?;
            let term = CanonicalTerm {
                id: row.try_get("id").map_err(qerr)?,
                standard: row.try_get("standard").map_err(qerr)?,
                variations: decode_variations(&row.try_get::<String, _>("variations").map_err(qerr)?),
            };
            match field.as_str() {
                "Manufacturer" => reference_db.manufacturer.push(term),
                "Model" => reference_db.model.push(term),
                other => warn!("reference term {} has unknown field '{}'", term.id, other),
            }
        }

        Ok(Catalog {
            nomenclature_systems: systems,
            reference_db,
        })
    }

    async fn upsert_device_type_term(
        &self,
        system_id: &str,
        standard: &str,
        variation: Option<&str>,
    ) -> Result<String, StoreError> {
        let exists =
            sqlx::query("SELECT id FROM nomenclature_systems WHERE id = ?")
                .bind(system_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(qerr)?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                what: "nomenclature system",
                id: system_id.to_string(),
            });
        }

        let existing = sqlx::query(
            "SELECT id, variations FROM device_type_terms WHERE system_id = ? AND standard = ?",
        )
        .bind(system_id)
        .bind(standard)
        .fetch_optional(&self.pool)
        .await
        .map_err(qerr)?;

        if let Some(row) = existing {
            let id: String = row.try_get("id").map_err(qerr)?;
            if let Some(v) = variation {
                let mut variations =
                    decode_variations(&row.try_get::<String, _>("variations").map_err(qerr)?);
                if !variations.iter().any(|x| x == v) {
                    variations.push(v.to_string());
                    sqlx::query("UPDATE device_type_terms SET variations = ? WHERE id = ?")
                        .bind(encode_variations(&variations))
                        .bind(&id)
                        .execute(&self.pool)
                        .await
                        .map_err(qerr)?;
                    self.touch_system(system_id).await?;
                }
            }
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        let variations: Vec<String> = variation.map(|v| vec![v.to_string()]).unwrap_or_default();
        sqlx::query(
            "INSERT INTO device_type_terms (id, system_id, standard, variations) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(system_id)
        .bind(standard)
        .bind(encode_variations(&variations))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        self.touch_system(system_id).await?;
        Ok(id)
    }

    async fn append_variation_to_device_type(
        &self,
        term_id: &str,
        variation: &str,
    ) -> Result<(), StoreError> {
        let (system_id, _, mut variations) = self.device_term_row(term_id).await?;
        if variations.iter().any(|v| v == variation) {
            return Ok(());
        }
        variations.push(variation.to_string());
        sqlx::query("UPDATE device_type_terms SET variations = ? WHERE id = ?")
            .bind(encode_variations(&variations))
            .bind(term_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        self.touch_system(&system_id).await
    }

    async fn upsert_reference_term(
        &self,
        field: ReferenceField,
        standard: &str,
        variation: Option<&str>,
    ) -> Result<String, StoreError> {
        let existing = sqlx::query(
            "SELECT id, variations FROM reference_terms WHERE field = ? AND standard = ?",
        )
        .bind(field.as_str())
        .bind(standard)
        .fetch_optional(&self.pool)
        .await
        .map_err(qerr)?;

        if let Some(row) = existing {
            let id: String = row.try_get("id").map_err(qerr)?;
            if let Some(v) = variation {
                let mut variations =
                    decode_variations(&row.try_get::<String, _>("variations").map_err(qerr)?);
                if !variations.iter().any(|x| x == v) {
                    variations.push(v.to_string());
                    sqlx::query("UPDATE reference_terms SET variations = ? WHERE id = ?")
                        .bind(encode_variations(&variations))
                        .bind(&id)
                        .execute(&self.pool)
                        .await
                        .map_err(qerr)?;
                }
            }
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        let variations: Vec<String> = variation.map(|v| vec![v.to_string()]).unwrap_or_default();
        sqlx::query(
            "INSERT INTO reference_terms (id, field, standard, variations) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(field.as_str())
        .bind(standard)
        .bind(encode_variations(&variations))
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(id)
    }

    async fn append_variation_to_reference(
        &self,
        term_id: &str,
        variation: &str,
    ) -> Result<(), StoreError> {
        let mut variations = self.reference_term_row(term_id).await?;
        if variations.iter().any(|v| v == variation) {
            return Ok(());
        }
        variations.push(variation.to_string());
        sqlx::query("UPDATE reference_terms SET variations = ? WHERE id = ?")
            .bind(encode_variations(&variations))
            .bind(term_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        Ok(())
    }

    async fn update_device_type_term(
        &self,
        term_id: &str,
        standard: &str,
        variations: &[String],
    ) -> Result<(), StoreError> {
        let (system_id, _, _) = self.device_term_row(term_id).await?;
        sqlx::query("UPDATE device_type_terms SET standard = ?, variations = ? WHERE id = ?")
            .bind(standard)
            .bind(encode_variations(variations))
            .bind(term_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        self.touch_system(&system_id).await
    }

    async fn update_reference_term(
        &self,
        term_id: &str,
        standard: &str,
        variations: &[String],
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE reference_terms SET standard = ?, variations = ? WHERE id = ?")
                .bind(standard)
                .bind(encode_variations(variations))
                .bind(term_id)
                .execute(&self.pool)
                .await
                .map_err(qerr)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: "reference term",
                id: term_id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_device_type_term(&self, term_id: &str) -> Result<(), StoreError> {
        let (system_id, _, _) = self.device_term_row(term_id).await?;
        sqlx::query("DELETE FROM device_type_terms WHERE id = ?")
            .bind(term_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        self.touch_system(&system_id).await
    }

    async fn delete_reference_term(&self, term_id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM reference_terms WHERE id = ?")
            .bind(term_id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: "reference term",
                id: term_id.to_string(),
            });
        }
        Ok(())
    }

    async fn create_system(
        &self,
        name: &str,
        description: &str,
    ) -> Result<NomenclatureSystem, StoreError> {
        let system = NomenclatureSystem {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.to_string(),
            last_updated: Utc::now(),
            device_type_terms: Vec::new(),
        };
        sqlx::query(
            "INSERT INTO nomenclature_systems (id, name, description, last_updated) VALUES (?, ?, ?, ?)",
        )
        .bind(&system.id)
        .bind(&system.name)
        .bind(&system.description)
        .bind(system.last_updated)
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        Ok(system)
    }

    async fn update_system(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE nomenclature_systems SET name = ?, description = ?, last_updated = ? WHERE id = ?",
        )
        .bind(name)
        .bind(description)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(qerr)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: "nomenclature system",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_system(&self, id: &str) -> Result<(), StoreError> {
        // Terms first; there is no FK cascade in the schema.
        sqlx::query("DELETE FROM device_type_terms WHERE system_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        let result = sqlx::query("DELETE FROM nomenclature_systems WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                what: "nomenclature system",
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn seed_default_data(&self) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM nomenclature_systems")
            .fetch_one(&self.pool)
            .await
            .map_err(qerr)?;
        let count: i64 = row.try_get("n").map_err(qerr)?;
        if count > 0 {
            return Ok(());
        }

        let seed = default_catalog();
        for system in &seed.nomenclature_systems {
            sqlx::query(
                "INSERT INTO nomenclature_systems (id, name, description, last_updated) VALUES (?, ?, ?, ?)",
            )
            .bind(&system.id)
            .bind(&system.name)
            .bind(&system.description)
            .bind(system.last_updated)
            .execute(&self.pool)
            .await
            .map_err(qerr)?;
            for term in &system.device_type_terms {
                sqlx::query(
                    "INSERT INTO device_type_terms (id, system_id, standard, variations) VALUES (?, ?, ?, ?)",
                )
                .bind(&term.id)
                .bind(&system.id)
                .bind(&term.standard)
                .bind(encode_variations(&term.variations))
                .execute(&self.pool)
                .await
                .map_err(qerr)?;
            }
        }
        for field in ReferenceField::ALL {
            for term in seed.reference_db.terms(field) {
                sqlx::query(
                    "INSERT INTO reference_terms (id, field, standard, variations) VALUES (?, ?, ?, ?)",
                )
                .bind(&term.id)
                .bind(field.as_str())
                .bind(&term.standard)
                .bind(encode_variations(&term.variations))
                .execute(&self.pool)
                .await
                .map_err(qerr)?;
            }
        }
        info!("seeded default catalog data");
        Ok(())
    }

    async fn can_write(&self) -> WriteProbe {
        let probe = sqlx::query("SELECT id FROM nomenclature_systems LIMIT 1")
            .fetch_optional(&self.pool)
            .await;
        match probe {
            Ok(_) => WriteProbe {
                can_write: true,
                error: None,
            },
            Err(e) => WriteProbe {
                can_write: false,
                error: Some(e.to_string()),
            },
        }
    }
}
