//! In-memory catalog backend. Used when database credentials are absent
//! (degraded mode, no persistence across runs) and as the test fixture.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{CanonicalTerm, Catalog, NomenclatureSystem, ReferenceField};

use super::{default_catalog, CatalogStore, WriteProbe};

pub struct MemoryCatalogStore {
    state: Mutex<Catalog>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(Catalog::default()),
        }
    }

    /// A store pre-populated with the default catalog.
    pub fn seeded() -> Self {
        Self {
            state: Mutex::new(default_catalog()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Catalog> {
        // A poisoned lock only means a panicking test; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn not_found(what: &'static str, id: &str) -> StoreError {
        StoreError::NotFound {
            what,
            id: id.to_string(),
        }
    }
}

impl Default for MemoryCatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn append_if_absent(term: &mut CanonicalTerm, variation: &str) -> bool {
    if term.variations.iter().any(|v| v == variation) {
        false
    } else {
        term.variations.push(variation.to_string());
        true
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn load_catalog(&self) -> Result<Catalog, StoreError> {
        Ok(self.lock().clone())
    }

    async fn upsert_device_type_term(
        &self,
        system_id: &str,
        standard: &str,
        variation: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut state = self.lock();
        let system = state
            .system_mut(system_id)
            .ok_or_else(|| Self::not_found("nomenclature system", system_id))?;

        if let Some(term) = system
            .device_type_terms
            .iter_mut()
            .find(|t| t.standard == standard)
        {
            let id = term.id.clone();
            let mut changed = false;
            if let Some(v) = variation {
                changed = append_if_absent(term, v);
            }
            if changed {
                system.last_updated = Utc::now();
            }
            return Ok(id);
        }

        let term = CanonicalTerm {
            id: Uuid::new_v4().to_string(),
            standard: standard.to_string(),
            variations: variation.map(|v| vec![v.to_string()]).unwrap_or_default(),
        };
        let id = term.id.clone();
        system.device_type_terms.push(term);
        system.last_updated = Utc::now();
        Ok(id)
    }

    async fn append_variation_to_device_type(
        &self,
        term_id: &str,
        variation: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let system = state
            .nomenclature_systems
            .iter_mut()
            .find(|s| s.device_type_terms.iter().any(|t| t.id == term_id))
            .ok_or_else(|| Self::not_found("device type term", term_id))?;
        let term = system
            .device_type_terms
            .iter_mut()
            .find(|t| t.id == term_id)
            .ok_or_else(|| Self::not_found("device type term", term_id))?;
        if append_if_absent(term, variation) {
            system.last_updated = Utc::now();
        }
        Ok(())
    }

    async fn upsert_reference_term(
        &self,
        field: ReferenceField,
        standard: &str,
        variation: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut state = self.lock();
        let terms = state.reference_db.terms_mut(field);

        if let Some(term) = terms.iter_mut().find(|t| t.standard == standard) {
            if let Some(v) = variation {
                append_if_absent(term, v);
            }
            return Ok(term.id.clone());
        }

        let term = CanonicalTerm {
            id: Uuid::new_v4().to_string(),
            standard: standard.to_string(),
            variations: variation.map(|v| vec![v.to_string()]).unwrap_or_default(),
        };
        let id = term.id.clone();
        terms.push(term);
        Ok(id)
    }

    async fn append_variation_to_reference(
        &self,
        term_id: &str,
        variation: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        for field in ReferenceField::ALL {
            if let Some(term) = state
                .reference_db
                .terms_mut(field)
                .iter_mut()
                .find(|t| t.id == term_id)
            {
                append_if_absent(term, variation);
                return Ok(());
            }
        }
        Err(Self::not_found("reference term", term_id))
    }

    async fn update_device_type_term(
        &self,
        term_id: &str,
        standard: &str,
        variations: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let system = state
            .nomenclature_systems
            .iter_mut()
            .find(|s| s.device_type_terms.iter().any(|t| t.id == term_id))
            .ok_or_else(|| Self::not_found("device type term", term_id))?;
        let term = system
            .device_type_terms
            .iter_mut()
            .find(|t| t.id == term_id)
            .ok_or_else(|| Self::not_found("device type term", term_id))?;
        term.standard = standard.to_string();
        term.variations = variations.to_vec();
        system.last_updated = Utc::now();
        Ok(())
    }

    async fn update_reference_term(
        &self,
        term_id: &str,
        standard: &str,
        variations: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        for field in ReferenceField::ALL {
            if let Some(term) = state
                .reference_db
                .terms_mut(field)
                .iter_mut()
                .find(|t| t.id == term_id)
            {
                term.standard = standard.to_string();
                term.variations = variations.to_vec();
                return Ok(());
            }
        }
        Err(Self::not_found("reference term", term_id))
    }

    async fn delete_device_type_term(&self, term_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        for system in &mut state.nomenclature_systems {
            let before = system.device_type_terms.len();
            system.device_type_terms.retain(|t| t.id != term_id);
            if system.device_type_terms.len() != before {
                system.last_updated = Utc::now();
                return Ok(());
            }
        }
        Err(Self::not_found("device type term", term_id))
    }

    async fn delete_reference_term(&self, term_id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        for field in ReferenceField::ALL {
            let terms = state.reference_db.terms_mut(field);
            let before = terms.len();
            terms.retain(|t| t.id != term_id);
            if terms.len() != before {
                return Ok(());
            }
        }
        Err(Self::not_found("reference term", term_id))
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
        self.lock().nomenclature_systems.push(system.clone());
        Ok(system)
    }

    async fn update_system(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        let system = state
            .system_mut(id)
            .ok_or_else(|| Self::not_found("nomenclature system", id))?;
        system.name = name.to_string();
        system.description = description.to_string();
        system.last_updated = Utc::now();
        Ok(())
    }

    async fn delete_system(&self, id: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let before = state.nomenclature_systems.len();
        state.nomenclature_systems.retain(|s| s.id != id);
        if state.nomenclature_systems.len() == before {
            return Err(Self::not_found("nomenclature system", id));
        }
        Ok(())
    }

    async fn seed_default_data(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        if !state.nomenclature_systems.is_empty() {
            return Ok(());
        }
        *state = default_catalog();
        Ok(())
    }

    async fn can_write(&self) -> WriteProbe {
        WriteProbe {
            can_write: true,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_by_standard() {
        let store = MemoryCatalogStore::seeded();
        let a = store
            .upsert_device_type_term("umdns", "Infusion Pump", Some("Bomba de Infusion"))
            .await
            .unwrap();
        let b = store
            .upsert_device_type_term("umdns", "Infusion Pump", Some("Bomba de Infusion"))
            .await
            .unwrap();
        assert_eq!(a, b);

        let catalog = store.load_catalog().await.unwrap();
        let term = catalog
            .system("umdns")
            .unwrap()
            .device_type_terms
            .iter()
            .find(|t| t.standard == "Infusion Pump")
            .unwrap();
        assert_eq!(term.variations, vec!["Bomba de Infusion".to_string()]);
    }

    #[tokio::test]
    async fn append_variation_bumps_timestamp_only_on_change() {
        let store = MemoryCatalogStore::seeded();
        let catalog = store.load_catalog().await.unwrap();
        let term_id = catalog.system("gmdn").unwrap().device_type_terms[0]
            .id
            .clone();

        store
            .append_variation_to_device_type(&term_id, "Resp Unit")
            .await
            .unwrap();
        let after_first = store
            .load_catalog()
            .await
            .unwrap()
            .system("gmdn")
            .unwrap()
            .last_updated;

        store
            .append_variation_to_device_type(&term_id, "Resp Unit")
            .await
            .unwrap();
        let after = store.load_catalog().await.unwrap();
        let system = after.system("gmdn").unwrap();
        assert_eq!(system.last_updated, after_first);
        let term = system
            .device_type_terms
            .iter()
            .find(|t| t.id == term_id)
            .unwrap();
        assert_eq!(
            term.variations.iter().filter(|v| *v == "Resp Unit").count(),
            1
        );
    }

    #[tokio::test]
    async fn seed_is_a_no_op_when_systems_exist() {
        let store = MemoryCatalogStore::new();
        store.seed_default_data().await.unwrap();
        store
            .upsert_device_type_term("umdns", "Infusion Pump", None)
            .await
            .unwrap();
        store.seed_default_data().await.unwrap();

        let catalog = store.load_catalog().await.unwrap();
        assert_eq!(catalog.nomenclature_systems.len(), 2);
        assert!(catalog
            .system("umdns")
            .unwrap()
            .device_type_terms
            .iter()
            .any(|t| t.standard == "Infusion Pump"));
    }

    #[tokio::test]
    async fn delete_system_removes_owned_terms() {
        let store = MemoryCatalogStore::seeded();
        store.delete_system("umdns").await.unwrap();
        let catalog = store.load_catalog().await.unwrap();
        assert!(catalog.system("umdns").is_none());
        // Reference terms are global and unaffected.
        assert_eq!(catalog.reference_db.manufacturer.len(), 2);
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let store = MemoryCatalogStore::seeded();
        assert!(matches!(
            store
                .append_variation_to_device_type("nope", "x")
                .await
                .unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            store.delete_reference_term("nope").await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(matches!(
            store
                .upsert_device_type_term("nope", "Ventilator", None)
                .await
                .unwrap_err(),
            StoreError::NotFound { .. }
        ));
    }
}
