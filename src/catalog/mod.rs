//! Catalog persistence port and admin editing.
//!
//! [`CatalogStore`] is the only seam between the engine and storage; the SQL
//! and in-memory backends implement it. Write operations are idempotent where
//! the review flow can retry them (term upserts and variation appends), so a
//! partially applied multi-step edit converges on retry.

pub mod memory;
pub mod sql_store;

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use uuid::Uuid;

use crate::error::{EditError, StoreError, ValidationError};
use crate::models::{
    CanonicalTerm, Catalog, MatchField, NomenclatureSystem, ReferenceDb, ReferenceField,
};

/// Result of probing the backend for write access.
#[derive(Debug, Clone)]
pub struct WriteProbe {
    pub can_write: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn load_catalog(&self) -> Result<Catalog, StoreError>;

    /// Create or update a device-type term keyed by `(system_id, standard)`.
    /// If the term exists, `variation` is appended when absent; otherwise a
    /// new term is created with `variation` as its only alias. Returns the
    /// term id either way.
    async fn upsert_device_type_term(
        &self,
        system_id: &str,
        standard: &str,
        variation: Option<&str>,
    ) -> Result<String, StoreError>;

    /// Append a variation to an existing device-type term if absent. Bumps the
    /// owning system's `last_updated` only when the term actually changed.
    async fn append_variation_to_device_type(
        &self,
        term_id: &str,
        variation: &str,
    ) -> Result<(), StoreError>;

    async fn upsert_reference_term(
        &self,
        field: ReferenceField,
        standard: &str,
        variation: Option<&str>,
    ) -> Result<String, StoreError>;

    async fn append_variation_to_reference(
        &self,
        term_id: &str,
        variation: &str,
    ) -> Result<(), StoreError>;

    /// Overwrite a device-type term's standard and full variation list.
    async fn update_device_type_term(
        &self,
        term_id: &str,
        standard: &str,
        variations: &[String],
    ) -> Result<(), StoreError>;

    async fn update_reference_term(
        &self,
        term_id: &str,
        standard: &str,
        variations: &[String],
    ) -> Result<(), StoreError>;

    async fn delete_device_type_term(&self, term_id: &str) -> Result<(), StoreError>;

    async fn delete_reference_term(&self, term_id: &str) -> Result<(), StoreError>;

    async fn create_system(
        &self,
        name: &str,
        description: &str,
    ) -> Result<NomenclatureSystem, StoreError>;

    async fn update_system(
        &self,
        id: &str,
        name: &str,
        description: &str,
    ) -> Result<(), StoreError>;

    /// Delete a system and all device-type terms it owns.
    async fn delete_system(&self, id: &str) -> Result<(), StoreError>;

    /// Populate the default systems and terms. No-op when any system exists.
    async fn seed_default_data(&self) -> Result<(), StoreError>;

    async fn can_write(&self) -> WriteProbe;
}

/// Upsert dispatched on the match field. `system_id` only applies to Device
/// Type terms.
pub async fn upsert_term(
    store: &dyn CatalogStore,
    field: MatchField,
    system_id: &str,
    standard: &str,
    variation: Option<&str>,
) -> Result<String, StoreError> {
    match field {
        MatchField::DeviceType => {
            store
                .upsert_device_type_term(system_id, standard, variation)
                .await
        }
        MatchField::Reference(r) => store.upsert_reference_term(r, standard, variation).await,
    }
}

/// Variation append dispatched on the match field.
pub async fn append_variation(
    store: &dyn CatalogStore,
    field: MatchField,
    term_id: &str,
    variation: &str,
) -> Result<(), StoreError> {
    match field {
        MatchField::DeviceType => store.append_variation_to_device_type(term_id, variation).await,
        MatchField::Reference(_) => store.append_variation_to_reference(term_id, variation).await,
    }
}

fn seed_term(standard: &str, variations: &[&str]) -> CanonicalTerm {
    CanonicalTerm {
        id: Uuid::new_v4().to_string(),
        standard: standard.to_string(),
        variations: variations.iter().map(|s| s.to_string()).collect(),
    }
}

/// Default catalog content used by every backend's `seed_default_data`.
pub(crate) fn default_catalog() -> Catalog {
    let now = Utc::now();
    Catalog {
        nomenclature_systems: vec![
            NomenclatureSystem {
                id: "umdns".into(),
                name: "UMDNS".into(),
                description: "Universal Medical Device Nomenclature System".into(),
                last_updated: now,
                device_type_terms: vec![
                    seed_term(
                        "Electrocautery Unit",
                        &["Electrocauterio", "ESU", "Cautery Unit"],
                    ),
                    seed_term("Defibrillator", &["Desfibrilador", "AED"]),
                ],
            },
            NomenclatureSystem {
                id: "gmdn".into(),
                name: "GMDN".into(),
                description: "Global Medical Device Nomenclature".into(),
                last_updated: now,
                device_type_terms: vec![seed_term(
                    "Ventilator",
                    &["Ventilador", "Mechanical Ventilator"],
                )],
            },
        ],
        reference_db: ReferenceDb {
            manufacturer: vec![
                seed_term(
                    "Philips Healthcare",
                    &["Philips", "Phillips", "Philips Medical"],
                ),
                seed_term("GE Healthcare", &["GE", "General Electric", "GE Medical"]),
            ],
            model: vec![
                seed_term("M3046A", &["M3046", "M-3046A"]),
                seed_term("CARESCAPE R860", &["R860", "Carescape R860"]),
            ],
        },
    }
}

/// Which term list a merge operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeScope {
    DeviceType,
    Reference(ReferenceField),
}

/// Admin-side catalog editing. Serializes merges through an in-flight flag so
/// a double-submit cannot interleave the two store writes of the saga.
pub struct CatalogEditor<'a> {
    store: &'a dyn CatalogStore,
    merging: bool,
}

impl<'a> CatalogEditor<'a> {
    pub fn new(store: &'a dyn CatalogStore) -> Self {
        Self {
            store,
            merging: false,
        }
    }

    /// Merge `absorbed` into `survivor`: the survivor keeps its standard and
    /// gains the absorbed term's standard and variations as variations, then
    /// the absorbed term is deleted. The two writes are not atomic; if the
    /// delete fails the survivor already holds the union, and re-running the
    /// merge converges because the variation union is idempotent.
    pub async fn merge_terms(
        &mut self,
        scope: MergeScope,
        survivor: &CanonicalTerm,
        absorbed: Option<&CanonicalTerm>,
    ) -> Result<CanonicalTerm, EditError> {
        let absorbed = absorbed.ok_or(ValidationError::MergeTargetUnset)?;
        if survivor.id == absorbed.id {
            return Err(ValidationError::MergeSelfTarget.into());
        }
        if self.merging {
            return Err(ValidationError::OperationInFlight("merge").into());
        }
        self.merging = true;
        let result = self.merge_inner(scope, survivor, absorbed).await;
        self.merging = false;
        result
    }

    async fn merge_inner(
        &self,
        scope: MergeScope,
        survivor: &CanonicalTerm,
        absorbed: &CanonicalTerm,
    ) -> Result<CanonicalTerm, EditError> {
        let mut variations = survivor.variations.clone();
        let incoming = absorbed
            .variations
            .iter()
            .chain(std::iter::once(&absorbed.standard));
        for v in incoming {
            if *v != survivor.standard && !variations.contains(v) {
                variations.push(v.clone());
            }
        }

        match scope {
            MergeScope::DeviceType => {
                self.store
                    .update_device_type_term(&survivor.id, &survivor.standard, &variations)
                    .await?;
                self.store.delete_device_type_term(&absorbed.id).await?;
            }
            MergeScope::Reference(_) => {
                self.store
                    .update_reference_term(&survivor.id, &survivor.standard, &variations)
                    .await?;
                self.store.delete_reference_term(&absorbed.id).await?;
            }
        }
        info!(
            "merged term '{}' into '{}' ({} variations)",
            absorbed.standard,
            survivor.standard,
            variations.len()
        );

        Ok(CanonicalTerm {
            id: survivor.id.clone(),
            standard: survivor.standard.clone(),
            variations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryCatalogStore;
    use super::*;

    fn term_by_standard<'c>(catalog: &'c Catalog, system: &str, standard: &str) -> &'c CanonicalTerm {
        catalog
            .system(system)
            .unwrap()
            .device_type_terms
            .iter()
            .find(|t| t.standard == standard)
            .unwrap()
    }

    #[tokio::test]
    async fn merge_unions_variations_and_deletes_absorbed() {
        let store = MemoryCatalogStore::seeded();
        let survivor_id = store
            .upsert_device_type_term("umdns", "Ventilator", Some("Ventilador"))
            .await
            .unwrap();
        let absorbed_id = store
            .upsert_device_type_term("umdns", "Mechanical Ventilator", Some("Vent"))
            .await
            .unwrap();
        let catalog = store.load_catalog().await.unwrap();
        let survivor = term_by_standard(&catalog, "umdns", "Ventilator").clone();
        let absorbed = term_by_standard(&catalog, "umdns", "Mechanical Ventilator").clone();
        assert_eq!(survivor.id, survivor_id);
        assert_eq!(absorbed.id, absorbed_id);

        let mut editor = CatalogEditor::new(&store);
        let merged = editor
            .merge_terms(MergeScope::DeviceType, &survivor, Some(&absorbed))
            .await
            .unwrap();

        assert_eq!(merged.standard, "Ventilator");
        assert!(merged.variations.contains(&"Ventilador".to_string()));
        assert!(merged.variations.contains(&"Vent".to_string()));
        assert!(merged.variations.contains(&"Mechanical Ventilator".to_string()));
        assert!(!merged.variations.contains(&"Ventilator".to_string()));

        let after = store.load_catalog().await.unwrap();
        let system = after.system("umdns").unwrap();
        assert!(system
            .device_type_terms
            .iter()
            .all(|t| t.standard != "Mechanical Ventilator"));
    }

    #[tokio::test]
    async fn merge_validates_target() {
        let store = MemoryCatalogStore::seeded();
        let catalog = store.load_catalog().await.unwrap();
        let t = term_by_standard(&catalog, "umdns", "Defibrillator").clone();

        let mut editor = CatalogEditor::new(&store);
        let err = editor
            .merge_terms(MergeScope::DeviceType, &t, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::Validation(ValidationError::MergeTargetUnset)
        ));

        let err = editor
            .merge_terms(MergeScope::DeviceType, &t, Some(&t))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::Validation(ValidationError::MergeSelfTarget)
        ));
    }

    #[tokio::test]
    async fn merge_in_flight_rejects_a_second_merge() {
        let store = MemoryCatalogStore::seeded();
        let catalog = store.load_catalog().await.unwrap();
        let survivor = term_by_standard(&catalog, "umdns", "Electrocautery Unit").clone();
        let absorbed = term_by_standard(&catalog, "umdns", "Defibrillator").clone();

        let mut editor = CatalogEditor::new(&store);
        editor.merging = true;
        let err = editor
            .merge_terms(MergeScope::DeviceType, &survivor, Some(&absorbed))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EditError::Validation(ValidationError::OperationInFlight("merge"))
        ));
        // Nothing was written while busy.
        let unchanged = store.load_catalog().await.unwrap();
        assert_eq!(
            term_by_standard(&unchanged, "umdns", "Electrocautery Unit").variations,
            survivor.variations
        );

        editor.merging = false;
        editor
            .merge_terms(MergeScope::DeviceType, &survivor, Some(&absorbed))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn merge_retry_converges_after_partial_failure() {
        // Simulate the first run failing between the two writes: the survivor
        // already holds the union, the absorbed term still exists.
        let store = MemoryCatalogStore::seeded();
        let catalog = store.load_catalog().await.unwrap();
        let survivor = term_by_standard(&catalog, "gmdn", "Ventilator").clone();
        let absorbed_id = store
            .upsert_device_type_term("gmdn", "Respirator", Some("Resp Unit"))
            .await
            .unwrap();
        let catalog = store.load_catalog().await.unwrap();
        let absorbed = term_by_standard(&catalog, "gmdn", "Respirator").clone();
        assert_eq!(absorbed.id, absorbed_id);

        // Partial first attempt: only the union write landed.
        let union = {
            let mut v = survivor.variations.clone();
            v.push("Resp Unit".into());
            v.push("Respirator".into());
            v
        };
        store
            .update_device_type_term(&survivor.id, &survivor.standard, &union)
            .await
            .unwrap();

        // Retry the full merge from fresh reads.
        let catalog = store.load_catalog().await.unwrap();
        let survivor = term_by_standard(&catalog, "gmdn", "Ventilator").clone();
        let absorbed = term_by_standard(&catalog, "gmdn", "Respirator").clone();
        let mut editor = CatalogEditor::new(&store);
        let merged = editor
            .merge_terms(MergeScope::DeviceType, &survivor, Some(&absorbed))
            .await
            .unwrap();

        let dupes = merged
            .variations
            .iter()
            .filter(|v| *v == "Respirator")
            .count();
        assert_eq!(dupes, 1);
        let after = store.load_catalog().await.unwrap();
        assert!(after
            .system("gmdn")
            .unwrap()
            .device_type_terms
            .iter()
            .all(|t| t.standard != "Respirator"));
    }
}
