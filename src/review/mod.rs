//! Review queue construction and the operator review session.
//!
//! The queue is built once per import in deterministic order: rows in import
//! order, mapped columns in header order. A cell whose best candidate scores
//! exactly 1.0 resolves silently and never enters the queue. Session decisions
//! write to the store first and mutate session state only on success, so a
//! failed write leaves the current item pending for retry.

use log::{info, warn};

use crate::catalog::{append_variation, upsert_term, CatalogStore};
use crate::error::{ReviewError, ValidationError};
use crate::matching::find_matches;
use crate::models::{
    CanonicalTerm, Catalog, ColumnMapping, ImportRow, MatchField, ReviewAction, ReviewItem,
};

const NOTE_ACCEPTED: &str = "Auto-matched from accepted suggestion";
const NOTE_ADDED: &str = "Auto-matched from newly added term";

/// Build the review queue for an import. Empty cells are not reviewable and
/// produce no item; exact (score 1.0) top candidates are auto-resolved.
pub fn build_review_queue(
    rows: &[ImportRow],
    mapping: &ColumnMapping,
    catalog: &Catalog,
    active_system: &str,
) -> Result<Vec<ReviewItem>, ValidationError> {
    if !mapping.has_match_column() {
        return Err(ValidationError::NoMappedColumns);
    }

    let mut queue = Vec::new();
    for row in rows {
        for (column, field) in mapping.match_columns() {
            let value = row.get(column);
            if value.trim().is_empty() {
                continue;
            }
            let candidates = find_matches(value, catalog.field_terms(field, active_system));
            if candidates.first().is_some_and(|c| c.score == 1.0) {
                continue;
            }
            queue.push(ReviewItem::new(
                row.row_index,
                column,
                field,
                value,
                candidates,
            ));
        }
    }
    info!(
        "review queue built: {} items from {} rows",
        queue.len(),
        rows.len()
    );
    Ok(queue)
}

/// One pass through a review queue. Holds a catalog snapshot that is mirrored
/// on every successful write so suggestions stay current without re-reading
/// the store mid-session.
pub struct ReviewSession {
    queue: Vec<ReviewItem>,
    cursor: usize,
    catalog: Catalog,
    active_system: String,
    creating: bool,
}

impl ReviewSession {
    pub fn new(queue: Vec<ReviewItem>, catalog: Catalog, active_system: &str) -> Self {
        Self {
            queue,
            cursor: 0,
            catalog,
            active_system: active_system.to_string(),
            creating: false,
        }
    }

    pub fn current(&self) -> Option<&ReviewItem> {
        self.queue.get(self.cursor)
    }

    pub fn queue(&self) -> &[ReviewItem] {
        &self.queue
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn active_system(&self) -> &str {
        &self.active_system
    }

    pub fn is_complete(&self) -> bool {
        self.queue.iter().all(|i| i.processed)
    }

    /// (processed, total)
    pub fn progress(&self) -> (usize, usize) {
        (
            self.queue.iter().filter(|i| i.processed).count(),
            self.queue.len(),
        )
    }

    /// Accept a suggested term for the current item. The original value is
    /// recorded as a variation of the accepted term; identical pending values
    /// for the same field are auto-matched.
    pub async fn accept(
        &mut self,
        store: &dyn CatalogStore,
        term_id: &str,
        standard: &str,
    ) -> Result<(), ReviewError> {
        let item = self.current().ok_or(ReviewError::QueueExhausted)?;
        let field = item.field;
        let original = item.original_value.clone();

        append_variation(store, field, term_id, &original).await?;
        self.mirror_append(field, term_id, &original);

        let item = &mut self.queue[self.cursor];
        item.processed = true;
        item.action = Some(ReviewAction::Accepted);
        item.matched_term = Some(standard.to_string());
        self.propagate(field, &original, standard, NOTE_ACCEPTED);
        self.advance();
        Ok(())
    }

    /// Add the current item's value as a brand-new canonical term named
    /// `name`, with the original value as its first variation.
    pub async fn create_new(
        &mut self,
        store: &dyn CatalogStore,
        name: &str,
    ) -> Result<(), ReviewError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyTermName.into());
        }
        if self.creating {
            return Err(ValidationError::OperationInFlight("create").into());
        }
        self.creating = true;
        let result = self.create_new_inner(store, name).await;
        self.creating = false;
        result
    }

    async fn create_new_inner(
        &mut self,
        store: &dyn CatalogStore,
        name: &str,
    ) -> Result<(), ReviewError> {
        let item = self.current().ok_or(ReviewError::QueueExhausted)?;
        let field = item.field;
        let original = item.original_value.clone();
        // The original spelling becomes a variation unless it is the name itself.
        let variation = if original == name {
            None
        } else {
            Some(original.as_str())
        };

        let term_id = upsert_term(store, field, &self.active_system, name, variation).await?;
        self.mirror_upsert(field, &term_id, name, variation);

        let item = &mut self.queue[self.cursor];
        item.processed = true;
        item.action = Some(ReviewAction::Added);
        item.matched_term = Some(name.to_string());
        self.propagate(field, &original, name, NOTE_ADDED);
        self.advance();
        Ok(())
    }

    /// Leave the current item unresolved. Nothing is written to the store and
    /// other items with the same value are unaffected.
    pub fn skip(&mut self) -> Result<(), ReviewError> {
        if self.cursor >= self.queue.len() {
            return Err(ReviewError::QueueExhausted);
        }
        let item = &mut self.queue[self.cursor];
        item.processed = true;
        item.action = Some(ReviewAction::Skipped);
        self.advance();
        Ok(())
    }

    /// Reload the catalog after review so standardization sees every term
    /// added during the session. A failed reload keeps the mirrored snapshot,
    /// which already contains this session's writes.
    pub async fn finish(&mut self, store: &dyn CatalogStore) -> &Catalog {
        match store.load_catalog().await {
            Ok(catalog) => self.catalog = catalog,
            Err(e) => warn!("catalog reload failed after review, using session snapshot: {e}"),
        }
        &self.catalog
    }

    fn advance(&mut self) {
        while self.cursor < self.queue.len() && self.queue[self.cursor].processed {
            self.cursor += 1;
        }
    }

    /// Auto-match every later unprocessed item holding the byte-identical
    /// value for the same field.
    fn propagate(&mut self, field: MatchField, original: &str, standard: &str, note: &str) {
        for item in self.queue.iter_mut().skip(self.cursor + 1) {
            if !item.processed && item.field == field && item.original_value == original {
                item.processed = true;
                item.action = Some(ReviewAction::AutoMatched);
                item.matched_term = Some(standard.to_string());
                item.note = Some(note.to_string());
            }
        }
    }

    fn mirror_append(&mut self, field: MatchField, term_id: &str, variation: &str) {
        let Self {
            catalog,
            active_system,
            ..
        } = self;
        let terms = match field {
            MatchField::DeviceType => match catalog.system_mut(active_system) {
                Some(s) => &mut s.device_type_terms,
                None => return,
            },
            MatchField::Reference(r) => catalog.reference_db.terms_mut(r),
        };
        if let Some(term) = terms.iter_mut().find(|t| t.id == term_id) {
            if !term.variations.iter().any(|v| v == variation) {
                term.variations.push(variation.to_string());
            }
        }
    }

    fn mirror_upsert(
        &mut self,
        field: MatchField,
        term_id: &str,
        standard: &str,
        variation: Option<&str>,
    ) {
        let Self {
            catalog,
            active_system,
            ..
        } = self;
        let terms = match field {
            MatchField::DeviceType => match catalog.system_mut(active_system) {
                Some(s) => &mut s.device_type_terms,
                None => return,
            },
            MatchField::Reference(r) => catalog.reference_db.terms_mut(r),
        };
        if let Some(term) = terms.iter_mut().find(|t| t.standard == standard) {
            if let Some(v) = variation {
                if !term.variations.iter().any(|x| x == v) {
                    term.variations.push(v.to_string());
                }
            }
            return;
        }
        terms.push(CanonicalTerm {
            id: term_id.to_string(),
            standard: standard.to_string(),
            variations: variation.map(|v| vec![v.to_string()]).unwrap_or_default(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::MemoryCatalogStore;
    use crate::error::StoreError;
    use crate::models::{ColumnTarget, NomenclatureSystem, ReferenceField};
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn mapping() -> ColumnMapping {
        let mut m = ColumnMapping::default();
        m.set("Type", ColumnTarget::Match(MatchField::DeviceType));
        m.set(
            "Mfr",
            ColumnTarget::Match(MatchField::Reference(ReferenceField::Manufacturer)),
        );
        m.set("Serial", ColumnTarget::Passthrough);
        m
    }

    fn row(index: usize, ty: &str, mfr: &str) -> ImportRow {
        let mut cells = HashMap::new();
        cells.insert("Type".to_string(), ty.to_string());
        cells.insert("Mfr".to_string(), mfr.to_string());
        cells.insert("Serial".to_string(), format!("SN{index}"));
        ImportRow {
            row_index: index,
            cells,
        }
    }

    async fn seeded_catalog() -> (MemoryCatalogStore, Catalog) {
        let store = MemoryCatalogStore::seeded();
        let catalog = store.load_catalog().await.unwrap();
        (store, catalog)
    }

    #[tokio::test]
    async fn exact_values_never_enter_the_queue() {
        let (_, catalog) = seeded_catalog().await;
        let rows = vec![
            row(0, "Ventilador", "Philips"),
            row(1, "Ventlator", "ACME"),
        ];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "gmdn").unwrap();
        // Row 0 resolves exactly on both fields; row 1 is ambiguous on both.
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[0].row_index, 1);
        assert_eq!(queue[0].column, "Type");
        assert_eq!(queue[1].column, "Mfr");
        assert!(queue[1].potential_matches.is_empty());
    }

    #[tokio::test]
    async fn empty_cells_and_unmapped_columns_are_ignored() {
        let (_, catalog) = seeded_catalog().await;
        let rows = vec![row(0, "  ", "")];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "gmdn").unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn queue_requires_a_mapped_column() {
        let (_, catalog) = seeded_catalog().await;
        let mut m = ColumnMapping::default();
        m.set("Serial", ColumnTarget::Passthrough);
        let err = build_review_queue(&[row(0, "x", "y")], &m, &catalog, "gmdn").unwrap_err();
        assert_eq!(err, ValidationError::NoMappedColumns);
    }

    #[tokio::test]
    async fn accept_records_variation_and_propagates() {
        let (store, catalog) = seeded_catalog().await;
        let rows = vec![
            row(0, "Ventlator", "GE"),
            row(1, "Monitor", "x-ray"),
            row(2, "Ventlator", "y"),
        ];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "gmdn").unwrap();
        let vent_positions: Vec<usize> = queue
            .iter()
            .enumerate()
            .filter(|(_, i)| i.original_value == "Ventlator")
            .map(|(n, _)| n)
            .collect();
        assert_eq!(vent_positions.len(), 2);

        let mut session = ReviewSession::new(queue, catalog, "gmdn");
        let suggestion = session.current().unwrap().potential_matches[0].clone();
        assert_eq!(suggestion.standard, "Ventilator");
        session
            .accept(&store, &suggestion.term_id, &suggestion.standard)
            .await
            .unwrap();

        let later = &session.queue()[vent_positions[1]];
        assert!(later.processed);
        assert_eq!(later.action, Some(ReviewAction::AutoMatched));
        assert_eq!(later.matched_term.as_deref(), Some("Ventilator"));
        assert_eq!(later.note.as_deref(), Some(NOTE_ACCEPTED));

        // The store gained the variation; the next identical import resolves exactly.
        let reloaded = store.load_catalog().await.unwrap();
        let term = reloaded
            .system("gmdn")
            .unwrap()
            .device_type_terms
            .iter()
            .find(|t| t.standard == "Ventilator")
            .unwrap();
        assert!(term.variations.contains(&"Ventlator".to_string()));
        // Mirrored into the session snapshot too.
        assert!(session
            .catalog()
            .system("gmdn")
            .unwrap()
            .device_type_terms
            .iter()
            .any(|t| t.variations.contains(&"Ventlator".to_string())));
    }

    #[tokio::test]
    async fn create_new_adds_term_and_propagates() {
        let (store, catalog) = seeded_catalog().await;
        let rows = vec![row(0, "Bomba de Infusion", "GE"), row(1, "Bomba de Infusion", "GE")];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "umdns").unwrap();
        let mut session = ReviewSession::new(queue, catalog, "umdns");

        assert!(matches!(
            session.create_new(&store, "   ").await.unwrap_err(),
            ReviewError::Validation(ValidationError::EmptyTermName)
        ));

        session.create_new(&store, "Infusion Pump").await.unwrap();
        let items: Vec<&ReviewItem> = session
            .queue()
            .iter()
            .filter(|i| i.original_value == "Bomba de Infusion")
            .collect();
        assert_eq!(items[0].action, Some(ReviewAction::Added));
        assert_eq!(items[1].action, Some(ReviewAction::AutoMatched));
        assert_eq!(items[1].note.as_deref(), Some(NOTE_ADDED));

        let reloaded = store.load_catalog().await.unwrap();
        let term = reloaded
            .system("umdns")
            .unwrap()
            .device_type_terms
            .iter()
            .find(|t| t.standard == "Infusion Pump")
            .unwrap();
        assert_eq!(term.variations, vec!["Bomba de Infusion".to_string()]);
    }

    #[tokio::test]
    async fn create_in_flight_rejects_a_second_create() {
        let (store, catalog) = seeded_catalog().await;
        let rows = vec![row(0, "Bomba de Infusion", "GE")];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "umdns").unwrap();
        let mut session = ReviewSession::new(queue, catalog, "umdns");

        session.creating = true;
        let err = session
            .create_new(&store, "Infusion Pump")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReviewError::Validation(ValidationError::OperationInFlight("create"))
        ));
        assert!(!session.current().unwrap().processed);

        session.creating = false;
        session.create_new(&store, "Infusion Pump").await.unwrap();
    }

    #[tokio::test]
    async fn skip_resolves_only_the_current_item() {
        let (_, catalog) = seeded_catalog().await;
        let rows = vec![row(0, "Mystery Device", "GE"), row(1, "Mystery Device", "GE")];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "umdns").unwrap();
        let mut session = ReviewSession::new(queue, catalog, "umdns");

        session.skip().unwrap();
        let items: Vec<&ReviewItem> = session
            .queue()
            .iter()
            .filter(|i| i.original_value == "Mystery Device")
            .collect();
        assert_eq!(items[0].action, Some(ReviewAction::Skipped));
        assert!(!items[1].processed);
    }

    /// Test double: a store that can refuse reads and/or writes.
    struct FlakyStore {
        inner: MemoryCatalogStore,
        fail_reads: bool,
        fail_writes: bool,
    }

    impl FlakyStore {
        fn down() -> StoreError {
            StoreError::Query("store refused".into())
        }

        fn write(&self) -> Result<(), StoreError> {
            if self.fail_writes {
                Err(Self::down())
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CatalogStore for FlakyStore {
        async fn load_catalog(&self) -> Result<Catalog, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Connection("gone".into()));
            }
            self.inner.load_catalog().await
        }
        async fn upsert_device_type_term(
            &self,
            system_id: &str,
            standard: &str,
            variation: Option<&str>,
        ) -> Result<String, StoreError> {
            self.write()?;
            self.inner
                .upsert_device_type_term(system_id, standard, variation)
                .await
        }
        async fn append_variation_to_device_type(
            &self,
            term_id: &str,
            variation: &str,
        ) -> Result<(), StoreError> {
            self.write()?;
            self.inner
                .append_variation_to_device_type(term_id, variation)
                .await
        }
        async fn upsert_reference_term(
            &self,
            field: ReferenceField,
            standard: &str,
            variation: Option<&str>,
        ) -> Result<String, StoreError> {
            self.write()?;
            self.inner
                .upsert_reference_term(field, standard, variation)
                .await
        }
        async fn append_variation_to_reference(
            &self,
            term_id: &str,
            variation: &str,
        ) -> Result<(), StoreError> {
            self.write()?;
            self.inner
                .append_variation_to_reference(term_id, variation)
                .await
        }
        async fn update_device_type_term(
            &self,
            term_id: &str,
            standard: &str,
            variations: &[String],
        ) -> Result<(), StoreError> {
            self.write()?;
            self.inner
                .update_device_type_term(term_id, standard, variations)
                .await
        }
        async fn update_reference_term(
            &self,
            term_id: &str,
            standard: &str,
            variations: &[String],
        ) -> Result<(), StoreError> {
            self.write()?;
            self.inner
                .update_reference_term(term_id, standard, variations)
                .await
        }
        async fn delete_device_type_term(&self, term_id: &str) -> Result<(), StoreError> {
            self.write()?;
            self.inner.delete_device_type_term(term_id).await
        }
        async fn delete_reference_term(&self, term_id: &str) -> Result<(), StoreError> {
            self.write()?;
            self.inner.delete_reference_term(term_id).await
        }
        async fn create_system(
            &self,
            name: &str,
            description: &str,
        ) -> Result<NomenclatureSystem, StoreError> {
            self.write()?;
            self.inner.create_system(name, description).await
        }
        async fn update_system(
            &self,
            id: &str,
            name: &str,
            description: &str,
        ) -> Result<(), StoreError> {
            self.write()?;
            self.inner.update_system(id, name, description).await
        }
        async fn delete_system(&self, id: &str) -> Result<(), StoreError> {
            self.write()?;
            self.inner.delete_system(id).await
        }
        async fn seed_default_data(&self) -> Result<(), StoreError> {
            self.write()?;
            self.inner.seed_default_data().await
        }
        async fn can_write(&self) -> crate::catalog::WriteProbe {
            crate::catalog::WriteProbe {
                can_write: !self.fail_writes,
                error: self.fail_writes.then(|| "store refused".to_string()),
            }
        }
    }

    #[tokio::test]
    async fn failed_write_leaves_the_item_pending() {
        let store = FlakyStore {
            inner: MemoryCatalogStore::seeded(),
            fail_reads: false,
            fail_writes: true,
        };
        let catalog = store.load_catalog().await.unwrap();
        let rows = vec![row(0, "Ventlator", "GE")];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "gmdn").unwrap();
        let mut session = ReviewSession::new(queue, catalog, "gmdn");

        let suggestion = session.current().unwrap().potential_matches[0].clone();
        let err = session
            .accept(&store, &suggestion.term_id, &suggestion.standard)
            .await
            .unwrap_err();
        assert!(matches!(err, ReviewError::Store(_)));

        let item = session.current().unwrap();
        assert!(!item.processed);
        assert!(item.action.is_none());

        let err = session.create_new(&store, "Ventilator Mk2").await.unwrap_err();
        assert!(matches!(err, ReviewError::Store(_)));
        assert!(!session.current().unwrap().processed);
        assert!(!session.is_complete());
    }

    #[tokio::test]
    async fn finish_reload_failure_keeps_snapshot() {
        let good = MemoryCatalogStore::seeded();
        let catalog = good.load_catalog().await.unwrap();
        let rows = vec![row(0, "Ventlator", "GE")];
        let queue = build_review_queue(&rows, &mapping(), &catalog, "gmdn").unwrap();
        let mut session = ReviewSession::new(queue, catalog, "gmdn");
        let suggestion = session.current().unwrap().potential_matches[0].clone();
        session
            .accept(&good, &suggestion.term_id, &suggestion.standard)
            .await
            .unwrap();

        let dead = FlakyStore {
            inner: MemoryCatalogStore::new(),
            fail_reads: true,
            fail_writes: true,
        };
        let after = session.finish(&dead).await;
        // Snapshot still holds the session's accepted variation.
        assert!(after
            .system("gmdn")
            .unwrap()
            .device_type_terms
            .iter()
            .any(|t| t.variations.contains(&"Ventlator".to_string())));
    }

    #[tokio::test]
    async fn exhausted_queue_rejects_decisions() {
        let (store, catalog) = seeded_catalog().await;
        let mut session = ReviewSession::new(Vec::new(), catalog, "gmdn");
        assert!(session.is_complete());
        assert!(matches!(
            session.skip().unwrap_err(),
            ReviewError::QueueExhausted
        ));
        assert!(matches!(
            session.accept(&store, "x", "y").await.unwrap_err(),
            ReviewError::QueueExhausted
        ));
    }
}
