//! Session-scoped identity maps.
//!
//! Entries are keyed by `(identity type, id)`, where the identity type is
//! the root of a hierarchy. Every type stored in one table therefore shares
//! one instance per id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use vellum_common::{DocumentId, IdentityMapKind, VellumResult};
use vellum_schema::{Document, DocumentMapping, DocumentType};

use crate::serializer::{from_tree, to_tree};
use crate::tracked::{DocumentChange, DocumentHandle, TrackedEntity};

/// Cache of the documents a session has loaded or stored.
pub trait IdentityMap: Send + Sync {
    /// Returns which kind of map this is.
    fn kind(&self) -> IdentityMapKind;

    /// Returns true if the document is cached.
    fn has(&self, identity_type: &DocumentType, id: &DocumentId) -> bool;

    /// Returns the cached entity.
    fn retrieve(&self, identity_type: &DocumentType, id: &DocumentId) -> Option<&TrackedEntity>;

    /// Returns the view of a document read as `document_type`.
    fn retrieve_view(&self, document_type: &DocumentType, id: &DocumentId) -> Option<&TrackedEntity>;

    /// Caches an entity, replacing any entry with the same key.
    fn store(&mut self, entity: TrackedEntity);

    /// Caches an entity hydrated from a row.
    fn store_loaded(&mut self, entity: TrackedEntity) {
        self.store(entity);
    }

    /// Evicts an entity and every view of it.
    fn remove(&mut self, identity_type: &DocumentType, id: &DocumentId) -> Option<TrackedEntity>;

    /// Documents whose current state differs from what was last persisted.
    fn dirty_entries(&self) -> VellumResult<Vec<DocumentChange>>;

    /// Records that `changes` were written.
    fn mark_saved(&mut self, changes: &[DocumentChange]);

    /// Number of entities held.
    fn len(&self) -> usize;

    /// Returns true if no entity is held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every entity.
    fn clear(&mut self);
}

/// Creates the identity map for a session.
pub fn identity_map_for(kind: IdentityMapKind) -> Box<dyn IdentityMap> {
    match kind {
        IdentityMapKind::Tracking => Box::<TrackingIdentityMap>::default(),
        IdentityMapKind::Null => Box::<NullIdentityMap>::default(),
    }
}

/// Returns the instance the map already holds for `id`, seen as `T`.
///
/// When the resident instance is another type of the same hierarchy, a
/// read-only view of it is created and cached.
pub fn resident_handle<T: Document>(
    map: &mut dyn IdentityMap,
    mapping: &DocumentMapping,
    id: &DocumentId,
) -> VellumResult<Option<DocumentHandle<T>>> {
    let requested = mapping.document_type();
    if let Some(view) = map
        .retrieve_view(&requested, id)
        .and_then(TrackedEntity::handle::<T>)
    {
        return Ok(Some(view));
    }

    let (stored_as, tree) = match map.retrieve(&mapping.identity_type(), id) {
        None => return Ok(None),
        Some(entity) => match entity.handle::<T>() {
            Some(handle) => return Ok(Some(handle)),
            None => (entity.document_type(), entity.current_json()?),
        },
    };
    track_view(map, mapping, stored_as, id.clone(), tree).map(Some)
}

/// Hydrates `tree` as `T` and caches it as a view of a `stored_as` row.
pub(crate) fn track_view<T: Document>(
    map: &mut dyn IdentityMap,
    mapping: &DocumentMapping,
    stored_as: DocumentType,
    id: DocumentId,
    tree: serde_json::Value,
) -> VellumResult<DocumentHandle<T>> {
    let document: T = from_tree(tree)?;
    let snapshot = to_tree(&document)?;
    let handle = Arc::new(RwLock::new(document));
    map.store_loaded(
        TrackedEntity::new(id, Arc::clone(&handle), Some(snapshot))
            .keyed_by(mapping.identity_type())
            .viewing(stored_as),
    );
    Ok(handle)
}

type EntryKey = (DocumentType, DocumentId);

/// At most one instance per `(identity type, id)`, dirty-checked against
/// snapshots.
#[derive(Debug, Default)]
pub struct TrackingIdentityMap {
    entries: HashMap<EntryKey, TrackedEntity>,
    views: HashMap<EntryKey, TrackedEntity>,
}

impl TrackingIdentityMap {
    fn drop_views(&mut self, identity_type: &DocumentType, id: &DocumentId) {
        self.views
            .retain(|_, view| !(view.identity_type() == *identity_type && view.id() == id));
    }
}

impl IdentityMap for TrackingIdentityMap {
    fn kind(&self) -> IdentityMapKind {
        IdentityMapKind::Tracking
    }

    fn has(&self, identity_type: &DocumentType, id: &DocumentId) -> bool {
        self.entries.contains_key(&(*identity_type, id.clone()))
    }

    fn retrieve(&self, identity_type: &DocumentType, id: &DocumentId) -> Option<&TrackedEntity> {
        self.entries.get(&(*identity_type, id.clone()))
    }

    fn retrieve_view(&self, document_type: &DocumentType, id: &DocumentId) -> Option<&TrackedEntity> {
        self.views.get(&(*document_type, id.clone()))
    }

    fn store(&mut self, entity: TrackedEntity) {
        let id = entity.id().clone();
        if entity.stored_as().is_some() {
            self.views.insert((entity.document_type(), id), entity);
            return;
        }
        let identity_type = entity.identity_type();
        self.drop_views(&identity_type, &id);
        self.entries.insert((identity_type, id), entity);
    }

    fn remove(&mut self, identity_type: &DocumentType, id: &DocumentId) -> Option<TrackedEntity> {
        self.drop_views(identity_type, id);
        self.entries.remove(&(*identity_type, id.clone()))
    }

    fn dirty_entries(&self) -> VellumResult<Vec<DocumentChange>> {
        let mut changes = Vec::new();
        for entity in self.entries.values().chain(self.views.values()) {
            if let Some(change) = entity.detect_change()? {
                changes.push(change);
            }
        }
        // HashMap order is arbitrary; keep writes stable.
        changes.sort_by(|a, b| {
            a.document_type
                .type_name()
                .cmp(b.document_type.type_name())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(changes)
    }

    fn mark_saved(&mut self, changes: &[DocumentChange]) {
        for change in changes {
            let key = (change.identity_type, change.id.clone());
            if let Some(entity) = self.entries.get_mut(&key) {
                entity.reset_json(change.json.clone());
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len() + self.views.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.views.clear();
    }
}

/// Never caches: every load hydrates a fresh instance.
///
/// Loaded documents are not retained. Documents handed to
/// [`store`](IdentityMap::store) are kept until the next save, and all of
/// them are written because nothing is known about their persisted state.
#[derive(Debug, Default)]
pub struct NullIdentityMap {
    pending: Vec<TrackedEntity>,
}

impl IdentityMap for NullIdentityMap {
    fn kind(&self) -> IdentityMapKind {
        IdentityMapKind::Null
    }

    fn has(&self, _identity_type: &DocumentType, _id: &DocumentId) -> bool {
        false
    }

    fn retrieve(&self, _identity_type: &DocumentType, _id: &DocumentId) -> Option<&TrackedEntity> {
        None
    }

    fn retrieve_view(&self, _document_type: &DocumentType, _id: &DocumentId) -> Option<&TrackedEntity> {
        None
    }

    fn store(&mut self, entity: TrackedEntity) {
        self.pending.push(entity);
    }

    fn store_loaded(&mut self, _entity: TrackedEntity) {}

    fn remove(&mut self, identity_type: &DocumentType, id: &DocumentId) -> Option<TrackedEntity> {
        let pos = self
            .pending
            .iter()
            .position(|e| e.identity_type() == *identity_type && e.id() == id)?;
        Some(self.pending.remove(pos))
    }

    fn dirty_entries(&self) -> VellumResult<Vec<DocumentChange>> {
        self.pending.iter().map(TrackedEntity::current_change).collect()
    }

    fn mark_saved(&mut self, _changes: &[DocumentChange]) {
        self.pending.clear();
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn clear(&mut self) {
        self.pending.clear();
    }
}
