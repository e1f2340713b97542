//! Tracked documents and change detection.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use vellum_common::{DocumentId, VellumError, VellumResult};
use vellum_schema::{Document, DocumentType};

use crate::serializer::to_tree;

/// Shared handle to a document held by a session.
///
/// Every load of the same `(type, id)` in a tracking session returns a clone
/// of the same handle.
pub type DocumentHandle<T> = Arc<RwLock<T>>;

/// Type-erased view of a tracked document.
pub trait TrackedDocument: Send + Sync {
    /// Serializes the live document.
    fn to_json_value(&self) -> VellumResult<serde_json::Value>;

    /// Returns the document's current id.
    fn document_id(&self) -> DocumentId;

    /// Recovers the concrete handle.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Document> TrackedDocument for RwLock<T> {
    fn to_json_value(&self) -> VellumResult<serde_json::Value> {
        to_tree(&*self.read())
    }

    fn document_id(&self) -> DocumentId {
        self.read().id()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A document that has to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    /// Document type.
    pub document_type: DocumentType,
    /// Identity map key type: the hierarchy root, or the type itself.
    pub identity_type: DocumentType,
    /// Document id.
    pub id: DocumentId,
    /// Serialized document as it will be stored.
    pub json: serde_json::Value,
}

/// A document owned by one session's identity map.
///
/// An entity whose `stored_as` is set is a view: a row written as one type
/// of a hierarchy, read through another. Views can be read but never written.
pub struct TrackedEntity {
    id: DocumentId,
    document_type: DocumentType,
    identity_type: DocumentType,
    stored_as: Option<DocumentType>,
    document: Arc<dyn TrackedDocument>,
    snapshot: Option<serde_json::Value>,
}

impl TrackedEntity {
    /// Tracks a handle. Without a snapshot the document always counts as changed.
    pub fn new<T: Document>(
        id: DocumentId,
        handle: DocumentHandle<T>,
        snapshot: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id,
            document_type: DocumentType::of::<T>(),
            identity_type: DocumentType::of::<T>(),
            stored_as: None,
            document: handle,
            snapshot,
        }
    }

    /// Keys the entity under a hierarchy root instead of its own type.
    pub fn keyed_by(mut self, identity_type: DocumentType) -> Self {
        self.identity_type = identity_type;
        self
    }

    /// Marks the entity as a read-only view of a row stored as `stored_as`.
    pub fn viewing(mut self, stored_as: DocumentType) -> Self {
        self.stored_as = Some(stored_as);
        self
    }

    /// Returns the id.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Returns the document type.
    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Returns the identity map key type.
    pub fn identity_type(&self) -> DocumentType {
        self.identity_type
    }

    /// Returns the stored type if this entity is a view.
    pub fn stored_as(&self) -> Option<DocumentType> {
        self.stored_as
    }

    /// Returns the last persisted serialization, if any.
    pub fn snapshot(&self) -> Option<&serde_json::Value> {
        self.snapshot.as_ref()
    }

    /// Returns the typed handle, if `T` is the tracked type.
    pub fn handle<T: Document>(&self) -> Option<DocumentHandle<T>> {
        Arc::clone(&self.document)
            .into_any()
            .downcast::<RwLock<T>>()
            .ok()
    }

    /// Serializes the live document.
    pub fn current_json(&self) -> VellumResult<serde_json::Value> {
        self.document.to_json_value()
    }

    /// Returns the pending write if the live document differs from the snapshot.
    ///
    /// Comparison is structural: key order and formatting do not matter. A
    /// modified view is an error.
    pub fn detect_change(&self) -> VellumResult<Option<DocumentChange>> {
        let current = self.current_json()?;
        if self.snapshot.as_ref() == Some(&current) {
            return Ok(None);
        }
        self.change_with(current).map(Some)
    }

    /// Returns the write for this document unconditionally.
    pub fn current_change(&self) -> VellumResult<DocumentChange> {
        self.change_with(self.current_json()?)
    }

    fn change_with(&self, json: serde_json::Value) -> VellumResult<DocumentChange> {
        if let Some(stored_as) = self.stored_as {
            return Err(VellumError::SubclassMismatch {
                type_name: self.document_type.short_name().to_string(),
                id: self.id.to_string(),
                stored_as: stored_as.short_name().to_string(),
            });
        }
        Ok(DocumentChange {
            document_type: self.document_type,
            identity_type: self.identity_type,
            id: self.document.document_id(),
            json,
        })
    }

    /// Replaces the snapshot after a successful load or save.
    pub fn reset_json(&mut self, json: serde_json::Value) {
        self.snapshot = Some(json);
    }
}

impl std::fmt::Debug for TrackedEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedEntity")
            .field("id", &self.id)
            .field("document_type", &self.document_type)
            .field("stored_as", &self.stored_as)
            .field("snapshot", &self.snapshot)
            .finish()
    }
}
