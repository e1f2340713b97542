//! The registry of document mappings.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use vellum_common::constants::BASE_DOCUMENT_TYPE;
use vellum_common::{StoreConfig, VellumError, VellumResult};

use crate::document::{Document, DocumentType};
use crate::mapping::DocumentMapping;

/// A deferred registration, for registering types in bulk.
#[derive(Clone, Copy)]
pub struct Registration {
    register: fn(&mut StoreOptions),
}

impl Registration {
    /// Registration of `T`.
    pub fn of<T: Document>() -> Self {
        Self {
            register: |options| {
                options.register::<T>();
            },
        }
    }
}

/// Store-wide options and the document mappings built from them.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    config: StoreConfig,
    mappings: HashMap<DocumentType, Arc<DocumentMapping>>,
    order: Vec<DocumentType>,
}

impl StoreOptions {
    /// Creates options with no registered documents.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            mappings: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Returns the store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Registers `T` and any subclasses it declares.
    ///
    /// Registering a type twice keeps the first mapping.
    pub fn register<T: Document>(&mut self) -> &mut Self {
        let document_type = DocumentType::of::<T>();
        if self.mappings.contains_key(&document_type) {
            return self;
        }

        let mut mapping = DocumentMapping::for_document::<T>();
        T::configure(&mut mapping);

        let subclasses: Vec<DocumentMapping> = mapping
            .subclasses()
            .iter()
            .map(|sub| DocumentMapping::subclass_of(&mapping, sub))
            .collect();

        debug!(
            document = %document_type,
            table = mapping.table_name(),
            subclasses = subclasses.len(),
            "registered document"
        );
        self.insert(mapping);
        for sub in subclasses {
            // A subclass registered on its own earlier is replaced by the
            // derived mapping that shares the parent's table.
            if self.mappings.contains_key(&sub.document_type()) {
                self.order.retain(|t| *t != sub.document_type());
            }
            self.insert(sub);
        }
        self
    }

    /// Registers every type in `registrations`.
    pub fn register_all(&mut self, registrations: impl IntoIterator<Item = Registration>) -> &mut Self {
        for registration in registrations {
            (registration.register)(self);
        }
        self
    }

    /// Registers a mapping built by hand.
    pub fn register_mapping(&mut self, mapping: DocumentMapping) -> &mut Self {
        if self.mappings.contains_key(&mapping.document_type()) {
            self.order.retain(|t| *t != mapping.document_type());
        }
        self.insert(mapping);
        self
    }

    fn insert(&mut self, mapping: DocumentMapping) {
        let document_type = mapping.document_type();
        self.order.push(document_type);
        self.mappings.insert(document_type, Arc::new(mapping));
    }

    /// Returns the mapping of `T`.
    pub fn mapping_for<T: 'static>(&self) -> VellumResult<Arc<DocumentMapping>> {
        self.mapping(&DocumentType::of::<T>())
    }

    /// Returns the mapping of a document type.
    pub fn mapping(&self, document_type: &DocumentType) -> VellumResult<Arc<DocumentMapping>> {
        self.mappings
            .get(document_type)
            .cloned()
            .ok_or_else(|| VellumError::unknown_document(document_type.type_name()))
    }

    /// Resolves the concrete type a row of `mapping`'s table was written as.
    pub fn stored_type(
        &self,
        mapping: &DocumentMapping,
        discriminator: &str,
    ) -> VellumResult<DocumentType> {
        let root = self.mapping(&mapping.identity_type())?;
        if discriminator == BASE_DOCUMENT_TYPE {
            return Ok(root.document_type());
        }
        root.subclass_for(discriminator).ok_or_else(|| {
            VellumError::execution(format!(
                "unknown discriminator '{}' in {}",
                discriminator,
                root.table_name()
            ))
        })
    }

    /// Returns true if `T` is registered.
    pub fn is_registered<T: 'static>(&self) -> bool {
        self.mappings.contains_key(&DocumentType::of::<T>())
    }

    /// Returns every mapping in registration order.
    pub fn all_document_mappings(&self) -> impl Iterator<Item = &Arc<DocumentMapping>> + '_ {
        self.order.iter().filter_map(|t| self.mappings.get(t))
    }
}
