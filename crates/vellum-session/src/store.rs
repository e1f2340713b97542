//! The document store: entry point that opens sessions.

use std::sync::Arc;

use tracing::info;
use vellum_client::{ConnectionFactory, PgConnectionFactory};
use vellum_common::{IdentityMapKind, VellumResult};
use vellum_schema::{DatabaseHiloCounter, HiloCounter, SequenceFactory, StoreOptions};

use crate::serializer::{JsonSerializer, Serializer};
use crate::session::{DocumentSession, QuerySession, SessionCore};

/// Shared by the store and every session it opens.
pub(crate) struct StoreInner {
    pub(crate) options: StoreOptions,
    pub(crate) factory: Arc<dyn ConnectionFactory>,
    pub(crate) sequences: Arc<SequenceFactory>,
    pub(crate) serializer: Arc<dyn Serializer>,
}

/// Registered mappings, a connection factory and the Hi/Lo sequences.
///
/// Cheap to clone; clones share sequences, so ids stay unique across them.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

impl DocumentStore {
    /// Creates a store whose Hi/Lo counter lives in the database behind `factory`.
    pub fn new(options: StoreOptions, factory: Arc<dyn ConnectionFactory>) -> VellumResult<Self> {
        let counter = Arc::new(DatabaseHiloCounter::new(Arc::clone(&factory)));
        Self::with_counter(options, factory, counter)
    }

    /// Creates a store with an explicit Hi/Lo counter.
    pub fn with_counter(
        options: StoreOptions,
        factory: Arc<dyn ConnectionFactory>,
        counter: Arc<dyn HiloCounter>,
    ) -> VellumResult<Self> {
        options.config().validate()?;
        let sequences = Arc::new(SequenceFactory::new(counter, options.config().hilo));
        info!(
            documents = options.all_document_mappings().count(),
            identity_map = ?options.config().identity_map,
            "document store created"
        );
        Ok(Self {
            inner: Arc::new(StoreInner {
                options,
                factory,
                sequences,
                serializer: Arc::new(JsonSerializer),
            }),
        })
    }

    /// Creates a store connected to PostgreSQL with the configured connection string.
    pub fn connect(options: StoreOptions) -> VellumResult<Self> {
        let factory = Arc::new(PgConnectionFactory::new(options.config())?);
        Self::new(options, factory)
    }

    /// Replaces the serializer. Only affects sessions opened afterwards.
    pub fn with_serializer(self, serializer: Arc<dyn Serializer>) -> Self {
        let inner = StoreInner {
            options: self.inner.options.clone(),
            factory: Arc::clone(&self.inner.factory),
            sequences: Arc::clone(&self.inner.sequences),
            serializer,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Registered mappings.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// Hi/Lo sequences shared by every session.
    pub fn sequences(&self) -> &SequenceFactory {
        &self.inner.sequences
    }

    /// Opens a session with the configured identity map.
    pub fn open_session(&self) -> DocumentSession {
        self.open_session_with(self.inner.options.config().identity_map)
    }

    /// Opens a session with a specific identity map.
    pub fn open_session_with(&self, kind: IdentityMapKind) -> DocumentSession {
        DocumentSession::new(SessionCore::new(Arc::clone(&self.inner), kind))
    }

    /// Opens a read-only session with the configured identity map.
    pub fn query_session(&self) -> QuerySession {
        self.query_session_with(self.inner.options.config().identity_map)
    }

    /// Opens a read-only session with a specific identity map.
    pub fn query_session_with(&self, kind: IdentityMapKind) -> QuerySession {
        QuerySession::new(SessionCore::new(Arc::clone(&self.inner), kind))
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}
