//! Document and query sessions.
//!
//! A session owns one identity map and, once the first command runs, one
//! connection. Reads go through the same handler pipeline as
//! [`BatchedQuery`]; a single read is simply a batch of one.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vellum_client::{Command, Connection, ConnectionFactory, TransactionOptions};
use vellum_common::{DocumentId, IdentityMapKind, Value, VellumError, VellumResult};
use vellum_query::Query;
use vellum_schema::{Document, StoreOptions};

use crate::batch::handlers::{HandlerContext, ResultHandler};
use crate::batch::{self, fail_all, BatchedQuery};
use crate::identity_map::{identity_map_for, IdentityMap};
use crate::store::StoreInner;
use crate::tracked::{DocumentHandle, TrackedEntity};
use crate::unit_of_work::{build_command, PendingChanges, UnitOfWork};

/// State shared by every session kind.
pub struct SessionCore {
    inner: Arc<StoreInner>,
    identity_map: Box<dyn IdentityMap>,
    connection: Option<Box<dyn Connection>>,
}

/// Opens the session connection on first use.
async fn open_connection<'a>(
    slot: &'a mut Option<Box<dyn Connection>>,
    factory: &dyn ConnectionFactory,
) -> VellumResult<&'a mut Box<dyn Connection>> {
    if slot.is_none() {
        *slot = Some(factory.create().await?);
        debug!("session connection opened");
    }
    slot.as_mut()
        .ok_or_else(|| VellumError::internal("session connection was not opened"))
}

impl SessionCore {
    pub(crate) fn new(inner: Arc<StoreInner>, kind: IdentityMapKind) -> Self {
        Self {
            inner,
            identity_map: identity_map_for(kind),
            connection: None,
        }
    }

    /// Registered document mappings.
    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    /// The session's identity map.
    pub fn identity_map(&self) -> &dyn IdentityMap {
        self.identity_map.as_ref()
    }

    pub(crate) fn identity_map_mut(&mut self) -> &mut dyn IdentityMap {
        &mut *self.identity_map
    }

    /// Returns true once the session has opened its connection.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn log_command(&self, command: &Command) {
        if self.inner.options.config().log_sql {
            debug!(sql = %command.sql(), "executing command");
        }
    }

    pub(crate) async fn run_batch(
        &mut self,
        command: Command,
        handlers: Vec<Box<dyn ResultHandler>>,
        cancel: &CancellationToken,
    ) -> VellumResult<()> {
        if handlers.is_empty() {
            debug!("batch resolved without a round trip");
            return Ok(());
        }
        debug!(
            statements = command.statement_count(),
            handlers = handlers.len(),
            "executing batch"
        );
        self.log_command(&command);

        let Self {
            inner,
            identity_map,
            connection,
        } = self;

        let connection = match open_connection(connection, inner.factory.as_ref()).await {
            Ok(connection) => connection,
            Err(error) => {
                fail_all(handlers, &error);
                return Err(error);
            }
        };

        let mut ctx = HandlerContext {
            options: &inner.options,
            identity_map: &mut **identity_map,
            serializer: inner.serializer.as_ref(),
        };
        batch::run(&mut **connection, &command, handlers, &mut ctx, cancel).await
    }

    /// Starts a batch of queries sent in one round trip.
    pub fn batch(&mut self) -> BatchedQuery<'_> {
        BatchedQuery::new(self)
    }

    /// Loads a document by id.
    pub async fn load<T: Document>(
        &mut self,
        id: impl Into<DocumentId>,
    ) -> VellumResult<Option<DocumentHandle<T>>> {
        let mut batch = self.batch();
        let result = batch.load::<T>(id)?;
        batch.execute().await?;
        result.await
    }

    /// Loads several documents by id, in the order given. Missing ids are skipped.
    pub async fn load_many<T, I>(&mut self, ids: I) -> VellumResult<Vec<DocumentHandle<T>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<DocumentId>,
    {
        let mut batch = self.batch();
        let result = batch.load_many::<T, I>(ids)?;
        batch.execute().await?;
        result.await
    }

    /// Every document matching the query.
    pub async fn query<T: Document>(&mut self, query: Query<T>) -> VellumResult<Vec<DocumentHandle<T>>> {
        let mut batch = self.batch();
        let result = batch.query(query)?;
        batch.execute().await?;
        result.await
    }

    /// The first matching document; no match is a cardinality violation.
    pub async fn first<T: Document>(&mut self, query: Query<T>) -> VellumResult<DocumentHandle<T>> {
        let mut batch = self.batch();
        let result = batch.first(query)?;
        batch.execute().await?;
        result.await
    }

    /// The first matching document, if any.
    pub async fn first_or_default<T: Document>(
        &mut self,
        query: Query<T>,
    ) -> VellumResult<Option<DocumentHandle<T>>> {
        let mut batch = self.batch();
        let result = batch.first_or_default(query)?;
        batch.execute().await?;
        result.await
    }

    /// The only matching document.
    pub async fn single<T: Document>(&mut self, query: Query<T>) -> VellumResult<DocumentHandle<T>> {
        let mut batch = self.batch();
        let result = batch.single(query)?;
        batch.execute().await?;
        result.await
    }

    /// The only matching document, if any.
    pub async fn single_or_default<T: Document>(
        &mut self,
        query: Query<T>,
    ) -> VellumResult<Option<DocumentHandle<T>>> {
        let mut batch = self.batch();
        let result = batch.single_or_default(query)?;
        batch.execute().await?;
        result.await
    }

    /// Whether any document matches.
    pub async fn any<T: Document>(&mut self, query: Query<T>) -> VellumResult<bool> {
        let mut batch = self.batch();
        let result = batch.any(query)?;
        batch.execute().await?;
        result.await
    }

    /// Number of matching documents.
    pub async fn count<T: Document>(&mut self, query: Query<T>) -> VellumResult<i64> {
        let mut batch = self.batch();
        let result = batch.count(query)?;
        batch.execute().await?;
        result.await
    }

    /// Documents from raw SQL with `?` placeholders.
    pub async fn query_sql<T: Document>(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> VellumResult<Vec<DocumentHandle<T>>> {
        let mut batch = self.batch();
        let result = batch.query_sql::<T>(sql, params)?;
        batch.execute().await?;
        result.await
    }
}

/// A read-only session.
pub struct QuerySession(SessionCore);

impl QuerySession {
    pub(crate) fn new(core: SessionCore) -> Self {
        Self(core)
    }
}

impl Deref for QuerySession {
    type Target = SessionCore;

    fn deref(&self) -> &SessionCore {
        &self.0
    }
}

impl DerefMut for QuerySession {
    fn deref_mut(&mut self) -> &mut SessionCore {
        &mut self.0
    }
}

/// A session that tracks changes and writes them with [`save_changes`].
///
/// [`save_changes`]: DocumentSession::save_changes
pub struct DocumentSession {
    core: SessionCore,
    unit_of_work: UnitOfWork,
}

impl Deref for DocumentSession {
    type Target = SessionCore;

    fn deref(&self) -> &SessionCore {
        &self.core
    }
}

impl DerefMut for DocumentSession {
    fn deref_mut(&mut self) -> &mut SessionCore {
        &mut self.core
    }
}

impl DocumentSession {
    pub(crate) fn new(core: SessionCore) -> Self {
        Self {
            core,
            unit_of_work: UnitOfWork::new(),
        }
    }

    /// Tracks a new or existing document for the next save.
    ///
    /// A document without an id gets one from its mapping's id strategy.
    /// The returned handle is the session's instance: later loads of the
    /// same id return it.
    pub async fn store<T: Document>(&mut self, mut document: T) -> VellumResult<DocumentHandle<T>> {
        let mapping = self.core.options().mapping_for::<T>()?;
        if let Some(id) = mapping
            .ensure_id(document.id(), &self.core.inner.sequences)
            .await?
        {
            document.set_id(id);
        }

        let id = document.id();
        let handle = Arc::new(RwLock::new(document));
        self.core.identity_map.store(
            TrackedEntity::new(id, Arc::clone(&handle), None).keyed_by(mapping.identity_type()),
        );
        Ok(handle)
    }

    /// Queues a tracked document for deletion.
    pub fn delete<T: Document>(&mut self, document: &DocumentHandle<T>) -> VellumResult<()> {
        let id = document.read().id();
        self.delete_by_id::<T>(id)
    }

    /// Queues a document for deletion by id.
    pub fn delete_by_id<T: Document>(&mut self, id: impl Into<DocumentId>) -> VellumResult<()> {
        let mapping = self.core.options().mapping_for::<T>()?;
        self.unit_of_work.delete(&mapping, id.into());
        Ok(())
    }

    /// What the next [`save_changes`](Self::save_changes) would write.
    pub fn pending_changes(&self) -> VellumResult<PendingChanges> {
        let upserts = self
            .core
            .identity_map
            .dirty_entries()?
            .into_iter()
            .filter(|c| !self.unit_of_work.is_deleted(&c.identity_type, &c.id))
            .collect();
        Ok(PendingChanges {
            upserts,
            deletes: self.unit_of_work.deletes().to_vec(),
        })
    }

    /// Writes every pending change in one transaction and one round trip.
    ///
    /// On success snapshots are refreshed and deleted documents evicted; on
    /// failure the transaction is rolled back and tracked state is untouched.
    pub async fn save_changes(&mut self) -> VellumResult<()> {
        let changes = self.pending_changes()?;
        if changes.is_empty() {
            debug!("save_changes: nothing to write");
            return Ok(());
        }

        let command = build_command(
            self.core.options(),
            self.core.inner.serializer.as_ref(),
            &changes,
        )?;
        self.core.log_command(&command);

        let SessionCore {
            inner, connection, ..
        } = &mut self.core;
        let connection = open_connection(connection, inner.factory.as_ref()).await?;
        write_in_transaction(&mut **connection, &command).await?;

        debug!(
            upserts = changes.upserts.len(),
            deletes = changes.deletes.len(),
            "changes saved"
        );

        let map = &mut self.core.identity_map;
        map.mark_saved(&changes.upserts);
        for delete in &changes.deletes {
            map.remove(&delete.identity_type, &delete.id);
        }
        self.unit_of_work.clear();
        Ok(())
    }
}

async fn write_in_transaction(connection: &mut dyn Connection, command: &Command) -> VellumResult<()> {
    connection.begin(TransactionOptions::default()).await?;
    match connection.execute(command).await {
        Ok(_) => connection.commit().await,
        Err(error) => {
            if let Err(rollback) = connection.rollback().await {
                debug!(error = %rollback, "rollback after failed save also failed");
            }
            Err(error)
        }
    }
}
