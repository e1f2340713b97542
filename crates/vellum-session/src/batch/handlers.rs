//! Result handlers: one per query in a batch.
//!
//! A handler receives exactly the rows of its own result set and resolves
//! its future with the typed result, or with an error that belongs to that
//! query alone (cardinality, deserialization).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use vellum_client::Row;
use vellum_common::{DocumentId, VellumError, VellumResult};
use vellum_query::ResultOperator;
use vellum_schema::{Document, StoreOptions};

use super::future::Completion;
use crate::identity_map::{resident_handle, track_view, IdentityMap};
use crate::serializer::{from_tree, Serializer};
use crate::tracked::{DocumentHandle, TrackedEntity};

/// Column positions of a hydration select.
const DATA_INDEX: usize = 0;
const ID_INDEX: usize = 1;
const DISCRIMINATOR_INDEX: usize = 2;

/// State shared by handlers while a batch is read.
pub(crate) struct HandlerContext<'a> {
    pub(crate) options: &'a StoreOptions,
    pub(crate) identity_map: &'a mut dyn IdentityMap,
    pub(crate) serializer: &'a dyn Serializer,
}

impl HandlerContext<'_> {
    /// Resolves a row to a document, reusing the cached instance if there is one.
    ///
    /// In a hierarchy the row's discriminator decides its concrete type. A
    /// row stored as another type than `T` is returned as a read-only view.
    pub(crate) fn hydrate<T: Document>(&mut self, row: &Row) -> VellumResult<DocumentHandle<T>> {
        let mapping = self.options.mapping_for::<T>()?;
        let id = row.id(ID_INDEX)?;
        if let Some(existing) = resident_handle::<T>(self.identity_map, &mapping, &id)? {
            return Ok(existing);
        }

        let stored_as = match row.opt_str(DISCRIMINATOR_INDEX) {
            Some(discriminator) if mapping.is_hierarchy() => {
                self.options.stored_type(&mapping, discriminator)?
            }
            _ => mapping.document_type(),
        };
        let tree = self.serializer.from_json(&row.json(DATA_INDEX)?)?;
        if stored_as != mapping.document_type() {
            return track_view(self.identity_map, &mapping, stored_as, id, tree);
        }

        let document: T = from_tree(tree.clone())?;
        let handle = Arc::new(RwLock::new(document));
        self.identity_map.store_loaded(
            TrackedEntity::new(id, Arc::clone(&handle), Some(tree))
                .keyed_by(mapping.identity_type()),
        );
        Ok(handle)
    }

    fn hydrate_all<T: Document>(&mut self, rows: &[Row]) -> VellumResult<Vec<DocumentHandle<T>>> {
        rows.iter().map(|row| self.hydrate(row)).collect()
    }
}

/// Consumes one result set.
pub(crate) trait ResultHandler: Send {
    /// Resolves the future from the handler's rows.
    fn complete(self: Box<Self>, rows: Vec<Row>, ctx: &mut HandlerContext<'_>);

    /// Resolves the future with an error.
    fn fail(self: Box<Self>, error: VellumError);
}

/// Every row as a document.
pub(crate) struct ListHandler<T> {
    tx: Completion<Vec<DocumentHandle<T>>>,
}

impl<T> ListHandler<T> {
    pub(crate) fn new(tx: Completion<Vec<DocumentHandle<T>>>) -> Self {
        Self { tx }
    }
}

impl<T: Document> ResultHandler for ListHandler<T> {
    fn complete(self: Box<Self>, rows: Vec<Row>, ctx: &mut HandlerContext<'_>) {
        let _ = self.tx.send(ctx.hydrate_all(&rows));
    }

    fn fail(self: Box<Self>, error: VellumError) {
        let _ = self.tx.send(Err(error));
    }
}

/// A document by id.
pub(crate) struct LoadHandler<T> {
    tx: Completion<Option<DocumentHandle<T>>>,
}

impl<T> LoadHandler<T> {
    pub(crate) fn new(tx: Completion<Option<DocumentHandle<T>>>) -> Self {
        Self { tx }
    }
}

impl<T: Document> ResultHandler for LoadHandler<T> {
    fn complete(self: Box<Self>, rows: Vec<Row>, ctx: &mut HandlerContext<'_>) {
        let result = rows.first().map(|row| ctx.hydrate(row)).transpose();
        let _ = self.tx.send(result);
    }

    fn fail(self: Box<Self>, error: VellumError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Documents by id, merged with the ones already in the identity map.
///
/// Results follow the order the ids were requested in; missing ids are
/// skipped and an id requested twice yields the same handle twice.
pub(crate) struct LoadManyHandler<T> {
    ids: Vec<DocumentId>,
    resident: HashMap<DocumentId, DocumentHandle<T>>,
    tx: Completion<Vec<DocumentHandle<T>>>,
}

impl<T> LoadManyHandler<T> {
    pub(crate) fn new(
        ids: Vec<DocumentId>,
        resident: HashMap<DocumentId, DocumentHandle<T>>,
        tx: Completion<Vec<DocumentHandle<T>>>,
    ) -> Self {
        Self { ids, resident, tx }
    }

    fn resolve(
        ids: &[DocumentId],
        mut found: HashMap<DocumentId, DocumentHandle<T>>,
        rows: &[Row],
        ctx: &mut HandlerContext<'_>,
    ) -> VellumResult<Vec<DocumentHandle<T>>>
    where
        T: Document,
    {
        for row in rows {
            let id = row.id(ID_INDEX)?;
            let handle = ctx.hydrate::<T>(row)?;
            found.insert(id, handle);
        }
        Ok(Self::assemble(ids, found))
    }

    /// Assembles the final list from resolved documents.
    pub(crate) fn assemble(
        ids: &[DocumentId],
        found: HashMap<DocumentId, DocumentHandle<T>>,
    ) -> Vec<DocumentHandle<T>> {
        ids.iter().filter_map(|id| found.get(id).cloned()).collect()
    }
}

impl<T: Document> ResultHandler for LoadManyHandler<T> {
    fn complete(self: Box<Self>, rows: Vec<Row>, ctx: &mut HandlerContext<'_>) {
        let Self { ids, resident, tx } = *self;
        let _ = tx.send(Self::resolve(&ids, resident, &rows, ctx));
    }

    fn fail(self: Box<Self>, error: VellumError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Completion of a single-document operator.
pub(crate) enum OneCompletion<T> {
    /// `First` / `Single`: a document is required.
    Required(Completion<DocumentHandle<T>>),
    /// `FirstOrDefault` / `SingleOrDefault`.
    Optional(Completion<Option<DocumentHandle<T>>>),
}

/// First / Single and their `OrDefault` forms.
pub(crate) struct OneHandler<T> {
    operator: ResultOperator,
    tx: OneCompletion<T>,
}

impl<T> OneHandler<T> {
    pub(crate) fn new(operator: ResultOperator, tx: OneCompletion<T>) -> Self {
        Self { operator, tx }
    }
}

/// Checks the row count against a cardinality operator.
pub(crate) fn check_cardinality(operator: ResultOperator, rows: usize) -> VellumResult<()> {
    let violation = match (operator, rows) {
        (ResultOperator::First, 0) => Some("at least one row"),
        (ResultOperator::Single, n) if n != 1 => Some("exactly one row"),
        (ResultOperator::SingleOrDefault, n) if n > 1 => Some("at most one row"),
        _ => None,
    };
    match violation {
        Some(expected) => Err(VellumError::cardinality(operator.name(), expected, rows)),
        None => Ok(()),
    }
}

impl<T: Document> ResultHandler for OneHandler<T> {
    fn complete(self: Box<Self>, rows: Vec<Row>, ctx: &mut HandlerContext<'_>) {
        let Self { operator, tx } = *self;
        let result = check_cardinality(operator, rows.len())
            .and_then(|()| rows.first().map(|row| ctx.hydrate::<T>(row)).transpose());

        match tx {
            OneCompletion::Optional(tx) => {
                let _ = tx.send(result);
            }
            OneCompletion::Required(tx) => {
                let _ = tx.send(result.and_then(|found| {
                    found.ok_or_else(|| {
                        VellumError::cardinality(operator.name(), "at least one row", 0)
                    })
                }));
            }
        }
    }

    fn fail(self: Box<Self>, error: VellumError) {
        match self.tx {
            OneCompletion::Optional(tx) => {
                let _ = tx.send(Err(error));
            }
            OneCompletion::Required(tx) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

/// One column of one row.
pub(crate) struct ScalarHandler<S> {
    read: fn(&Row) -> VellumResult<S>,
    tx: Completion<S>,
}

impl<S> ScalarHandler<S> {
    pub(crate) fn new(read: fn(&Row) -> VellumResult<S>, tx: Completion<S>) -> Self {
        Self { read, tx }
    }
}

impl<S: Send + 'static> ResultHandler for ScalarHandler<S> {
    fn complete(self: Box<Self>, rows: Vec<Row>, _ctx: &mut HandlerContext<'_>) {
        let result = match rows.first() {
            Some(row) => (self.read)(row),
            None => Err(VellumError::execution("scalar query returned no rows")),
        };
        let _ = self.tx.send(result);
    }

    fn fail(self: Box<Self>, error: VellumError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Reads `select (count(*) > 0) as result`.
pub(crate) fn read_any(row: &Row) -> VellumResult<bool> {
    row.bool(0)
}

/// Reads `select count(*)`.
pub(crate) fn read_count(row: &Row) -> VellumResult<i64> {
    row.i64(0)
}
