//! Batched queries.
//!
//! A [`BatchedQuery`] collects independent queries into one multi-statement
//! command and one ordered list of result handlers. Executing it costs a
//! single round trip; each handler then reads its own result set, in the
//! order the queries were added, and resolves its [`BatchFuture`].
//!
//! ```rust,ignore
//! let mut batch = session.batch();
//! let user = batch.load::<User>(3)?;
//! let admins = batch.query(Query::<User>::new().filter(field("Role").eq("admin")))?;
//! let total = batch.count(Query::<Issue>::new())?;
//! batch.execute().await?;
//!
//! let user = user.await?;
//! let admins = admins.await?;
//! let total = total.await?;
//! ```

mod future;
pub(crate) mod handlers;

pub use future::BatchFuture;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use vellum_client::{Command, Connection, ResultSetReader, Row, SqlFragment};
use vellum_common::{DocumentId, Value, VellumError, VellumResult};
use vellum_query::{field, DocumentQuery, Query, QueryModel, ResultOperator};
use vellum_schema::{Document, DocumentMapping};

use self::handlers::{
    read_any, read_count, HandlerContext, ListHandler, LoadHandler, LoadManyHandler,
    OneCompletion, OneHandler, ResultHandler, ScalarHandler,
};
use crate::identity_map::resident_handle;
use crate::session::SessionCore;
use crate::tracked::DocumentHandle;

/// Queries waiting to be sent together.
pub struct BatchedQuery<'s> {
    core: &'s mut SessionCore,
    command: Command,
    handlers: Vec<Box<dyn ResultHandler>>,
}

impl<'s> BatchedQuery<'s> {
    pub(crate) fn new(core: &'s mut SessionCore) -> Self {
        Self {
            core,
            command: Command::new(),
            handlers: Vec::new(),
        }
    }

    /// Number of queries that will hit the database.
    pub fn pending_queries(&self) -> usize {
        self.handlers.len()
    }

    /// The command that [`execute`](Self::execute) will send.
    pub fn command(&self) -> &Command {
        &self.command
    }

    fn enqueue(&mut self, statement: SqlFragment, handler: Box<dyn ResultHandler>) {
        self.command.append_statement(statement);
        self.handlers.push(handler);
    }

    fn mapping(&self, model: &QueryModel) -> VellumResult<Arc<DocumentMapping>> {
        self.core.options().mapping(&model.document_type())
    }

    fn render(&self, model: &QueryModel) -> VellumResult<SqlFragment> {
        let mapping = self.mapping(model)?;
        DocumentQuery::new(&mapping, model).to_fragment()
    }

    /// Loads a document by id.
    ///
    /// A document already in the identity map resolves immediately and adds
    /// nothing to the command.
    pub fn load<T: Document>(
        &mut self,
        id: impl Into<DocumentId>,
    ) -> VellumResult<BatchFuture<Option<DocumentHandle<T>>>> {
        let id = id.into();
        let mapping = self.core.options().mapping_for::<T>()?;

        if let Some(handle) = resident_handle::<T>(self.core.identity_map_mut(), &mapping, &id)? {
            debug!(document = std::any::type_name::<T>(), %id, "load resolved from identity map");
            return Ok(BatchFuture::ready(Ok(Some(handle))));
        }

        let model = QueryModel::of::<T>().filter(field("Id").eq(id.to_value()));
        let statement = self.render(&model)?;
        let (tx, future) = BatchFuture::pending();
        self.enqueue(statement, Box::new(LoadHandler::<T>::new(tx)));
        Ok(future)
    }

    /// Loads several documents by id, in the order given.
    ///
    /// Only ids missing from the identity map are queried, each once.
    pub fn load_many<T, I>(&mut self, ids: I) -> VellumResult<BatchFuture<Vec<DocumentHandle<T>>>>
    where
        T: Document,
        I: IntoIterator,
        I::Item: Into<DocumentId>,
    {
        let mapping = self.core.options().mapping_for::<T>()?;
        let ids: Vec<DocumentId> = ids.into_iter().map(Into::into).collect();

        let mut resident = HashMap::new();
        let mut missing: Vec<&DocumentId> = Vec::new();
        for id in &ids {
            if resident.contains_key(id) || missing.contains(&id) {
                continue;
            }
            match resident_handle::<T>(self.core.identity_map_mut(), &mapping, id)? {
                Some(handle) => {
                    resident.insert(id.clone(), handle);
                }
                None => missing.push(id),
            }
        }

        if missing.is_empty() {
            debug!(
                document = std::any::type_name::<T>(),
                count = ids.len(),
                "load_many resolved from identity map"
            );
            return Ok(BatchFuture::ready(Ok(
                LoadManyHandler::<T>::assemble(&ids, resident),
            )));
        }

        let missing: Vec<Value> = missing.into_iter().map(DocumentId::to_value).collect();
        let model = QueryModel::of::<T>().filter(field("Id").is_in(missing));
        let statement = self.render(&model)?;
        let (tx, future) = BatchFuture::pending();
        self.enqueue(
            statement,
            Box::new(LoadManyHandler::<T>::new(ids, resident, tx)),
        );
        Ok(future)
    }

    /// Every document matching the query.
    pub fn query<T: Document>(
        &mut self,
        query: Query<T>,
    ) -> VellumResult<BatchFuture<Vec<DocumentHandle<T>>>> {
        let statement = self.render(&query.into_model(ResultOperator::None))?;
        let (tx, future) = BatchFuture::pending();
        self.enqueue(statement, Box::new(ListHandler::<T>::new(tx)));
        Ok(future)
    }

    fn one<T: Document>(
        &mut self,
        query: Query<T>,
        operator: ResultOperator,
        tx: OneCompletion<T>,
    ) -> VellumResult<()> {
        let statement = self.render(&query.into_model(operator))?;
        self.enqueue(statement, Box::new(OneHandler::new(operator, tx)));
        Ok(())
    }

    /// The first matching document; no match is a cardinality violation.
    pub fn first<T: Document>(&mut self, query: Query<T>) -> VellumResult<BatchFuture<DocumentHandle<T>>> {
        let (tx, future) = BatchFuture::pending();
        self.one(query, ResultOperator::First, OneCompletion::Required(tx))?;
        Ok(future)
    }

    /// The first matching document, if any.
    pub fn first_or_default<T: Document>(
        &mut self,
        query: Query<T>,
    ) -> VellumResult<BatchFuture<Option<DocumentHandle<T>>>> {
        let (tx, future) = BatchFuture::pending();
        self.one(query, ResultOperator::FirstOrDefault, OneCompletion::Optional(tx))?;
        Ok(future)
    }

    /// The only matching document; zero or several matches are violations.
    pub fn single<T: Document>(&mut self, query: Query<T>) -> VellumResult<BatchFuture<DocumentHandle<T>>> {
        let (tx, future) = BatchFuture::pending();
        self.one(query, ResultOperator::Single, OneCompletion::Required(tx))?;
        Ok(future)
    }

    /// The only matching document, if any; several matches are a violation.
    pub fn single_or_default<T: Document>(
        &mut self,
        query: Query<T>,
    ) -> VellumResult<BatchFuture<Option<DocumentHandle<T>>>> {
        let (tx, future) = BatchFuture::pending();
        self.one(query, ResultOperator::SingleOrDefault, OneCompletion::Optional(tx))?;
        Ok(future)
    }

    /// Whether any document matches.
    pub fn any<T: Document>(&mut self, query: Query<T>) -> VellumResult<BatchFuture<bool>> {
        let statement = self.render(&query.into_model(ResultOperator::Any))?;
        let (tx, future) = BatchFuture::pending();
        self.enqueue(statement, Box::new(ScalarHandler::new(read_any, tx)));
        Ok(future)
    }

    /// Number of matching documents.
    pub fn count<T: Document>(&mut self, query: Query<T>) -> VellumResult<BatchFuture<i64>> {
        let statement = self.render(&query.into_model(ResultOperator::Count))?;
        let (tx, future) = BatchFuture::pending();
        self.enqueue(statement, Box::new(ScalarHandler::new(read_count, tx)));
        Ok(future)
    }

    /// Documents from raw SQL with `?` placeholders.
    ///
    /// SQL that does not start with `select` is treated as the tail of the
    /// mapping's select, e.g. `where d.data ->> 'Color' = ?`.
    pub fn query_sql<T: Document>(
        &mut self,
        sql: &str,
        params: Vec<Value>,
    ) -> VellumResult<BatchFuture<Vec<DocumentHandle<T>>>> {
        let mapping = self.core.options().mapping_for::<T>()?;
        let statement = raw_statement(&mapping, sql, params)?;
        let (tx, future) = BatchFuture::pending();
        self.enqueue(statement, Box::new(ListHandler::<T>::new(tx)));
        Ok(future)
    }

    /// Sends the batch and resolves every future.
    pub async fn execute(self) -> VellumResult<()> {
        self.execute_with(&CancellationToken::new()).await
    }

    /// Sends the batch; cancelling `cancel` aborts the read and fails every
    /// future not yet resolved.
    pub async fn execute_with(self, cancel: &CancellationToken) -> VellumResult<()> {
        let BatchedQuery {
            core,
            command,
            handlers,
        } = self;
        core.run_batch(command, handlers, cancel).await
    }
}

/// Builds the statement of a raw SQL query.
pub(crate) fn raw_statement(
    mapping: &DocumentMapping,
    sql: &str,
    params: Vec<Value>,
) -> VellumResult<SqlFragment> {
    let trimmed = sql.trim();
    let is_select = trimmed
        .get(..6)
        .map_or(false, |head| head.eq_ignore_ascii_case("select"));
    if is_select {
        SqlFragment::from_template(trimmed, params)
    } else {
        let mut statement = SqlFragment::raw(format!("{} ", mapping.select_clause()));
        statement.append(SqlFragment::from_template(trimmed, params)?);
        Ok(statement)
    }
}

/// Executes a command and feeds each handler its result set.
pub(crate) async fn run(
    connection: &mut dyn Connection,
    command: &Command,
    handlers: Vec<Box<dyn ResultHandler>>,
    ctx: &mut HandlerContext<'_>,
    cancel: &CancellationToken,
) -> VellumResult<()> {
    let mut pending: VecDeque<Box<dyn ResultHandler>> = handlers.into();

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(VellumError::Cancelled),
        result = drive(connection, command, &mut pending, ctx) => result,
    };

    if let Err(error) = &outcome {
        debug!(pending = pending.len(), error = %error, "batch failed");
        fail_all(pending, error);
    }
    outcome
}

async fn drive(
    connection: &mut dyn Connection,
    command: &Command,
    pending: &mut VecDeque<Box<dyn ResultHandler>>,
    ctx: &mut HandlerContext<'_>,
) -> VellumResult<()> {
    let mut reader = connection.execute_reader(command).await?;
    let mut first = true;

    while !pending.is_empty() {
        // Every handler after the first starts by stepping over the
        // boundary into its own result set.
        if !first && !reader.next_result().await? {
            return Err(VellumError::execution(format!(
                "expected {} more result set(s)",
                pending.len()
            )));
        }
        first = false;

        let rows = read_rows(&mut *reader).await?;
        if let Some(handler) = pending.pop_front() {
            handler.complete(rows, ctx);
        }
    }
    Ok(())
}

async fn read_rows(reader: &mut dyn ResultSetReader) -> VellumResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = reader.next_row().await? {
        rows.push(row);
    }
    Ok(rows)
}

/// Fails every handler with the same error.
pub(crate) fn fail_all(handlers: impl IntoIterator<Item = Box<dyn ResultHandler>>, error: &VellumError) {
    for handler in handlers {
        handler.fail(error.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use vellum_client::MemoryConnectionFactory;

    use super::*;
    use crate::testing::{note_row, store, Note};

    #[tokio::test]
    async fn test_resident_load_adds_no_statement() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.open_session();
        let kept = session.store(Note::new("kept")).await.unwrap();
        let kept_id = kept.read().id;

        factory.push_result_sets(vec![
            vec![note_row(5, "a")],
            vec![Row::new(vec![Value::Integer(2)])],
        ]);

        let mut batch = session.batch();
        let resident = batch.load::<Note>(kept_id).unwrap();
        let fresh = batch
            .query(Query::<Note>::new().filter(field("text").eq("a")))
            .unwrap();
        let count = batch.count(Query::<Note>::new()).unwrap();
        assert_eq!(batch.pending_queries(), 2);
        batch.execute().await.unwrap();

        assert!(Arc::ptr_eq(&resident.await.unwrap().unwrap(), &kept));
        let fresh = fresh.await.unwrap();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].read().text, "a");
        assert_eq!(count.await.unwrap(), 2);

        assert_eq!(factory.round_trips(), 1);
        assert_eq!(factory.last_executed().unwrap().statement_count, 2);
    }

    #[tokio::test]
    async fn test_load_many_queries_only_missing_ids() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.open_session();
        let kept = session.store(Note::new("kept")).await.unwrap();
        let kept_id = kept.read().id;

        factory.push_result_sets(vec![vec![note_row(30, "thirty")]]);
        let notes = session.load_many::<Note, _>([30, kept_id, 40]).await.unwrap();

        let ids: Vec<i64> = notes.iter().map(|n| n.read().id).collect();
        assert_eq!(ids, vec![30, kept_id]);

        let executed = factory.last_executed().unwrap();
        assert_eq!(
            executed.params,
            vec![Value::Array(vec![Value::Integer(30), Value::Integer(40)])]
        );
    }

    #[tokio::test]
    async fn test_load_many_repeats_duplicate_ids() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.query_session();

        factory.push_result_sets(vec![vec![note_row(4, "four")]]);
        let notes = session.load_many::<Note, _>([4, 9, 4]).await.unwrap();

        assert_eq!(notes.len(), 2);
        assert!(Arc::ptr_eq(&notes[0], &notes[1]));
        assert_eq!(
            factory.last_executed().unwrap().params,
            vec![Value::Array(vec![Value::Integer(4), Value::Integer(9)])]
        );
    }

    #[tokio::test]
    async fn test_execution_error_fails_every_future() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.query_session();

        factory.push_failure(VellumError::execution("relation does not exist"));

        let mut batch = session.batch();
        let list = batch.query(Query::<Note>::new()).unwrap();
        let any = batch.any(Query::<Note>::new()).unwrap();
        assert!(batch.execute().await.is_err());

        assert!(matches!(list.await, Err(VellumError::Execution { .. })));
        assert!(matches!(any.await, Err(VellumError::Execution { .. })));
    }

    #[tokio::test]
    async fn test_missing_result_set_keeps_resolved_handlers() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.query_session();

        factory.push_result_sets(vec![vec![note_row(1, "only")]]);

        let mut batch = session.batch();
        let first = batch.query(Query::<Note>::new()).unwrap();
        let second = batch.count(Query::<Note>::new()).unwrap();
        assert!(batch.execute().await.is_err());

        assert_eq!(first.await.unwrap().len(), 1);
        assert!(second.await.is_err());
    }

    #[tokio::test]
    async fn test_cancellation_fails_pending_futures() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.query_session();

        factory.push_stall();

        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let mut batch = session.batch();
        let list = batch.query(Query::<Note>::new()).unwrap();
        let count = batch.count(Query::<Note>::new()).unwrap();

        let result = batch.execute_with(&token).await;
        assert!(matches!(result, Err(VellumError::Cancelled)));
        assert!(matches!(list.await, Err(VellumError::Cancelled)));
        assert!(matches!(count.await, Err(VellumError::Cancelled)));
    }

    #[tokio::test]
    async fn test_empty_batch_skips_round_trip() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mut session = store.query_session();

        session.batch().execute().await.unwrap();
        assert_eq!(factory.round_trips(), 0);
        assert_eq!(factory.connections_opened(), 0);
    }

    #[test]
    fn test_raw_where_body_gets_select_prefix() {
        let factory = MemoryConnectionFactory::new();
        let store = store(&factory);
        let mapping = store.options().mapping_for::<Note>().unwrap();

        let (sql, params) = raw_statement(&mapping, "where d.data ->> 'text' = ?", vec!["a".into()])
            .unwrap()
            .build_with_params();
        assert_eq!(sql, "select d.data, d.id from mt_doc_note d where d.data ->> 'text' = $1");
        assert_eq!(params, vec![Value::String("a".into())]);

        let (sql, _) = raw_statement(&mapping, "SELECT data, id FROM mt_doc_note", vec![])
            .unwrap()
            .build_with_params();
        assert_eq!(sql, "SELECT data, id FROM mt_doc_note");
    }
}
