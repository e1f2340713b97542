//! In-process transport with scripted responses.
//!
//! Every command sent through a [`MemoryConnectionFactory`] connection is
//! recorded, and responses are replayed in the order they were queued. It
//! backs the unit tests of the higher crates, where no server is available.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use vellum_common::{Value, VellumError, VellumResult};

use crate::command::Command;
use crate::connection::{BufferedResultSets, Connection, ConnectionFactory, ResultSetReader, Row};
use crate::transaction::TransactionOptions;

/// A queued response for the next command.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Result sets returned to a reader, in statement order.
    ResultSets(Vec<Vec<Row>>),
    /// Affected row count for a non-query command.
    Affected(u64),
    /// The command fails with this error.
    Fail(VellumError),
    /// The command never completes.
    Stall,
}

/// A command observed by the memory transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedCommand {
    /// Rendered command text.
    pub sql: String,
    /// Shared parameter set.
    pub params: Vec<Value>,
    /// Number of statements in the command.
    pub statement_count: usize,
    /// Whether a transaction was open when it ran.
    pub in_transaction: bool,
}

/// Transaction boundary observed by the memory transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEvent {
    /// A transaction was started.
    Begin(TransactionOptions),
    /// The transaction was committed.
    Commit,
    /// The transaction was rolled back.
    Rollback,
}

#[derive(Debug, Default)]
struct MemoryState {
    responses: VecDeque<ScriptedResponse>,
    executed: Vec<ExecutedCommand>,
    events: Vec<TransactionEvent>,
    connections_opened: usize,
}

/// Connection factory for the memory transport.
///
/// Clones share the same script and log.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnectionFactory {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryConnectionFactory {
    /// Creates a factory with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues result sets for the next command.
    pub fn push_result_sets(&self, result_sets: Vec<Vec<Row>>) {
        self.push(ScriptedResponse::ResultSets(result_sets));
    }

    /// Queues an affected row count for the next command.
    pub fn push_affected(&self, rows: u64) {
        self.push(ScriptedResponse::Affected(rows));
    }

    /// Makes the next command fail.
    pub fn push_failure(&self, error: VellumError) {
        self.push(ScriptedResponse::Fail(error));
    }

    /// Makes the next command hang until its caller gives up.
    pub fn push_stall(&self) {
        self.push(ScriptedResponse::Stall);
    }

    /// Queues a response.
    pub fn push(&self, response: ScriptedResponse) {
        self.state.lock().responses.push_back(response);
    }

    /// Returns every command executed so far.
    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.state.lock().executed.clone()
    }

    /// Returns the most recent command.
    pub fn last_executed(&self) -> Option<ExecutedCommand> {
        self.state.lock().executed.last().cloned()
    }

    /// Returns the number of commands sent, one per database round trip.
    pub fn round_trips(&self) -> usize {
        self.state.lock().executed.len()
    }

    /// Returns the transaction boundaries seen so far.
    pub fn transaction_events(&self) -> Vec<TransactionEvent> {
        self.state.lock().events.clone()
    }

    /// Returns the number of connections handed out.
    pub fn connections_opened(&self) -> usize {
        self.state.lock().connections_opened
    }

    /// Returns the number of responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        self.state.lock().responses.len()
    }

    /// Forgets recorded commands and events.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.executed.clear();
        state.events.clear();
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn create(&self) -> VellumResult<Box<dyn Connection>> {
        self.state.lock().connections_opened += 1;
        Ok(Box::new(MemoryConnection {
            state: Arc::clone(&self.state),
            in_transaction: false,
        }))
    }
}

/// A connection of the memory transport.
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<Mutex<MemoryState>>,
    in_transaction: bool,
}

impl MemoryConnection {
    /// Records the command and takes the next queued response.
    fn record(&self, command: &Command) -> Option<ScriptedResponse> {
        let (sql, params) = command.build_with_params();
        let mut state = self.state.lock();
        state.executed.push(ExecutedCommand {
            sql,
            params,
            statement_count: command.statement_count(),
            in_transaction: self.in_transaction,
        });
        state.responses.pop_front()
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute_reader(
        &mut self,
        command: &Command,
    ) -> VellumResult<Box<dyn ResultSetReader>> {
        let result_sets = match self.record(command) {
            Some(ScriptedResponse::ResultSets(sets)) => sets,
            Some(ScriptedResponse::Affected(_)) | None => {
                vec![Vec::new(); command.statement_count()]
            }
            Some(ScriptedResponse::Fail(err)) => return Err(err),
            Some(ScriptedResponse::Stall) => return std::future::pending().await,
        };
        Ok(Box::new(BufferedResultSets::new(result_sets)))
    }

    async fn execute(&mut self, command: &Command) -> VellumResult<u64> {
        match self.record(command) {
            Some(ScriptedResponse::Affected(rows)) => Ok(rows),
            Some(ScriptedResponse::ResultSets(sets)) => {
                Ok(sets.iter().map(|s| s.len() as u64).sum())
            }
            None => Ok(command.statement_count() as u64),
            Some(ScriptedResponse::Fail(err)) => Err(err),
            Some(ScriptedResponse::Stall) => std::future::pending().await,
        }
    }

    async fn begin(&mut self, options: TransactionOptions) -> VellumResult<()> {
        if self.in_transaction {
            return Err(VellumError::execution("a transaction is already in progress"));
        }
        self.in_transaction = true;
        self.state.lock().events.push(TransactionEvent::Begin(options));
        Ok(())
    }

    async fn commit(&mut self) -> VellumResult<()> {
        if !self.in_transaction {
            return Err(VellumError::execution("no transaction in progress"));
        }
        self.in_transaction = false;
        self.state.lock().events.push(TransactionEvent::Commit);
        Ok(())
    }

    async fn rollback(&mut self) -> VellumResult<()> {
        if !self.in_transaction {
            return Err(VellumError::execution("no transaction in progress"));
        }
        self.in_transaction = false;
        self.state.lock().events.push(TransactionEvent::Rollback);
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SqlFragment;
    use crate::transaction::IsolationLevel;

    #[tokio::test]
    async fn test_scripted_result_sets_are_replayed() {
        let factory = MemoryConnectionFactory::new();
        factory.push_result_sets(vec![vec![Row::new(vec![Value::Integer(3)])]]);

        let mut conn = factory.create().await.unwrap();
        let command = Command::single(SqlFragment::raw("select count(*) from mt_doc_target d"));
        let mut reader = conn.execute_reader(&command).await.unwrap();

        let row = reader.next_row().await.unwrap().unwrap();
        assert_eq!(row.i64(0).unwrap(), 3);
        assert_eq!(factory.round_trips(), 1);
        assert_eq!(
            factory.last_executed().unwrap().sql,
            "select count(*) from mt_doc_target d"
        );
    }

    #[tokio::test]
    async fn test_unscripted_reader_yields_empty_sets() {
        let factory = MemoryConnectionFactory::new();
        let mut conn = factory.create().await.unwrap();

        let mut command = Command::new();
        command.append_statement(SqlFragment::raw("select 1"));
        command.append_statement(SqlFragment::raw("select 2"));

        let mut reader = conn.execute_reader(&command).await.unwrap();
        assert!(reader.next_row().await.unwrap().is_none());
        assert!(reader.next_result().await.unwrap());
        assert!(!reader.next_result().await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_and_transaction_events() {
        let factory = MemoryConnectionFactory::new();
        factory.push_failure(VellumError::connection("reset by peer"));

        let mut conn = factory.create().await.unwrap();
        conn.begin(TransactionOptions::serializable()).await.unwrap();
        assert!(conn.in_transaction());

        let err = conn
            .execute(&Command::single(SqlFragment::raw("select 1")))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        conn.rollback().await.unwrap();
        assert!(conn.commit().await.is_err());

        let events = factory.transaction_events();
        assert_eq!(events.len(), 2);
        match events[0] {
            TransactionEvent::Begin(opts) => {
                assert_eq!(opts.isolation_level, IsolationLevel::Serializable)
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(events[1], TransactionEvent::Rollback);
        assert!(factory.executed()[0].in_transaction);
    }
}
