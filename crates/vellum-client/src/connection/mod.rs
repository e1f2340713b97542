//! Connection abstraction shared by every transport.
//!
//! A command is executed as a whole; its result sets are then consumed in
//! statement order through a [`ResultSetReader`].

use std::collections::VecDeque;

use async_trait::async_trait;
use vellum_common::{DocumentId, Value, VellumError, VellumResult};

use crate::command::Command;
use crate::transaction::TransactionOptions;

/// A row of a result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Creates a row from column values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Returns the number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a column value.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Returns all column values.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Reads a column as JSON text.
    pub fn json(&self, index: usize) -> VellumResult<String> {
        match self.get(index) {
            Some(Value::Json(v)) => Ok(v.to_string()),
            Some(Value::String(s)) => Ok(s.clone()),
            other => Err(VellumError::execution(format!(
                "column {} is not a JSON document: {:?}",
                index, other
            ))),
        }
    }

    /// Reads a column as a document id.
    pub fn id(&self, index: usize) -> VellumResult<DocumentId> {
        let value = self
            .get(index)
            .ok_or_else(|| VellumError::execution(format!("missing id column {}", index)))?;
        DocumentId::from_value(value)
    }

    /// Reads a column as an integer.
    pub fn i64(&self, index: usize) -> VellumResult<i64> {
        self.get(index)
            .and_then(Value::as_i64)
            .ok_or_else(|| VellumError::execution(format!("column {} is not an integer", index)))
    }

    /// Reads a column as a boolean.
    pub fn bool(&self, index: usize) -> VellumResult<bool> {
        self.get(index)
            .and_then(Value::as_bool)
            .ok_or_else(|| VellumError::execution(format!("column {} is not a boolean", index)))
    }

    /// Reads an optional text column.
    pub fn opt_str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(Value::as_str)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

/// Forward-only reader over the result sets of one command.
#[async_trait]
pub trait ResultSetReader: Send {
    /// Returns the next row of the current result set.
    async fn next_row(&mut self) -> VellumResult<Option<Row>>;

    /// Moves to the next result set. Returns false when none remain.
    async fn next_result(&mut self) -> VellumResult<bool>;
}

/// A reader over result sets that are already materialized.
#[derive(Debug, Default)]
pub struct BufferedResultSets {
    current: VecDeque<Row>,
    remaining: VecDeque<Vec<Row>>,
}

impl BufferedResultSets {
    /// Creates a reader positioned on the first result set.
    pub fn new(result_sets: Vec<Vec<Row>>) -> Self {
        let mut remaining: VecDeque<Vec<Row>> = result_sets.into();
        let current = remaining.pop_front().unwrap_or_default().into();
        Self { current, remaining }
    }
}

#[async_trait]
impl ResultSetReader for BufferedResultSets {
    async fn next_row(&mut self) -> VellumResult<Option<Row>> {
        Ok(self.current.pop_front())
    }

    async fn next_result(&mut self) -> VellumResult<bool> {
        match self.remaining.pop_front() {
            Some(next) => {
                self.current = next.into();
                Ok(true)
            }
            None => {
                self.current.clear();
                Ok(false)
            }
        }
    }
}

/// An open database connection.
#[async_trait]
pub trait Connection: Send {
    /// Executes a command in one round trip and returns its result sets.
    async fn execute_reader(&mut self, command: &Command)
        -> VellumResult<Box<dyn ResultSetReader>>;

    /// Executes a command in one round trip and returns the affected row count.
    async fn execute(&mut self, command: &Command) -> VellumResult<u64>;

    /// Starts a transaction.
    async fn begin(&mut self, options: TransactionOptions) -> VellumResult<()>;

    /// Commits the current transaction.
    async fn commit(&mut self) -> VellumResult<()>;

    /// Rolls back the current transaction.
    async fn rollback(&mut self) -> VellumResult<()>;

    /// Returns true while a transaction is open.
    fn in_transaction(&self) -> bool;
}

/// Opens connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Opens a new connection.
    async fn create(&self) -> VellumResult<Box<dyn Connection>>;
}
