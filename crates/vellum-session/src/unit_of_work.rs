//! Pending writes of a document session.
//!
//! Stores and edits are discovered from the identity map at save time;
//! deletes are queued here explicitly. [`build_command`] turns both into a
//! single multi-statement command.

use vellum_client::{Command, SqlFragment};
use vellum_common::constants::{DATA_COLUMN, DOCUMENT_TYPE_COLUMN, ID_COLUMN};
use vellum_common::{DocumentId, Value, VellumResult};
use vellum_schema::{DocumentMapping, DocumentType, StoreOptions};

use crate::serializer::Serializer;
use crate::tracked::DocumentChange;

/// A queued delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOperation {
    /// Document type.
    pub document_type: DocumentType,
    /// Identity map key type: the hierarchy root, or the type itself.
    pub identity_type: DocumentType,
    /// Document id.
    pub id: DocumentId,
}

/// Deletes queued by a session.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    deletes: Vec<DeleteOperation>,
}

impl UnitOfWork {
    /// Creates an empty unit of work.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a delete. Deleting the same document twice queues it once,
    /// whichever type of its hierarchy it is deleted through.
    pub fn delete(&mut self, mapping: &DocumentMapping, id: DocumentId) {
        let identity_type = mapping.identity_type();
        if !self.is_deleted(&identity_type, &id) {
            self.deletes.push(DeleteOperation {
                document_type: mapping.document_type(),
                identity_type,
                id,
            });
        }
    }

    /// Returns true if the document is queued for deletion.
    pub fn is_deleted(&self, identity_type: &DocumentType, id: &DocumentId) -> bool {
        self.deletes
            .iter()
            .any(|d| d.identity_type == *identity_type && d.id == *id)
    }

    /// Queued deletes in the order they were requested.
    pub fn deletes(&self) -> &[DeleteOperation] {
        &self.deletes
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty()
    }

    /// Forgets every queued delete.
    pub fn clear(&mut self) {
        self.deletes.clear();
    }
}

/// Everything the next `save_changes` will write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges {
    /// Documents to insert or update.
    pub upserts: Vec<DocumentChange>,
    /// Documents to delete.
    pub deletes: Vec<DeleteOperation>,
}

impl PendingChanges {
    /// Returns true if there is nothing to write.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    /// Number of statements the changes produce.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }
}

/// Renders the upsert of one document.
///
/// ```text
/// insert into mt_doc_user (id, data, mt_doc_type, first_name) values ($1, $2, $3, $4)
///     on conflict (id) do update set data = excluded.data, ...
/// ```
pub fn upsert_statement(
    mapping: &DocumentMapping,
    change: &DocumentChange,
    serializer: &dyn Serializer,
) -> VellumResult<SqlFragment> {
    let mut columns = vec![ID_COLUMN.to_string(), DATA_COLUMN.to_string()];
    let mut values = vec![
        change.id.to_value(),
        Value::String(serializer.to_json(&change.json)?),
    ];

    if let Some(discriminator) = mapping.discriminator() {
        columns.push(DOCUMENT_TYPE_COLUMN.to_string());
        values.push(Value::String(discriminator.to_string()));
    }

    for duplicated in mapping.duplicated_fields() {
        columns.push(duplicated.column_name().to_string());
        values.push(duplicated.extract(&change.json));
    }

    let mut statement = SqlFragment::raw(format!(
        "insert into {} ({}) values (",
        mapping.table_name(),
        columns.join(", ")
    ));
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            statement.push_sql(", ");
        }
        statement.push_param(value);
    }

    let updates = columns
        .iter()
        .skip(1)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    statement.push_sql(format!(
        ") on conflict ({}) do update set {}",
        ID_COLUMN, updates
    ));
    Ok(statement)
}

/// Renders the delete of one document.
pub fn delete_statement(mapping: &DocumentMapping, id: &DocumentId) -> SqlFragment {
    SqlFragment::raw(format!(
        "delete from {} where {} = ",
        mapping.table_name(),
        ID_COLUMN
    ))
    .bind(id.to_value())
}

/// Builds the command that applies `changes`: upserts first, then deletes.
pub fn build_command(
    options: &StoreOptions,
    serializer: &dyn Serializer,
    changes: &PendingChanges,
) -> VellumResult<Command> {
    let mut command = Command::new();
    for change in &changes.upserts {
        let mapping = options.mapping(&change.document_type)?;
        command.append_statement(upsert_statement(&mapping, change, serializer)?);
    }
    for delete in &changes.deletes {
        let mapping = options.mapping(&delete.document_type)?;
        command.append_statement(delete_statement(&mapping, &delete.id));
    }
    Ok(command)
}
