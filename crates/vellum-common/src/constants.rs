//! System-wide constants for Vellum.
//!
//! Table, column and routine names shared by the compiler, the unit of work
//! and the sequence generator.

// =============================================================================
// Document Storage
// =============================================================================

/// Prefix of every document table (`mt_doc_user`).
pub const DOCUMENT_TABLE_PREFIX: &str = "mt_doc_";

/// Alias every document table is given in emitted SQL.
pub const DOCUMENT_ALIAS: &str = "d";

/// Column holding the document identity.
pub const ID_COLUMN: &str = "id";

/// Column holding the serialized JSON payload.
pub const DATA_COLUMN: &str = "data";

/// Discriminator column of document hierarchies.
pub const DOCUMENT_TYPE_COLUMN: &str = "mt_doc_type";

/// Discriminator value written for the root type of a hierarchy.
pub const BASE_DOCUMENT_TYPE: &str = "BASE";

// =============================================================================
// Hi/Lo Sequences
// =============================================================================

/// Table holding one shared hi counter row per entity name.
pub const HILO_TABLE: &str = "mt_hilo";

/// Default number of ids handed out per reserved hi block.
pub const DEFAULT_HILO_MAX_LO: i32 = 1000;

/// Default amount the shared hi counter advances per reservation.
pub const DEFAULT_HILO_INCREMENT: i32 = 1;

// =============================================================================
// Execution
// =============================================================================

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Separator between statements of a batched command.
pub const STATEMENT_SEPARATOR: &str = ";\n";
