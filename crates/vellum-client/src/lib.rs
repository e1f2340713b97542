//! # vellum-client
//!
//! Command building and database transports for Vellum.
//!
//! This crate sits between the query compiler and PostgreSQL:
//!
//! - **Commands**: [`SqlFragment`]s with bound parameters, combined into
//!   multi-statement [`Command`]s that share one parameter set
//! - **Connections**: the [`Connection`] / [`ResultSetReader`] seam every
//!   transport implements
//! - **Transports**: [`PgConnectionFactory`] for PostgreSQL and
//!   [`MemoryConnectionFactory`] for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use vellum_client::{Command, ConnectionFactory, PgConnectionFactory, SqlFragment};
//!
//! let factory = PgConnectionFactory::from_connection_string("host=localhost user=postgres")?;
//! let mut conn = factory.create().await?;
//!
//! let mut command = Command::new();
//! command.append_statement(SqlFragment::raw("select d.data, d.id from mt_doc_user d where d.id = ").bind(1));
//! command.append_statement(SqlFragment::raw("select count(*) from mt_doc_user d"));
//!
//! let mut reader = conn.execute_reader(&command).await?;
//! while let Some(row) = reader.next_row().await? {
//!     println!("{}", row.json(0)?);
//! }
//! reader.next_result().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod connection;
pub mod memory;
pub mod postgres;
pub mod transaction;

pub use command::{Command, SqlFragment, SqlPart};
pub use connection::{BufferedResultSets, Connection, ConnectionFactory, ResultSetReader, Row};
pub use memory::{ExecutedCommand, MemoryConnectionFactory, ScriptedResponse, TransactionEvent};
pub use postgres::PgConnectionFactory;
pub use transaction::{AccessMode, IsolationLevel, TransactionOptions};
