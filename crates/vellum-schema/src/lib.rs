//! # vellum-schema
//!
//! Document mappings and identifier sequences for Vellum.
//!
//! - **Documents**: the [`Document`] trait and runtime [`DocumentType`]
//! - **Mappings**: table, id strategy, fields, [`DuplicatedField`]s and
//!   subclass hierarchies per type ([`DocumentMapping`])
//! - **Registry**: [`StoreOptions`] builds and owns every mapping
//! - **Sequences**: Hi/Lo id generation ([`HiloSequence`], [`SequenceFactory`])
//!   over a shared counter ([`DatabaseHiloCounter`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use vellum_schema::{StoreOptions, SqlType};
//!
//! let mut options = StoreOptions::new(config);
//! options.register::<User>().register::<Issue>();
//!
//! let mapping = options.mapping_for::<User>()?;
//! assert_eq!(mapping.table_name(), "mt_doc_user");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod mapping;
pub mod naming;
pub mod options;
pub mod sequence;

pub use document::{Document, DocumentType};
pub use mapping::{
    DocumentMapping, DuplicatedField, DuplicatedFieldRole, IdStrategy, SelectableField, SqlType,
    SubclassDefinition,
};
pub use options::{Registration, StoreOptions};
pub use sequence::{DatabaseHiloCounter, HiloCounter, HiloSequence, SequenceFactory};
