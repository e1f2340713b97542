//! # vellum-query
//!
//! Query building and SQL compilation for Vellum documents.
//!
//! - **Expressions**: [`Predicate`] trees built from [`Field`]s
//! - **Models**: [`QueryModel`] / [`Query`] with ordering, paging, and a
//!   [`ResultOperator`]
//! - **Compilation**: [`WhereCompiler`] (locators, casts, null semantics)
//!   and [`DocumentQuery`] (select / count / any statements)
//!
//! Compilation is pure: the same model always yields the same SQL text and
//! parameters.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vellum_query::{field, DocumentQuery, QueryModel, ResultOperator};
//!
//! let model = QueryModel::of::<Target>()
//!     .filter(field("Number").gt(4))
//!     .with_operator(ResultOperator::Count);
//! let mapping = options.mapping_for::<Target>()?;
//! let (sql, params) = DocumentQuery::new(&mapping, &model).to_fragment()?.build_with_params();
//! // select count(*) from mt_doc_target d where CAST(d.data ->> 'Number' as integer) > $1
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compiler;
pub mod document_query;
pub mod expr;
pub mod model;

pub use compiler::WhereCompiler;
pub use document_query::DocumentQuery;
pub use expr::{field, ComparisonOp, Field, Predicate, StringOp};
pub use model::{OrderBy, Query, QueryModel, ResultOperator, SortDirection};
