//! # vellum-common
//!
//! Common types, errors, and configuration for Vellum.
//!
//! This crate provides the foundational types shared by every Vellum crate:
//!
//! - **Types**: bound parameter [`Value`]s and [`DocumentId`]s
//! - **Errors**: unified error handling with [`VellumError`]
//! - **Config**: [`StoreConfig`] and Hi/Lo settings
//! - **Constants**: table, column and routine names
//!
//! ## Example
//!
//! ```rust
//! use vellum_common::types::{DocumentId, Value};
//! use vellum_common::error::VellumResult;
//!
//! fn example() -> VellumResult<()> {
//!     let id = DocumentId::from(42);
//!     let param = id.to_value();
//!     assert_eq!(param, Value::Integer(42));
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::{HiloSettings, IdentityMapKind, StoreConfig};
pub use error::{ErrorCode, VellumError, VellumResult};
pub use types::{DocumentId, Value};
