//! # vellum-session
//!
//! Sessions, identity maps, change tracking and batched queries for Vellum.
//!
//! - **Store**: [`DocumentStore`] owns the registered mappings, the
//!   connection factory and the shared Hi/Lo sequences
//! - **Sessions**: [`DocumentSession`] (tracked reads and writes) and
//!   [`QuerySession`] (reads only)
//! - **Identity maps**: [`TrackingIdentityMap`] keeps one instance per
//!   `(root type, id)`; [`NullIdentityMap`] always hydrates fresh instances
//! - **Batches**: [`BatchedQuery`] sends many queries in one round trip and
//!   resolves a [`BatchFuture`] per query
//!
//! ## Example
//!
//! ```rust,ignore
//! use vellum_query::{field, Query};
//! use vellum_session::DocumentStore;
//!
//! let store = DocumentStore::connect(options)?;
//! let mut session = store.open_session();
//!
//! let user = session.store(User::new("Ann", "Smith")).await?;
//! session.save_changes().await?;
//!
//! let same = session.load::<User>(user.read().id).await?;
//! let admins = session
//!     .count(Query::<User>::new().filter(field("Role").eq("admin")))
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod identity_map;
pub mod serializer;
pub mod session;
pub mod store;
pub mod tracked;
pub mod unit_of_work;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchFuture, BatchedQuery};
pub use identity_map::{identity_map_for, IdentityMap, NullIdentityMap, TrackingIdentityMap};
pub use serializer::{JsonSerializer, Serializer};
pub use session::{DocumentSession, QuerySession, SessionCore};
pub use store::DocumentStore;
pub use tracked::{DocumentChange, DocumentHandle, TrackedDocument, TrackedEntity};
pub use unit_of_work::{DeleteOperation, PendingChanges, UnitOfWork};
