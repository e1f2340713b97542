//! Configuration structures for Vellum.

mod store;

pub use store::{HiloSettings, IdentityMapKind, StoreConfig, StoreConfigBuilder};
