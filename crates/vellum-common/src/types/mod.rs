//! Type definitions for Vellum.
//!
//! This module contains the value and identifier types shared by every
//! Vellum crate.

mod ids;
mod value;

pub use ids::DocumentId;
pub use value::Value;
