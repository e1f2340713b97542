//! # vellum-test
//!
//! Integration tests for Vellum.
//!
//! This crate contains:
//! - Document fixtures shared by every test suite
//! - Helpers for stores backed by the scripted memory transport
//! - Helpers for live PostgreSQL suites, enabled by `VELLUM_TEST_DATABASE_URL`

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Document fixtures
pub mod fixtures;

/// Test utilities and helpers
pub mod utils;
