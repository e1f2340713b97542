//! Document serialization.

use serde::de::DeserializeOwned;
use serde::Serialize;
use vellum_common::VellumResult;

/// Converts JSON document trees to and from their stored text.
///
/// Implementations must be deterministic: serializing an unchanged document
/// twice has to produce structurally equal output, or change tracking will
/// report false positives.
pub trait Serializer: Send + Sync {
    /// Renders a document tree as JSON text.
    fn to_json(&self, document: &serde_json::Value) -> VellumResult<String>;

    /// Parses stored JSON text.
    fn from_json(&self, json: &str) -> VellumResult<serde_json::Value>;
}

/// The default serializer, backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn to_json(&self, document: &serde_json::Value) -> VellumResult<String> {
        Ok(serde_json::to_string(document)?)
    }

    fn from_json(&self, json: &str) -> VellumResult<serde_json::Value> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Converts a document to its JSON tree.
pub fn to_tree<T: Serialize>(document: &T) -> VellumResult<serde_json::Value> {
    Ok(serde_json::to_value(document)?)
}

/// Builds a document from its JSON tree.
pub fn from_tree<T: DeserializeOwned>(tree: serde_json::Value) -> VellumResult<T> {
    Ok(serde_json::from_value(tree)?)
}
