//! Document identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Value;
use crate::error::{VellumError, VellumResult};

/// Identity of a stored document.
///
/// 32-bit and 64-bit integer ids share the `Long` variant so that an id
/// read back from an `integer` column and one read from a `bigint` column
/// key the same identity map entry.
///
/// # Example
///
/// ```rust
/// use vellum_common::types::DocumentId;
///
/// let id = DocumentId::from(42);
/// assert_eq!(id.as_i64(), Some(42));
/// assert!(!id.is_empty());
/// assert!(DocumentId::from(0).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    /// Integer identity (assigned by Hi/Lo by default).
    Long(i64),
    /// Caller assigned string identity.
    String(String),
    /// UUID identity.
    Uuid(Uuid),
}

impl DocumentId {
    /// Returns true for the "unassigned" value of each identity kind.
    pub fn is_empty(&self) -> bool {
        match self {
            DocumentId::Long(v) => *v == 0,
            DocumentId::String(s) => s.is_empty(),
            DocumentId::Uuid(u) => u.is_nil(),
        }
    }

    /// Returns the integer identity if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DocumentId::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the uuid identity if this is one.
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            DocumentId::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Converts the identity into a bound parameter value.
    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Long(v) => Value::Integer(*v),
            DocumentId::String(s) => Value::String(s.clone()),
            DocumentId::Uuid(u) => Value::Uuid(*u),
        }
    }

    /// Reads an identity back from a result column.
    pub fn from_value(value: &Value) -> VellumResult<Self> {
        match value {
            Value::Integer(v) => Ok(DocumentId::Long(*v)),
            Value::String(s) => Ok(DocumentId::String(s.clone())),
            Value::Uuid(u) => Ok(DocumentId::Uuid(*u)),
            other => Err(VellumError::internal(format!(
                "cannot read a document id from {other:?}"
            ))),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Long(v) => write!(f, "{}", v),
            DocumentId::String(s) => write!(f, "{}", s),
            DocumentId::Uuid(u) => write!(f, "{}", u),
        }
    }
}

impl From<i32> for DocumentId {
    fn from(v: i32) -> Self {
        DocumentId::Long(i64::from(v))
    }
}

impl From<i64> for DocumentId {
    fn from(v: i64) -> Self {
        DocumentId::Long(v)
    }
}

impl From<&str> for DocumentId {
    fn from(v: &str) -> Self {
        DocumentId::String(v.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(v: String) -> Self {
        DocumentId::String(v)
    }
}

impl From<Uuid> for DocumentId {
    fn from(v: Uuid) -> Self {
        DocumentId::Uuid(v)
    }
}

impl From<&DocumentId> for DocumentId {
    fn from(v: &DocumentId) -> Self {
        v.clone()
    }
}
