//! The document trait and runtime type identity.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::de::DeserializeOwned;
use serde::Serialize;
use vellum_common::DocumentId;

use crate::mapping::DocumentMapping;
use crate::naming;

/// A type that can be persisted as a JSON document.
///
/// ```rust,ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "PascalCase")]
/// struct User {
///     id: i64,
///     first_name: String,
/// }
///
/// impl Document for User {
///     fn id(&self) -> DocumentId {
///         self.id.into()
///     }
///
///     fn set_id(&mut self, id: DocumentId) {
///         self.id = id.as_i64().unwrap_or_default();
///     }
///
///     fn configure(mapping: &mut DocumentMapping) {
///         mapping.duplicate("FirstName", SqlType::Varchar);
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the document's identity.
    fn id(&self) -> DocumentId;

    /// Replaces the document's identity.
    fn set_id(&mut self, id: DocumentId);

    /// Alias used for the table name and as discriminator default.
    fn alias() -> String
    where
        Self: Sized,
    {
        naming::type_alias(std::any::type_name::<Self>())
    }

    /// Customizes the mapping when the type is registered.
    fn configure(_mapping: &mut DocumentMapping)
    where
        Self: Sized,
    {
    }
}

/// Runtime identity of a document type.
///
/// Equality and hashing use the [`TypeId`] only.
#[derive(Clone, Copy)]
pub struct DocumentType {
    type_id: TypeId,
    type_name: &'static str,
}

impl DocumentType {
    /// Returns the document type of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying type id.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the full Rust type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the type name without its module path.
    pub fn short_name(&self) -> &'static str {
        let base = self.type_name.split('<').next().unwrap_or(self.type_name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for DocumentType {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for DocumentType {}

impl Hash for DocumentType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentType({})", self.type_name)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_document_type_identity() {
        assert_eq!(DocumentType::of::<Alpha>(), DocumentType::of::<Alpha>());
        assert_ne!(DocumentType::of::<Alpha>(), DocumentType::of::<Beta>());
        assert_eq!(DocumentType::of::<Alpha>().short_name(), "Alpha");
        assert_eq!(DocumentType::of::<Beta>().to_string(), "Beta");
    }
}
