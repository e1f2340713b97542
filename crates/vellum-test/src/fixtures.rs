use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vellum_common::DocumentId;
use vellum_schema::{Document, DocumentMapping, IdStrategy, Registration, SqlType};

/// Colors stored as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Colors {
    /// Red
    Red,
    /// Green
    Green,
    /// Blue
    Blue,
}

/// Nested object inside a [`Target`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Inner {
    /// A number one level down.
    pub number: i32,
}

/// General purpose query target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Target {
    /// Hi/Lo assigned id.
    pub id: i64,
    /// Always set.
    pub number: i32,
    /// Often missing.
    pub nullable_number: Option<i32>,
    /// Free text.
    pub string: String,
    /// A color.
    pub color: Colors,
    /// Optional nested object.
    pub inner: Option<Inner>,
}

impl Target {
    /// Creates an unsaved target.
    pub fn new(number: i32, color: Colors) -> Self {
        Self {
            id: 0,
            number,
            nullable_number: None,
            string: format!("target-{number}"),
            color,
            inner: None,
        }
    }

    /// Sets the nullable number.
    pub fn with_nullable(mut self, value: Option<i32>) -> Self {
        self.nullable_number = value;
        self
    }

    /// Sets the nested object.
    pub fn with_inner(mut self, number: i32) -> Self {
        self.inner = Some(Inner { number });
        self
    }
}

impl Document for Target {
    fn id(&self) -> DocumentId {
        self.id.into()
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id.as_i64().unwrap_or_default();
    }

    fn configure(mapping: &mut DocumentMapping) {
        mapping.field("Number", SqlType::Integer);
        mapping.field("NullableNumber", SqlType::Integer).nullable();
        mapping.field("Inner.Number", SqlType::Integer);
    }
}

/// A user; the parent of a small hierarchy sharing `mt_doc_user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    /// Hi/Lo assigned id.
    pub id: i64,
    /// Duplicated into `first_name`.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Staff account.
    pub internal: bool,
}

/// Stored with discriminator `admin`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AdminUser {
    /// Hi/Lo assigned id.
    pub id: i64,
    /// Duplicated into `first_name`.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Staff account.
    pub internal: bool,
    /// Region administered.
    pub region: String,
}

/// Stored with discriminator `super`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SuperUser {
    /// Hi/Lo assigned id.
    pub id: i64,
    /// Duplicated into `first_name`.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Staff account.
    pub internal: bool,
    /// Privilege level.
    pub power: i32,
}

impl User {
    /// Creates an unsaved user.
    pub fn new(first_name: &str, last_name: &str) -> Self {
        Self {
            id: 0,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            internal: false,
        }
    }
}

impl AdminUser {
    /// Creates an unsaved admin.
    pub fn new(first_name: &str, region: &str) -> Self {
        Self {
            id: 0,
            first_name: first_name.to_string(),
            last_name: "Admin".to_string(),
            internal: true,
            region: region.to_string(),
        }
    }
}

impl SuperUser {
    /// Creates an unsaved super user.
    pub fn new(first_name: &str, power: i32) -> Self {
        Self {
            id: 0,
            first_name: first_name.to_string(),
            last_name: "Super".to_string(),
            internal: true,
            power,
        }
    }
}

impl Document for User {
    fn id(&self) -> DocumentId {
        self.id.into()
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id.as_i64().unwrap_or_default();
    }

    fn configure(mapping: &mut DocumentMapping) {
        mapping.duplicate("FirstName", SqlType::Varchar);
        mapping.add_subclass::<AdminUser>("admin");
        mapping.add_subclass::<SuperUser>("super");
    }
}

impl Document for AdminUser {
    fn id(&self) -> DocumentId {
        self.id.into()
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id.as_i64().unwrap_or_default();
    }
}

impl Document for SuperUser {
    fn id(&self) -> DocumentId {
        self.id.into()
    }

    fn set_id(&mut self, id: DocumentId) {
        self.id = id.as_i64().unwrap_or_default();
    }
}

/// A document keyed by UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Issue {
    /// Random v4 id.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Open or closed.
    pub open: bool,
}

impl Issue {
    /// Creates an unsaved open issue.
    pub fn new(title: &str) -> Self {
        Self {
            id: Uuid::nil(),
            title: title.to_string(),
            open: true,
        }
    }
}

impl Document for Issue {
    fn id(&self) -> DocumentId {
        self.id.into()
    }

    fn set_id(&mut self, id: DocumentId) {
        if let DocumentId::Uuid(id) = id {
            self.id = id;
        }
    }

    fn configure(mapping: &mut DocumentMapping) {
        mapping.set_id_strategy(IdStrategy::Guid);
    }
}

/// Every fixture document.
pub fn registrations() -> Vec<Registration> {
    vec![
        Registration::of::<Target>(),
        Registration::of::<User>(),
        Registration::of::<Issue>(),
    ]
}
