//! Field metadata: SQL types, selectable fields, and duplicated columns.

use std::fmt;

use vellum_common::constants::DOCUMENT_ALIAS;
use vellum_common::Value;

use crate::naming;

/// SQL type of a field or duplicated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// `varchar`
    Varchar,
    /// `text`
    Text,
    /// `integer`
    Integer,
    /// `bigint`
    BigInt,
    /// `double precision`
    Double,
    /// `boolean`
    Boolean,
    /// `uuid`
    Uuid,
}

impl SqlType {
    /// Returns the SQL spelling.
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Varchar => "varchar",
            SqlType::Text => "text",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Double => "double precision",
            SqlType::Boolean => "boolean",
            SqlType::Uuid => "uuid",
        }
    }

    /// Returns true for types that `->>` already produces.
    pub fn is_text(&self) -> bool {
        matches!(self, SqlType::Varchar | SqlType::Text)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A queryable member of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectableField {
    /// Dotted member path as it appears in the JSON payload.
    pub member: String,
    /// Declared SQL type.
    pub sql_type: SqlType,
    /// Whether the member may be null.
    pub nullable: bool,
}

impl SelectableField {
    /// Creates a non-nullable field.
    pub fn new(member: impl Into<String>, sql_type: SqlType) -> Self {
        Self {
            member: member.into(),
            sql_type,
            nullable: false,
        }
    }

    /// Marks the field nullable.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }
}

/// How a duplicated column participates in queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatedFieldRole {
    /// Queries use the column instead of the JSON payload.
    #[default]
    Search,
    /// The column is written on upsert but never queried.
    UpsertOnly,
}

/// A document member mirrored into its own column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicatedField {
    member: String,
    column: String,
    sql_type: SqlType,
    role: DuplicatedFieldRole,
}

impl DuplicatedField {
    /// Creates a duplicated field for a dotted member path.
    pub fn new(member: impl Into<String>, sql_type: SqlType) -> Self {
        let member = member.into();
        let column = naming::column_name(&member);
        Self {
            member,
            column,
            sql_type,
            role: DuplicatedFieldRole::Search,
        }
    }

    /// Overrides the column name.
    pub fn with_column(&mut self, column: impl Into<String>) -> &mut Self {
        self.column = column.into();
        self
    }

    /// Sets the role.
    pub fn with_role(&mut self, role: DuplicatedFieldRole) -> &mut Self {
        self.role = role;
        self
    }

    /// Returns the member path.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Returns the column name.
    pub fn column_name(&self) -> &str {
        &self.column
    }

    /// Returns the column type.
    pub fn sql_type(&self) -> SqlType {
        self.sql_type
    }

    /// Returns the role.
    pub fn role(&self) -> DuplicatedFieldRole {
        self.role
    }

    /// Returns true if queries should locate the member through this column.
    pub fn is_searchable(&self) -> bool {
        self.role == DuplicatedFieldRole::Search
    }

    /// SQL locator of the column.
    pub fn sql_locator(&self) -> String {
        format!("{}.{}", DOCUMENT_ALIAS, self.column)
    }

    /// Reads the member out of a serialized document.
    pub fn extract(&self, document: &serde_json::Value) -> Value {
        let mut current = document;
        for segment in self.member.split('.') {
            match current.get(segment) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        match current {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                Value::String(current.to_string())
            }
            other => Value::from_json(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicated_field_defaults() {
        let field = DuplicatedField::new("FirstName", SqlType::Varchar);
        assert_eq!(field.role(), DuplicatedFieldRole::Search);
        assert_eq!(field.column_name(), "first_name");
        assert_eq!(field.sql_type().as_sql(), "varchar");
        assert_eq!(field.sql_locator(), "d.first_name");
    }

    #[test]
    fn test_overridden_column_changes_locator() {
        let mut field = DuplicatedField::new("FirstName", SqlType::Varchar);
        field.with_column("x_first_name");
        assert_eq!(field.sql_locator(), "d.x_first_name");
    }

    #[test]
    fn test_extract_nested_member() {
        let field = DuplicatedField::new("Inner.Number", SqlType::Integer);
        assert_eq!(field.column_name(), "inner_number");

        let doc = json!({"Inner": {"Number": 7}});
        assert_eq!(field.extract(&doc), Value::Integer(7));
        assert_eq!(field.extract(&json!({"Inner": null})), Value::Null);
        assert_eq!(field.extract(&json!({})), Value::Null);
    }

    #[test]
    fn test_selectable_field_nullable() {
        let mut field = SelectableField::new("NullableNumber", SqlType::Integer);
        assert!(!field.nullable);
        field.nullable();
        assert!(field.nullable);
        assert!(!field.sql_type.is_text());
    }
}
