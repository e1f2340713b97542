//! Per-type storage mappings.
//!
//! A [`DocumentMapping`] says where a document type lives and how it is
//! queried: table name, id strategy, declared fields, duplicated columns,
//! and for hierarchies the discriminator that separates subclasses sharing
//! one table.

mod field;
mod identity;

pub use field::{DuplicatedField, DuplicatedFieldRole, SelectableField, SqlType};

use vellum_client::SqlFragment;
use vellum_common::constants::{
    BASE_DOCUMENT_TYPE, DATA_COLUMN, DOCUMENT_ALIAS, DOCUMENT_TABLE_PREFIX, DOCUMENT_TYPE_COLUMN,
    ID_COLUMN,
};
use vellum_common::HiloSettings;

use crate::document::{Document, DocumentType};

/// How new documents receive an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdStrategy {
    /// Integer ids from a Hi/Lo sequence.
    #[default]
    HiLo,
    /// Random v4 UUIDs.
    Guid,
    /// The caller assigns ids; an empty id is rejected.
    Assigned,
}

/// A subclass declared on a parent mapping.
#[derive(Clone)]
pub struct SubclassDefinition {
    /// Concrete subclass type.
    pub document_type: DocumentType,
    /// Discriminator stored in `mt_doc_type`.
    pub alias: String,
    pub(crate) configure: fn(&mut DocumentMapping),
}

impl std::fmt::Debug for SubclassDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubclassDefinition")
            .field("document_type", &self.document_type)
            .field("alias", &self.alias)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct ParentLink {
    document_type: DocumentType,
    discriminator: String,
}

/// Storage mapping of one document type.
#[derive(Debug, Clone)]
pub struct DocumentMapping {
    document_type: DocumentType,
    alias: String,
    table_name: String,
    id_strategy: IdStrategy,
    hilo: Option<HiloSettings>,
    fields: Vec<SelectableField>,
    duplicated: Vec<DuplicatedField>,
    subclasses: Vec<SubclassDefinition>,
    parent: Option<ParentLink>,
}

impl DocumentMapping {
    /// Creates a mapping with the type's default alias.
    pub fn for_document<T: Document>() -> Self {
        Self::new(DocumentType::of::<T>(), T::alias())
    }

    /// Creates a mapping for a type and alias.
    pub fn new(document_type: DocumentType, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Self {
            document_type,
            table_name: format!("{}{}", DOCUMENT_TABLE_PREFIX, alias),
            alias,
            id_strategy: IdStrategy::default(),
            hilo: None,
            fields: Vec::new(),
            duplicated: Vec::new(),
            subclasses: Vec::new(),
            parent: None,
        }
    }

    /// Derives the mapping of a subclass stored in `parent`'s table.
    pub(crate) fn subclass_of(parent: &DocumentMapping, subclass: &SubclassDefinition) -> Self {
        let mut mapping = Self {
            document_type: subclass.document_type,
            alias: subclass.alias.clone(),
            table_name: parent.table_name.clone(),
            id_strategy: parent.id_strategy,
            hilo: parent.hilo,
            fields: parent.fields.clone(),
            duplicated: parent.duplicated.clone(),
            subclasses: Vec::new(),
            parent: Some(ParentLink {
                document_type: parent.document_type,
                discriminator: subclass.alias.clone(),
            }),
        };
        (subclass.configure)(&mut mapping);
        mapping
    }

    /// Returns the document type.
    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Returns the alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns the table name.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Overrides the table name.
    pub fn set_table_name(&mut self, table_name: impl Into<String>) -> &mut Self {
        self.table_name = table_name.into();
        self
    }

    /// Returns the id column.
    pub fn id_member(&self) -> &'static str {
        ID_COLUMN
    }

    /// Returns the id strategy.
    pub fn id_strategy(&self) -> IdStrategy {
        self.id_strategy
    }

    /// Sets the id strategy.
    pub fn set_id_strategy(&mut self, strategy: IdStrategy) -> &mut Self {
        self.id_strategy = strategy;
        self
    }

    /// Overrides the store-wide Hi/Lo settings for this type.
    pub fn set_hilo(&mut self, settings: HiloSettings) -> &mut Self {
        self.hilo = Some(settings);
        self
    }

    /// Returns the Hi/Lo override, if any.
    pub fn hilo(&self) -> Option<HiloSettings> {
        self.hilo
    }

    /// Entity name of the Hi/Lo sequence. Subclasses share their parent's.
    pub fn sequence_name(&self) -> &str {
        self.table_name
            .strip_prefix(DOCUMENT_TABLE_PREFIX)
            .unwrap_or(&self.table_name)
    }

    /// Declares a selectable field.
    pub fn field(&mut self, member: impl Into<String>, sql_type: SqlType) -> &mut SelectableField {
        let member = member.into();
        if let Some(pos) = self.fields.iter().position(|f| f.member == member) {
            self.fields[pos].sql_type = sql_type;
            return &mut self.fields[pos];
        }
        self.fields.push(SelectableField::new(member, sql_type));
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    /// Returns the declared fields in declaration order.
    pub fn fields(&self) -> &[SelectableField] {
        &self.fields
    }

    /// Looks up a declared field.
    pub fn selectable_field(&self, member: &str) -> Option<&SelectableField> {
        self.fields.iter().find(|f| f.member == member)
    }

    /// Mirrors a member into its own column.
    pub fn duplicate(&mut self, member: impl Into<String>, sql_type: SqlType) -> &mut DuplicatedField {
        let field = DuplicatedField::new(member, sql_type);
        if let Some(pos) = self.duplicated.iter().position(|d| d.member() == field.member()) {
            self.duplicated[pos] = field;
            return &mut self.duplicated[pos];
        }
        self.duplicated.push(field);
        let last = self.duplicated.len() - 1;
        &mut self.duplicated[last]
    }

    /// Returns the duplicated fields.
    pub fn duplicated_fields(&self) -> &[DuplicatedField] {
        &self.duplicated
    }

    /// Looks up a duplicated field by member path.
    pub fn duplicated_field(&self, member: &str) -> Option<&DuplicatedField> {
        self.duplicated.iter().find(|d| d.member() == member)
    }

    /// Declares a subclass stored in this table.
    pub fn add_subclass<S: Document>(&mut self, alias: impl Into<String>) -> &mut Self {
        let document_type = DocumentType::of::<S>();
        self.subclasses.retain(|s| s.document_type != document_type);
        self.subclasses.push(SubclassDefinition {
            document_type,
            alias: alias.into(),
            configure: S::configure,
        });
        self
    }

    /// Returns the declared subclasses.
    pub fn subclasses(&self) -> &[SubclassDefinition] {
        &self.subclasses
    }

    /// Returns the parent type of a subclass mapping.
    pub fn parent_type(&self) -> Option<DocumentType> {
        self.parent.as_ref().map(|p| p.document_type)
    }

    /// Type that keys this mapping's documents in an identity map.
    ///
    /// Every type of a hierarchy uses its root, since they share one id space.
    pub fn identity_type(&self) -> DocumentType {
        self.parent_type().unwrap_or(self.document_type)
    }

    /// Returns true if the table holds more than one concrete type.
    pub fn is_hierarchy(&self) -> bool {
        !self.subclasses.is_empty() || self.parent.is_some()
    }

    /// Value written to `mt_doc_type` for documents of this mapping.
    pub fn discriminator(&self) -> Option<&str> {
        match &self.parent {
            Some(link) => Some(&link.discriminator),
            None if !self.subclasses.is_empty() => Some(BASE_DOCUMENT_TYPE),
            None => None,
        }
    }

    /// Finds the subclass stored under a discriminator.
    pub fn subclass_for(&self, discriminator: &str) -> Option<DocumentType> {
        self.subclasses
            .iter()
            .find(|s| s.alias == discriminator)
            .map(|s| s.document_type)
    }

    /// Filter every query against this mapping must include.
    pub fn default_filter(&self) -> Option<SqlFragment> {
        self.parent.as_ref().map(|link| {
            SqlFragment::raw(format!("{}.{} = ", DOCUMENT_ALIAS, DOCUMENT_TYPE_COLUMN))
                .bind(link.discriminator.as_str())
        })
    }

    /// Columns selected when hydrating documents.
    pub fn select_fields(&self) -> String {
        let mut fields = format!(
            "{a}.{}, {a}.{}",
            DATA_COLUMN,
            ID_COLUMN,
            a = DOCUMENT_ALIAS
        );
        if self.is_hierarchy() {
            fields.push_str(&format!(", {}.{}", DOCUMENT_ALIAS, DOCUMENT_TYPE_COLUMN));
        }
        fields
    }

    /// `select <fields> from <table> d`
    pub fn select_clause(&self) -> String {
        format!(
            "select {} from {} {}",
            self.select_fields(),
            self.table_name,
            DOCUMENT_ALIAS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use vellum_common::DocumentId;

    #[derive(Serialize, Deserialize)]
    struct Account {
        id: i64,
    }

    impl Document for Account {
        fn id(&self) -> DocumentId {
            self.id.into()
        }

        fn set_id(&mut self, id: DocumentId) {
            self.id = id.as_i64().unwrap_or_default();
        }
    }

    #[derive(Serialize, Deserialize)]
    struct PremiumAccount {
        id: i64,
    }

    impl Document for PremiumAccount {
        fn id(&self) -> DocumentId {
            self.id.into()
        }

        fn set_id(&mut self, id: DocumentId) {
            self.id = id.as_i64().unwrap_or_default();
        }
    }

    #[test]
    fn test_default_mapping() {
        let mapping = DocumentMapping::for_document::<Account>();
        assert_eq!(mapping.alias(), "account");
        assert_eq!(mapping.table_name(), "mt_doc_account");
        assert_eq!(mapping.id_strategy(), IdStrategy::HiLo);
        assert_eq!(mapping.select_fields(), "d.data, d.id");
        assert_eq!(mapping.select_clause(), "select d.data, d.id from mt_doc_account d");
        assert!(mapping.default_filter().is_none());
        assert!(mapping.discriminator().is_none());
    }

    #[test]
    fn test_duplicate_replaces_existing_member() {
        let mut mapping = DocumentMapping::for_document::<Account>();
        mapping.duplicate("FirstName", SqlType::Varchar);
        mapping
            .duplicate("FirstName", SqlType::Varchar)
            .with_column("x_first_name");

        assert_eq!(mapping.duplicated_fields().len(), 1);
        assert_eq!(
            mapping.duplicated_field("FirstName").unwrap().sql_locator(),
            "d.x_first_name"
        );
    }

    #[test]
    fn test_hierarchy_mapping() {
        let mut parent = DocumentMapping::for_document::<Account>();
        parent.duplicate("FirstName", SqlType::Varchar);
        parent.add_subclass::<PremiumAccount>("premium");

        assert!(parent.is_hierarchy());
        assert_eq!(parent.discriminator(), Some("BASE"));
        assert_eq!(parent.select_fields(), "d.data, d.id, d.mt_doc_type");
        assert_eq!(
            parent.subclass_for("premium"),
            Some(DocumentType::of::<PremiumAccount>())
        );

        let sub = DocumentMapping::subclass_of(&parent, &parent.subclasses()[0]);
        assert_eq!(sub.table_name(), "mt_doc_account");
        assert_eq!(sub.sequence_name(), "account");
        assert_eq!(sub.discriminator(), Some("premium"));
        assert_eq!(sub.parent_type(), Some(DocumentType::of::<Account>()));
        assert_eq!(sub.identity_type(), DocumentType::of::<Account>());
        assert_eq!(parent.identity_type(), DocumentType::of::<Account>());
        assert!(sub.duplicated_field("FirstName").is_some());

        let (sql, params) = sub.default_filter().unwrap().build_with_params();
        assert_eq!(sql, "d.mt_doc_type = $1");
        assert_eq!(params, vec![vellum_common::Value::from("premium")]);
    }
}
