//! Full statements for a query model.

use tracing::trace;
use vellum_client::SqlFragment;
use vellum_common::constants::DOCUMENT_ALIAS;
use vellum_common::{VellumError, VellumResult};
use vellum_schema::DocumentMapping;

use crate::compiler::WhereCompiler;
use crate::model::{QueryModel, ResultOperator};

/// Renders a [`QueryModel`] against its mapping.
#[derive(Debug, Clone, Copy)]
pub struct DocumentQuery<'a> {
    mapping: &'a DocumentMapping,
    model: &'a QueryModel,
}

impl<'a> DocumentQuery<'a> {
    /// Creates a renderer.
    pub fn new(mapping: &'a DocumentMapping, model: &'a QueryModel) -> Self {
        Self { mapping, model }
    }

    /// Renders the statement the model's operator calls for.
    ///
    /// `Last` and `LastOrDefault` fail before any SQL is produced.
    pub fn to_fragment(&self) -> VellumResult<SqlFragment> {
        let fragment = match self.model.operator() {
            ResultOperator::Any => self.to_any()?,
            ResultOperator::Count => self.to_count()?,
            ResultOperator::Last | ResultOperator::LastOrDefault => {
                return Err(VellumError::compile(format!(
                    "{} is not supported; reverse the ordering and use First",
                    self.model.operator()
                )))
            }
            _ => self.to_select()?,
        };
        trace!(table = self.mapping.table_name(), operator = %self.model.operator(), "rendered document query");
        Ok(fragment)
    }

    /// `select (count(*) > 0) as result from <table> d [where ...]`
    pub fn to_any(&self) -> VellumResult<SqlFragment> {
        let mut out = SqlFragment::raw(format!(
            "select (count(*) > 0) as result from {} {}",
            self.mapping.table_name(),
            DOCUMENT_ALIAS
        ));
        self.append_where(&mut out)?;
        Ok(out)
    }

    /// `select count(*) from <table> d [where ...]`
    pub fn to_count(&self) -> VellumResult<SqlFragment> {
        let mut out = SqlFragment::raw(format!(
            "select count(*) from {} {}",
            self.mapping.table_name(),
            DOCUMENT_ALIAS
        ));
        self.append_where(&mut out)?;
        Ok(out)
    }

    /// `select <fields> from <table> d [where] [order by] [LIMIT] [OFFSET]`
    pub fn to_select(&self) -> VellumResult<SqlFragment> {
        let mut out = SqlFragment::raw(self.mapping.select_clause());
        self.append_where(&mut out)?;

        let compiler = WhereCompiler::new(self.mapping);
        if let Some(order) = compiler.compile_order_by(self.model.ordering())? {
            out.push_sql(format!(" order by {}", order));
        }
        if let Some(limit) = self.model.limit() {
            out.push_sql(format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.model.offset() {
            out.push_sql(format!(" OFFSET {}", offset));
        }
        Ok(out)
    }

    fn append_where(&self, out: &mut SqlFragment) -> VellumResult<()> {
        let compiler = WhereCompiler::new(self.mapping);
        if let Some(filter) = compiler.compile_where(self.model.wheres())? {
            out.push_sql(" where ");
            out.append(filter);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{field, Predicate};
    use serde::{Deserialize, Serialize};
    use vellum_common::{DocumentId, Value};
    use vellum_schema::{Document, SqlType, StoreOptions};

    #[derive(Serialize, Deserialize)]
    struct Target {
        id: i64,
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
        }
    }

    #[derive(Serialize, Deserialize)]
    struct User {
        id: i64,
    }

    impl Document for User {
        fn id(&self) -> DocumentId {
            self.id.into()
        }

        fn set_id(&mut self, id: DocumentId) {
            self.id = id.as_i64().unwrap_or_default();
        }

        fn configure(mapping: &mut DocumentMapping) {
            mapping.add_subclass::<AdminUser>("admin");
        }
    }

    #[derive(Serialize, Deserialize)]
    struct AdminUser {
        id: i64,
    }

    impl Document for AdminUser {
        fn id(&self) -> DocumentId {
            self.id.into()
        }

        fn set_id(&mut self, id: DocumentId) {
            self.id = id.as_i64().unwrap_or_default();
        }
    }

    fn options() -> StoreOptions {
        let mut options = StoreOptions::default();
        options.register::<Target>().register::<User>();
        options
    }

    fn render(model: QueryModel) -> VellumResult<(String, Vec<Value>)> {
        let options = options();
        let mapping = options.mapping(&model.document_type())?;
        let fragment = DocumentQuery::new(&mapping, &model).to_fragment()?;
        Ok(fragment.build_with_params())
    }

    #[test]
    fn test_plain_select() {
        let (sql, params) = render(QueryModel::of::<Target>()).unwrap();
        assert_eq!(sql, "select d.data, d.id from mt_doc_target d");
        assert!(params.is_empty());
    }

    #[test]
    fn test_any_and_count() {
        let filter = field("Number").gt(4);
        let (any, _) = render(
            QueryModel::of::<Target>()
                .filter(filter.clone())
                .with_operator(ResultOperator::Any),
        )
        .unwrap();
        assert_eq!(
            any,
            "select (count(*) > 0) as result from mt_doc_target d \
             where CAST(d.data ->> 'Number' as integer) > $1"
        );

        let (count, params) = render(
            QueryModel::of::<Target>()
                .filter(filter)
                .with_operator(ResultOperator::Count),
        )
        .unwrap();
        assert_eq!(
            count,
            "select count(*) from mt_doc_target d where CAST(d.data ->> 'Number' as integer) > $1"
        );
        assert_eq!(params, vec![Value::Integer(4)]);
    }

    #[test]
    fn test_cardinality_limits() {
        let (first, _) = render(QueryModel::of::<Target>().with_operator(ResultOperator::First)).unwrap();
        assert_eq!(first, "select d.data, d.id from mt_doc_target d LIMIT 1");

        let (single, _) =
            render(QueryModel::of::<Target>().with_operator(ResultOperator::SingleOrDefault)).unwrap();
        assert_eq!(single, "select d.data, d.id from mt_doc_target d LIMIT 2");
    }

    #[test]
    fn test_order_take_skip() {
        let (sql, _) = render(
            QueryModel::of::<Target>()
                .filter(field("Number").gt_eq(2))
                .order_by_descending("Number")
                .skip(5)
                .skip(10)
                .take(3),
        )
        .unwrap();
        assert_eq!(
            sql,
            "select d.data, d.id from mt_doc_target d \
             where CAST(d.data ->> 'Number' as integer) >= $1 \
             order by CAST(d.data ->> 'Number' as integer) desc LIMIT 3 OFFSET 10"
        );
    }

    #[test]
    fn test_last_fails_before_sql() {
        let err = render(QueryModel::of::<Target>().with_operator(ResultOperator::Last)).unwrap_err();
        assert!(matches!(err, VellumError::Compile { .. }));
        assert!(err.to_string().contains("Last"));
    }

    #[test]
    fn test_compiling_twice_is_deterministic() {
        let model = QueryModel::of::<Target>()
            .filter(field("Number").gt(1).or(field("Color").is_in(["Red", "Blue"])))
            .order_by("Number")
            .with_operator(ResultOperator::First);
        assert_eq!(render(model.clone()).unwrap(), render(model).unwrap());
    }

    #[test]
    fn test_hierarchy_queries() {
        let (base, _) = render(QueryModel::of::<User>()).unwrap();
        assert_eq!(base, "select d.data, d.id, d.mt_doc_type from mt_doc_user d");

        let (sub, params) =
            render(QueryModel::of::<AdminUser>().filter(field("Role").eq("root"))).unwrap();
        assert_eq!(
            sub,
            "select d.data, d.id, d.mt_doc_type from mt_doc_user d \
             where d.data ->> 'Role' = $1 and d.mt_doc_type = $2"
        );
        assert_eq!(params, vec![Value::from("root"), Value::from("admin")]);
    }

    #[test]
    fn test_raw_disjunction_stays_inside_subclass_filter() {
        let (sql, params) = render(QueryModel::of::<AdminUser>().filter(Predicate::sql(
            "d.data ->> 'Region' = ? or d.data ->> 'Region' = ?",
            vec![Value::from("north"), Value::from("south")],
        )))
        .unwrap();
        assert_eq!(
            sql,
            "select d.data, d.id, d.mt_doc_type from mt_doc_user d \
             where (d.data ->> 'Region' = $1 or d.data ->> 'Region' = $2) and d.mt_doc_type = $3"
        );
        assert_eq!(params[2], Value::from("admin"));

        let (sql, _) = render(QueryModel::of::<Target>().filter(Predicate::sql(
            "d.id = ? or d.id = ?",
            vec![1.into(), 2.into()],
        )))
        .unwrap();
        assert_eq!(sql, "select d.data, d.id from mt_doc_target d where d.id = $1 or d.id = $2");
    }

    #[test]
    fn test_unregistered_type() {
        struct Stranger;
        assert!(matches!(
            render(QueryModel::of::<Stranger>()),
            Err(VellumError::UnknownDocumentType { .. })
        ));
    }
}
