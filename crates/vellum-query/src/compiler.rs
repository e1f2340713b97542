//! Compiles predicate trees into SQL against a document table.
//!
//! Members are located either through a duplicated column (`d.first_name`)
//! or through the JSON payload (`d.data -> 'Inner' ->> 'Number'`). Non-text
//! JSON members are cast, with the type taken from the mapping's declared
//! field or inferred from the bound value. Every value is bound as a
//! parameter; nothing is interpolated.

use vellum_client::SqlFragment;
use vellum_common::constants::{DATA_COLUMN, DOCUMENT_ALIAS, ID_COLUMN};
use vellum_common::{Value, VellumError, VellumResult};
use vellum_schema::DocumentMapping;

use crate::expr::Predicate;
use crate::model::{OrderBy, SortDirection};

/// Member names that resolve to the id column.
const ID_MEMBERS: [&str; 2] = ["Id", "id"];

/// Compiles predicates and ordering for one mapping.
#[derive(Debug, Clone, Copy)]
pub struct WhereCompiler<'a> {
    mapping: &'a DocumentMapping,
}

impl<'a> WhereCompiler<'a> {
    /// Creates a compiler for a mapping.
    pub fn new(mapping: &'a DocumentMapping) -> Self {
        Self { mapping }
    }

    /// Compiles the where clauses plus the mapping's default filter.
    ///
    /// Returns `None` when there is nothing to filter on.
    pub fn compile_where(&self, wheres: &[Predicate]) -> VellumResult<Option<SqlFragment>> {
        let default_filter = self.mapping.default_filter();
        // Raw fragments are parenthesized whenever another clause is ANDed on.
        let nested = wheres.len() > 1 || default_filter.is_some();

        let mut clauses = Vec::with_capacity(wheres.len() + 1);
        for predicate in wheres {
            clauses.push(self.compile(predicate, nested)?);
        }
        clauses.extend(default_filter);
        if clauses.is_empty() {
            return Ok(None);
        }

        let mut out = SqlFragment::new();
        for (i, clause) in clauses.into_iter().enumerate() {
            if i > 0 {
                out.push_sql(" and ");
            }
            out.append(clause);
        }
        Ok(Some(out))
    }

    /// Compiles one predicate.
    pub fn compile_predicate(&self, predicate: &Predicate) -> VellumResult<SqlFragment> {
        self.compile(predicate, false)
    }

    fn compile(&self, predicate: &Predicate, nested: bool) -> VellumResult<SqlFragment> {
        let mut out = SqlFragment::new();
        match predicate {
            Predicate::Compare { member, op, value } => {
                if value.is_null() {
                    return Err(VellumError::compile(format!(
                        "cannot compare '{}' {} null; use is_null or has_value",
                        member, op
                    )));
                }
                out.push_sql(format!("{} {} ", self.locator(member, Some(value))?, op.as_sql()));
                out.push_param(value.clone());
            }
            Predicate::IsNull(member) => {
                out.push_sql(format!("{} is null", self.locator(member, None)?));
            }
            Predicate::IsNotNull(member) => {
                out.push_sql(format!("{} is not null", self.locator(member, None)?));
            }
            Predicate::Like {
                member,
                op,
                value,
                ignore_case,
                negated,
            } => {
                let keyword = match (ignore_case, negated) {
                    (false, false) => "like",
                    (true, false) => "ilike",
                    (false, true) => "not like",
                    (true, true) => "not ilike",
                };
                out.push_sql(format!("{} {} ", self.text_locator(member)?, keyword));
                out.push_param(Value::String(op.pattern(value)));
            }
            Predicate::In {
                member,
                values,
                negated,
            } => {
                let locator = self.locator(member, values.first())?;
                if *negated {
                    out.push_sql(format!("not ({} = ANY(", locator));
                    out.push_param(Value::Array(values.clone()));
                    out.push_sql("))");
                } else {
                    out.push_sql(format!("{} = ANY(", locator));
                    out.push_param(Value::Array(values.clone()));
                    out.push_sql(")");
                }
            }
            Predicate::And(left, right) => {
                out.push_sql("(");
                out.append(self.compile(left, true)?);
                out.push_sql(" and ");
                out.append(self.compile(right, true)?);
                out.push_sql(")");
            }
            Predicate::Or(left, right) => {
                out.push_sql("(");
                out.append(self.compile(left, true)?);
                out.push_sql(" or ");
                out.append(self.compile(right, true)?);
                out.push_sql(")");
            }
            Predicate::Not(inner) => {
                out.push_sql("NOT (");
                out.append(self.compile(inner, false)?);
                out.push_sql(")");
            }
            Predicate::Sql { sql, params } => {
                let fragment = SqlFragment::from_template(sql, params.clone())?;
                if nested {
                    out.push_sql("(");
                    out.append(fragment);
                    out.push_sql(")");
                } else {
                    out.append(fragment);
                }
            }
        }
        Ok(out)
    }

    /// Compiles ordering terms to `<locator> [desc], ...`.
    pub fn compile_order_by(&self, ordering: &[OrderBy]) -> VellumResult<Option<String>> {
        if ordering.is_empty() {
            return Ok(None);
        }
        let terms = ordering
            .iter()
            .map(|o| {
                let locator = self.locator(&o.member, None)?;
                Ok(match o.direction {
                    SortDirection::Asc => locator,
                    SortDirection::Desc => format!("{} desc", locator),
                })
            })
            .collect::<VellumResult<Vec<_>>>()?;
        Ok(Some(terms.join(", ")))
    }

    /// SQL locator for a member, cast when the member is not text.
    pub fn locator(&self, member: &str, value: Option<&Value>) -> VellumResult<String> {
        validate_member(member)?;

        if ID_MEMBERS.contains(&member) {
            return Ok(format!("{}.{}", DOCUMENT_ALIAS, ID_COLUMN));
        }
        if let Some(duplicated) = self.mapping.duplicated_field(member) {
            if duplicated.is_searchable() {
                return Ok(duplicated.sql_locator());
            }
        }

        let json = json_locator(member);
        let cast = match self.mapping.selectable_field(member) {
            Some(declared) if declared.sql_type.is_text() => None,
            Some(declared) => Some(declared.sql_type.as_sql()),
            None => value.and_then(Value::sql_cast_type),
        };
        Ok(match cast {
            Some(sql_type) => format!("CAST({} as {})", json, sql_type),
            None => json,
        })
    }

    /// SQL locator for a member compared as text.
    pub fn text_locator(&self, member: &str) -> VellumResult<String> {
        validate_member(member)?;
        if let Some(duplicated) = self.mapping.duplicated_field(member) {
            if duplicated.is_searchable() && duplicated.sql_type().is_text() {
                return Ok(duplicated.sql_locator());
            }
        }
        Ok(json_locator(member))
    }
}

/// `d.data -> 'A' -> 'B' ->> 'C'` for `A.B.C`.
fn json_locator(member: &str) -> String {
    let segments: Vec<&str> = member.split('.').collect();
    let mut locator = format!("{}.{}", DOCUMENT_ALIAS, DATA_COLUMN);
    for (i, segment) in segments.iter().enumerate() {
        let arrow = if i + 1 == segments.len() { "->>" } else { "->" };
        locator.push_str(&format!(" {} '{}'", arrow, segment));
    }
    locator
}

fn validate_member(member: &str) -> VellumResult<()> {
    if member.is_empty() || member.split('.').any(str::is_empty) {
        return Err(VellumError::compile(format!(
            "'{}' is not a valid member path",
            member
        )));
    }
    if member.contains('\'') || member.contains('"') {
        return Err(VellumError::compile(format!(
            "member path '{}' may not contain quotes",
            member
        )));
    }
    Ok(())
}
