//! SQL fragments and batched commands.
//!
//! A [`SqlFragment`] is SQL text interleaved with bound parameter values.
//! Placeholders are only numbered when the fragment is rendered, so the same
//! fragment can be executed on its own (`$1..`) or as one statement of a
//! multi-statement [`Command`] that shares a single parameter set.

use std::fmt::Write;

use vellum_common::constants::STATEMENT_SEPARATOR;
use vellum_common::{Value, VellumError, VellumResult};

/// A part of a fragment being built.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlPart {
    /// Raw SQL text.
    Sql(String),
    /// A parameter placeholder.
    Param(Value),
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlFragment {
    parts: Vec<SqlPart>,
}

impl SqlFragment {
    /// Creates an empty fragment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fragment holding only SQL text.
    pub fn raw(sql: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push_sql(sql);
        fragment
    }

    /// Parses a template whose `?` markers are replaced by `params` in order.
    ///
    /// Markers inside single-quoted literals are left alone.
    pub fn from_template(template: &str, params: Vec<Value>) -> VellumResult<Self> {
        let markers = count_markers(template);
        if markers != params.len() {
            return Err(VellumError::compile(format!(
                "expected {} parameters, got {}",
                markers,
                params.len()
            )));
        }

        let mut fragment = Self::new();
        let mut params = params.into_iter();
        let mut text = String::new();
        let mut in_literal = false;

        for ch in template.chars() {
            match ch {
                '\'' => {
                    in_literal = !in_literal;
                    text.push(ch);
                }
                '?' if !in_literal => {
                    fragment.push_sql(std::mem::take(&mut text));
                    if let Some(param) = params.next() {
                        fragment.push_param(param);
                    }
                }
                _ => text.push(ch),
            }
        }
        fragment.push_sql(text);

        Ok(fragment)
    }

    /// Appends raw SQL.
    pub fn sql(mut self, sql: impl AsRef<str>) -> Self {
        self.push_sql(sql.as_ref());
        self
    }

    /// Appends a parameter.
    pub fn bind<T: Into<Value>>(mut self, value: T) -> Self {
        self.push_param(value.into());
        self
    }

    /// Appends raw SQL in place.
    pub fn push_sql(&mut self, sql: impl Into<String>) {
        let sql = sql.into();
        if sql.is_empty() {
            return;
        }
        // Adjacent text parts are merged so equal fragments compare equal
        // regardless of how they were assembled.
        if let Some(SqlPart::Sql(last)) = self.parts.last_mut() {
            last.push_str(&sql);
        } else {
            self.parts.push(SqlPart::Sql(sql));
        }
    }

    /// Appends a parameter in place.
    pub fn push_param(&mut self, value: Value) {
        self.parts.push(SqlPart::Param(value));
    }

    /// Appends another fragment in place.
    pub fn append(&mut self, other: SqlFragment) {
        for part in other.parts {
            match part {
                SqlPart::Sql(s) => self.push_sql(s),
                SqlPart::Param(v) => self.push_param(v),
            }
        }
    }

    /// Returns the parts of this fragment.
    pub fn parts(&self) -> &[SqlPart] {
        &self.parts
    }

    /// Returns true if the fragment has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Returns the number of bound parameters.
    pub fn param_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, SqlPart::Param(_)))
            .count()
    }

    /// Builds and returns SQL with parameters separated, numbered from `$1`.
    pub fn build_with_params(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        self.render_into(&mut sql, &mut params);
        (sql, params)
    }

    /// Renders into shared buffers, continuing the placeholder numbering.
    fn render_into(&self, sql: &mut String, params: &mut Vec<Value>) {
        for part in &self.parts {
            match part {
                SqlPart::Sql(s) => sql.push_str(s),
                SqlPart::Param(v) => {
                    params.push(v.clone());
                    let _ = write!(sql, "${}", params.len());
                }
            }
        }
    }
}

fn count_markers(template: &str) -> usize {
    let mut in_literal = false;
    let mut count = 0;
    for ch in template.chars() {
        match ch {
            '\'' => in_literal = !in_literal,
            '?' if !in_literal => count += 1,
            _ => {}
        }
    }
    count
}

/// A multi-statement command with one shared parameter set.
///
/// Statements keep the order they were appended in; the result sets of an
/// executed command come back in that same order.
#[derive(Debug, Clone, Default)]
pub struct Command {
    statements: Vec<SqlFragment>,
}

impl Command {
    /// Creates an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a command holding a single statement.
    pub fn single(statement: SqlFragment) -> Self {
        let mut command = Self::new();
        command.append_statement(statement);
        command
    }

    /// Appends a statement and returns its position.
    pub fn append_statement(&mut self, statement: SqlFragment) -> usize {
        self.statements.push(statement);
        self.statements.len() - 1
    }

    /// Returns the statements in execution order.
    pub fn statements(&self) -> &[SqlFragment] {
        &self.statements
    }

    /// Returns the number of statements.
    pub fn statement_count(&self) -> usize {
        self.statements.len()
    }

    /// Returns true if there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Renders the whole command with placeholders numbered across statements.
    pub fn build_with_params(&self) -> (String, Vec<Value>) {
        let mut sql = String::new();
        let mut params = Vec::new();
        for (i, statement) in self.statements.iter().enumerate() {
            if i > 0 {
                sql.push_str(STATEMENT_SEPARATOR);
            }
            statement.render_into(&mut sql, &mut params);
        }
        (sql, params)
    }

    /// Returns the rendered command text.
    pub fn sql(&self) -> String {
        self.build_with_params().0
    }

    /// Returns the shared parameter set.
    pub fn params(&self) -> Vec<Value> {
        self.build_with_params().1
    }
}
