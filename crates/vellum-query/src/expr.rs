//! Predicate trees over document members.
//!
//! Predicates are built fluently from a [`Field`]:
//!
//! ```rust
//! use vellum_query::expr::field;
//!
//! let predicate = field("Number")
//!     .gt(4)
//!     .or(field("NullableNumber").is_null())
//!     .and(field("Inner.Color").eq("Blue"));
//! ```
//!
//! Member paths are the JSON property names of the serialized document,
//! with `.` separating nested objects.

use std::fmt;

use vellum_common::Value;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
}

impl ComparisonOp {
    /// Returns the SQL operator.
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::GtEq => ">=",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// String matching operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringOp {
    /// Prefix match.
    StartsWith,
    /// Suffix match.
    EndsWith,
    /// Substring match.
    Contains,
}

impl StringOp {
    /// Builds the LIKE pattern for `value`.
    pub fn pattern(&self, value: &str) -> String {
        let escaped = escape_like(value);
        match self {
            StringOp::StartsWith => format!("{}%", escaped),
            StringOp::EndsWith => format!("%{}", escaped),
            StringOp::Contains => format!("%{}%", escaped),
        }
    }
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// A boolean expression over document members.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `member op value`.
    Compare {
        /// Member path.
        member: String,
        /// Operator.
        op: ComparisonOp,
        /// Right-hand side.
        value: Value,
    },

    /// `member IS NULL`.
    IsNull(String),

    /// `member IS NOT NULL`.
    IsNotNull(String),

    /// `member [NOT] [I]LIKE pattern`.
    Like {
        /// Member path.
        member: String,
        /// Match kind.
        op: StringOp,
        /// Text to match.
        value: String,
        /// Use `ilike`.
        ignore_case: bool,
        /// Negate the match.
        negated: bool,
    },

    /// `member = ANY(values)`.
    In {
        /// Member path.
        member: String,
        /// Candidate values.
        values: Vec<Value>,
        /// Negate the membership test.
        negated: bool,
    },

    /// Both sides hold.
    And(Box<Predicate>, Box<Predicate>),

    /// Either side holds.
    Or(Box<Predicate>, Box<Predicate>),

    /// Negation.
    Not(Box<Predicate>),

    /// Raw SQL with `?` placeholders.
    Sql {
        /// SQL template.
        sql: String,
        /// Values for the placeholders, in order.
        params: Vec<Value>,
    },
}

impl Predicate {
    /// Raw SQL where fragment; each `?` binds the next parameter.
    pub fn sql(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Predicate::Sql {
            sql: sql.into(),
            params,
        }
    }

    /// Conjunction.
    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    /// Disjunction.
    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Negation. Null checks and membership tests flip in place.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Predicate::IsNull(member) => Predicate::IsNotNull(member),
            Predicate::IsNotNull(member) => Predicate::IsNull(member),
            Predicate::Like {
                member,
                op,
                value,
                ignore_case,
                negated,
            } => Predicate::Like {
                member,
                op,
                value,
                ignore_case,
                negated: !negated,
            },
            Predicate::In {
                member,
                values,
                negated,
            } => Predicate::In {
                member,
                values,
                negated: !negated,
            },
            Predicate::Not(inner) => *inner,
            other => Predicate::Not(Box::new(other)),
        }
    }
}

/// Starts a predicate on a document member.
pub fn field(member: impl Into<String>) -> Field {
    Field::new(member)
}

/// A document member used to build predicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    member: String,
}

impl Field {
    /// Creates a field for a dotted member path.
    pub fn new(member: impl Into<String>) -> Self {
        Self {
            member: member.into(),
        }
    }

    /// Returns the member path.
    pub fn member(&self) -> &str {
        &self.member
    }

    fn compare(&self, op: ComparisonOp, value: Value) -> Predicate {
        match (op, value.is_null()) {
            (ComparisonOp::Eq, true) => Predicate::IsNull(self.member.clone()),
            (ComparisonOp::NotEq, true) => Predicate::IsNotNull(self.member.clone()),
            _ => Predicate::Compare {
                member: self.member.clone(),
                op,
                value,
            },
        }
    }

    /// `member = value`; a null value becomes `IS NULL`.
    pub fn eq(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Eq, value.into())
    }

    /// `member != value`; a null value becomes `IS NOT NULL`.
    pub fn not_eq(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::NotEq, value.into())
    }

    /// `member > value`
    pub fn gt(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Gt, value.into())
    }

    /// `member >= value`
    pub fn gt_eq(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::GtEq, value.into())
    }

    /// `member < value`
    pub fn lt(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::Lt, value.into())
    }

    /// `member <= value`
    pub fn lt_eq(&self, value: impl Into<Value>) -> Predicate {
        self.compare(ComparisonOp::LtEq, value.into())
    }

    /// `member IS NULL`
    pub fn is_null(&self) -> Predicate {
        Predicate::IsNull(self.member.clone())
    }

    /// `member IS NOT NULL`
    pub fn has_value(&self) -> Predicate {
        Predicate::IsNotNull(self.member.clone())
    }

    fn like(&self, op: StringOp, value: &str, ignore_case: bool) -> Predicate {
        Predicate::Like {
            member: self.member.clone(),
            op,
            value: value.to_string(),
            ignore_case,
            negated: false,
        }
    }

    /// Prefix match.
    pub fn starts_with(&self, value: &str) -> Predicate {
        self.like(StringOp::StartsWith, value, false)
    }

    /// Case-insensitive prefix match.
    pub fn starts_with_ignore_case(&self, value: &str) -> Predicate {
        self.like(StringOp::StartsWith, value, true)
    }

    /// Suffix match.
    pub fn ends_with(&self, value: &str) -> Predicate {
        self.like(StringOp::EndsWith, value, false)
    }

    /// Case-insensitive suffix match.
    pub fn ends_with_ignore_case(&self, value: &str) -> Predicate {
        self.like(StringOp::EndsWith, value, true)
    }

    /// Substring match.
    pub fn contains(&self, value: &str) -> Predicate {
        self.like(StringOp::Contains, value, false)
    }

    /// Case-insensitive substring match.
    pub fn contains_ignore_case(&self, value: &str) -> Predicate {
        self.like(StringOp::Contains, value, true)
    }

    /// Membership in a list, bound as one array parameter.
    pub fn is_in<I, V>(&self, values: I) -> Predicate
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate::In {
            member: self.member.clone(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_comparisons_become_null_checks() {
        assert_eq!(
            field("NullableNumber").eq(Value::Null),
            Predicate::IsNull("NullableNumber".into())
        );
        assert_eq!(
            field("NullableNumber").not_eq(Option::<i32>::None),
            Predicate::IsNotNull("NullableNumber".into())
        );
    }

    #[test]
    fn test_not_flips_null_checks() {
        let has_value = field("NullableNumber").has_value();
        assert_eq!(has_value.clone().not(), field("NullableNumber").is_null());
        assert_eq!(has_value.clone().not().not(), has_value);
    }

    #[test]
    fn test_not_wraps_comparisons() {
        let p = field("Number").gt(4).not();
        assert!(matches!(p, Predicate::Not(_)));
        assert_eq!(p.not(), field("Number").gt(4));
    }

    #[test]
    fn test_like_patterns_escape_wildcards() {
        assert_eq!(StringOp::StartsWith.pattern("ab"), "ab%");
        assert_eq!(StringOp::EndsWith.pattern("ab"), "%ab");
        assert_eq!(StringOp::Contains.pattern("5%_off"), "%5\\%\\_off%");
    }
}
