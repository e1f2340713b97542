//! The logical shape of a document query.

use std::fmt;
use std::marker::PhantomData;

use vellum_schema::DocumentType;

use crate::expr::Predicate;

/// How the rows of a query are reduced to a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultOperator {
    /// Every matching document.
    #[default]
    None,
    /// The first document; zero rows is an error.
    First,
    /// The first document, if any.
    FirstOrDefault,
    /// Exactly one document.
    Single,
    /// At most one document.
    SingleOrDefault,
    /// Whether any document matches.
    Any,
    /// Number of matching documents.
    Count,
    /// The last document. Not supported.
    Last,
    /// The last document, if any. Not supported.
    LastOrDefault,
}

impl ResultOperator {
    /// Returns the operator name.
    pub fn name(&self) -> &'static str {
        match self {
            ResultOperator::None => "None",
            ResultOperator::First => "First",
            ResultOperator::FirstOrDefault => "FirstOrDefault",
            ResultOperator::Single => "Single",
            ResultOperator::SingleOrDefault => "SingleOrDefault",
            ResultOperator::Any => "Any",
            ResultOperator::Count => "Count",
            ResultOperator::Last => "Last",
            ResultOperator::LastOrDefault => "LastOrDefault",
        }
    }

    /// Row limit the operator needs when no explicit take is given.
    ///
    /// Single over-fetches one row so a second match can be detected.
    pub fn implied_limit(&self) -> Option<u64> {
        match self {
            ResultOperator::First | ResultOperator::FirstOrDefault => Some(1),
            ResultOperator::Single | ResultOperator::SingleOrDefault => Some(2),
            _ => None,
        }
    }

    /// Returns true for operators that produce a scalar instead of documents.
    pub fn is_scalar(&self) -> bool {
        matches!(self, ResultOperator::Any | ResultOperator::Count)
    }
}

impl fmt::Display for ResultOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderBy {
    /// Member path.
    pub member: String,
    /// Direction.
    pub direction: SortDirection,
}

/// A query against one document type.
///
/// Skips and takes are kept as given; the largest of each wins when the
/// query is rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryModel {
    document_type: DocumentType,
    wheres: Vec<Predicate>,
    order_by: Vec<OrderBy>,
    skips: Vec<u64>,
    takes: Vec<u64>,
    operator: ResultOperator,
}

impl QueryModel {
    /// Creates an unfiltered query over a document type.
    pub fn new(document_type: DocumentType) -> Self {
        Self {
            document_type,
            wheres: Vec::new(),
            order_by: Vec::new(),
            skips: Vec::new(),
            takes: Vec::new(),
            operator: ResultOperator::None,
        }
    }

    /// Creates an unfiltered query over `T`.
    pub fn of<T: 'static>() -> Self {
        Self::new(DocumentType::of::<T>())
    }

    /// Adds a where clause. Separate clauses are ANDed.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    /// Appends an ascending ordering term.
    pub fn order_by(mut self, member: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            member: member.into(),
            direction: SortDirection::Asc,
        });
        self
    }

    /// Appends a descending ordering term.
    pub fn order_by_descending(mut self, member: impl Into<String>) -> Self {
        self.order_by.push(OrderBy {
            member: member.into(),
            direction: SortDirection::Desc,
        });
        self
    }

    /// Skips rows.
    pub fn skip(mut self, count: u64) -> Self {
        self.skips.push(count);
        self
    }

    /// Limits rows.
    pub fn take(mut self, count: u64) -> Self {
        self.takes.push(count);
        self
    }

    /// Sets the result operator.
    pub fn with_operator(mut self, operator: ResultOperator) -> Self {
        self.operator = operator;
        self
    }

    /// Returns the document type.
    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    /// Returns the where clauses.
    pub fn wheres(&self) -> &[Predicate] {
        &self.wheres
    }

    /// Returns the ordering terms.
    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Returns the result operator.
    pub fn operator(&self) -> ResultOperator {
        self.operator
    }

    /// Largest explicit skip.
    pub fn offset(&self) -> Option<u64> {
        self.skips.iter().copied().max()
    }

    /// Largest explicit take.
    pub fn explicit_take(&self) -> Option<u64> {
        self.takes.iter().copied().max()
    }

    /// Effective row limit: the explicit take, else the operator's.
    pub fn limit(&self) -> Option<u64> {
        self.explicit_take().or_else(|| self.operator.implied_limit())
    }
}

/// A typed query builder.
///
/// ```rust,ignore
/// let query = Query::<Target>::new()
///     .filter(field("Number").gt(4))
///     .order_by_descending("Number")
///     .take(10);
/// let targets = session.query(query).await?;
/// ```
pub struct Query<T> {
    model: QueryModel,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Query<T> {
    /// Creates an unfiltered query over `T`.
    pub fn new() -> Self {
        Self {
            model: QueryModel::of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Adds a where clause.
    pub fn filter(self, predicate: Predicate) -> Self {
        self.map(|m| m.filter(predicate))
    }

    /// Appends an ascending ordering term.
    pub fn order_by(self, member: impl Into<String>) -> Self {
        self.map(|m| m.order_by(member))
    }

    /// Appends a descending ordering term.
    pub fn order_by_descending(self, member: impl Into<String>) -> Self {
        self.map(|m| m.order_by_descending(member))
    }

    /// Skips rows.
    pub fn skip(self, count: u64) -> Self {
        self.map(|m| m.skip(count))
    }

    /// Limits rows.
    pub fn take(self, count: u64) -> Self {
        self.map(|m| m.take(count))
    }

    /// Returns the underlying model.
    pub fn model(&self) -> &QueryModel {
        &self.model
    }

    /// Returns the model with `operator` applied.
    pub fn into_model(self, operator: ResultOperator) -> QueryModel {
        self.model.with_operator(operator)
    }

    fn map(self, f: impl FnOnce(QueryModel) -> QueryModel) -> Self {
        Self {
            model: f(self.model),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Query").field(&self.model).finish()
    }
}
