//! # SQL Expression Model
//!
//! The compiled form of a filter: a tree of boolean [`Condition`]s over
//! [`Expression`]s. Nodes never hold SQL text. Column names come from the
//! developer-supplied definitions and values are always bound parameters, so
//! the only place text is produced is [`render`].
//!
//! Columns are qualified by a [`Namespace`] instead of a table name. Inside a
//! relation sub-select, [`Namespace::Default`] is the related table and
//! [`Namespace::Parent`] is the query the sub-select is embedded in. Both are
//! resolved to real aliases only when rendering.
//!
//! The boolean constructors ([`Condition::and`], [`Condition::or`],
//! [`Condition::not`]) fold constants, so a compiled tree never contains a
//! constant below the root.

pub mod render;

pub use render::{RenderOptions, SqlQuery, render};

use crate::filtering::value::NormalizedValue;

/// Which table a column reference belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// The table the condition is evaluated against
    Default,
    /// The enclosing query of a correlated sub-select
    Parent,
    /// A fixed table or join alias
    Table(String),
}

/// A column qualified by its namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub namespace: Namespace,
    pub name: String,
}

impl ColumnRef {
    /// Column on the default namespace
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Default,
            name: name.into(),
        }
    }

    pub fn table(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Table(table.into()),
            name: name.into(),
        }
    }

    /// Column on the enclosing query, for sub-select correlation
    pub fn parent(name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Parent,
            name: name.into(),
        }
    }
}

/// A value-producing SQL expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnRef),
    /// Bound as a parameter, except `Null` which renders as `NULL`
    Value(NormalizedValue),
    /// String concatenation, e.g. a full name built from two columns
    Concat(Vec<Expression>),
    /// `LOWER(..)`, for case-insensitive comparisons
    Lower(Box<Expression>),
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(ColumnRef::new(name))
    }

    /// Concatenate columns, separated by a single space
    pub fn concat_words<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = Vec::new();
        for column in columns {
            if !parts.is_empty() {
                parts.push(Self::Value(NormalizedValue::String(" ".to_string())));
            }
            parts.push(Self::column(column));
        }
        Self::Concat(parts)
    }

    #[must_use]
    pub fn lower(self) -> Self {
        Self::Lower(Box::new(self))
    }
}

impl From<ColumnRef> for Expression {
    fn from(column: ColumnRef) -> Self {
        Self::Column(column)
    }
}

impl From<NormalizedValue> for Expression {
    fn from(value: NormalizedValue) -> Self {
        Self::Value(value)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Sign {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// The sign `s'` such that `a s' b` is `NOT (a s b)` under SQL three-valued logic
    #[must_use]
    pub const fn invert(self) -> Self {
        match self {
            Self::Eq => Self::NotEq,
            Self::NotEq => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Ge => Self::Lt,
            Self::Gt => Self::Le,
            Self::Le => Self::Gt,
        }
    }
}

/// A boolean-valued WHERE expression
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Rendered as `1 = 1` / `1 = 0`
    Constant(bool),
    Compare {
        left: Expression,
        sign: Sign,
        right: Expression,
        /// Whether `left` can be NULL
        nullable: bool,
    },
    IsNull(Expression),
    /// Never empty; empty lists are folded into a constant by the compiler
    In {
        expr: Expression,
        values: Vec<Expression>,
    },
    /// `pattern` is a bound, already escaped LIKE pattern. SQLite's `LIKE`
    /// ignores ASCII case, so case-sensitive matches render as `GLOB` there.
    Like {
        expr: Expression,
        pattern: Expression,
        case_sensitive: bool,
    },
    Exists(Box<SubSelect>),
    /// `condition` evaluated against a table joined onto the enclosing query.
    /// The join itself is hoisted into the FROM clause when rendering.
    Joined {
        join: Box<Join>,
        condition: Box<Condition>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    #[must_use]
    pub const fn always() -> Self {
        Self::Constant(true)
    }

    #[must_use]
    pub const fn never() -> Self {
        Self::Constant(false)
    }

    pub fn compare(left: impl Into<Expression>, sign: Sign, right: impl Into<Expression>) -> Self {
        Self::Compare {
            left: left.into(),
            sign,
            right: right.into(),
            nullable: false,
        }
    }

    pub fn eq(left: impl Into<Expression>, right: impl Into<Expression>) -> Self {
        Self::compare(left, Sign::Eq, right)
    }

    pub fn is_null(expr: impl Into<Expression>) -> Self {
        Self::IsNull(expr.into())
    }

    #[must_use]
    pub fn exists(select: SubSelect) -> Self {
        Self::Exists(Box::new(select))
    }

    #[must_use]
    pub fn joined(join: Join, condition: Self) -> Self {
        Self::Joined {
            join: Box::new(join),
            condition: Box::new(condition),
        }
    }

    /// Conjunction with constant folding.
    ///
    /// `true` children are dropped, a `false` child makes the whole conjunction
    /// `false`, nested conjunctions are flattened and a single remaining child
    /// is returned as is. An empty conjunction is `true`.
    #[must_use]
    pub fn and(children: impl IntoIterator<Item = Self>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                Self::Constant(true) => {}
                Self::Constant(false) => return Self::never(),
                Self::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::always(),
            1 => flat.remove(0),
            _ => Self::And(flat),
        }
    }

    /// Disjunction with constant folding; the dual of [`Condition::and`].
    /// An empty disjunction is `false`.
    #[must_use]
    pub fn or(children: impl IntoIterator<Item = Self>) -> Self {
        let mut flat = Vec::new();
        for child in children {
            match child {
                Self::Constant(false) => {}
                Self::Constant(true) => return Self::always(),
                Self::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => Self::never(),
            1 => flat.remove(0),
            _ => Self::Or(flat),
        }
    }

    /// Negation. Constants flip and double negations cancel.
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Self::Constant(value) => Self::Constant(!value),
            Self::Not(inner) => *inner,
            other => Self::Not(Box::new(other)),
        }
    }

    #[must_use]
    pub const fn as_constant(&self) -> Option<bool> {
        match self {
            Self::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Whether this node renders as a single predicate that `NOT` can invert in place
    #[must_use]
    pub fn is_atom(&self) -> bool {
        match self {
            Self::And(_) | Self::Or(_) | Self::Not(_) => false,
            Self::Joined { condition, .. } => condition.is_atom(),
            _ => true,
        }
    }

    /// Whether this node renders as an AND/OR chain that needs parentheses
    /// when nested
    fn is_junction(&self) -> bool {
        match self {
            Self::And(_) | Self::Or(_) => true,
            Self::Joined { condition, .. } => condition.is_junction(),
            _ => false,
        }
    }

    /// Number of bound parameters in this condition. A join shared by several
    /// [`Condition::Joined`] nodes is counted once per node.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        fn expr_count(expr: &Expression) -> usize {
            match expr {
                Expression::Column(_) | Expression::Value(NormalizedValue::Null) => 0,
                Expression::Value(_) => 1,
                Expression::Concat(parts) => parts.iter().map(expr_count).sum(),
                Expression::Lower(inner) => expr_count(inner),
            }
        }

        match self {
            Self::Constant(_) => 0,
            Self::Compare { left, right, .. }
            | Self::Like {
                expr: left,
                pattern: right,
                ..
            } => {
                expr_count(left) + expr_count(right)
            }
            Self::IsNull(expr) => expr_count(expr),
            Self::In { expr, values } => expr_count(expr) + values.iter().map(expr_count).sum::<usize>(),
            Self::Exists(select) => {
                select
                    .joins
                    .iter()
                    .map(|join| join.on.parameter_count())
                    .sum::<usize>()
                    + select.condition.parameter_count()
            }
            Self::And(children) | Self::Or(children) => {
                children.iter().map(Self::parameter_count).sum()
            }
            Self::Joined { join, condition } => {
                join.on.parameter_count() + condition.parameter_count()
            }
            Self::Not(inner) => inner.parameter_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

impl JoinKind {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A joined table.
///
/// Inside a [`SubSelect`] template the `on` condition is evaluated in the
/// sub-select's scope and joined columns are addressed with
/// [`Namespace::Table`]. Under [`Condition::Joined`] the `on` condition and the
/// joined filter see the joined table as [`Namespace::Default`] and the
/// enclosing query as [`Namespace::Parent`].
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    pub alias: Option<String>,
    pub on: Condition,
}

impl Join {
    pub fn inner(table: impl Into<String>, on: Condition) -> Self {
        Self {
            kind: JoinKind::Inner,
            table: table.into(),
            alias: None,
            on,
        }
    }

    pub fn left(table: impl Into<String>, on: Condition) -> Self {
        Self {
            kind: JoinKind::Left,
            table: table.into(),
            alias: None,
            on,
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name the joined table is addressed by
    #[must_use]
    pub fn scope_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}

/// `SELECT 1 FROM table [joins] WHERE condition`, used under `EXISTS`.
///
/// Within the sub-select, [`Namespace::Default`] resolves to the alias (or
/// table name) and [`Namespace::Parent`] to the enclosing query's default.
#[derive(Debug, Clone, PartialEq)]
pub struct SubSelect {
    pub table: String,
    pub alias: Option<String>,
    pub joins: Vec<Join>,
    pub condition: Condition,
}

impl SubSelect {
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: None,
            joins: Vec::new(),
            condition: Condition::always(),
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// AND another predicate into the WHERE clause
    #[must_use]
    pub fn and_where(mut self, condition: Condition) -> Self {
        let current = std::mem::replace(&mut self.condition, Condition::always());
        self.condition = Condition::and([current, condition]);
        self
    }

    /// Name the default namespace resolves to inside this sub-select
    #[must_use]
    pub fn scope_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }
}
