//! Rendering of conditions into SQL text plus ordered bound parameters.
//!
//! Dialect differences are keyed on [`DatabaseBackend`]:
//!
//! | Backend    | Identifiers | Placeholders          | LIKE escape       |
//! |------------|-------------|-----------------------|-------------------|
//! | `MySql`    | `` `a` ``   | `?`                   | implicit `\`      |
//! | `Postgres` | `"a"`       | `$1`, `$2`, ...       | implicit `\`      |
//! | `Sqlite`   | `"a"`       | `?`                   | `ESCAPE '\'`      |
//!
//! SQLite's `LIKE` ignores ASCII case, so a case-sensitive `LIKE` is rendered
//! as the equivalent `GLOB` there. On MySQL, whether `=` and `LIKE` respect
//! case for a case-sensitive column is decided by the column's collation.
//!
//! [`Condition::Joined`] nodes contribute a JOIN clause to [`SqlQuery::joins`]
//! (or to the FROM clause of the enclosing sub-select). Identical joins are
//! emitted once.
use sea_orm::{DatabaseBackend, Statement, Value};

use super::{Condition, Expression, Join, Namespace, SubSelect};
use crate::errors::RenderError;
use crate::filtering::value::NormalizedValue;

/// Where the rendered fragment will be embedded
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub backend: DatabaseBackend,
    /// Alias of the table the filter applies to
    pub default_namespace: String,
    /// Alias of the enclosing query, when the fragment is itself correlated
    pub parent_namespace: Option<String>,
    /// Parameters already bound before this fragment (Postgres `$n` numbering)
    pub param_offset: usize,
}

impl RenderOptions {
    pub fn new(backend: DatabaseBackend, default_namespace: impl Into<String>) -> Self {
        Self {
            backend,
            default_namespace: default_namespace.into(),
            parent_namespace: None,
            param_offset: 0,
        }
    }

    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_namespace = Some(parent.into());
        self
    }

    #[must_use]
    pub const fn with_param_offset(mut self, offset: usize) -> Self {
        self.param_offset = offset;
        self
    }
}

/// A rendered WHERE fragment
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    /// JOIN clauses required by joined relations, each with a leading space.
    /// They belong right after the FROM clause of the embedding query, and
    /// their parameters come first in `values`.
    pub joins: String,
    pub sql: String,
    pub values: Vec<Value>,
    pub backend: DatabaseBackend,
}

impl SqlQuery {
    /// Append the joins and the WHERE clause to `select`, which must end
    /// with its FROM clause
    #[must_use]
    pub fn into_statement(self, select: &str) -> Statement {
        Statement::from_sql_and_values(
            self.backend,
            format!("{select}{} WHERE {}", self.joins, self.sql),
            self.values,
        )
    }
}

/// Render `condition` for embedding into a query on `options.default_namespace`.
///
/// # Errors
///
/// Returns [`RenderError::UnresolvedNamespace`] when the condition references
/// [`Namespace::Parent`] outside of a sub-select and no parent alias is set.
pub fn render(condition: &Condition, options: &RenderOptions) -> Result<SqlQuery, RenderError> {
    let mut renderer = Renderer {
        backend: options.backend,
        param_offset: options.param_offset,
        sql: String::new(),
        values: Vec::new(),
    };
    let scope = Scope {
        default: &options.default_namespace,
        parent: options.parent_namespace.as_deref(),
    };
    renderer.hoist_joins(condition, scope)?;
    let joins = std::mem::take(&mut renderer.sql);
    renderer.condition(condition, scope)?;

    Ok(SqlQuery {
        joins,
        sql: renderer.sql,
        values: renderer.values,
        backend: options.backend,
    })
}

impl Condition {
    /// Shorthand for [`render`]
    ///
    /// # Errors
    ///
    /// See [`render`].
    pub fn render(&self, options: &RenderOptions) -> Result<SqlQuery, RenderError> {
        render(self, options)
    }
}

#[derive(Clone, Copy)]
struct Scope<'a> {
    default: &'a str,
    parent: Option<&'a str>,
}

impl<'a> Scope<'a> {
    /// Scope of a table joined onto this one
    fn joined(self, join: &'a Join) -> Self {
        Scope {
            default: join.scope_name(),
            parent: Some(self.default),
        }
    }
}

/// Joins referenced by `condition` outside of sub-selects, first use first
fn collect_joins<'c>(
    condition: &'c Condition,
    scope: Scope<'c>,
    out: &mut Vec<(&'c Join, Scope<'c>)>,
) {
    match condition {
        Condition::And(children) | Condition::Or(children) => {
            for child in children {
                collect_joins(child, scope, out);
            }
        }
        Condition::Not(inner) => collect_joins(inner, scope, out),
        Condition::Joined { join, condition } => {
            let join: &Join = join;
            let seen = out
                .iter()
                .any(|(other, outer)| *other == join && outer.default == scope.default);
            if !seen {
                out.push((join, scope));
            }
            collect_joins(condition, scope.joined(join), out);
        }
        _ => {}
    }
}

/// Translate an escaped LIKE pattern into the equivalent GLOB pattern
fn like_to_glob(pattern: &str) -> String {
    fn literal(glob: &mut String, c: char) {
        if matches!(c, '*' | '?' | '[') {
            glob.push('[');
            glob.push(c);
            glob.push(']');
        } else {
            glob.push(c);
        }
    }

    let mut glob = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    literal(&mut glob, escaped);
                }
            }
            '%' => glob.push('*'),
            '_' => glob.push('?'),
            other => literal(&mut glob, other),
        }
    }
    glob
}

struct Renderer {
    backend: DatabaseBackend,
    param_offset: usize,
    sql: String,
    values: Vec<Value>,
}

impl Renderer {
    fn ident(&mut self, name: &str) {
        let quote = match self.backend {
            DatabaseBackend::MySql => '`',
            _ => '"',
        };
        self.sql.push(quote);
        for c in name.chars() {
            if c == quote {
                self.sql.push(quote);
            }
            self.sql.push(c);
        }
        self.sql.push(quote);
    }

    fn bind(&mut self, value: Value) {
        self.values.push(value);
        match self.backend {
            DatabaseBackend::Postgres => {
                let index = self.param_offset + self.values.len();
                self.sql.push('$');
                self.sql.push_str(&index.to_string());
            }
            _ => self.sql.push('?'),
        }
    }

    fn expression(&mut self, expr: &Expression, scope: Scope<'_>) -> Result<(), RenderError> {
        match expr {
            Expression::Column(column) => {
                let table = match &column.namespace {
                    Namespace::Default => scope.default,
                    Namespace::Parent => scope.parent.ok_or(RenderError::UnresolvedNamespace {
                        namespace: "parent",
                    })?,
                    Namespace::Table(table) => table.as_str(),
                };
                self.ident(table);
                self.sql.push('.');
                self.ident(&column.name);
            }
            Expression::Value(value) => match value.clone().into_sql_value() {
                Some(bound) => self.bind(bound),
                None => self.sql.push_str("NULL"),
            },
            Expression::Concat(parts) => {
                let (open, separator, close) = match self.backend {
                    DatabaseBackend::MySql => ("CONCAT(", ", ", ")"),
                    _ => ("(", " || ", ")"),
                };
                self.sql.push_str(open);
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(separator);
                    }
                    self.expression(part, scope)?;
                }
                self.sql.push_str(close);
            }
            Expression::Lower(inner) => {
                self.sql.push_str("LOWER(");
                self.expression(inner, scope)?;
                self.sql.push(')');
            }
        }
        Ok(())
    }

    /// Atoms render with `negated` folded into the operator, so `NOT` never
    /// needs parentheses around a single predicate.
    fn atom(
        &mut self,
        condition: &Condition,
        negated: bool,
        scope: Scope<'_>,
    ) -> Result<(), RenderError> {
        let not = if negated { "NOT " } else { "" };
        match condition {
            Condition::Constant(value) => {
                self.sql
                    .push_str(if *value != negated { "1 = 1" } else { "1 = 0" });
            }
            Condition::Compare {
                left, sign, right, ..
            } => {
                let sign = if negated { sign.invert() } else { *sign };
                self.expression(left, scope)?;
                self.sql.push(' ');
                self.sql.push_str(sign.as_sql());
                self.sql.push(' ');
                self.expression(right, scope)?;
            }
            Condition::IsNull(expr) => {
                self.expression(expr, scope)?;
                self.sql.push_str(" IS ");
                self.sql.push_str(not);
                self.sql.push_str("NULL");
            }
            Condition::In { expr, values } => {
                self.expression(expr, scope)?;
                self.sql.push(' ');
                self.sql.push_str(not);
                self.sql.push_str("IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(", ");
                    }
                    self.expression(value, scope)?;
                }
                self.sql.push(')');
            }
            Condition::Like {
                expr,
                pattern,
                case_sensitive,
            } => {
                self.expression(expr, scope)?;
                self.sql.push(' ');
                self.sql.push_str(not);
                match (self.backend, pattern) {
                    (
                        DatabaseBackend::Sqlite,
                        Expression::Value(NormalizedValue::String(like)),
                    ) if *case_sensitive => {
                        self.sql.push_str("GLOB ");
                        self.bind(Value::from(like_to_glob(like)));
                    }
                    _ => {
                        self.sql.push_str("LIKE ");
                        self.expression(pattern, scope)?;
                        if self.backend == DatabaseBackend::Sqlite {
                            self.sql.push_str(" ESCAPE '\\'");
                        }
                    }
                }
            }
            Condition::Joined { join, condition } => {
                self.atom(condition, negated, scope.joined(join))?;
            }
            Condition::Exists(select) => {
                self.sql.push_str(not);
                self.sql.push_str("EXISTS (");
                self.sub_select(select, scope)?;
                self.sql.push(')');
            }
            Condition::And(_) | Condition::Or(_) | Condition::Not(_) => {
                self.condition(condition, scope)?;
            }
        }
        Ok(())
    }

    fn condition(&mut self, condition: &Condition, scope: Scope<'_>) -> Result<(), RenderError> {
        match condition {
            Condition::And(children) => self.junction(children, " AND ", scope),
            Condition::Or(children) => self.junction(children, " OR ", scope),
            Condition::Not(inner) if inner.is_atom() => self.atom(inner, true, scope),
            Condition::Not(inner) => {
                self.sql.push_str("NOT ");
                self.grouped(inner, scope)
            }
            atom => self.atom(atom, false, scope),
        }
    }

    fn junction(
        &mut self,
        children: &[Condition],
        separator: &str,
        scope: Scope<'_>,
    ) -> Result<(), RenderError> {
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(separator);
            }
            if child.is_junction() {
                self.grouped(child, scope)?;
            } else {
                self.condition(child, scope)?;
            }
        }
        Ok(())
    }

    fn grouped(&mut self, condition: &Condition, scope: Scope<'_>) -> Result<(), RenderError> {
        self.sql.push('(');
        self.condition(condition, scope)?;
        self.sql.push(')');
        Ok(())
    }

    fn sub_select(&mut self, select: &SubSelect, outer: Scope<'_>) -> Result<(), RenderError> {
        let inner = Scope {
            default: select.scope_name(),
            parent: Some(outer.default),
        };

        self.sql.push_str("SELECT 1 FROM ");
        self.table(&select.table, select.alias.as_deref());
        for join in &select.joins {
            self.join(join, inner)?;
        }
        self.hoist_joins(&select.condition, inner)?;
        if select.condition.as_constant() != Some(true) {
            self.sql.push_str(" WHERE ");
            self.condition(&select.condition, inner)?;
        }
        Ok(())
    }

    fn hoist_joins(&mut self, condition: &Condition, scope: Scope<'_>) -> Result<(), RenderError> {
        let mut joins = Vec::new();
        collect_joins(condition, scope, &mut joins);
        for (join, outer) in joins {
            self.join(join, outer.joined(join))?;
        }
        Ok(())
    }

    fn join(&mut self, join: &Join, scope: Scope<'_>) -> Result<(), RenderError> {
        self.sql.push(' ');
        self.sql.push_str(join.kind.as_sql());
        self.sql.push(' ');
        self.table(&join.table, join.alias.as_deref());
        self.sql.push_str(" ON ");
        self.condition(&join.on, scope)
    }

    fn table(&mut self, table: &str, alias: Option<&str>) {
        self.ident(table);
        if let Some(alias) = alias {
            self.sql.push_str(" AS ");
            self.ident(alias);
        }
    }
}
