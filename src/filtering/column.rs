//! # Column Filters
//!
//! A [`ColumnFilter`] handles every operator on a single column:
//!
//! ```text
//! { "age": 18 }                          age = 18
//! { "age": [18, 19, null] }              age IS NULL OR age IN (18, 19)
//! { "age": { "$gt": 18, "$lte": 65 } }   age > 18 AND age <= 65
//! { "age": { "$not": { "$gt": 18 } } }   age <= 18
//! { "name": { "$contains": "50%" } }     LOWER(name) LIKE '%50\%%'
//! ```
//!
//! String columns compare case-insensitively: the operand is lower-cased and
//! the column is wrapped in `LOWER(..)`, so matching does not depend on the
//! column's collation. [`ColumnDescriptor::case_sensitive`] turns this off.
//!
//! ## NULL handling
//!
//! NULL sorts below every value. On nullable columns this is made explicit so
//! that negating an ordering operator keeps that meaning:
//!
//! | Operator  | Value      | NULL value         |
//! |-----------|------------|--------------------|
//! | `$eq`     | `= v`      | `IS NULL`          |
//! | `$neq`    | `NOT (= v)`| `IS NOT NULL`      |
//! | `$lt`     | `IS NULL OR < v`       | never  |
//! | `$lte`    | `IS NULL OR <= v`      | `IS NULL` |
//! | `$gt`     | `IS NOT NULL AND > v`  | `IS NOT NULL` |
//! | `$gte`    | `IS NOT NULL AND >= v` | always |
//!
//! `$neq v` never matches rows where the column is NULL.

use serde_json::Value;
use std::{fmt, sync::Arc};

use super::compiler::CompileContext;
use super::definitions::FilterCompiler;
use super::operator::Operator;
use super::value::{NormalizedValue, SqlValueType, is_magic_value, normalize};
use crate::errors::FilterError;
use crate::sql::{ColumnRef, Condition, Expression, Sign};

/// What a filter key compares against
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescriptor {
    pub expression: Expression,
    pub value_type: SqlValueType,
    pub nullable: bool,
    /// Unless set, string operands and the column are both lower-cased
    pub case_sensitive: bool,
    /// Permission the caller must hold to filter on this column
    pub permission: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(expression: impl Into<Expression>, value_type: SqlValueType) -> Self {
        Self {
            expression: expression.into(),
            value_type,
            nullable: false,
            case_sensitive: false,
            permission: None,
        }
    }

    /// Column of the table being filtered
    pub fn column(name: impl Into<String>, value_type: SqlValueType) -> Self {
        Self::new(ColumnRef::new(name), value_type)
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    #[must_use]
    pub const fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }

    #[must_use]
    pub fn requires_permission(mut self, permission: impl Into<String>) -> Self {
        self.permission = Some(permission.into());
        self
    }

    const fn folds_case(&self) -> bool {
        matches!(self.value_type, SqlValueType::String) && !self.case_sensitive
    }
}

/// Compiler bound to one column
#[derive(Debug, Clone)]
pub struct ColumnFilter {
    descriptor: ColumnDescriptor,
}

#[must_use]
pub const fn create_column_filter(descriptor: ColumnDescriptor) -> ColumnFilter {
    ColumnFilter { descriptor }
}

impl FilterCompiler for ColumnFilter {
    fn compile(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        if let Some(permission) = &self.descriptor.permission
            && !ctx.options().has_permission(permission)
        {
            return Err(FilterError::permission_denied(ctx.path(), permission.as_str()));
        }
        self.compile_operand(operand, ctx)
    }
}

impl ColumnFilter {
    fn compile_operand(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        match operand {
            Value::Array(items) => self.compile_in(items, ctx),
            Value::Object(map) if !is_magic_value(operand) => {
                let mut conditions = Vec::with_capacity(map.len());
                for (key, value) in map {
                    if !Operator::is_operator_key(key) {
                        return Err(FilterError::unknown_operator(key.as_str()));
                    }
                    conditions.push(self.compile_operator(key.parse()?, value, ctx)?);
                }
                Ok(Condition::and(conditions))
            }
            _ => self.compile_operator(Operator::Eq, operand, ctx),
        }
    }

    fn compile_operator(
        &self,
        operator: Operator,
        value: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        match operator {
            Operator::And | Operator::Or => {
                let items = value.as_array().ok_or_else(|| {
                    FilterError::malformed(format!("{operator} expects an array"))
                })?;
                ctx.descend(None, |ctx| {
                    let children = items
                        .iter()
                        .map(|item| self.compile_operand(item, ctx))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(if operator == Operator::And {
                        Condition::and(children)
                    } else {
                        Condition::or(children)
                    })
                })
            }
            Operator::Not => ctx
                .descend(None, |ctx| self.compile_operand(value, ctx))
                .map(Condition::not),
            Operator::Eq => Ok(self.equals(self.normalize(value, ctx)?)),
            Operator::Neq => Ok(self.equals(self.normalize(value, ctx)?).not()),
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
                if !self.descriptor.value_type.is_ordered() {
                    return Err(FilterError::unsupported(
                        operator.as_str(),
                        self.descriptor.value_type,
                    ));
                }
                let value = self.normalize(value, ctx)?;
                Ok(self.ordering(operator, value))
            }
            Operator::In => {
                let items = value
                    .as_array()
                    .ok_or_else(|| FilterError::malformed("$in expects an array"))?;
                self.compile_in(items, ctx)
            }
            Operator::Contains => self.contains(value, ctx),
            Operator::ElemMatch => Err(FilterError::unknown_operator(operator.as_str())),
        }
    }

    fn normalize(
        &self,
        raw: &Value,
        ctx: &CompileContext<'_>,
    ) -> Result<NormalizedValue, FilterError> {
        normalize(
            raw,
            self.descriptor.value_type,
            &ctx.normalize_options(self.descriptor.folds_case()),
        )
        .map_err(|err| ctx.invalid_value(err))
    }

    fn expression(&self) -> Expression {
        let expression = self.descriptor.expression.clone();
        if self.descriptor.folds_case() {
            expression.lower()
        } else {
            expression
        }
    }

    fn compare(&self, sign: Sign, value: NormalizedValue) -> Condition {
        Condition::Compare {
            left: self.expression(),
            sign,
            right: value.into(),
            nullable: self.descriptor.nullable,
        }
    }

    fn equals(&self, value: NormalizedValue) -> Condition {
        if value.is_null() {
            Condition::is_null(self.expression())
        } else {
            self.compare(Sign::Eq, value)
        }
    }

    fn ordering(&self, operator: Operator, value: NormalizedValue) -> Condition {
        let is_null = || Condition::is_null(self.expression());

        if value.is_null() {
            return match operator {
                Operator::Lt => Condition::never(),
                Operator::Lte => is_null(),
                Operator::Gt => is_null().not(),
                _ => Condition::always(),
            };
        }

        let (sign, below) = match operator {
            Operator::Lt => (Sign::Lt, true),
            Operator::Lte => (Sign::Le, true),
            Operator::Gt => (Sign::Gt, false),
            _ => (Sign::Ge, false),
        };
        let comparison = self.compare(sign, value);

        match (self.descriptor.nullable, below) {
            (false, _) => comparison,
            (true, true) => Condition::or([is_null(), comparison]),
            (true, false) => Condition::and([is_null().not(), comparison]),
        }
    }

    fn compile_in(
        &self,
        items: &[Value],
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        let max = ctx.options().max_in_values;
        if items.len() > max {
            return Err(FilterError::limit(format!(
                "$in accepts at most {max} values, got {}",
                items.len()
            )));
        }

        let mut includes_null = false;
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match self.normalize(item, ctx)? {
                NormalizedValue::Null => includes_null = true,
                value => values.push(value),
            }
        }

        let listed = match values.len() {
            0 => Condition::never(),
            1 => self.compare(Sign::Eq, values.remove(0)),
            _ => Condition::In {
                expr: self.expression(),
                values: values.into_iter().map(Expression::from).collect(),
            },
        };

        Ok(if includes_null {
            Condition::or([Condition::is_null(self.expression()), listed])
        } else {
            listed
        })
    }

    fn contains(&self, value: &Value, ctx: &CompileContext<'_>) -> Result<Condition, FilterError> {
        if self.descriptor.value_type != SqlValueType::String {
            return Err(FilterError::unsupported(
                Operator::Contains.as_str(),
                self.descriptor.value_type,
            ));
        }
        let NormalizedValue::String(needle) = self.normalize(value, ctx)? else {
            return Err(ctx.invalid_value("$contains expects a string"));
        };

        Ok(Condition::Like {
            expr: self.expression(),
            pattern: NormalizedValue::String(format!("%{}%", escape_like_wildcards(&needle)))
                .into(),
            case_sensitive: self.descriptor.case_sensitive,
        })
    }
}

type ColumnResolver = dyn Fn(&str) -> Option<ColumnDescriptor> + Send + Sync;

/// Column filters for keys that are only known at request time, such as
/// custom fields: `{ "customFields": { "<key>": <operand> } }`
#[derive(Clone)]
pub struct WildcardColumnFilter {
    resolve: Arc<ColumnResolver>,
}

/// Build a compiler that maps each key of its operand to a column. `resolve`
/// sees the raw, untrusted key and returns `None` for keys it does not accept.
pub fn create_wildcard_column_filter(
    resolve: impl Fn(&str) -> Option<ColumnDescriptor> + Send + Sync + 'static,
) -> WildcardColumnFilter {
    WildcardColumnFilter {
        resolve: Arc::new(resolve),
    }
}

impl fmt::Debug for WildcardColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WildcardColumnFilter").finish_non_exhaustive()
    }
}

impl FilterCompiler for WildcardColumnFilter {
    fn compile(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        let Value::Object(map) = operand else {
            return Err(FilterError::malformed(format!(
                "`{}` expects an object of keys",
                ctx.path()
            )));
        };

        let mut conditions = Vec::with_capacity(map.len());
        for (key, value) in map {
            if Operator::is_operator_key(key) {
                return Err(FilterError::unknown_operator(key.as_str()));
            }
            let descriptor = (self.resolve)(key.as_str())
                .ok_or_else(|| FilterError::unknown_field(ctx.field_path(key)))?;
            let column = create_column_filter(descriptor);
            conditions.push(ctx.descend(Some(key.as_str()), |ctx| column.compile(value, ctx))?);
        }
        Ok(Condition::and(conditions))
    }
}

/// Escape LIKE wildcards so user input matches literally
#[must_use]
pub fn escape_like_wildcards(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
