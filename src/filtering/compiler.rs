//! # Filter Tree Compiler
//!
//! Walks an untrusted filter and resolves every key against a
//! [`FilterDefinitions`] table:
//!
//! - `null` matches everything; an array is an implicit `$and`.
//! - `$and` / `$or` take arrays, `$not` takes a single filter. `$and: []` is
//!   `true` and `$or: []` is `false`.
//! - Any other key must be in the table. `a.b.c` falls back to `{ a: { "b.c": .. } }`
//!   when `a.b.c` itself is not defined.
//! - Sibling keys are ANDed in input order.
//!
//! Unknown keys are always rejected. Ignoring one would return rows the
//! caller believes are filtered out.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::definitions::FilterDefinitions;
use super::operator::Operator;
use super::value::NormalizeOptions;
use crate::config::CompilerOptions;
use crate::errors::FilterError;
use crate::sql::Condition;

/// Per-compilation state: limits, clock and the key path being compiled
#[derive(Debug)]
pub struct CompileContext<'a> {
    options: &'a CompilerOptions,
    now: DateTime<Utc>,
    path: Vec<String>,
    depth: usize,
}

impl<'a> CompileContext<'a> {
    #[must_use]
    pub fn new(options: &'a CompilerOptions) -> Self {
        Self {
            options,
            now: options.now.unwrap_or_else(Utc::now),
            path: Vec::new(),
            depth: 0,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &CompilerOptions {
        self.options
    }

    /// Dotted path of the key currently being compiled, e.g. `emails.sentAt`
    #[must_use]
    pub fn path(&self) -> String {
        self.path.join(".")
    }

    /// Path of `key` below the current path
    #[must_use]
    pub fn field_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.path())
        }
    }

    #[must_use]
    pub const fn normalize_options(&self, fold_case: bool) -> NormalizeOptions {
        NormalizeOptions {
            fold_case,
            max_string_length: self.options.max_string_length,
            now: self.now,
        }
    }

    /// `InvalidFilterValue` for the current path
    pub fn invalid_value(&self, message: impl ToString) -> FilterError {
        FilterError::invalid_value(self.path(), message)
    }

    /// Run `f` one level deeper, optionally under a key path segment.
    ///
    /// # Errors
    ///
    /// Fails with `LimitExceeded` past `max_depth`, otherwise returns `f`'s result.
    pub fn descend<T>(
        &mut self,
        segment: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<T, FilterError>,
    ) -> Result<T, FilterError> {
        if self.depth >= self.options.max_depth {
            return Err(FilterError::limit(format!(
                "filters may be nested at most {} levels deep",
                self.options.max_depth
            )));
        }

        self.depth += 1;
        if let Some(segment) = segment {
            self.path.push(segment.to_string());
        }
        let result = f(self);
        if segment.is_some() {
            self.path.pop();
        }
        self.depth -= 1;
        result
    }
}

/// Compile `filter` against `definitions` with default limits.
///
/// # Errors
///
/// Any [`FilterError`]; nothing is compiled partially.
pub fn compile(definitions: &FilterDefinitions, filter: &Value) -> Result<Condition, FilterError> {
    compile_with(definitions, filter, &CompilerOptions::default())
}

/// Compile `filter` against `definitions`.
///
/// # Errors
///
/// Any [`FilterError`]; nothing is compiled partially.
pub fn compile_with(
    definitions: &FilterDefinitions,
    filter: &Value,
    options: &CompilerOptions,
) -> Result<Condition, FilterError> {
    let entity = definitions.entity();
    let mut ctx = CompileContext::new(options);

    match compile_filter(definitions, filter, &mut ctx) {
        Ok(condition) => {
            tracing::debug!(
                entity,
                parameters = condition.parameter_count(),
                "Compiled filter"
            );
            Ok(condition)
        }
        Err(err) => {
            tracing::debug!(entity, code = err.code(), error = %err, "Filter rejected");
            Err(err)
        }
    }
}

/// Compile a filter node in an existing context. Used by relation and
/// namespace compilers to recurse into their nested tables.
///
/// # Errors
///
/// See [`compile`].
pub fn compile_filter(
    definitions: &FilterDefinitions,
    filter: &Value,
    ctx: &mut CompileContext<'_>,
) -> Result<Condition, FilterError> {
    match filter {
        Value::Null => Ok(Condition::always()),
        Value::Array(items) => ctx.descend(None, |ctx| {
            let children = items
                .iter()
                .map(|item| compile_filter(definitions, item, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Condition::and(children))
        }),
        Value::Object(map) => compile_object(definitions, map, ctx),
        other => Err(FilterError::malformed(format!(
            "expected an object or array, found {}",
            json_kind(other)
        ))),
    }
}

fn compile_object(
    definitions: &FilterDefinitions,
    map: &Map<String, Value>,
    ctx: &mut CompileContext<'_>,
) -> Result<Condition, FilterError> {
    let mut conditions = Vec::with_capacity(map.len());
    for (key, value) in map {
        let condition = if Operator::is_operator_key(key) {
            compile_logical(definitions, key.parse()?, value, ctx)?
        } else {
            compile_key(definitions, key, value, ctx)?
        };
        conditions.push(condition);
    }
    Ok(Condition::and(conditions))
}

fn compile_logical(
    definitions: &FilterDefinitions,
    operator: Operator,
    value: &Value,
    ctx: &mut CompileContext<'_>,
) -> Result<Condition, FilterError> {
    match operator {
        Operator::And | Operator::Or => {
            let items = value.as_array().ok_or_else(|| {
                FilterError::malformed(format!(
                    "{operator} expects an array, found {}",
                    json_kind(value)
                ))
            })?;
            ctx.descend(None, |ctx| {
                let children = items
                    .iter()
                    .map(|item| compile_filter(definitions, item, ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(if operator == Operator::And {
                    Condition::and(children)
                } else {
                    Condition::or(children)
                })
            })
        }
        Operator::Not => ctx
            .descend(None, |ctx| compile_filter(definitions, value, ctx))
            .map(Condition::not),
        // Field operators need a field
        _ => Err(FilterError::unknown_operator(operator.as_str())),
    }
}

fn compile_key(
    definitions: &FilterDefinitions,
    key: &str,
    value: &Value,
    ctx: &mut CompileContext<'_>,
) -> Result<Condition, FilterError> {
    if let Some(compiler) = definitions.get(key) {
        return ctx.descend(Some(key), |ctx| compiler.compile(value, ctx));
    }

    if let Some((head, rest)) = key.split_once('.')
        && let Some(compiler) = definitions.get(head)
        && compiler.nested().is_some()
    {
        let mut operand = Map::with_capacity(1);
        operand.insert(rest.to_string(), value.clone());
        let operand = Value::Object(operand);
        return ctx.descend(Some(head), |ctx| compiler.compile(&operand, ctx));
    }

    Err(FilterError::unknown_field(ctx.field_path(key)))
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
