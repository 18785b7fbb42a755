//! # Relation Filters
//!
//! A relation filter matches rows that have at least one related row matching
//! a nested filter. It compiles to `EXISTS (template AND nested)` where the
//! template correlates the related table to the parent row:
//!
//! ```text
//! { "emails": { "sentAt": { "$neq": null } } }
//!
//! EXISTS (
//!     SELECT 1 FROM email_recipients
//!     WHERE email_recipients.objectId = members.id
//!       AND email_recipients.sentAt IS NOT NULL
//! )
//! ```
//!
//! A joined relation is for one-to-one relations. Instead of a sub-select the
//! related table is joined onto the filtered query and the nested filter
//! applies to the joined row:
//!
//! ```text
//! { "organization": { "name": "Org A" } }
//!
//! ... LEFT JOIN organizations ON organizations.id = members.organizationId
//! WHERE LOWER(organizations.name) = 'org a'
//! ```
//!
//! The join is only added when the nested filter constrains something. When
//! it matches every row, the join is dropped unless it is an `INNER` join to a
//! relation that [may be missing](JoinedRelationFilter::may_be_missing).
//!
//! Both accept `{ "$elemMatch": F }` as an alias for `F`.

use serde_json::Value;

use super::compiler::{CompileContext, compile_filter};
use super::definitions::{FilterCompiler, FilterDefinitions};
use super::operator::Operator;
use crate::errors::FilterError;
use crate::sql::{Condition, Join, JoinKind, SubSelect};

#[derive(Debug, Clone)]
pub struct RelationFilter {
    template: SubSelect,
    definitions: FilterDefinitions,
}

/// Build a compiler for a relation. `template` must correlate to the parent
/// row through [`crate::sql::Namespace::Parent`]; `definitions` holds the keys
/// of the related table.
#[must_use]
pub const fn create_relation_filter(
    template: SubSelect,
    definitions: FilterDefinitions,
) -> RelationFilter {
    RelationFilter {
        template,
        definitions,
    }
}

impl FilterCompiler for RelationFilter {
    fn compile(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        let nested = compile_filter(&self.definitions, unwrap_elem_match(operand), ctx)?;
        if nested.as_constant() == Some(false) {
            return Ok(Condition::never());
        }
        Ok(Condition::exists(self.template.clone().and_where(nested)))
    }

    fn nested(&self) -> Option<&FilterDefinitions> {
        Some(&self.definitions)
    }
}

/// One-to-one relation joined onto the filtered table
#[derive(Debug, Clone)]
pub struct JoinedRelationFilter {
    join: Join,
    definitions: FilterDefinitions,
    always_exists: bool,
}

/// Build a compiler for a one-to-one relation. Inside `join.on` and the
/// nested `definitions`, the joined table is the default namespace and the
/// filtered table is [`crate::sql::Namespace::Parent`].
///
/// Joining a one-to-many relation duplicates result rows; use
/// [`create_relation_filter`] for those.
#[must_use]
pub const fn create_joined_relation_filter(
    join: Join,
    definitions: FilterDefinitions,
) -> JoinedRelationFilter {
    JoinedRelationFilter {
        join,
        definitions,
        always_exists: true,
    }
}

impl JoinedRelationFilter {
    /// Keep an `INNER` join even when the nested filter matches every row,
    /// since the join itself drops rows without a related row
    #[must_use]
    pub fn may_be_missing(mut self) -> Self {
        self.always_exists = false;
        self
    }
}

impl FilterCompiler for JoinedRelationFilter {
    fn compile(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        let nested = compile_filter(&self.definitions, unwrap_elem_match(operand), ctx)?;
        Ok(match nested.as_constant() {
            Some(false) => Condition::never(),
            Some(true) if self.always_exists || self.join.kind == JoinKind::Left => {
                Condition::always()
            }
            _ => Condition::joined(self.join.clone(), nested),
        })
    }

    fn nested(&self) -> Option<&FilterDefinitions> {
        Some(&self.definitions)
    }
}

fn unwrap_elem_match(operand: &Value) -> &Value {
    match operand.as_object() {
        Some(map) if map.len() == 1 => map
            .get(Operator::ElemMatch.as_str())
            .unwrap_or(operand),
        _ => operand,
    }
}
