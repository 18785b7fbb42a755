//! # Filter Definitions
//!
//! A [`FilterDefinitions`] table is the complete list of keys a caller may
//! filter an entity on. Nothing is discovered by reflection: every column,
//! relation and namespace is added explicitly through the builder, and the
//! table is immutable once built.
//!
//! ```rust,ignore
//! static EMAIL_FILTERS: LazyLock<FilterDefinitions> = LazyLock::new(|| {
//!     FilterDefinitions::builder("email_recipients")
//!         .column("sentAt", ColumnDescriptor::column("sentAt", SqlValueType::Datetime).nullable())
//!         .build()
//!         .expect("valid email filters")
//! });
//!
//! static MEMBER_FILTERS: LazyLock<FilterDefinitions> = LazyLock::new(|| {
//!     FilterDefinitions::builder("members")
//!         .extend(&BASE_FILTERS)
//!         .column("firstName", ColumnDescriptor::column("firstName", SqlValueType::String))
//!         .relation(
//!             "emails",
//!             SubSelect::from_table("email_recipients")
//!                 .and_where(Condition::eq(ColumnRef::new("objectId"), ColumnRef::parent("id"))),
//!             EMAIL_FILTERS.clone(),
//!         )
//!         .build()
//!         .expect("valid member filters")
//! });
//! ```

use serde_json::Value;
use std::{collections::BTreeMap, fmt, sync::Arc};

use super::column::{ColumnDescriptor, create_column_filter, create_wildcard_column_filter};
use super::compiler::{CompileContext, compile_filter};
use super::operator::Operator;
use super::relation::{create_joined_relation_filter, create_relation_filter};
use crate::errors::{DefinitionError, FilterError};
use crate::sql::{Condition, Join, SubSelect};

/// Compiles the operand found under one filter key
pub trait FilterCompiler: Send + Sync + fmt::Debug {
    /// Compile `operand` into a condition.
    ///
    /// # Errors
    ///
    /// Any [`FilterError`] aborts the whole compilation.
    fn compile(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError>;

    /// Table of keys reachable below this one, for relations and namespaces
    fn nested(&self) -> Option<&FilterDefinitions> {
        None
    }
}

/// Immutable mapping from filter key to compiler for one entity
#[derive(Debug, Clone)]
pub struct FilterDefinitions {
    entity: String,
    entries: BTreeMap<String, Arc<dyn FilterCompiler>>,
}

impl FilterDefinitions {
    pub fn builder(entity: impl Into<String>) -> FilterDefinitionsBuilder {
        FilterDefinitionsBuilder {
            entity: entity.into(),
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&dyn FilterCompiler> {
        self.entries.get(key).map(|compiler| &**compiler)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rejects tables that reach an entity again through their own nested tables
    fn check_cycles(&self, ancestors: &mut Vec<String>) -> Result<(), DefinitionError> {
        if ancestors.contains(&self.entity) {
            let mut path = ancestors.clone();
            path.push(self.entity.clone());
            return Err(DefinitionError::CyclicRelation { path });
        }

        ancestors.push(self.entity.clone());
        for compiler in self.entries.values() {
            if let Some(nested) = compiler.nested() {
                nested.check_cycles(ancestors)?;
            }
        }
        ancestors.pop();
        Ok(())
    }
}

/// Collects entries for a [`FilterDefinitions`] table
#[derive(Debug)]
pub struct FilterDefinitionsBuilder {
    entity: String,
    entries: Vec<(String, Arc<dyn FilterCompiler>)>,
}

impl FilterDefinitionsBuilder {
    /// Filter on a column of this entity
    #[must_use]
    pub fn column(self, key: impl Into<String>, descriptor: ColumnDescriptor) -> Self {
        self.entry(key, create_column_filter(descriptor))
    }

    /// Filter on rows of another table correlated through `template`
    #[must_use]
    pub fn relation(
        self,
        key: impl Into<String>,
        template: SubSelect,
        definitions: FilterDefinitions,
    ) -> Self {
        self.entry(key, create_relation_filter(template, definitions))
    }

    /// Filter on a one-to-one relation joined onto this entity
    #[must_use]
    pub fn joined(self, key: impl Into<String>, join: Join, definitions: FilterDefinitions) -> Self {
        self.entry(key, create_joined_relation_filter(join, definitions))
    }

    /// Filter on columns picked at request time by the keys below `key`
    #[must_use]
    pub fn wildcard(
        self,
        key: impl Into<String>,
        resolve: impl Fn(&str) -> Option<ColumnDescriptor> + Send + Sync + 'static,
    ) -> Self {
        self.entry(key, create_wildcard_column_filter(resolve))
    }

    /// Group keys under a prefix, on the same row
    #[must_use]
    pub fn namespace(self, key: impl Into<String>, definitions: FilterDefinitions) -> Self {
        self.entry(key, NamespaceFilter { definitions })
    }

    /// Add a hand-written compiler
    #[must_use]
    pub fn entry(mut self, key: impl Into<String>, compiler: impl FilterCompiler + 'static) -> Self {
        self.entries.push((key.into(), Arc::new(compiler)));
        self
    }

    /// Copy every entry of a shared base table into this one
    #[must_use]
    pub fn extend(mut self, base: &FilterDefinitions) -> Self {
        self.entries.extend(
            base.entries
                .iter()
                .map(|(key, compiler)| (key.clone(), Arc::clone(compiler))),
        );
        self
    }

    /// # Errors
    ///
    /// Fails when a key is defined twice, starts with `$`, or when the nested
    /// tables lead back to an entity that is already being filtered.
    pub fn build(self) -> Result<FilterDefinitions, DefinitionError> {
        let result = self.try_build();
        if let Err(err) = &result {
            tracing::warn!(error = %err, "Rejected filter definitions");
        }
        result
    }

    fn try_build(self) -> Result<FilterDefinitions, DefinitionError> {
        let mut entries = BTreeMap::new();
        for (key, compiler) in self.entries {
            if Operator::is_operator_key(&key) || key.is_empty() {
                return Err(DefinitionError::ReservedKey {
                    entity: self.entity,
                    key,
                });
            }
            if entries.contains_key(&key) {
                return Err(DefinitionError::DuplicateKey {
                    entity: self.entity,
                    key,
                });
            }
            entries.insert(key, compiler);
        }

        let definitions = FilterDefinitions {
            entity: self.entity,
            entries,
        };
        definitions.check_cycles(&mut Vec::new())?;
        Ok(definitions)
    }
}

/// Nested table of keys on the same row, e.g. `settings.dog.name`
#[derive(Debug, Clone)]
pub struct NamespaceFilter {
    definitions: FilterDefinitions,
}

impl FilterCompiler for NamespaceFilter {
    fn compile(
        &self,
        operand: &Value,
        ctx: &mut CompileContext<'_>,
    ) -> Result<Condition, FilterError> {
        compile_filter(&self.definitions, operand, ctx)
    }

    fn nested(&self) -> Option<&FilterDefinitions> {
        Some(&self.definitions)
    }
}
