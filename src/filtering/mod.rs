//! # Filtering
//!
//! Turns a caller-supplied JSON filter into a [`Condition`](crate::sql::Condition).
//! The caller chooses *what* to match; the [`FilterDefinitions`] table chooses
//! *which* columns and relations may be matched on and how.
//!
//! ## Filter syntax
//!
//! ```rust,ignore
//! // Equality, bare arrays are `$in`
//! { "firstName": "John" }
//! { "id": ["550e8400-e29b-41d4-a716-446655440000", "..."] }
//!
//! // Comparisons
//! { "age": { "$gte": 18, "$lt": 65 } }
//! { "createdAt": { "$lt": { "$": "$now" } } }
//!
//! // Substring match, case-insensitive for string columns
//! { "lastName": { "$contains": "van" } }
//!
//! // Combinators
//! { "$or": [{ "age": { "$lt": 18 } }, { "guardian": { "$neq": null } }] }
//! { "$not": { "active": true } }
//!
//! // Relations, joined relations, namespaces and wildcard keys
//! { "emails": { "sentAt": null } }
//! { "organization": { "name": "Org A" } }
//! { "settings.dog.name": "Rex" }
//! { "customFields": { "shirtSize": "L" } }
//! ```

pub mod column;
pub mod compiler;
pub mod definitions;
pub mod operator;
pub mod relation;
pub mod value;

pub use column::{
    ColumnDescriptor, ColumnFilter, WildcardColumnFilter, create_column_filter,
    create_wildcard_column_filter, escape_like_wildcards,
};
pub use compiler::{CompileContext, compile, compile_filter, compile_with};
pub use definitions::{FilterCompiler, FilterDefinitions, FilterDefinitionsBuilder, NamespaceFilter};
pub use operator::Operator;
pub use relation::{
    JoinedRelationFilter, RelationFilter, create_joined_relation_filter, create_relation_filter,
};
pub use value::{NormalizedValue, SqlValueType, normalize};
