use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Default cap on `$in` list length
pub const DEFAULT_MAX_IN_VALUES: usize = 1000;
/// Default nesting limit for combinators, relations and namespaces
pub const DEFAULT_MAX_DEPTH: usize = 32;
/// Default cap on string operand length, in characters
pub const DEFAULT_MAX_STRING_LENGTH: usize = 10_000;

/// Limits and clock used while compiling untrusted filters.
///
/// Deserializable so it can live in the application's config file; missing
/// fields fall back to the defaults.
///
/// ```rust,ignore
/// let options: CompilerOptions = serde_json::from_str(r#"{ "max_in_values": 200 }"#)?;
/// let condition = compile_with(&MEMBER_FILTERS, &filter, &options)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    pub max_in_values: usize,
    pub max_depth: usize,
    pub max_string_length: usize,
    /// Fixed value for `{ "$": "$now" }`. Read from the system clock once
    /// per compilation when unset.
    pub now: Option<DateTime<Utc>>,
    /// Permissions held by the caller, checked against
    /// [`ColumnDescriptor::requires_permission`](crate::ColumnDescriptor::requires_permission)
    pub permissions: BTreeSet<String>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_in_values: DEFAULT_MAX_IN_VALUES,
            max_depth: DEFAULT_MAX_DEPTH,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            now: None,
            permissions: BTreeSet::new(),
        }
    }
}

impl CompilerOptions {
    #[must_use]
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    #[must_use]
    pub fn grant(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}
