use serde::Deserialize;
use serde_json::Value;
use utoipa::{IntoParams, ToSchema};

use crate::errors::FilterError;

/// Query parameters carrying a filter.
///
/// The `filter` parameter is a JSON-encoded filter tree, for example:
///
/// - **Equality:** `{"firstName": "John"}`
/// - **Any of several values:** `{"id": ["550e8400-e29b-41d4-a716-446655440000", "550e8400-e29b-41d4-a716-446655440001"]}`
/// - **Comparisons:** `{"age": {"$gte": 18}}`
/// - **Combinators:** `{"$or": [{"age": {"$lt": 18}}, {"active": false}]}`
/// - **Relations:** `{"emails": {"sentAt": {"$neq": null}}}`
#[derive(Debug, Clone, Deserialize, IntoParams, ToSchema, Default)]
#[into_params(parameter_in = Query)]
pub struct FilterQuery {
    /// JSON-encoded filter. Omit to match everything.
    #[param(example = json!({
        "age": { "$gte": 18 },
        "emails": { "sentAt": { "$neq": null } }
    }))]
    pub filter: Option<String>,
}

impl FilterQuery {
    /// Decode the `filter` parameter. A missing or blank parameter is `null`,
    /// which compiles to "no filter".
    ///
    /// # Errors
    ///
    /// `MalformedFilterShape` when the parameter is not valid JSON.
    pub fn parse(&self) -> Result<Value, FilterError> {
        match self.filter.as_deref().map(str::trim) {
            None | Some("") => Ok(Value::Null),
            Some(raw) => serde_json::from_str(raw)
                .map_err(|err| FilterError::malformed(format!("filter is not valid JSON: {err}"))),
        }
    }
}
