//! # Error Handling for Filter Compilation
//!
//! Three error domains are kept apart:
//!
//! - [`FilterError`]: the caller sent a filter we refuse to compile. Always a
//!   rejected request, never retried, never fatal to the process.
//! - [`DefinitionError`]: a developer built an invalid definitions table. Raised
//!   once at startup.
//! - [`RenderError`]: an expression was rendered without the namespace aliases
//!   it refers to.
//!
//! ## Usage
//!
//! `FilterError` converts into an axum response, so handlers can use `?` directly:
//!
//! ```rust,ignore
//! use filtercrate::{FilterError, FilterQuery, compile};
//!
//! async fn list_members(Query(query): Query<FilterQuery>) -> Result<Json<Vec<Member>>, FilterError> {
//!     let filter = query.parse()?;
//!     let condition = compile(&MEMBER_FILTERS, &filter)?;
//!     // render and execute...
//! }
//! ```
//!
//! Every rejection becomes `400 Bad Request` (`403 Forbidden` for a field the
//! caller has no permission to filter on) with a body such as
//!
//! ```json
//! { "error": "unknown filter field `nmae`", "code": "unknown_filter_field" }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::filtering::value::SqlValueType;

/// Why an untrusted filter was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    /// A filter key has no entry in the active definitions table
    #[error("unknown filter field `{field}`")]
    UnknownFilterField { field: String },

    /// An operator key is not part of the recognized set at this position
    #[error("unknown operator `{operator}`")]
    UnknownOperator { operator: String },

    /// A recognized operator that makes no sense for the column type,
    /// e.g. `$contains` on an integer
    #[error("operator `{operator}` is not supported for {value_type} fields")]
    UnsupportedOperator {
        operator: String,
        value_type: SqlValueType,
    },

    #[error("invalid value for `{field}`: {message}")]
    InvalidFilterValue { field: String, message: String },

    /// The tree itself has the wrong shape, e.g. `$and` given an object
    #[error("malformed filter: {message}")]
    MalformedFilterShape { message: String },

    #[error("filter too large: {message}")]
    LimitExceeded { message: String },

    /// The field exists but requires a permission that was not granted
    #[error("no permission to filter on `{field}`")]
    PermissionDenied { field: String, permission: String },
}

impl FilterError {
    // ============================================================================
    // Constructors
    // ============================================================================

    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownFilterField {
            field: field.into(),
        }
    }

    pub fn unknown_operator(operator: impl Into<String>) -> Self {
        Self::UnknownOperator {
            operator: operator.into(),
        }
    }

    pub fn unsupported(operator: impl Into<String>, value_type: SqlValueType) -> Self {
        Self::UnsupportedOperator {
            operator: operator.into(),
            value_type,
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidFilterValue {
            field: field.into(),
            message: message.to_string(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFilterShape {
            message: message.into(),
        }
    }

    pub fn limit(message: impl Into<String>) -> Self {
        Self::LimitExceeded {
            message: message.into(),
        }
    }

    pub fn permission_denied(field: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::PermissionDenied {
            field: field.into(),
            permission: permission.into(),
        }
    }

    // ============================================================================
    // Accessors
    // ============================================================================

    /// Stable machine-readable kind, sent as `code` in error responses
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::UnknownFilterField { .. } => "unknown_filter_field",
            Self::UnknownOperator { .. } => "unknown_operator",
            Self::UnsupportedOperator { .. } => "unsupported_operator",
            Self::InvalidFilterValue { .. } => "invalid_filter_value",
            Self::MalformedFilterShape { .. } => "malformed_filter_shape",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::PermissionDenied { .. } => "permission_denied",
        }
    }

    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

/// Error body sent to clients
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl IntoResponse for FilterError {
    fn into_response(self) -> Response {
        tracing::debug!(
            code = self.code(),
            error = %self,
            "Rejected filter"
        );

        let response = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        (self.status_code(), Json(response)).into_response()
    }
}

/// A definitions table that cannot be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DefinitionError {
    #[error("filter key `{key}` is defined twice in `{entity}`")]
    DuplicateKey { entity: String, key: String },

    /// Keys starting with `$` would shadow operators
    #[error("filter key `{key}` in `{entity}` is reserved")]
    ReservedKey { entity: String, key: String },

    /// `path` lists the entities from the outermost table down to the repeat
    #[error("cyclic filter definitions: {}", path.join(" -> "))]
    CyclicRelation { path: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error("no alias available for the {namespace} namespace")]
    UnresolvedNamespace { namespace: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    // ============================================================================
    // Messages
    // ============================================================================

    #[test]
    fn test_messages_name_the_offending_part() {
        assert_eq!(
            FilterError::unknown_field("emails.sentAtt").to_string(),
            "unknown filter field `emails.sentAtt`"
        );
        assert_eq!(
            FilterError::unsupported("$contains", SqlValueType::Integer).to_string(),
            "operator `$contains` is not supported for integer fields"
        );
        assert_eq!(
            FilterError::invalid_value("createdAt", "`soon` is not a valid date").to_string(),
            "invalid value for `createdAt`: `soon` is not a valid date"
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            FilterError::unknown_field("a"),
            FilterError::unknown_operator("$x"),
            FilterError::unsupported("$lt", SqlValueType::Boolean),
            FilterError::invalid_value("a", "b"),
            FilterError::malformed("c"),
            FilterError::limit("d"),
            FilterError::permission_denied("e", "f"),
        ];
        let mut codes: Vec<_> = errors.iter().map(FilterError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_cycle_message() {
        let err = DefinitionError::CyclicRelation {
            path: vec!["members".into(), "groups".into(), "members".into()],
        };
        assert_eq!(
            err.to_string(),
            "cyclic filter definitions: members -> groups -> members"
        );
    }

    // ============================================================================
    // HTTP responses
    // ============================================================================

    #[tokio::test]
    async fn test_into_response_is_bad_request_with_code() {
        let response = FilterError::unknown_operator("$regex").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "unknown_operator");
        assert_eq!(json["error"], "unknown operator `$regex`");
    }

    #[tokio::test]
    async fn test_permission_denied_is_forbidden() {
        let response = FilterError::permission_denied("salary", "finance").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "permission_denied");
        assert_eq!(json["error"], "no permission to filter on `salary`");
    }
}
