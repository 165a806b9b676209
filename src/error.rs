//! # Error Handling
//!
//! Unified problem+json error responses for the alumni API, with trace ID
//! propagation and mappings from repository and database errors.

use std::collections::BTreeMap;

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::telemetry;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the request context (falls back to a generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

pub(crate) fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            // Well-formed JSON that does not fit the request type is a field error.
            JsonRejection::JsonDataError(err) => {
                let (field, message) = json_data_field_error(&err.body_text());
                return field_error(&field, &message);
            }
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", &message)
    }
}

/// Splits a deserialization failure into the top-level field it concerns and
/// a message for that field.
///
/// The text has the form `<prefix>: [<path>: ]<serde message> at line L column C`.
fn json_data_field_error(body_text: &str) -> (String, String) {
    const FALLBACK_FIELD: &str = "body";

    let detail = body_text
        .split_once(": ")
        .map_or(body_text, |(_, detail)| detail);
    let detail = detail
        .rfind(" at line ")
        .map_or(detail, |position| &detail[..position]);

    if let Some(rest) = detail.strip_prefix("missing field `") {
        let field = rest.split('`').next().unwrap_or(FALLBACK_FIELD);
        return (field.to_string(), format!("The {field} field is required."));
    }

    let (field, reason) = match detail.split_once(": ") {
        Some((path, reason)) if !path.is_empty() && !path.contains(' ') => {
            let field = path
                .split(['.', '['])
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or(FALLBACK_FIELD);
            (field, reason)
        }
        _ => (FALLBACK_FIELD, detail),
    };

    let message = if reason.starts_with("unknown variant") {
        format!("The selected {field} is invalid.")
    } else if reason.starts_with("invalid type") {
        format!("The {field} field has an invalid type.")
    } else {
        reason.to_string()
    };

    (field.to_string(), message)
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Errors returned by repositories and domain services.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },
    #[error("conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    pub fn database_error(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            return Self::Conflict("resource already exists".to_string());
        }
        Self::Database(error)
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(db_err) => db_err.into(),
            RepositoryError::NotFound(what) => not_found(&what),
            RepositoryError::Validation { field, message } => {
                let mut errors = FieldErrors::new();
                errors.add(&field, message);
                errors.into_error()
            }
            RepositoryError::Conflict(message) => {
                ApiError::new(StatusCode::CONFLICT, "CONFLICT", &message)
            }
        }
    }
}

/// Accumulates per-field validation messages and renders them as a 422
/// `VALIDATION_FAILED` error with `{field: [messages]}` details.
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was recorded, otherwise the 422 error.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }

    pub fn into_error(self) -> ApiError {
        let details = serde_json::to_value(&self.errors).unwrap_or_default();
        validation_error("The given data was invalid", details)
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a forbidden error (403)
pub fn forbidden(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Insufficient permissions");
    ApiError::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
}

/// Create a not found error (404) for the named resource
pub fn not_found(what: &str) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("{} not found", what),
    )
}

/// Create a validation error with field details (422)
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(
        StatusCode::UNPROCESSABLE_ENTITY,
        "VALIDATION_FAILED",
        message,
    )
    .with_details(field_errors)
}

/// Single-field validation error shortcut
pub fn field_error(field: &str, message: &str) -> ApiError {
    let mut errors = FieldErrors::new();
    errors.add(field, message);
    errors.into_error()
}

/// No tenant could be derived from the request (400)
pub fn tenant_required() -> ApiError {
    ApiError::new(
        StatusCode::BAD_REQUEST,
        "TENANT_REQUIRED",
        "Tenant could not be determined from the request",
    )
}

/// The request named a tenant that does not exist (404)
pub fn tenant_not_found(identifier: &str) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "TENANT_NOT_FOUND",
        &format!("Tenant '{}' not found", identifier),
    )
}

/// The client IP is currently blocked (403)
pub fn ip_blocked(retry_after_seconds: u64) -> ApiError {
    ApiError::new(
        StatusCode::FORBIDDEN,
        "IP_BLOCKED",
        "Too many failed login attempts from this address",
    )
    .with_retry_after(retry_after_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn new_error_carries_code_and_message_only() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "INVALID_CURSOR", "Cursor is malformed");

        assert_eq!(error.code, Box::from("INVALID_CURSOR"));
        assert_eq!(error.message, Box::from("Cursor is malformed"));
        assert!(error.details.is_none());
        assert!(error.retry_after.is_none());
    }

    #[test]
    fn details_are_serialized_alongside_the_code() {
        let error = not_found("Experiment").with_details(json!({ "name": "homepage-hero" }));
        let body = serde_json::to_value(&error).unwrap();

        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["details"]["name"], "homepage-hero");
        assert!(body.get("status").is_none());
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let api_error: ApiError = anyhow::anyhow!("argon2 worker panicked").into();

        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_error.message.contains("argon2"));
    }

    #[test]
    fn blocked_ip_response_sets_problem_json_and_retry_after() {
        let response = ip_blocked(1800).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers().get("retry-after").unwrap(), "1800");
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn errors_outside_a_request_get_a_correlation_id() {
        let trace_id = forbidden(None).trace_id.unwrap();

        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13);
    }

    #[test]
    fn database_errors_map_to_not_found_and_unavailable() {
        let api_error: ApiError = sea_orm::DbErr::RecordNotFound("post".to_string()).into();
        assert_eq!(api_error.status, StatusCode::NOT_FOUND);

        let api_error: ApiError =
            sea_orm::DbErr::Conn(sea_orm::RuntimeErr::Internal("gone".to_string())).into();
        assert_eq!(api_error.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn field_errors_group_messages_by_field() {
        let mut errors = FieldErrors::new();
        errors.add("content", "The content field is required.");
        errors.add("content", "The content may not exceed 5000 characters.");
        errors.add("visibility", "Unknown visibility.");

        let error = errors.finish().unwrap_err();
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));

        let details = error.details.unwrap();
        assert_eq!(details["content"].as_array().unwrap().len(), 2);
        assert_eq!(details["visibility"][0], "Unknown visibility.");
    }

    #[test]
    fn data_errors_name_the_failing_field() {
        let prefix = "Failed to deserialize the JSON body into the target type";

        let (field, message) = json_data_field_error(&format!(
            "{prefix}: missing field `password` at line 1 column 27"
        ));
        assert_eq!(field, "password");
        assert_eq!(message, "The password field is required.");

        let (field, message) = json_data_field_error(&format!(
            "{prefix}: visibility: unknown variant `friends`, expected one of `public`, `circle`, `private` at line 1 column 40"
        ));
        assert_eq!(field, "visibility");
        assert_eq!(message, "The selected visibility is invalid.");

        let (field, message) = json_data_field_error(&format!(
            "{prefix}: skills[0]: invalid type: integer `3`, expected a string at line 1 column 13"
        ));
        assert_eq!(field, "skills");
        assert_eq!(message, "The skills field has an invalid type.");

        let (field, _) = json_data_field_error(&format!(
            "{prefix}: invalid type: sequence, expected struct LoginRequest at line 1 column 0"
        ));
        assert_eq!(field, "body");
    }

    #[test]
    fn retry_after_is_omitted_unless_set() {
        let body = serde_json::to_value(not_found("Post")).unwrap();
        assert!(body.get("retry_after").is_none());

        let body = serde_json::to_value(ip_blocked(60)).unwrap();
        assert_eq!(body["retry_after"], 60);
    }

    #[test]
    fn empty_field_errors_pass() {
        assert!(FieldErrors::new().finish().is_ok());
    }

    #[test]
    fn repository_errors_map_to_http_statuses() {
        let error: ApiError = RepositoryError::not_found("Circle").into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, Box::from("Circle not found"));

        let error: ApiError = RepositoryError::validation_error("variants", "too few").into();
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.details.unwrap()["variants"][0], "too few");

        let error: ApiError = RepositoryError::Conflict("duplicate slug".to_string()).into();
        assert_eq!(error.status, StatusCode::CONFLICT);
    }

    #[test]
    fn tenant_errors() {
        assert_eq!(tenant_required().status, StatusCode::BAD_REQUEST);
        assert_eq!(tenant_required().code, Box::from("TENANT_REQUIRED"));

        let error = tenant_not_found("acme");
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.code, Box::from("TENANT_NOT_FOUND"));
        assert!(error.message.contains("acme"));
    }

    #[test]
    fn auth_error_helpers() {
        assert_eq!(unauthorized(None).status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            unauthorized(Some("Invalid credentials")).message,
            Box::from("Invalid credentials")
        );
        assert_eq!(forbidden(None).code, Box::from("FORBIDDEN"));
    }
}
