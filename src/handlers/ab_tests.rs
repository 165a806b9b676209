//! # A/B Test Handlers
//!
//! Test management and results for admins, plus variant assignment and
//! conversion tracking for any visitor (signed in or identified by the
//! `X-Session-Id` header).

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::types::{AbTestResponse, DataResponse};
use crate::auth::{AuthUser, MaybeUser, require_role};
use crate::error::{ApiError, FieldErrors, not_found};
use crate::models::ab_test::{self, TestStatus, Variant};
use crate::models::user::{self, Role};
use crate::repositories::AbTestRepository;
use crate::repositories::ab_test::NewAbTest;
use crate::server::AppState;
use crate::services::ab_testing::{VariantResult, validate_variants};
use crate::tenancy::{CurrentTenant, TenantHeader};

pub const SESSION_HEADER: &str = "x-session-id";

const MAX_TEST_NAME_LEN: usize = 100;
const MAX_SESSION_ID_LEN: usize = 128;

/// Who variant assignment is keyed on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    /// Session id to hand back to the client, when it is not signed in
    pub session_id: Option<String>,
}

/// The signed-in user's id, else a well-formed `X-Session-Id`, else a fresh
/// session id.
pub fn resolve_subject(user: Option<&user::Model>, headers: &HeaderMap) -> Subject {
    let session = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| {
            !value.is_empty()
                && value.len() <= MAX_SESSION_ID_LEN
                && value
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        .map(str::to_string);

    match (user, session) {
        (Some(user), session) => Subject {
            id: user.id.to_string(),
            session_id: session,
        },
        (None, Some(session)) => Subject {
            id: format!("session:{session}"),
            session_id: Some(session),
        },
        (None, None) => {
            let session = Uuid::new_v4().simple().to_string();
            Subject {
                id: format!("session:{session}"),
                session_id: Some(session),
            }
        }
    }
}

/// Echoes the session id so clients can keep their assignment.
pub fn with_session_header(mut response: Response, session_id: Option<&str>) -> Response {
    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAbTestRequest {
    #[schema(example = "homepage_hero_individual")]
    pub name: String,
    pub description: Option<String>,
    pub variants: Vec<Variant>,
    /// Defaults to `draft`
    pub status: Option<TestStatus>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: TestStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConversionRequest {
    #[schema(example = "signup")]
    pub goal: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignmentResponse {
    pub test: String,
    pub variant: String,
    pub running: bool,
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConversionResponse {
    /// False when the test is not running
    pub recorded: bool,
    pub variant: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AbTestResultsResponse {
    pub test: AbTestResponse,
    pub results: Vec<VariantResult>,
}

async fn find_test(state: &AppState, tenant_id: Uuid, test_id: Uuid) -> Result<ab_test::Model, ApiError> {
    AbTestRepository::new(&state.db)
        .find(tenant_id, test_id)
        .await?
        .ok_or_else(|| not_found("A/B test"))
}

async fn find_test_by_name(
    state: &AppState,
    tenant_id: Uuid,
    name: &str,
) -> Result<ab_test::Model, ApiError> {
    AbTestRepository::new(&state.db)
        .find_by_name(tenant_id, name)
        .await?
        .ok_or_else(|| not_found("A/B test"))
}

/// Creates an A/B test (admins)
#[utoipa::path(
    post,
    path = "/api/v1/ab-tests",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateAbTestRequest,
    responses(
        (status = 201, description = "Test created", body = DataResponse<AbTestResponse>),
        (status = 403, description = "Not an admin", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "ab_tests"
)]
pub async fn create_test(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    body: Result<Json<CreateAbTestRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<AbTestResponse>>), ApiError> {
    require_role(&auth.user, &[Role::Admin])?;
    let Json(request) = body?;

    let mut errors = FieldErrors::new();
    let name = request.name.trim();
    if name.is_empty()
        || name.len() > MAX_TEST_NAME_LEN
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        errors.add(
            "name",
            "The name may only contain lowercase letters, digits, dashes and underscores.",
        );
    }
    validate_variants(&request.variants, &mut errors);
    errors.finish()?;

    let variants = request
        .variants
        .into_iter()
        .map(|variant| Variant {
            name: variant.name.trim().to_string(),
            weight: variant.weight,
        })
        .collect();

    let test = AbTestRepository::new(&state.db)
        .create(NewAbTest {
            tenant_id: tenant.id,
            name: name.to_string(),
            description: request.description,
            variants,
            status: request.status.unwrap_or(TestStatus::Draft),
        })
        .await?;

    tracing::info!(test = %test.name, status = %test.status, "A/B test created");

    Ok((StatusCode::CREATED, Json(DataResponse::new(test.into()))))
}

#[utoipa::path(
    get,
    path = "/api/v1/ab-tests",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "All tests of the tenant", body = DataResponse<Vec<AbTestResponse>>),
        (status = 403, description = "Not an admin", body = ApiError)
    ),
    tag = "ab_tests"
)]
pub async fn list_tests(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
) -> Result<Json<DataResponse<Vec<AbTestResponse>>>, ApiError> {
    require_role(&auth.user, &[Role::Admin])?;
    let tests = AbTestRepository::new(&state.db).list(tenant.id).await?;
    Ok(Json(DataResponse::new(
        tests.into_iter().map(AbTestResponse::from).collect(),
    )))
}

/// Starts or stops a test (admins)
#[utoipa::path(
    put,
    path = "/api/v1/ab-tests/{id}/status",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Test ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = DataResponse<AbTestResponse>),
        (status = 403, description = "Not an admin", body = ApiError),
        (status = 404, description = "Test not found", body = ApiError)
    ),
    tag = "ab_tests"
)]
pub async fn update_status(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(test_id): Path<Uuid>,
    body: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<DataResponse<AbTestResponse>>, ApiError> {
    require_role(&auth.user, &[Role::Admin])?;
    let Json(request) = body?;

    let test = find_test(&state, tenant.id, test_id).await?;
    let test = AbTestRepository::new(&state.db)
        .set_status(test, request.status)
        .await?;
    state.ab_testing.forget_test(test.id).await;

    tracing::info!(test = %test.name, status = %test.status, "A/B test status changed");

    Ok(Json(DataResponse::new(test.into())))
}

/// Exposures, conversions and conversion rate per variant (admins)
#[utoipa::path(
    get,
    path = "/api/v1/ab-tests/{id}/results",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Test ID")),
    responses(
        (status = 200, description = "Per-variant results", body = DataResponse<AbTestResultsResponse>),
        (status = 403, description = "Not an admin", body = ApiError),
        (status = 404, description = "Test not found", body = ApiError)
    ),
    tag = "ab_tests"
)]
pub async fn test_results(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(test_id): Path<Uuid>,
) -> Result<Json<DataResponse<AbTestResultsResponse>>, ApiError> {
    require_role(&auth.user, &[Role::Admin])?;

    let test = find_test(&state, tenant.id, test_id).await?;
    let results = state.ab_testing.results(&test).await?;

    Ok(Json(DataResponse::new(AbTestResultsResponse {
        test: test.into(),
        results,
    })))
}

/// The caller's variant of a test; records an exposure on first assignment
#[utoipa::path(
    get,
    path = "/api/v1/experiments/{name}/assignment",
    params(
        TenantHeader,
        ("name" = String, Path, description = "Test name"),
        ("X-Session-Id" = Option<String>, Header, description = "Visitor session id")
    ),
    responses(
        (status = 200, description = "Assigned variant", body = DataResponse<AssignmentResponse>),
        (status = 404, description = "Test not found", body = ApiError)
    ),
    tag = "ab_tests"
)]
pub async fn assignment(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    MaybeUser(user): MaybeUser,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let test = find_test_by_name(&state, tenant.id, &name).await?;
    let subject = resolve_subject(user.as_ref(), &headers);

    let variant = state.ab_testing.variant_for(&test, &subject.id).await;

    let body = Json(DataResponse::new(AssignmentResponse {
        running: test.is_running(),
        test: test.name,
        variant,
        session_id: subject.session_id.clone(),
    }));

    Ok(with_session_header(
        body.into_response(),
        subject.session_id.as_deref(),
    ))
}

/// Records a conversion for the caller's variant
///
/// Tracking is best-effort; a storage failure still answers 200.
#[utoipa::path(
    post,
    path = "/api/v1/experiments/{name}/conversions",
    params(
        TenantHeader,
        ("name" = String, Path, description = "Test name"),
        ("X-Session-Id" = Option<String>, Header, description = "Visitor session id")
    ),
    request_body = ConversionRequest,
    responses(
        (status = 200, description = "Conversion handled", body = DataResponse<ConversionResponse>),
        (status = 404, description = "Test not found", body = ApiError)
    ),
    tag = "ab_tests"
)]
pub async fn convert(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    MaybeUser(user): MaybeUser,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ConversionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let test = find_test_by_name(&state, tenant.id, &name).await?;
    let subject = resolve_subject(user.as_ref(), &headers);

    let variant = state
        .ab_testing
        .convert(&test, &subject.id, request.goal)
        .await;

    let body = Json(DataResponse::new(ConversionResponse {
        recorded: variant.is_some(),
        variant,
    }));

    Ok(with_session_header(
        body.into_response(),
        subject.session_id.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn signed_in_users_are_keyed_by_id() {
        let now = crate::models::timestamp_now();
        let user = user::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.edu".to_string(),
            password_hash: String::new(),
            role: "alumni".to_string(),
            skills: json!([]),
            created_at: now,
            updated_at: now,
        };

        let subject = resolve_subject(Some(&user), &HeaderMap::new());
        assert_eq!(subject.id, user.id.to_string());
        assert_eq!(subject.session_id, None);
    }

    #[test]
    fn session_header_identifies_guests() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("abc-123"));

        let subject = resolve_subject(None, &headers);
        assert_eq!(subject.id, "session:abc-123");
        assert_eq!(subject.session_id.as_deref(), Some("abc-123"));
    }

    #[test]
    fn guests_without_a_session_get_a_fresh_one() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("bad session!"));

        let first = resolve_subject(None, &headers);
        let second = resolve_subject(None, &headers);
        assert!(first.session_id.is_some());
        assert_ne!(first.id, second.id);
    }
}
