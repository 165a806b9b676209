//! # Homepage Handlers

use axum::{
    extract::{Query, State, rejection::JsonRejection},
    http::HeaderMap,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ab_tests::{resolve_subject, with_session_header};
use super::types::DataResponse;
use crate::auth::MaybeUser;
use crate::error::{ApiError, FieldErrors};
use crate::server::AppState;
use crate::services::personalization::{Audience, HomepageContent};
use crate::tenancy::{CurrentTenant, TenantHeader};

pub const AUDIENCE_HEADER: &str = "x-audience";

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct HomepageQuery {
    /// `individual` or `institutional`; overrides the `X-Audience` header
    pub audience: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CtaClickRequest {
    pub audience: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CtaClickResponse {
    pub recorded: bool,
    pub variant: Option<String>,
}

/// Query parameter first, then the header, else the default audience.
pub fn resolve_audience(explicit: Option<&str>, headers: &HeaderMap) -> Result<Audience, ApiError> {
    let raw = explicit
        .map(str::to_string)
        .or_else(|| {
            headers
                .get(AUDIENCE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        })
        .filter(|value| !value.trim().is_empty());

    match raw {
        None => Ok(Audience::default()),
        Some(raw) => raw.parse().map_err(|_| {
            let mut errors = FieldErrors::new();
            errors.add("audience", "The audience must be individual or institutional.");
            errors.into_error()
        }),
    }
}

/// Audience-specific homepage content
#[utoipa::path(
    get,
    path = "/api/v1/homepage",
    params(
        TenantHeader,
        HomepageQuery,
        ("X-Audience" = Option<String>, Header, description = "Audience when no query parameter is given"),
        ("X-Session-Id" = Option<String>, Header, description = "Visitor session id")
    ),
    responses(
        (status = 200, description = "Homepage content", body = DataResponse<HomepageContent>),
        (status = 422, description = "Unknown audience", body = ApiError)
    ),
    tag = "homepage"
)]
pub async fn homepage(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    MaybeUser(user): MaybeUser,
    Query(query): Query<HomepageQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let audience = resolve_audience(query.audience.as_deref(), &headers)?;
    let subject = resolve_subject(user.as_ref(), &headers);

    let content = state
        .personalization
        .homepage(tenant.id, audience, &subject.id, subject.session_id.clone())
        .await;

    Ok(with_session_header(
        Json(DataResponse::new(content)).into_response(),
        subject.session_id.as_deref(),
    ))
}

/// Records a click on the hero call to action
#[utoipa::path(
    post,
    path = "/api/v1/homepage/cta-click",
    params(
        TenantHeader,
        ("X-Audience" = Option<String>, Header, description = "Audience when the body names none"),
        ("X-Session-Id" = Option<String>, Header, description = "Visitor session id")
    ),
    request_body = CtaClickRequest,
    responses(
        (status = 200, description = "Click handled", body = DataResponse<CtaClickResponse>),
        (status = 422, description = "Unknown audience", body = ApiError)
    ),
    tag = "homepage"
)]
pub async fn cta_click(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    MaybeUser(user): MaybeUser,
    headers: HeaderMap,
    body: Result<Json<CtaClickRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let audience = resolve_audience(request.audience.as_deref(), &headers)?;
    let subject = resolve_subject(user.as_ref(), &headers);

    let variant = state
        .personalization
        .track_cta_click(tenant.id, audience, &subject.id)
        .await;

    Ok(with_session_header(
        Json(DataResponse::new(CtaClickResponse {
            recorded: variant.is_some(),
            variant,
        }))
        .into_response(),
        subject.session_id.as_deref(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn query_parameter_wins_over_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUDIENCE_HEADER, HeaderValue::from_static("individual"));

        let audience = resolve_audience(Some("institutional"), &headers).unwrap();
        assert_eq!(audience, Audience::Institutional);
    }

    #[test]
    fn header_is_used_without_query() {
        let mut headers = HeaderMap::new();
        headers.insert(AUDIENCE_HEADER, HeaderValue::from_static("Institutional"));

        assert_eq!(
            resolve_audience(None, &headers).unwrap(),
            Audience::Institutional
        );
        assert_eq!(
            resolve_audience(None, &HeaderMap::new()).unwrap(),
            Audience::Individual
        );
    }

    #[test]
    fn unknown_audience_is_rejected() {
        let err = resolve_audience(Some("donors"), &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }
}
