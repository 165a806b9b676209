//! # Timeline Handler

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::types::{PaginatedResponse, TimelineEntryResponse};
use crate::auth::AuthUser;
use crate::error::{ApiError, FieldErrors};
use crate::server::AppState;
use crate::services::timeline::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::tenancy::{CurrentTenant, TenantHeader};

#[derive(Debug, Deserialize, IntoParams)]
pub struct TimelineQuery {
    /// Page size (default: 20, max: 50)
    pub limit: Option<i64>,
    /// Opaque cursor from the previous page's `next_cursor`
    pub cursor: Option<String>,
}

/// The current user's ranked timeline
#[utoipa::path(
    get,
    path = "/api/v1/timeline",
    security(("bearer_auth" = [])),
    params(TenantHeader, TimelineQuery),
    responses(
        (status = 200, description = "One page of the timeline", body = PaginatedResponse<TimelineEntryResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 422, description = "Invalid limit or cursor", body = ApiError)
    ),
    tag = "timeline"
)]
pub async fn get_timeline(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Query(query): Query<TimelineQuery>,
) -> Result<Json<PaginatedResponse<TimelineEntryResponse>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE as i64);
    if !(1..=MAX_PAGE_SIZE as i64).contains(&limit) {
        let mut errors = FieldErrors::new();
        errors.add(
            "limit",
            format!("The limit must be between 1 and {MAX_PAGE_SIZE}."),
        );
        return Err(errors.into_error());
    }

    let page = state
        .timeline
        .page(
            tenant.id,
            auth.user.id,
            query.cursor.as_deref(),
            limit as u64,
        )
        .await?;

    let entries = page
        .entries
        .into_iter()
        .map(|entry| TimelineEntryResponse {
            score: entry.score,
            post: entry.post.into(),
        })
        .collect();

    Ok(Json(PaginatedResponse::new(entries, page.next_cursor)))
}
