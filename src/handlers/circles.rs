//! # Circle Handlers

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use super::types::{CircleResponse, DataResponse};
use crate::auth::AuthUser;
use crate::error::{ApiError, FieldErrors, not_found};
use crate::models::circle::CircleKind;
use crate::repositories::CircleRepository;
use crate::repositories::circle::CreateCircleRequest;
use crate::server::AppState;
use crate::services::webhooks::EVENT_CIRCLE_JOINED;
use crate::tenancy::{CurrentTenant, TenantHeader};

const MAX_NAME_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 1000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCircleBody {
    #[schema(example = "Class of 2015")]
    pub name: String,
    /// Defaults to `circle`
    pub kind: Option<CircleKind>,
    pub description: Option<String>,
}

/// Creates a circle owned by the current user
#[utoipa::path(
    post,
    path = "/api/v1/circles",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateCircleBody,
    responses(
        (status = 201, description = "Circle created", body = DataResponse<CircleResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "circles"
)]
pub async fn create_circle(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    body: Result<Json<CreateCircleBody>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<CircleResponse>>), ApiError> {
    let Json(request) = body?;

    let mut errors = FieldErrors::new();
    let name_len = request.name.trim().chars().count();
    if name_len == 0 || name_len > MAX_NAME_CHARS {
        errors.add(
            "name",
            format!("The name must be between 1 and {MAX_NAME_CHARS} characters."),
        );
    }
    if request
        .description
        .as_ref()
        .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_CHARS)
    {
        errors.add(
            "description",
            format!("The description may not be greater than {MAX_DESCRIPTION_CHARS} characters."),
        );
    }
    errors.finish()?;

    let circle = CircleRepository::new(&state.db)
        .create(CreateCircleRequest {
            tenant_id: tenant.id,
            owner_id: auth.user.id,
            name: request.name,
            kind: request.kind.unwrap_or(CircleKind::Circle),
            description: request.description,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse::new(circle.into()))))
}

/// Circles the current user belongs to
#[utoipa::path(
    get,
    path = "/api/v1/circles",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "The user's circles", body = DataResponse<Vec<CircleResponse>>),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "circles"
)]
pub async fn list_my_circles(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
) -> Result<Json<DataResponse<Vec<CircleResponse>>>, ApiError> {
    let circles = CircleRepository::new(&state.db)
        .list_for_user(tenant.id, auth.user.id)
        .await?;

    Ok(Json(DataResponse::new(
        circles.into_iter().map(CircleResponse::from).collect(),
    )))
}

/// Joins a circle; joining twice is harmless
#[utoipa::path(
    post,
    path = "/api/v1/circles/{id}/join",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Circle ID")),
    responses(
        (status = 200, description = "Member of the circle", body = DataResponse<CircleResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Circle not found", body = ApiError)
    ),
    tag = "circles"
)]
pub async fn join_circle(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(circle_id): Path<Uuid>,
) -> Result<Json<DataResponse<CircleResponse>>, ApiError> {
    let circles = CircleRepository::new(&state.db);
    let circle = circles
        .find(tenant.id, circle_id)
        .await?
        .ok_or_else(|| not_found("Circle"))?;

    let already_member = circles.is_member(circle.id, auth.user.id).await?;
    circles.join(&circle, auth.user.id).await?;

    if !already_member {
        state.timeline.invalidate_tenant(tenant.id);
        state.webhooks.dispatch(
            tenant,
            EVENT_CIRCLE_JOINED,
            json!({ "circle_id": circle.id, "user_id": auth.user.id }),
        );
    }

    Ok(Json(DataResponse::new(circle.into())))
}

/// Leaves a circle; owners cannot leave their own circle
#[utoipa::path(
    post,
    path = "/api/v1/circles/{id}/leave",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Circle ID")),
    responses(
        (status = 204, description = "Left the circle"),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Circle or membership not found", body = ApiError),
        (status = 422, description = "The owner cannot leave", body = ApiError)
    ),
    tag = "circles"
)]
pub async fn leave_circle(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(circle_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let circles = CircleRepository::new(&state.db);
    let circle = circles
        .find(tenant.id, circle_id)
        .await?
        .ok_or_else(|| not_found("Circle"))?;

    circles.leave(circle.id, auth.user.id).await?;
    state.timeline.invalidate_tenant(tenant.id);

    Ok(StatusCode::NO_CONTENT)
}
