//! # Federation Handlers
//!
//! Read-only ActivityPub and Matrix renditions of public users and posts.

use axum::{
    extract::{Path, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Json, Response},
};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ApiError, not_found};
use crate::models::{post, user};
use crate::repositories::{PostRepository, UserRepository};
use crate::server::AppState;
use crate::services::FederationBridge;
use crate::services::federation::activitypub::ACTIVITY_JSON;
use crate::tenancy::{CurrentTenant, TenantHeader};

const OUTBOX_LIMIT: u64 = 20;

fn activity_json(document: Value) -> Response {
    ([(CONTENT_TYPE, ACTIVITY_JSON)], Json(document)).into_response()
}

async fn find_user(state: &AppState, tenant_id: Uuid, user_id: Uuid) -> Result<user::Model, ApiError> {
    UserRepository::new(&state.db)
        .find(tenant_id, user_id)
        .await?
        .ok_or_else(|| not_found("User"))
}

/// A federatable post and its author; anything else is a 404.
async fn find_federatable(
    state: &AppState,
    tenant_id: Uuid,
    post_id: Uuid,
) -> Result<(post::Model, user::Model), ApiError> {
    let post = PostRepository::new(&state.db)
        .find(tenant_id, post_id)
        .await?
        .filter(FederationBridge::is_federatable)
        .ok_or_else(|| not_found("Post"))?;

    let author = find_user(state, tenant_id, post.author_id).await?;
    Ok((post, author))
}

/// ActivityPub `Person` actor for a user
#[utoipa::path(
    get,
    path = "/api/v1/federation/users/{id}",
    params(TenantHeader, ("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Person actor", content_type = "application/activity+json", body = Value),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "federation"
)]
pub async fn actor(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = find_user(&state, tenant.id, user_id).await?;
    Ok(activity_json(state.federation.activitypub().person(&tenant, &user)))
}

/// The user's most recent public posts as `Create` activities
#[utoipa::path(
    get,
    path = "/api/v1/federation/users/{id}/outbox",
    params(TenantHeader, ("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "OrderedCollection outbox", content_type = "application/activity+json", body = Value),
        (status = 404, description = "User not found", body = ApiError)
    ),
    tag = "federation"
)]
pub async fn outbox(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let user = find_user(&state, tenant.id, user_id).await?;
    let posts = PostRepository::new(&state.db)
        .public_by_author(tenant.id, user.id, OUTBOX_LIMIT)
        .await?;

    Ok(activity_json(
        state.federation.activitypub().outbox(&tenant, &user, &posts),
    ))
}

/// ActivityPub `Note` for a public post
#[utoipa::path(
    get,
    path = "/api/v1/federation/posts/{id}",
    params(TenantHeader, ("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Note object", content_type = "application/activity+json", body = Value),
        (status = 404, description = "Post not found or not public", body = ApiError)
    ),
    tag = "federation"
)]
pub async fn note(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(post_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (post, author) = find_federatable(&state, tenant.id, post_id).await?;
    Ok(activity_json(
        state.federation.activitypub().note(&tenant, &post, &author),
    ))
}

/// `Create` activity wrapping a public post
#[utoipa::path(
    get,
    path = "/api/v1/federation/posts/{id}/activity",
    params(TenantHeader, ("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Create activity", content_type = "application/activity+json", body = Value),
        (status = 404, description = "Post not found or not public", body = ApiError)
    ),
    tag = "federation"
)]
pub async fn create_activity(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(post_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let (post, author) = find_federatable(&state, tenant.id, post_id).await?;
    Ok(activity_json(
        state
            .federation
            .activitypub()
            .create_activity(&tenant, &post, &author),
    ))
}

/// Matrix `m.room.message` event for a public post
#[utoipa::path(
    get,
    path = "/api/v1/federation/posts/{id}/matrix",
    params(TenantHeader, ("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Matrix event", body = Value),
        (status = 404, description = "Post not found or not public", body = ApiError)
    ),
    tag = "federation"
)]
pub async fn matrix_event(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let (post, author) = find_federatable(&state, tenant.id, post_id).await?;
    Ok(Json(state.federation.matrix().message(&post, &author)))
}
