//! # Post Handlers
//!
//! Creating, reading, deleting and engaging with posts. Every write drops the
//! tenant's cached timeline pages; publishing also notifies webhooks.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::types::{DataResponse, PostResponse};
use crate::auth::AuthUser;
use crate::error::{ApiError, FieldErrors, forbidden, not_found};
use crate::models::post::{self, EngagementKind, PostStatus, Visibility};
use crate::models::user::{self, Role};
use crate::models::{tenant, timestamp_now};
use crate::repositories::post::NewPost;
use crate::repositories::{CircleRepository, PostRepository};
use crate::server::AppState;
use crate::services::webhooks::{EVENT_POST_PUBLISHED, post_published_data};
use crate::tenancy::{CurrentTenant, TenantHeader};

pub const MAX_CONTENT_CHARS: usize = 5000;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePostRequest {
    #[schema(example = "Reunion photos are up!")]
    pub content: String,
    /// Defaults to `public`
    pub visibility: Option<Visibility>,
    pub circle_id: Option<Uuid>,
    /// Future instant to publish at
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Keep as a draft; takes precedence over `scheduled_at`
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EngagementRequest {
    pub kind: EngagementKind,
}

/// Publishing side effects shared by the create handler.
fn announce_published(state: &AppState, tenant: &tenant::Model, post: &post::Model) {
    state.webhooks.dispatch(
        tenant.clone(),
        EVENT_POST_PUBLISHED,
        post_published_data(post),
    );
}

/// Whether `viewer` may see `post`: authors always, others only published
/// posts that are public or in a circle they belong to.
async fn can_view(
    state: &AppState,
    post: &post::Model,
    viewer: &user::Model,
) -> Result<bool, ApiError> {
    if post.author_id == viewer.id {
        return Ok(true);
    }
    if !post.is_published() {
        return Ok(false);
    }

    match post.visibility.parse::<Visibility>() {
        Ok(Visibility::Public) => Ok(true),
        Ok(Visibility::Circle) => match post.circle_id {
            Some(circle_id) => Ok(CircleRepository::new(&state.db)
                .is_member(circle_id, viewer.id)
                .await?),
            None => Ok(false),
        },
        Ok(Visibility::Private) | Err(_) => Ok(false),
    }
}

async fn find_visible(
    state: &AppState,
    tenant_id: Uuid,
    post_id: Uuid,
    viewer: &user::Model,
) -> Result<post::Model, ApiError> {
    let post = PostRepository::new(&state.db)
        .find(tenant_id, post_id)
        .await?
        .ok_or_else(|| not_found("Post"))?;

    if can_view(state, &post, viewer).await? {
        Ok(post)
    } else {
        Err(not_found("Post"))
    }
}

/// Creates a post: published now, scheduled for later, or kept as a draft
#[utoipa::path(
    post,
    path = "/api/v1/posts",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = DataResponse<PostResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not a member of the target circle", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "posts"
)]
pub async fn create_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    body: Result<Json<CreatePostRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<PostResponse>>), ApiError> {
    let Json(request) = body?;
    let visibility = request.visibility.unwrap_or(Visibility::Public);
    let now = timestamp_now();

    let mut errors = FieldErrors::new();
    let content = request.content.trim().to_string();
    let length = content.chars().count();
    if length == 0 {
        errors.add("content", "The content field is required.");
    } else if length > MAX_CONTENT_CHARS {
        errors.add(
            "content",
            format!("The content may not be greater than {MAX_CONTENT_CHARS} characters."),
        );
    }
    if visibility == Visibility::Circle && request.circle_id.is_none() {
        errors.add(
            "circle_id",
            "The circle_id field is required when visibility is circle.",
        );
    }
    if !request.draft
        && request
            .scheduled_at
            .is_some_and(|at| at.fixed_offset() <= now)
    {
        errors.add("scheduled_at", "The scheduled_at must be a date after now.");
    }
    errors.finish()?;

    if let Some(circle_id) = request.circle_id {
        let circles = CircleRepository::new(&state.db);
        circles
            .find(tenant.id, circle_id)
            .await?
            .ok_or_else(|| not_found("Circle"))?;
        if !circles.is_member(circle_id, auth.user.id).await? {
            return Err(forbidden(Some("You are not a member of this circle")));
        }
    }

    let (status, scheduled_at, published_at) = match (request.draft, request.scheduled_at) {
        (true, scheduled_at) => (PostStatus::Draft, scheduled_at.map(|at| at.fixed_offset()), None),
        (false, Some(at)) => (PostStatus::Scheduled, Some(at.fixed_offset()), None),
        (false, None) => (PostStatus::Published, None, Some(now)),
    };

    let post = PostRepository::new(&state.db)
        .create(NewPost {
            tenant_id: tenant.id,
            author_id: auth.user.id,
            circle_id: request.circle_id,
            content,
            visibility,
            status,
            scheduled_at,
            published_at,
        })
        .await?;

    state.timeline.invalidate_tenant(tenant.id);
    if post.is_published() {
        announce_published(&state, &tenant, &post);
    }

    tracing::info!(post_id = %post.id, status = %status, "Post created");

    Ok((StatusCode::CREATED, Json(DataResponse::new(post.into()))))
}

/// A single post visible to the current user
#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "The post", body = DataResponse<PostResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Post not found or not visible", body = ApiError)
    ),
    tag = "posts"
)]
pub async fn get_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<DataResponse<PostResponse>>, ApiError> {
    let post = find_visible(&state, tenant.id, post_id, &auth.user).await?;
    Ok(Json(DataResponse::new(post.into())))
}

/// Soft-deletes a post; only its author or an admin may do so
#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Neither author nor admin", body = ApiError),
        (status = 404, description = "Post not found", body = ApiError)
    ),
    tag = "posts"
)]
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let posts = PostRepository::new(&state.db);
    let post = posts
        .find(tenant.id, post_id)
        .await?
        .ok_or_else(|| not_found("Post"))?;

    if post.author_id != auth.user.id && auth.user.role() != Role::Admin {
        return Err(forbidden(Some("Only the author or an admin may delete this post")));
    }

    posts.soft_delete(post).await?;
    state.timeline.invalidate_tenant(tenant.id);

    tracing::info!(post_id = %post_id, deleted_by = %auth.user.id, "Post deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Records a like, comment or share
#[utoipa::path(
    post,
    path = "/api/v1/posts/{id}/engagements",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Post ID")),
    request_body = EngagementRequest,
    responses(
        (status = 200, description = "Updated post", body = DataResponse<PostResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 404, description = "Post not found or not visible", body = ApiError),
        (status = 422, description = "Post is not published", body = ApiError)
    ),
    tag = "posts"
)]
pub async fn engage(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(post_id): Path<Uuid>,
    body: Result<Json<EngagementRequest>, JsonRejection>,
) -> Result<Json<DataResponse<PostResponse>>, ApiError> {
    let Json(request) = body?;
    let post = find_visible(&state, tenant.id, post_id, &auth.user).await?;

    if !post.is_published() {
        let mut errors = FieldErrors::new();
        errors.add("post", "Only published posts can be engaged with.");
        return Err(errors.into_error());
    }

    let post = PostRepository::new(&state.db)
        .record_engagement(&post, request.kind)
        .await?;
    state.timeline.invalidate_tenant(tenant.id);

    metrics::counter!("post_engagements_total").increment(1);

    Ok(Json(DataResponse::new(post.into())))
}
