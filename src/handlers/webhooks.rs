//! # Webhook Handlers
//!
//! Registration and management of outbound webhooks. The signing secret is
//! only ever returned by the create call.

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::types::{DataResponse, DeliveryResponse, WebhookResponse};
use crate::auth::AuthUser;
use crate::error::{ApiError, FieldErrors, forbidden, not_found};
use crate::models::user::{self, Role};
use crate::models::webhook;
use crate::repositories::WebhookRepository;
use crate::repositories::webhook::NewWebhook;
use crate::server::AppState;
use crate::services::WebhookService;
use crate::services::webhooks::{EVENT_WEBHOOK_TEST, generate_secret};
use crate::tenancy::{CurrentTenant, TenantHeader};

const DEFAULT_DELIVERY_LIMIT: u64 = 50;
const MAX_DELIVERY_LIMIT: u64 = 200;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWebhookRequest {
    #[schema(example = "https://hooks.example.edu/alumni")]
    pub url: String,
    /// Event names, or `*` for all events
    #[schema(example = json!(["post.published", "job.posted"]))]
    pub events: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeliveriesQuery {
    /// Maximum number of deliveries (default: 50, max: 200)
    pub limit: Option<u64>,
}

/// 404 for other tenants' webhooks, 403 unless owner or admin.
async fn find_owned(
    state: &AppState,
    tenant_id: Uuid,
    webhook_id: Uuid,
    user: &user::Model,
) -> Result<webhook::Model, ApiError> {
    let webhook = WebhookRepository::new(&state.db)
        .find(tenant_id, webhook_id)
        .await?
        .ok_or_else(|| not_found("Webhook"))?;

    if webhook.user_id != user.id && user.role() != Role::Admin {
        return Err(forbidden(Some("Only the owner or an admin may manage this webhook")));
    }

    Ok(webhook)
}

/// Registers a webhook for the current user
#[utoipa::path(
    post,
    path = "/api/v1/webhooks",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook created; the secret is shown once", body = DataResponse<WebhookResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    body: Result<Json<CreateWebhookRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<WebhookResponse>>), ApiError> {
    let Json(request) = body?;
    let url = request.url.trim().to_string();

    let mut events: Vec<String> = request
        .events
        .iter()
        .map(|event| event.trim().to_string())
        .collect();
    events.sort();
    events.dedup();

    let mut errors = FieldErrors::new();
    state.webhooks.validate_url(&url, &mut errors);
    WebhookService::validate_events(&events, &mut errors);
    errors.finish()?;

    let secret = generate_secret();
    let webhook = WebhookRepository::new(&state.db)
        .create(NewWebhook {
            tenant_id: tenant.id,
            user_id: auth.user.id,
            url,
            events,
            secret: secret.clone(),
        })
        .await?;

    tracing::info!(webhook_id = %webhook.id, user_id = %auth.user.id, "Webhook registered");

    let mut response = WebhookResponse::from(webhook);
    response.secret = Some(secret);

    Ok((StatusCode::CREATED, Json(DataResponse::new(response))))
}

/// The current user's webhooks; admins see the whole tenant
#[utoipa::path(
    get,
    path = "/api/v1/webhooks",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Webhooks", body = DataResponse<Vec<WebhookResponse>>),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
) -> Result<Json<DataResponse<Vec<WebhookResponse>>>, ApiError> {
    let owner = (auth.user.role() != Role::Admin).then_some(auth.user.id);
    let webhooks = WebhookRepository::new(&state.db)
        .list(tenant.id, owner)
        .await?;

    Ok(Json(DataResponse::new(
        webhooks.into_iter().map(WebhookResponse::from).collect(),
    )))
}

#[utoipa::path(
    delete,
    path = "/api/v1/webhooks/{id}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 403, description = "Neither owner nor admin", body = ApiError),
        (status = 404, description = "Webhook not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(webhook_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let webhook = find_owned(&state, tenant.id, webhook_id, &auth.user).await?;
    WebhookRepository::new(&state.db).delete(webhook.id).await?;

    tracing::info!(webhook_id = %webhook.id, deleted_by = %auth.user.id, "Webhook deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Sends a `webhook.test` event synchronously and returns the recorded delivery
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/{id}/test",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Webhook ID")),
    responses(
        (status = 200, description = "Delivery outcome", body = DataResponse<DeliveryResponse>),
        (status = 403, description = "Neither owner nor admin", body = ApiError),
        (status = 404, description = "Webhook not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn test_webhook(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(webhook_id): Path<Uuid>,
) -> Result<Json<DataResponse<DeliveryResponse>>, ApiError> {
    let webhook = find_owned(&state, tenant.id, webhook_id, &auth.user).await?;

    let payload = WebhookService::envelope(
        EVENT_WEBHOOK_TEST,
        &tenant,
        json!({ "webhook_id": webhook.id, "message": "This is a test delivery." }),
    );
    let delivery = state
        .webhooks
        .deliver(&webhook, EVENT_WEBHOOK_TEST, payload)
        .await?;

    Ok(Json(DataResponse::new(delivery.into())))
}

/// Most recent deliveries of a webhook, newest first
#[utoipa::path(
    get,
    path = "/api/v1/webhooks/{id}/deliveries",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("id" = Uuid, Path, description = "Webhook ID"), DeliveriesQuery),
    responses(
        (status = 200, description = "Delivery log", body = DataResponse<Vec<DeliveryResponse>>),
        (status = 403, description = "Neither owner nor admin", body = ApiError),
        (status = 404, description = "Webhook not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn list_deliveries(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    AuthUser(auth): AuthUser,
    Path(webhook_id): Path<Uuid>,
    Query(query): Query<DeliveriesQuery>,
) -> Result<Json<DataResponse<Vec<DeliveryResponse>>>, ApiError> {
    let webhook = find_owned(&state, tenant.id, webhook_id, &auth.user).await?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_DELIVERY_LIMIT)
        .clamp(1, MAX_DELIVERY_LIMIT);

    let deliveries = WebhookRepository::new(&state.db)
        .deliveries(webhook.id, limit)
        .await?;

    Ok(Json(DataResponse::new(
        deliveries.into_iter().map(DeliveryResponse::from).collect(),
    )))
}
