//! # Security Handlers
//!
//! Admin views over the login-throttling IP blocks.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::types::{BlockedIpResponse, DataResponse};
use crate::auth::{AuthUser, require_role};
use crate::error::{ApiError, not_found};
use crate::models::user::Role;
use crate::server::AppState;
use crate::tenancy::TenantHeader;

/// Currently blocked IP addresses (admins)
#[utoipa::path(
    get,
    path = "/api/v1/security/blocks",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Active blocks", body = DataResponse<Vec<BlockedIpResponse>>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 403, description = "Not an admin", body = ApiError)
    ),
    tag = "security"
)]
pub async fn list_blocks(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<Json<DataResponse<Vec<BlockedIpResponse>>>, ApiError> {
    require_role(&auth.user, &[Role::Admin])?;

    let blocks = state.security.active_blocks().await?;
    Ok(Json(DataResponse::new(
        blocks.into_iter().map(BlockedIpResponse::from).collect(),
    )))
}

/// Lifts the block on an IP address (admins)
#[utoipa::path(
    delete,
    path = "/api/v1/security/blocks/{ip}",
    security(("bearer_auth" = [])),
    params(TenantHeader, ("ip" = String, Path, description = "Blocked IP address")),
    responses(
        (status = 204, description = "Block removed"),
        (status = 403, description = "Not an admin", body = ApiError),
        (status = 404, description = "No block for this address", body = ApiError)
    ),
    tag = "security"
)]
pub async fn unblock_ip(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    Path(ip): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_role(&auth.user, &[Role::Admin])?;

    if !state.security.unblock(ip.trim()).await? {
        return Err(not_found("IP block"));
    }

    Ok(StatusCode::NO_CONTENT)
}
