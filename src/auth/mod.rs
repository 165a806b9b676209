//! # Authentication and Authorization
//!
//! Bearer-token user resolution, role checks and the IP block guard for the
//! `/api` surface.

pub mod password;
pub mod token;

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::{ApiError, forbidden, ip_blocked, unauthorized};
use crate::models::user::{self, Role};
use crate::repositories::UserRepository;
use crate::server::AppState;
use crate::tenancy::CurrentTenant;

pub use password::{hash_password, verify_password};
pub use token::{generate_token, hash_token};

/// Attached to the request when a valid bearer token was presented.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: user::Model,
    pub token_id: Uuid,
}

/// Extractor for routes that require a signed-in user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Authenticated);

/// Extractor for routes open to guests.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<user::Model>);

/// Address the request originated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

/// Resolves `Authorization: Bearer <token>` to a user of the current tenant.
///
/// Requests without the header continue as guests; a header that does not
/// resolve is rejected with 401.
pub async fn resolve_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = bearer_token(request.headers())?.map(str::to_string) else {
        return Ok(next.run(request).await);
    };

    let tenant_id = request
        .extensions()
        .get::<CurrentTenant>()
        .map(|tenant| tenant.0.id)
        .ok_or_else(|| unauthorized(Some("Tenant context missing")))?;

    let (api_token, user) = UserRepository::new(&state.db)
        .find_by_token_hash(tenant_id, &hash_token(&token))
        .await?
        .ok_or_else(|| unauthorized(Some("Invalid or expired token")))?;

    tracing::debug!(user_id = %user.id, "Authenticated request");

    request.extensions_mut().insert(Authenticated {
        user,
        token_id: api_token.id,
    });

    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, ApiError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let header = value
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    let token = header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))?;

    Ok(Some(token))
}

/// Rejects every request from an address that is currently blocked.
pub async fn ip_block_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());

    if let Some(remaining) = state.security.block_remaining(&ip).await? {
        tracing::warn!(ip = %ip, remaining_seconds = remaining, "Rejected request from blocked IP");
        metrics::counter!("security_blocked_requests_total").increment(1);
        return Err(ip_blocked(remaining));
    }

    Ok(next.run(request).await)
}

/// First `X-Forwarded-For` entry, else the peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// 403 unless the user holds one of `roles`.
pub fn require_role(user: &user::Model, roles: &[Role]) -> Result<(), ApiError> {
    if roles.contains(&user.role()) {
        Ok(())
    } else {
        Err(forbidden(Some("Your role does not allow this action")))
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Authenticated>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| unauthorized(None))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<Authenticated>()
                .map(|auth| auth.user.clone()),
        ))
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(
            &parts.headers,
            parts.extensions.get::<ConnectInfo<SocketAddr>>(),
        )))
    }
}
