//! # Authentication Handlers
//!
//! Registration, login (throttled per client IP), logout and the current
//! user's profile.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::types::{DataResponse, UserResponse};
use crate::auth::{AuthUser, ClientIp, generate_token, hash_password, hash_token, verify_password};
use crate::error::{ApiError, FieldErrors, ip_blocked, unauthorized};
use crate::models::user::Role;
use crate::repositories::UserRepository;
use crate::repositories::user::{CreateUserRequest, normalize_email};
use crate::server::AppState;
use crate::services::security::FailureOutcome;
use crate::tenancy::{CurrentTenant, TenantHeader};

const MIN_PASSWORD_LEN: usize = 8;
const MAX_SKILLS: usize = 50;
const MAX_SKILL_LEN: usize = 100;
const LOGIN_TOKEN_NAME: &str = "login";

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    #[schema(example = "Ada Lovelace")]
    pub name: String,
    #[schema(example = "ada@example.edu")]
    pub email: String,
    pub password: String,
    /// `alumni` (default) or `employer`
    pub role: Option<Role>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSkillsRequest {
    pub skills: Vec<String>,
}

/// Token issued on register and login; shown once
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthTokenResponse {
    pub user: UserResponse,
    pub token: String,
    #[schema(example = "Bearer")]
    pub token_type: &'static str,
}

fn validate_email(email: &str, errors: &mut FieldErrors) {
    let email = email.trim();
    let valid = email.len() <= 255
        && email.split_once('@').is_some_and(|(local, domain)| {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        });
    if !valid {
        errors.add("email", "The email must be a valid email address.");
    }
}

fn validate_skills(skills: &[String], errors: &mut FieldErrors) {
    if skills.len() > MAX_SKILLS {
        errors.add("skills", format!("No more than {MAX_SKILLS} skills may be listed."));
    }
    if skills.iter().any(|skill| skill.trim().chars().count() > MAX_SKILL_LEN) {
        errors.add(
            "skills",
            format!("Each skill may not be greater than {MAX_SKILL_LEN} characters."),
        );
    }
}

async fn hash_blocking(password: String) -> Result<String, ApiError> {
    let hashed = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(hashed)
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, ApiError> {
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(anyhow::Error::from)?
        .map_err(anyhow::Error::from)?;
    Ok(verified)
}

/// Creates an alumni or employer account and returns its first token
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    params(TenantHeader),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthTokenResponse),
        (status = 400, description = "Malformed body or missing tenant", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthTokenResponse>), ApiError> {
    let Json(request) = body?;

    let mut errors = FieldErrors::new();
    let name_len = request.name.trim().chars().count();
    if name_len == 0 || name_len > 255 {
        errors.add("name", "The name must be between 1 and 255 characters.");
    }
    validate_email(&request.email, &mut errors);
    if request.password.chars().count() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("The password must be at least {MIN_PASSWORD_LEN} characters."),
        );
    }
    let role = request.role.unwrap_or(Role::Alumni);
    if role == Role::Admin {
        errors.add("role", "The selected role is invalid.");
    }
    validate_skills(&request.skills, &mut errors);
    errors.finish()?;

    let password_hash = hash_blocking(request.password).await?;

    let users = UserRepository::new(&state.db);
    let user = users
        .create(CreateUserRequest {
            tenant_id: tenant.id,
            name: request.name,
            email: request.email,
            password_hash,
            role,
            skills: request.skills,
        })
        .await?;

    let token = generate_token();
    users
        .create_token(&user, LOGIN_TOKEN_NAME, hash_token(&token), None)
        .await?;

    tracing::info!(user_id = %user.id, role = %role, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthTokenResponse {
            user: user.into(),
            token,
            token_type: "Bearer",
        }),
    ))
}

/// Exchanges credentials for a bearer token
///
/// Repeated failures from one address block it for a while; the response
/// that trips the block is already a 403 `IP_BLOCKED`.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    params(TenantHeader),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthTokenResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 403, description = "Address blocked after repeated failures", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    CurrentTenant(tenant): CurrentTenant,
    ClientIp(ip): ClientIp,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthTokenResponse>, ApiError> {
    let Json(request) = body?;

    let mut errors = FieldErrors::new();
    if request.email.trim().is_empty() {
        errors.add("email", "The email field is required.");
    }
    if request.password.is_empty() {
        errors.add("password", "The password field is required.");
    }
    errors.finish()?;

    let email = normalize_email(&request.email);
    let users = UserRepository::new(&state.db);

    let verified = match users.find_by_email(tenant.id, &email).await? {
        Some(user) => {
            let ok = verify_blocking(request.password, user.password_hash.clone()).await?;
            ok.then_some(user)
        }
        None => None,
    };

    let Some(user) = verified else {
        let outcome = state
            .security
            .record_failed_login(Some(tenant.id), &ip, &email)
            .await?;
        tracing::info!(ip = %ip, "Failed login attempt");
        return Err(match outcome {
            FailureOutcome::Blocked {
                retry_after_seconds,
            } => ip_blocked(retry_after_seconds),
            FailureOutcome::Counted { .. } => unauthorized(Some("Invalid credentials")),
        });
    };

    state.security.record_successful_login(&ip, &email).await?;

    let token = generate_token();
    users
        .create_token(&user, LOGIN_TOKEN_NAME, hash_token(&token), None)
        .await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthTokenResponse {
        user: user.into(),
        token,
        token_type: "Bearer",
    }))
}

/// Revokes the token used for this request
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 204, description = "Token revoked"),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
) -> Result<StatusCode, ApiError> {
    UserRepository::new(&state.db)
        .revoke_token(auth.token_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The authenticated user
#[utoipa::path(
    get,
    path = "/api/v1/me",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    responses(
        (status = 200, description = "Current user", body = DataResponse<UserResponse>),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn me(AuthUser(auth): AuthUser) -> Json<DataResponse<UserResponse>> {
    Json(DataResponse::new(auth.user.into()))
}

/// Replaces the user's skills; stored job match scores become stale
#[utoipa::path(
    put,
    path = "/api/v1/me/skills",
    security(("bearer_auth" = [])),
    params(TenantHeader),
    request_body = UpdateSkillsRequest,
    responses(
        (status = 200, description = "Skills updated", body = DataResponse<UserResponse>),
        (status = 401, description = "Not authenticated", body = ApiError),
        (status = 422, description = "Validation failed", body = ApiError)
    ),
    tag = "auth"
)]
pub async fn update_skills(
    State(state): State<AppState>,
    AuthUser(auth): AuthUser,
    body: Result<Json<UpdateSkillsRequest>, JsonRejection>,
) -> Result<Json<DataResponse<UserResponse>>, ApiError> {
    let Json(request) = body?;

    let mut errors = FieldErrors::new();
    validate_skills(&request.skills, &mut errors);
    errors.finish()?;

    let user = UserRepository::new(&state.db)
        .update_skills(auth.user, &request.skills)
        .await?;

    Ok(Json(DataResponse::new(user.into())))
}
