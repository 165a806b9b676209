//! Test utilities for database and HTTP testing.
//!
//! In-memory SQLite databases with all migrations applied, fixture builders
//! and helpers that drive the real router with `oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use alumni::auth::{generate_token, hash_token};
use alumni::config::{AppConfig, WebhookConfig};
use alumni::models::{tenant, user};
use alumni::models::user::Role;
use alumni::repositories::tenant::CreateTenantRequest;
use alumni::repositories::user::CreateUserRequest;
use alumni::repositories::{TenantRepository, UserRepository};
use alumni::server::{AppState, create_app};
use anyhow::Result;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};
use serde_json::Value;
use tower::ServiceExt;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // Fixtures insert rows directly; relations are asserted by the tests.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Test profile with fast webhook retries.
pub fn test_config() -> AppConfig {
    AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        base_domain: "alumni.test".to_string(),
        webhooks: WebhookConfig {
            timeout_seconds: 2,
            max_attempts: 2,
            backoff_base_ms: 1,
        },
        ..Default::default()
    }
}

pub fn build_state(db: DatabaseConnection, config: AppConfig) -> AppState {
    AppState::new(Arc::new(config), db).expect("Failed to build app state")
}

/// Database, state and router sharing one connection.
pub async fn test_app() -> Result<(DatabaseConnection, AppState, Router)> {
    let db = setup_test_db().await?;
    let state = build_state(db.clone(), test_config());
    let app = create_app(state.clone());
    Ok((db, state, app))
}

pub async fn create_tenant(db: &DatabaseConnection, slug: &str) -> Result<tenant::Model> {
    Ok(TenantRepository::new(db)
        .create(CreateTenantRequest {
            slug: slug.to_string(),
            name: format!("{slug} University"),
            domain: None,
        })
        .await?)
}

/// Inserts a user directly. The password hash is a placeholder, so these
/// users can only authenticate through [`issue_token`].
pub async fn create_user(
    db: &DatabaseConnection,
    tenant_id: uuid::Uuid,
    email: &str,
    role: Role,
    skills: &[&str],
) -> Result<user::Model> {
    Ok(UserRepository::new(db)
        .create(CreateUserRequest {
            tenant_id,
            name: email.split('@').next().unwrap_or("user").to_string(),
            email: email.to_string(),
            password_hash: "!".to_string(),
            role,
            skills: skills.iter().map(|skill| skill.to_string()).collect(),
        })
        .await?)
}

/// Issues a bearer token for `user` and returns its plaintext.
pub async fn issue_token(db: &DatabaseConnection, user: &user::Model) -> Result<String> {
    let token = generate_token();
    UserRepository::new(db)
        .create_token(user, "test", hash_token(&token), None)
        .await?;
    Ok(token)
}

/// Request builder carrying the tenant header and an optional bearer token.
pub struct TestRequest {
    builder: axum::http::request::Builder,
    body: Option<String>,
}

impl TestRequest {
    pub fn new(method: Method, uri: &str, tenant: &str) -> Self {
        Self {
            builder: Request::builder()
                .method(method)
                .uri(uri)
                .header("x-tenant", tenant),
            body: None,
        }
    }

    /// No `X-Tenant` header; the tenant must come from the host, if at all.
    pub fn without_tenant(method: Method, uri: &str) -> Self {
        Self {
            builder: Request::builder().method(method).uri(uri),
            body: None,
        }
    }

    pub fn get(uri: &str, tenant: &str) -> Self {
        Self::new(Method::GET, uri, tenant)
    }

    pub fn post(uri: &str, tenant: &str) -> Self {
        Self::new(Method::POST, uri, tenant)
    }

    pub fn token(mut self, token: &str) -> Self {
        self.builder = self
            .builder
            .header(header::AUTHORIZATION, format!("Bearer {token}"));
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Sends `body` verbatim as `application/json`, well-formed or not.
    pub fn raw_json(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    fn build(self) -> Request<Body> {
        match self.body {
            Some(body) => self
                .builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .expect("valid request"),
            None => self.builder.body(Body::empty()).expect("valid request"),
        }
    }
}

/// Response status, headers and JSON body (`Null` when empty).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, request: TestRequest) -> TestResponse {
    let response = app
        .clone()
        .oneshot(request.build())
        .await
        .expect("router is infallible");

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("readable body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    TestResponse {
        status,
        headers,
        body,
    }
}
