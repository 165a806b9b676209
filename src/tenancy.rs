//! # Tenant Resolution
//!
//! Every `/api` request is scoped to one tenant, identified (in order of
//! precedence) by the `X-Tenant` header, a subdomain of the configured base
//! domain, or a tenant's custom domain.

use std::time::Duration;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::HOST, request::Parts},
    middleware::Next,
    response::Response,
};
use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;

use crate::error::{ApiError, tenant_not_found, tenant_required};
use crate::models::tenant;
use crate::repositories::TenantRepository;
use crate::server::AppState;

pub const TENANT_HEADER: &str = "x-tenant";

const TENANT_CACHE_CAPACITY: u64 = 10_000;
const TENANT_CACHE_TTL: Duration = Duration::from_secs(300);

/// The tenant the current request is scoped to.
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub tenant::Model);

/// How the request named its tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantKey {
    /// `X-Tenant` header: a slug or a UUID
    Header(String),
    Subdomain(String),
    Domain(String),
}

impl TenantKey {
    fn cache_key(&self) -> String {
        match self {
            TenantKey::Header(value) => format!("header:{value}"),
            TenantKey::Subdomain(value) => format!("subdomain:{value}"),
            TenantKey::Domain(value) => format!("domain:{value}"),
        }
    }

    fn label(&self) -> &str {
        match self {
            TenantKey::Header(value) | TenantKey::Subdomain(value) | TenantKey::Domain(value) => {
                value
            }
        }
    }
}

/// Looks tenants up by [`TenantKey`], caching hits for a few minutes.
pub struct TenantResolver {
    db: DatabaseConnection,
    base_domain: String,
    cache: Cache<String, tenant::Model>,
}

impl TenantResolver {
    pub fn new(db: DatabaseConnection, base_domain: impl Into<String>) -> Self {
        Self {
            db,
            base_domain: base_domain.into().to_lowercase(),
            cache: Cache::builder()
                .max_capacity(TENANT_CACHE_CAPACITY)
                .time_to_live(TENANT_CACHE_TTL)
                .build(),
        }
    }

    /// Derives the tenant key from request headers.
    pub fn identify(&self, headers: &HeaderMap) -> Option<TenantKey> {
        if let Some(value) = headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty())
        {
            return Some(TenantKey::Header(value));
        }

        let host = headers
            .get(HOST)
            .and_then(|value| value.to_str().ok())
            .map(strip_port)?
            .to_lowercase();

        if host == self.base_domain {
            return None;
        }

        let suffix = format!(".{}", self.base_domain);
        match host.strip_suffix(&suffix) {
            Some(prefix) => prefix
                .split('.')
                .next()
                .filter(|label| !label.is_empty())
                .map(|label| TenantKey::Subdomain(label.to_string())),
            None => Some(TenantKey::Domain(host)),
        }
    }

    pub async fn lookup(&self, key: &TenantKey) -> Result<Option<tenant::Model>, ApiError> {
        let cache_key = key.cache_key();
        if let Some(tenant) = self.cache.get(&cache_key).await {
            return Ok(Some(tenant));
        }

        let repo = TenantRepository::new(&self.db);
        let found = match key {
            TenantKey::Header(identifier) => repo.find_by_identifier(identifier).await?,
            TenantKey::Subdomain(slug) => repo.find_by_slug(slug).await?,
            TenantKey::Domain(domain) => repo.find_by_domain(domain).await?,
        };

        if let Some(tenant) = &found {
            self.cache.insert(cache_key, tenant.clone()).await;
        }

        Ok(found)
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> Result<tenant::Model, ApiError> {
        let key = self.identify(headers).ok_or_else(tenant_required)?;
        self.lookup(&key)
            .await?
            .ok_or_else(|| tenant_not_found(key.label()))
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if host.starts_with('[') {
        return host.split(']').next().map_or(host, |h| &h[1..]);
    }
    host.split(':').next().unwrap_or(host)
}

/// Middleware attaching [`CurrentTenant`] to the request.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant = state.tenants.resolve(request.headers()).await?;
    tracing::Span::current().record("tenant", tracing::field::display(&tenant.slug));
    request.extensions_mut().insert(CurrentTenant(tenant));
    Ok(next.run(request).await)
}

impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentTenant>()
            .cloned()
            .ok_or_else(tenant_required)
    }
}

/// OpenAPI header parameter for `X-Tenant`
#[derive(Debug, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Header)]
pub struct TenantHeader {
    /// Tenant slug or UUID; optional when the host identifies the tenant
    #[serde(rename = "X-Tenant")]
    #[param(rename = "X-Tenant", value_type = Option<String>)]
    pub tenant: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn resolver() -> TenantResolver {
        TenantResolver::new(DatabaseConnection::default(), "alumni.test")
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(*name, HeaderValue::from_static(value));
        }
        headers
    }

    #[test]
    fn header_wins_over_host() {
        let key = resolver().identify(&headers(&[
            ("x-tenant", "State-U"),
            ("host", "other.alumni.test"),
        ]));
        assert_eq!(key, Some(TenantKey::Header("state-u".to_string())));
    }

    #[test]
    fn subdomain_of_base_domain() {
        let key = resolver().identify(&headers(&[("host", "state-u.alumni.test:8080")]));
        assert_eq!(key, Some(TenantKey::Subdomain("state-u".to_string())));
    }

    #[test]
    fn nested_subdomain_uses_the_leftmost_label() {
        let key = resolver().identify(&headers(&[("host", "state-u.eu.alumni.test")]));
        assert_eq!(key, Some(TenantKey::Subdomain("state-u".to_string())));
    }

    #[test]
    fn foreign_host_is_a_custom_domain() {
        let key = resolver().identify(&headers(&[("host", "Alumni.Example.EDU")]));
        assert_eq!(key, Some(TenantKey::Domain("alumni.example.edu".to_string())));
    }

    #[test]
    fn bare_base_domain_has_no_tenant() {
        assert_eq!(resolver().identify(&headers(&[("host", "alumni.test")])), None);
        assert_eq!(resolver().identify(&HeaderMap::new()), None);
    }

    #[test]
    fn strip_port_handles_ipv6() {
        assert_eq!(strip_port("[::1]:8080"), "::1");
        assert_eq!(strip_port("localhost:3000"), "localhost");
        assert_eq!(strip_port("example.edu"), "example.edu");
    }
}
