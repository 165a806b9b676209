//! # Tenant Repository
//!
//! Lookup and creation of tenants (institutions).

use std::sync::LazyLock;

use regex::Regex;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::tenant::{
    ActiveModel as TenantActiveModel, Column, Entity as Tenant, Model as TenantModel,
};
use crate::models::timestamp_now;

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").expect("slug pattern compiles"));

/// Request data for creating a new tenant
#[derive(Debug, Clone)]
pub struct CreateTenantRequest {
    pub slug: String,
    pub name: String,
    /// Custom domain serving this tenant, e.g. `alumni.example.edu`
    pub domain: Option<String>,
}

pub struct TenantRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> TenantRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: CreateTenantRequest) -> Result<TenantModel, RepositoryError> {
        let slug = request.slug.trim().to_lowercase();
        if !SLUG_PATTERN.is_match(&slug) {
            return Err(RepositoryError::validation_error(
                "slug",
                "The slug may only contain lowercase letters, digits and dashes.",
            ));
        }

        let name = request.name.trim().to_string();
        if name.is_empty() {
            return Err(RepositoryError::validation_error(
                "name",
                "The name field is required.",
            ));
        }

        let tenant = TenantActiveModel {
            id: Set(Uuid::new_v4()),
            slug: Set(slug),
            name: Set(name),
            domain: Set(request
                .domain
                .map(|domain| domain.trim().to_lowercase())
                .filter(|domain| !domain.is_empty())),
            created_at: Set(timestamp_now()),
        };

        tenant
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_id(&self, tenant_id: Uuid) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find_by_id(tenant_id)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find()
            .filter(Column::Slug.eq(slug.to_lowercase()))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantModel>, RepositoryError> {
        Tenant::find()
            .filter(Column::Domain.eq(domain.to_lowercase()))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Resolves either a UUID or a slug.
    pub async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Option<TenantModel>, RepositoryError> {
        match identifier.parse::<Uuid>() {
            Ok(id) => self.find_by_id(id).await,
            Err(_) => self.find_by_slug(identifier).await,
        }
    }
}
