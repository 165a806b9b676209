//! # User Repository
//!
//! Tenant-scoped users and their personal access tokens.

use chrono::Duration;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde_json::json;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::api_token::{self, Entity as ApiToken};
use crate::models::timestamp_now;
use crate::models::user::{self, Entity as User, Role};

#[derive(Debug, Clone)]
pub struct CreateUserRequest {
    pub tenant_id: Uuid,
    pub name: String,
    pub email: String,
    /// Already-hashed password (PHC string)
    pub password_hash: String,
    pub role: Role,
    pub skills: Vec<String>,
}

pub struct UserRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> UserRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, request: CreateUserRequest) -> Result<user::Model, RepositoryError> {
        let now = timestamp_now();
        let user = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            name: Set(request.name.trim().to_string()),
            email: Set(normalize_email(&request.email)),
            password_hash: Set(request.password_hash),
            role: Set(request.role.as_str().to_string()),
            skills: Set(json!(normalize_skills(&request.skills))),
            created_at: Set(now),
            updated_at: Set(now),
        };

        user.insert(self.db).await.map_err(|err| {
            match RepositoryError::database_error(err) {
                RepositoryError::Conflict(_) => RepositoryError::validation_error(
                    "email",
                    "The email has already been taken.",
                ),
                other => other,
            }
        })
    }

    pub async fn find(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<user::Model>, RepositoryError> {
        User::find_by_id(user_id)
            .filter(user::Column::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn find_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<user::Model>, RepositoryError> {
        User::find()
            .filter(user::Column::TenantId.eq(tenant_id))
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// All users of a tenant holding `role`, oldest first.
    pub async fn list_by_role(
        &self,
        tenant_id: Uuid,
        role: Role,
    ) -> Result<Vec<user::Model>, RepositoryError> {
        User::find()
            .filter(user::Column::TenantId.eq(tenant_id))
            .filter(user::Column::Role.eq(role.as_str()))
            .order_by_asc(user::Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Replaces the skill list; bumping `updated_at` makes stored match scores stale.
    pub async fn update_skills(
        &self,
        user: user::Model,
        skills: &[String],
    ) -> Result<user::Model, RepositoryError> {
        let mut active = user.into_active_model();
        active.skills = Set(json!(normalize_skills(skills)));
        active.updated_at = Set(timestamp_now());
        active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn create_token(
        &self,
        user: &user::Model,
        name: &str,
        token_hash: String,
        ttl: Option<Duration>,
    ) -> Result<api_token::Model, RepositoryError> {
        let now = timestamp_now();
        let token = api_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(user.tenant_id),
            user_id: Set(user.id),
            name: Set(name.to_string()),
            token_hash: Set(token_hash),
            last_used_at: Set(None),
            expires_at: Set(ttl.map(|ttl| now + ttl)),
            created_at: Set(now),
        };

        token
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Finds the user owning an unexpired token within the tenant and stamps
    /// `last_used_at`.
    pub async fn find_by_token_hash(
        &self,
        tenant_id: Uuid,
        token_hash: &str,
    ) -> Result<Option<(api_token::Model, user::Model)>, RepositoryError> {
        let Some((token, Some(user))) = ApiToken::find()
            .filter(api_token::Column::TokenHash.eq(token_hash))
            .filter(api_token::Column::TenantId.eq(tenant_id))
            .find_also_related(User)
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?
        else {
            return Ok(None);
        };

        let now = timestamp_now();
        if token.expires_at.is_some_and(|expires_at| expires_at <= now) {
            return Ok(None);
        }

        let mut active = token.into_active_model();
        active.last_used_at = Set(Some(now));
        let token = active
            .update(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(Some((token, user)))
    }

    pub async fn revoke_token(&self, token_id: Uuid) -> Result<(), RepositoryError> {
        ApiToken::delete_by_id(token_id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims, drops empties and de-duplicates case-insensitively, keeping the
/// first spelling seen.
pub fn normalize_skills(skills: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    skills
        .iter()
        .map(|skill| skill.trim())
        .filter(|skill| !skill.is_empty())
        .filter(|skill| seen.insert(skill.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skills_are_trimmed_and_deduplicated() {
        let skills = vec![
            " Rust ".to_string(),
            "rust".to_string(),
            "".to_string(),
            "SQL".to_string(),
        ];
        assert_eq!(normalize_skills(&skills), vec!["Rust", "SQL"]);
    }

    #[test]
    fn email_is_lowercased() {
        assert_eq!(normalize_email("  Ada@Example.EDU "), "ada@example.edu");
    }
}
