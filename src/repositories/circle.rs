//! # Circle Repository
//!
//! Circles and groups together with their memberships.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::circle::{self, CircleKind, Entity as Circle};
use crate::models::circle_membership::{self, Entity as CircleMembership};
use crate::models::timestamp_now;

pub const MEMBER_ROLE_OWNER: &str = "owner";
pub const MEMBER_ROLE_MEMBER: &str = "member";

#[derive(Debug, Clone)]
pub struct CreateCircleRequest {
    pub tenant_id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub kind: CircleKind,
    pub description: Option<String>,
}

pub struct CircleRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> CircleRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates the circle and the owner's membership in one transaction.
    pub async fn create(
        &self,
        request: CreateCircleRequest,
    ) -> Result<circle::Model, RepositoryError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(RepositoryError::database_error)?;
        let now = timestamp_now();

        let circle = circle::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            name: Set(request.name.trim().to_string()),
            kind: Set(request.kind.as_str().to_string()),
            description: Set(request.description),
            owner_id: Set(request.owner_id),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        circle_membership::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(request.tenant_id),
            circle_id: Set(circle.id),
            user_id: Set(request.owner_id),
            role: Set(MEMBER_ROLE_OWNER.to_string()),
            joined_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(RepositoryError::database_error)?;

        txn.commit()
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(circle)
    }

    pub async fn find(
        &self,
        tenant_id: Uuid,
        circle_id: Uuid,
    ) -> Result<Option<circle::Model>, RepositoryError> {
        Circle::find_by_id(circle_id)
            .filter(circle::Column::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn membership(
        &self,
        circle_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<circle_membership::Model>, RepositoryError> {
        CircleMembership::find()
            .filter(circle_membership::Column::CircleId.eq(circle_id))
            .filter(circle_membership::Column::UserId.eq(user_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn is_member(&self, circle_id: Uuid, user_id: Uuid) -> Result<bool, RepositoryError> {
        Ok(self.membership(circle_id, user_id).await?.is_some())
    }

    /// Adds a plain membership; joining twice is a no-op returning the existing row.
    pub async fn join(
        &self,
        circle: &circle::Model,
        user_id: Uuid,
    ) -> Result<circle_membership::Model, RepositoryError> {
        if let Some(existing) = self.membership(circle.id, user_id).await? {
            return Ok(existing);
        }

        circle_membership::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(circle.tenant_id),
            circle_id: Set(circle.id),
            user_id: Set(user_id),
            role: Set(MEMBER_ROLE_MEMBER.to_string()),
            joined_at: Set(timestamp_now()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn leave(&self, circle_id: Uuid, user_id: Uuid) -> Result<(), RepositoryError> {
        let membership = self
            .membership(circle_id, user_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Membership"))?;

        if membership.role == MEMBER_ROLE_OWNER {
            return Err(RepositoryError::validation_error(
                "circle",
                "The owner cannot leave their own circle.",
            ));
        }

        CircleMembership::delete_by_id(membership.id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(())
    }

    /// Circle ids the user belongs to within the tenant.
    pub async fn member_circle_ids(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        CircleMembership::find()
            .select_only()
            .column(circle_membership::Column::CircleId)
            .filter(circle_membership::Column::TenantId.eq(tenant_id))
            .filter(circle_membership::Column::UserId.eq(user_id))
            .into_tuple::<Uuid>()
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn list_for_user(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<circle::Model>, RepositoryError> {
        let ids = self.member_circle_ids(tenant_id, user_id).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Circle::find()
            .filter(circle::Column::Id.is_in(ids))
            .order_by_asc(circle::Column::Name)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
