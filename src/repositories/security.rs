//! # Security Repository
//!
//! Failed login attempts and IP blocks. Both tables are global: a blocked
//! address is blocked for every tenant.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set, prelude::DateTimeWithTimeZone,
};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::blocked_ip::{self, Entity as BlockedIp};
use crate::models::failed_login_attempt::{self, Entity as FailedLoginAttempt};
use crate::models::timestamp_now;

pub struct SecurityRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SecurityRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn record_failure(
        &self,
        tenant_id: Option<Uuid>,
        ip_address: &str,
        email: &str,
        attempted_at: DateTimeWithTimeZone,
    ) -> Result<(), RepositoryError> {
        failed_login_attempt::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            ip_address: Set(ip_address.to_string()),
            email: Set(email.to_string()),
            attempted_at: Set(attempted_at),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    pub async fn count_failures_since(
        &self,
        ip_address: &str,
        since: DateTimeWithTimeZone,
    ) -> Result<u64, RepositoryError> {
        FailedLoginAttempt::find()
            .filter(failed_login_attempt::Column::IpAddress.eq(ip_address))
            .filter(failed_login_attempt::Column::AttemptedAt.gte(since))
            .count(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn clear_failures(&self, ip_address: &str, email: &str) -> Result<u64, RepositoryError> {
        let result = FailedLoginAttempt::delete_many()
            .filter(failed_login_attempt::Column::IpAddress.eq(ip_address))
            .filter(failed_login_attempt::Column::Email.eq(email))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }

    /// Forgets every failure recorded for the address, whatever the email.
    pub async fn clear_failures_for_ip(&self, ip_address: &str) -> Result<u64, RepositoryError> {
        let result = FailedLoginAttempt::delete_many()
            .filter(failed_login_attempt::Column::IpAddress.eq(ip_address))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }

    pub async fn find_block(
        &self,
        ip_address: &str,
    ) -> Result<Option<blocked_ip::Model>, RepositoryError> {
        BlockedIp::find()
            .filter(blocked_ip::Column::IpAddress.eq(ip_address))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Creates the block or moves an existing one's expiry to `blocked_until`.
    pub async fn upsert_block(
        &self,
        ip_address: &str,
        reason: &str,
        blocked_until: DateTimeWithTimeZone,
    ) -> Result<blocked_ip::Model, RepositoryError> {
        match self.find_block(ip_address).await? {
            Some(existing) => {
                let mut active = existing.into_active_model();
                active.blocked_until = Set(blocked_until);
                active.reason = Set(reason.to_string());
                active
                    .update(self.db)
                    .await
                    .map_err(RepositoryError::database_error)
            }
            None => blocked_ip::ActiveModel {
                id: Set(Uuid::new_v4()),
                ip_address: Set(ip_address.to_string()),
                reason: Set(reason.to_string()),
                blocked_until: Set(blocked_until),
                created_at: Set(timestamp_now()),
            }
            .insert(self.db)
            .await
            .map_err(RepositoryError::database_error),
        }
    }

    pub async fn active_blocks(
        &self,
        now: DateTimeWithTimeZone,
    ) -> Result<Vec<blocked_ip::Model>, RepositoryError> {
        BlockedIp::find()
            .filter(blocked_ip::Column::BlockedUntil.gt(now))
            .order_by_desc(blocked_ip::Column::BlockedUntil)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn delete_block(&self, ip_address: &str) -> Result<bool, RepositoryError> {
        let result = BlockedIp::delete_many()
            .filter(blocked_ip::Column::IpAddress.eq(ip_address))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected > 0)
    }

    pub async fn prune_expired(&self, now: DateTimeWithTimeZone) -> Result<u64, RepositoryError> {
        let result = BlockedIp::delete_many()
            .filter(blocked_ip::Column::BlockedUntil.lte(now))
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(result.rows_affected)
    }
}
