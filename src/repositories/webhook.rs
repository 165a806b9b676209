//! # Webhook Repository
//!
//! Registered webhooks and their delivery log.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::models::timestamp_now;
use crate::models::webhook::{self, Entity as Webhook};
use crate::models::webhook_delivery::{self, Entity as WebhookDelivery};

#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
}

/// Outcome of one delivery, possibly after several attempts.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub webhook_id: Uuid,
    pub event: String,
    pub payload: Value,
    pub status_code: Option<u16>,
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

pub struct WebhookRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> WebhookRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn create(&self, new_webhook: NewWebhook) -> Result<webhook::Model, RepositoryError> {
        let now = timestamp_now();
        webhook::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(new_webhook.tenant_id),
            user_id: Set(new_webhook.user_id),
            url: Set(new_webhook.url),
            events: Set(json!(new_webhook.events)),
            secret: Set(new_webhook.secret),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn find(
        &self,
        tenant_id: Uuid,
        webhook_id: Uuid,
    ) -> Result<Option<webhook::Model>, RepositoryError> {
        Webhook::find_by_id(webhook_id)
            .filter(webhook::Column::TenantId.eq(tenant_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Webhooks visible to a user; `None` lists the whole tenant (admins).
    pub async fn list(
        &self,
        tenant_id: Uuid,
        owner_id: Option<Uuid>,
    ) -> Result<Vec<webhook::Model>, RepositoryError> {
        let mut query = Webhook::find().filter(webhook::Column::TenantId.eq(tenant_id));
        if let Some(owner_id) = owner_id {
            query = query.filter(webhook::Column::UserId.eq(owner_id));
        }

        query
            .order_by_desc(webhook::Column::CreatedAt)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Active webhooks of the tenant subscribed to `event` (or to everything).
    pub async fn subscribers(
        &self,
        tenant_id: Uuid,
        event: &str,
    ) -> Result<Vec<webhook::Model>, RepositoryError> {
        let webhooks = Webhook::find()
            .filter(webhook::Column::TenantId.eq(tenant_id))
            .filter(webhook::Column::IsActive.eq(true))
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        Ok(webhooks
            .into_iter()
            .filter(|webhook| webhook.subscribes_to(event))
            .collect())
    }

    pub async fn delete(&self, webhook_id: Uuid) -> Result<(), RepositoryError> {
        Webhook::delete_by_id(webhook_id)
            .exec(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(())
    }

    pub async fn record_delivery(
        &self,
        record: DeliveryRecord,
    ) -> Result<webhook_delivery::Model, RepositoryError> {
        webhook_delivery::ActiveModel {
            id: Set(Uuid::new_v4()),
            webhook_id: Set(record.webhook_id),
            event: Set(record.event),
            payload: Set(record.payload),
            status_code: Set(record.status_code.map(i32::from)),
            success: Set(record.success),
            attempts: Set(record.attempts as i32),
            error: Set(record.error),
            created_at: Set(timestamp_now()),
        }
        .insert(self.db)
        .await
        .map_err(RepositoryError::database_error)
    }

    pub async fn deliveries(
        &self,
        webhook_id: Uuid,
        limit: u64,
    ) -> Result<Vec<webhook_delivery::Model>, RepositoryError> {
        WebhookDelivery::find()
            .filter(webhook_delivery::Column::WebhookId.eq(webhook_id))
            .order_by_desc(webhook_delivery::Column::CreatedAt)
            .order_by_desc(webhook_delivery::Column::Id)
            .limit(limit)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
