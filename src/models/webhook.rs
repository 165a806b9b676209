//! Webhook entity model
//!
//! A user-registered HTTPS endpoint that receives signed domain events.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Subscribes a webhook to every event.
pub const WILDCARD_EVENT: &str = "*";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "webhooks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub events: JsonValue,
    /// HMAC signing secret
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn event_list(&self) -> Vec<String> {
        super::json_string_list(&self.events)
    }

    pub fn subscribes_to(&self, event: &str) -> bool {
        self.event_list()
            .iter()
            .any(|candidate| candidate == WILDCARD_EVENT || candidate == event)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::webhook_delivery::Entity")]
    Deliveries,
}

impl Related<super::webhook_delivery::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deliveries.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
