//! # Common API Types
//!
//! Response bodies shared across handlers and the pagination wrapper.

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::ab_test::Variant;
use crate::models::{
    ab_test, blocked_ip, circle, job_match_score, job_posting, post, user, webhook,
    webhook_delivery,
};
use crate::services::matching;

fn utc(at: DateTimeWithTimeZone) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

/// Generic paginated response wrapper for list endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaginatedResponse<T> {
    /// List of items for the current page
    pub data: Vec<T>,
    /// Opaque cursor for fetching the next page (null if this is the last page)
    pub next_cursor: Option<String>,
    /// Convenience field indicating if more pages exist
    pub has_more: bool,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, next_cursor: Option<String>) -> Self {
        let has_more = next_cursor.is_some();
        Self {
            data,
            next_cursor,
            has_more,
        }
    }
}

/// `{ "data": ... }` envelope for single resources and plain lists
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[schema(example = "alumni")]
    pub role: String,
    pub skills: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            skills: model.skill_list(),
            id: model.id,
            name: model.name,
            email: model.email,
            role: model.role,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostResponse {
    pub id: Uuid,
    pub author_id: Uuid,
    pub circle_id: Option<Uuid>,
    pub content: String,
    #[schema(example = "public")]
    pub visibility: String,
    #[schema(example = "published")]
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub likes_count: i32,
    pub comments_count: i32,
    pub shares_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<post::Model> for PostResponse {
    fn from(model: post::Model) -> Self {
        Self {
            id: model.id,
            author_id: model.author_id,
            circle_id: model.circle_id,
            content: model.content,
            visibility: model.visibility,
            status: model.status,
            scheduled_at: model.scheduled_at.map(utc),
            published_at: model.published_at.map(utc),
            likes_count: model.likes_count,
            comments_count: model.comments_count,
            shares_count: model.shares_count,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TimelineEntryResponse {
    #[serde(flatten)]
    pub post: PostResponse,
    /// Relevance score the entry was ranked by
    #[schema(example = 87.5231)]
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CircleResponse {
    pub id: Uuid,
    pub name: String,
    #[schema(example = "circle")]
    pub kind: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<circle::Model> for CircleResponse {
    fn from(model: circle::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            kind: model.kind,
            description: model.description,
            owner_id: model.owner_id,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobResponse {
    pub id: Uuid,
    pub employer_id: Uuid,
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub required_skills: Vec<String>,
    pub preferred_skills: Vec<String>,
    #[schema(example = "open")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<job_posting::Model> for JobResponse {
    fn from(model: job_posting::Model) -> Self {
        Self {
            required_skills: model.required_skill_list(),
            preferred_skills: model.preferred_skill_list(),
            id: model.id,
            employer_id: model.employer_id,
            title: model.title,
            description: model.description,
            location: model.location,
            status: model.status,
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MatchScoreResponse {
    #[schema(example = 66.67)]
    pub score: f64,
    pub matched_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

impl From<&job_match_score::Model> for MatchScoreResponse {
    fn from(model: &job_match_score::Model) -> Self {
        Self {
            score: model.score,
            matched_skills: matching::matched_skills(model),
            missing_skills: matching::missing_skills(model),
            computed_at: utc(model.computed_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AbTestResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub variants: Vec<Variant>,
    #[schema(example = "running")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ab_test::Model> for AbTestResponse {
    fn from(model: ab_test::Model) -> Self {
        Self {
            variants: model.variant_list(),
            id: model.id,
            name: model.name,
            description: model.description,
            status: model.status,
            created_at: utc(model.created_at),
            updated_at: utc(model.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub is_active: bool,
    /// Signing secret; only returned when the webhook is created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<webhook::Model> for WebhookResponse {
    fn from(model: webhook::Model) -> Self {
        Self {
            events: model.event_list(),
            id: model.id,
            user_id: model.user_id,
            url: model.url,
            is_active: model.is_active,
            secret: None,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryResponse {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status_code: Option<i32>,
    pub success: bool,
    pub attempts: i32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<webhook_delivery::Model> for DeliveryResponse {
    fn from(model: webhook_delivery::Model) -> Self {
        Self {
            id: model.id,
            webhook_id: model.webhook_id,
            event: model.event,
            payload: model.payload,
            status_code: model.status_code,
            success: model.success,
            attempts: model.attempts,
            error: model.error,
            created_at: utc(model.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BlockedIpResponse {
    pub ip_address: String,
    pub reason: String,
    pub blocked_until: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<blocked_ip::Model> for BlockedIpResponse {
    fn from(model: blocked_ip::Model) -> Self {
        Self {
            ip_address: model.ip_address,
            reason: model.reason,
            blocked_until: utc(model.blocked_until),
            created_at: utc(model.created_at),
        }
    }
}
