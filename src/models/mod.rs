//! # Data Models
//!
//! SeaORM entities for every table of the alumni engagement schema.

use chrono::{SubsecRound, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

pub mod ab_test_event;
pub mod api_token;
pub mod blocked_ip;
pub mod circle;
pub mod circle_membership;
pub mod failed_login_attempt;
pub mod job_match_score;
pub mod job_posting;
pub mod post;
pub mod tenant;
pub mod user;
pub mod webhook;
pub mod webhook_delivery;

pub use ab_test::Entity as AbTest;
pub use ab_test_event::Entity as AbTestEvent;
pub use api_token::Entity as ApiToken;
pub use blocked_ip::Entity as BlockedIp;
pub use circle::Entity as Circle;
pub use circle_membership::Entity as CircleMembership;
pub use failed_login_attempt::Entity as FailedLoginAttempt;
pub use job_match_score::Entity as JobMatchScore;
pub use job_posting::Entity as JobPosting;
pub use post::Entity as Post;
pub use tenant::Entity as Tenant;
pub use user::Entity as User;
pub use webhook::Entity as Webhook;
pub use webhook_delivery::Entity as WebhookDelivery;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "alumni-engagement".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Current UTC time at microsecond precision, the resolution Postgres keeps,
/// so values read back compare equal to what was written.
pub fn timestamp_now() -> DateTimeWithTimeZone {
    Utc::now().trunc_subsecs(6).fixed_offset()
}

/// Reads a JSON array column as a list of strings, skipping non-string items.
pub(crate) fn json_string_list(value: &JsonValue) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
