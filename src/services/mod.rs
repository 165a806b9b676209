//! # Services
//!
//! Business rules layered over the repositories: timeline ranking, job
//! matching, experiments, login throttling, webhook delivery, federation
//! mapping and the scheduled-post publisher.

pub mod ab_testing;
pub mod federation;
pub mod matching;
pub mod personalization;
pub mod publisher;
pub mod security;
pub mod timeline;
pub mod webhooks;

pub use ab_testing::AbTestingService;
pub use federation::FederationBridge;
pub use matching::MatchingService;
pub use personalization::PersonalizationService;
pub use publisher::ScheduledPostPublisher;
pub use security::SecurityService;
pub use timeline::TimelineService;
pub use webhooks::WebhookService;
