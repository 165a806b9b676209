//! # Scheduled Post Publisher
//!
//! Background task that promotes scheduled posts once their time has come,
//! announces them to webhook subscribers and drops stale timeline pages.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::timeline::TimelineService;
use super::webhooks::{EVENT_POST_PUBLISHED, WebhookService, post_published_data};
use crate::config::PublisherConfig;
use crate::error::RepositoryError;
use crate::models::{tenant, timestamp_now};
use crate::repositories::{PostRepository, TenantRepository};

pub struct ScheduledPostPublisher {
    db: DatabaseConnection,
    config: PublisherConfig,
    timeline: Arc<TimelineService>,
    webhooks: Arc<WebhookService>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub published: u64,
    pub failed: u64,
}

impl ScheduledPostPublisher {
    pub fn new(
        db: DatabaseConnection,
        config: PublisherConfig,
        timeline: Arc<TimelineService>,
        webhooks: Arc<WebhookService>,
    ) -> Self {
        Self {
            db,
            config,
            timeline,
            webhooks,
        }
    }

    /// Runs until `shutdown` fires. Tick failures are logged and the loop
    /// carries on.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            tick_seconds = self.config.tick_seconds,
            "Starting scheduled post publisher"
        );
        let tick_interval = Duration::from_secs(self.config.tick_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scheduled post publisher shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "Publisher tick failed");
                        counter!("publisher_tick_failures_total").increment(1);
                    }
                    histogram!("publisher_tick_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Scheduled post publisher stopped");
    }

    /// Publishes one batch of due posts.
    pub async fn tick(&self) -> Result<TickStats, RepositoryError> {
        let posts = PostRepository::new(&self.db);
        let due = posts
            .due_scheduled(timestamp_now(), self.config.batch_size)
            .await?;

        if due.is_empty() {
            return Ok(TickStats::default());
        }

        let mut stats = TickStats::default();
        let mut tenants: HashMap<Uuid, Option<tenant::Model>> = HashMap::new();

        for post in due {
            let post_id = post.id;
            let tenant_id = post.tenant_id;

            let published = match posts.publish_scheduled(post).await {
                Ok(published) => published,
                Err(err) => {
                    stats.failed += 1;
                    error!(post_id = %post_id, error = %err, "Failed to publish scheduled post");
                    continue;
                }
            };
            stats.published += 1;

            // The post is live either way; a failed lookup only skips its webhooks.
            if !tenants.contains_key(&tenant_id) {
                let tenant = match TenantRepository::new(&self.db).find_by_id(tenant_id).await {
                    Ok(tenant) => tenant,
                    Err(err) => {
                        error!(
                            tenant_id = %tenant_id,
                            error = %err,
                            "Failed to load tenant of published post"
                        );
                        None
                    }
                };
                tenants.insert(tenant_id, tenant);
            }

            match tenants.get(&tenant_id) {
                Some(Some(tenant)) => self.webhooks.dispatch(
                    tenant.clone(),
                    EVENT_POST_PUBLISHED,
                    post_published_data(&published),
                ),
                _ => warn!(
                    tenant_id = %tenant_id,
                    post_id = %post_id,
                    "Skipping post.published webhooks; tenant not loaded"
                ),
            }
        }

        for tenant_id in tenants.keys() {
            self.timeline.invalidate_tenant(*tenant_id);
        }

        counter!("publisher_posts_published_total").increment(stats.published);
        debug!(
            published = stats.published,
            failed = stats.failed,
            "Publisher tick completed"
        );

        Ok(stats)
    }
}
