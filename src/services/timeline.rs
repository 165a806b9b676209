//! # Timeline Service
//!
//! Ranks the posts a user can see by a decaying recency score plus damped
//! engagement, and pages through the ranking with an opaque cursor. Rendered
//! pages are cached briefly per (tenant, user, cursor, limit).

use std::cmp::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::future::Cache;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::TimelineConfig;
use crate::cursor::TimelineCursor;
use crate::error::ApiError;
use crate::models::post;
use crate::repositories::post::CandidateQuery;
use crate::repositories::{CircleRepository, PostRepository};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 50;

const CACHE_CAPACITY: u64 = 50_000;

#[derive(Debug, Clone)]
pub struct ScoredPost {
    pub post: post::Model,
    pub score: f64,
}

impl ScoredPost {
    fn published_at(&self) -> DateTime<Utc> {
        self.post
            .published_at
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Ranking order: score desc, then published_at desc, then id desc.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| other.published_at().cmp(&self.published_at()))
            .then_with(|| other.post.id.cmp(&self.post.id))
    }

    /// Whether this entry ranks strictly after the cursor position.
    fn is_after(&self, cursor: &TimelineCursor) -> bool {
        match self.score.total_cmp(&cursor.score) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => match self.published_at().cmp(&cursor.published_at) {
                Ordering::Less => true,
                Ordering::Greater => false,
                Ordering::Equal => self.post.id < cursor.id,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimelinePage {
    pub entries: Vec<ScoredPost>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    tenant_id: Uuid,
    user_id: Uuid,
    cursor: Option<String>,
    limit: u64,
}

pub struct TimelineService {
    db: DatabaseConnection,
    config: TimelineConfig,
    cache: Cache<PageKey, TimelinePage>,
}

impl TimelineService {
    pub fn new(db: DatabaseConnection, config: TimelineConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .support_invalidation_closures()
            .build();

        Self { db, config, cache }
    }

    /// Relevance of a post at `as_of`, rounded to 4 decimals.
    pub fn score(&self, post: &post::Model, as_of: DateTime<Utc>) -> f64 {
        relevance_score(post, as_of, &self.config)
    }

    /// One page of the user's timeline.
    pub async fn page(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        cursor: Option<&str>,
        limit: u64,
    ) -> Result<TimelinePage, ApiError> {
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let position = cursor.map(TimelineCursor::decode).transpose()?;

        let key = PageKey {
            tenant_id,
            user_id,
            cursor: cursor.map(str::to_string),
            limit,
        };

        if let Some(page) = self.cache.get(&key).await {
            metrics::counter!("timeline_cache_hits_total").increment(1);
            return Ok(page);
        }
        metrics::counter!("timeline_cache_misses_total").increment(1);

        let page = self
            .build_page(tenant_id, user_id, position.as_ref(), limit)
            .await?;
        self.cache.insert(key, page.clone()).await;

        Ok(page)
    }

    async fn build_page(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        position: Option<&TimelineCursor>,
        limit: u64,
    ) -> Result<TimelinePage, ApiError> {
        let as_of = position.map(|cursor| cursor.as_of).unwrap_or_else(Utc::now);

        let circle_ids = CircleRepository::new(&self.db)
            .member_circle_ids(tenant_id, user_id)
            .await?;

        let candidates = PostRepository::new(&self.db)
            .timeline_candidates(CandidateQuery {
                tenant_id,
                viewer_id: user_id,
                circle_ids,
                published_after: (as_of - chrono::Duration::days(self.config.window_days))
                    .fixed_offset(),
                published_before: as_of.fixed_offset(),
                limit: self.config.max_candidates,
            })
            .await?;

        let ranked = rank(candidates, as_of, &self.config);

        let mut entries: Vec<ScoredPost> = ranked
            .into_iter()
            .filter(|entry| position.is_none_or(|cursor| entry.is_after(cursor)))
            .take(limit as usize + 1)
            .collect();

        let has_more = entries.len() > limit as usize;
        entries.truncate(limit as usize);

        let next_cursor = if has_more {
            entries.last().map(|last| {
                TimelineCursor {
                    as_of,
                    score: last.score,
                    published_at: last.published_at(),
                    id: last.post.id,
                }
                .encode()
            })
        } else {
            None
        };

        Ok(TimelinePage {
            entries,
            next_cursor,
            has_more,
        })
    }

    /// Drops every cached page of the tenant.
    pub fn invalidate_tenant(&self, tenant_id: Uuid) {
        if let Err(err) = self
            .cache
            .invalidate_entries_if(move |key, _| key.tenant_id == tenant_id)
        {
            tracing::warn!(tenant_id = %tenant_id, error = %err, "Failed to invalidate timeline cache");
        }
    }
}

/// Scores and orders candidates at a fixed instant.
pub fn rank(posts: Vec<post::Model>, as_of: DateTime<Utc>, config: &TimelineConfig) -> Vec<ScoredPost> {
    let mut scored: Vec<ScoredPost> = posts
        .into_iter()
        .map(|post| {
            let score = relevance_score(&post, as_of, config);
            ScoredPost { post, score }
        })
        .collect();

    scored.sort_by(ScoredPost::rank_cmp);
    scored
}

/// `100 * 0.5^(age_hours / half_life) + weight * ln(1 + likes + 2*comments + 3*shares)`
pub fn relevance_score(post: &post::Model, as_of: DateTime<Utc>, config: &TimelineConfig) -> f64 {
    let age_hours = post
        .published_at
        .map(|published_at| {
            let age = as_of.signed_duration_since(published_at.with_timezone(&Utc));
            (age.num_milliseconds() as f64 / 3_600_000.0).max(0.0)
        })
        .unwrap_or(0.0);

    let recency = 100.0 * 0.5_f64.powf(age_hours / config.half_life_hours);

    let interactions = f64::from(post.likes_count.max(0))
        + 2.0 * f64::from(post.comments_count.max(0))
        + 3.0 * f64::from(post.shares_count.max(0));
    let engagement = config.engagement_weight * interactions.ln_1p();

    round_to(recency + engagement, 4)
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round() / factor
}
