//! # Security Service
//!
//! Failed-login throttling and temporary IP blocks.

use chrono::Duration;
use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::error::RepositoryError;
use crate::models::{blocked_ip, timestamp_now};
use crate::repositories::SecurityRepository;

const BLOCK_REASON: &str = "too many failed login attempts";

/// What a failed login led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still under the threshold; `remaining` more failures trigger a block
    Counted { remaining: u64 },
    Blocked { retry_after_seconds: u64 },
}

pub struct SecurityService {
    db: DatabaseConnection,
    config: SecurityConfig,
}

impl SecurityService {
    pub fn new(db: DatabaseConnection, config: SecurityConfig) -> Self {
        Self { db, config }
    }

    /// Seconds left on an active block for `ip`; expired blocks are removed.
    pub async fn block_remaining(&self, ip: &str) -> Result<Option<u64>, RepositoryError> {
        let repo = SecurityRepository::new(&self.db);
        let Some(block) = repo.find_block(ip).await? else {
            return Ok(None);
        };

        let now = timestamp_now();
        if block.blocked_until <= now {
            repo.delete_block(ip).await?;
            tracing::debug!(ip = %ip, "Removed expired IP block");
            return Ok(None);
        }

        Ok(Some(seconds_until(&block, now)))
    }

    /// Records a failed login and blocks the address once the window holds
    /// `max_failed_attempts` failures.
    pub async fn record_failed_login(
        &self,
        tenant_id: Option<Uuid>,
        ip: &str,
        email: &str,
    ) -> Result<FailureOutcome, RepositoryError> {
        let repo = SecurityRepository::new(&self.db);
        let now = timestamp_now();

        repo.record_failure(tenant_id, ip, email, now).await?;
        metrics::counter!("security_failed_logins_total").increment(1);

        let since = now - Duration::minutes(self.config.window_minutes);
        let failures = repo.count_failures_since(ip, since).await?;

        if failures < self.config.max_failed_attempts {
            return Ok(FailureOutcome::Counted {
                remaining: self.config.max_failed_attempts - failures,
            });
        }

        let until = now + Duration::minutes(self.config.block_minutes);
        let block = repo.upsert_block(ip, BLOCK_REASON, until).await?;

        tracing::warn!(
            ip = %ip,
            failures,
            blocked_until = %block.blocked_until,
            "Blocking IP after repeated failed logins"
        );
        metrics::counter!("security_ip_blocks_total").increment(1);

        Ok(FailureOutcome::Blocked {
            retry_after_seconds: seconds_until(&block, now),
        })
    }

    /// Forgets the address's failures for `email` after a successful login.
    pub async fn record_successful_login(&self, ip: &str, email: &str) -> Result<(), RepositoryError> {
        let cleared = SecurityRepository::new(&self.db)
            .clear_failures(ip, email)
            .await?;
        if cleared > 0 {
            tracing::debug!(ip = %ip, cleared, "Cleared failed login attempts");
        }
        Ok(())
    }

    pub async fn active_blocks(&self) -> Result<Vec<blocked_ip::Model>, RepositoryError> {
        let repo = SecurityRepository::new(&self.db);
        let now = timestamp_now();

        let pruned = repo.prune_expired(now).await?;
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired IP blocks");
        }

        repo.active_blocks(now).await
    }

    /// Lifts a block and starts the address's failure count afresh; false
    /// when the address was not blocked.
    pub async fn unblock(&self, ip: &str) -> Result<bool, RepositoryError> {
        let repo = SecurityRepository::new(&self.db);
        if !repo.delete_block(ip).await? {
            return Ok(false);
        }

        let cleared = repo.clear_failures_for_ip(ip).await?;
        tracing::info!(ip = %ip, cleared, "IP unblocked");
        Ok(true)
    }
}

fn seconds_until(block: &blocked_ip::Model, now: sea_orm::prelude::DateTimeWithTimeZone) -> u64 {
    let remaining = block.blocked_until.signed_duration_since(now);
    // Rounded up to whole seconds.
    let millis = remaining.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_until(offset: Duration) -> (blocked_ip::Model, sea_orm::prelude::DateTimeWithTimeZone) {
        let now = timestamp_now();
        let block = blocked_ip::Model {
            id: Uuid::new_v4(),
            ip_address: "203.0.113.9".to_string(),
            reason: BLOCK_REASON.to_string(),
            blocked_until: now + offset,
            created_at: now,
        };
        (block, now)
    }

    #[test]
    fn remaining_seconds_round_up() {
        let (block, now) = block_until(Duration::milliseconds(1500));
        assert_eq!(seconds_until(&block, now), 2);

        let (block, now) = block_until(Duration::minutes(30));
        assert_eq!(seconds_until(&block, now), 1800);
    }

    #[test]
    fn remaining_seconds_never_reports_zero() {
        let (block, now) = block_until(Duration::milliseconds(1));
        assert_eq!(seconds_until(&block, now), 1);
    }
}
