//! # A/B Testing Service
//!
//! Deterministic weighted variant assignment, exposure and conversion
//! tracking, and per-variant results.
//!
//! Tracking is best-effort: a failed write is logged and never surfaces to
//! the caller.

use std::collections::HashSet;
use std::time::Duration;

use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::AbTestingConfig;
use crate::error::{FieldErrors, RepositoryError};
use crate::models::ab_test::{self, Variant};
use crate::models::ab_test_event::{EVENT_CONVERSION, EVENT_EXPOSURE};
use crate::repositories::ab_test::NewAbTestEvent;
use crate::repositories::AbTestRepository;

const ASSIGNMENT_CACHE_CAPACITY: u64 = 100_000;
pub const MIN_VARIANTS: usize = 2;

/// Variant names are label-like: letters, digits, `_` and `-`.
const MAX_VARIANT_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AssignmentKey {
    tenant_id: Uuid,
    test_id: Uuid,
    subject: String,
}

/// Per-variant tallies.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VariantResult {
    pub variant: String,
    pub weight: u32,
    pub exposures: u64,
    pub conversions: u64,
    /// conversions / exposures, 0 without exposures
    pub conversion_rate: f64,
}

/// Picks the variant for `subject`.
///
/// The first 8 bytes of SHA-256(`"<test name>:<subject>"`), read big-endian,
/// modulo the total weight select a slot in the cumulative weight ranges.
/// With unit weights this is exactly `hash mod variant_count`.
pub fn assign_variant<'v>(test_name: &str, subject: &str, variants: &'v [Variant]) -> Option<&'v Variant> {
    let total: u64 = variants.iter().map(|variant| u64::from(variant.weight)).sum();
    if total == 0 {
        return variants.first();
    }

    let digest = Sha256::digest(format!("{test_name}:{subject}").as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let bucket = u64::from_be_bytes(prefix) % total;

    let mut upper = 0u64;
    variants.iter().find(|variant| {
        upper += u64::from(variant.weight);
        bucket < upper
    })
}

/// Validates a variant list for a new test.
pub fn validate_variants(variants: &[Variant], errors: &mut FieldErrors) {
    if variants.len() < MIN_VARIANTS {
        errors.add("variants", "At least two variants are required.");
    }

    let mut seen = HashSet::new();
    for variant in variants {
        let name = variant.name.trim();
        if name.is_empty()
            || name.len() > MAX_VARIANT_NAME_LEN
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            errors.add(
                "variants",
                format!("Variant name '{}' is invalid.", variant.name),
            );
        }
        if variant.weight == 0 {
            errors.add(
                "variants",
                format!("Variant '{}' must have a weight of at least 1.", variant.name),
            );
        }
        if !seen.insert(name.to_string()) {
            errors.add("variants", format!("Variant '{name}' is declared twice."));
        }
    }
}

pub struct AbTestingService {
    db: DatabaseConnection,
    assignments: Cache<AssignmentKey, String>,
}

impl AbTestingService {
    pub fn new(db: DatabaseConnection, config: &AbTestingConfig) -> Self {
        let assignments = Cache::builder()
            .max_capacity(ASSIGNMENT_CACHE_CAPACITY)
            .time_to_live(Duration::from_secs(config.assignment_cache_ttl_seconds))
            .build();

        Self { db, assignments }
    }

    /// Variant shown to `subject`, recording an exposure the first time the
    /// assignment is made. Tests that are not running always yield the
    /// control (first) variant and record nothing.
    pub async fn variant_for(&self, test: &ab_test::Model, subject: &str) -> String {
        let variants = test.variant_list();
        let control = variants
            .first()
            .map(|variant| variant.name.clone())
            .unwrap_or_default();

        if !test.is_running() {
            return control;
        }

        let key = AssignmentKey {
            tenant_id: test.tenant_id,
            test_id: test.id,
            subject: subject.to_string(),
        };

        if let Some(variant) = self.assignments.get(&key).await {
            return variant;
        }

        let variant = assign_variant(&test.name, subject, &variants)
            .map(|variant| variant.name.clone())
            .unwrap_or(control);

        self.assignments.insert(key, variant.clone()).await;
        self.track(test, &variant, subject, EVENT_EXPOSURE, None).await;

        variant
    }

    /// Records a conversion for the subject's variant. Returns the variant, or
    /// `None` when the test is not running.
    pub async fn convert(
        &self,
        test: &ab_test::Model,
        subject: &str,
        goal: Option<String>,
    ) -> Option<String> {
        if !test.is_running() {
            return None;
        }

        let variant = self.variant_for(test, subject).await;
        self.track(test, &variant, subject, EVENT_CONVERSION, goal).await;
        Some(variant)
    }

    async fn track(
        &self,
        test: &ab_test::Model,
        variant: &str,
        subject: &str,
        event_type: &'static str,
        goal: Option<String>,
    ) {
        let result = AbTestRepository::new(&self.db)
            .record_event(NewAbTestEvent {
                tenant_id: test.tenant_id,
                test_id: test.id,
                variant: variant.to_string(),
                subject_id: subject.to_string(),
                event_type,
                goal,
            })
            .await;

        match result {
            Ok(()) => metrics::counter!("ab_test_events_total").increment(1),
            Err(err) => {
                tracing::warn!(
                    test = %test.name,
                    variant = %variant,
                    event_type,
                    error = %err,
                    "Failed to record A/B test event"
                );
            }
        }
    }

    /// Exposures, conversions and conversion rate per declared variant.
    pub async fn results(&self, test: &ab_test::Model) -> Result<Vec<VariantResult>, RepositoryError> {
        let counts = AbTestRepository::new(&self.db).event_counts(test.id).await?;

        let tally = |variant: &str, event_type: &str| -> u64 {
            counts
                .iter()
                .filter(|count| count.variant == variant && count.event_type == event_type)
                .map(|count| count.total.max(0) as u64)
                .sum()
        };

        Ok(test
            .variant_list()
            .into_iter()
            .map(|variant| {
                let exposures = tally(&variant.name, EVENT_EXPOSURE);
                let conversions = tally(&variant.name, EVENT_CONVERSION);
                let conversion_rate = if exposures == 0 {
                    0.0
                } else {
                    super::timeline::round_to(conversions as f64 / exposures as f64, 4)
                };
                VariantResult {
                    variant: variant.name,
                    weight: variant.weight,
                    exposures,
                    conversions,
                    conversion_rate,
                }
            })
            .collect())
    }

    /// Drops cached assignments of one test, e.g. after it is restarted.
    pub async fn forget_test(&self, test_id: Uuid) {
        let keys: Vec<AssignmentKey> = self
            .assignments
            .iter()
            .filter(|(key, _)| key.test_id == test_id)
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys {
            self.assignments.invalidate(&key).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(spec: &[(&str, u32)]) -> Vec<Variant> {
        spec.iter()
            .map(|(name, weight)| Variant {
                name: name.to_string(),
                weight: *weight,
            })
            .collect()
    }

    #[test]
    fn assignment_is_deterministic() {
        let variants = variants(&[("control", 1), ("bold", 1)]);
        let first = assign_variant("hero", "user-42", &variants).unwrap();
        for _ in 0..10 {
            assert_eq!(assign_variant("hero", "user-42", &variants).unwrap(), first);
        }
    }

    #[test]
    fn unit_weights_reduce_to_hash_mod_count() {
        let variants = variants(&[("a", 1), ("b", 1), ("c", 1)]);
        for subject in ["s1", "s2", "s3", "s4", "s5", "s6"] {
            let digest = Sha256::digest(format!("exp:{subject}").as_bytes());
            let mut prefix = [0u8; 8];
            prefix.copy_from_slice(&digest[..8]);
            let expected = (u64::from_be_bytes(prefix) % 3) as usize;

            assert_eq!(
                assign_variant("exp", subject, &variants).unwrap().name,
                variants[expected].name
            );
        }
    }

    #[test]
    fn weights_skew_the_split() {
        let variants = variants(&[("control", 1), ("treatment", 9)]);
        let treatment = (0..2000)
            .filter(|i| assign_variant("skew", &format!("subject-{i}"), &variants).unwrap().name == "treatment")
            .count();

        // Expect ~90%; generous bounds keep this stable.
        assert!((1650..=1950).contains(&treatment), "treatment = {treatment}");
    }

    #[test]
    fn both_variants_are_reachable() {
        let variants = variants(&[("control", 1), ("bold", 1)]);
        let names: HashSet<String> = (0..100)
            .map(|i| assign_variant("hero", &i.to_string(), &variants).unwrap().name.clone())
            .collect();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn variant_validation() {
        let mut errors = FieldErrors::new();
        validate_variants(&variants(&[("control", 1)]), &mut errors);
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::new();
        validate_variants(&variants(&[("control", 1), ("control", 2)]), &mut errors);
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::new();
        validate_variants(&variants(&[("control", 1), ("bold", 0)]), &mut errors);
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::new();
        validate_variants(&variants(&[("control", 1), ("bold copy", 1)]), &mut errors);
        assert!(!errors.is_empty());

        let mut errors = FieldErrors::new();
        validate_variants(&variants(&[("control", 1), ("bold", 3)]), &mut errors);
        assert!(errors.is_empty());
    }
}
