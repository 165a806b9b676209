//! # Personalization Service
//!
//! Audience-specific homepage content, with the hero copy optionally driven
//! by a running `homepage_hero_<audience>` A/B test.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::ab_testing::AbTestingService;
use crate::models::ab_test;
use crate::repositories::AbTestRepository;

pub const HERO_TEST_PREFIX: &str = "homepage_hero_";
pub const CONTROL_VARIANT: &str = "control";
pub const CTA_GOAL: &str = "cta_click";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    Individual,
    Institutional,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Individual => "individual",
            Audience::Institutional => "institutional",
        }
    }

    pub fn hero_test_name(&self) -> String {
        format!("{HERO_TEST_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Audience::Individual),
            "institutional" => Ok(Audience::Institutional),
            other => Err(format!("unknown audience '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HeroCopy {
    pub title: String,
    pub subtitle: String,
    pub cta: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FeatureHighlight {
    pub key: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HomepageContent {
    pub audience: Audience,
    /// Hero test variant shown, when a hero test is running
    pub variant: Option<String>,
    pub session_id: Option<String>,
    pub hero: HeroCopy,
    pub features: Vec<FeatureHighlight>,
}

fn hero(title: &str, subtitle: &str, cta: &str) -> HeroCopy {
    HeroCopy {
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        cta: cta.to_string(),
    }
}

fn feature(key: &str, title: &str, description: &str) -> FeatureHighlight {
    FeatureHighlight {
        key: key.to_string(),
        title: title.to_string(),
        description: description.to_string(),
    }
}

/// Hero copy for an audience; unknown variants fall back to the default copy.
pub fn hero_copy(audience: Audience, variant: Option<&str>) -> HeroCopy {
    match (audience, variant) {
        (Audience::Individual, Some("career_focus")) => hero(
            "Your next role starts with your alumni network",
            "Get matched to jobs posted by employers who hire from your school.",
            "Find matching jobs",
        ),
        (Audience::Individual, Some("community_focus")) => hero(
            "Never lose touch with your classmates",
            "Join circles, share updates and see what your cohort is up to.",
            "Find your circle",
        ),
        (Audience::Individual, _) => hero(
            "Stay connected with your alumni community",
            "Reconnect with classmates, grow your career and give back.",
            "Join your network",
        ),
        (Audience::Institutional, Some("engagement_focus")) => hero(
            "Turn graduates into lifelong supporters",
            "Measure and grow alumni engagement with timelines, circles and events.",
            "See engagement tools",
        ),
        (Audience::Institutional, Some("outcomes_focus")) => hero(
            "Prove the career outcomes of your programs",
            "Track placements and connect graduates with hiring partners.",
            "Explore outcomes",
        ),
        (Audience::Institutional, _) => hero(
            "The alumni platform built for institutions",
            "Engage graduates, support careers and strengthen your community.",
            "Request a demo",
        ),
    }
}

pub fn feature_highlights(audience: Audience) -> Vec<FeatureHighlight> {
    match audience {
        Audience::Individual => vec![
            feature(
                "timeline",
                "Personal timeline",
                "Posts from your circles and the wider community, ranked for you.",
            ),
            feature(
                "jobs",
                "Job matching",
                "Openings scored against the skills on your profile.",
            ),
            feature(
                "circles",
                "Circles and groups",
                "Private spaces for your cohort, chapter or interest group.",
            ),
        ],
        Audience::Institutional => vec![
            feature(
                "tenancy",
                "Your own branded space",
                "A dedicated tenant on your domain or subdomain.",
            ),
            feature(
                "experiments",
                "Built-in A/B testing",
                "Try messaging variants and compare conversion rates.",
            ),
            feature(
                "integrations",
                "Webhooks and federation",
                "Push events to your systems and publish to ActivityPub and Matrix.",
            ),
        ],
    }
}

pub struct PersonalizationService {
    db: DatabaseConnection,
    ab_testing: Arc<AbTestingService>,
}

impl PersonalizationService {
    pub fn new(db: DatabaseConnection, ab_testing: Arc<AbTestingService>) -> Self {
        Self { db, ab_testing }
    }

    async fn hero_test(&self, tenant_id: Uuid, audience: Audience) -> Option<ab_test::Model> {
        match AbTestRepository::new(&self.db)
            .find_by_name(tenant_id, &audience.hero_test_name())
            .await
        {
            Ok(test) => test.filter(|test| test.is_running()),
            Err(err) => {
                tracing::warn!(error = %err, audience = %audience, "Hero test lookup failed");
                None
            }
        }
    }

    /// Homepage content for `audience`; `subject` drives variant assignment.
    pub async fn homepage(
        &self,
        tenant_id: Uuid,
        audience: Audience,
        subject: &str,
        session_id: Option<String>,
    ) -> HomepageContent {
        let variant = match self.hero_test(tenant_id, audience).await {
            Some(test) => Some(self.ab_testing.variant_for(&test, subject).await),
            None => None,
        };

        let copy_key = variant
            .as_deref()
            .filter(|variant| *variant != CONTROL_VARIANT);

        HomepageContent {
            audience,
            hero: hero_copy(audience, copy_key),
            features: feature_highlights(audience),
            variant,
            session_id,
        }
    }

    /// Records a hero call-to-action click against the running hero test.
    pub async fn track_cta_click(
        &self,
        tenant_id: Uuid,
        audience: Audience,
        subject: &str,
    ) -> Option<String> {
        let test = self.hero_test(tenant_id, audience).await?;
        self.ab_testing
            .convert(&test, subject, Some(CTA_GOAL.to_string()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_parsing() {
        assert_eq!("Institutional".parse::<Audience>(), Ok(Audience::Institutional));
        assert_eq!(" individual ".parse::<Audience>(), Ok(Audience::Individual));
        assert!("alumni".parse::<Audience>().is_err());
        assert_eq!(Audience::default(), Audience::Individual);
    }

    #[test]
    fn hero_test_names_are_per_audience() {
        assert_eq!(Audience::Individual.hero_test_name(), "homepage_hero_individual");
        assert_eq!(
            Audience::Institutional.hero_test_name(),
            "homepage_hero_institutional"
        );
    }

    #[test]
    fn unknown_variants_fall_back_to_default_copy() {
        let default = hero_copy(Audience::Individual, None);
        assert_eq!(hero_copy(Audience::Individual, Some("nonexistent")), default);
        assert_ne!(hero_copy(Audience::Individual, Some("career_focus")), default);
    }

    #[test]
    fn audiences_get_distinct_content() {
        assert_ne!(
            hero_copy(Audience::Individual, None),
            hero_copy(Audience::Institutional, None)
        );
        assert_ne!(
            feature_highlights(Audience::Individual),
            feature_highlights(Audience::Institutional)
        );
    }
}
