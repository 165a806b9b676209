//! Job posting entity model

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "job_postings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub employer_id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub location: Option<String>,
    pub required_skills: JsonValue,
    pub preferred_skills: JsonValue,
    /// `open` or `closed`
    pub status: String,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn required_skill_list(&self) -> Vec<String> {
        super::json_string_list(&self.required_skills)
    }

    pub fn preferred_skill_list(&self) -> Vec<String> {
        super::json_string_list(&self.preferred_skills)
    }

    pub fn is_open(&self) -> bool {
        self.status == JOB_STATUS_OPEN
    }
}

pub const JOB_STATUS_OPEN: &str = "open";
pub const JOB_STATUS_CLOSED: &str = "closed";

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_match_score::Entity")]
    MatchScores,
}

impl Related<super::job_match_score::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MatchScores.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
