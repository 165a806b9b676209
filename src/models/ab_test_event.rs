//! A/B test exposure and conversion events

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

pub const EVENT_EXPOSURE: &str = "exposure";
pub const EVENT_CONVERSION: &str = "conversion";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "ab_test_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub test_id: Uuid,
    pub variant: String,
    /// User id or anonymous session id
    pub subject_id: String,
    pub event_type: String,
    pub goal: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ab_test::Entity",
        from = "Column::TestId",
        to = "super::ab_test::Column::Id"
    )]
    Test,
}

impl Related<super::ab_test::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Test.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
