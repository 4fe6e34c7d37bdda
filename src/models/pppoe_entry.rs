use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pppoe_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub platform_id: i64,
    /// Internal host of the station terminating this PPPoE session
    pub station: String,
    pub client_name: String,
    #[serde(skip_serializing)]
    pub client_password: String,
    pub profile: String,
    pub plan_id: Option<i64>,
    /// active | disabled
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pppoe_plan::Entity",
        from = "Column::PlanId",
        to = "super::pppoe_plan::Column::Id"
    )]
    Plan,
}

impl Related<super::pppoe_plan::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Plan.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
