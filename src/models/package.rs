use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "packages")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub platform_id: i64,
    pub name: String,
    /// Internal host of the station this package is served from
    pub router_host: String,
    /// Download/upload speed in Mbps (symmetric)
    pub speed: i32,
    /// Validity period in days
    pub period: i32,
    /// Data allowance, e.g. "10 GB" or "Unlimited"
    pub usage: String,
    /// hotspot | data | homefibre
    pub category: String,
    /// Shared-device cap for the router profile
    pub devices: i32,
    /// Router address pool; required on API basis except for homefibre
    pub pool: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::platform::Entity",
        from = "Column::PlatformId",
        to = "super::platform::Column::Id"
    )]
    Platform,
    #[sea_orm(has_many = "super::subscriber::Entity")]
    Subscribers,
}

impl Related<super::subscriber::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscribers.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
