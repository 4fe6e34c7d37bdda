use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Authentication backend governing subscriber sessions on a station
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum SystemBasis {
    /// Router-local profiles and users
    #[sea_orm(string_value = "api")]
    #[serde(rename = "api")]
    Api,
    /// Centralized RADIUS AAA
    #[sea_orm(string_value = "radius")]
    #[serde(rename = "radius")]
    Radius,
}

impl std::fmt::Display for SystemBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemBasis::Api => write!(f, "api"),
            SystemBasis::Radius => write!(f, "radius"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub platform_id: i64,
    pub name: String,
    /// Tunnel-internal address; becomes the peer's /32 allowed-IP
    pub internal_host: String,
    pub public_host: Option<String>,
    pub ddns_hostname: Option<String>,
    pub tunnel_public_key: Option<String>,
    pub system_basis: SystemBasis,
    /// RADIUS identity; populated by migration, unique per platform
    pub radius_client_name: Option<String>,
    #[serde(skip_serializing)]
    pub radius_client_secret: Option<String>,
    pub radius_client_ip: Option<String>,
    pub radius_server_ip: Option<String>,
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
}

impl Related<super::platform::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Platform.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
