//! Initial schema migration - creates all tables for Netpilot
//!
//! This migration creates the complete database schema including:
//! - Platforms and platform users (platforms, platform_users)
//! - Managed stations with tunnel and RADIUS identity (stations)
//! - Service packages and subscribers (packages, subscribers)
//! - PPPoE plans and entries (pppoe_plans, pppoe_entries)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // =====================================================================
        // Platforms & users
        // =====================================================================

        manager
            .create_table(
                Table::create()
                    .table(Platforms::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Platforms::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Platforms::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Platforms::CreatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PlatformUsers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PlatformUsers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::PlatformId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::Email)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::HashedPassword)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::IsSuperuser)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::CreatedAt)
                            .date_time()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PlatformUsers::UpdatedAt)
                            .date_time()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_platform_users_platform")
                            .from(PlatformUsers::Table, PlatformUsers::PlatformId)
                            .to(Platforms::Table, Platforms::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // =====================================================================
        // Stations
        // =====================================================================

        manager
            .create_table(
                Table::create()
                    .table(Stations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Stations::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Stations::PlatformId).big_integer().not_null())
                    .col(ColumnDef::new(Stations::Name).string().not_null())
                    .col(ColumnDef::new(Stations::InternalHost).string().not_null())
                    .col(ColumnDef::new(Stations::PublicHost).string().null())
                    .col(ColumnDef::new(Stations::DdnsHostname).string().null())
                    .col(ColumnDef::new(Stations::TunnelPublicKey).string().null())
                    .col(
                        ColumnDef::new(Stations::SystemBasis)
                            .string_len(16)
                            .not_null()
                            .default("api"),
                    )
                    .col(ColumnDef::new(Stations::RadiusClientName).string().null())
                    .col(ColumnDef::new(Stations::RadiusClientSecret).string().null())
                    .col(ColumnDef::new(Stations::RadiusClientIp).string().null())
                    .col(ColumnDef::new(Stations::RadiusServerIp).string().null())
                    .col(ColumnDef::new(Stations::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Stations::UpdatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stations_platform")
                            .from(Stations::Table, Stations::PlatformId)
                            .to(Platforms::Table, Platforms::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stations_platform")
                    .table(Stations::Table)
                    .col(Stations::PlatformId)
                    .to_owned(),
            )
            .await?;

        // Backstop for generation-time uniqueness checks on RADIUS client names
        manager
            .create_index(
                Index::create()
                    .name("idx_stations_radius_client_name")
                    .table(Stations::Table)
                    .col(Stations::PlatformId)
                    .col(Stations::RadiusClientName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // =====================================================================
        // Packages & subscribers
        // =====================================================================

        manager
            .create_table(
                Table::create()
                    .table(Packages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Packages::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Packages::PlatformId).big_integer().not_null())
                    .col(ColumnDef::new(Packages::Name).string().not_null())
                    .col(ColumnDef::new(Packages::RouterHost).string().not_null())
                    .col(ColumnDef::new(Packages::Speed).integer().not_null())
                    .col(ColumnDef::new(Packages::Period).integer().not_null())
                    .col(ColumnDef::new(Packages::Usage).string().not_null())
                    .col(ColumnDef::new(Packages::Category).string().not_null())
                    .col(
                        ColumnDef::new(Packages::Devices)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(ColumnDef::new(Packages::Pool).string().null())
                    .col(ColumnDef::new(Packages::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Packages::UpdatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_packages_platform")
                            .from(Packages::Table, Packages::PlatformId)
                            .to(Platforms::Table, Platforms::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_packages_router_host")
                    .table(Packages::Table)
                    .col(Packages::RouterHost)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subscribers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Subscribers::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Subscribers::PlatformId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Subscribers::Username).string().not_null())
                    .col(ColumnDef::new(Subscribers::Password).string().not_null())
                    .col(
                        ColumnDef::new(Subscribers::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Subscribers::PackageId).big_integer().not_null())
                    .col(ColumnDef::new(Subscribers::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(Subscribers::UpdatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscribers_package")
                            .from(Subscribers::Table, Subscribers::PackageId)
                            .to(Packages::Table, Packages::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_subscribers_package")
                    .table(Subscribers::Table)
                    .col(Subscribers::PackageId)
                    .to_owned(),
            )
            .await?;

        // =====================================================================
        // PPPoE
        // =====================================================================

        manager
            .create_table(
                Table::create()
                    .table(PppoePlans::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PppoePlans::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PppoePlans::PlatformId).big_integer().not_null())
                    .col(ColumnDef::new(PppoePlans::Name).string().not_null())
                    .col(ColumnDef::new(PppoePlans::Profile).string().not_null())
                    .col(ColumnDef::new(PppoePlans::CreatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PppoeEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PppoeEntries::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PppoeEntries::PlatformId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PppoeEntries::Station).string().not_null())
                    .col(ColumnDef::new(PppoeEntries::ClientName).string().not_null())
                    .col(
                        ColumnDef::new(PppoeEntries::ClientPassword)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PppoeEntries::Profile).string().not_null())
                    .col(ColumnDef::new(PppoeEntries::PlanId).big_integer().null())
                    .col(
                        ColumnDef::new(PppoeEntries::Status)
                            .string()
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(PppoeEntries::CreatedAt).date_time().not_null())
                    .col(ColumnDef::new(PppoeEntries::UpdatedAt).date_time().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pppoe_entries_station")
                    .table(PppoeEntries::Table)
                    .col(PppoeEntries::Station)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PppoeEntries::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PppoePlans::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Subscribers::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Packages::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Stations::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PlatformUsers::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Platforms::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
#[iden = "platforms"]
enum Platforms {
    Table,
    Id,
    Name,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
#[iden = "platform_users"]
enum PlatformUsers {
    Table,
    Id,
    #[iden = "platform_id"]
    PlatformId,
    Username,
    Email,
    #[iden = "hashed_password"]
    HashedPassword,
    #[iden = "is_active"]
    IsActive,
    #[iden = "is_superuser"]
    IsSuperuser,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
#[iden = "stations"]
enum Stations {
    Table,
    Id,
    #[iden = "platform_id"]
    PlatformId,
    Name,
    #[iden = "internal_host"]
    InternalHost,
    #[iden = "public_host"]
    PublicHost,
    #[iden = "ddns_hostname"]
    DdnsHostname,
    #[iden = "tunnel_public_key"]
    TunnelPublicKey,
    #[iden = "system_basis"]
    SystemBasis,
    #[iden = "radius_client_name"]
    RadiusClientName,
    #[iden = "radius_client_secret"]
    RadiusClientSecret,
    #[iden = "radius_client_ip"]
    RadiusClientIp,
    #[iden = "radius_server_ip"]
    RadiusServerIp,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
#[iden = "packages"]
enum Packages {
    Table,
    Id,
    #[iden = "platform_id"]
    PlatformId,
    Name,
    #[iden = "router_host"]
    RouterHost,
    Speed,
    Period,
    Usage,
    Category,
    Devices,
    Pool,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
#[iden = "subscribers"]
enum Subscribers {
    Table,
    Id,
    #[iden = "platform_id"]
    PlatformId,
    Username,
    Password,
    Status,
    #[iden = "package_id"]
    PackageId,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}

#[derive(Iden)]
#[iden = "pppoe_plans"]
enum PppoePlans {
    Table,
    Id,
    #[iden = "platform_id"]
    PlatformId,
    Name,
    Profile,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
#[iden = "pppoe_entries"]
enum PppoeEntries {
    Table,
    Id,
    #[iden = "platform_id"]
    PlatformId,
    Station,
    #[iden = "client_name"]
    ClientName,
    #[iden = "client_password"]
    ClientPassword,
    Profile,
    #[iden = "plan_id"]
    PlanId,
    Status,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}
