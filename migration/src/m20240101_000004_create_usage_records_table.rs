use sea_orm_migration::prelude::*;

use super::m20240101_000001_create_users_table::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UsageRecords::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UsageRecords::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UsageRecords::RequestId)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(UsageRecords::Kind).string_len(50).not_null())
                    .col(
                        ColumnDef::new(UsageRecords::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(UsageRecords::UserId).integer())
                    .col(ColumnDef::new(UsageRecords::ProviderSlug).string_len(100))
                    .col(ColumnDef::new(UsageRecords::ModelSlug).string_len(100))
                    // === 调用统计 ===
                    .col(ColumnDef::new(UsageRecords::DurationMs).big_integer())
                    .col(ColumnDef::new(UsageRecords::InputTokens).big_integer())
                    .col(ColumnDef::new(UsageRecords::OutputTokens).big_integer())
                    .col(ColumnDef::new(UsageRecords::Cost).big_integer())
                    .col(ColumnDef::new(UsageRecords::ErrorMessage).text())
                    .col(
                        ColumnDef::new(UsageRecords::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UsageRecords::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_usage_records_user_id")
                            .from(UsageRecords::Table, UsageRecords::UserId)
                            .to(Users::Table, Users::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_usage_records_user_created")
                    .table(UsageRecords::Table)
                    .col(UsageRecords::UserId)
                    .col(UsageRecords::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UsageRecords::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UsageRecords {
    Table,
    Id,
    RequestId,
    Kind,
    Status,
    UserId,
    ProviderSlug,
    ModelSlug,
    DurationMs,
    InputTokens,
    OutputTokens,
    Cost,
    ErrorMessage,
    CreatedAt,
    UpdatedAt,
}
