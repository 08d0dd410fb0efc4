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
                    .table(CreditTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CreditTransactions::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CreditTransactions::UserId).integer())
                    .col(
                        ColumnDef::new(CreditTransactions::Delta)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditTransactions::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(CreditTransactions::Reason)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(CreditTransactions::ProviderSlug).string_len(100))
                    .col(ColumnDef::new(CreditTransactions::ModelSlug).string_len(100))
                    .col(ColumnDef::new(CreditTransactions::Metadata).json())
                    .col(
                        ColumnDef::new(CreditTransactions::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(CreditTransactions::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_credit_transactions_user_id")
                            .from(CreditTransactions::Table, CreditTransactions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        // 用户交易历史查询
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_transactions_user_created")
                    .table(CreditTransactions::Table)
                    .col(CreditTransactions::UserId)
                    .col(CreditTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // 对账任务扫描长时间 pending 的交易
        manager
            .create_index(
                Index::create()
                    .name("idx_credit_transactions_status_created")
                    .table(CreditTransactions::Table)
                    .col(CreditTransactions::Status)
                    .col(CreditTransactions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditTransactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CreditTransactions {
    Table,
    Id,
    UserId,
    Delta,
    Status,
    Reason,
    ProviderSlug,
    ModelSlug,
    Metadata,
    CreatedAt,
    UpdatedAt,
}
