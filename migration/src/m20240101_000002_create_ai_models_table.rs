use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AiModels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AiModels::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AiModels::ProviderSlug)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AiModels::ModelSlug)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(AiModels::DisplayName).string_len(200))
                    .col(ColumnDef::new(AiModels::Pricing).json().not_null())
                    .col(
                        ColumnDef::new(AiModels::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(AiModels::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(AiModels::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // 每个提供商的每个模型只有一条定价记录
        manager
            .create_index(
                Index::create()
                    .name("idx_ai_models_provider_model")
                    .table(AiModels::Table)
                    .col(AiModels::ProviderSlug)
                    .col(AiModels::ModelSlug)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AiModels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AiModels {
    Table,
    Id,
    ProviderSlug,
    ModelSlug,
    DisplayName,
    Pricing,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
