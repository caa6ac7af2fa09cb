use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Servers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Servers::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Servers::Host).string_len(255).not_null())
                    .col(ColumnDef::new(Servers::Port).integer().not_null())
                    .col(ColumnDef::new(Servers::Password).string_len(255).not_null())
                    .col(ColumnDef::new(Servers::CreatedAt).string().not_null())
                    .col(ColumnDef::new(Servers::UpdatedAt).string().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Servers::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Servers {
    Table,
    Id,
    Host,
    Port,
    Password,
    CreatedAt,
    UpdatedAt,
}
