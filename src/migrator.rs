#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;


/// sea-query's SQLite DDL builder panics on decimal precision above 16;
/// SQLite ignores declared precision anyway, so emit a plain decimal there
/// and keep the declared (precision, scale) on other backends.
pub(crate) fn decimal_type(manager: &SchemaManager, precision: u32, scale: u32) -> ColumnType {
    if manager.get_database_backend() == sea_orm::DbBackend::Sqlite {
        ColumnType::Decimal(None)
    } else {
        ColumnType::Decimal(Some((precision, scale)))
    }
}

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240201_000001_create_reference_tables::Migration),
            Box::new(m20240201_000002_create_stock_movements_table::Migration),
            Box::new(m20240201_000003_create_stock_balances_table::Migration),
            Box::new(m20240201_000004_create_recipe_tables::Migration),
            Box::new(m20240201_000005_create_sales_tables::Migration),
            Box::new(m20240201_000006_create_expenses_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240201_000001_create_reference_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000001_create_reference_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Shops::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Shops::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Shops::Name).string().not_null())
                        .col(
                            ColumnDef::new(Shops::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Shops::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Units::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Units::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Units::Name).string().not_null())
                        .col(ColumnDef::new(Units::Symbol).string().not_null())
                        .col(ColumnDef::new(Units::BaseUnit).string().not_null())
                        .col(
                            ColumnDef::new_with_type(Units::ConversionRate, crate::migrator::decimal_type(manager, 19, 6))
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Units::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Ingredients::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Ingredients::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Ingredients::Name).string().not_null())
                        .col(ColumnDef::new(Ingredients::UnitId).big_integer().not_null())
                        .col(ColumnDef::new(Ingredients::Description).string())
                        .col(
                            ColumnDef::new(Ingredients::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new_with_type(Products::Price, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Ingredients::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Units::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Shops::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Shops {
        Table,
        Id,
        Name,
        Code,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Units {
        Table,
        Id,
        Name,
        Symbol,
        BaseUnit,
        ConversionRate,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Ingredients {
        Table,
        Id,
        Name,
        UnitId,
        Description,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum Products {
        Table,
        Id,
        Name,
        Price,
        CreatedAt,
    }
}

mod m20240201_000002_create_stock_movements_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000002_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ShopId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::IngredientId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::UnitId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new_with_type(StockMovements::Change, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::Reason).string().not_null())
                        .col(
                            ColumnDef::new(StockMovements::Reference)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new_with_type(StockMovements::UnitCost, crate::migrator::decimal_type(manager, 19, 4)))
                        .col(ColumnDef::new_with_type(StockMovements::TotalCost, crate::migrator::decimal_type(manager, 19, 4)))
                        .col(ColumnDef::new(StockMovements::Remark).string())
                        .col(ColumnDef::new(StockMovements::CreatedBy).string())
                        .col(ColumnDef::new(StockMovements::DeletedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_shop_ingredient")
                        .table(StockMovements::Table)
                        .col(StockMovements::ShopId)
                        .col(StockMovements::IngredientId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_created_at")
                        .table(StockMovements::Table)
                        .col(StockMovements::CreatedAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_reason")
                        .table(StockMovements::Table)
                        .col(StockMovements::Reason)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockMovements {
        Table,
        Id,
        ShopId,
        IngredientId,
        UnitId,
        Change,
        Reason,
        Reference,
        UnitCost,
        TotalCost,
        Remark,
        CreatedBy,
        DeletedAt,
        CreatedAt,
    }
}

mod m20240201_000003_create_stock_balances_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000003_create_stock_balances_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBalances::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBalances::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::ShopId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::IngredientId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::UnitId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new_with_type(StockBalances::Stock, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBalances::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_stock_balances_ingredient_shop")
                        .table(StockBalances::Table)
                        .col(StockBalances::IngredientId)
                        .col(StockBalances::ShopId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBalances::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockBalances {
        Table,
        Id,
        ShopId,
        IngredientId,
        UnitId,
        Stock,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000004_create_recipe_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000004_create_recipe_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(RecipeLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RecipeLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(RecipeLines::ShopId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeLines::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeLines::IngredientId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new_with_type(RecipeLines::QuantityRequired, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(RecipeLines::UnitId)
                                .big_integer()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_recipe_lines_shop_product")
                        .table(RecipeLines::Table)
                        .col(RecipeLines::ShopId)
                        .col(RecipeLines::ProductId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(WastageRules::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(WastageRules::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(WastageRules::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WastageRules::IngredientId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WastageRules::UnitId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new_with_type(WastageRules::PerQty, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new_with_type(WastageRules::WastageQty, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(WastageRules::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_wastage_rules_product")
                        .table(WastageRules::Table)
                        .col(WastageRules::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(WastageRules::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RecipeLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum RecipeLines {
        Table,
        Id,
        ShopId,
        ProductId,
        IngredientId,
        QuantityRequired,
        UnitId,
    }

    #[derive(DeriveIden)]
    enum WastageRules {
        Table,
        Id,
        ProductId,
        IngredientId,
        UnitId,
        PerQty,
        WastageQty,
        IsActive,
    }
}

mod m20240201_000005_create_sales_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000005_create_sales_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Sales::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Sales::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Sales::ShopId).big_integer().not_null())
                        .col(
                            ColumnDef::new(Sales::Reference)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(Sales::SoldAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Sales::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sales_shop_sold_at")
                        .table(Sales::Table)
                        .col(Sales::ShopId)
                        .col(Sales::SoldAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaleItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaleItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(SaleItems::SaleId).big_integer().not_null())
                        .col(
                            ColumnDef::new(SaleItems::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new_with_type(SaleItems::Qty, crate::migrator::decimal_type(manager, 19, 4)).not_null())
                        .col(
                            ColumnDef::new_with_type(SaleItems::Price, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sale_items_sale_id")
                        .table(SaleItems::Table)
                        .col(SaleItems::SaleId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaleItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sales::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Sales {
        Table,
        Id,
        ShopId,
        Reference,
        SoldAt,
        CreatedAt,
    }

    #[derive(DeriveIden)]
    enum SaleItems {
        Table,
        Id,
        SaleId,
        ProductId,
        Qty,
        Price,
    }
}

mod m20240201_000006_create_expenses_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000006_create_expenses_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Expenses::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Expenses::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Expenses::ShopId).big_integer().not_null())
                        .col(
                            ColumnDef::new_with_type(Expenses::Amount, crate::migrator::decimal_type(manager, 19, 4))
                                .not_null(),
                        )
                        .col(ColumnDef::new(Expenses::Description).string())
                        .col(
                            ColumnDef::new(Expenses::IncurredAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_expenses_shop_incurred_at")
                        .table(Expenses::Table)
                        .col(Expenses::ShopId)
                        .col(Expenses::IncurredAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Expenses::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Expenses {
        Table,
        Id,
        ShopId,
        Amount,
        Description,
        IncurredAt,
    }
}
