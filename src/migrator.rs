use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_orders_table::Migration),
            Box::new(m20240601_000002_create_order_items_table::Migration),
        ]
    }
}

mod m20240601_000001_create_orders_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(Orders::TotalAmount)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Orders::Currency).string().not_null())
                        .col(ColumnDef::new(Orders::Status).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(ColumnDef::new(Orders::ShippingAddress).text().null())
                        .col(ColumnDef::new(Orders::BillingAddress).text().null())
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(ColumnDef::new(Orders::CheckoutSessionId).string().null())
                        .col(ColumnDef::new(Orders::PaymentIntentId).string().null())
                        .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Orders::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_user_created")
                        .table(Orders::Table)
                        .col(Orders::UserId)
                        .col(Orders::CreatedAt)
                        .if_not_exists()
                        .to_owned(),
                )
                .await?;

            // The reconciler matches succeeded/failed events by intent id.
            manager
                .create_index(
                    Index::create()
                        .name("idx_orders_payment_intent")
                        .table(Orders::Table)
                        .col(Orders::PaymentIntentId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
        UserId,
        TotalAmount,
        Currency,
        Status,
        CustomerEmail,
        CustomerName,
        ShippingAddress,
        BillingAddress,
        Notes,
        CheckoutSessionId,
        PaymentIntentId,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_order_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().null())
                        .col(
                            ColumnDef::new(OrderItems::ExternalProductId)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::ExternalPriceId).string().null())
                        .col(ColumnDef::new(OrderItems::Name).string().not_null())
                        .col(
                            ColumnDef::new(OrderItems::UnitPrice)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ImageUrl).string().null())
                        .col(ColumnDef::new(OrderItems::CreatedAt).timestamp().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_order_items_order")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(Iden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        ProductId,
        ExternalProductId,
        ExternalPriceId,
        Name,
        UnitPrice,
        Quantity,
        ImageUrl,
        CreatedAt,
    }

    #[derive(Iden)]
    enum Orders {
        Table,
        Id,
    }
}
