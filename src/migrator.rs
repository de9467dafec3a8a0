use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_products_table::Migration),
            Box::new(m20240101_000002_create_purchase_orders_table::Migration),
            Box::new(m20240101_000003_create_purchase_order_items_table::Migration),
            Box::new(m20240101_000004_create_receiving_workflows_table::Migration),
            Box::new(m20240101_000005_create_inventory_lots_table::Migration),
            Box::new(m20240101_000006_create_inventory_reservations_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Products::Sku)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(
                            ColumnDef::new(Products::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Products::ReorderPoint).integer().null())
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_stock_quantity")
                        .table(Products::Table)
                        .col(Products::StockQuantity)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Sku,
        Name,
        StockQuantity,
        ReorderPoint,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_purchase_orders_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_purchase_orders_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrders::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrders::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::PoNumber)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(PurchaseOrders::SupplierId).uuid().not_null())
                        .col(ColumnDef::new(PurchaseOrders::Status).string().not_null())
                        .col(
                            ColumnDef::new(PurchaseOrders::SubtotalCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ShippingCostCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CustomsDutyCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::OtherFeesCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::TotalCostCents)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(PurchaseOrders::Notes).string().null())
                        .col(
                            ColumnDef::new(PurchaseOrders::ExpectedDeliveryDate)
                                .date()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::ActualDeliveryDate)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrders::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_supplier_id")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::SupplierId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_orders_status")
                        .table(PurchaseOrders::Table)
                        .col(PurchaseOrders::Status)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrders {
        Table,
        Id,
        PoNumber,
        SupplierId,
        Status,
        SubtotalCents,
        ShippingCostCents,
        CustomsDutyCents,
        OtherFeesCents,
        TotalCostCents,
        Notes,
        ExpectedDeliveryDate,
        ActualDeliveryDate,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_purchase_order_items_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_purchase_order_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PurchaseOrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PurchaseOrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::QuantityOrdered)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::QuantityReceived)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UnitCostCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PurchaseOrderItems::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_purchase_order_items_po_id")
                        .table(PurchaseOrderItems::Table)
                        .col(PurchaseOrderItems::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PurchaseOrderItems::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum PurchaseOrderItems {
        Table,
        Id,
        PurchaseOrderId,
        ProductId,
        QuantityOrdered,
        QuantityReceived,
        UnitCostCents,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_receiving_workflows_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_receiving_workflows_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ReceivingWorkflows::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ReceivingWorkflows::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::PurchaseOrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::Status)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::ReceivedBy)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(ReceivingWorkflows::QcNotes).string().null())
                        .col(
                            ColumnDef::new(ReceivingWorkflows::Discrepancies)
                                .json()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::StartedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::CompletedAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ReceivingWorkflows::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_receiving_workflows_po_id")
                        .table(ReceivingWorkflows::Table)
                        .col(ReceivingWorkflows::PurchaseOrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ReceivingWorkflows::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ReceivingWorkflows {
        Table,
        Id,
        PurchaseOrderId,
        Status,
        ReceivedBy,
        QcNotes,
        Discrepancies,
        StartedAt,
        CompletedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_inventory_lots_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_inventory_lots_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryLots::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLots::ProductId).uuid().not_null())
                        .col(ColumnDef::new(InventoryLots::SupplierId).uuid().null())
                        .col(
                            ColumnDef::new(InventoryLots::PurchaseOrderId)
                                .uuid()
                                .null(),
                        )
                        .col(ColumnDef::new(InventoryLots::LotNumber).string().not_null())
                        .col(
                            ColumnDef::new(InventoryLots::QuantityReceived)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::QuantityAvailable)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::QuantityReserved)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::QuantityAllocated)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::CostPerUnitCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::LandedCostPerUnitCents)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::ReceivedDate)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(InventoryLots::ExpiryDate).date().null())
                        .col(ColumnDef::new(InventoryLots::Status).string().not_null())
                        .col(
                            ColumnDef::new(InventoryLots::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryLots::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Allocation scans filter on (product_id, status) and order by
            // received_date or expiry_date.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_product_status")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::ProductId)
                        .col(InventoryLots::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_received_date")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::ReceivedDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_lots_expiry_date")
                        .table(InventoryLots::Table)
                        .col(InventoryLots::ExpiryDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(InventoryLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryLots {
        Table,
        Id,
        ProductId,
        SupplierId,
        PurchaseOrderId,
        LotNumber,
        QuantityReceived,
        QuantityAvailable,
        QuantityReserved,
        QuantityAllocated,
        CostPerUnitCents,
        LandedCostPerUnitCents,
        ReceivedDate,
        ExpiryDate,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000006_create_inventory_reservations_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_inventory_reservations_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(InventoryReservations::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(InventoryReservations::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::OrderId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::ProductId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::LotId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::QuantityReserved)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::ReservedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::ExpiresAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::FulfilledAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::CanceledAt)
                                .timestamp()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(InventoryReservations::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_reservations_order_id")
                        .table(InventoryReservations::Table)
                        .col(InventoryReservations::OrderId)
                        .to_owned(),
                )
                .await?;

            // The expiry sweep scans on expires_at.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_inventory_reservations_expires_at")
                        .table(InventoryReservations::Table)
                        .col(InventoryReservations::ExpiresAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(
                    Table::drop()
                        .table(InventoryReservations::Table)
                        .to_owned(),
                )
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum InventoryReservations {
        Table,
        Id,
        OrderId,
        ProductId,
        LotId,
        QuantityReserved,
        ReservedAt,
        ExpiresAt,
        FulfilledAt,
        CanceledAt,
        CreatedAt,
        UpdatedAt,
    }
}
