#![allow(dead_code)]

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use shopledger::{
    db::{establish_connection_with_config, run_migrations, DbConfig},
    entities::{expense, ingredient, product, recipe_line, shop, wastage_rule},
    events::{event_channel, Event, EventSender},
    services::{LedgerService, MovementReportService, UnitService, ValuationService},
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything a ledger integration test needs: an isolated in-memory
/// database with migrations applied, the services under test, and a live
/// event receiver (events fail to send once the receiver is dropped).
pub struct TestContext {
    pub db: Arc<DatabaseConnection>,
    pub ledger: LedgerService,
    pub movements: MovementReportService,
    pub valuation: ValuationService,
    pub events: mpsc::Receiver<Event>,
}

pub async fn setup() -> TestContext {
    // A single pooled connection keeps the whole test on one sqlite
    // in-memory database.
    let config = DbConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let db = establish_connection_with_config(&config)
        .await
        .expect("Failed to create DB pool");
    run_migrations(&db).await.expect("Failed to run migrations");
    let db = Arc::new(db);

    let (event_sender, events) = event_channel(1024);
    let event_sender: Arc<EventSender> = Arc::new(event_sender);

    TestContext {
        ledger: LedgerService::new(db.clone(), event_sender.clone()),
        movements: MovementReportService::new(db.clone()),
        valuation: ValuationService::new(db.clone()),
        db,
        events,
    }
}

pub fn dec(value: i64) -> Decimal {
    Decimal::new(value * 10_000, 4)
}

pub async fn create_shop(db: &DatabaseConnection, code: &str) -> shop::Model {
    shop::ActiveModel {
        name: Set(format!("Shop {}", code)),
        code: Set(code.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create shop")
}

pub async fn create_unit(
    db: &DatabaseConnection,
    name: &str,
    symbol: &str,
    base_unit: &str,
    conversion_rate: Decimal,
) -> shopledger::entities::unit::Model {
    UnitService::create_unit(db, name, symbol, base_unit, conversion_rate)
        .await
        .expect("Failed to create unit")
}

pub async fn create_ingredient(
    db: &DatabaseConnection,
    name: &str,
    unit_id: i64,
) -> ingredient::Model {
    ingredient::ActiveModel {
        name: Set(name.to_string()),
        unit_id: Set(unit_id),
        description: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create ingredient")
}

pub async fn create_product(db: &DatabaseConnection, name: &str, price: Decimal) -> product::Model {
    product::ActiveModel {
        name: Set(name.to_string()),
        price: Set(price),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create product")
}

pub async fn create_recipe_line(
    db: &DatabaseConnection,
    shop_id: i64,
    product_id: i64,
    ingredient_id: i64,
    quantity_required: Decimal,
    unit_id: i64,
) -> recipe_line::Model {
    recipe_line::ActiveModel {
        shop_id: Set(shop_id),
        product_id: Set(product_id),
        ingredient_id: Set(ingredient_id),
        quantity_required: Set(quantity_required),
        unit_id: Set(unit_id),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create recipe line")
}

pub async fn create_wastage_rule(
    db: &DatabaseConnection,
    product_id: i64,
    ingredient_id: i64,
    unit_id: i64,
    per_qty: Decimal,
    wastage_qty: Decimal,
    is_active: bool,
) -> wastage_rule::Model {
    wastage_rule::ActiveModel {
        product_id: Set(product_id),
        ingredient_id: Set(ingredient_id),
        unit_id: Set(unit_id),
        per_qty: Set(per_qty),
        wastage_qty: Set(wastage_qty),
        is_active: Set(is_active),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create wastage rule")
}

pub async fn create_expense(
    db: &DatabaseConnection,
    shop_id: i64,
    amount: Decimal,
    incurred_at: DateTime<Utc>,
) -> expense::Model {
    expense::ActiveModel {
        shop_id: Set(shop_id),
        amount: Set(amount),
        description: Set(Some("test expense".to_string())),
        incurred_at: Set(incurred_at),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("Failed to create expense")
}
