mod common;

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use shopledger::{
    entities::{
        sale, sale_item,
        stock_movement::{self, MovementReason},
    },
    services::{
        ledger::{SaleDraft, SaleLineDraft},
        movements::{MovementDirection, Pagination},
    },
};

use common::{
    create_ingredient, create_product, create_recipe_line, create_shop, create_unit,
    create_wastage_rule, setup,
};

#[tokio::test]
async fn unified_feed_reports_all_four_sources() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let other_shop = create_shop(db, "B").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;
    let latte = create_product(db, "Latte", dec!(450)).await;
    create_recipe_line(db, shop.id, latte.id, coffee.id, dec!(10), gram.id).await;

    ctx.ledger
        .record_purchase(
            shop.id,
            coffee.id,
            gram.id,
            dec!(5000),
            dec!(10),
            "PUR-001".to_string(),
            None,
        )
        .await
        .expect("record purchase");

    ctx.ledger
        .record_sale(SaleDraft {
            shop_id: shop.id,
            reference: "SALE-001".to_string(),
            sold_at: Utc::now() - Duration::minutes(30),
            items: vec![SaleLineDraft {
                product_id: latte.id,
                qty: dec!(10),
                price: dec!(450),
            }],
            created_by: None,
        })
        .await
        .expect("record sale");

    ctx.ledger
        .record_adjustment(shop.id, coffee.id, gram.id, dec!(-25), None, None)
        .await
        .expect("record adjustment");

    ctx.ledger
        .record_transfer(shop.id, other_shop.id, coffee.id, gram.id, dec!(200), None)
        .await
        .expect("record transfer");

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);
    let rows = ctx
        .movements
        .get_movements(shop.id, from, to, None)
        .await
        .expect("get movements");

    let purchase = rows
        .iter()
        .find(|r| r.reason == MovementReason::Purchase)
        .expect("purchase row");
    assert_eq!(purchase.direction, MovementDirection::In);
    assert_eq!(purchase.quantity, dec!(5000));
    assert_eq!(purchase.unit_symbol, "g");

    // Exactly one Sales row: derived from the sale item, not duplicated by
    // the materialized ledger movement.
    let sales: Vec<_> = rows
        .iter()
        .filter(|r| r.reason == MovementReason::Sales)
        .collect();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].direction, MovementDirection::Out);
    assert_eq!(sales[0].quantity, dec!(100));
    assert_eq!(sales[0].reference, "SALE-001");

    let adjustment = rows
        .iter()
        .find(|r| r.reason == MovementReason::Adjustment)
        .expect("adjustment row");
    assert_eq!(adjustment.direction, MovementDirection::Out);
    assert_eq!(adjustment.quantity, dec!(25));

    let transfer = rows
        .iter()
        .find(|r| r.reason == MovementReason::Transfer)
        .expect("transfer row");
    assert_eq!(transfer.direction, MovementDirection::Out);
    assert_eq!(transfer.quantity, dec!(200));

    // Newest first; the backdated sale sits behind today's ledger rows.
    let last = rows.last().expect("at least one row");
    assert_eq!(last.reason, MovementReason::Sales);
    for pair in rows.windows(2) {
        assert!(pair[0].date >= pair[1].date);
    }

    // The other shop only sees its inbound transfer leg.
    let other_rows = ctx
        .movements
        .get_movements(other_shop.id, from, to, None)
        .await
        .expect("get movements");
    assert_eq!(other_rows.len(), 1);
    assert_eq!(other_rows[0].reason, MovementReason::Transfer);
    assert_eq!(other_rows[0].direction, MovementDirection::In);
}

#[tokio::test]
async fn wastage_is_proportional_to_quantity_sold() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let milk = create_ingredient(db, "Milk", gram.id).await;
    let latte = create_product(db, "Latte", dec!(450)).await;
    // 3 g of milk wasted per 5 lattes sold.
    create_wastage_rule(db, latte.id, milk.id, gram.id, dec!(5), dec!(3), true).await;

    ctx.ledger
        .record_sale(SaleDraft {
            shop_id: shop.id,
            reference: "SALE-001".to_string(),
            sold_at: Utc::now(),
            items: vec![SaleLineDraft {
                product_id: latte.id,
                qty: dec!(10),
                price: dec!(450),
            }],
            created_by: None,
        })
        .await
        .expect("record sale");

    let rows = ctx
        .movements
        .get_movements(
            shop.id,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
            None,
        )
        .await
        .expect("get movements");

    let wastage: Vec<_> = rows
        .iter()
        .filter(|r| r.reason == MovementReason::Wastage)
        .collect();
    assert_eq!(wastage.len(), 1);
    // Selling 2 * per_qty triggers exactly 2 * wastage_qty.
    assert_eq!(wastage[0].quantity, dec!(6));
    assert_eq!(wastage[0].direction, MovementDirection::Out);
}

#[tokio::test]
async fn inactive_wastage_rules_are_ignored() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let milk = create_ingredient(db, "Milk", gram.id).await;
    let latte = create_product(db, "Latte", dec!(450)).await;
    create_wastage_rule(db, latte.id, milk.id, gram.id, dec!(1), dec!(2), false).await;

    ctx.ledger
        .record_sale(SaleDraft {
            shop_id: shop.id,
            reference: "SALE-001".to_string(),
            sold_at: Utc::now(),
            items: vec![SaleLineDraft {
                product_id: latte.id,
                qty: dec!(4),
                price: dec!(450),
            }],
            created_by: None,
        })
        .await
        .expect("record sale");

    let rows = ctx
        .movements
        .get_movements(
            shop.id,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
            None,
        )
        .await
        .expect("get movements");

    assert!(rows.iter().all(|r| r.reason != MovementReason::Wastage));
}

#[tokio::test]
async fn conversion_failure_degrades_to_raw_quantity() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let piece = create_unit(db, "Piece", "pcs", "pcs", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;
    let latte = create_product(db, "Latte", dec!(450)).await;
    // Misconfigured recipe: counts pieces against a gram-native ingredient.
    create_recipe_line(db, shop.id, latte.id, coffee.id, dec!(2), piece.id).await;

    // The sale arrives from an upstream system that did not materialize
    // consumption; the report must still derive it.
    let sold_at = Utc::now();
    let sale_row = sale::ActiveModel {
        shop_id: Set(shop.id),
        reference: Set("SALE-EXT-001".to_string()),
        sold_at: Set(sold_at),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert sale");
    sale_item::ActiveModel {
        sale_id: Set(sale_row.id),
        product_id: Set(latte.id),
        qty: Set(dec!(10)),
        price: Set(dec!(450)),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert sale item");

    let rows = ctx
        .movements
        .get_movements(
            shop.id,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
            None,
        )
        .await
        .expect("report must not abort on a unit mismatch");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].reason, MovementReason::Sales);
    // Raw (unconverted) quantity in the recipe line's own unit.
    assert_eq!(rows[0].quantity, dec!(20));
    assert_eq!(rows[0].unit_symbol, "pcs");
}

#[tokio::test]
async fn equal_dates_keep_ledger_insertion_order() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;

    // An adjustment and a purchase stamped with the same instant, in that
    // insertion order.
    let stamp = Utc::now();
    stock_movement::ActiveModel {
        shop_id: Set(shop.id),
        ingredient_id: Set(coffee.id),
        unit_id: Set(gram.id),
        change: Set(dec!(-10)),
        reason: Set(MovementReason::Adjustment.as_str().to_string()),
        reference: Set("ADJ-TIE".to_string()),
        created_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert adjustment");
    stock_movement::ActiveModel {
        shop_id: Set(shop.id),
        ingredient_id: Set(coffee.id),
        unit_id: Set(gram.id),
        change: Set(dec!(500)),
        reason: Set(MovementReason::Purchase.as_str().to_string()),
        reference: Set("PUR-TIE".to_string()),
        unit_cost: Set(Some(dec!(1))),
        total_cost: Set(Some(dec!(500))),
        created_at: Set(stamp),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert purchase");

    let rows = ctx
        .movements
        .get_movements(
            shop.id,
            Utc::now() - Duration::hours(1),
            Utc::now() + Duration::hours(1),
            None,
        )
        .await
        .expect("get movements");

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].reference, "ADJ-TIE");
    assert_eq!(rows[1].reference, "PUR-TIE");
}

#[tokio::test]
async fn pagination_slices_the_ordered_feed() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;

    for i in 1..=5 {
        ctx.ledger
            .record_purchase(
                shop.id,
                coffee.id,
                gram.id,
                dec!(100) * rust_decimal::Decimal::from(i),
                dec!(1),
                format!("PUR-{:03}", i),
                None,
            )
            .await
            .expect("record purchase");
    }

    let from = Utc::now() - Duration::hours(1);
    let to = Utc::now() + Duration::hours(1);

    let all = ctx
        .movements
        .get_movements(shop.id, from, to, None)
        .await
        .expect("get movements");
    assert_eq!(all.len(), 5);

    let page1 = ctx
        .movements
        .get_movements(shop.id, from, to, Some(Pagination { page: 1, per_page: 2 }))
        .await
        .expect("page 1");
    let page2 = ctx
        .movements
        .get_movements(shop.id, from, to, Some(Pagination { page: 2, per_page: 2 }))
        .await
        .expect("page 2");
    let page4 = ctx
        .movements
        .get_movements(shop.id, from, to, Some(Pagination { page: 4, per_page: 2 }))
        .await
        .expect("page 4");

    assert_eq!(page1.len(), 2);
    assert_eq!(page2.len(), 2);
    assert!(page4.is_empty());
    assert_eq!(page1[0].reference, all[0].reference);
    assert_eq!(page2[0].reference, all[2].reference);
}
