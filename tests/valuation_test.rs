mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use shopledger::{
    entities::stock_movement::MovementReason,
    errors::ServiceError,
    services::ledger::{NewMovement, SaleDraft, SaleLineDraft},
    services::BalanceMaterializer,
};

use common::{
    create_expense, create_ingredient, create_product, create_recipe_line, create_shop,
    create_unit, setup,
};

#[tokio::test]
async fn coffee_scenario_average_cost_and_valuation() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;
    let latte = create_product(db, "Latte", dec!(450)).await;
    create_recipe_line(db, shop.id, latte.id, coffee.id, dec!(10), gram.id).await;

    // Purchase 5000 g at a total cost of 50000.
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

    // Sell 10 lattes, each consuming 10 g.
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

    let at = Utc::now() + Duration::seconds(1);

    let qty = ctx
        .valuation
        .cumulative_qty(shop.id, coffee.id, at)
        .await
        .expect("cumulative qty");
    assert_eq!(qty, dec!(4900));

    // Sale consumption is a real ledger movement, so the materialized
    // balance agrees with the cumulative ledger quantity.
    let stock = BalanceMaterializer::get_stock_balance(db, shop.id, coffee.id)
        .await
        .expect("balance");
    assert_eq!(stock, qty);

    let avg = ctx
        .valuation
        .average_cost_at(shop.id, coffee.id, at)
        .await
        .expect("average cost");
    assert_eq!(avg, dec!(10));

    let valuation = ctx
        .valuation
        .valuation_at(shop.id, coffee.id, at)
        .await
        .expect("valuation");
    assert_eq!(valuation, dec!(49000));
}

#[tokio::test]
async fn average_cost_falls_back_to_latest_unit_cost_then_zero() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;

    let at = Utc::now() + Duration::seconds(1);

    // No movements at all: zero.
    let avg = ctx
        .valuation
        .average_cost_at(shop.id, coffee.id, at)
        .await
        .expect("average cost");
    assert_eq!(avg, dec!(0));

    // A purchase fully reversed by a costed correction leaves zero net
    // quantity; the latest recorded unit cost wins.
    ctx.ledger
        .record_purchase(
            shop.id,
            coffee.id,
            gram.id,
            dec!(500),
            dec!(10),
            "PUR-001".to_string(),
            None,
        )
        .await
        .expect("record purchase");
    ctx.ledger
        .record_movement(NewMovement {
            shop_id: shop.id,
            ingredient_id: coffee.id,
            unit_id: gram.id,
            change: dec!(-500),
            reason: MovementReason::Purchase,
            reference: "PUR-001-REV".to_string(),
            unit_cost: Some(dec!(12)),
            total_cost: Some(dec!(-5000)),
            remark: Some("supplier return".to_string()),
            created_by: None,
        })
        .await
        .expect("record reversal");

    let at = Utc::now() + Duration::seconds(1);
    let avg = ctx
        .valuation
        .average_cost_at(shop.id, coffee.id, at)
        .await
        .expect("average cost");
    assert_eq!(avg, dec!(12));
}

#[tokio::test]
async fn cogs_identity_holds_exactly() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;
    let latte = create_product(db, "Latte", dec!(450)).await;
    create_recipe_line(db, shop.id, latte.id, coffee.id, dec!(10), gram.id).await;

    // Opening stock: 5000 g at 10/g, recorded before the period begins.
    ctx.ledger
        .record_purchase(
            shop.id,
            coffee.id,
            gram.id,
            dec!(5000),
            dec!(10),
            "PUR-OPEN".to_string(),
            None,
        )
        .await
        .expect("record opening purchase");

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    let from = Utc::now();

    // In-period activity: a purchase of 3000 g at 15/g, a sale consuming
    // 1000 g, and an operating expense of 500.
    ctx.ledger
        .record_purchase(
            shop.id,
            coffee.id,
            gram.id,
            dec!(3000),
            dec!(15),
            "PUR-002".to_string(),
            None,
        )
        .await
        .expect("record purchase");
    ctx.ledger
        .record_sale(SaleDraft {
            shop_id: shop.id,
            reference: "SALE-001".to_string(),
            sold_at: Utc::now(),
            items: vec![SaleLineDraft {
                product_id: latte.id,
                qty: dec!(100),
                price: dec!(450),
            }],
            created_by: None,
        })
        .await
        .expect("record sale");
    create_expense(db, shop.id, dec!(500), Utc::now()).await;

    let to = Utc::now() + Duration::seconds(1);

    let summary = ctx
        .valuation
        .compute_cogs(shop.id, from, to, None, None)
        .await
        .expect("compute cogs");

    // Opening: 5000 g * 10. Closing: 7000 g * (95000 / 8000) = 83125.
    assert_eq!(summary.opening_valuation, dec!(50000));
    assert_eq!(summary.purchases_cost, dec!(45000));
    assert_eq!(summary.other_costs, dec!(500));
    assert_eq!(summary.closing_valuation, dec!(83125));
    assert_eq!(summary.cogs, dec!(12375));

    // The periodic-inventory identity holds exactly by construction.
    assert_eq!(
        summary.cogs,
        summary.opening_valuation + summary.purchases_cost + summary.other_costs
            - summary.closing_valuation
    );
}

#[tokio::test]
async fn cogs_honours_explicit_ingredients_and_other_costs() {
    let ctx = setup().await;
    let db = ctx.db.as_ref();

    let shop = create_shop(db, "HQ").await;
    let gram = create_unit(db, "Gram", "g", "g", dec!(1)).await;
    let coffee = create_ingredient(db, "Coffee", gram.id).await;
    let milk = create_ingredient(db, "Milk", gram.id).await;

    let from = Utc::now() - Duration::hours(1);

    ctx.ledger
        .record_purchase(
            shop.id,
            coffee.id,
            gram.id,
            dec!(1000),
            dec!(10),
            "PUR-C".to_string(),
            None,
        )
        .await
        .expect("record purchase");
    ctx.ledger
        .record_purchase(
            shop.id,
            milk.id,
            gram.id,
            dec!(2000),
            dec!(5),
            "PUR-M".to_string(),
            None,
        )
        .await
        .expect("record purchase");
    // This expense must be ignored when other_costs is supplied.
    create_expense(db, shop.id, dec!(999), Utc::now()).await;

    let to = Utc::now() + Duration::seconds(1);

    let summary = ctx
        .valuation
        .compute_cogs(shop.id, from, to, Some(vec![coffee.id]), Some(dec!(0)))
        .await
        .expect("compute cogs");

    // Milk is out of scope: only the coffee purchase counts.
    assert_eq!(summary.purchases_cost, dec!(10000));
    assert_eq!(summary.other_costs, dec!(0));
    assert_eq!(summary.closing_valuation, dec!(10000));
    assert_eq!(summary.opening_valuation, dec!(0));
    assert_eq!(summary.cogs, dec!(0));
}

#[tokio::test]
async fn cogs_rejects_inverted_period() {
    let ctx = setup().await;

    let to = Utc::now();
    let from = to + Duration::hours(1);

    let err = ctx
        .valuation
        .compute_cogs(1, from, to, None, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}
