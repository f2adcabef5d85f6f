use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::db::DbPool;
use crate::entities::{
    ingredient::{self, Entity as Ingredient},
    recipe_line::{self, Entity as RecipeLine},
    sale::{self, Entity as Sale},
    sale_item::{self, Entity as SaleItem},
    stock_movement::{self, Entity as StockMovement, MovementReason},
    wastage_rule::{self, Entity as WastageRule},
};
use crate::errors::ServiceError;
use crate::services::units::UnitConverter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementDirection {
    In,
    Out,
}

/// One row of the unified movement feed. Quantities are normalized to the
/// ingredient's native unit whenever the units allow it; `unit_symbol`
/// names the unit the quantity is actually expressed in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRow {
    pub date: DateTime<Utc>,
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub reason: MovementReason,
    pub direction: MovementDirection,
    pub quantity: Decimal,
    pub unit_symbol: String,
    pub reference: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
}

/// Read-only reporting pipeline over the movement feed.
///
/// Reconciles three origins into one chronological view: the persisted
/// ledger (purchases, transfers, adjustments), recipe consumption derived
/// from sale items, and wastage derived from sale items. Sales and wastage
/// ledger rows are deliberately excluded from the ledger pass — the derived
/// passes already report them, and reading both would double-count.
#[derive(Clone)]
pub struct MovementReportService {
    db_pool: Arc<DbPool>,
}

impl MovementReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Unified movement feed for a shop and date range, newest first.
    /// The sort is stable, so rows with equal dates keep ledger id order,
    /// with derived consumption and wastage rows after them.
    #[instrument(skip(self))]
    pub async fn get_movements(
        &self,
        shop_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        paginate: Option<Pagination>,
    ) -> Result<Vec<MovementRow>, ServiceError> {
        let db = self.db_pool.as_ref();
        let converter = UnitConverter::load(db).await?;

        let ingredients: HashMap<i64, ingredient::Model> = Ingredient::find()
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let ledger_rows = StockMovement::find()
            .filter(stock_movement::Column::ShopId.eq(shop_id))
            .filter(stock_movement::Column::CreatedAt.gte(from))
            .filter(stock_movement::Column::CreatedAt.lte(to))
            .filter(stock_movement::Column::DeletedAt.is_null())
            .order_by_asc(stock_movement::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut rows = Vec::new();

        // One pass over the ledger in id order: purchases are always
        // inbound, transfers and adjustments classify by sign. Sales and
        // wastage rows are skipped; the derived pass below reports them.
        for movement in &ledger_rows {
            match movement.reason()? {
                MovementReason::Sales | MovementReason::Wastage => {}
                MovementReason::Purchase => {
                    rows.push(self.ledger_row(
                        &converter,
                        &ingredients,
                        movement,
                        MovementDirection::In,
                    )?);
                }
                MovementReason::Transfer | MovementReason::Adjustment => {
                    let direction = if movement.change > Decimal::ZERO {
                        MovementDirection::In
                    } else {
                        MovementDirection::Out
                    };
                    rows.push(self.ledger_row(&converter, &ingredients, movement, direction)?);
                }
            }
        }

        // Consumption and wastage derived from the sale items in range.
        rows.extend(
            self.derived_rows(shop_id, from, to, &converter, &ingredients)
                .await?,
        );

        rows.sort_by(|a, b| b.date.cmp(&a.date));

        if let Some(page) = paginate {
            let start = (page.page.saturating_sub(1) * page.per_page) as usize;
            let end = (start + page.per_page as usize).min(rows.len());
            if start >= rows.len() {
                return Ok(Vec::new());
            }
            rows = rows[start..end].to_vec();
        }

        Ok(rows)
    }

    fn ledger_row(
        &self,
        converter: &UnitConverter,
        ingredients: &HashMap<i64, ingredient::Model>,
        movement: &stock_movement::Model,
        direction: MovementDirection,
    ) -> Result<MovementRow, ServiceError> {
        let ingredient = ingredients
            .get(&movement.ingredient_id)
            .ok_or(ServiceError::IngredientNotFound(movement.ingredient_id))?;

        let (quantity, unit_symbol) = normalize_quantity(
            converter,
            movement.change.abs(),
            movement.unit_id,
            ingredient.unit_id,
        );

        Ok(MovementRow {
            date: movement.created_at,
            ingredient_id: ingredient.id,
            ingredient_name: ingredient.name.clone(),
            reason: movement.reason()?,
            direction,
            quantity,
            unit_symbol,
            reference: movement.reference.clone(),
        })
    }

    /// Derives consumption (`Sales`) and wastage rows from the sale items
    /// in range by joining recipes and active wastage rules on the fly.
    async fn derived_rows(
        &self,
        shop_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        converter: &UnitConverter,
        ingredients: &HashMap<i64, ingredient::Model>,
    ) -> Result<Vec<MovementRow>, ServiceError> {
        let db = self.db_pool.as_ref();

        let sales = Sale::find()
            .filter(sale::Column::ShopId.eq(shop_id))
            .filter(sale::Column::SoldAt.gte(from))
            .filter(sale::Column::SoldAt.lte(to))
            .order_by_asc(sale::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        if sales.is_empty() {
            return Ok(Vec::new());
        }

        let sale_ids: Vec<i64> = sales.iter().map(|s| s.id).collect();
        let sales_by_id: HashMap<i64, &sale::Model> = sales.iter().map(|s| (s.id, s)).collect();

        let items = SaleItem::find()
            .filter(sale_item::Column::SaleId.is_in(sale_ids))
            .order_by_asc(sale_item::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut recipes_by_product: HashMap<i64, Vec<recipe_line::Model>> = HashMap::new();
        for line in RecipeLine::find()
            .filter(recipe_line::Column::ShopId.eq(shop_id))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
        {
            recipes_by_product
                .entry(line.product_id)
                .or_default()
                .push(line);
        }

        let mut rules_by_product: HashMap<i64, Vec<wastage_rule::Model>> = HashMap::new();
        for rule in WastageRule::find()
            .filter(wastage_rule::Column::IsActive.eq(true))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
        {
            rules_by_product
                .entry(rule.product_id)
                .or_default()
                .push(rule);
        }

        let mut consumption_rows = Vec::new();
        let mut wastage_rows = Vec::new();

        for item in &items {
            let sale = match sales_by_id.get(&item.sale_id) {
                Some(sale) => *sale,
                None => continue,
            };

            for recipe in recipes_by_product
                .get(&item.product_id)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let ingredient = ingredients
                    .get(&recipe.ingredient_id)
                    .ok_or(ServiceError::IngredientNotFound(recipe.ingredient_id))?;

                let consumed = recipe.quantity_required * item.qty;
                let (quantity, unit_symbol) = normalize_quantity(
                    converter,
                    consumed,
                    recipe.unit_id,
                    ingredient.unit_id,
                );

                consumption_rows.push(MovementRow {
                    date: sale.sold_at,
                    ingredient_id: ingredient.id,
                    ingredient_name: ingredient.name.clone(),
                    reason: MovementReason::Sales,
                    direction: MovementDirection::Out,
                    quantity,
                    unit_symbol,
                    reference: sale.reference.clone(),
                });
            }

            for rule in rules_by_product
                .get(&item.product_id)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                if rule.per_qty <= Decimal::ZERO {
                    continue;
                }
                let wastage = (item.qty / rule.per_qty) * rule.wastage_qty;
                if wastage <= Decimal::ZERO {
                    continue;
                }

                let ingredient = ingredients
                    .get(&rule.ingredient_id)
                    .ok_or(ServiceError::IngredientNotFound(rule.ingredient_id))?;

                let (quantity, unit_symbol) =
                    normalize_quantity(converter, wastage, rule.unit_id, ingredient.unit_id);

                wastage_rows.push(MovementRow {
                    date: sale.sold_at,
                    ingredient_id: ingredient.id,
                    ingredient_name: ingredient.name.clone(),
                    reason: MovementReason::Wastage,
                    direction: MovementDirection::Out,
                    quantity,
                    unit_symbol,
                    reference: sale.reference.clone(),
                });
            }
        }

        consumption_rows.extend(wastage_rows);
        Ok(consumption_rows)
    }
}

/// Converts a report quantity to the native unit, falling back to the raw
/// quantity on a unit mismatch. A bad unit configuration must not abort a
/// whole report; it degrades that one row and logs.
fn normalize_quantity(
    converter: &UnitConverter,
    quantity: Decimal,
    from_unit_id: i64,
    native_unit_id: i64,
) -> (Decimal, String) {
    match converter.convert(quantity, from_unit_id, native_unit_id) {
        Ok(converted) => {
            let symbol = converter
                .get(native_unit_id)
                .map(|u| u.symbol.clone())
                .unwrap_or_default();
            (converted, symbol)
        }
        Err(err) => {
            warn!(
                from_unit_id = %from_unit_id,
                native_unit_id = %native_unit_id,
                error = %err,
                "Unit conversion failed in movement report; keeping raw quantity"
            );
            let symbol = converter
                .get(from_unit_id)
                .map(|u| u.symbol.clone())
                .unwrap_or_default();
            (quantity, symbol)
        }
    }
}
