use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::DbPool;
use crate::entities::{
    expense::{self, Entity as Expense},
    ingredient::Entity as Ingredient,
    stock_movement::{self, Entity as StockMovement, MovementReason},
};
use crate::errors::ServiceError;
use crate::services::units::UnitConverter;

/// Period COGS summary. The components satisfy the periodic-inventory
/// identity exactly:
/// `cogs = opening_valuation + purchases_cost + other_costs - closing_valuation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CogsSummary {
    pub opening_valuation: Decimal,
    pub purchases_cost: Decimal,
    pub other_costs: Decimal,
    pub closing_valuation: Decimal,
    pub cogs: Decimal,
}

/// Average-cost stock valuation and period COGS over the movement ledger.
/// Pure read path; every quantity is converted to the ingredient's native
/// unit before it enters a sum.
#[derive(Clone)]
pub struct ValuationService {
    db_pool: Arc<DbPool>,
}

impl ValuationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Net ledger quantity for the key up to and including `at`, in the
    /// ingredient's native unit.
    #[instrument(skip(self))]
    pub async fn cumulative_qty(
        &self,
        shop_id: i64,
        ingredient_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        let db = self.db_pool.as_ref();
        let converter = UnitConverter::load(db).await?;
        cumulative_qty_with(db, &converter, shop_id, ingredient_id, at).await
    }

    /// Weighted average purchase cost per native unit at `at`:
    /// Σ total_cost / Σ quantity over purchases up to `at`. Falls back to
    /// the most recent non-null `unit_cost` when no purchased quantity
    /// exists, then to zero.
    #[instrument(skip(self))]
    pub async fn average_cost_at(
        &self,
        shop_id: i64,
        ingredient_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        let db = self.db_pool.as_ref();
        let converter = UnitConverter::load(db).await?;
        average_cost_with(db, &converter, shop_id, ingredient_id, at).await
    }

    /// `cumulative_qty * average_cost_at`.
    #[instrument(skip(self))]
    pub async fn valuation_at(
        &self,
        shop_id: i64,
        ingredient_id: i64,
        at: DateTime<Utc>,
    ) -> Result<Decimal, ServiceError> {
        let db = self.db_pool.as_ref();
        let converter = UnitConverter::load(db).await?;
        valuation_with(db, &converter, shop_id, ingredient_id, at).await
    }

    /// Period cost of goods sold for a shop.
    ///
    /// When `ingredient_ids` is omitted, the relevant set is every
    /// ingredient with ledger activity for the shop in `[from, to]`. When
    /// `other_costs` is omitted, it defaults to the shop's expenses in the
    /// same range.
    #[instrument(skip(self, ingredient_ids))]
    pub async fn compute_cogs(
        &self,
        shop_id: i64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        ingredient_ids: Option<Vec<i64>>,
        other_costs: Option<Decimal>,
    ) -> Result<CogsSummary, ServiceError> {
        if from > to {
            return Err(ServiceError::ValidationError(format!(
                "invalid period: {} is after {}",
                from, to
            )));
        }

        let db = self.db_pool.as_ref();
        let converter = UnitConverter::load(db).await?;

        let relevant: Vec<i64> = match ingredient_ids {
            Some(ids) => ids,
            None => active_ingredient_ids(db, shop_id, from, to).await?,
        };

        let opening_at = from - Duration::microseconds(1);

        let mut opening_valuation = Decimal::ZERO;
        let mut closing_valuation = Decimal::ZERO;
        for &ingredient_id in &relevant {
            opening_valuation +=
                valuation_with(db, &converter, shop_id, ingredient_id, opening_at).await?;
            closing_valuation += valuation_with(db, &converter, shop_id, ingredient_id, to).await?;
        }

        let purchases_cost = purchases_cost_in_range(db, shop_id, &relevant, from, to).await?;

        let other_costs = match other_costs {
            Some(costs) => costs,
            None => expenses_in_range(db, shop_id, from, to).await?,
        };

        let cogs = opening_valuation + purchases_cost + other_costs - closing_valuation;

        Ok(CogsSummary {
            opening_valuation,
            purchases_cost,
            other_costs,
            closing_valuation,
            cogs,
        })
    }
}

async fn native_unit_id<C: ConnectionTrait>(
    conn: &C,
    ingredient_id: i64,
) -> Result<i64, ServiceError> {
    Ingredient::find_by_id(ingredient_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .map(|i| i.unit_id)
        .ok_or(ServiceError::IngredientNotFound(ingredient_id))
}

async fn cumulative_qty_with<C: ConnectionTrait>(
    conn: &C,
    converter: &UnitConverter,
    shop_id: i64,
    ingredient_id: i64,
    at: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    let native_unit = native_unit_id(conn, ingredient_id).await?;

    let movements = StockMovement::find()
        .filter(stock_movement::Column::ShopId.eq(shop_id))
        .filter(stock_movement::Column::IngredientId.eq(ingredient_id))
        .filter(stock_movement::Column::CreatedAt.lte(at))
        .filter(stock_movement::Column::DeletedAt.is_null())
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut total = Decimal::ZERO;
    for movement in movements {
        total += converter.convert(movement.change, movement.unit_id, native_unit)?;
    }
    Ok(total)
}

async fn average_cost_with<C: ConnectionTrait>(
    conn: &C,
    converter: &UnitConverter,
    shop_id: i64,
    ingredient_id: i64,
    at: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    let native_unit = native_unit_id(conn, ingredient_id).await?;

    let purchases = StockMovement::find()
        .filter(stock_movement::Column::ShopId.eq(shop_id))
        .filter(stock_movement::Column::IngredientId.eq(ingredient_id))
        .filter(stock_movement::Column::Reason.eq(MovementReason::Purchase.as_str()))
        .filter(stock_movement::Column::CreatedAt.lte(at))
        .filter(stock_movement::Column::DeletedAt.is_null())
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let mut qty_sum = Decimal::ZERO;
    let mut cost_sum = Decimal::ZERO;
    for purchase in &purchases {
        qty_sum += converter.convert(purchase.change, purchase.unit_id, native_unit)?;
        if let Some(total_cost) = purchase.total_cost {
            cost_sum += total_cost;
        }
    }

    if !qty_sum.is_zero() {
        return Ok(cost_sum / qty_sum);
    }

    // No purchased quantity: fall back to the latest recorded unit cost.
    let latest_costed = StockMovement::find()
        .filter(stock_movement::Column::ShopId.eq(shop_id))
        .filter(stock_movement::Column::IngredientId.eq(ingredient_id))
        .filter(stock_movement::Column::UnitCost.is_not_null())
        .filter(stock_movement::Column::CreatedAt.lte(at))
        .filter(stock_movement::Column::DeletedAt.is_null())
        .order_by_desc(stock_movement::Column::CreatedAt)
        .order_by_desc(stock_movement::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(latest_costed
        .and_then(|m| m.unit_cost)
        .unwrap_or(Decimal::ZERO))
}

async fn valuation_with<C: ConnectionTrait>(
    conn: &C,
    converter: &UnitConverter,
    shop_id: i64,
    ingredient_id: i64,
    at: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    let qty = cumulative_qty_with(conn, converter, shop_id, ingredient_id, at).await?;
    let avg_cost = average_cost_with(conn, converter, shop_id, ingredient_id, at).await?;
    Ok(qty * avg_cost)
}

/// Ingredients with any non-deleted ledger activity for the shop in range.
async fn active_ingredient_ids<C: ConnectionTrait>(
    conn: &C,
    shop_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<i64>, ServiceError> {
    let ids: Vec<i64> = StockMovement::find()
        .select_only()
        .column(stock_movement::Column::IngredientId)
        .filter(stock_movement::Column::ShopId.eq(shop_id))
        .filter(stock_movement::Column::CreatedAt.gte(from))
        .filter(stock_movement::Column::CreatedAt.lte(to))
        .filter(stock_movement::Column::DeletedAt.is_null())
        .distinct()
        .into_tuple()
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    // Deterministic summation order regardless of backend.
    Ok(ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect())
}

async fn purchases_cost_in_range<C: ConnectionTrait>(
    conn: &C,
    shop_id: i64,
    ingredient_ids: &[i64],
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    if ingredient_ids.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let purchases = StockMovement::find()
        .filter(stock_movement::Column::ShopId.eq(shop_id))
        .filter(stock_movement::Column::IngredientId.is_in(ingredient_ids.to_vec()))
        .filter(stock_movement::Column::Reason.eq(MovementReason::Purchase.as_str()))
        .filter(stock_movement::Column::CreatedAt.gte(from))
        .filter(stock_movement::Column::CreatedAt.lte(to))
        .filter(stock_movement::Column::DeletedAt.is_null())
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(purchases
        .iter()
        .filter_map(|p| p.total_cost)
        .sum::<Decimal>())
}

async fn expenses_in_range<C: ConnectionTrait>(
    conn: &C,
    shop_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    let expenses = Expense::find()
        .filter(expense::Column::ShopId.eq(shop_id))
        .filter(expense::Column::IncurredAt.gte(from))
        .filter(expense::Column::IncurredAt.lte(to))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(expenses.iter().map(|e| e.amount).sum())
}
