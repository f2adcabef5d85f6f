use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
};
use tracing::{debug, instrument};

use crate::entities::{
    ingredient::Entity as Ingredient,
    stock_balance::{self, Entity as StockBalance},
    stock_movement::{self, Entity as StockMovement},
};
use crate::errors::ServiceError;
use crate::services::units::UnitConverter;

/// Maintains the materialized `stock_balances` table from the append-only
/// movement ledger.
///
/// The balance is always recomputed from scratch for one
/// `(shop_id, ingredient_id)` key rather than incremented, which makes the
/// operation idempotent: replaying it after any sequence of inserts lands on
/// the same number. Callers on the write path invoke it inside the same
/// transaction as the movement insert.
pub struct BalanceMaterializer;

impl BalanceMaterializer {
    /// Sums every non-deleted movement for the key, converting each row's
    /// `change` from the unit it was recorded in to the ingredient's native
    /// unit. Order-independent by construction.
    pub async fn recompute<C: ConnectionTrait>(
        conn: &C,
        converter: &UnitConverter,
        shop_id: i64,
        ingredient_id: i64,
        native_unit_id: i64,
    ) -> Result<Decimal, ServiceError> {
        let movements = StockMovement::find()
            .filter(stock_movement::Column::ShopId.eq(shop_id))
            .filter(stock_movement::Column::IngredientId.eq(ingredient_id))
            .filter(stock_movement::Column::DeletedAt.is_null())
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let mut stock = Decimal::ZERO;
        for movement in movements {
            stock += converter.convert(movement.change, movement.unit_id, native_unit_id)?;
        }

        Ok(stock)
    }

    /// Recomputes the key and upserts the result into `stock_balances`,
    /// returning the new stock. Takes an exclusive lock on the balance row
    /// for the duration so concurrent writers to the same key serialize
    /// instead of overwriting each other's recompute.
    #[instrument(skip(conn, converter))]
    pub async fn materialize<C: ConnectionTrait>(
        conn: &C,
        converter: &UnitConverter,
        shop_id: i64,
        ingredient_id: i64,
    ) -> Result<Decimal, ServiceError> {
        let ingredient = Ingredient::find_by_id(ingredient_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::IngredientNotFound(ingredient_id))?;

        let existing = StockBalance::find()
            .filter(stock_balance::Column::IngredientId.eq(ingredient_id))
            .filter(stock_balance::Column::ShopId.eq(shop_id))
            .lock_exclusive()
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let stock =
            Self::recompute(conn, converter, shop_id, ingredient_id, ingredient.unit_id).await?;

        match existing {
            Some(balance) => {
                let mut active: stock_balance::ActiveModel = balance.into();
                active.unit_id = Set(ingredient.unit_id);
                active.stock = Set(stock);
                active.updated_at = Set(Utc::now());
                active.update(conn).await.map_err(ServiceError::db_error)?;
            }
            None => {
                let now = Utc::now();
                let active = stock_balance::ActiveModel {
                    shop_id: Set(shop_id),
                    ingredient_id: Set(ingredient_id),
                    unit_id: Set(ingredient.unit_id),
                    stock: Set(stock),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                active.insert(conn).await.map_err(ServiceError::db_error)?;
            }
        }

        debug!(
            shop_id = %shop_id,
            ingredient_id = %ingredient_id,
            stock = %stock,
            "Materialized stock balance"
        );

        Ok(stock)
    }

    /// Current materialized stock for the key, in the ingredient's native
    /// unit. Zero when no balance row exists yet.
    pub async fn get_stock_balance<C: ConnectionTrait>(
        conn: &C,
        shop_id: i64,
        ingredient_id: i64,
    ) -> Result<Decimal, ServiceError> {
        let balance = StockBalance::find()
            .filter(stock_balance::Column::IngredientId.eq(ingredient_id))
            .filter(stock_balance::Column::ShopId.eq(shop_id))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(balance.map(|b| b.stock).unwrap_or(Decimal::ZERO))
    }

    /// Rebuilds every balance for a shop from the ledger. Recovery path;
    /// also what the idempotence tests replay against incremental updates.
    #[instrument(skip(conn, converter))]
    pub async fn rebuild_shop<C: ConnectionTrait>(
        conn: &C,
        converter: &UnitConverter,
        shop_id: i64,
    ) -> Result<usize, ServiceError> {
        let ingredient_ids: Vec<i64> = StockMovement::find()
            .select_only()
            .column(stock_movement::Column::IngredientId)
            .filter(stock_movement::Column::ShopId.eq(shop_id))
            .distinct()
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        for &ingredient_id in &ingredient_ids {
            Self::materialize(conn, converter, shop_id, ingredient_id).await?;
        }

        Ok(ingredient_ids.len())
    }
}
