use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionError, TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{
    ingredient::Entity as Ingredient,
    recipe_line::{self, Entity as RecipeLine},
    sale, sale_item,
    stock_movement::{self, MovementReason},
    wastage_rule::{self, Entity as WastageRule},
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::balance::BalanceMaterializer;
use crate::services::units::UnitConverter;

/// A movement about to be appended to the ledger. `change` is signed and
/// expressed in `unit_id`; the ledger never converts at write time.
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub shop_id: i64,
    pub ingredient_id: i64,
    pub unit_id: i64,
    pub change: Decimal,
    pub reason: MovementReason,
    pub reference: String,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub remark: Option<String>,
    pub created_by: Option<String>,
}

/// One line of a sale being committed.
#[derive(Debug, Clone)]
pub struct SaleLineDraft {
    pub product_id: i64,
    pub qty: Decimal,
    pub price: Decimal,
}

/// A sale to commit: the sale row, its items, and the derived consumption
/// and wastage movements all land in one transaction.
#[derive(Debug, Clone)]
pub struct SaleDraft {
    pub shop_id: i64,
    pub reference: String,
    pub sold_at: DateTime<Utc>,
    pub items: Vec<SaleLineDraft>,
    pub created_by: Option<String>,
}

/// Result of a committed transfer: the paired ledger rows.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub reference: String,
    pub outbound: stock_movement::Model,
    pub inbound: stock_movement::Model,
}

/// Result of a committed sale.
#[derive(Debug, Clone)]
pub struct SaleReceipt {
    pub sale: sale::Model,
    pub movements: Vec<stock_movement::Model>,
}

/// Append-only write paths into the stock ledger.
///
/// Every public method runs a single transaction covering the movement
/// insert(s) and the balance materialization for each touched
/// `(shop, ingredient)` key, then emits an event after commit.
#[derive(Clone)]
pub struct LedgerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl LedgerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Records a purchase: positive stock-in with cost information.
    /// `quantity` is in `unit_id`, which may differ from the ingredient's
    /// native unit (a purchase in kilograms against a gram-native
    /// ingredient is stored as kilograms).
    #[instrument(skip(self))]
    pub async fn record_purchase(
        &self,
        shop_id: i64,
        ingredient_id: i64,
        unit_id: i64,
        quantity: Decimal,
        unit_cost: Decimal,
        reference: String,
        created_by: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "purchase quantity must be positive, got {}",
                quantity
            )));
        }

        let movement = NewMovement {
            shop_id,
            ingredient_id,
            unit_id,
            change: quantity,
            reason: MovementReason::Purchase,
            reference,
            unit_cost: Some(unit_cost),
            total_cost: Some(quantity * unit_cost),
            remark: None,
            created_by,
        };

        self.record_movement(movement).await
    }

    /// Records a manual stock adjustment. `change` is signed; stock is
    /// allowed to go negative (the system deliberately does not enforce
    /// sufficient stock on adjustments).
    #[instrument(skip(self))]
    pub async fn record_adjustment(
        &self,
        shop_id: i64,
        ingredient_id: i64,
        unit_id: i64,
        change: Decimal,
        remark: Option<String>,
        created_by: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        if change == Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "adjustment change must be non-zero".to_string(),
            ));
        }

        let movement = NewMovement {
            shop_id,
            ingredient_id,
            unit_id,
            change,
            reason: MovementReason::Adjustment,
            reference: format!("ADJ-{}", Uuid::new_v4().simple()),
            unit_cost: None,
            total_cost: None,
            remark,
            created_by,
        };

        self.record_movement(movement).await
    }

    /// Appends one movement and materializes its balance, atomically.
    pub async fn record_movement(
        &self,
        movement: NewMovement,
    ) -> Result<stock_movement::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let inserted = db
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let converter = UnitConverter::load(txn).await?;
                    let inserted = insert_movement(txn, &converter, &movement).await?;
                    BalanceMaterializer::materialize(
                        txn,
                        &converter,
                        inserted.shop_id,
                        inserted.ingredient_id,
                    )
                    .await?;
                    Ok(inserted)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(
            movement_id = %inserted.id,
            shop_id = %inserted.shop_id,
            ingredient_id = %inserted.ingredient_id,
            reason = %inserted.reason,
            change = %inserted.change,
            "Recorded stock movement"
        );

        self.event_sender
            .send(Event::MovementRecorded {
                movement_id: inserted.id,
                shop_id: inserted.shop_id,
                ingredient_id: inserted.ingredient_id,
                reason: inserted.reason()?,
                change: inserted.change,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(inserted)
    }

    /// Records a stock transfer between two shops as exactly two paired
    /// movements sharing one voucher reference: `-qty` at the source and
    /// `+qty` at the destination, both pre-converted to the ingredient's
    /// native unit. Either both rows commit or neither does.
    #[instrument(skip(self))]
    pub async fn record_transfer(
        &self,
        from_shop_id: i64,
        to_shop_id: i64,
        ingredient_id: i64,
        unit_id: i64,
        quantity: Decimal,
        created_by: Option<String>,
    ) -> Result<TransferReceipt, ServiceError> {
        if from_shop_id == to_shop_id {
            return Err(ServiceError::TransferImbalance(
                "source and destination shop must differ".to_string(),
            ));
        }
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "transfer quantity must be positive, got {}",
                quantity
            )));
        }

        let db = self.db_pool.as_ref();
        let reference = format!("TRF-{}", Uuid::new_v4().simple());
        let voucher = reference.clone();

        let (outbound, inbound) = db
            .transaction::<_, (stock_movement::Model, stock_movement::Model), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let converter = UnitConverter::load(txn).await?;
                        let ingredient = Ingredient::find_by_id(ingredient_id)
                            .one(txn)
                            .await
                            .map_err(ServiceError::db_error)?
                            .ok_or(ServiceError::IngredientNotFound(ingredient_id))?;

                        let native_qty =
                            converter.convert(quantity, unit_id, ingredient.unit_id)?;

                        let outbound = insert_movement(
                            txn,
                            &converter,
                            &NewMovement {
                                shop_id: from_shop_id,
                                ingredient_id,
                                unit_id: ingredient.unit_id,
                                change: -native_qty,
                                reason: MovementReason::Transfer,
                                reference: voucher.clone(),
                                unit_cost: None,
                                total_cost: None,
                                remark: Some(format!("transfer to shop {}", to_shop_id)),
                                created_by: created_by.clone(),
                            },
                        )
                        .await?;

                        let inbound = insert_movement(
                            txn,
                            &converter,
                            &NewMovement {
                                shop_id: to_shop_id,
                                ingredient_id,
                                unit_id: ingredient.unit_id,
                                change: native_qty,
                                reason: MovementReason::Transfer,
                                reference: voucher,
                                unit_cost: None,
                                total_cost: None,
                                remark: Some(format!("transfer from shop {}", from_shop_id)),
                                created_by,
                            },
                        )
                        .await?;

                        BalanceMaterializer::materialize(
                            txn,
                            &converter,
                            from_shop_id,
                            ingredient_id,
                        )
                        .await?;
                        BalanceMaterializer::materialize(txn, &converter, to_shop_id, ingredient_id)
                            .await?;

                        Ok((outbound, inbound))
                    })
                },
            )
            .await
            .map_err(unwrap_txn_err)?;

        info!(
            reference = %reference,
            from_shop_id = %from_shop_id,
            to_shop_id = %to_shop_id,
            ingredient_id = %ingredient_id,
            "Recorded stock transfer"
        );

        self.event_sender
            .send(Event::TransferRecorded {
                reference: reference.clone(),
                from_shop_id,
                to_shop_id,
                ingredient_id,
                quantity: inbound.change,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(TransferReceipt {
            reference,
            outbound,
            inbound,
        })
    }

    /// Commits a sale and materializes its ingredient consumption as real
    /// ledger movements: one `Sales` row per matching recipe line and one
    /// `Wastage` row per active wastage rule (rows whose computed quantity
    /// is non-positive are skipped). Keeping these on the ledger makes the
    /// materialized stock balance agree with the sales report instead of
    /// the two being independently derived views.
    #[instrument(skip(self, draft), fields(shop_id = %draft.shop_id, reference = %draft.reference))]
    pub async fn record_sale(&self, draft: SaleDraft) -> Result<SaleReceipt, ServiceError> {
        if draft.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "sale must contain at least one item".to_string(),
            ));
        }
        if let Some(item) = draft.items.iter().find(|i| i.qty <= Decimal::ZERO) {
            return Err(ServiceError::ValidationError(format!(
                "sale item for product {} must have a positive quantity, got {}",
                item.product_id, item.qty
            )));
        }

        let db = self.db_pool.as_ref();
        let event_draft = (draft.shop_id, draft.reference.clone(), draft.sold_at);

        let receipt = db
            .transaction::<_, SaleReceipt, ServiceError>(move |txn| {
                Box::pin(async move {
                    let converter = UnitConverter::load(txn).await?;

                    let sale_row = sale::ActiveModel {
                        shop_id: Set(draft.shop_id),
                        reference: Set(draft.reference.clone()),
                        sold_at: Set(draft.sold_at),
                        created_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await
                    .map_err(ServiceError::db_error)?;

                    for item in &draft.items {
                        sale_item::ActiveModel {
                            sale_id: Set(sale_row.id),
                            product_id: Set(item.product_id),
                            qty: Set(item.qty),
                            price: Set(item.price),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await
                        .map_err(ServiceError::db_error)?;
                    }

                    let mut movements = Vec::new();
                    let mut touched: BTreeSet<i64> = BTreeSet::new();

                    for item in &draft.items {
                        let consumption = derive_consumption_for_item(
                            txn,
                            &converter,
                            draft.shop_id,
                            item.product_id,
                            item.qty,
                        )
                        .await?;

                        for line in consumption {
                            let movement = insert_movement(
                                txn,
                                &converter,
                                &NewMovement {
                                    shop_id: draft.shop_id,
                                    ingredient_id: line.ingredient_id,
                                    unit_id: line.native_unit_id,
                                    change: -line.quantity,
                                    reason: line.reason,
                                    reference: draft.reference.clone(),
                                    unit_cost: None,
                                    total_cost: None,
                                    remark: None,
                                    created_by: draft.created_by.clone(),
                                },
                            )
                            .await?;
                            touched.insert(movement.ingredient_id);
                            movements.push(movement);
                        }
                    }

                    for ingredient_id in touched {
                        BalanceMaterializer::materialize(
                            txn,
                            &converter,
                            draft.shop_id,
                            ingredient_id,
                        )
                        .await?;
                    }

                    Ok(SaleReceipt {
                        sale: sale_row,
                        movements,
                    })
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        let (shop_id, reference, sold_at) = event_draft;
        info!(
            sale_id = %receipt.sale.id,
            shop_id = %shop_id,
            movement_count = receipt.movements.len(),
            "Recorded sale with derived consumption"
        );

        self.event_sender
            .send(Event::SaleRecorded {
                sale_id: receipt.sale.id,
                shop_id,
                reference,
                sold_at,
            })
            .await
            .map_err(ServiceError::EventError)?;

        Ok(receipt)
    }

    /// Soft-deletes a movement and recomputes its balance. The correction
    /// path for an append-only ledger: the row stays, flagged, and every
    /// read path skips it.
    #[instrument(skip(self))]
    pub async fn void_movement(
        &self,
        movement_id: i64,
    ) -> Result<stock_movement::Model, ServiceError> {
        let db = self.db_pool.as_ref();

        let voided = db
            .transaction::<_, stock_movement::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let movement = stock_movement::Entity::find_by_id(movement_id)
                        .one(txn)
                        .await
                        .map_err(ServiceError::db_error)?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!("movement {} not found", movement_id))
                        })?;

                    if movement.deleted_at.is_some() {
                        return Err(ServiceError::InvalidOperation(format!(
                            "movement {} is already voided",
                            movement_id
                        )));
                    }

                    let mut active: stock_movement::ActiveModel = movement.into();
                    active.deleted_at = Set(Some(Utc::now()));
                    let voided = active.update(txn).await.map_err(ServiceError::db_error)?;

                    let converter = UnitConverter::load(txn).await?;
                    BalanceMaterializer::materialize(
                        txn,
                        &converter,
                        voided.shop_id,
                        voided.ingredient_id,
                    )
                    .await?;

                    Ok(voided)
                })
            })
            .await
            .map_err(unwrap_txn_err)?;

        info!(movement_id = %voided.id, "Voided stock movement");
        Ok(voided)
    }
}

/// One derived consumption line for a sold item, already converted to the
/// ingredient's native unit.
struct ConsumptionLine {
    ingredient_id: i64,
    native_unit_id: i64,
    quantity: Decimal,
    reason: MovementReason,
}

/// Derives recipe consumption and active wastage for `sold_qty` of a
/// product at a shop, in native units.
async fn derive_consumption_for_item<C: ConnectionTrait>(
    conn: &C,
    converter: &UnitConverter,
    shop_id: i64,
    product_id: i64,
    sold_qty: Decimal,
) -> Result<Vec<ConsumptionLine>, ServiceError> {
    let mut lines = Vec::new();

    let recipe_lines = RecipeLine::find()
        .filter(recipe_line::Column::ShopId.eq(shop_id))
        .filter(recipe_line::Column::ProductId.eq(product_id))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    for recipe in recipe_lines {
        let ingredient = Ingredient::find_by_id(recipe.ingredient_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::IngredientNotFound(recipe.ingredient_id))?;

        let consumed = recipe.quantity_required * sold_qty;
        let native = converter.convert(consumed, recipe.unit_id, ingredient.unit_id)?;
        lines.push(ConsumptionLine {
            ingredient_id: recipe.ingredient_id,
            native_unit_id: ingredient.unit_id,
            quantity: native,
            reason: MovementReason::Sales,
        });
    }

    let rules = WastageRule::find()
        .filter(wastage_rule::Column::ProductId.eq(product_id))
        .filter(wastage_rule::Column::IsActive.eq(true))
        .all(conn)
        .await
        .map_err(ServiceError::db_error)?;

    for rule in rules {
        if rule.per_qty <= Decimal::ZERO {
            continue;
        }
        let wastage = (sold_qty / rule.per_qty) * rule.wastage_qty;
        if wastage <= Decimal::ZERO {
            continue;
        }

        let ingredient = Ingredient::find_by_id(rule.ingredient_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::IngredientNotFound(rule.ingredient_id))?;

        let native = converter.convert(wastage, rule.unit_id, ingredient.unit_id)?;
        lines.push(ConsumptionLine {
            ingredient_id: rule.ingredient_id,
            native_unit_id: ingredient.unit_id,
            quantity: native,
            reason: MovementReason::Wastage,
        });
    }

    Ok(lines)
}

/// Validates the movement against reference data and appends it. The unit
/// the caller recorded in must share a base unit with the ingredient's
/// native unit; the change itself is stored unconverted.
async fn insert_movement<C: ConnectionTrait>(
    conn: &C,
    converter: &UnitConverter,
    movement: &NewMovement,
) -> Result<stock_movement::Model, ServiceError> {
    let ingredient = Ingredient::find_by_id(movement.ingredient_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or(ServiceError::IngredientNotFound(movement.ingredient_id))?;

    if !converter.compatible(movement.unit_id, ingredient.unit_id)? {
        let from = converter.get(movement.unit_id)?;
        let to = converter.get(ingredient.unit_id)?;
        return Err(ServiceError::IncompatibleUnits {
            from_base: from.base_unit.clone(),
            to_base: to.base_unit.clone(),
        });
    }

    stock_movement::ActiveModel {
        shop_id: Set(movement.shop_id),
        ingredient_id: Set(movement.ingredient_id),
        unit_id: Set(movement.unit_id),
        change: Set(movement.change),
        reason: Set(movement.reason.as_str().to_string()),
        reference: Set(movement.reference.clone()),
        unit_cost: Set(movement.unit_cost),
        total_cost: Set(movement.total_cost),
        remark: Set(movement.remark.clone()),
        created_by: Set(movement.created_by.clone()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

fn unwrap_txn_err(e: TransactionError<ServiceError>) -> ServiceError {
    match e {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}
