use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};

/// Why a stock movement happened.
///
/// Stored as a string column but modeled as a closed enum so a typo can
/// never create a category the reporting pipeline silently misclassifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementReason {
    Purchase,
    Sales,
    Wastage,
    Transfer,
    Adjustment,
}

impl MovementReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementReason::Purchase => "purchase",
            MovementReason::Sales => "sales",
            MovementReason::Wastage => "wastage",
            MovementReason::Transfer => "transfer",
            MovementReason::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase" => Some(MovementReason::Purchase),
            "sales" => Some(MovementReason::Sales),
            "wastage" => Some(MovementReason::Wastage),
            "transfer" => Some(MovementReason::Transfer),
            "adjustment" => Some(MovementReason::Adjustment),
            _ => None,
        }
    }
}

/// Append-only ledger entry for one stock change of one ingredient at one
/// shop. Rows are never updated or deleted in normal operation; corrections
/// set `deleted_at` and trigger a balance recompute.
///
/// `change` is positive for stock-in, negative for stock-out, and is stored
/// in whatever `unit_id` the caller recorded in — a purchase may land in
/// kilograms while the ingredient's native unit is grams. Consumers that
/// need the native-unit total convert at read time.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub shop_id: i64,
    pub ingredient_id: i64,
    pub unit_id: i64,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub change: Decimal,
    pub reason: String,
    pub reference: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub unit_cost: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub total_cost: Option<Decimal>,
    pub remark: Option<String>,
    pub created_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Parses the stored reason string back into the closed enum.
    pub fn reason(&self) -> Result<MovementReason, crate::errors::ServiceError> {
        MovementReason::from_str(&self.reason).ok_or_else(|| {
            crate::errors::ServiceError::InternalError(format!(
                "unrecognized movement reason '{}' on movement {}",
                self.reason, self.id
            ))
        })
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::ingredient::Entity",
        from = "Column::IngredientId",
        to = "super::ingredient::Column::Id"
    )]
    Ingredient,
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id"
    )]
    Shop,
    #[sea_orm(
        belongs_to = "super::unit::Entity",
        from = "Column::UnitId",
        to = "super::unit::Column::Id"
    )]
    Unit,
}

impl Related<super::ingredient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Ingredient.def()
    }
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if let ActiveValue::NotSet = active_model.created_at {
            active_model.created_at = Set(Utc::now());
        }
        Ok(active_model)
    }
}
