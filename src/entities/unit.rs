use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Measurement unit reference data. Immutable once created.
///
/// Two units are compatible iff their `base_unit` strings match;
/// `conversion_rate` maps one unit to its base-unit quantity
/// (e.g. kilogram has rate 1000 when the base is "g").
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "units")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub symbol: String,
    pub base_unit: String,
    #[sea_orm(column_type = "Decimal(Some((19, 6)))")]
    pub conversion_rate: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
