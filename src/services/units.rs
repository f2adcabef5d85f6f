use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use tracing::instrument;

use crate::entities::unit::{self, Entity as Unit};
use crate::errors::ServiceError;

/// Pure unit-conversion arithmetic over loaded unit reference data.
///
/// Units are immutable, so a converter snapshot never goes stale within a
/// request. The struct is cheap to clone and safe to share across tasks.
#[derive(Debug, Clone, Default)]
pub struct UnitConverter {
    units: HashMap<i64, unit::Model>,
}

impl UnitConverter {
    /// Loads every unit row into an in-memory converter.
    pub async fn load<C: ConnectionTrait>(db: &C) -> Result<Self, ServiceError> {
        let units = Unit::find().all(db).await.map_err(ServiceError::db_error)?;
        Ok(Self::from_units(units))
    }

    pub fn from_units(units: Vec<unit::Model>) -> Self {
        Self {
            units: units.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn get(&self, unit_id: i64) -> Result<&unit::Model, ServiceError> {
        self.units
            .get(&unit_id)
            .ok_or(ServiceError::UnitNotFound(unit_id))
    }

    /// Converts `amount` from one unit to another sharing the same base
    /// unit: `amount * from.conversion_rate / to.conversion_rate`.
    ///
    /// Unit creation rejects non-positive conversion rates, so the
    /// division here is total.
    pub fn convert(
        &self,
        amount: Decimal,
        from_unit_id: i64,
        to_unit_id: i64,
    ) -> Result<Decimal, ServiceError> {
        if from_unit_id == to_unit_id {
            return Ok(amount);
        }

        let from = self.get(from_unit_id)?;
        let to = self.get(to_unit_id)?;

        if from.base_unit != to.base_unit {
            return Err(ServiceError::IncompatibleUnits {
                from_base: from.base_unit.clone(),
                to_base: to.base_unit.clone(),
            });
        }

        let amount_in_base = amount * from.conversion_rate;
        Ok(amount_in_base / to.conversion_rate)
    }

    /// True when both units resolve and share a base unit.
    pub fn compatible(&self, a: i64, b: i64) -> Result<bool, ServiceError> {
        Ok(self.get(a)?.base_unit == self.get(b)?.base_unit)
    }
}

/// Write-side management of unit reference data.
pub struct UnitService;

impl UnitService {
    /// Persists a new unit. A non-positive conversion rate is rejected at
    /// creation time; the converter does not re-check it.
    #[instrument(skip(db))]
    pub async fn create_unit<C: ConnectionTrait>(
        db: &C,
        name: &str,
        symbol: &str,
        base_unit: &str,
        conversion_rate: Decimal,
    ) -> Result<unit::Model, ServiceError> {
        if conversion_rate <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "conversion_rate must be positive, got {} for unit '{}'",
                conversion_rate, name
            )));
        }

        let model = unit::ActiveModel {
            name: Set(name.to_string()),
            symbol: Set(symbol.to_string()),
            base_unit: Set(base_unit.to_string()),
            conversion_rate: Set(conversion_rate),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        model.insert(db).await.map_err(ServiceError::db_error)
    }
}
