use sea_orm::error::DbErr;
use serde::Serialize;
use thiserror::Error;

/// Unified error type for the ledger and valuation services.
///
/// Write-path errors are always fatal to the surrounding transaction;
/// the reporting paths catch `IncompatibleUnits` / `UnitNotFound` locally
/// and degrade instead of aborting the whole query.
#[derive(Error, Debug, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Unit {0} not found")]
    UnitNotFound(i64),

    #[error("Ingredient {0} not found")]
    IngredientNotFound(i64),

    #[error("Incompatible units: cannot convert {from_base} to {to_base}")]
    IncompatibleUnits { from_base: String, to_base: String },

    #[error("Transfer imbalance: {0}")]
    TransferImbalance(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ServiceError {
    /// Helper for mapping `DbErr` in `map_err` chains.
    pub fn db_error(err: DbErr) -> Self {
        ServiceError::DatabaseError(err)
    }

    /// True for the unit-resolution failures the reporting pipeline is
    /// allowed to swallow (falling back to the raw quantity).
    pub fn is_unit_error(&self) -> bool {
        matches!(
            self,
            ServiceError::IncompatibleUnits { .. } | ServiceError::UnitNotFound(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(errors.to_string())
    }
}
