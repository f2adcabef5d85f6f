pub mod balance;
pub mod ledger;
pub mod movements;
pub mod units;
pub mod valuation;

pub use balance::BalanceMaterializer;
pub use ledger::LedgerService;
pub use movements::MovementReportService;
pub use units::{UnitConverter, UnitService};
pub use valuation::ValuationService;
