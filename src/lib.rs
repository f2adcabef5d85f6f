//! shopledger
//!
//! Inventory ledger and valuation core for a multi-shop point-of-sale
//! backend: an append-only stock-movement ledger per (shop, ingredient),
//! unit-conversion arithmetic, materialized stock balances, a unified
//! movement report, and average-cost / period-COGS valuation.
//!
//! HTTP controllers, authentication, and rendering live upstream; they call
//! into the services exposed here and feed them structured inputs
//! (movements, recipes, wastage rules, sales).
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod services;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared state handed to upstream collaborators (request handlers, jobs).
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub ledger: services::LedgerService,
    pub movements: services::MovementReportService,
    pub valuation: services::ValuationService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let ledger = services::LedgerService::new(db.clone(), event_sender.clone());
        let movements = services::MovementReportService::new(db.clone());
        let valuation = services::ValuationService::new(db.clone());
        Self {
            db,
            config,
            event_sender,
            ledger,
            movements,
            valuation,
        }
    }
}
