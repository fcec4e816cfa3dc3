//! `PostgreSQL` persistence layer.
//!
//! Repository-per-aggregate over `sqlx`, plus [`PgStore`], the
//! `PersistenceStore` implementation the control loop consumes, and
//! [`StoredAlertDispatcher`], which records alerts instead of delivering
//! them anywhere.

pub mod database;
pub mod models;
pub mod repositories;
pub mod store;

pub use database::DatabaseClient;
pub use models::{
    AlertRecord, EarnPositionRecord, LoanPositionRecord, PortfolioRecord, TransactionRecord,
};
pub use repositories::{
    AlertRepository, EarnPositionRepository, LoanPositionRepository, PortfolioRepository,
    TransactionRepository,
};
pub use store::{PgStore, StoredAlertDispatcher};
