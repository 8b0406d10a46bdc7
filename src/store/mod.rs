// Privacy Guard — Store Module
//
// SQLite-backed storage for monitor policies, the per-user main policy flag
// and the access log used for usage reports.

mod db;
mod error;
mod models;
mod repository;

pub use db::Database;
pub use error::StoreError;
pub use models::{AccessLogEntry, DateRange, MonitorPolicy, UsageCount};
pub use repository::{PolicyStore, SqlitePolicyStore};
