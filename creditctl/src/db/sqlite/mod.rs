//! SQLite storage backend.
//!
//! Used for development and tests. SQLite has no row-level `FOR UPDATE`, so
//! the gate takes the database writer lock up front with `BEGIN IMMEDIATE` -
//! coarser than the per-account lock the PostgreSQL backend holds, but it
//! upholds the same serialization guarantee. UUIDs are stored as TEXT.

mod accounts;
mod ledger;
mod samples;

pub use accounts::SqliteAccountRepo;
pub use ledger::SqliteLedgerRepo;
pub use samples::SqliteSampleRepo;

use uuid::Uuid;

use super::error::{DbError, DbResult};

fn parse_uuid(value: &str) -> DbResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| DbError::Other(anyhow::anyhow!("invalid uuid in database: {e}")))
}
