//! PostgreSQL storage backend.
//!
//! The production backend. The gate locks the account row with
//! `SELECT ... FOR UPDATE` inside a transaction, so gate calls serialize
//! per-account while different accounts proceed fully concurrently.

mod accounts;
mod ledger;
mod samples;

pub use accounts::PostgresAccountRepo;
pub use ledger::PostgresLedgerRepo;
pub use samples::PostgresSampleRepo;
