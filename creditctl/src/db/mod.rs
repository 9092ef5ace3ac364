//! Storage layer: a pool façade over PostgreSQL and SQLite backends.
//!
//! Handlers never talk to sqlx directly; they go through the repository trait
//! objects cached on [`DbPool`] at construction time. PostgreSQL is the
//! production backend, SQLite serves development and the test suite. All
//! queries use the runtime API so the crate builds without a live database.

mod error;
pub mod models;
pub mod postgres;
pub mod repos;
pub mod sqlite;

use std::sync::Arc;

pub use error::{DbError, DbResult};
use repos::{AccountRepo, LedgerRepo, SampleRepo};

use crate::config::DatabaseConfig;

/// Repository trait objects, created once at startup.
struct CachedRepos {
    ledger: Arc<dyn LedgerRepo>,
    accounts: Arc<dyn AccountRepo>,
    samples: Arc<dyn SampleRepo>,
}

enum PoolStorage {
    Sqlite(sqlx::SqlitePool),
    Postgres(sqlx::PgPool),
}

/// Database pool supporting both SQLite and PostgreSQL.
pub struct DbPool {
    inner: PoolStorage,
    repos: CachedRepos,
}

impl DbPool {
    /// Create a DbPool from an existing SQLite pool.
    /// Primarily useful for testing.
    pub fn from_sqlite(pool: sqlx::SqlitePool) -> Self {
        let repos = CachedRepos {
            ledger: Arc::new(sqlite::SqliteLedgerRepo::new(pool.clone())),
            accounts: Arc::new(sqlite::SqliteAccountRepo::new(pool.clone())),
            samples: Arc::new(sqlite::SqliteSampleRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Sqlite(pool),
            repos,
        }
    }

    /// Create a DbPool from an existing PostgreSQL pool.
    pub fn from_postgres(pool: sqlx::PgPool) -> Self {
        let repos = CachedRepos {
            ledger: Arc::new(postgres::PostgresLedgerRepo::new(pool.clone())),
            accounts: Arc::new(postgres::PostgresAccountRepo::new(pool.clone())),
            samples: Arc::new(postgres::PostgresSampleRepo::new(pool.clone())),
        };
        DbPool {
            inner: PoolStorage::Postgres(pool),
            repos,
        }
    }

    /// Create a database pool from configuration
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        match config {
            DatabaseConfig::Sqlite {
                path,
                max_connections,
            } => {
                let options = sqlx::sqlite::SqliteConnectOptions::new()
                    .filename(path)
                    .create_if_missing(true)
                    // Writers queue on the BEGIN IMMEDIATE lock instead of
                    // failing with SQLITE_BUSY.
                    .busy_timeout(std::time::Duration::from_secs(5));
                let pool = sqlx::sqlite::SqlitePoolOptions::new()
                    .max_connections(*max_connections)
                    .connect_with(options)
                    .await?;
                Ok(Self::from_sqlite(pool))
            }
            DatabaseConfig::Postgres {
                url,
                max_connections,
            } => {
                let pool = sqlx::postgres::PgPoolOptions::new()
                    .max_connections(*max_connections)
                    .connect(url)
                    .await?;
                Ok(Self::from_postgres(pool))
            }
        }
    }

    /// Run database migrations using sqlx's migration runner.
    /// This automatically creates and manages a _sqlx_migrations table.
    pub async fn run_migrations(&self) -> DbResult<()> {
        match &self.inner {
            PoolStorage::Sqlite(pool) => {
                tracing::info!("Running SQLite migrations");
                sqlx::migrate!("./migrations/sqlite").run(pool).await?;
            }
            PoolStorage::Postgres(pool) => {
                tracing::info!("Running PostgreSQL migrations");
                sqlx::migrate!("./migrations/postgres").run(pool).await?;
            }
        }
        Ok(())
    }

    /// Get the credit ledger gate
    pub fn ledger(&self) -> Arc<dyn LedgerRepo> {
        Arc::clone(&self.repos.ledger)
    }

    /// Get the account repository
    pub fn accounts(&self) -> Arc<dyn AccountRepo> {
        Arc::clone(&self.repos.accounts)
    }

    /// Get the showcase sample repository
    pub fn samples(&self) -> Arc<dyn SampleRepo> {
        Arc::clone(&self.repos.samples)
    }

    /// Health check for database connectivity
    pub async fn health_check(&self) -> DbResult<()> {
        match &self.inner {
            PoolStorage::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            PoolStorage::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }
}
