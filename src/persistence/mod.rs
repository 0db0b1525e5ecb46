//! Persistence Layer
//!
//! SQLite ledger shared with the downstream reporting service. Uses sqlx for
//! async access; the schema is created on start-up.
//!
//! # Database Schema
//!
//! ## bot_status
//! Heartbeat singleton (id is always 1)
//! - last_ping, is_active, balance, equity
//!
//! ## trades
//! Append-only closed-trade ledger, including balance movements
//! - ticket: closing deal ticket, UNIQUE
//! - symbol ("BALANCE" for deposits/withdrawals)
//! - side: "BUY", "SELL" or "BALANCE"
//! - volume, open_price, open_time, close_price, net_profit, close_time
//! - owner_tag, recorded_at
//!
//! ## live_positions
//! Mirror of the venue's open, owned positions. Fully replaced every cycle.
//!
//! ## market_monitoring
//! Latest evaluation per watched instrument, keyed by symbol

pub mod models;
pub mod repository;

pub use repository::SqliteLedger;

use crate::domain::errors::LedgerError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

impl From<DatabaseError> for LedgerError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::ConnectionError(e) => LedgerError::Unavailable(e.to_string()),
            DatabaseError::MigrationError(msg) => LedgerError::Unavailable(msg),
        }
    }
}

/// Initialize the database with default pool settings
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(&DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    })
    .await
}

/// Initialize the database connection pool
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                })?;
            }
        }
    }

    let mut options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
    if !config.log_queries {
        options = options.disable_statement_logging();
    }

    // Each connection to an in-memory database is its own database, so the
    // pool must hold on to exactly one.
    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bot_status (
            id INTEGER PRIMARY KEY CHECK(id = 1),
            last_ping TEXT NOT NULL,
            is_active BOOLEAN NOT NULL,
            balance REAL NOT NULL,
            equity REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create bot_status table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket INTEGER NOT NULL UNIQUE,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL', 'BALANCE')),
            volume REAL NOT NULL,
            open_price REAL NOT NULL,
            open_time TEXT NOT NULL,
            close_price REAL NOT NULL,
            net_profit REAL NOT NULL,
            close_time TEXT NOT NULL,
            owner_tag INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS live_positions (
            ticket INTEGER PRIMARY KEY,
            symbol TEXT NOT NULL,
            direction TEXT NOT NULL CHECK(direction IN ('BUY', 'SELL')),
            volume REAL NOT NULL,
            entry_price REAL NOT NULL,
            current_price REAL NOT NULL,
            stop_price REAL,
            target_price REAL,
            opened_at TEXT NOT NULL,
            unrealized_profit REAL NOT NULL,
            owner_tag INTEGER NOT NULL,
            mirrored_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create live_positions table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS market_monitoring (
            symbol TEXT PRIMARY KEY,
            price REAL NOT NULL,
            indicator_value REAL NOT NULL,
            oracle_probability REAL NOT NULL,
            decision_status TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create market_monitoring table: {}", e))
    })?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_close_time ON trades(close_time)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_symbol ON trades(symbol)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/sentinel.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Enable query logging
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/sentinel.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/sentinel.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(cfg!(debug_assertions));

        Self {
            url,
            max_connections,
            log_queries,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}
