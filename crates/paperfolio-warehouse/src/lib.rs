//! # Paperfolio Warehouse
//!
//! DuckDB storage for daily price history. This is what the persisted data tier
//! reads when the live provider is unavailable or returns too little history.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `daily_prices` | One price and volume per symbol per calendar day |
//! | `ingest_log` | One audit row per ingested batch |
//! | `result_cache` | Serialized analytics results with an expiry (unix millis) |
//! | `schema_migrations` | Applied migration versions |
//!
//! All values reach SQL as bound parameters; symbols and dates are never
//! interpolated into statements.

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, OptionalExt, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use crate::duckdb::DuckDbConnectionManager;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A row failed validation; the whole batch is rejected.
    #[error("invalid price record at row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },
}

/// Location and pool sizing for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for paperfolio data.
    pub paperfolio_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Idle connections kept between calls.
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    pub fn in_home(paperfolio_home: impl Into<PathBuf>) -> Self {
        let paperfolio_home = paperfolio_home.into();
        let db_path = paperfolio_home.join("cache").join("warehouse.duckdb");
        Self {
            paperfolio_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::in_home(resolve_paperfolio_home())
    }
}

/// One stored daily observation. Dates are `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub symbol: String,
    pub date: String,
    pub price: f64,
    pub volume: f64,
}

/// Stored history for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolCoverage {
    pub symbol: String,
    pub rows: u64,
    pub first_date: String,
    pub last_date: String,
}

/// Handle to the price history database.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    /// Open the warehouse under `$PAPERFOLIO_HOME` (or `~/.paperfolio`).
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (creating if needed) the database and apply migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::new(config.db_path.clone(), config.max_pool_size);
        let warehouse = Self { config, manager };
        warehouse
            .manager
            .with_connection(|connection| -> Result<(), WarehouseError> {
                migrations::apply_migrations(connection)?;
                Ok(())
            })?;
        Ok(warehouse)
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn home(&self) -> &Path {
        self.config.paperfolio_home.as_path()
    }

    /// Insert or replace daily rows for any number of symbols in one transaction.
    ///
    /// Every row is validated first; one bad row rejects the batch and nothing
    /// is written. Returns the number of rows written.
    pub fn upsert_daily_prices(
        &self,
        source: &str,
        request_id: &str,
        rows: &[PriceRecord],
    ) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        for (index, row) in rows.iter().enumerate() {
            validate_record(index, row)?;
        }

        self.manager.with_connection(|connection| -> Result<usize, WarehouseError> {
            connection.execute_batch("BEGIN TRANSACTION")?;
            let result = (|| -> Result<usize, WarehouseError> {
                for row in rows {
                    let params: [&dyn ToSql; 5] =
                        [&row.symbol, &row.date, &row.price, &row.volume, &source];
                    connection.execute(
                        "INSERT OR REPLACE INTO daily_prices \
                         (symbol, date, price, volume, source, updated_at) \
                         VALUES (?, CAST(? AS DATE), ?, ?, ?, CURRENT_TIMESTAMP)",
                        params.as_slice(),
                    )?;
                }

                let symbol = batch_symbol(rows);
                let row_count = rows.len() as i64;
                let params: [&dyn ToSql; 4] = [&request_id, &symbol, &source, &row_count];
                connection.execute(
                    "INSERT INTO ingest_log \
                     (request_id, symbol, source, row_count, status, timestamp) \
                     VALUES (?, ?, ?, ?, 'ok', CURRENT_TIMESTAMP)",
                    params.as_slice(),
                )?;

                Ok(rows.len())
            })();

            finalize_transaction(connection, result)
        })
    }

    /// Load rows for `symbol` with `since <= date <= until`, oldest first.
    pub fn load_daily_prices(
        &self,
        symbol: &str,
        since: &str,
        until: &str,
    ) -> Result<Vec<PriceRecord>, WarehouseError> {
        self.manager.with_connection(|connection| -> Result<Vec<PriceRecord>, WarehouseError> {
            let mut statement = connection.prepare(
                "SELECT symbol, CAST(date AS VARCHAR), price, volume \
                 FROM daily_prices \
                 WHERE symbol = ? AND date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE) \
                 ORDER BY date",
            )?;
            let params: [&dyn ToSql; 3] = [&symbol, &since, &until];
            let rows = statement.query_map(params.as_slice(), |row| {
                Ok(PriceRecord {
                    symbol: row.get(0)?,
                    date: row.get(1)?,
                    price: row.get(2)?,
                    volume: row.get(3)?,
                })
            })?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
    }

    /// Row counts and date bounds per stored symbol.
    pub fn coverage(&self) -> Result<Vec<SymbolCoverage>, WarehouseError> {
        self.manager.with_connection(|connection| -> Result<Vec<SymbolCoverage>, WarehouseError> {
            let mut statement = connection.prepare(
                "SELECT symbol, COUNT(*), CAST(MIN(date) AS VARCHAR), CAST(MAX(date) AS VARCHAR) \
                 FROM daily_prices GROUP BY symbol ORDER BY symbol",
            )?;
            let rows = statement.query_map([], |row| {
                let rows: i64 = row.get(1)?;
                Ok(SymbolCoverage {
                    symbol: row.get(0)?,
                    rows: u64::try_from(rows).unwrap_or(0),
                    first_date: row.get(2)?,
                    last_date: row.get(3)?,
                })
            })?;

            let mut coverage = Vec::new();
            for row in rows {
                coverage.push(row?);
            }
            Ok(coverage)
        })
    }
}

impl Warehouse {
    /// Cached body for `key` unless it expired at or before `now_ms`.
    pub fn load_cached_result(&self, key: &str, now_ms: i64) -> Result<Option<String>, WarehouseError> {
        self.manager.with_connection(|connection| -> Result<Option<String>, WarehouseError> {
            let params: [&dyn ToSql; 2] = [&key, &now_ms];
            let body = connection
                .query_row(
                    "SELECT body FROM result_cache WHERE key = ? AND expires_at_ms > ?",
                    params.as_slice(),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(body)
        })
    }

    pub fn store_cached_result(&self, key: &str, body: &str, expires_at_ms: i64) -> Result<(), WarehouseError> {
        self.manager.with_connection(|connection| -> Result<(), WarehouseError> {
            let params: [&dyn ToSql; 3] = [&key, &body, &expires_at_ms];
            connection.execute(
                "INSERT OR REPLACE INTO result_cache (key, body, expires_at_ms) VALUES (?, ?, ?)",
                params.as_slice(),
            )?;
            Ok(())
        })
    }

    pub fn remove_cached_result(&self, key: &str) -> Result<(), WarehouseError> {
        self.manager.with_connection(|connection| -> Result<(), WarehouseError> {
            let params: [&dyn ToSql; 1] = [&key];
            connection.execute("DELETE FROM result_cache WHERE key = ?", params.as_slice())?;
            Ok(())
        })
    }

    /// Deletes entries expired at `now_ms`; returns how many were removed.
    pub fn purge_expired_results(&self, now_ms: i64) -> Result<usize, WarehouseError> {
        self.manager.with_connection(|connection| -> Result<usize, WarehouseError> {
            let params: [&dyn ToSql; 1] = [&now_ms];
            let removed =
                connection.execute("DELETE FROM result_cache WHERE expires_at_ms <= ?", params.as_slice())?;
            Ok(removed)
        })
    }
}

fn validate_record(row: usize, record: &PriceRecord) -> Result<(), WarehouseError> {
    let reason = if record.symbol.trim().is_empty() {
        Some("symbol is empty")
    } else if record.date.trim().is_empty() {
        Some("date is empty")
    } else if !record.price.is_finite() || record.price <= 0.0 {
        Some("price must be finite and positive")
    } else if !record.volume.is_finite() || record.volume < 0.0 {
        Some("volume must be finite and non-negative")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(WarehouseError::InvalidRecord {
            row,
            reason: reason.to_owned(),
        }),
        None => Ok(()),
    }
}

/// The ingest log stores a symbol only for single-symbol batches.
fn batch_symbol(rows: &[PriceRecord]) -> Option<String> {
    let first = rows.first()?;
    rows.iter()
        .all(|row| row.symbol == first.symbol)
        .then(|| first.symbol.clone())
}

/// Commit on success, roll back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_paperfolio_home() -> PathBuf {
    if let Some(path) = env::var_os("PAPERFOLIO_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".paperfolio");
    }

    PathBuf::from(".paperfolio")
}
