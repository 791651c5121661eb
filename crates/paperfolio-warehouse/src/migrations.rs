use ::duckdb::{params, Connection, OptionalExt};

/// Ordered schema steps; a step's number is its index plus one.
const STEPS: &[(&str, &str)] = &[
    (
        "price history",
        "CREATE TABLE IF NOT EXISTS daily_prices (
            symbol TEXT NOT NULL,
            date DATE NOT NULL,
            price DOUBLE NOT NULL,
            volume DOUBLE NOT NULL DEFAULT 0,
            source TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (symbol, date)
        );
        CREATE TABLE IF NOT EXISTS ingest_log (
            request_id TEXT NOT NULL,
            symbol TEXT,
            source TEXT NOT NULL,
            row_count BIGINT NOT NULL,
            status TEXT NOT NULL,
            timestamp TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    ),
    (
        "ingest audit index",
        "CREATE INDEX IF NOT EXISTS ingest_log_by_symbol ON ingest_log (symbol, timestamp);",
    ),
    (
        "result cache",
        "CREATE TABLE IF NOT EXISTS result_cache (
            key TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            expires_at_ms BIGINT NOT NULL
        );",
    ),
];

/// Brings the schema up to the latest step and returns the resulting version.
///
/// Versions are tracked in `schema_migrations`; steps already recorded there
/// are skipped, so reopening a database is a no-op.
pub fn apply_migrations(connection: &Connection) -> Result<usize, ::duckdb::Error> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    let current = current_version(connection)?;
    for (index, (name, sql)) in STEPS.iter().enumerate().skip(current) {
        connection.execute_batch(sql)?;
        connection.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?, ?)",
            params![index as i64 + 1, name],
        )?;
    }

    Ok(STEPS.len().max(current))
}

fn current_version(connection: &Connection) -> Result<usize, ::duckdb::Error> {
    let version: Option<i64> = connection
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.map_or(0, |version| usize::try_from(version).unwrap_or(0)))
}
