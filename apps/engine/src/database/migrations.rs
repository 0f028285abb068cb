use anyhow::Result;
use libsql::Connection;

/// Schema version - increment when making schema changes
const SCHEMA_VERSION: i32 = 2;

/// Run database migrations
///
/// The engine owns the schema. Dashboards and other readers never migrate.
pub async fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL,
            description TEXT
        )",
        (),
    )
    .await?;

    let current_version = get_current_version(conn).await?;

    if current_version >= SCHEMA_VERSION {
        tracing::debug!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    tracing::info!("Running migrations from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        run_migration_v1(conn).await?;
        record_migration(conn, 1, "Services, checks and alerts").await?;
    }

    if current_version < 2 {
        run_migration_v2(conn).await?;
        record_migration(conn, 2, "Indexes for aggregate reads and alert lookup").await?;
    }

    tracing::info!("Database migrations completed successfully (now at version {})", SCHEMA_VERSION);
    Ok(())
}

async fn get_current_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn.query("SELECT MAX(version) FROM schema_migrations", ()).await?;

    if let Some(row) = rows.next().await? {
        let version: Option<i32> = row.get(0)?;
        Ok(version.unwrap_or(0))
    } else {
        Ok(0)
    }
}

async fn record_migration(conn: &Connection, version: i32, description: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();

    conn.execute(
        "INSERT INTO schema_migrations (version, applied_at, description) VALUES (?, ?, ?)",
        libsql::params![version, now, description],
    )
    .await?;

    tracing::info!("Applied migration v{}: {}", version, description);
    Ok(())
}

/// Migration v1: services, the append-only check log, and alerts.
///
/// `alerts` deliberately carries no foreign key to `services`; the service is
/// referenced through `metadata.service_id` only.
async fn run_migration_v1(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            url TEXT NOT NULL,
            check_interval INTEGER NOT NULL DEFAULT 5,
            is_paused INTEGER NOT NULL DEFAULT 0,
            content_keyword TEXT,
            status TEXT NOT NULL DEFAULT 'unknown',
            last_check INTEGER,
            uptime_percentage REAL NOT NULL DEFAULT 0,
            avg_response_time INTEGER NOT NULL DEFAULT 0,
            ssl_expiry_date INTEGER,
            ssl_issuer TEXT,
            created_at INTEGER NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL,
            status TEXT NOT NULL,
            response_time INTEGER NOT NULL,
            status_code INTEGER,
            error_message TEXT,
            ttfb INTEGER,
            response_size INTEGER,
            checked_at INTEGER NOT NULL,
            check_region TEXT NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS alerts (
            id TEXT PRIMARY KEY,
            severity TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            is_dismissed INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}'
        )",
        (),
    )
    .await?;

    Ok(())
}

/// Migration v2: indexes backing the count aggregates, the latency window and
/// the open-alert lookup.
async fn run_migration_v2(conn: &Connection) -> Result<()> {
    conn.execute("CREATE INDEX IF NOT EXISTS idx_services_paused ON services(is_paused)", ()).await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checks_service_checked_at ON checks(service_id, checked_at DESC)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checks_service_status_checked_at ON checks(service_id, status, checked_at DESC)",
        (),
    )
    .await?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alerts_open ON alerts(is_dismissed, alert_type, created_at DESC)",
        (),
    )
    .await?;

    tracing::info!("Added check log and alert indexes");
    Ok(())
}
