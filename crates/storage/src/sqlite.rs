use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    smarthub_common::{SlaveIdentity, SlaveKind, SlaveStatus, TelemetryRecord},
    sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::store::{SlaveRepository, StoreError, StoreResult, TelemetryRepository, cancellable};

/// SQLite-backed slave and telemetry store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct SlaveRow {
    kind: String,
    mac: String,
    name: String,
    status: String,
}

#[derive(sqlx::FromRow)]
struct TelemetryRow {
    source_mac: String,
    value: f64,
    recorded_at: String,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn parse_kind(raw: &str) -> StoreResult<SlaveKind> {
    match raw {
        "device" => Ok(SlaveKind::Device),
        "sensor" => Ok(SlaveKind::Sensor),
        other => Err(StoreError::Corrupt(format!("unknown slave kind: {other}"))),
    }
}

fn parse_status(raw: &str) -> SlaveStatus {
    match raw {
        "on" => SlaveStatus::On,
        "off" => SlaveStatus::Off,
        _ => SlaveStatus::Unknown,
    }
}

impl TryFrom<SlaveRow> for SlaveIdentity {
    type Error = StoreError;

    fn try_from(r: SlaveRow) -> StoreResult<Self> {
        Ok(Self {
            kind: parse_kind(&r.kind)?,
            mac: r.mac,
            name: r.name,
            status: parse_status(&r.status),
        })
    }
}

impl TryFrom<TelemetryRow> for TelemetryRecord {
    type Error = StoreError;

    fn try_from(r: TelemetryRow) -> StoreResult<Self> {
        let timestamp = DateTime::parse_from_rfc3339(&r.recorded_at)
            .map_err(|e| StoreError::Corrupt(format!("recorded_at {}: {e}", r.recorded_at)))?
            .with_timezone(&Utc);
        Ok(Self {
            source_mac: r.source_mac,
            value: r.value,
            timestamp,
        })
    }
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database file and its tables.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(&pool).await?;
        debug!(path = %path.display(), "opened sqlite store");
        Ok(Self::new(pool))
    }

    /// Single-connection in-memory database.
    pub async fn in_memory() -> StoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Create the `slaves` and `telemetry` tables if they don't exist.
    pub async fn init(pool: &SqlitePool) -> StoreResult<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS slaves (
                kind       TEXT NOT NULL,
                mac        TEXT NOT NULL,
                name       TEXT NOT NULL,
                status     TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (kind, mac)
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS telemetry (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                source_mac  TEXT NOT NULL,
                value       REAL NOT NULL,
                recorded_at TEXT NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_telemetry_source ON telemetry (source_mac, id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl SlaveRepository for SqliteStore {
    async fn exists_by_mac(
        &self,
        kind: SlaveKind,
        mac: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<bool> {
        cancellable(cancel, async {
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM slaves WHERE kind = ? AND mac = ?")
                    .bind(kind.as_str())
                    .bind(mac)
                    .fetch_one(&self.pool)
                    .await?;
            Ok::<_, StoreError>(count > 0)
        })
        .await
    }

    async fn add(&self, slave: &SlaveIdentity, cancel: &CancellationToken) -> StoreResult<()> {
        cancellable(cancel, async {
            let now = now_ms();
            sqlx::query(
                r#"INSERT INTO slaves (kind, mac, name, status, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?)"#,
            )
            .bind(slave.kind.as_str())
            .bind(&slave.mac)
            .bind(&slave.name)
            .bind(slave.status.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn update(&self, slave: &SlaveIdentity, cancel: &CancellationToken) -> StoreResult<()> {
        cancellable(cancel, async {
            let result = sqlx::query(
                "UPDATE slaves SET name = ?, status = ?, updated_at = ? WHERE kind = ? AND mac = ?",
            )
            .bind(&slave.name)
            .bind(slave.status.as_str())
            .bind(now_ms())
            .bind(slave.kind.as_str())
            .bind(&slave.mac)
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 0 {
                debug!(kind = %slave.kind, mac = %slave.mac, "update of missing slave row ignored");
            }
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn get(
        &self,
        kind: SlaveKind,
        mac: &str,
        cancel: &CancellationToken,
    ) -> StoreResult<Option<SlaveIdentity>> {
        cancellable(cancel, async {
            let row = sqlx::query_as::<_, SlaveRow>(
                "SELECT kind, mac, name, status FROM slaves WHERE kind = ? AND mac = ?",
            )
            .bind(kind.as_str())
            .bind(mac)
            .fetch_optional(&self.pool)
            .await?;
            row.map(SlaveIdentity::try_from).transpose()
        })
        .await
    }
}

#[async_trait]
impl TelemetryRepository for SqliteStore {
    async fn append(&self, record: &TelemetryRecord, cancel: &CancellationToken) -> StoreResult<()> {
        cancellable(cancel, async {
            sqlx::query("INSERT INTO telemetry (source_mac, value, recorded_at) VALUES (?, ?, ?)")
                .bind(&record.source_mac)
                .bind(record.value)
                .bind(record.timestamp.to_rfc3339())
                .execute(&self.pool)
                .await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn recent(
        &self,
        source_mac: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<TelemetryRecord>> {
        cancellable(cancel, async {
            let rows = sqlx::query_as::<_, TelemetryRow>(
                r#"SELECT source_mac, value, recorded_at FROM telemetry
                   WHERE source_mac = ? ORDER BY id DESC LIMIT ?"#,
            )
            .bind(source_mac)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
            rows.into_iter()
                .map(TelemetryRecord::try_from)
                .collect::<StoreResult<Vec<_>>>()
        })
        .await
    }
}
