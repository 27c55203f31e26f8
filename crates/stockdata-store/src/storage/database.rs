//! SQLite 연결 풀과 스키마.
//!
//! 실행 기록(`data_fetch_run`), 체크포인트(`sync_checkpoint`),
//! 커버리지(`stock_minute_coverage`) 세 테이블을 사용합니다.
//! 스키마는 연결 시 `CREATE TABLE IF NOT EXISTS`로 맞춥니다.

use serde::Deserialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DataError, Result};

const SCHEMA: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS data_fetch_run (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        task_type TEXT NOT NULL,
        triggered_by TEXT NOT NULL,
        status TEXT NOT NULL,
        params_json TEXT,
        summary TEXT,
        run_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_data_fetch_run_task_run_at
        ON data_fetch_run (task_type, run_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_checkpoint (
        workflow_name TEXT PRIMARY KEY,
        last_ticker TEXT,
        last_processed_at TEXT,
        total_processed INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_minute_coverage (
        symbol TEXT PRIMARY KEY,
        start_dt TEXT,
        end_dt TEXT,
        month_files INTEGER NOT NULL DEFAULT 0,
        last_scan_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_stock_minute_coverage_end
        ON stock_minute_coverage (end_dt)
    "#,
];

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL (sqlite://path/to/stockdata.db)
    pub url: String,
    /// 풀의 최대 연결 수
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    4
}
fn default_connect_timeout() -> u64 {
    30
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// 데이터베이스 연결 풀 래퍼.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// 파일 DB에 연결하고 스키마를 맞춥니다. 파일이 없으면 만듭니다.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %config.url, "Connecting to database...");

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| DataError::ConnectionError(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.connect_timeout_secs));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;

        let db = Self { pool };
        db.migrate().await?;
        info!("Database connection established");
        Ok(db)
    }

    /// 테스트용 메모리 DB. 연결마다 DB가 따로 생기므로 연결은 하나만 씁니다.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DataError::ConnectionError(e.to_string()))?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// 스키마 생성 (멱등).
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!(statements = SCHEMA.len(), "스키마 확인 완료");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.migrate().await.unwrap();

        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN \
             ('data_fetch_run', 'sync_checkpoint', 'stock_minute_coverage')",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_connect_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockdata.db");
        let config = DatabaseConfig::new(format!("sqlite://{}", path.display()));
        let db = Database::connect(&config).await.unwrap();
        db.close().await;
        assert!(path.exists());
    }
}
