//! 종목별 분봉 커버리지 (`stock_minute_coverage`).

use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::error::Result;

/// 종목 하나의 분봉 보유 구간.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CoverageRecord {
    pub symbol: String,
    pub start_dt: Option<NaiveDateTime>,
    pub end_dt: Option<NaiveDateTime>,
    pub month_files: i64,
    pub last_scan_at: NaiveDateTime,
}

#[derive(Clone)]
pub struct CoverageRepository {
    pool: SqlitePool,
}

impl CoverageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &CoverageRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_minute_coverage (symbol, start_dt, end_dt, month_files, last_scan_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (symbol)
            DO UPDATE SET
                start_dt = excluded.start_dt,
                end_dt = excluded.end_dt,
                month_files = excluded.month_files,
                last_scan_at = excluded.last_scan_at
            "#,
        )
        .bind(&record.symbol)
        .bind(record.start_dt)
        .bind(record.end_dt)
        .bind(record.month_files)
        .bind(record.last_scan_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, symbol: &str) -> Result<Option<CoverageRecord>> {
        let record = sqlx::query_as::<_, CoverageRecord>(
            r#"
            SELECT symbol, start_dt, end_dt, month_files, last_scan_at
            FROM stock_minute_coverage
            WHERE symbol = ?1
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// 종목 코드 순 페이지 조회.
    pub async fn list(&self, offset: i64, limit: i64) -> Result<Vec<CoverageRecord>> {
        let records = sqlx::query_as::<_, CoverageRecord>(
            r#"
            SELECT symbol, start_dt, end_dt, month_files, last_scan_at
            FROM stock_minute_coverage
            ORDER BY symbol
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stock_minute_coverage")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
