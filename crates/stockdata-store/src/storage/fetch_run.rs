//! 수집·점검 작업 실행 기록 (`data_fetch_run`).
//!
//! 작업 하나를 실행할 때마다 `running`으로 기록하고 끝나면 상태를 갱신합니다.
//! `--skip-if-done-today`와 데몬은 오늘 성공 기록이 있으면 같은 작업을 건너뜁니다.

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, instrument};

use crate::error::{DataError, Result};

/// 실행 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(DataError::InvalidData(format!("unknown run status: {}", other))),
        }
    }
}

/// 실행 기록 레코드.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FetchRunRecord {
    pub id: i64,
    pub task_type: String,
    /// `manual`, `cron`, `daemon`
    pub triggered_by: String,
    pub status: String,
    pub params_json: Option<String>,
    pub summary: Option<String>,
    pub run_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl FetchRunRecord {
    pub fn status(&self) -> Result<RunStatus> {
        self.status.parse()
    }
}

/// 실행 기록 저장소.
#[derive(Clone)]
pub struct FetchRunRepository {
    pool: SqlitePool,
}

impl FetchRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 기록을 만들고 id를 반환합니다.
    #[instrument(skip(self, params_json))]
    pub async fn create(
        &self,
        task_type: &str,
        triggered_by: &str,
        status: RunStatus,
        params_json: Option<&str>,
        run_at: NaiveDateTime,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO data_fetch_run (task_type, triggered_by, status, params_json, run_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(task_type)
        .bind(triggered_by)
        .bind(status.as_str())
        .bind(params_json)
        .bind(run_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, "실행 기록 생성");
        Ok(id)
    }

    /// 상태와 요약을 갱신합니다.
    pub async fn update_status(&self, id: i64, status: RunStatus, summary: Option<&str>) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE data_fetch_run
            SET status = ?1, summary = COALESCE(?2, summary), updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(status.as_str())
        .bind(summary)
        .bind(Local::now().naive_local())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound(format!("data_fetch_run id={}", id)));
        }
        Ok(())
    }

    /// 그 날짜에 성공한 같은 작업의 최신 기록.
    pub async fn get_today_success(
        &self,
        task_type: &str,
        today: NaiveDate,
    ) -> Result<Option<FetchRunRecord>> {
        let record = sqlx::query_as::<_, FetchRunRecord>(
            r#"
            SELECT id, task_type, triggered_by, status, params_json, summary, run_at, updated_at
            FROM data_fetch_run
            WHERE task_type = ?1 AND status = 'success' AND date(run_at) = ?2
            ORDER BY run_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(task_type)
        .bind(today.format("%Y-%m-%d").to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<FetchRunRecord>> {
        let record = sqlx::query_as::<_, FetchRunRecord>(
            r#"
            SELECT id, task_type, triggered_by, status, params_json, summary, run_at, updated_at
            FROM data_fetch_run
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// 최신순 목록. 작업 종류·실행일 필터는 선택.
    pub async fn list_runs(
        &self,
        task_type: Option<&str>,
        run_date: Option<NaiveDate>,
        limit: i64,
    ) -> Result<Vec<FetchRunRecord>> {
        let records = sqlx::query_as::<_, FetchRunRecord>(
            r#"
            SELECT id, task_type, triggered_by, status, params_json, summary, run_at, updated_at
            FROM data_fetch_run
            WHERE (?1 IS NULL OR task_type = ?1)
              AND (?2 IS NULL OR date(run_at) = ?2)
            ORDER BY run_at DESC, id DESC
            LIMIT ?3
            "#,
        )
        .bind(task_type)
        .bind(run_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;

    fn at(day: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    async fn repo() -> FetchRunRepository {
        let db = Database::in_memory().await.unwrap();
        FetchRunRepository::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let repo = repo().await;
        let id = repo
            .create("check-months", "manual", RunStatus::Running, Some(r#"{"fetch":true}"#), at(3, 9))
            .await
            .unwrap();

        repo.update_status(id, RunStatus::Success, Some("missing=0"))
            .await
            .unwrap();

        let record = repo.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(record.status().unwrap(), RunStatus::Success);
        assert_eq!(record.summary.as_deref(), Some("missing=0"));
        assert_eq!(record.run_at, at(3, 9));
        assert_eq!(record.params_json.as_deref(), Some(r#"{"fetch":true}"#));

        assert!(repo.get_by_id(id + 1).await.unwrap().is_none());
        assert!(matches!(
            repo.update_status(id + 1, RunStatus::Failed, None).await,
            Err(DataError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_today_success() {
        let repo = repo().await;
        let today = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();

        let failed = repo
            .create("check-daily", "daemon", RunStatus::Failed, None, at(3, 8))
            .await
            .unwrap();
        assert!(repo.get_today_success("check-daily", today).await.unwrap().is_none());

        let yesterday = repo
            .create("check-daily", "daemon", RunStatus::Success, None, at(2, 8))
            .await
            .unwrap();
        assert!(repo.get_today_success("check-daily", today).await.unwrap().is_none());

        let ok = repo
            .create("check-daily", "daemon", RunStatus::Success, None, at(3, 10))
            .await
            .unwrap();
        let found = repo.get_today_success("check-daily", today).await.unwrap().unwrap();
        assert_eq!(found.id, ok);
        assert_ne!(found.id, failed);
        assert_ne!(found.id, yesterday);

        assert!(repo.get_today_success("check-index", today).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_runs_filters_newest_first() {
        let repo = repo().await;
        repo.create("check-months", "manual", RunStatus::Success, None, at(1, 9))
            .await
            .unwrap();
        repo.create("check-daily", "cron", RunStatus::Success, None, at(2, 9))
            .await
            .unwrap();
        repo.create("check-months", "cron", RunStatus::Failed, None, at(3, 9))
            .await
            .unwrap();

        let all = repo.list_runs(None, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].run_at, at(3, 9));

        let months = repo.list_runs(Some("check-months"), None, 10).await.unwrap();
        assert_eq!(months.len(), 2);

        let day2 = repo
            .list_runs(None, NaiveDate::from_ymd_opt(2024, 6, 2), 10)
            .await
            .unwrap();
        assert_eq!(day2.len(), 1);
        assert_eq!(day2[0].task_type, "check-daily");

        assert_eq!(repo.list_runs(None, None, 1).await.unwrap().len(), 1);
    }
}
