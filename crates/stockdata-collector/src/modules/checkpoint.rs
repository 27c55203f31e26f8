//! 점검 작업 체크포인트 관리 모듈.
//!
//! 전체 종목을 도는 점검은 오래 걸리므로 진행 상태를 `sync_checkpoint`에 남깁니다.
//!
//! # 주요 기능
//!
//! - **체크포인트 저장**: N개 처리마다 마지막 종목 저장
//! - **중단점 재개**: `--resume`이면 중단된 종목 다음부터 처리
//! - **중단 마킹**: Ctrl+C 등으로 끝나면 `running` → `interrupted`
//!
//! # 사용 예
//!
//! ```rust,ignore
//! let resume = load_checkpoint(pool, "check-months").await?;
//! save_checkpoint(pool, "check-months", "600066.SH", 100, CheckpointStatus::Running).await?;
//! save_checkpoint(pool, "check-months", "", total, CheckpointStatus::Completed).await?;
//! ```

use chrono::{Local, NaiveDateTime};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::future::Future;
use tracing::{debug, warn};

use crate::error::CollectorError;
use crate::Result;

/// 체크포인트 저장 주기 (종목 수)
pub const CHECKPOINT_EVERY: usize = 100;

/// 체크포인트 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    /// 실행 중
    Running,
    /// 중단됨 (재개 가능)
    Interrupted,
    /// 완료됨
    Completed,
}

impl CheckpointStatus {
    /// 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Interrupted => "interrupted",
            Self::Completed => "completed",
        }
    }
}

/// 체크포인트 저장.
///
/// # Arguments
/// * `workflow` - 작업 이름 (e.g., "check-months", "check-start")
/// * `ticker` - 마지막 처리한 종목 (완료 시 빈 문자열)
/// * `total_processed` - 지금까지 처리한 수
pub async fn save_checkpoint(
    pool: &SqlitePool,
    workflow: &str,
    ticker: &str,
    total_processed: i64,
    status: CheckpointStatus,
) -> Result<()> {
    let now = Local::now().naive_local();
    sqlx::query(
        r#"
        INSERT INTO sync_checkpoint (workflow_name, last_ticker, last_processed_at, total_processed, status, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?3)
        ON CONFLICT (workflow_name)
        DO UPDATE SET
            last_ticker = excluded.last_ticker,
            last_processed_at = excluded.last_processed_at,
            total_processed = excluded.total_processed,
            status = excluded.status,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(workflow)
    .bind(ticker)
    .bind(now)
    .bind(total_processed)
    .bind(status.as_str())
    .execute(pool)
    .await?;
    Ok(())
}

/// 중단된 작업의 마지막 종목.
///
/// # Returns
/// * `Some(ticker)` - 중단 지점
/// * `None` - 중단점이 없거나 완료된 상태
pub async fn load_checkpoint(pool: &SqlitePool, workflow: &str) -> Result<Option<String>> {
    let result: Option<(Option<String>,)> = sqlx::query_as(
        r#"
        SELECT last_ticker
        FROM sync_checkpoint
        WHERE workflow_name = ?1 AND status = 'interrupted'
        "#,
    )
    .bind(workflow)
    .fetch_optional(pool)
    .await?;

    Ok(result.and_then(|(t,)| t).filter(|t| !t.is_empty()))
}

/// 실행 중인 작업을 "interrupted"로 마킹.
pub async fn mark_interrupted(pool: &SqlitePool, workflow: &str) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE sync_checkpoint
        SET status = 'interrupted', updated_at = ?2
        WHERE workflow_name = ?1 AND status = 'running'
        "#,
    )
    .bind(workflow)
    .bind(Local::now().naive_local())
    .execute(pool)
    .await?;
    Ok(())
}

/// 체크포인트 삭제.
pub async fn clear_checkpoint(pool: &SqlitePool, workflow: &str) -> Result<()> {
    sqlx::query("DELETE FROM sync_checkpoint WHERE workflow_name = ?1")
        .bind(workflow)
        .execute(pool)
        .await?;
    Ok(())
}

/// 모든 작업의 체크포인트 조회.
pub async fn list_checkpoints(pool: &SqlitePool) -> Result<Vec<CheckpointInfo>> {
    let rows = sqlx::query_as::<_, CheckpointInfo>(
        r#"
        SELECT workflow_name, last_ticker, last_processed_at, total_processed, status
        FROM sync_checkpoint
        ORDER BY workflow_name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// 체크포인트 정보
#[derive(Debug, Clone, FromRow)]
pub struct CheckpointInfo {
    pub workflow_name: String,
    pub last_ticker: Option<String>,
    pub last_processed_at: Option<NaiveDateTime>,
    pub total_processed: i64,
    pub status: String,
}

/// 종목 루프용 진행 기록기. DB가 없으면 아무것도 하지 않습니다.
///
/// 중단 시에는 호출 측이 [`mark_interrupted`]로 마지막 저장 지점을 재개 대상으로 바꿉니다.
/// 저장 실패는 경고만 남기고 점검을 멈추지 않습니다.
pub struct ProgressTracker<'a> {
    pool: Option<&'a SqlitePool>,
    workflow: &'a str,
    processed: i64,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(pool: Option<&'a SqlitePool>, workflow: &'a str) -> Self {
        Self {
            pool,
            workflow,
            processed: 0,
        }
    }

    /// 종목 하나 처리 후 호출. 주기마다 저장합니다.
    pub async fn advance(&mut self, ticker: &str) {
        self.processed += 1;
        if self.processed as usize % CHECKPOINT_EVERY != 0 {
            return;
        }
        self.save(ticker, CheckpointStatus::Running).await;
    }

    /// 루프가 끝까지 돌았을 때 호출.
    pub async fn complete(&mut self) {
        self.save("", CheckpointStatus::Completed).await;
    }

    pub fn processed(&self) -> i64 {
        self.processed
    }

    async fn save(&self, ticker: &str, status: CheckpointStatus) {
        let Some(pool) = self.pool else {
            return;
        };
        match save_checkpoint(pool, self.workflow, ticker, self.processed, status).await {
            Ok(()) => debug!(workflow = self.workflow, ticker, processed = self.processed, status = status.as_str(), "체크포인트 저장"),
            Err(e) => warn!(workflow = self.workflow, error = %e, "체크포인트 저장 실패"),
        }
    }
}

/// Ctrl+C가 오면 작업을 멈추고 체크포인트를 `interrupted`로 바꿉니다.
///
/// 다음 실행에서 `--resume`으로 마지막 저장 종목 다음부터 이어갈 수 있습니다.
pub async fn until_interrupted<T, F>(pool: Option<&SqlitePool>, workflow: &str, work: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => {
            warn!(workflow, "중단 신호 수신");
            if let Some(pool) = pool {
                if let Err(e) = mark_interrupted(pool, workflow).await {
                    warn!(workflow, error = %e, "중단 마킹 실패");
                }
            }
            Err(CollectorError::Interrupted(workflow.to_string()))
        }
    }
}
