//! 작업 실행 기록 (`data_fetch_run`).
//!
//! 점검 작업을 `running`으로 기록하고 끝나면 결과 요약과 함께 `success`/`failed`로 갱신합니다.
//! `--skip-if-done-today`와 데몬은 오늘 성공한 같은 작업을 건너뜁니다.

use chrono::{Local, NaiveDate};
use serde_json::Value;
use sqlx::sqlite::SqlitePool;
use std::future::Future;
use stockdata_store::{FetchRunRepository, RunStatus};
use tracing::{info, warn};

use crate::stats::CheckStats;
use crate::Result;

/// 실행 주체
pub const TRIGGER_MANUAL: &str = "manual";
pub const TRIGGER_DAEMON: &str = "daemon";

/// 실행 기록기. 기록 실패는 경고만 남기고 작업 결과에 영향을 주지 않습니다.
#[derive(Clone)]
pub struct RunLedger {
    repo: FetchRunRepository,
    triggered_by: &'static str,
}

impl RunLedger {
    pub fn new(pool: SqlitePool, triggered_by: &'static str) -> Self {
        Self {
            repo: FetchRunRepository::new(pool),
            triggered_by,
        }
    }

    pub fn repository(&self) -> &FetchRunRepository {
        &self.repo
    }

    /// 그 날짜에 같은 작업이 성공했는지.
    pub async fn done_on(&self, task: &str, day: NaiveDate) -> bool {
        match self.repo.get_today_success(task, day).await {
            Ok(record) => record.is_some(),
            Err(e) => {
                warn!(task, error = %e, "실행 기록 조회 실패");
                false
            }
        }
    }

    /// `running` 기록을 만들고 id를 반환합니다.
    pub async fn start(&self, task: &str, params: &Value) -> Option<i64> {
        let params_json = params.to_string();
        match self
            .repo
            .create(
                task,
                self.triggered_by,
                RunStatus::Running,
                Some(&params_json),
                Local::now().naive_local(),
            )
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(task, error = %e, "실행 기록 생성 실패");
                None
            }
        }
    }

    /// 작업 결과로 기록을 갱신합니다.
    pub async fn finish(&self, id: i64, result: &Result<CheckStats>) {
        let (status, summary) = match result {
            Ok(stats) => (RunStatus::Success, stats.summary_line()),
            Err(e) => (RunStatus::Failed, e.to_string()),
        };
        if let Err(e) = self.repo.update_status(id, status, Some(&summary)).await {
            warn!(id, error = %e, "실행 기록 갱신 실패");
        }
    }

    /// 건너뛴 실행도 남겨둡니다.
    pub async fn skipped(&self, task: &str, params: &Value) {
        if let Some(id) = self.start(task, params).await {
            if let Err(e) = self
                .repo
                .update_status(id, RunStatus::Skipped, Some("already succeeded today"))
                .await
            {
                warn!(id, error = %e, "실행 기록 갱신 실패");
            }
        }
    }
}

/// 작업 하나를 실행 기록과 함께 돌립니다.
///
/// 오늘 이미 성공했고 `skip_if_done_today`이면 `Ok(None)`을 반환합니다.
pub async fn run_recorded<F>(
    ledger: Option<&RunLedger>,
    task: &str,
    params: Value,
    skip_if_done_today: bool,
    work: F,
) -> Result<Option<CheckStats>>
where
    F: Future<Output = Result<CheckStats>>,
{
    let Some(ledger) = ledger else {
        if skip_if_done_today {
            warn!(task, "DATABASE_URL 없음, --skip-if-done-today 무시");
        }
        return work.await.map(Some);
    };

    if skip_if_done_today && ledger.done_on(task, Local::now().date_naive()).await {
        info!(task, "오늘 이미 성공한 작업, 건너뜀");
        ledger.skipped(task, &params).await;
        return Ok(None);
    }

    let id = ledger.start(task, &params).await;
    let result = work.await;
    if let Some(id) = id {
        ledger.finish(id, &result).await;
    }
    result.map(Some)
}
