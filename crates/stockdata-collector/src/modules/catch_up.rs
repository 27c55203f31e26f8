//! 마지막 로컬 날짜 이후 분봉 보충 (catch-up).

use chrono::NaiveDate;
use sqlx::sqlite::SqlitePool;
use std::time::Instant;
use stockdata_core::{day_after, parse_yyyymmdd, DateRange, StockCode};
use tracing::{error, info, warn};

use super::backfill::{BackfillKind, BackfillRequest, Backfiller};
use super::checkpoint::ProgressTracker;
use crate::context::CheckContext;
use crate::stats::CheckStats;
use crate::Result;

/// 체크포인트 작업 이름
pub const WORKFLOW: &str = "catch-up";

/// 종목 하나의 catch-up 판정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUpPlan {
    /// 로컬 데이터가 없어 시작일을 알 수 없음
    NoLocalData,
    /// 마지막 로컬 날짜가 종료일 이후
    UpToDate(NaiveDate),
    Fetch(DateRange),
}

/// 종료일: 유효한 `--end-date`, 아니면 데이터 종료일.
pub fn resolve_end(end_date: Option<&str>, data_end: NaiveDate) -> NaiveDate {
    let Some(raw) = end_date.map(str::trim).filter(|s| !s.is_empty()) else {
        return data_end;
    };
    match parse_yyyymmdd(raw) {
        Some(end) => end,
        None => {
            warn!(end_date = raw, fallback = %data_end, "잘못된 --end-date 무시");
            data_end
        }
    }
}

pub fn plan_catch_up(last_local: Option<NaiveDate>, end: NaiveDate) -> CatchUpPlan {
    let Some(last) = last_local else {
        return CatchUpPlan::NoLocalData;
    };
    if last >= end {
        return CatchUpPlan::UpToDate(last);
    }
    match DateRange::new(day_after(last), end) {
        Some(range) => CatchUpPlan::Fetch(range),
        None => CatchUpPlan::UpToDate(last),
    }
}

/// 종목 목록 catch-up.
pub async fn catch_up(
    ctx: &CheckContext,
    codes: &[StockCode],
    end_date: Option<&str>,
    backfiller: &dyn Backfiller,
    pool: Option<&SqlitePool>,
) -> Result<CheckStats> {
    let started = Instant::now();
    let end = resolve_end(end_date, ctx.data_end);
    let mut stats = CheckStats::new();
    let mut tracker = ProgressTracker::new(pool, WORKFLOW);

    info!(stocks = codes.len(), end = %end, "catch-up 시작");

    for code in codes {
        stats.total += 1;
        let last_local = match ctx.last_local_date(code) {
            Ok(last) => last,
            Err(e) => {
                error!(stock = %code, error = %e, "파티션 조회 실패");
                stats.errors += 1;
                tracker.advance(code.as_str()).await;
                continue;
            }
        };

        match plan_catch_up(last_local, end) {
            CatchUpPlan::NoLocalData => {
                warn!(stock = %code, "로컬 데이터 없음, 마지막 날짜를 알 수 없어 건너뜀");
                stats.skipped += 1;
            }
            CatchUpPlan::UpToDate(last) => {
                info!(stock = %code, last_local = %last, end = %end, "이미 최신");
                stats.complete += 1;
            }
            CatchUpPlan::Fetch(range) => {
                stats.incomplete += 1;
                stats.missing_items += 1;
                let request = BackfillRequest::new(code.clone(), range, BackfillKind::CatchUp);
                let ok = backfiller.fetch_range(&request).await;
                if !ok {
                    warn!(stock = %code, range = %range, "catch-up 보충 실패");
                }
                stats.record_backfill(ok);
            }
        }
        tracker.advance(code.as_str()).await;
    }
    tracker.complete().await;

    stats.elapsed = started.elapsed();
    Ok(stats)
}
