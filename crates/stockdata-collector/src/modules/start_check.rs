//! 월 시작일 점검.
//!
//! 파티션이 있는 달도 첫 봉 날짜가 그 달의 기대 시작일(첫 거래일 또는 상장일)과 다르면
//! 앞부분이 빠진 것으로 봅니다. 보충은 빠진 앞부분만 요청합니다.

use chrono::NaiveDate;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;
use std::time::Instant;
use stockdata_core::{day_before, last_trading_day, DateRange, StockCode, YearMonth};
use stockdata_store::metadata::write_missing_months;
use tracing::{debug, error, info, warn};

use super::backfill::{BackfillKind, BackfillRequest, Backfiller};
use super::checkpoint::ProgressTracker;
use crate::context::{CheckContext, ContextSources};
use crate::stats::CheckStats;
use crate::Result;

/// 체크포인트 작업 이름
pub const WORKFLOW: &str = "check-start";

/// 상장월은 상장일부터 기대하므로 상장일을 항상 읽습니다.
pub const CONTEXT_SOURCES: ContextSources = ContextSources {
    reference_calendar: true,
    list_dates: true,
};

#[derive(Debug, Clone, Default)]
pub struct StartCheckOptions {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub fetch: bool,
    pub output_missing: Option<PathBuf>,
}

/// 보충이 필요한 달.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthNeed {
    pub month: YearMonth,
    /// 파티션의 실제 첫 봉 날짜. `None`이면 달 전체가 없거나 읽을 수 없음.
    pub actual_first: Option<NaiveDate>,
}

/// 기대 월을 순서대로 보며 시작일이 맞지 않는 달을 찾습니다.
pub fn check_start_dates(
    ctx: &CheckContext,
    code: &StockCode,
    options: &StartCheckOptions,
) -> Vec<MonthNeed> {
    let expected = ctx.expected_months(
        code,
        options.start_date.as_deref(),
        options.end_date.as_deref(),
    );

    let mut needs = Vec::new();
    for month in expected {
        let Some(expected_first) = ctx.effective_first(code, month) else {
            needs.push(MonthNeed { month, actual_first: None });
            continue;
        };

        let path = ctx.layout.month_file(code, month);
        if !path.exists() {
            needs.push(MonthNeed { month, actual_first: None });
            continue;
        }

        let actual_first = match ctx.probe.first_bar(&path) {
            Ok(first) => first.map(|t| t.date()),
            Err(e) => {
                warn!(stock = %code, month = %month, error = %e, "첫 봉 읽기 실패");
                None
            }
        };
        if actual_first != Some(expected_first) {
            debug!(stock = %code, month = %month, expected = %expected_first, actual = ?actual_first, "시작일 불일치");
            needs.push(MonthNeed { month, actual_first });
        }
    }
    needs
}

/// 보충 구간.
///
/// - 시작: 그 달의 기대 시작일, 없으면 캘린더 첫 거래일, 그것도 없으면 1일
/// - 실제 첫 봉이 시작보다 늦으면 `[시작, 실제 첫 봉 전날]` (빈 구간이면 `None`)
/// - 그 외에는 `[시작, min(그 달 마지막 평일, data_end)]`
pub fn backfill_range(ctx: &CheckContext, code: &StockCode, need: &MonthNeed) -> Option<DateRange> {
    let start = ctx
        .effective_first(code, need.month)
        .or_else(|| ctx.calendar.get(need.month))
        .unwrap_or_else(|| need.month.first_day());

    match need.actual_first {
        Some(actual) if actual > start => DateRange::new(start, day_before(actual)),
        _ => DateRange::new(start, last_trading_day(need.month).min(ctx.data_end)),
    }
}

/// 종목 목록 시작일 점검.
pub async fn check_start(
    ctx: &CheckContext,
    codes: &[StockCode],
    options: &StartCheckOptions,
    backfiller: &dyn Backfiller,
    pool: Option<&SqlitePool>,
) -> Result<CheckStats> {
    let started = Instant::now();
    let mut stats = CheckStats::new();
    let mut tracker = ProgressTracker::new(pool, WORKFLOW);
    let mut missing_rows = Vec::new();

    info!(stocks = codes.len(), fetch = options.fetch, "월 시작일 점검 시작");

    for code in codes {
        stats.total += 1;
        let needs = check_start_dates(ctx, code, options);
        if needs.is_empty() {
            stats.complete += 1;
            debug!(stock = %code, "월 시작일 모두 정상");
            tracker.advance(code.as_str()).await;
            continue;
        }

        stats.incomplete += 1;
        stats.missing_items += needs.len();
        let months: Vec<String> = needs.iter().map(|n| n.month.to_string()).collect();
        warn!(stock = %code, count = needs.len(), months = ?months, "보충 필요 월");

        for need in &needs {
            missing_rows.push((code.clone(), need.month));
            if !options.fetch {
                continue;
            }
            match backfill_range(ctx, code, need) {
                Some(range) => {
                    let request = BackfillRequest::new(code.clone(), range, BackfillKind::Month);
                    let ok = backfiller.fetch_range(&request).await;
                    if !ok {
                        error!(stock = %code, month = %need.month, "보충 실패");
                    }
                    stats.record_backfill(ok);
                }
                None => debug!(stock = %code, month = %need.month, "보충할 날짜 없음"),
            }
        }
        tracker.advance(code.as_str()).await;
    }
    tracker.complete().await;

    if let Some(path) = &options.output_missing {
        if !missing_rows.is_empty() {
            write_missing_months(path, &missing_rows)?;
            info!(path = %path.display(), rows = missing_rows.len(), "보충 필요 목록 저장");
        }
    }
    if stats.missing_items > 0 && !options.fetch {
        info!(months = stats.missing_items, "--fetch로 보충 수집 가능");
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}
