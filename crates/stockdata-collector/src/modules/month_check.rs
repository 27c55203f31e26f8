//! 월별 분봉 파티션 완전성 점검.
//!
//! 종목마다 기대 월 목록과 실제 파티션을 비교해 누락 월을 찾습니다.
//!
//! # 처리 흐름
//!
//! 1. 기대 월: 상장일·기본 시작일(또는 `--start-date`/`--end-date`) ~ 데이터 종료일
//! 2. 누락 월: 기대 월 − 보유 월
//! 3. `--check-first-bar`: 보유 월의 첫 봉이 정상인지 확인, 비정상이면 누락으로 처리
//! 4. 꼬리 구간: 마지막 로컬 날짜 이후 거래일이 있으면 `[last+1, data_end]`
//! 5. `--fetch`: 누락 월마다 달 전체를 보충하고 꼬리 구간을 보충

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;
use stockdata_core::{day_after, has_trading_days_between, DateRange, StockCode, YearMonth};
use stockdata_store::metadata::write_missing_months;
use stockdata_store::BarTimes;
use tracing::{debug, error, info, warn};

use super::backfill::{BackfillKind, BackfillRequest, Backfiller};
use super::checkpoint::ProgressTracker;
use crate::context::{CheckContext, ContextSources};
use crate::stats::CheckStats;
use crate::Result;

/// 체크포인트 작업 이름
pub const WORKFLOW: &str = "check-months";

/// 월 점검은 평일 근사 캘린더만 씁니다. 상장일은 `--use-stock-basic`일 때만 읽습니다.
pub fn context_sources(use_stock_basic: bool) -> ContextSources {
    ContextSources {
        reference_calendar: false,
        list_dates: use_stock_basic,
    }
}

/// 월 점검 옵션
#[derive(Debug, Clone, Default)]
pub struct MonthCheckOptions {
    /// 기대 구간 시작 (`YYYYMMDD`, 끝과 함께 줄 때만 사용)
    pub start_date: Option<String>,
    /// 기대 구간 끝
    pub end_date: Option<String>,
    /// 첫 봉 검증 여부
    pub check_first_bar: bool,
    /// 누락분 보충 수집 여부
    pub fetch: bool,
    /// 누락 월 목록 파일 (`code,yyyy,mm`)
    pub output_missing: Option<PathBuf>,
}

/// 종목 하나의 점검 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCheck {
    pub code: StockCode,
    pub existing: BTreeSet<YearMonth>,
    pub expected: Vec<YearMonth>,
    /// 정렬된 누락 월 (첫 봉 검증 실패 포함)
    pub missing: Vec<YearMonth>,
    /// 파티션은 있지만 첫 봉 검증에 실패한 달
    pub invalid_first_bar: Vec<YearMonth>,
    pub last_local: Option<NaiveDate>,
    /// 마지막 로컬 날짜 이후 보충할 구간
    pub tail: Option<DateRange>,
}

impl MonthCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.tail.is_none()
    }
}

/// 첫 봉 검증 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstBarVerdict {
    Valid,
    /// 행이 없음
    Empty,
    /// 그 달 기대 시작일보다 이른 날짜
    BeforeMonthStart(NaiveDateTime),
    /// 장 시작 시각이 아님
    UnexpectedOpen(NaiveDateTime),
}

impl FirstBarVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// 파티션 첫 봉 검증.
///
/// - 행이 없으면 실패
/// - 시각 컬럼이 없으면 통과 (판단 불가)
/// - 첫 봉 날짜가 `effective_first`보다 이르면 실패
/// - 09:00, 09:31 또는 09시 이전이면 통과, 그 외는 실패
pub fn first_bar_verdict(bars: &BarTimes, effective_first: Option<NaiveDate>) -> FirstBarVerdict {
    let first = match bars {
        BarTimes::NoTimeColumn => return FirstBarVerdict::Valid,
        BarTimes::Times(times) => match times.first() {
            Some(first) => *first,
            None => return FirstBarVerdict::Empty,
        },
    };

    if effective_first.is_some_and(|day| first.date() < day) {
        return FirstBarVerdict::BeforeMonthStart(first);
    }

    match (first.hour(), first.minute()) {
        (9, 0) | (9, 31) => FirstBarVerdict::Valid,
        (h, _) if h < 9 => FirstBarVerdict::Valid,
        _ => FirstBarVerdict::UnexpectedOpen(first),
    }
}

/// 보유 월의 첫 봉이 정상인지. 파일을 못 찾거나 읽지 못하면 `false`.
///
/// 첫 봉 날짜 비교는 상장일을 알 때만 합니다. 상장일이 없으면 시각만 봅니다.
pub fn month_first_bar_ok(ctx: &CheckContext, code: &StockCode, month: YearMonth) -> bool {
    let path = match ctx.layout.find_month_file(code, month) {
        Ok(Some(path)) => path,
        Ok(None) => {
            debug!(stock = %code, month = %month, "월 파일 없음");
            return false;
        }
        Err(e) => {
            warn!(stock = %code, month = %month, error = %e, "월 파일 조회 실패");
            return false;
        }
    };

    match ctx.probe.bar_times(&path) {
        Ok(bars) => {
            let month_start = ctx
                .list_date(code)
                .and_then(|_| ctx.effective_first(code, month));
            let verdict = first_bar_verdict(&bars, month_start);
            if !verdict.is_valid() {
                warn!(stock = %code, month = %month, verdict = ?verdict, "첫 봉 검증 실패");
            }
            verdict.is_valid()
        }
        Err(e) => {
            warn!(stock = %code, month = %month, error = %e, "파티션 읽기 실패");
            false
        }
    }
}

/// 마지막 로컬 날짜 이후 보충 구간.
///
/// `last < data_end`이고 `(last, data_end]`에 거래일이 있을 때만 `Some`.
pub fn tail_range(last_local: NaiveDate, data_end: NaiveDate) -> Option<DateRange> {
    if last_local >= data_end {
        return None;
    }
    let start = day_after(last_local);
    if !has_trading_days_between(start, data_end) {
        return None;
    }
    DateRange::new(start, data_end)
}

/// 달력상 한 달 전체 구간.
pub fn month_range(month: YearMonth) -> DateRange {
    DateRange {
        start: month.first_day(),
        end: month.last_day(),
    }
}

/// 종목 하나 점검.
pub fn check_stock(ctx: &CheckContext, code: &StockCode, options: &MonthCheckOptions) -> Result<MonthCheck> {
    let existing = ctx.layout.existing_months(code)?;
    let expected = ctx.expected_months(
        code,
        options.start_date.as_deref(),
        options.end_date.as_deref(),
    );

    let mut missing: Vec<YearMonth> = expected
        .iter()
        .filter(|m| !existing.contains(m))
        .copied()
        .collect();

    let mut invalid_first_bar = Vec::new();
    if options.check_first_bar && !existing.is_empty() {
        for month in expected.iter().filter(|m| existing.contains(m)) {
            if !month_first_bar_ok(ctx, code, *month) {
                invalid_first_bar.push(*month);
            }
        }
        missing.extend(invalid_first_bar.iter().copied());
        missing.sort();
    }

    let last_local = ctx.last_local_date(code)?;
    let tail = last_local.and_then(|last| tail_range(last, ctx.data_end));

    Ok(MonthCheck {
        code: code.clone(),
        existing,
        expected,
        missing,
        invalid_first_bar,
        last_local,
        tail,
    })
}

/// 종목 목록 월 점검 (선택적으로 보충 수집).
pub async fn check_months(
    ctx: &CheckContext,
    codes: &[StockCode],
    options: &MonthCheckOptions,
    backfiller: &dyn Backfiller,
    pool: Option<&SqlitePool>,
) -> Result<CheckStats> {
    let started = Instant::now();
    let mut stats = CheckStats::new();
    let mut tracker = ProgressTracker::new(pool, WORKFLOW);
    let mut missing_rows: Vec<(StockCode, YearMonth)> = Vec::new();

    info!(
        stocks = codes.len(),
        data_end = %ctx.data_end,
        check_first_bar = options.check_first_bar,
        fetch = options.fetch,
        "월 파티션 점검 시작"
    );

    for (idx, code) in codes.iter().enumerate() {
        stats.total += 1;
        let check = match check_stock(ctx, code, options) {
            Ok(check) => check,
            Err(e) => {
                error!(stock = %code, error = %e, "종목 점검 실패");
                stats.errors += 1;
                tracker.advance(code.as_str()).await;
                continue;
            }
        };

        if check.is_complete() {
            stats.complete += 1;
            debug!(stock = %code, months = check.expected.len(), "누락 없음");
        } else {
            stats.incomplete += 1;
            stats.missing_items += check.missing.len();
            info!(
                progress = format!("{}/{}", idx + 1, codes.len()),
                stock = %code,
                expected = check.expected.len(),
                existing = check.existing.len(),
                missing = check.missing.len(),
                invalid_first_bar = check.invalid_first_bar.len(),
                last_local = ?check.last_local,
                tail = ?check.tail.map(|r| r.to_string()),
                "누락 발견"
            );
        }
        missing_rows.extend(check.missing.iter().map(|m| (code.clone(), *m)));

        if options.fetch {
            for month in &check.missing {
                let request = BackfillRequest::new(code.clone(), month_range(*month), BackfillKind::Month);
                stats.record_backfill(backfiller.fetch_range(&request).await);
            }
            if let Some(tail) = check.tail {
                let request = BackfillRequest::new(code.clone(), tail, BackfillKind::Tail);
                stats.record_backfill(backfiller.fetch_range(&request).await);
            }
        }

        tracker.advance(code.as_str()).await;
    }
    tracker.complete().await;

    if let Some(path) = &options.output_missing {
        if !missing_rows.is_empty() {
            write_missing_months(path, &missing_rows)?;
            info!(path = %path.display(), rows = missing_rows.len(), "누락 월 목록 저장");
        }
    }

    stats.elapsed = started.elapsed();
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::MapProbe;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use stockdata_store::PartitionLayout;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ym(y: i32, m: u32) -> YearMonth {
        YearMonth::new(y, m).unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[derive(Default)]
    struct RecordingBackfiller {
        requests: Mutex<Vec<BackfillRequest>>,
    }

    #[async_trait]
    impl Backfiller for RecordingBackfiller {
        async fn fetch_range(&self, request: &BackfillRequest) -> bool {
            self.requests.lock().unwrap().push(request.clone());
            true
        }

        async fn fetch_missing_list(&self, _path: &Path) -> bool {
            true
        }
    }

    #[test]
    fn test_first_bar_verdict() {
        let bars = |s: &str| BarTimes::Times(vec![at(s)]);
        let first = Some(d(2024, 3, 1));

        assert!(first_bar_verdict(&bars("2024-03-01 09:31"), first).is_valid());
        assert!(first_bar_verdict(&bars("2024-03-01 09:00"), first).is_valid());
        assert!(first_bar_verdict(&bars("2024-03-01 08:59"), first).is_valid());
        assert!(first_bar_verdict(&BarTimes::NoTimeColumn, first).is_valid());

        assert_eq!(first_bar_verdict(&BarTimes::Times(vec![]), first), FirstBarVerdict::Empty);
        assert_eq!(
            first_bar_verdict(&bars("2024-02-29 09:31"), first),
            FirstBarVerdict::BeforeMonthStart(at("2024-02-29 09:31"))
        );
        assert_eq!(
            first_bar_verdict(&bars("2024-03-01 09:30"), first),
            FirstBarVerdict::UnexpectedOpen(at("2024-03-01 09:30"))
        );
        assert!(!first_bar_verdict(&bars("2024-03-01 13:01"), None).is_valid());
    }

    #[test]
    fn test_tail_range() {
        // 금요일까지 있고 데이터 종료일이 일요일이면 보충할 거래일 없음
        assert_eq!(tail_range(d(2024, 6, 7), d(2024, 6, 9)), None);
        assert_eq!(tail_range(d(2024, 6, 9), d(2024, 6, 9)), None);
        assert_eq!(
            tail_range(d(2024, 6, 7), d(2024, 6, 11)),
            DateRange::new(d(2024, 6, 8), d(2024, 6, 11))
        );
        assert_eq!(month_range(ym(2024, 2)).end, d(2024, 2, 29));
    }

    fn context(probe: Arc<MapProbe>, root: &Path) -> CheckContext {
        CheckContext::new(PartitionLayout::new(root), probe, d(2024, 1, 1), d(2024, 4, 10))
    }

    #[test]
    fn test_check_stock_without_partitions_misses_everything() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(Arc::new(MapProbe::default()), dir.path());
        let code = StockCode::parse("600066.SH").unwrap();

        let check = check_stock(&ctx, &code, &MonthCheckOptions::default()).unwrap();
        assert_eq!(check.missing, vec![ym(2024, 1), ym(2024, 2), ym(2024, 3), ym(2024, 4)]);
        assert_eq!(check.tail, None);
        assert_eq!(check.last_local, None);
    }

    #[test]
    fn test_check_stock_with_first_bar_validation() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let code = StockCode::parse("600066.SH").unwrap();
        let probe = Arc::new(MapProbe::default());
        probe.add(&layout, &code, ym(2024, 1), &["2024-01-02 09:31", "2024-01-31 15:00"]);
        probe.add(&layout, &code, ym(2024, 2), &["2024-02-01 10:31", "2024-02-29 15:00"]);
        probe.add(&layout, &code, ym(2024, 4), &["2024-04-01 09:31", "2024-04-03 15:00"]);
        let ctx = context(probe, dir.path());

        let plain = check_stock(&ctx, &code, &MonthCheckOptions::default()).unwrap();
        assert_eq!(plain.missing, vec![ym(2024, 3)]);
        assert_eq!(plain.last_local, Some(d(2024, 4, 3)));
        assert_eq!(plain.tail, DateRange::new(d(2024, 4, 4), d(2024, 4, 9)));

        let options = MonthCheckOptions {
            check_first_bar: true,
            ..Default::default()
        };
        let strict = check_stock(&ctx, &code, &options).unwrap();
        assert_eq!(strict.invalid_first_bar, vec![ym(2024, 2)]);
        assert_eq!(strict.missing, vec![ym(2024, 2), ym(2024, 3)]);
    }

    #[tokio::test]
    async fn test_check_months_fetches_and_writes_missing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let code = StockCode::parse("600066.SH").unwrap();
        let done = StockCode::parse("000001.SZ").unwrap();
        let probe = Arc::new(MapProbe::default());
        probe.add(&layout, &code, ym(2024, 1), &["2024-01-02 09:31", "2024-01-31 15:00"]);
        for month in 1..=4 {
            let last = if month == 4 { "2024-04-09 15:00" } else { "2024-01-31 15:00" };
            let first = format!("2024-{:02}-01 09:31", month);
            probe.add(&layout, &done, ym(2024, month), &[first.as_str(), last]);
        }
        let ctx = context(probe, dir.path());

        let output = dir.path().join("out/missing.csv");
        let options = MonthCheckOptions {
            fetch: true,
            output_missing: Some(output.clone()),
            ..Default::default()
        };
        let backfiller = RecordingBackfiller::default();
        let stats = check_months(&ctx, &[code.clone(), done], &options, &backfiller, None)
            .await
            .unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.incomplete, 1);
        assert_eq!(stats.missing_items, 3);
        assert_eq!(stats.backfill_ok, 4);

        let requests = backfiller.requests.lock().unwrap();
        let kinds: Vec<BackfillKind> = requests.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![BackfillKind::Month, BackfillKind::Month, BackfillKind::Month, BackfillKind::Tail]
        );
        assert_eq!(requests[0].range, month_range(ym(2024, 2)));
        assert_eq!(requests[3].range, DateRange::new(d(2024, 2, 1), d(2024, 4, 9)).unwrap());

        let body = std::fs::read_to_string(&output).unwrap();
        assert_eq!(body, "600066.SH,2024,02\n600066.SH,2024,03\n600066.SH,2024,04\n");
    }

    #[test]
    fn test_first_bar_date_checked_against_list_date() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let early = StockCode::parse("301001.SZ").unwrap();
        let on_time = StockCode::parse("301002.SZ").unwrap();
        let probe = Arc::new(MapProbe::default());
        probe.add(&layout, &early, ym(2024, 3), &["2024-03-11 09:31", "2024-03-29 15:00"]);
        probe.add(&layout, &early, ym(2024, 4), &["2024-04-01 09:31", "2024-04-09 15:00"]);
        probe.add(&layout, &on_time, ym(2024, 3), &["2024-03-12 09:31", "2024-03-29 15:00"]);
        probe.add(&layout, &on_time, ym(2024, 4), &["2024-04-01 09:31", "2024-04-09 15:00"]);
        let ctx = context(probe, dir.path()).with_list_dates(HashMap::from([
            (early.clone(), d(2024, 3, 12)),
            (on_time.clone(), d(2024, 3, 12)),
        ]));
        let options = MonthCheckOptions {
            check_first_bar: true,
            ..Default::default()
        };

        let check = check_stock(&ctx, &early, &options).unwrap();
        assert_eq!(check.expected, vec![ym(2024, 3), ym(2024, 4)]);
        assert_eq!(check.invalid_first_bar, vec![ym(2024, 3)]);
        assert_eq!(check.missing, vec![ym(2024, 3)]);

        let check = check_stock(&ctx, &on_time, &options).unwrap();
        assert!(check.invalid_first_bar.is_empty());
        assert!(check.is_complete());
    }

    #[test]
    fn test_first_bar_without_list_date_ignores_reference_calendar() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let reference = StockCode::parse("000001.SZ").unwrap();
        let code = StockCode::parse("600066.SH").unwrap();
        let probe = Arc::new(MapProbe::default());
        // 기준 종목이 3월 초에 거래정지
        probe.add(&layout, &reference, ym(2024, 3), &["2024-03-11 09:31", "2024-03-29 15:00"]);
        probe.add(&layout, &code, ym(2024, 3), &["2024-03-01 09:31", "2024-03-29 15:00"]);
        let options = MonthCheckOptions {
            start_date: Some("20240301".to_string()),
            end_date: Some("20240331".to_string()),
            check_first_bar: true,
            ..Default::default()
        };

        let ctx = context(probe, dir.path()).with_reference_calendar(&reference, None);
        assert_eq!(ctx.calendar.get(ym(2024, 3)), Some(d(2024, 3, 11)));
        let check = check_stock(&ctx, &code, &options).unwrap();
        assert!(check.invalid_first_bar.is_empty());
        assert!(check.missing.is_empty());

        let sources = context_sources(false);
        assert!(!sources.reference_calendar);
        assert!(!sources.list_dates);
    }
}
