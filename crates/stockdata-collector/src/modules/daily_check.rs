//! 일봉·지수 일봉 최신성 점검.
//!
//! 상장 A주(`stock_basic.csv`) 또는 지수(`index_basic.csv`)마다 일봉 파티션의 최신 날짜를 보고
//! 데이터가 없거나 데이터 종료일보다 늦은 종목을 누락 목록으로 만듭니다.
//! 목록 파일은 수집 스크립트의 `--from-missing-list` 입력으로 그대로 쓰입니다.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use stockdata_core::StockCode;
use stockdata_store::metadata::{load_index_symbols, load_listed_a_shares, write_symbol_list};
use stockdata_store::{BarProbe, PartitionLayout};
use tracing::{debug, info, warn};

use super::backfill::Backfiller;
use crate::stats::CheckStats;
use crate::Result;

/// 로그에 보여줄 예시 개수
const SAMPLE_LIMIT: usize = 10;

/// 점검 대상 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyKind {
    Stock,
    Index,
}

impl DailyKind {
    pub fn task_name(&self) -> &'static str {
        match self {
            Self::Stock => "check-daily",
            Self::Index => "check-index",
        }
    }

    /// 누락 목록 파일명 접두사
    pub fn list_prefix(&self) -> &'static str {
        match self {
            Self::Stock => "missing_daily_stocks",
            Self::Index => "missing_index_daily",
        }
    }

    fn symbols(&self, layout: &PartitionLayout) -> Vec<StockCode> {
        match self {
            Self::Stock => load_listed_a_shares(&layout.stock_basic_csv()),
            Self::Index => load_index_symbols(&layout.index_basic_csv()),
        }
    }

    fn daily_dir(&self, layout: &PartitionLayout, code: &StockCode) -> PathBuf {
        match self {
            Self::Stock => layout.daily_stock_dir(code),
            Self::Index => layout.daily_index_dir(code),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DailyCheckOptions {
    /// 점검만 하고 파일을 쓰지 않음
    pub dry_run: bool,
    /// 목록 파일 경로 (기본: metadata 아래 타임스탬프 파일)
    pub output: Option<PathBuf>,
    /// 목록을 쓴 뒤 수집 스크립트 실행
    pub fetch: bool,
}

/// 점검 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyReport {
    pub symbols: usize,
    /// 일봉 파일이 없거나 읽을 수 있는 날짜가 없음
    pub no_data: Vec<StockCode>,
    /// 최신 날짜가 데이터 종료일보다 이름
    pub stale: Vec<(StockCode, NaiveDate)>,
}

impl DailyReport {
    /// `no_data ∪ stale` (정렬)
    pub fn missing(&self) -> Vec<StockCode> {
        let set: BTreeSet<StockCode> = self
            .no_data
            .iter()
            .cloned()
            .chain(self.stale.iter().map(|(c, _)| c.clone()))
            .collect();
        set.into_iter().collect()
    }
}

/// 일봉 디렉터리 전체 파일의 최신 날짜.
///
/// 파일이 없거나 하나라도 읽지 못하면 `None` (다시 받아야 하는 종목으로 봅니다).
pub fn latest_daily_date(probe: &dyn BarProbe, dir: &Path) -> Option<NaiveDate> {
    let files = match PartitionLayout::parquet_files_in(dir) {
        Ok(files) => files,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "일봉 디렉터리 읽기 실패");
            return None;
        }
    };

    let mut latest: Option<NaiveDate> = None;
    for file in &files {
        match probe.max_date(file) {
            Ok(date) => latest = latest.max(date),
            Err(e) => {
                debug!(path = %file.display(), error = %e, "일봉 파일 읽기 실패");
                return None;
            }
        }
    }
    latest
}

/// 대상 목록 전체 점검.
pub fn check_daily(
    layout: &PartitionLayout,
    probe: &dyn BarProbe,
    kind: DailyKind,
    data_end: NaiveDate,
) -> DailyReport {
    let symbols = kind.symbols(layout);
    if symbols.is_empty() {
        warn!(kind = kind.task_name(), "점검할 종목 목록이 비어 있음");
    }

    let mut report = DailyReport {
        symbols: symbols.len(),
        ..Default::default()
    };
    for code in symbols {
        match latest_daily_date(probe, &kind.daily_dir(layout, &code)) {
            None => report.no_data.push(code),
            Some(latest) if latest < data_end => report.stale.push((code, latest)),
            Some(_) => {}
        }
    }
    report
}

fn log_report(report: &DailyReport, data_end: NaiveDate, kind: DailyKind) {
    info!(
        kind = kind.task_name(),
        data_end = %data_end,
        symbols = report.symbols,
        no_data = report.no_data.len(),
        stale = report.stale.len(),
        missing = report.missing().len(),
        "일봉 최신성 점검 결과"
    );
    if !report.no_data.is_empty() {
        let sample: Vec<&str> = report.no_data.iter().take(SAMPLE_LIMIT).map(StockCode::as_str).collect();
        info!(sample = ?sample, "데이터 없음 예시");
    }
    for (code, latest) in report.stale.iter().take(SAMPLE_LIMIT) {
        info!(stock = %code, latest = %latest, "최신 아님");
    }
}

/// 점검 → 목록 파일 저장 → (선택) 수집 스크립트 실행.
///
/// 누락 목록을 쓴 경우 그 경로를 함께 반환합니다.
pub async fn run_daily_check(
    layout: &PartitionLayout,
    probe: &dyn BarProbe,
    kind: DailyKind,
    data_end: NaiveDate,
    options: &DailyCheckOptions,
    backfiller: &dyn Backfiller,
) -> Result<(CheckStats, Option<PathBuf>)> {
    let started = Instant::now();
    let report = check_daily(layout, probe, kind, data_end);
    log_report(&report, data_end, kind);

    let missing = report.missing();
    let mut stats = CheckStats::new();
    stats.total = report.symbols;
    stats.incomplete = missing.len();
    stats.complete = report.symbols.saturating_sub(missing.len());
    stats.missing_items = missing.len();

    if options.dry_run || missing.is_empty() {
        if missing.is_empty() {
            info!(kind = kind.task_name(), "누락 없음, 목록 파일을 만들지 않음");
        }
        stats.elapsed = started.elapsed();
        return Ok((stats, None));
    }

    let path = options
        .output
        .clone()
        .unwrap_or_else(|| default_list_path(layout, kind, Local::now().naive_local()));
    write_symbol_list(&path, &missing)?;
    info!(path = %path.display(), count = missing.len(), "누락 목록 저장");

    if options.fetch {
        let ok = backfiller.fetch_missing_list(&path).await;
        if !ok {
            warn!(path = %path.display(), "목록 기반 보충 수집 실패");
        }
        stats.record_backfill(ok);
    }

    stats.elapsed = started.elapsed();
    Ok((stats, Some(path)))
}

pub fn default_list_path(layout: &PartitionLayout, kind: DailyKind, now: NaiveDateTime) -> PathBuf {
    layout.timestamped_list(kind.list_prefix(), now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::MapProbe;
    use crate::modules::backfill::BackfillRequest;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use stockdata_store::BarTimes;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn daily(date: NaiveDate) -> Option<BarTimes> {
        Some(BarTimes::Times(vec![date.and_hms_opt(0, 0, 0).unwrap()]))
    }

    #[derive(Default)]
    struct ListBackfiller {
        lists: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Backfiller for ListBackfiller {
        async fn fetch_range(&self, _request: &BackfillRequest) -> bool {
            true
        }

        async fn fetch_missing_list(&self, path: &Path) -> bool {
            self.lists.lock().unwrap().push(path.to_path_buf());
            true
        }
    }

    /// 600066 최신, 000001 지연, 300750 데이터 없음, 000002 파일 하나 손상
    fn setup(root: &Path) -> (PartitionLayout, MapProbe) {
        let layout = PartitionLayout::new(root);
        fs::create_dir_all(layout.metadata_dir()).unwrap();
        fs::write(
            layout.stock_basic_csv(),
            "symbol,list_date\n600066.SH,19970508\n000001.SZ,19910403\n300750.SZ,20180611\n000002.SZ,19910129\n430047.BJ,20201223\n",
        )
        .unwrap();

        let probe = MapProbe::default();
        let dir = |c: &str| layout.daily_stock_dir(&StockCode::parse(c).unwrap());
        probe.add_file(&dir("600066.SH").join("2024.parquet"), daily(d(2024, 6, 7)));
        probe.add_file(&dir("600066.SH").join("2023.parquet"), daily(d(2023, 12, 29)));
        probe.add_file(&dir("000001.SZ").join("2024.parquet"), daily(d(2024, 6, 3)));
        probe.add_file(&dir("000002.SZ").join("2024.parquet"), daily(d(2024, 6, 7)));
        probe.add_file(&dir("000002.SZ").join("2023.parquet"), None);
        (layout, probe)
    }

    #[test]
    fn test_check_daily_report() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, probe) = setup(dir.path());

        let report = check_daily(&layout, &probe, DailyKind::Stock, d(2024, 6, 7));
        assert_eq!(report.symbols, 4);
        let no_data: Vec<&str> = report.no_data.iter().map(StockCode::as_str).collect();
        assert_eq!(no_data, vec!["000002.SZ", "300750.SZ"]);
        assert_eq!(report.stale, vec![(StockCode::parse("000001.SZ").unwrap(), d(2024, 6, 3))]);

        let missing: Vec<String> = report.missing().iter().map(ToString::to_string).collect();
        assert_eq!(missing, vec!["000001.SZ", "000002.SZ", "300750.SZ"]);
    }

    #[tokio::test]
    async fn test_run_daily_check_writes_list_and_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let (layout, probe) = setup(dir.path());
        let backfiller = ListBackfiller::default();

        let dry = DailyCheckOptions { dry_run: true, fetch: true, ..Default::default() };
        let (stats, path) = run_daily_check(&layout, &probe, DailyKind::Stock, d(2024, 6, 7), &dry, &backfiller)
            .await
            .unwrap();
        assert_eq!(stats.missing_items, 3);
        assert!(path.is_none());
        assert!(backfiller.lists.lock().unwrap().is_empty());

        let options = DailyCheckOptions { fetch: true, ..Default::default() };
        let (stats, path) = run_daily_check(&layout, &probe, DailyKind::Stock, d(2024, 6, 7), &options, &backfiller)
            .await
            .unwrap();
        let path = path.unwrap();
        assert!(path.starts_with(layout.metadata_dir()));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("missing_daily_stocks_"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "000001.SZ\n000002.SZ\n300750.SZ\n");
        assert_eq!(stats.backfill_ok, 1);
        assert_eq!(backfiller.lists.lock().unwrap().as_slice(), &[path]);
    }

    #[tokio::test]
    async fn test_index_without_missing_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        fs::create_dir_all(layout.metadata_dir()).unwrap();
        fs::write(layout.index_basic_csv(), "symbol,name\n000300.SH,沪深300\n").unwrap();
        let probe = MapProbe::default();
        let code = StockCode::parse("000300.SH").unwrap();
        probe.add_file(&layout.daily_index_dir(&code).join("all.parquet"), daily(d(2024, 6, 7)));

        let output = dir.path().join("index_missing.txt");
        let options = DailyCheckOptions { output: Some(output.clone()), fetch: true, ..Default::default() };
        let (stats, path) = run_daily_check(
            &layout,
            &probe,
            DailyKind::Index,
            d(2024, 6, 7),
            &options,
            &ListBackfiller::default(),
        )
        .await
        .unwrap();

        assert_eq!(stats.complete, 1);
        assert!(path.is_none());
        assert!(!output.exists());
    }
}
