//! 데이터 루트 아래 파티션 경로 규칙.
//!
//! ```text
//! {root}/raw/minute_by_stock/stock_code={code}/year={yyyy}/{code}_{yyyy}-{mm}.parquet
//! {root}/raw/daily/by_stock/stock_code={code}/*.parquet
//! {root}/raw/daily/by_index/index_code={code}/*.parquet
//! {root}/metadata/…
//! ```

use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use stockdata_core::{StockCode, YearMonth};
use tracing::{debug, warn};

use crate::error::Result;

const MINUTE_BY_STOCK: &str = "raw/minute_by_stock";
const DAILY_BY_STOCK: &str = "raw/daily/by_stock";
const DAILY_BY_INDEX: &str = "raw/daily/by_index";
const METADATA: &str = "metadata";

const STOCK_PREFIX: &str = "stock_code=";
const INDEX_PREFIX: &str = "index_code=";
const YEAR_PREFIX: &str = "year=";

/// 파일명에서 연월을 찾은 분봉 파티션 파일.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthFile {
    pub month: YearMonth,
    pub path: PathBuf,
}

/// 데이터 루트 기준 경로 계산기.
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    root: PathBuf,
}

impl PartitionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    // ==================== 분봉 ====================

    pub fn minute_root(&self) -> PathBuf {
        self.root.join(MINUTE_BY_STOCK)
    }

    pub fn stock_dir(&self, code: &StockCode) -> PathBuf {
        self.minute_root().join(format!("{}{}", STOCK_PREFIX, code))
    }

    pub fn year_dir(&self, code: &StockCode, year: i32) -> PathBuf {
        self.stock_dir(code).join(format!("{}{}", YEAR_PREFIX, year))
    }

    /// 수집 스크립트가 만드는 표준 파일 경로.
    pub fn month_file(&self, code: &StockCode, month: YearMonth) -> PathBuf {
        self.year_dir(code, month.year())
            .join(format!("{}_{}.parquet", code, month))
    }

    /// `stock_code=*` 디렉터리에서 종목 목록을 만듭니다 (정렬).
    pub fn list_stocks(&self) -> Result<Vec<StockCode>> {
        list_prefixed_dirs(&self.minute_root(), STOCK_PREFIX)
    }

    /// 종목의 모든 월 파일 (`year=*` 아래 재귀 탐색, 연월·경로 순 정렬).
    ///
    /// 파일명에서 연월을 읽을 수 없는 Parquet 파일은 건너뜁니다.
    pub fn list_month_files(&self, code: &StockCode) -> Result<Vec<MonthFile>> {
        let stock_dir = self.stock_dir(code);
        let mut files = Vec::new();
        for year_dir in read_dir_sorted(&stock_dir)? {
            let is_year = year_dir
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(YEAR_PREFIX));
            if is_year && year_dir.is_dir() {
                collect_files(&year_dir, "parquet", &mut files)?;
            }
        }

        let mut month_files: Vec<MonthFile> = files
            .into_iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                match parse_month_from_file_name(name, "parquet") {
                    Some(month) => Some(MonthFile { month, path }),
                    None => {
                        debug!(path = %path.display(), "연월 없는 파일명, 건너뜀");
                        None
                    }
                }
            })
            .collect();
        month_files.sort();
        Ok(month_files)
    }

    /// 종목이 보유한 연월 집합.
    pub fn existing_months(&self, code: &StockCode) -> Result<BTreeSet<YearMonth>> {
        Ok(self
            .list_month_files(code)?
            .into_iter()
            .map(|f| f.month)
            .collect())
    }

    /// `year={y}` 아래에서 `*_{y}-{mm}.parquet`에 맞는 첫 파일.
    pub fn find_month_file(&self, code: &StockCode, month: YearMonth) -> Result<Option<PathBuf>> {
        let suffix = format!("_{}.parquet", month);
        let found = read_dir_sorted(&self.year_dir(code, month.year()))?
            .into_iter()
            .find(|p| {
                p.is_file()
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.ends_with(&suffix))
            });
        Ok(found)
    }

    // ==================== 일봉 ====================

    pub fn daily_stock_dir(&self, code: &StockCode) -> PathBuf {
        self.root
            .join(DAILY_BY_STOCK)
            .join(format!("{}{}", STOCK_PREFIX, code))
    }

    pub fn daily_index_dir(&self, code: &StockCode) -> PathBuf {
        self.root
            .join(DAILY_BY_INDEX)
            .join(format!("{}{}", INDEX_PREFIX, code))
    }

    /// 디렉터리 바로 아래의 Parquet 파일 (정렬). 디렉터리가 없으면 빈 목록.
    pub fn parquet_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(read_dir_sorted(dir)?
            .into_iter()
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == "parquet"))
            .collect())
    }

    // ==================== 메타데이터 ====================

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA)
    }

    pub fn stock_basic_csv(&self) -> PathBuf {
        self.metadata_dir().join("stock_basic.csv")
    }

    pub fn index_basic_csv(&self) -> PathBuf {
        self.metadata_dir().join("index_basic.csv")
    }

    pub fn calendar_csv(&self) -> PathBuf {
        self.metadata_dir().join("monthly_trading_calendar.csv")
    }

    /// `metadata/{prefix}_{YYYYMMDD_HHMMSS}.txt`
    pub fn timestamped_list(&self, prefix: &str, now: NaiveDateTime) -> PathBuf {
        self.metadata_dir()
            .join(format!("{}_{}.txt", prefix, now.format("%Y%m%d_%H%M%S")))
    }
}

/// CSV 미러 경로: `{csv_root}/{code}/stock_code={code}/year={yyyy}`.
pub fn csv_mirror_dir(csv_root: &Path, code: &StockCode) -> PathBuf {
    csv_root
        .join(code.as_str())
        .join(format!("{}{}", STOCK_PREFIX, code))
}

/// 파일명 끝의 `YYYY-MM.{ext}`에서 연월을 읽습니다.
pub fn parse_month_from_file_name(name: &str, ext: &str) -> Option<YearMonth> {
    let stem = name.strip_suffix(ext)?.strip_suffix('.')?;
    let tail = stem.get(stem.len().checked_sub(7)?..)?;
    let (y, m) = tail.split_once('-')?;
    if y.len() != 4 || m.len() != 2 || !(y.bytes().chain(m.bytes())).all(|b| b.is_ascii_digit()) {
        return None;
    }
    YearMonth::new(y.parse().ok()?, m.parse().ok()?).ok()
}

pub(crate) fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

pub(crate) fn collect_files(dir: &Path, ext: &str, out: &mut Vec<PathBuf>) -> Result<()> {
    for path in read_dir_sorted(dir)? {
        if path.is_dir() {
            collect_files(&path, ext, out)?;
        } else if path.extension().is_some_and(|e| e == ext) {
            out.push(path);
        }
    }
    Ok(())
}

fn list_prefixed_dirs(parent: &Path, prefix: &str) -> Result<Vec<StockCode>> {
    let mut codes = Vec::new();
    for path in read_dir_sorted(parent)? {
        if !path.is_dir() {
            continue;
        }
        let Some(raw) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix))
        else {
            continue;
        };
        match StockCode::parse(raw) {
            Ok(code) => codes.push(code),
            Err(e) => warn!(dir = %path.display(), error = %e, "잘못된 종목 디렉터리"),
        }
    }
    codes.sort();
    codes.dedup();
    Ok(codes)
}
