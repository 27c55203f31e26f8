//! metadata/ 디렉터리의 CSV·목록 파일.
//!
//! stock_basic.csv / index_basic.csv는 수집 스크립트가 만든 파일이라
//! 컬럼 구성이 버전마다 조금씩 다릅니다. 필요한 컬럼만 읽고 나머지는 무시합니다.

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use stockdata_core::{format_yyyymmdd, parse_yyyymmdd, MonthlyCalendar, StockCode, YearMonth};
use tracing::{debug, warn};

use crate::error::Result;

#[derive(Debug, Deserialize)]
struct StockBasicRow {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    list_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IndexBasicRow {
    #[serde(default)]
    symbol: Option<String>,
}

/// `symbol -> list_date` 맵.
///
/// 파일이 없으면 경고 후 빈 맵, 행 파싱 실패는 경고 후 그 행만 건너뜁니다.
pub fn load_list_dates(path: &Path) -> HashMap<StockCode, NaiveDate> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stock_basic.csv 읽기 실패, 상장일 없이 진행");
            return HashMap::new();
        }
    };

    let mut list_dates = HashMap::new();
    for row in reader.deserialize::<StockBasicRow>() {
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "stock_basic.csv 행 파싱 실패");
                continue;
            }
        };
        let (Some(symbol), Some(list_date)) = (row.symbol, row.list_date) else {
            continue;
        };
        let Some(date) = parse_yyyymmdd(&list_date) else {
            continue;
        };
        if let Ok(code) = StockCode::parse(&symbol) {
            list_dates.insert(code, date);
        }
    }
    debug!(count = list_dates.len(), "상장일 로드");
    list_dates
}

/// 상장일이 있는 상하이/선전 종목 (정렬).
pub fn load_listed_a_shares(path: &Path) -> Vec<StockCode> {
    let mut codes: Vec<StockCode> = load_list_dates(path)
        .into_keys()
        .filter(StockCode::is_a_share)
        .collect();
    codes.sort();
    codes
}

/// index_basic.csv의 지수 코드 (정렬, 중복 제거).
pub fn load_index_symbols(path: &Path) -> Vec<StockCode> {
    let mut reader = match csv::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "index_basic.csv 읽기 실패");
            return Vec::new();
        }
    };

    let mut codes: Vec<StockCode> = reader
        .deserialize::<IndexBasicRow>()
        .filter_map(|row| match row {
            Ok(row) => row.symbol,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "index_basic.csv 행 파싱 실패");
                None
            }
        })
        .filter_map(|s| StockCode::parse(&s).ok())
        .collect();
    codes.sort();
    codes.dedup();
    codes
}

/// 월별 첫 거래일 캘린더를 `year,month,start_yyyymmdd` CSV로 씁니다.
pub fn write_calendar_csv(path: &Path, calendar: &MonthlyCalendar) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["year", "month", "start_yyyymmdd"])?;
    for (month, first) in calendar.iter() {
        writer.write_record([
            month.year().to_string(),
            format!("{:02}", month.month()),
            format_yyyymmdd(first),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// 누락 월 목록을 `code,yyyy,mm` 줄로 씁니다.
pub fn write_missing_months(path: &Path, rows: &[(StockCode, YearMonth)]) -> Result<()> {
    let body: String = rows
        .iter()
        .map(|(code, month)| format!("{},{},{:02}\n", code, month.year(), month.month()))
        .collect();
    ensure_parent(path)?;
    fs::write(path, body)?;
    Ok(())
}

/// 종목 코드를 한 줄에 하나씩 씁니다.
pub fn write_symbol_list(path: &Path, codes: &[StockCode]) -> Result<()> {
    let body: String = codes.iter().map(|code| format!("{}\n", code)).collect();
    ensure_parent(path)?;
    fs::write(path, body)?;
    Ok(())
}

/// [`write_symbol_list`] 형식을 읽습니다. 빈 줄과 `#` 주석은 무시합니다.
pub fn read_symbol_list(path: &Path) -> Result<Vec<StockCode>> {
    let body = fs::read_to_string(path)?;
    let mut codes = Vec::new();
    for line in body.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        codes.push(StockCode::parse(line)?);
    }
    Ok(codes)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_load_list_dates_skips_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stock_basic.csv");
        fs::write(
            &path,
            "ts_code,symbol,name,list_date\n\
             600066.SH,600066.SH,宇通客车,19970508\n\
             000001.SZ,000001.SZ,平安银行,\n\
             430047.BJ,430047.BJ,诺思兰德,20201223\n\
             ,,빈 줄,20200101\n\
             300750.SZ,300750.sz,宁德时代,20180611.0\n",
        )
        .unwrap();

        let dates = load_list_dates(&path);
        assert_eq!(dates.len(), 3);
        assert_eq!(dates[&StockCode::parse("600066.SH").unwrap()], d(1997, 5, 8));
        assert_eq!(dates[&StockCode::parse("300750.SZ").unwrap()], d(2018, 6, 11));

        let a_shares: Vec<String> = load_listed_a_shares(&path)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(a_shares, vec!["300750.SZ", "600066.SH"]);
    }

    #[test]
    fn test_missing_metadata_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_list_dates(&dir.path().join("none.csv")).is_empty());
        assert!(load_index_symbols(&dir.path().join("none.csv")).is_empty());
    }

    #[test]
    fn test_load_index_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index_basic.csv");
        fs::write(&path, "symbol,name\n000300.SH,沪深300\n000001.SH,上证指数\n000300.SH,dup\n").unwrap();
        let codes: Vec<String> = load_index_symbols(&path).iter().map(ToString::to_string).collect();
        assert_eq!(codes, vec!["000001.SH", "000300.SH"]);
    }

    #[test]
    fn test_write_calendar_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata/monthly_trading_calendar.csv");
        let calendar = MonthlyCalendar::approximate(d(2024, 5, 15), d(2024, 6, 2));
        write_calendar_csv(&path, &calendar).unwrap();
        let body = fs::read_to_string(&path).unwrap();
        assert_eq!(body, "year,month,start_yyyymmdd\n2024,05,20240501\n2024,06,20240603\n");
    }

    #[test]
    fn test_symbol_list_round_trip_and_missing_months() {
        let dir = tempfile::tempdir().unwrap();
        let codes = StockCode::parse_list("600066.SH,000001.SZ").unwrap();
        let path = dir.path().join("list.txt");
        write_symbol_list(&path, &codes).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "600066.SH\n000001.SZ\n");
        assert_eq!(read_symbol_list(&path).unwrap(), codes);

        let months = dir.path().join("out/missing.txt");
        let rows = vec![
            (codes[0].clone(), YearMonth::new(2024, 3).unwrap()),
            (codes[1].clone(), YearMonth::new(2023, 12).unwrap()),
        ];
        write_missing_months(&months, &rows).unwrap();
        assert_eq!(
            fs::read_to_string(&months).unwrap(),
            "600066.SH,2024,03\n000001.SZ,2023,12\n"
        );
    }
}
