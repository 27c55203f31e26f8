//! 실제 Parquet 파일로 봉 시각 조회를 확인하는 통합 테스트.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use stockdata_core::{StockCode, YearMonth};
use stockdata_store::{reference_calendar, BarProbe, BarTimes, ParquetBarReader, PartitionLayout};

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn write_frame(path: &Path, mut df: DataFrame) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = File::create(path).unwrap();
    ParquetWriter::new(&mut file).finish(&mut df).unwrap();
    path.to_path_buf()
}

#[test]
fn test_string_timestamps_keep_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let df = df!(
        "timestamp" => &["2024-01-02 09:31:00", "2024-01-02 09:32:00", "2024-01-31 15:00:00"],
        "close" => &[10.0, 10.1, 10.2]
    )
    .unwrap();
    let path = write_frame(&dir.path().join("a.parquet"), df);

    let reader = ParquetBarReader::new();
    assert_eq!(reader.first_bar(&path).unwrap(), Some(at("2024-01-02 09:31:00")));
    assert_eq!(reader.last_bar(&path).unwrap(), Some(at("2024-01-31 15:00:00")));
    assert_eq!(reader.max_date(&path).unwrap(), NaiveDate::from_ymd_opt(2024, 1, 31));
    assert_eq!(reader.bar_times(&path).unwrap().times().len(), 3);
}

#[test]
fn test_native_datetime_column() {
    let dir = tempfile::tempdir().unwrap();
    let times = [at("2024-02-01 09:30:00"), at("2024-02-01 09:31:00")];
    let df = df!("datetime" => &times, "close" => &[1.0, 2.0]).unwrap();
    let path = write_frame(&dir.path().join("b.parquet"), df);

    let bars = ParquetBarReader::new().bar_times(&path).unwrap();
    assert_eq!(bars, BarTimes::Times(times.to_vec()));
}

#[test]
fn test_date_column_for_daily_bars() {
    let dir = tempfile::tempdir().unwrap();
    let dates = [
        NaiveDate::from_ymd_opt(2024, 5, 30).unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
    ];
    let df = df!("date" => &dates, "close" => &[1.0, 2.0]).unwrap();
    let path = write_frame(&dir.path().join("daily.parquet"), df);

    let reader = ParquetBarReader::new();
    assert_eq!(reader.max_date(&path).unwrap(), Some(dates[1]));
}

#[test]
fn test_no_time_column_and_empty_frame() {
    let dir = tempfile::tempdir().unwrap();
    let reader = ParquetBarReader::new();

    let no_time = write_frame(
        &dir.path().join("no_time.parquet"),
        df!("close" => &[1.0, 2.0]).unwrap(),
    );
    assert_eq!(reader.bar_times(&no_time).unwrap(), BarTimes::NoTimeColumn);
    assert_eq!(reader.first_bar(&no_time).unwrap(), None);

    let empty = write_frame(
        &dir.path().join("empty.parquet"),
        df!("timestamp" => Vec::<&str>::new()).unwrap(),
    );
    let bars = reader.bar_times(&empty).unwrap();
    assert!(bars.is_empty());
    assert_ne!(bars, BarTimes::NoTimeColumn);
}

#[test]
fn test_unreadable_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let garbage = dir.path().join("broken.parquet");
    fs::write(&garbage, b"not a parquet file").unwrap();

    let reader = ParquetBarReader::new();
    assert!(reader.bar_times(&garbage).is_err());
    assert!(reader.bar_times(&dir.path().join("missing.parquet")).is_err());
}

#[test]
fn test_reference_calendar_from_real_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let layout = PartitionLayout::new(dir.path());
    let code = StockCode::parse("000001.SZ").unwrap();
    let jan = YearMonth::new(2024, 1).unwrap();
    let feb = YearMonth::new(2024, 2).unwrap();

    write_frame(
        &layout.month_file(&code, jan),
        df!("timestamp" => &["2024-01-02 09:31:00", "2024-01-03 09:31:00"]).unwrap(),
    );
    write_frame(
        &layout.month_file(&code, feb),
        df!("timestamp" => &["2024-02-01 09:31:00"]).unwrap(),
    );

    let days = reference_calendar(&layout, &ParquetBarReader::new(), &code, None);
    assert_eq!(days.get(&jan), NaiveDate::from_ymd_opt(2024, 1, 2).as_ref());
    assert_eq!(days.get(&feb), NaiveDate::from_ymd_opt(2024, 2, 1).as_ref());
}
