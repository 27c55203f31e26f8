//! 기준 종목 데이터에서 월별 첫 거래일 추출.
//!
//! 기준 종목(기본 `000001.SZ`)의 분봉 파티션 첫 봉 날짜를 그 달의 실제 첫 거래일로 봅니다.
//! Parquet에서 하나도 얻지 못하면 CSV 미러를 읽습니다.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;
use stockdata_core::{parse_yyyymmdd, StockCode, YearMonth};
use tracing::{debug, info, warn};

use crate::layout::{collect_files, csv_mirror_dir, parse_month_from_file_name, PartitionLayout};
use crate::parquet::{parse_time_str, BarProbe};

/// 기준 종목의 월별 첫 거래일. 읽을 수 있는 데이터가 없으면 빈 맵.
pub fn reference_calendar(
    layout: &PartitionLayout,
    probe: &dyn BarProbe,
    reference: &StockCode,
    csv_root: Option<&Path>,
) -> BTreeMap<YearMonth, NaiveDate> {
    let from_parquet = from_parquet(layout, probe, reference);
    if !from_parquet.is_empty() {
        info!(stock = %reference, months = from_parquet.len(), "기준 캘린더 로드 (parquet)");
        return from_parquet;
    }

    let Some(csv_root) = csv_root else {
        return from_parquet;
    };
    let from_csv = from_csv_mirror(csv_root, reference);
    if !from_csv.is_empty() {
        info!(stock = %reference, months = from_csv.len(), "기준 캘린더 로드 (csv)");
    }
    from_csv
}

fn from_parquet(
    layout: &PartitionLayout,
    probe: &dyn BarProbe,
    reference: &StockCode,
) -> BTreeMap<YearMonth, NaiveDate> {
    let files = match layout.list_month_files(reference) {
        Ok(files) => files,
        Err(e) => {
            warn!(stock = %reference, error = %e, "기준 종목 파티션 조회 실패");
            return BTreeMap::new();
        }
    };

    let mut days = BTreeMap::new();
    for file in files {
        if days.contains_key(&file.month) {
            continue;
        }
        match probe.first_bar(&file.path) {
            Ok(Some(first)) => {
                days.insert(file.month, first.date());
            }
            Ok(None) => {}
            Err(e) => debug!(path = %file.path.display(), error = %e, "기준 파티션 읽기 실패"),
        }
    }
    days
}

fn from_csv_mirror(csv_root: &Path, reference: &StockCode) -> BTreeMap<YearMonth, NaiveDate> {
    let mut files = Vec::new();
    if let Err(e) = collect_files(&csv_mirror_dir(csv_root, reference), "csv", &mut files) {
        warn!(stock = %reference, error = %e, "CSV 미러 조회 실패");
        return BTreeMap::new();
    }

    let mut days = BTreeMap::new();
    for path in files {
        let Some(month) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| parse_month_from_file_name(n, "csv"))
        else {
            continue;
        };
        if days.contains_key(&month) {
            continue;
        }
        if let Some(first) = first_csv_date(&path) {
            days.insert(month, first);
        }
    }
    days
}

/// 헤더와 빈 줄을 건너뛴 첫 데이터 행의 날짜.
fn first_csv_date(path: &Path) -> Option<NaiveDate> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .ok()?;

    for record in reader.records() {
        let record = record.ok()?;
        let Some(field) = record.get(0).map(str::trim) else {
            continue;
        };
        if field.is_empty() || field.starts_with("timestamp") {
            continue;
        }
        return parse_time_str(field)
            .map(|t| t.date())
            .or_else(|| parse_yyyymmdd(field));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::parquet::BarTimes;
    use chrono::NaiveDateTime;
    use std::collections::HashMap;
    use std::fs;
    use std::path::PathBuf;

    struct MapProbe(HashMap<PathBuf, BarTimes>);

    impl BarProbe for MapProbe {
        fn bar_times(&self, path: &Path) -> Result<BarTimes> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| crate::DataError::NotFound(path.display().to_string()))
        }
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_reference_from_parquet_skips_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path());
        let code = StockCode::parse("000001.SZ").unwrap();
        let jan = layout.month_file(&code, YearMonth::new(2024, 1).unwrap());
        let feb = layout.month_file(&code, YearMonth::new(2024, 2).unwrap());
        for p in [&jan, &feb] {
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, b"").unwrap();
        }
        let probe = MapProbe(HashMap::from([(
            jan.clone(),
            BarTimes::Times(vec![dt("2024-01-02 09:31:00")]),
        )]));

        let days = reference_calendar(&layout, &probe, &code, None);
        assert_eq!(days.len(), 1);
        assert_eq!(days[&YearMonth::new(2024, 1).unwrap()], d(2024, 1, 2));
    }

    #[test]
    fn test_reference_falls_back_to_csv_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let layout = PartitionLayout::new(dir.path().join("data"));
        let csv_root = dir.path().join("csv_output");
        let code = StockCode::parse("000001.SZ").unwrap();
        let year_dir = csv_mirror_dir(&csv_root, &code).join("year=2024");
        fs::create_dir_all(&year_dir).unwrap();
        fs::write(
            year_dir.join("000001.SZ_2024-02.csv"),
            "timestamp,open,close\n\n2024-02-05 09:31:00,1,2\n",
        )
        .unwrap();
        fs::write(year_dir.join("000001.SZ_2024-03.csv"), "20240301,1,2\n").unwrap();
        fs::write(year_dir.join("readme.csv"), "2024-01-01,1\n").unwrap();

        let probe = MapProbe(HashMap::new());
        let days = reference_calendar(&layout, &probe, &code, Some(&csv_root));
        assert_eq!(days.len(), 2);
        assert_eq!(days[&YearMonth::new(2024, 2).unwrap()], d(2024, 2, 5));
        assert_eq!(days[&YearMonth::new(2024, 3).unwrap()], d(2024, 3, 1));
    }
}
