//! Parquet 파티션의 봉 시각 조회.
//!
//! 시각 컬럼은 [`TIME_COLUMNS`] 순서로 처음 존재하는 것을 씁니다.
//! Parquet datetime(모든 단위), date, 문자열 값을 모두 `NaiveDateTime`으로 변환합니다.
//! 타임존이 붙은 datetime 컬럼은 그 타임존의 현지 시각으로 읽습니다.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::trace;

use crate::error::{DataError, Result};

/// 시각 컬럼 후보 (우선순위 순).
pub const TIME_COLUMNS: [&str; 5] = ["timestamp", "datetime", "dt", "date", "trade_time"];

const DATETIME_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y%m%d %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d"];

/// 파일 하나에서 읽은 봉 시각.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarTimes {
    /// 후보 시각 컬럼이 하나도 없음
    NoTimeColumn,
    /// 파일 순서 그대로의 시각 (null 제외). 빈 파일이면 빈 벡터.
    Times(Vec<NaiveDateTime>),
}

impl BarTimes {
    pub fn times(&self) -> &[NaiveDateTime] {
        match self {
            Self::NoTimeColumn => &[],
            Self::Times(times) => times,
        }
    }

    /// 첫 행의 시각.
    pub fn first(&self) -> Option<NaiveDateTime> {
        self.times().first().copied()
    }

    /// 마지막 행의 시각.
    pub fn last(&self) -> Option<NaiveDateTime> {
        self.times().last().copied()
    }

    pub fn min(&self) -> Option<NaiveDateTime> {
        self.times().iter().min().copied()
    }

    pub fn max(&self) -> Option<NaiveDateTime> {
        self.times().iter().max().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.times().is_empty()
    }
}

/// 파티션 파일 조회 인터페이스.
///
/// 점검 로직은 이 trait만 사용하므로 테스트에서는 메모리 구현으로 교체합니다.
pub trait BarProbe: Send + Sync {
    /// 파일의 봉 시각. 읽을 수 없으면 에러.
    fn bar_times(&self, path: &Path) -> Result<BarTimes>;

    /// 첫 봉 시각. 빈 파일이나 시각 컬럼이 없으면 `None`.
    fn first_bar(&self, path: &Path) -> Result<Option<NaiveDateTime>> {
        Ok(self.bar_times(path)?.first())
    }

    /// 마지막 봉 시각.
    fn last_bar(&self, path: &Path) -> Result<Option<NaiveDateTime>> {
        Ok(self.bar_times(path)?.last())
    }

    /// 파일에서 가장 늦은 날짜 (일봉 최신일 확인용).
    fn max_date(&self, path: &Path) -> Result<Option<NaiveDate>> {
        Ok(self.bar_times(path)?.max().map(|t| t.date()))
    }
}

/// polars 기반 Parquet 조회기.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetBarReader;

impl ParquetBarReader {
    pub fn new() -> Self {
        Self
    }
}

impl BarProbe for ParquetBarReader {
    fn bar_times(&self, path: &Path) -> Result<BarTimes> {
        let file = File::open(path)?;
        let df = ParquetReader::new(file).finish()?;

        let Some(name) = TIME_COLUMNS
            .iter()
            .copied()
            .find(|name| df.column(name).is_ok())
        else {
            trace!(path = %path.display(), "시각 컬럼 없음");
            return Ok(BarTimes::NoTimeColumn);
        };

        let column = df.column(name)?;
        let mut times = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            if let Some(t) = any_value_to_datetime(column.get(idx)?)? {
                times.push(t);
            }
        }
        trace!(path = %path.display(), column = name, rows = times.len(), "봉 시각 조회");
        Ok(BarTimes::Times(times))
    }
}

fn any_value_to_datetime(value: AnyValue<'_>) -> Result<Option<NaiveDateTime>> {
    let parsed = match value {
        AnyValue::Null => return Ok(None),
        AnyValue::Datetime(v, unit, None) => from_epoch(v, unit).map(|dt| dt.naive_utc()),
        AnyValue::Datetime(v, unit, Some(tz)) => match from_epoch(v, unit) {
            Some(utc) => Some(to_local(utc, tz.as_str())?),
            None => None,
        },
        AnyValue::Date(days) => epoch_date(days).map(|d| d.and_time(NaiveTime::MIN)),
        AnyValue::String(s) => parse_time_str(s),
        AnyValue::StringOwned(ref s) => parse_time_str(s.as_str()),
        AnyValue::Int64(v) => parse_time_str(&v.to_string()),
        AnyValue::Int32(v) => parse_time_str(&v.to_string()),
        ref other => {
            return Err(DataError::InvalidData(format!(
                "지원하지 않는 시각 타입: {}",
                other.dtype()
            )))
        }
    };
    parsed
        .map(Some)
        .ok_or_else(|| DataError::InvalidData(format!("시각 변환 실패: {}", value)))
}

fn from_epoch(v: i64, unit: TimeUnit) -> Option<DateTime<Utc>> {
    let per_sec: i64 = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000,
        TimeUnit::Microseconds => 1_000_000,
        TimeUnit::Milliseconds => 1_000,
    };
    let secs = v.div_euclid(per_sec);
    let nanos = v.rem_euclid(per_sec) * (1_000_000_000 / per_sec);
    DateTime::from_timestamp(secs, u32::try_from(nanos).ok()?)
}

/// UTC 시각을 컬럼 타임존(`Asia/Shanghai` 또는 `+08:00`)의 현지 시각으로 바꿉니다.
fn to_local(utc: DateTime<Utc>, tz: &str) -> Result<NaiveDateTime> {
    if let Ok(zone) = tz.parse::<Tz>() {
        return Ok(utc.with_timezone(&zone).naive_local());
    }
    match tz.parse::<FixedOffset>() {
        Ok(offset) => Ok(utc.with_timezone(&offset).naive_local()),
        Err(_) => Err(DataError::InvalidData(format!("알 수 없는 타임존: {}", tz))),
    }
}

fn epoch_date(days: i32) -> Option<NaiveDate> {
    // 1970-01-01 = CE 기준 719_163일
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(719_163)?)
}

/// 문자열 시각을 파싱합니다. 날짜만 있으면 자정으로 봅니다.
pub fn parse_time_str(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
