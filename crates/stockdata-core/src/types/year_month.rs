//! 연월(YearMonth) 타입.
//!
//! 분봉 파티션 하나는 종목 하나의 한 달치 데이터이므로,
//! 기대/보유 커버리지는 모두 연월 집합으로 계산합니다.

use chrono::{Datelike, Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// 달력상의 한 달. 내부적으로 그 달 1일을 보관하므로 정렬 순서가 시간 순서와 같습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth(NaiveDate);

impl YearMonth {
    /// 연/월로 생성합니다. 월은 1~12.
    pub fn new(year: i32, month: u32) -> CoreResult<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidDate(format!("{}-{:02}", year, month)))
    }

    /// 날짜가 속한 달.
    pub fn of(date: NaiveDate) -> Self {
        Self(date - Days::new(u64::from(date.day0())))
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    pub fn days_in_month(&self) -> u32 {
        match self.month() {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ if self.0.leap_year() => 29,
            _ => 28,
        }
    }

    pub fn last_day(&self) -> NaiveDate {
        self.0 + Days::new(u64::from(self.days_in_month() - 1))
    }

    /// 다음 달.
    pub fn succ(&self) -> Self {
        Self(self.0 + Months::new(1))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        Self::of(date) == *self
    }

    /// 두 날짜가 걸친 모든 달 (양끝 포함). 순서가 뒤집혀 있으면 바꿔서 계산합니다.
    pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<YearMonth> {
        let (start, end) = if start > end { (end, start) } else { (start, end) };
        let last = Self::of(end);
        let mut out = Vec::new();
        let mut cur = Self::of(start);
        while cur <= last {
            out.push(cur);
            cur = cur.succ();
        }
        out
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year(), self.month())
    }
}

impl FromStr for YearMonth {
    type Err = CoreError;

    /// `YYYY-MM` 또는 `YYYYMM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (y, m) = match s.split_once('-') {
            Some((y, m)) => (y, m),
            None if s.len() == 6 && s.is_ascii() => s.split_at(4),
            None => return Err(CoreError::InvalidDate(s.to_string())),
        };
        let year: i32 = y
            .parse()
            .map_err(|_| CoreError::InvalidDate(s.to_string()))?;
        let month: u32 = m
            .parse()
            .map_err(|_| CoreError::InvalidDate(s.to_string()))?;
        Self::new(year, month)
    }
}
