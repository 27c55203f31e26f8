//! 닫힌 날짜 구간.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::trade_date::format_yyyymmdd;

/// `[start, end]` (양끝 포함). 수집 스크립트의 `--start-date`/`--end-date`에 그대로 대응합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// `start > end`이면 `None`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn start_yyyymmdd(&self) -> String {
        format_yyyymmdd(self.start)
    }

    pub fn end_yyyymmdd(&self) -> String {
        format_yyyymmdd(self.end)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.start_yyyymmdd(), self.end_yyyymmdd())
    }
}
