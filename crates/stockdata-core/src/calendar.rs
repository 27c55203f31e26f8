//! 근사 거래일 캘린더.
//!
//! 공휴일 정보 없이 월~금을 거래일로 간주합니다. 실제 데이터(기준 종목)에서
//! 추출한 월별 첫 거래일이 있으면 [`MonthlyCalendar::overlay`]로 근사값을 덮어씁니다.
//!
//! # 기대 커버리지
//!
//! 종목별 기대 구간은 다음 규칙으로 정합니다:
//! - 시작/종료일이 모두 주어지고 유효하면 그 구간
//! - 주어졌지만 형식이 틀리면 기본 시작일 ~ 데이터 마감일
//! - 주어지지 않았으면 max(기본 시작일, 상장일) ~ 데이터 마감일

use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeMap;

use crate::types::{parse_yyyymmdd, YearMonth};

/// 기본 커버리지 시작일 (2018-01-01).
pub const DEFAULT_START_YYYYMMDD: &str = "20180101";

/// 월~금이면 거래일로 봅니다.
pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 그 달의 첫 평일.
pub fn first_trading_day(month: YearMonth) -> NaiveDate {
    let last = month.last_day();
    month
        .first_day()
        .iter_days()
        .take_while(|d| *d <= last)
        .find(|d| is_trading_day(*d))
        .unwrap_or_else(|| month.first_day())
}

/// 그 달의 마지막 평일.
pub fn last_trading_day(month: YearMonth) -> NaiveDate {
    let first = month.first_day();
    let mut day = month.last_day();
    while day > first && !is_trading_day(day) {
        day = day.pred_opt().unwrap_or(first);
    }
    day
}

/// `[start, end]` 안에 거래일이 하나라도 있는지. `start > end`면 false.
pub fn has_trading_days_between(start: NaiveDate, end: NaiveDate) -> bool {
    if start > end {
        return false;
    }
    // 7일 이상이면 평일이 반드시 포함됩니다
    if (end - start).num_days() >= 6 {
        return true;
    }
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .any(is_trading_day)
}

/// 월별 첫 거래일 캘린더.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthlyCalendar {
    days: BTreeMap<YearMonth, NaiveDate>,
}

impl MonthlyCalendar {
    /// 평일 근사로 `[start, end]`가 걸친 모든 달을 채웁니다.
    pub fn approximate(start: NaiveDate, end: NaiveDate) -> Self {
        let days = YearMonth::months_between(start, end)
            .into_iter()
            .map(|ym| (ym, first_trading_day(ym)))
            .collect();
        Self { days }
    }

    pub fn from_map(days: BTreeMap<YearMonth, NaiveDate>) -> Self {
        Self { days }
    }

    /// 참조 데이터로 해당 달의 값을 덮어씁니다.
    pub fn overlay(&mut self, reference: impl IntoIterator<Item = (YearMonth, NaiveDate)>) {
        for (ym, day) in reference {
            self.days.insert(ym, day);
        }
    }

    pub fn get(&self, month: YearMonth) -> Option<NaiveDate> {
        self.days.get(&month).copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (YearMonth, NaiveDate)> + '_ {
        self.days.iter().map(|(k, v)| (*k, *v))
    }

    /// 그 달 데이터가 시작해야 하는 날짜.
    ///
    /// - 캘린더에 없는 달, 상장월 이전 달: `None`
    /// - 상장월: max(그 달 첫 거래일, 상장일)
    /// - 그 외: 그 달 첫 거래일
    pub fn effective_first(&self, month: YearMonth, list_date: Option<NaiveDate>) -> Option<NaiveDate> {
        let first = self.get(month)?;
        let Some(list_date) = list_date else {
            return Some(first);
        };
        let list_month = YearMonth::of(list_date);
        if month < list_month {
            None
        } else if month == list_month {
            Some(first.max(list_date))
        } else {
            Some(first)
        }
    }
}

/// 종목 하나의 기대 월 목록을 계산합니다 (모듈 문서의 규칙 참조).
///
/// * `start`, `end` - CLI에서 넘어온 `YYYYMMDD` (둘 다 있을 때만 사용)
/// * `list_date` - 상장일 (알 수 없으면 `None`)
pub fn expected_months(
    start: Option<&str>,
    end: Option<&str>,
    list_date: Option<NaiveDate>,
    default_start: NaiveDate,
    data_end: NaiveDate,
) -> Vec<YearMonth> {
    let explicit = start
        .zip(end)
        .filter(|(s, e)| !s.trim().is_empty() && !e.trim().is_empty());

    match explicit {
        Some((s, e)) => match (parse_yyyymmdd(s), parse_yyyymmdd(e)) {
            (Some(s), Some(e)) => YearMonth::months_between(s, e),
            _ => {
                tracing::warn!(start = s, end = e, "기대 구간 형식 오류, 기본 구간 사용");
                YearMonth::months_between(default_start, data_end)
            }
        },
        None => {
            let start = list_date.map_or(default_start, |d| d.max(default_start));
            if start > data_end {
                return Vec::new();
            }
            YearMonth::months_between(start, data_end)
        }
    }
}
