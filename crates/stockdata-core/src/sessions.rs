//! 장중 세션과 분봉 누락 구간.
//!
//! 세션은 반개구간 `[start, end)`으로 해석해 분 단위 시점을 만듭니다.
//! A주 기본값은 `09:30-11:30, 13:00-15:00` (하루 240분)입니다.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 하나의 연속 거래 세션.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingSession {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TradingSession {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes().max(0)
    }
}

impl FromStr for TradingSession {
    type Err = CoreError;

    /// `HH:MM-HH:MM`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || CoreError::InvalidSession(s.to_string());
        let (a, b) = s.trim().split_once('-').ok_or_else(err)?;
        let start = NaiveTime::parse_from_str(a.trim(), "%H:%M").map_err(|_| err())?;
        let end = NaiveTime::parse_from_str(b.trim(), "%H:%M").map_err(|_| err())?;
        if end <= start {
            return Err(err());
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for TradingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

/// 하루의 세션 목록.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingSessions(Vec<TradingSession>);

impl Default for TradingSessions {
    fn default() -> Self {
        Self::a_share()
    }
}

impl TradingSessions {
    /// 상하이/선전 연속경매 시간.
    pub fn a_share() -> Self {
        let at = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self(vec![
            TradingSession { start: at(9, 30), end: at(11, 30) },
            TradingSession { start: at(13, 0), end: at(15, 0) },
        ])
    }

    pub fn sessions(&self) -> &[TradingSession] {
        &self.0
    }

    /// 하루 기대 분봉 수.
    pub fn expected_count(&self) -> usize {
        self.0.iter().map(|s| s.minutes() as usize).sum()
    }

    /// 그 날짜의 기대 분 시점 목록 (시간순).
    pub fn expected_minutes(&self, date: NaiveDate) -> Vec<NaiveDateTime> {
        let mut out = Vec::with_capacity(self.expected_count());
        for session in &self.0 {
            let end = date.and_time(session.end);
            let mut cur = date.and_time(session.start);
            while cur < end {
                out.push(cur);
                cur += Duration::minutes(1);
            }
        }
        out
    }

    /// 기대 분 시점 중 실제 데이터에 없는 것. 실제 값은 분 단위로 절삭합니다.
    pub fn missing_minutes<I>(&self, date: NaiveDate, actual: I) -> Vec<NaiveDateTime>
    where
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let actual: BTreeSet<NaiveDateTime> = actual.into_iter().map(truncate_to_minute).collect();
        self.expected_minutes(date)
            .into_iter()
            .filter(|m| !actual.contains(m))
            .collect()
    }
}

impl FromStr for TradingSessions {
    type Err = CoreError;

    /// 쉼표로 구분한 세션 목록: `09:30-11:30,13:00-15:00`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let sessions = s
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<TradingSession>, _>>()?;
        if sessions.is_empty() {
            return Err(CoreError::InvalidSession(s.to_string()));
        }
        Ok(Self(sessions))
    }
}

impl fmt::Display for TradingSessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// 누락 구간 (반개구간 `[start, end)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub minutes: i64,
}

impl GapRange {
    fn closing(start: NaiveDateTime, last: NaiveDateTime) -> Self {
        let end = last + Duration::minutes(1);
        Self {
            start,
            end,
            minutes: (end - start).num_minutes(),
        }
    }
}

/// 누락 분 시점을 연속 구간으로 압축합니다. 1분 간격으로 이어지는 시점은 한 구간이 됩니다.
pub fn to_gap_ranges(missing: &[NaiveDateTime]) -> Vec<GapRange> {
    let mut sorted = missing.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut ranges = Vec::new();
    let (mut start, mut prev) = (first, first);
    for cur in iter {
        if cur - prev == Duration::minutes(1) {
            prev = cur;
            continue;
        }
        ranges.push(GapRange::closing(start, prev));
        start = cur;
        prev = cur;
    }
    ranges.push(GapRange::closing(start, prev));
    ranges
}

fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt - Duration::seconds(i64::from(dt.second())) - Duration::nanoseconds(i64::from(dt.nanosecond()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn test_a_share_expected_count() {
        let sessions = TradingSessions::a_share();
        assert_eq!(sessions.expected_count(), 240);
        let minutes = sessions.expected_minutes(day());
        assert_eq!(minutes.len(), 240);
        assert_eq!(minutes.first(), Some(&at(9, 30, 0)));
        assert_eq!(minutes.last(), Some(&at(14, 59, 0)));
        assert!(!minutes.contains(&at(11, 30, 0)));
    }

    #[test]
    fn test_parse_sessions() {
        let sessions: TradingSessions = "09:31-11:31, 13:01-15:01".parse().unwrap();
        assert_eq!(sessions.sessions().len(), 2);
        assert_eq!(sessions.to_string(), "09:31-11:31,13:01-15:01");
        assert!("15:00-13:00".parse::<TradingSessions>().is_err());
        assert!("".parse::<TradingSessions>().is_err());
    }

    #[test]
    fn test_missing_minutes_truncates_seconds() {
        let sessions: TradingSessions = "09:30-09:35".parse().unwrap();
        let actual = vec![at(9, 30, 59), at(9, 31, 0), at(9, 34, 0)];
        let missing = sessions.missing_minutes(day(), actual);
        assert_eq!(missing, vec![at(9, 32, 0), at(9, 33, 0)]);
    }

    #[test]
    fn test_gap_ranges_merge_consecutive_minutes() {
        let missing = vec![at(9, 33, 0), at(9, 31, 0), at(9, 32, 0), at(13, 0, 0)];
        let ranges = to_gap_ranges(&missing);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].start, at(9, 31, 0));
        assert_eq!(ranges[0].end, at(9, 34, 0));
        assert_eq!(ranges[0].minutes, 3);
        assert_eq!(ranges[1].minutes, 1);
        assert!(to_gap_ranges(&[]).is_empty());
    }
}
