//! `YYYYMMDD` 날짜 문자열 보조 함수.
//!
//! 수집 스크립트, stock_basic.csv의 list_date, 누락 목록 파일은 모두 `YYYYMMDD`를 씁니다.

use chrono::NaiveDate;

/// 앞 8자리 `YYYYMMDD`를 파싱합니다. 숫자가 아니거나 짧으면 `None`.
///
/// `20180101000000` 처럼 뒤에 붙은 부분은 무시합니다.
pub fn parse_yyyymmdd(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..8)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(head, "%Y%m%d").ok()
}

pub fn format_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// 데이터 마감일: 어제. 당일 데이터는 아직 생산되지 않습니다.
pub fn data_end(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

pub fn day_before(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

pub fn day_after(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}
