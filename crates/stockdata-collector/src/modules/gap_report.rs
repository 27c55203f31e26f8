//! 장중 분봉 누락 구간 리포트.
//!
//! 봉이 있는 거래일마다 세션 기준 기대 분과 비교해 빠진 구간을 연속 구간으로 묶습니다.
//! 봉이 하나도 없는 평일은 휴장일일 수 있어 구간 대신 누락일로 따로 보고합니다.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::Path;
use stockdata_core::{is_trading_day, to_gap_ranges, StockCode, TradingSessions, YearMonth};
use tracing::{info, warn};

use crate::context::CheckContext;
use crate::Result;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CSV 한 줄
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapRow {
    pub symbol: StockCode,
    pub trade_date: NaiveDate,
    pub gap_start: NaiveDateTime,
    pub gap_end: NaiveDateTime,
    pub gap_minutes: i64,
}

/// 종목 하나의 리포트
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GapReport {
    pub rows: Vec<GapRow>,
    /// 봉이 하나도 없는 평일
    pub missing_days: Vec<NaiveDate>,
    /// 봉이 있어 구간을 계산한 날 수
    pub days_checked: usize,
}

impl GapReport {
    pub fn gap_minutes(&self) -> i64 {
        self.rows.iter().map(|r| r.gap_minutes).sum()
    }
}

/// 그 달 평일 중 기대 시작일 이후, 데이터 종료일 이전인 날. 상장 전 달은 비어 있습니다.
fn expected_days(ctx: &CheckContext, code: &StockCode, month: YearMonth) -> Vec<NaiveDate> {
    if ctx.list_date(code).is_some_and(|l| month < YearMonth::of(l)) {
        return Vec::new();
    }
    let from = ctx
        .effective_first(code, month)
        .unwrap_or_else(|| month.first_day());
    from.iter_days()
        .take_while(|d| *d <= month.last_day() && *d <= ctx.data_end)
        .filter(|d| is_trading_day(*d))
        .collect()
}

/// 종목 하나의 월 목록에 대한 누락 구간.
pub fn gap_report(
    ctx: &CheckContext,
    code: &StockCode,
    months: &[YearMonth],
    sessions: &TradingSessions,
) -> Result<GapReport> {
    let mut report = GapReport::default();

    for &month in months {
        let mut by_day: BTreeMap<NaiveDate, Vec<NaiveDateTime>> = BTreeMap::new();
        if let Some(path) = ctx.layout.find_month_file(code, month)? {
            match ctx.probe.bar_times(&path) {
                Ok(bars) => {
                    for t in bars.times() {
                        by_day.entry(t.date()).or_default().push(*t);
                    }
                }
                Err(e) => warn!(stock = %code, month = %month, error = %e, "파티션 읽기 실패"),
            }
        }

        for day in expected_days(ctx, code, month) {
            let Some(times) = by_day.get(&day) else {
                report.missing_days.push(day);
                continue;
            };
            report.days_checked += 1;
            let missing = sessions.missing_minutes(day, times.iter().copied());
            for gap in to_gap_ranges(&missing) {
                report.rows.push(GapRow {
                    symbol: code.clone(),
                    trade_date: day,
                    gap_start: gap.start,
                    gap_end: gap.end,
                    gap_minutes: gap.minutes,
                });
            }
        }
    }
    Ok(report)
}

/// `symbol,trade_date,gap_start,gap_end,gap_minutes` CSV.
pub fn write_gap_csv(path: &Path, rows: &[GapRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["symbol", "trade_date", "gap_start", "gap_end", "gap_minutes"])?;
    for row in rows {
        writer.write_record([
            row.symbol.to_string(),
            row.trade_date.format("%Y-%m-%d").to_string(),
            row.gap_start.format(TIME_FORMAT).to_string(),
            row.gap_end.format(TIME_FORMAT).to_string(),
            row.gap_minutes.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// 종목 목록 리포트를 하나의 CSV로 씁니다. 반환값은 (구간 수, 누락일 수).
pub fn run_gap_report(
    ctx: &CheckContext,
    codes: &[StockCode],
    start_date: Option<&str>,
    end_date: Option<&str>,
    sessions: &TradingSessions,
    output: &Path,
) -> Result<(usize, usize)> {
    let mut rows = Vec::new();
    let mut missing_days = 0;

    for code in codes {
        let months = ctx.expected_months(code, start_date, end_date);
        let report = gap_report(ctx, code, &months, sessions)?;
        if !report.missing_days.is_empty() {
            let sample: Vec<String> = report
                .missing_days
                .iter()
                .take(10)
                .map(|d| d.format("%Y-%m-%d(%a)").to_string())
                .collect();
            warn!(stock = %code, count = report.missing_days.len(), sample = ?sample, "봉 없는 평일");
        }
        info!(
            stock = %code,
            days = report.days_checked,
            gaps = report.rows.len(),
            gap_minutes = report.gap_minutes(),
            "누락 구간 계산"
        );
        missing_days += report.missing_days.len();
        rows.extend(report.rows);
    }

    write_gap_csv(output, &rows)?;
    info!(path = %output.display(), rows = rows.len(), "누락 구간 리포트 저장");
    Ok((rows.len(), missing_days))
}
