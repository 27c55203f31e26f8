//! 종목별 분봉 보유 구간 스캔.
//!
//! 모든 월 파티션을 읽어 종목의 첫 봉·마지막 봉 시각을 구하고,
//! DB가 설정되어 있으면 `stock_minute_coverage`에 기록합니다.

use chrono::NaiveDateTime;
use std::path::Path;
use std::time::Instant;
use stockdata_core::StockCode;
use stockdata_store::metadata::write_symbol_list;
use stockdata_store::{CoverageRecord, CoverageRepository};
use tracing::{debug, error, info, warn};

use crate::context::CheckContext;
use crate::stats::CheckStats;
use crate::Result;

/// 종목 하나의 보유 구간.
///
/// 읽을 수 없는 파티션은 건너뛰며 `month_files`에는 발견한 파일 수를 그대로 남깁니다.
pub fn scan_stock(ctx: &CheckContext, code: &StockCode, now: NaiveDateTime) -> Result<CoverageRecord> {
    let files = ctx.layout.list_month_files(code)?;
    let mut start_dt: Option<NaiveDateTime> = None;
    let mut end_dt: Option<NaiveDateTime> = None;

    for file in &files {
        match ctx.probe.bar_times(&file.path) {
            Ok(bars) => {
                if let Some(min) = bars.min() {
                    start_dt = Some(start_dt.map_or(min, |cur| cur.min(min)));
                }
                if let Some(max) = bars.max() {
                    end_dt = Some(end_dt.map_or(max, |cur| cur.max(max)));
                }
            }
            Err(e) => warn!(stock = %code, month = %file.month, error = %e, "파티션 읽기 실패"),
        }
    }

    Ok(CoverageRecord {
        symbol: code.to_string(),
        start_dt,
        end_dt,
        month_files: files.len() as i64,
        last_scan_at: now,
    })
}

/// 종목 목록 스캔.
///
/// 데이터가 없는 종목은 `missing_output`이 주어지면 목록 파일로 남깁니다.
pub async fn scan_coverage(
    ctx: &CheckContext,
    codes: &[StockCode],
    repo: Option<&CoverageRepository>,
    missing_output: Option<&Path>,
    now: NaiveDateTime,
) -> Result<(CheckStats, Vec<CoverageRecord>)> {
    let started = Instant::now();
    let mut stats = CheckStats::new();
    let mut records = Vec::with_capacity(codes.len());
    let mut no_data = Vec::new();

    for code in codes {
        stats.total += 1;
        let record = match scan_stock(ctx, code, now) {
            Ok(record) => record,
            Err(e) => {
                error!(stock = %code, error = %e, "커버리지 스캔 실패");
                stats.errors += 1;
                continue;
            }
        };

        if record.end_dt.is_none() {
            stats.incomplete += 1;
            no_data.push(code.clone());
        } else {
            stats.complete += 1;
        }
        debug!(stock = %code, start = ?record.start_dt, end = ?record.end_dt, files = record.month_files, "커버리지");

        if let Some(repo) = repo {
            if let Err(e) = repo.upsert(&record).await {
                error!(stock = %code, error = %e, "커버리지 저장 실패");
                stats.errors += 1;
            }
        }
        records.push(record);
    }

    stats.missing_items = no_data.len();
    if let Some(path) = missing_output {
        if !no_data.is_empty() {
            write_symbol_list(path, &no_data)?;
            info!(path = %path.display(), count = no_data.len(), "분봉 없는 종목 목록 저장");
        }
    }

    stats.elapsed = started.elapsed();
    Ok((stats, records))
}
