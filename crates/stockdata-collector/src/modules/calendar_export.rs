//! 월별 첫 거래일 캘린더 내보내기.

use std::fs;
use std::path::PathBuf;
use stockdata_store::metadata::write_calendar_csv;
use tracing::info;

use crate::context::CheckContext;
use crate::Result;

/// `metadata/monthly_trading_calendar.csv`를 씁니다. 데이터 루트가 없으면 만듭니다.
pub fn export_calendar(ctx: &CheckContext) -> Result<PathBuf> {
    fs::create_dir_all(ctx.layout.root())?;
    let path = ctx.layout.calendar_csv();
    write_calendar_csv(&path, &ctx.calendar)?;
    info!(path = %path.display(), months = ctx.calendar.len(), "캘린더 내보내기 완료");
    Ok(path)
}
