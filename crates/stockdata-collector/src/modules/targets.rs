//! 점검 대상 종목 선택.

use stockdata_core::StockCode;
use stockdata_store::PartitionLayout;
use tracing::{info, warn};

use crate::error::CollectorError;
use crate::Result;

/// `--scan`이면 파티션 디렉터리의 모든 종목, 아니면 `--stocks` 목록.
///
/// 둘 다 없거나 `--stocks`가 비어 있으면 에러입니다.
pub fn resolve_targets(
    layout: &PartitionLayout,
    stocks: Option<&str>,
    scan: bool,
) -> Result<Vec<StockCode>> {
    if scan {
        let codes = layout.list_stocks()?;
        info!(count = codes.len(), root = %layout.minute_root().display(), "파티션 디렉터리 스캔");
        return Ok(codes);
    }

    let raw = stocks.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(|| {
        CollectorError::InvalidInput("--stocks 또는 --scan 중 하나가 필요합니다".to_string())
    })?;
    let codes = StockCode::parse_list(raw)?;
    if codes.is_empty() {
        return Err(CollectorError::InvalidInput(
            "--stocks에 종목 코드가 없습니다".to_string(),
        ));
    }
    Ok(codes)
}

/// `after` 종목까지 건너뛰고 그 다음부터 반환합니다.
///
/// 목록에 없는 코드면 경고 후 전체를 반환합니다.
pub fn skip_through(codes: Vec<StockCode>, after: Option<&StockCode>) -> Vec<StockCode> {
    let Some(after) = after else {
        return codes;
    };
    match codes.iter().position(|c| c == after) {
        Some(idx) => {
            let rest = codes[idx + 1..].to_vec();
            info!(resume_after = %after, skipped = idx + 1, remaining = rest.len(), "재개 지점 이후부터 처리");
            rest
        }
        None => {
            warn!(resume_after = %after, "재개 종목이 대상 목록에 없음, 전체 처리");
            codes
        }
    }
}
