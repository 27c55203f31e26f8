//! 점검 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 점검·보충 작업 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckStats {
    /// 점검한 종목 수
    pub total: usize,
    /// 누락 없는 종목 수
    pub complete: usize,
    /// 누락이 있는 종목 수
    pub incomplete: usize,
    /// 건너뛴 종목 수 (데이터 없음, 이미 최신 등)
    pub skipped: usize,
    /// 처리 중 에러 난 종목 수
    pub errors: usize,
    /// 누락 월(또는 누락 항목) 합계
    pub missing_items: usize,
    /// 보충 수집 성공 횟수
    pub backfill_ok: usize,
    /// 보충 수집 실패 횟수
    pub backfill_failed: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CheckStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 보충 수집 결과 반영
    pub fn record_backfill(&mut self, ok: bool) {
        if ok {
            self.backfill_ok += 1;
        } else {
            self.backfill_failed += 1;
        }
    }

    /// 완전성 비율 (%)
    pub fn complete_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.complete as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::info!(
            operation = operation,
            total = self.total,
            complete = self.complete,
            incomplete = self.incomplete,
            skipped = self.skipped,
            errors = self.errors,
            missing_items = self.missing_items,
            backfill_ok = self.backfill_ok,
            backfill_failed = self.backfill_failed,
            complete_rate = format!("{:.1}%", self.complete_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "점검 완료"
        );
    }

    /// 실행 기록에 남길 한 줄 요약
    pub fn summary_line(&self) -> String {
        format!(
            "total={} complete={} incomplete={} skipped={} errors={} missing={} backfill_ok={} backfill_failed={}",
            self.total,
            self.complete,
            self.incomplete,
            self.skipped,
            self.errors,
            self.missing_items,
            self.backfill_ok,
            self.backfill_failed
        )
    }
}
