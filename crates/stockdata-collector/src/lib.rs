//! 분봉/일봉 파티션 커버리지 점검과 스크립트 기반 보충 수집.
//!
//! 이 crate는 `stockdata` 바이너리와 그 작업들을 제공합니다:
//! - 월 파티션 누락·첫 봉 점검, 월 시작일 점검, 마지막 날짜 이후 catch-up
//! - 일봉/지수 일봉 최신성 점검과 누락 목록 생성
//! - 캘린더 내보내기, 커버리지 스캔, 장중 누락 구간 리포트
//! - 실행 기록과 체크포인트 (SQLite)

pub mod config;
pub mod context;
pub mod error;
pub mod modules;
pub mod stats;

pub use config::CollectorConfig;
pub use context::CheckContext;
pub use error::{CollectorError, Result};
pub use stats::CheckStats;
