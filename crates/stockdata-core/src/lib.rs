//! # Stockdata Core
//!
//! 분봉/일봉 파티션 점검에 공통으로 쓰이는 기본 타입을 제공합니다:
//! - 종목 코드, 연월(YearMonth), 분봉 주기
//! - 근사 거래일 캘린더 (월~금)와 월별 첫 거래일 캘린더
//! - 장중 세션 기준 기대 분봉 계산과 누락 구간 압축
//! - 로깅 인프라

pub mod calendar;
pub mod error;
pub mod logging;
pub mod sessions;
pub mod types;

pub use calendar::*;
pub use error::*;
pub use logging::*;
pub use sessions::*;
pub use types::*;
