//! 핵심 타입 에러.

use thiserror::Error;

/// 핵심 타입 파싱/검증 에러.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// 잘못된 종목 코드
    #[error("잘못된 종목 코드: {0}")]
    InvalidStockCode(String),

    /// 잘못된 날짜/연월
    #[error("잘못된 날짜: {0}")]
    InvalidDate(String),

    /// 잘못된 세션 정의 (HH:MM-HH:MM)
    #[error("잘못된 세션: {0}")]
    InvalidSession(String),

    /// 지원하지 않는 분봉 주기
    #[error("지원하지 않는 주기: {0}")]
    InvalidFreq(String),
}

/// 핵심 작업을 위한 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;
