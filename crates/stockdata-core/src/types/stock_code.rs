//! 종목/지수 코드 정의.
//!
//! 코드는 `600066.SH`처럼 번호와 거래소 접미사로 구성되며,
//! 파티션 디렉터리 이름(`stock_code={code}`)에 그대로 쓰입니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};

/// 거래소 접미사.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// 상하이
    SH,
    /// 선전
    SZ,
    /// 베이징
    BJ,
}

impl Exchange {
    fn from_suffix(s: &str) -> Option<Self> {
        match s {
            "SH" => Some(Self::SH),
            "SZ" => Some(Self::SZ),
            "BJ" => Some(Self::BJ),
            _ => None,
        }
    }
}

/// 정규화된 (대문자, 공백 제거) 종목 코드.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StockCode(String);

impl StockCode {
    /// 코드를 정규화하고 검증합니다.
    ///
    /// 비어 있거나 경로 구분자, `=`를 포함하면 거부합니다.
    pub fn parse(raw: &str) -> CoreResult<Self> {
        let code = raw.trim().to_uppercase();
        if code.is_empty() || code.contains(['/', '\\', '=']) || code.contains("..") {
            return Err(CoreError::InvalidStockCode(raw.to_string()));
        }
        Ok(Self(code))
    }

    /// 쉼표로 구분된 목록을 파싱합니다. 빈 항목은 무시합니다.
    pub fn parse_list(raw: &str) -> CoreResult<Vec<Self>> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 거래소 접미사. 없거나 알 수 없으면 `None`.
    pub fn exchange(&self) -> Option<Exchange> {
        self.0
            .rsplit_once('.')
            .and_then(|(_, suffix)| Exchange::from_suffix(suffix))
    }

    /// 상하이/선전 A주 여부.
    pub fn is_a_share(&self) -> bool {
        matches!(self.exchange(), Some(Exchange::SH | Exchange::SZ))
    }
}

impl fmt::Display for StockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StockCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StockCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StockCode> for String {
    fn from(code: StockCode) -> Self {
        code.0
    }
}

impl AsRef<str> for StockCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
