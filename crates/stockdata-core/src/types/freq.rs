//! 보충 수집 스크립트에 넘기는 분봉 주기.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 분봉 주기. 문자열 표현은 Tushare `stk_mins` 규칙(`1min` 등)을 따릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Freq {
    /// 1분봉
    #[default]
    #[serde(rename = "1min")]
    Min1,
    /// 5분봉
    #[serde(rename = "5min")]
    Min5,
    /// 15분봉
    #[serde(rename = "15min")]
    Min15,
    /// 30분봉
    #[serde(rename = "30min")]
    Min30,
    /// 60분봉
    #[serde(rename = "60min")]
    Min60,
}

impl Freq {
    pub fn as_str(&self) -> &'static str {
        match self {
            Freq::Min1 => "1min",
            Freq::Min5 => "5min",
            Freq::Min15 => "15min",
            Freq::Min30 => "30min",
            Freq::Min60 => "60min",
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Freq::Min1 => 1,
            Freq::Min5 => 5,
            Freq::Min15 => 15,
            Freq::Min30 => 30,
            Freq::Min60 => 60,
        }
    }
}

impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Freq {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1min" | "1m" => Ok(Freq::Min1),
            "5min" | "5m" => Ok(Freq::Min5),
            "15min" | "15m" => Ok(Freq::Min15),
            "30min" | "30m" => Ok(Freq::Min30),
            "60min" | "60m" | "1h" => Ok(Freq::Min60),
            _ => Err(CoreError::InvalidFreq(s.to_string())),
        }
    }
}
