//! 환경변수 기반 설정 모듈.
//!
//! `.env`가 있으면 먼저 읽고, CLI 옵션이 주어지면 그 값이 우선합니다.

use crate::error::CollectorError;
use crate::Result;
use chrono::NaiveDate;
use std::path::PathBuf;
use std::time::Duration;
use stockdata_core::{parse_yyyymmdd, Freq, StockCode, TradingSessions, DEFAULT_START_YYYYMMDD};

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터 루트 (기본 `.stock_data`)
    pub data_root: PathBuf,
    /// SQLite URL (없으면 실행 기록·체크포인트 비활성)
    pub database_url: Option<String>,
    /// 커버리지 판정 설정
    pub coverage: CoverageConfig,
    /// 보충 수집 스크립트 설정
    pub fetch: FetchConfig,
    /// 데몬 모드 설정
    pub daemon: DaemonConfig,
}

/// 커버리지 판정 설정
#[derive(Debug, Clone)]
pub struct CoverageConfig {
    /// 기대 구간 기본 시작일
    pub default_start: NaiveDate,
    /// 월별 첫 거래일을 추출할 기준 종목
    pub reference_stock: StockCode,
    /// 기준 종목 CSV 미러 루트
    pub csv_output_root: Option<PathBuf>,
    /// 장중 세션 (gap-report용)
    pub sessions: TradingSessions,
}

/// 보충 수집 스크립트 설정
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// 분봉 구간 수집 명령 (프로그램 + 기본 인자)
    pub minute_command: FetchCommand,
    /// 일봉 누락 목록 수집 명령
    pub daily_command: FetchCommand,
    /// 지수 일봉 누락 목록 수집 명령
    pub index_command: FetchCommand,
    /// 스크립트 실행 디렉터리
    pub workdir: Option<PathBuf>,
    /// 월 단위 보충 타임아웃 (초)
    pub month_timeout_secs: u64,
    /// 꼬리 구간/catch-up 타임아웃 (초)
    pub catch_up_timeout_secs: u64,
    /// 누락 목록 수집 타임아웃 (초)
    pub list_timeout_secs: u64,
    /// 분봉 주기
    pub freq: Freq,
    /// 스크립트에 넘길 토큰
    pub token: Option<String>,
    /// 스크립트에 넘길 종목 간 대기 (초)
    pub sleep_secs: f64,
}

/// 외부 명령 (프로그램과 고정 인자).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// 데몬 모드 설정
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// 워크플로우 실행 주기 (분 단위)
    pub interval_minutes: u64,
    /// 한 주기에 실행할 작업 (`check-daily`, `check-index`, `catch-up`)
    pub tasks: Vec<String>,
    /// 오늘 이미 성공한 작업은 건너뜀 (DB 설정 시)
    pub skip_if_done_today: bool,
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 키 조회 함수로 설정을 만듭니다. 없는 키는 기본값을 씁니다.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let default_start = var("COVERAGE_START_DATE", DEFAULT_START_YYYYMMDD);
        let default_start = parse_yyyymmdd(&default_start).ok_or_else(|| {
            CollectorError::Config(format!("COVERAGE_START_DATE 형식 오류: {}", default_start))
        })?;

        let reference_stock = StockCode::parse(&var("CALENDAR_REFERENCE_STOCK", "000001.SZ"))
            .map_err(|e| CollectorError::Config(format!("CALENDAR_REFERENCE_STOCK: {}", e)))?;

        let sessions: TradingSessions = match get("TRADING_SESSIONS") {
            Some(raw) => raw
                .parse()
                .map_err(|e| CollectorError::Config(format!("TRADING_SESSIONS: {}", e)))?,
            None => TradingSessions::a_share(),
        };

        let freq: Freq = var("FETCH_FREQ", "1min")
            .parse()
            .map_err(|e| CollectorError::Config(format!("FETCH_FREQ: {}", e)))?;

        let csv_output_root = var("CSV_OUTPUT_ROOT", "csv_output");

        Ok(Self {
            data_root: PathBuf::from(var("STOCK_DATA_PATH", ".stock_data")),
            database_url: get("DATABASE_URL").filter(|s| !s.is_empty()),
            coverage: CoverageConfig {
                default_start,
                reference_stock,
                csv_output_root: (!csv_output_root.is_empty()).then(|| PathBuf::from(csv_output_root)),
                sessions,
            },
            fetch: FetchConfig {
                minute_command: FetchCommand::parse(&var(
                    "MINUTE_FETCH_CMD",
                    "python scripts/minute/fetch_limit.py",
                ))?,
                daily_command: FetchCommand::parse(&var(
                    "DAILY_FETCH_CMD",
                    "python scripts/fetch_tushare_daily.py",
                ))?,
                index_command: FetchCommand::parse(&var(
                    "INDEX_FETCH_CMD",
                    "python scripts/fetch_tushare_index_daily.py",
                ))?,
                workdir: get("FETCH_WORKDIR").map(PathBuf::from),
                month_timeout_secs: env_var_parse(&get, "FETCH_MONTH_TIMEOUT_SECS", 600),
                catch_up_timeout_secs: env_var_parse(&get, "FETCH_CATCH_UP_TIMEOUT_SECS", 1200),
                list_timeout_secs: env_var_parse(&get, "FETCH_LIST_TIMEOUT_SECS", 86400),
                freq,
                token: get("TUSHARE_TOKEN").filter(|s| !s.is_empty()),
                sleep_secs: env_var_parse(&get, "FETCH_SLEEP_SECS", 0.0),
            },
            daemon: DaemonConfig {
                interval_minutes: env_var_parse(&get, "DAEMON_INTERVAL_MINUTES", 60),
                tasks: var("DAEMON_TASKS", "check-daily,check-index,catch-up")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                skip_if_done_today: env_var_bool(&get, "DAEMON_SKIP_IF_DONE_TODAY", true),
            },
        })
    }
}

impl FetchCommand {
    /// 명령줄을 토큰으로 나눕니다. 첫 토큰이 프로그램입니다.
    ///
    /// 작은따옴표·큰따옴표로 공백이 든 경로를 묶을 수 있고,
    /// 따옴표 밖과 큰따옴표 안에서는 `\`가 다음 문자를 그대로 넣습니다.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = split_command_line(raw)?.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| CollectorError::Config("빈 수집 명령".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

fn split_command_line(raw: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;
    let mut quote: Option<char> = None;
    let mut chars = raw.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('\''), c) => current.get_or_insert_with(String::new).push(c),
            (_, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| CollectorError::Config(format!("수집 명령 끝의 \\: {}", raw)))?;
                current.get_or_insert_with(String::new).push(escaped);
            }
            (Some(_), c) => current.get_or_insert_with(String::new).push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                current.get_or_insert_with(String::new);
            }
            (None, c) if c.is_whitespace() => tokens.extend(current.take()),
            (None, c) => current.get_or_insert_with(String::new).push(c),
        }
    }

    if quote.is_some() {
        return Err(CollectorError::Config(format!("닫히지 않은 따옴표: {}", raw)));
    }
    tokens.extend(current);
    Ok(tokens)
}

impl std::fmt::Display for FetchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let quoted = |token: &str| {
            if token.is_empty() || token.contains(char::is_whitespace) {
                format!("\"{}\"", token.replace('\\', "\\\\").replace('"', "\\\""))
            } else {
                token.to_string()
            }
        };
        f.write_str(&quoted(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quoted(arg))?;
        }
        Ok(())
    }
}

impl FetchConfig {
    pub fn month_timeout(&self) -> Duration {
        Duration::from_secs(self.month_timeout_secs)
    }

    pub fn catch_up_timeout(&self) -> Duration {
        Duration::from_secs(self.catch_up_timeout_secs)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }
}

impl DaemonConfig {
    /// 워크플로우 실행 주기를 Duration으로 반환
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T, F>(get: &F, key: &str, default: T) -> T
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool<F>(get: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    get(key).map(|v| v == "true" || v == "1").unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_fetch_command_parse() {
        let cmd = FetchCommand::parse("  python  scripts/minute/fetch_limit.py ").unwrap();
        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.args, vec!["scripts/minute/fetch_limit.py"]);
        assert_eq!(cmd.to_string(), "python scripts/minute/fetch_limit.py");
        assert!(FetchCommand::parse("   ").is_err());
    }

    #[test]
    fn test_fetch_command_quoted_paths() {
        let cmd = FetchCommand::parse(
            r#""/opt/my env/bin/python" '/srv/stock scripts/fetch_limit.py' --tag a\ b"#,
        )
        .unwrap();
        assert_eq!(cmd.program, "/opt/my env/bin/python");
        assert_eq!(cmd.args, vec!["/srv/stock scripts/fetch_limit.py", "--tag", "a b"]);
        assert_eq!(
            cmd.to_string(),
            r#""/opt/my env/bin/python" "/srv/stock scripts/fetch_limit.py" --tag "a b""#
        );
        assert_eq!(FetchCommand::parse(&cmd.to_string()).unwrap(), cmd);

        let empty_arg = FetchCommand::parse(r#"python run.py """#).unwrap();
        assert_eq!(empty_arg.args, vec!["run.py", ""]);

        assert!(FetchCommand::parse(r#"python "unterminated.py"#).is_err());
        assert!(FetchCommand::parse("python run.py \\").is_err());
    }

    #[test]
    fn test_defaults_match_script_layout() {
        let config = CollectorConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.data_root, PathBuf::from(".stock_data"));
        assert_eq!(config.database_url, None);
        assert_eq!(config.coverage.reference_stock.as_str(), "000001.SZ");
        assert_eq!(config.coverage.default_start, NaiveDate::from_ymd_opt(2018, 1, 1).unwrap());
        assert_eq!(config.fetch.month_timeout(), Duration::from_secs(600));
        assert_eq!(config.fetch.catch_up_timeout(), Duration::from_secs(1200));
        assert_eq!(config.fetch.list_timeout(), Duration::from_secs(86400));
        assert_eq!(config.fetch.minute_command.args, vec!["scripts/minute/fetch_limit.py"]);
        assert_eq!(config.daemon.interval(), Duration::from_secs(3600));
        assert_eq!(config.daemon.tasks.len(), 3);
        assert!(config.daemon.skip_if_done_today);
        assert_eq!(config.coverage.sessions.expected_count(), 240);
    }

    #[test]
    fn test_lookup_overrides_and_validation() {
        let env = HashMap::from([
            ("STOCK_DATA_PATH", "/data/stock"),
            ("DATABASE_URL", "sqlite://runs.db"),
            ("FETCH_SLEEP_SECS", "0.5"),
            ("FETCH_FREQ", "5min"),
            ("TUSHARE_TOKEN", ""),
            ("DAEMON_TASKS", "check-daily, ,catch-up"),
            ("DAEMON_SKIP_IF_DONE_TODAY", "false"),
            ("FETCH_MONTH_TIMEOUT_SECS", "not-a-number"),
        ]);
        let config =
            CollectorConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.data_root, PathBuf::from("/data/stock"));
        assert_eq!(config.database_url.as_deref(), Some("sqlite://runs.db"));
        assert_eq!(config.fetch.sleep_secs, 0.5);
        assert_eq!(config.fetch.freq, Freq::Min5);
        assert_eq!(config.fetch.token, None);
        assert_eq!(config.fetch.month_timeout_secs, 600);
        assert_eq!(config.daemon.tasks, vec!["check-daily", "catch-up"]);
        assert!(!config.daemon.skip_if_done_today);

        let bad = HashMap::from([("COVERAGE_START_DATE", "2018-01-01")]);
        assert!(CollectorConfig::from_lookup(|k| bad.get(k).map(|v| v.to_string())).is_err());
    }
}
