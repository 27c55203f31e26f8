//! 외부 수집 스크립트 실행.
//!
//! 데이터 수집 자체는 기존 스크립트가 담당하고, 여기서는 누락 구간을 인자로 넘겨
//! 서브프로세스를 실행합니다. 종료 코드 0이면 성공이며, 타임아웃이나 실행 실패는
//! 실패로 기록만 하고 점검은 계속 진행합니다.
//!
//! 구간 수집 인자:
//! `--freq F --stocks CODE --start-date YYYYMMDD --end-date YYYYMMDD [--token T] [--sleep N]`
//!
//! 목록 수집 인자:
//! `--from-missing-list /abs/path [--token T] [--sleep N]`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use stockdata_core::{DateRange, Freq, StockCode};
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::config::{FetchCommand, FetchConfig};

/// 보충 구간의 종류. 종류별로 타임아웃이 다릅니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillKind {
    /// 한 달 (또는 그 일부)
    Month,
    /// 마지막 로컬 날짜 이후 꼬리 구간
    Tail,
    /// catch-up 명령
    CatchUp,
}

/// 종목 하나, 날짜 구간 하나의 보충 요청.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillRequest {
    pub code: StockCode,
    pub range: DateRange,
    pub kind: BackfillKind,
}

impl BackfillRequest {
    pub fn new(code: StockCode, range: DateRange, kind: BackfillKind) -> Self {
        Self { code, range, kind }
    }
}

/// 보충 수집 인터페이스.
///
/// 반환값은 성공 여부이며 에러를 전파하지 않습니다.
#[async_trait]
pub trait Backfiller: Send + Sync {
    /// 종목 하나의 날짜 구간 수집
    async fn fetch_range(&self, request: &BackfillRequest) -> bool;

    /// 누락 목록 파일 기반 수집
    async fn fetch_missing_list(&self, path: &Path) -> bool;
}

/// 외부 스크립트 실행기.
#[derive(Debug, Clone)]
pub struct ScriptBackfiller {
    /// 구간 수집 명령 (분봉)
    range_command: FetchCommand,
    /// 목록 수집 명령 (일봉/지수)
    list_command: FetchCommand,
    workdir: Option<PathBuf>,
    freq: Freq,
    token: Option<String>,
    sleep_secs: f64,
    month_timeout: Duration,
    catch_up_timeout: Duration,
    list_timeout: Duration,
}

impl ScriptBackfiller {
    fn with_commands(config: &FetchConfig, range: &FetchCommand, list: &FetchCommand) -> Self {
        Self {
            range_command: range.clone(),
            list_command: list.clone(),
            workdir: config.workdir.clone(),
            freq: config.freq,
            token: config.token.clone(),
            sleep_secs: config.sleep_secs,
            month_timeout: config.month_timeout(),
            catch_up_timeout: config.catch_up_timeout(),
            list_timeout: config.list_timeout(),
        }
    }

    /// 분봉 구간 수집용.
    pub fn minute(config: &FetchConfig) -> Self {
        Self::with_commands(config, &config.minute_command, &config.minute_command)
    }

    /// 종목 일봉 목록 수집용.
    pub fn daily(config: &FetchConfig) -> Self {
        Self::with_commands(config, &config.daily_command, &config.daily_command)
    }

    /// 지수 일봉 목록 수집용.
    pub fn index(config: &FetchConfig) -> Self {
        Self::with_commands(config, &config.index_command, &config.index_command)
    }

    pub fn timeout_for(&self, kind: BackfillKind) -> Duration {
        match kind {
            BackfillKind::Month => self.month_timeout,
            BackfillKind::Tail | BackfillKind::CatchUp => self.catch_up_timeout,
        }
    }

    /// 구간 수집 인자.
    pub fn range_args(&self, request: &BackfillRequest) -> Vec<String> {
        let mut args = vec![
            "--freq".to_string(),
            self.freq.to_string(),
            "--stocks".to_string(),
            request.code.to_string(),
            "--start-date".to_string(),
            request.range.start_yyyymmdd(),
            "--end-date".to_string(),
            request.range.end_yyyymmdd(),
        ];
        self.push_common_args(&mut args);
        args
    }

    /// 목록 수집 인자. 경로는 절대 경로로 바꿔 넘깁니다.
    pub fn list_args(&self, path: &Path) -> Vec<String> {
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut args = vec![
            "--from-missing-list".to_string(),
            absolute.display().to_string(),
        ];
        self.push_common_args(&mut args);
        args
    }

    fn push_common_args(&self, args: &mut Vec<String>) {
        if let Some(token) = &self.token {
            args.push("--token".to_string());
            args.push(token.clone());
        }
        if self.sleep_secs > 0.0 {
            args.push("--sleep".to_string());
            args.push(self.sleep_secs.to_string());
        }
    }

    /// 로그용 명령줄. 토큰은 가립니다.
    fn display_command(command: &FetchCommand, args: &[String]) -> String {
        let mut masked = Vec::with_capacity(args.len());
        let mut hide_next = false;
        for arg in args {
            if hide_next {
                masked.push("***".to_string());
                hide_next = false;
            } else {
                hide_next = arg == "--token";
                masked.push(arg.clone());
            }
        }
        format!("{} {}", command, masked.join(" "))
    }

    async fn run(&self, command: &FetchCommand, args: Vec<String>, timeout: Duration, label: &str) -> bool {
        let command_line = Self::display_command(command, &args);
        info!(target_label = label, command = %command_line, "보충 수집 실행");

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(target_label = label, error = %e, "보충 수집 실행 실패");
                return false;
            }
        };

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!(
                    target_label = label,
                    elapsed = format!("{:.1}s", started.elapsed().as_secs_f64()),
                    "보충 수집 완료"
                );
                true
            }
            Ok(Ok(status)) => {
                warn!(target_label = label, exit_code = ?status.code(), "보충 수집 비정상 종료");
                false
            }
            Ok(Err(e)) => {
                error!(target_label = label, error = %e, "보충 수집 대기 실패");
                false
            }
            Err(_) => {
                error!(target_label = label, timeout_secs = timeout.as_secs(), "보충 수집 타임아웃");
                if let Err(e) = child.kill().await {
                    warn!(target_label = label, error = %e, "타임아웃 프로세스 종료 실패");
                }
                false
            }
        }
    }
}

#[async_trait]
impl Backfiller for ScriptBackfiller {
    async fn fetch_range(&self, request: &BackfillRequest) -> bool {
        let label = format!("{} {}", request.code, request.range);
        let args = self.range_args(request);
        self.run(&self.range_command, args, self.timeout_for(request.kind), &label)
            .await
    }

    async fn fetch_missing_list(&self, path: &Path) -> bool {
        let label = path.display().to_string();
        let args = self.list_args(path);
        self.run(&self.list_command, args, self.list_timeout, &label).await
    }
}
