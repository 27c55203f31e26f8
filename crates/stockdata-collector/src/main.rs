//! stockdata CLI.

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePool;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use stockdata_collector::config::FetchConfig;
use stockdata_collector::context::ContextSources;
use stockdata_collector::modules::run_ledger::{TRIGGER_DAEMON, TRIGGER_MANUAL};
use stockdata_collector::modules::{
    self, DailyCheckOptions, DailyKind, MonthCheckOptions, RunLedger, ScriptBackfiller,
    StartCheckOptions,
};
use stockdata_collector::{CheckContext, CheckStats, CollectorConfig, CollectorError};
use stockdata_core::{data_end, init_logging, parse_yyyymmdd, Freq, LogConfig, LogFormat, StockCode};
use stockdata_store::{
    BarProbe, CoverageRepository, Database, DatabaseConfig, ParquetBarReader, PartitionLayout,
};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "stockdata")]
#[command(about = "Partition coverage checks and backfill for local market data", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 데이터 루트 (기본: STOCK_DATA_PATH 또는 .stock_data)
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// 로그 레벨 (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// 로그 형식 (pretty, json, compact)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// 오늘 이미 성공한 같은 작업은 건너뜀 (DATABASE_URL 필요)
    #[arg(long, global = true)]
    skip_if_done_today: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 월 파티션 누락 점검 (선택: 첫 봉 검증, 보충 수집)
    CheckMonths {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        script: ScriptArgs,
        /// 누락 월과 꼬리 구간을 수집 스크립트로 보충
        #[arg(long)]
        fetch: bool,
        /// 각 월의 첫 봉이 기대 시작일·개장 시각인지 검증
        #[arg(long)]
        check_first_bar: bool,
        /// metadata/stock_basic.csv의 상장일 반영
        #[arg(long)]
        use_stock_basic: bool,
        /// 누락 월 목록 파일 (code,yyyy,mm)
        #[arg(long)]
        output_missing: Option<PathBuf>,
    },

    /// 월별 첫 봉 날짜가 그 달 첫 거래일인지 점검
    CheckStart {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        script: ScriptArgs,
        /// 부족한 구간을 수집 스크립트로 보충
        #[arg(long)]
        fetch: bool,
        /// 보충이 필요한 월 목록 파일
        #[arg(long)]
        output_missing: Option<PathBuf>,
    },

    /// 마지막 로컬 날짜 다음날부터 종료일까지 보충
    CatchUp {
        #[command(flatten)]
        targets: TargetArgs,
        /// 종료일 YYYYMMDD (기본: 어제)
        #[arg(long)]
        end_date: Option<String>,
        #[command(flatten)]
        script: ScriptArgs,
    },

    /// A주 일봉 최신성 점검
    CheckDaily(DailyArgs),

    /// 지수 일봉 최신성 점검
    CheckIndex(DailyArgs),

    /// 월별 첫 거래일 캘린더 CSV 내보내기
    ExportCalendar {
        /// 캘린더 시작일 YYYYMMDD (기본: COVERAGE_START_DATE)
        #[arg(long)]
        start_date: Option<String>,
    },

    /// 종목별 분봉 보유 구간 스캔
    ScanCoverage {
        #[command(flatten)]
        targets: TargetArgs,
        /// 분봉이 없는 종목 목록 파일
        #[arg(long)]
        output_missing: Option<PathBuf>,
    },

    /// 장중 누락 구간 CSV 리포트
    GapReport {
        #[command(flatten)]
        targets: TargetArgs,
        #[command(flatten)]
        range: RangeArgs,
        /// 출력 CSV
        #[arg(long, default_value = "gap_report.csv")]
        output: PathBuf,
    },

    /// 실행 기록과 체크포인트 조회
    Runs {
        /// 작업 종류 필터 (예: check-daily)
        #[arg(long)]
        task: Option<String>,
        /// 실행일 필터 YYYYMMDD
        #[arg(long)]
        date: Option<String>,
        /// 최대 출력 수
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// 데몬 모드: 주기적으로 DAEMON_TASKS 실행
    Daemon,
}

/// 점검 대상 선택
#[derive(Args, Debug, Clone, Default)]
struct TargetArgs {
    /// 종목 코드 (쉼표로 구분, 예: "600066.SH,000001.SZ")
    #[arg(long)]
    stocks: Option<String>,
    /// 파티션 디렉터리의 모든 종목
    #[arg(long)]
    scan: bool,
    /// 이 종목 다음부터 처리
    #[arg(long)]
    resume_after: Option<String>,
    /// 중단된 체크포인트 다음부터 처리
    #[arg(long)]
    resume: bool,
}

#[derive(Args, Debug, Clone, Default)]
struct RangeArgs {
    /// 기대 구간 시작 YYYYMMDD
    #[arg(long)]
    start_date: Option<String>,
    /// 기대 구간 끝 YYYYMMDD
    #[arg(long)]
    end_date: Option<String>,
}

/// 수집 스크립트 인자 (환경변수 설정보다 우선)
#[derive(Args, Debug, Clone, Default)]
struct ScriptArgs {
    /// 분봉 주기 (1min, 5min, 15min, 30min, 60min)
    #[arg(long)]
    freq: Option<Freq>,
    /// Tushare 토큰
    #[arg(long)]
    token: Option<String>,
    /// 종목 간 대기 (초)
    #[arg(long)]
    sleep: Option<f64>,
}

impl ScriptArgs {
    fn apply(&self, base: &FetchConfig) -> FetchConfig {
        let mut fetch = base.clone();
        if let Some(freq) = self.freq {
            fetch.freq = freq;
        }
        if let Some(token) = &self.token {
            fetch.token = Some(token.clone());
        }
        if let Some(sleep) = self.sleep {
            fetch.sleep_secs = sleep;
        }
        fetch
    }
}

#[derive(Args, Debug, Clone, Default)]
struct DailyArgs {
    /// 점검만 하고 목록 파일을 쓰지 않음
    #[arg(long)]
    dry_run: bool,
    /// 누락 목록 파일 (기본: metadata/ 아래 타임스탬프 파일)
    #[arg(long)]
    output: Option<PathBuf>,
    /// 목록을 쓴 뒤 수집 스크립트 실행
    #[arg(long)]
    fetch: bool,
    #[command(flatten)]
    script: ScriptArgs,
}

/// 명령 실행에 필요한 공유 상태
struct Runner<'a> {
    config: &'a CollectorConfig,
    layout: PartitionLayout,
    probe: Arc<dyn BarProbe>,
    pool: Option<&'a SqlitePool>,
    ledger: Option<RunLedger>,
    skip_if_done_today: bool,
}

impl<'a> Runner<'a> {
    fn new(
        config: &'a CollectorConfig,
        pool: Option<&'a SqlitePool>,
        triggered_by: &'static str,
        skip_if_done_today: bool,
    ) -> Self {
        Self {
            config,
            layout: PartitionLayout::new(config.data_root.clone()),
            probe: Arc::new(ParquetBarReader::new()),
            pool,
            ledger: pool.map(|p| RunLedger::new(p.clone(), triggered_by)),
            skip_if_done_today,
        }
    }

    fn context(&self, start_date: Option<&str>, sources: ContextSources) -> CheckContext {
        let today = Local::now().date_naive();
        let mut ctx = CheckContext::new(
            self.layout.clone(),
            Arc::clone(&self.probe),
            self.config.coverage.default_start,
            today,
        );
        if let Some(start) = start_date.and_then(parse_yyyymmdd) {
            ctx = ctx.extend_calendar_from(start);
        }
        ctx.with_sources(
            sources,
            &self.config.coverage.reference_stock,
            self.config.coverage.csv_output_root.as_deref(),
        )
    }

    /// 대상 종목 목록. `--resume-after`가 `--resume`보다 우선합니다.
    async fn targets(&self, args: &TargetArgs, workflow: &str) -> anyhow::Result<Vec<StockCode>> {
        let codes = modules::resolve_targets(&self.layout, args.stocks.as_deref(), args.scan)?;

        let after = if let Some(raw) = &args.resume_after {
            Some(StockCode::parse(raw)?)
        } else if args.resume {
            match self.pool {
                Some(pool) => match modules::load_checkpoint(pool, workflow).await? {
                    Some(ticker) => {
                        info!(workflow, ticker = %ticker, "중단 지점에서 재개");
                        Some(StockCode::parse(&ticker)?)
                    }
                    None => {
                        info!(workflow, "중단된 체크포인트 없음, 처음부터 처리");
                        None
                    }
                },
                None => {
                    warn!("DATABASE_URL 없음, --resume 무시");
                    None
                }
            }
        } else {
            None
        };

        Ok(modules::skip_through(codes, after.as_ref()))
    }

    /// 실행 기록과 중단 처리를 붙여 작업을 실행합니다.
    async fn record<F>(&self, task: &str, params: Value, work: F) -> anyhow::Result<()>
    where
        F: Future<Output = stockdata_collector::Result<CheckStats>>,
    {
        let work = modules::until_interrupted(self.pool, task, work);
        let ran = modules::run_recorded(self.ledger.as_ref(), task, params, self.skip_if_done_today, work)
            .await
            .with_context(|| format!("{} 실패", task))?;
        if let Some(stats) = ran {
            stats.log_summary(task);
        }
        Ok(())
    }

    async fn catch_up(
        &self,
        targets: &TargetArgs,
        end_date: Option<&str>,
        script: &ScriptArgs,
    ) -> anyhow::Result<()> {
        let workflow = modules::catch_up::WORKFLOW;
        let codes = self.targets(targets, workflow).await?;
        let ctx = self.context(None, ContextSources::REFERENCE_ONLY);
        let backfiller = ScriptBackfiller::minute(&script.apply(&self.config.fetch));
        let params = json!({ "stocks": codes.len(), "end_date": end_date });
        self.record(
            workflow,
            params,
            modules::catch_up(&ctx, &codes, end_date, &backfiller, self.pool),
        )
        .await
    }

    async fn check_daily(&self, kind: DailyKind, args: &DailyArgs) -> anyhow::Result<()> {
        let fetch_config = args.script.apply(&self.config.fetch);
        let backfiller = match kind {
            DailyKind::Stock => ScriptBackfiller::daily(&fetch_config),
            DailyKind::Index => ScriptBackfiller::index(&fetch_config),
        };
        let options = DailyCheckOptions {
            dry_run: args.dry_run,
            output: args.output.clone(),
            fetch: args.fetch,
        };
        let data_end = data_end(Local::now().date_naive());
        let params = json!({ "dry_run": args.dry_run, "fetch": args.fetch, "data_end": data_end.to_string() });

        self.record(kind.task_name(), params, async {
            let (stats, list) = modules::run_daily_check(
                &self.layout,
                self.probe.as_ref(),
                kind,
                data_end,
                &options,
                &backfiller,
            )
            .await?;
            if let Some(list) = list {
                info!(kind = kind.task_name(), path = %list.display(), "누락 목록");
            }
            Ok(stats)
        })
        .await
    }

    async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::CheckMonths {
                targets,
                range,
                script,
                fetch,
                check_first_bar,
                use_stock_basic,
                output_missing,
            } => {
                let workflow = modules::month_check::WORKFLOW;
                let codes = self.targets(&targets, workflow).await?;
                let sources = modules::month_check::context_sources(use_stock_basic);
                let ctx = self.context(range.start_date.as_deref(), sources);
                let backfiller = ScriptBackfiller::minute(&script.apply(&self.config.fetch));
                let params = json!({
                    "stocks": codes.len(),
                    "start_date": range.start_date,
                    "end_date": range.end_date,
                    "fetch": fetch,
                    "check_first_bar": check_first_bar,
                });
                let options = MonthCheckOptions {
                    start_date: range.start_date,
                    end_date: range.end_date,
                    check_first_bar,
                    fetch,
                    output_missing,
                };
                self.record(
                    workflow,
                    params,
                    modules::check_months(&ctx, &codes, &options, &backfiller, self.pool),
                )
                .await
            }
            Commands::CheckStart {
                targets,
                range,
                script,
                fetch,
                output_missing,
            } => {
                let workflow = modules::start_check::WORKFLOW;
                let codes = self.targets(&targets, workflow).await?;
                let sources = modules::start_check::CONTEXT_SOURCES;
                let ctx = self.context(range.start_date.as_deref(), sources);
                let backfiller = ScriptBackfiller::minute(&script.apply(&self.config.fetch));
                let params = json!({
                    "stocks": codes.len(),
                    "start_date": range.start_date,
                    "end_date": range.end_date,
                    "fetch": fetch,
                });
                let options = StartCheckOptions {
                    start_date: range.start_date,
                    end_date: range.end_date,
                    fetch,
                    output_missing,
                };
                self.record(
                    workflow,
                    params,
                    modules::check_start(&ctx, &codes, &options, &backfiller, self.pool),
                )
                .await
            }
            Commands::CatchUp {
                targets,
                end_date,
                script,
            } => self.catch_up(&targets, end_date.as_deref(), &script).await,
            Commands::CheckDaily(args) => self.check_daily(DailyKind::Stock, &args).await,
            Commands::CheckIndex(args) => self.check_daily(DailyKind::Index, &args).await,
            Commands::ExportCalendar { start_date } => {
                let ctx = self.context(start_date.as_deref(), ContextSources::REFERENCE_ONLY);
                let path = modules::export_calendar(&ctx)?;
                println!("{}", path.display());
                Ok(())
            }
            Commands::ScanCoverage {
                targets,
                output_missing,
            } => {
                let codes = self.targets(&targets, "scan-coverage").await?;
                let ctx = self.context(None, ContextSources::REFERENCE_ONLY);
                let repo = self.pool.map(|p| CoverageRepository::new(p.clone()));
                let params = json!({ "stocks": codes.len() });
                self.record("scan-coverage", params, async {
                    let (stats, _) = modules::scan_coverage(
                        &ctx,
                        &codes,
                        repo.as_ref(),
                        output_missing.as_deref(),
                        Local::now().naive_local(),
                    )
                    .await?;
                    Ok(stats)
                })
                .await
            }
            Commands::GapReport {
                targets,
                range,
                output,
            } => {
                let codes = self.targets(&targets, "gap-report").await?;
                let ctx = self.context(range.start_date.as_deref(), ContextSources::REFERENCE_ONLY);
                let (rows, missing_days) = modules::run_gap_report(
                    &ctx,
                    &codes,
                    range.start_date.as_deref(),
                    range.end_date.as_deref(),
                    &self.config.coverage.sessions,
                    &output,
                )?;
                info!(stocks = codes.len(), gaps = rows, missing_days, path = %output.display(), "누락 구간 리포트 완료");
                Ok(())
            }
            Commands::Runs { task, date, limit } => self.print_runs(task.as_deref(), date.as_deref(), limit).await,
            Commands::Daemon => self.daemon().await,
        }
    }

    async fn print_runs(&self, task: Option<&str>, date: Option<&str>, limit: i64) -> anyhow::Result<()> {
        let (Some(pool), Some(ledger)) = (self.pool, self.ledger.as_ref()) else {
            bail!("runs 명령에는 DATABASE_URL이 필요합니다");
        };
        let run_date = match date {
            Some(raw) => Some(parse_yyyymmdd(raw).with_context(|| format!("잘못된 날짜: {}", raw))?),
            None => None,
        };

        let runs = ledger.repository().list_runs(task, run_date, limit).await?;
        println!("{:>6}  {:<14} {:<8} {:<8} {:<19}  summary", "id", "task", "trigger", "status", "run_at");
        for run in &runs {
            println!(
                "{:>6}  {:<14} {:<8} {:<8} {:<19}  {}",
                run.id,
                run.task_type,
                run.triggered_by,
                run.status,
                run.run_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                run.summary.as_deref().unwrap_or("-")
            );
        }

        let checkpoints = modules::list_checkpoints(pool).await?;
        if !checkpoints.is_empty() {
            println!();
            println!("{:<14} {:<12} {:<12} {:>8}", "workflow", "status", "last_ticker", "done");
            for cp in &checkpoints {
                println!(
                    "{:<14} {:<12} {:<12} {:>8}",
                    cp.workflow_name,
                    cp.status,
                    cp.last_ticker.as_deref().unwrap_or("-"),
                    cp.total_processed
                );
            }
        }
        Ok(())
    }

    /// 데몬 작업 하나. 데몬은 보충 수집까지 실행합니다.
    async fn daemon_task(&self, task: &str) -> anyhow::Result<()> {
        let daily = DailyArgs {
            fetch: true,
            ..DailyArgs::default()
        };
        match task {
            "check-daily" => self.check_daily(DailyKind::Stock, &daily).await,
            "check-index" => self.check_daily(DailyKind::Index, &daily).await,
            "catch-up" => {
                let all = TargetArgs {
                    scan: true,
                    ..TargetArgs::default()
                };
                self.catch_up(&all, None, &ScriptArgs::default()).await
            }
            other => {
                warn!(task = other, "알 수 없는 데몬 작업, 건너뜀");
                Ok(())
            }
        }
    }

    async fn daemon(&self) -> anyhow::Result<()> {
        let daemon = &self.config.daemon;
        info!(
            interval_minutes = daemon.interval_minutes,
            tasks = ?daemon.tasks,
            "=== 데몬 모드 시작 ==="
        );

        let mut interval = tokio::time::interval(daemon.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        'daemon: loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("종료 신호 수신, 데몬 종료 중...");
                    break;
                }
                _ = interval.tick() => {
                    info!("=== 워크플로우 실행 시작 ===");
                    for task in &daemon.tasks {
                        if let Err(e) = self.daemon_task(task).await {
                            if is_interrupted(&e) {
                                info!(task = %task, "작업 중 종료 신호 수신, 데몬 종료 중...");
                                break 'daemon;
                            }
                            error!(task = %task, error = %e, "작업 실패");
                        }
                    }
                    info!(next_in_minutes = daemon.interval_minutes, "=== 워크플로우 완료 ===");
                }
            }
        }
        Ok(())
    }
}

fn is_interrupted(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<CollectorError>(),
            Some(CollectorError::Interrupted(_))
        )
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 로깅 초기화
    let mut log_config = LogConfig::from_env();
    if let Some(level) = cli.log_level.clone() {
        log_config.level = level;
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("로깅 초기화 실패: {}", e))?;

    // 설정 로드
    let mut config = CollectorConfig::from_env()?;
    if let Some(root) = cli.data_root.clone() {
        config.data_root = root;
    }
    info!(data_root = %config.data_root.display(), "stockdata 시작");

    let needs_data = !matches!(cli.command, Commands::ExportCalendar { .. } | Commands::Runs { .. });
    if needs_data && !config.data_root.is_dir() {
        error!(data_root = %config.data_root.display(), "데이터 루트가 없습니다");
        bail!("데이터 루트가 없습니다: {}", config.data_root.display());
    }

    // DB 연결 (선택)
    let db = match &config.database_url {
        Some(url) => Some(Database::connect(&DatabaseConfig::new(url.clone())).await?),
        None => None,
    };

    let triggered_by = if matches!(cli.command, Commands::Daemon) {
        TRIGGER_DAEMON
    } else {
        TRIGGER_MANUAL
    };
    let skip_if_done_today = cli.skip_if_done_today
        || (matches!(cli.command, Commands::Daemon) && config.daemon.skip_if_done_today);

    let runner = Runner::new(&config, db.as_ref().map(|db| db.pool()), triggered_by, skip_if_done_today);
    let result = runner.run(cli.command).await;

    if let Some(db) = &db {
        db.close().await;
    }
    info!("stockdata 종료");
    result
}
