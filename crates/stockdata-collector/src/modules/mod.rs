//! 점검·보충 작업 모듈.

pub mod backfill;
pub mod calendar_export;
pub mod catch_up;
pub mod checkpoint;
pub mod coverage_scan;
pub mod daily_check;
pub mod gap_report;
pub mod month_check;
pub mod run_ledger;
pub mod start_check;
pub mod targets;

pub use backfill::{BackfillKind, BackfillRequest, Backfiller, ScriptBackfiller};
pub use calendar_export::export_calendar;
pub use catch_up::catch_up;
pub use checkpoint::{
    clear_checkpoint, list_checkpoints, load_checkpoint, mark_interrupted, until_interrupted,
    CheckpointInfo, CheckpointStatus,
};
pub use coverage_scan::scan_coverage;
pub use daily_check::{run_daily_check, DailyCheckOptions, DailyKind};
pub use gap_report::run_gap_report;
pub use month_check::{check_months, MonthCheckOptions};
pub use run_ledger::{run_recorded, RunLedger};
pub use start_check::{check_start, StartCheckOptions};
pub use targets::{resolve_targets, skip_through};
