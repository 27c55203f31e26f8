//! SQLite 기반 실행 기록 저장소.

pub mod coverage;
pub mod database;
pub mod fetch_run;
