//! 로컬 시장 데이터 저장소 접근.
//!
//! 이 crate는 다음을 제공합니다:
//! - Hive 형식 파티션 경로 (`stock_code=…/year=…/…_YYYY-MM.parquet`)
//! - Parquet 파티션의 봉 시각 조회 (polars)
//! - metadata/ 아래 CSV·목록 파일 입출력
//! - 기준 종목 데이터에서 월별 첫 거래일 추출
//! - SQLite 실행 기록 / 커버리지 / 체크포인트 테이블

pub mod error;
pub mod layout;
pub mod metadata;
pub mod parquet;
pub mod reference;
pub mod storage;

pub use error::{DataError, Result};
pub use layout::{parse_month_from_file_name, MonthFile, PartitionLayout};
pub use parquet::{BarProbe, BarTimes, ParquetBarReader, TIME_COLUMNS};
pub use reference::reference_calendar;

pub use storage::coverage::{CoverageRecord, CoverageRepository};
pub use storage::database::{Database, DatabaseConfig};
pub use storage::fetch_run::{FetchRunRecord, FetchRunRepository, RunStatus};
