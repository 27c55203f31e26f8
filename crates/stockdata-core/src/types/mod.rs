//! 파티션 점검 전반에서 사용되는 공통 타입.

mod date_range;
mod freq;
mod stock_code;
mod trade_date;
mod year_month;

pub use date_range::*;
pub use freq::*;
pub use stock_code::*;
pub use trade_date::*;
pub use year_month::*;
