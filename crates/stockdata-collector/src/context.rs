//! 점검 작업 공통 컨텍스트.
//!
//! 파티션 경로, 봉 시각 조회기, 월별 첫 거래일 캘린더, 상장일, 데이터 종료일을
//! 한 번 만들어 모든 점검 모듈이 공유합니다.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use stockdata_core::{data_end, expected_months, MonthlyCalendar, StockCode, YearMonth};
use stockdata_store::metadata::load_list_dates;
use stockdata_store::{reference_calendar, BarProbe, PartitionLayout};
use tracing::{debug, info};

/// 작업마다 컨텍스트에 얹을 부가 자료
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextSources {
    /// 기준 종목의 실제 첫 거래일로 캘린더 보정
    pub reference_calendar: bool,
    /// metadata/stock_basic.csv 상장일
    pub list_dates: bool,
}

impl ContextSources {
    /// 기준 캘린더만, 상장일 없음
    pub const REFERENCE_ONLY: Self = Self {
        reference_calendar: true,
        list_dates: false,
    };
}

/// 점검 컨텍스트
#[derive(Clone)]
pub struct CheckContext {
    pub layout: PartitionLayout,
    pub probe: Arc<dyn BarProbe>,
    pub calendar: MonthlyCalendar,
    pub list_dates: HashMap<StockCode, NaiveDate>,
    pub default_start: NaiveDate,
    /// 어제 (오늘 데이터는 아직 생성 전)
    pub data_end: NaiveDate,
}

impl CheckContext {
    /// 근사 캘린더 `[default_start, today]`로 시작합니다.
    pub fn new(
        layout: PartitionLayout,
        probe: Arc<dyn BarProbe>,
        default_start: NaiveDate,
        today: NaiveDate,
    ) -> Self {
        Self {
            layout,
            probe,
            calendar: MonthlyCalendar::approximate(default_start, today),
            list_dates: HashMap::new(),
            default_start,
            data_end: data_end(today),
        }
    }

    /// 기본 시작일보다 이른 구간을 점검할 때 근사 캘린더를 앞으로 늘립니다.
    /// 이미 있는 달은 그대로 둡니다.
    pub fn extend_calendar_from(mut self, start: NaiveDate) -> Self {
        if start >= self.default_start {
            return self;
        }
        let mut extended = MonthlyCalendar::approximate(start, self.default_start);
        extended.overlay(self.calendar.iter());
        debug!(from = %start, months = extended.len(), "캘린더 확장");
        self.calendar = extended;
        self
    }

    /// 기준 종목의 실제 첫 거래일로 근사값을 덮어씁니다.
    pub fn with_reference_calendar(mut self, reference: &StockCode, csv_root: Option<&Path>) -> Self {
        let days = reference_calendar(&self.layout, self.probe.as_ref(), reference, csv_root);
        if days.is_empty() {
            info!(stock = %reference, "기준 캘린더 없음, 평일 근사 사용");
        }
        self.calendar.overlay(days);
        self
    }

    /// `sources`에 따라 기준 캘린더와 상장일을 얹습니다.
    /// stock_basic.csv가 없으면 상장일 없이 진행합니다.
    pub fn with_sources(
        self,
        sources: ContextSources,
        reference: &StockCode,
        csv_root: Option<&Path>,
    ) -> Self {
        let mut ctx = self;
        if sources.reference_calendar {
            ctx = ctx.with_reference_calendar(reference, csv_root);
        }
        if sources.list_dates {
            let list_dates = load_list_dates(&ctx.layout.stock_basic_csv());
            ctx = ctx.with_list_dates(list_dates);
        }
        ctx
    }

    pub fn with_list_dates(mut self, list_dates: HashMap<StockCode, NaiveDate>) -> Self {
        self.list_dates = list_dates;
        self
    }

    pub fn list_date(&self, code: &StockCode) -> Option<NaiveDate> {
        self.list_dates.get(code).copied()
    }

    /// 종목의 기대 월 목록.
    pub fn expected_months(
        &self,
        code: &StockCode,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Vec<YearMonth> {
        expected_months(start, end, self.list_date(code), self.default_start, self.data_end)
    }

    /// 그 달 데이터가 시작해야 하는 날짜.
    pub fn effective_first(&self, code: &StockCode, month: YearMonth) -> Option<NaiveDate> {
        self.calendar.effective_first(month, self.list_date(code))
    }

    /// 가장 최근 파티션부터 읽어 처음으로 얻은 마지막 봉 날짜.
    ///
    /// 읽기 실패나 빈 파티션은 건너뜁니다. 파티션이 하나도 없으면 `None`.
    pub fn last_local_date(&self, code: &StockCode) -> stockdata_store::Result<Option<NaiveDate>> {
        let files = self.layout.list_month_files(code)?;
        for file in files.iter().rev() {
            match self.probe.last_bar(&file.path) {
                Ok(Some(last)) => return Ok(Some(last.date())),
                Ok(None) => {
                    debug!(stock = %code, month = %file.month, "빈 파티션, 이전 달 확인");
                }
                Err(e) => {
                    debug!(stock = %code, month = %file.month, error = %e, "파티션 읽기 실패, 이전 달 확인");
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 파일 내용 대신 경로별 봉 시각을 돌려주는 조회기.

    use chrono::NaiveDateTime;
    use std::collections::HashMap;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use stockdata_core::{StockCode, YearMonth};
    use stockdata_store::{BarProbe, BarTimes, DataError, PartitionLayout};

    #[derive(Default)]
    pub struct MapProbe {
        entries: Mutex<HashMap<PathBuf, Option<BarTimes>>>,
    }

    impl MapProbe {
        /// 빈 파티션 파일을 만들고 봉 시각을 등록합니다.
        pub fn add(&self, layout: &PartitionLayout, code: &StockCode, month: YearMonth, times: &[&str]) {
            let times = times
                .iter()
                .map(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap())
                .collect();
            self.insert(layout, code, month, Some(BarTimes::Times(times)));
        }

        pub fn add_no_time_column(&self, layout: &PartitionLayout, code: &StockCode, month: YearMonth) {
            self.insert(layout, code, month, Some(BarTimes::NoTimeColumn));
        }

        /// 읽기 실패하는 파티션
        pub fn add_broken(&self, layout: &PartitionLayout, code: &StockCode, month: YearMonth) {
            self.insert(layout, code, month, None);
        }

        pub fn add_file(&self, path: &Path, times: Option<BarTimes>) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
            self.entries.lock().unwrap().insert(path.to_path_buf(), times);
        }

        fn insert(&self, layout: &PartitionLayout, code: &StockCode, month: YearMonth, times: Option<BarTimes>) {
            self.add_file(&layout.month_file(code, month), times);
        }
    }

    impl BarProbe for MapProbe {
        fn bar_times(&self, path: &Path) -> stockdata_store::Result<BarTimes> {
            match self.entries.lock().unwrap().get(path) {
                Some(Some(times)) => Ok(times.clone()),
                Some(None) => Err(DataError::ParquetError(format!("broken: {}", path.display()))),
                None => Err(DataError::NotFound(path.display().to_string())),
            }
        }
    }
}
