use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::Serialize;

use crate::datetime::{end_of_day, now, start_of_day};
use crate::error::{ClockifyError, Result};

/// レポートの対象期間。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl ReportPeriod {
    /// 新しい`ReportPeriod`を返す。`end`が`start`より前の場合はエラーを返す。
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(ClockifyError::InvalidArgument(format!(
                "period end {} is before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// 期間の日数。端数の日も含む。
    pub fn total_days(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / Duration::days(1).num_milliseconds() as f64
    }

    /// 期間の週数。端数の週も含む。
    pub fn weeks(&self) -> f64 {
        self.total_days() / 7.0
    }
}

/// 指定された日付を含む週の月曜日を返す。
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// 指定された月の初日の00:00:00から末日の23:59:59.999999までを返す。
pub fn month_range(year: i32, month: u32) -> Result<ReportPeriod> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
        ClockifyError::InvalidArgument(format!("invalid month: {}-{:02}", year, month))
    })?;
    let last = last_day_of_month(first)?;
    ReportPeriod::new(start_of_day(first), end_of_day(last))
}

/// 指定されたISO週の月曜日から日曜日までを返す。
pub fn week_range(year: i32, week: u32) -> Result<ReportPeriod> {
    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(|| {
        ClockifyError::InvalidArgument(format!("invalid ISO week: {}-W{:02}", year, week))
    })?;
    ReportPeriod::new(start_of_day(monday), end_of_day(monday + Duration::days(6)))
}

/// 先週の月曜日から日曜日までを返す。
pub fn last_week_range() -> Result<ReportPeriod> {
    let monday = week_start(now().date_naive()) - Duration::days(7);
    ReportPeriod::new(start_of_day(monday), end_of_day(monday + Duration::days(6)))
}

/// 今週の月曜日から現在までを返す。
pub fn this_week_range() -> Result<ReportPeriod> {
    let current = now();
    ReportPeriod::new(start_of_day(week_start(current.date_naive())), current)
}

/// 先月の初日から末日までを返す。
pub fn last_month_range() -> Result<ReportPeriod> {
    let first_of_this_month = first_day_of_month(now().date_naive());
    let last = first_of_this_month - Duration::days(1);
    ReportPeriod::new(start_of_day(first_day_of_month(last)), end_of_day(last))
}

/// 今月の初日から現在までを返す。
pub fn this_month_range() -> Result<ReportPeriod> {
    let current = now();
    ReportPeriod::new(
        start_of_day(first_day_of_month(current.date_naive())),
        current,
    )
}

fn first_day_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.day0() as i64)
}

fn last_day_of_month(first: NaiveDate) -> Result<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|next| next - Duration::days(1))
        .ok_or_else(|| ClockifyError::InvalidArgument(format!("month out of range: {}", first)))
}
