use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{calendar::week_start, duration, time_entry::TimeEntry};

/// ユーザーごとの集計結果。
///
/// `projects`の合計と`unassigned_seconds`の和、`tasks`の合計と`untasked_seconds`の和、
/// `daily`の合計と`undated_seconds`の和、`weekly`の合計と`undated_seconds`の和は、
/// いずれも`total_seconds`に等しい。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserBucket {
    pub total_seconds: u64,
    pub billable_seconds: u64,
    /// プロジェクトIDごとの秒数。
    pub projects: BTreeMap<String, u64>,
    pub unassigned_seconds: u64,
    /// タスクIDごとの秒数。
    pub tasks: BTreeMap<String, u64>,
    pub untasked_seconds: u64,
    /// 曜日名(`Monday`など)ごとの秒数。
    pub daily: BTreeMap<String, u64>,
    /// 曜日名ごと、かつタスクIDごとの秒数。
    pub daily_tasks: BTreeMap<String, BTreeMap<String, u64>>,
    /// 週の開始日(月曜日)ごとの秒数。
    pub weekly: BTreeMap<NaiveDate, u64>,
    /// 開始日時が読めず、日毎、週毎に振り分けられなかった秒数。
    pub undated_seconds: u64,
}

impl UserBucket {
    pub fn total_hours(&self) -> f64 {
        self.total_seconds as f64 / 3600.0
    }

    pub fn billable_hours(&self) -> f64 {
        self.billable_seconds as f64 / 3600.0
    }

    fn add(&mut self, entry: &TimeEntry, seconds: u64) {
        self.total_seconds += seconds;
        if entry.billable {
            self.billable_seconds += seconds;
        }

        match &entry.project_id {
            Some(project_id) => *self.projects.entry(project_id.clone()).or_insert(0) += seconds,
            None => self.unassigned_seconds += seconds,
        }
        match &entry.task_id {
            Some(task_id) => *self.tasks.entry(task_id.clone()).or_insert(0) += seconds,
            None => self.untasked_seconds += seconds,
        }

        let start = entry
            .time_interval
            .start
            .as_deref()
            .and_then(duration::parse_timestamp);
        match start {
            Some(start) => {
                // 日時が持つオフセットでの日付、曜日とする
                let date = start.date_naive();
                let day = date.format("%A").to_string();
                *self.weekly.entry(week_start(date)).or_insert(0) += seconds;
                if let Some(task_id) = &entry.task_id {
                    *self
                        .daily_tasks
                        .entry(day.clone())
                        .or_default()
                        .entry(task_id.clone())
                        .or_insert(0) += seconds;
                }
                *self.daily.entry(day).or_insert(0) += seconds;
            }
            None => self.undated_seconds += seconds,
        }
    }
}

/// タイムエントリーをユーザーごとに集計する。
///
/// ユーザーIDがないエントリーは集計対象外とする。重複したエントリーの除外は行わない。
pub fn group(entries: &[TimeEntry]) -> BTreeMap<String, UserBucket> {
    entries
        .iter()
        .fold(BTreeMap::new(), |mut accumulate, entry| {
            let Some(user_id) = &entry.user_id else {
                return accumulate;
            };

            let seconds = duration::resolve(entry);
            accumulate
                .entry(user_id.clone())
                .or_insert_with(UserBucket::default)
                .add(entry, seconds);
            accumulate
        })
}

/// 全ユーザーのプロジェクトごとの秒数を合算する。
///
/// プロジェクトのないエントリーは含まない。
pub fn project_totals<'a>(
    buckets: impl IntoIterator<Item = &'a UserBucket>,
) -> BTreeMap<String, u64> {
    buckets
        .into_iter()
        .flat_map(|bucket| bucket.projects.iter())
        .fold(BTreeMap::new(), |mut accumulate, (project_id, seconds)| {
            *accumulate.entry(project_id.clone()).or_insert(0) += seconds;
            accumulate
        })
}
