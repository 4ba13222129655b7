use std::collections::{BTreeMap, HashSet};

use log::{info, warn};
use serde::Serialize;

use crate::{
    calendar::ReportPeriod,
    compliance::{self, Compliance, CompliancePolicy},
    error::{ClockifyError, Result},
    grouping::{self, UserBucket},
    labels::LabelResolver,
    time_entry::TimeEntry,
};

/// レポートAPIが1ページで返す件数の上限として観測されている値。
pub const OBSERVED_PAGE_SIZE_CAP: u32 = 1000;

/// レポートの取得条件。
#[derive(Debug, Clone, PartialEq)]
pub struct ReportQuery {
    pub period: ReportPeriod,
    pub project_ids: Vec<String>,
    pub user_ids: Vec<String>,
}

impl ReportQuery {
    pub fn new(period: ReportPeriod) -> Self {
        Self {
            period,
            project_ids: Vec::new(),
            user_ids: Vec::new(),
        }
    }

    pub fn with_projects(mut self, project_ids: Vec<String>) -> Self {
        self.project_ids = project_ids;
        self
    }

    pub fn with_users(mut self, user_ids: Vec<String>) -> Self {
        self.user_ids = user_ids;
        self
    }
}

/// 1ページ分のタイムエントリーを返すレポートAPI。
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait ReportSource {
    /// 指定されたページのタイムエントリーを取得する。`page`は1始まり。
    async fn fetch_page(
        &self,
        query: &ReportQuery,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TimeEntry>>;
}

/// レポートAPIの1回のレスポンス。
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: u32,
    pub page_size: u32,
    pub entries: Vec<TimeEntry>,
}

impl Page {
    /// 最後のページかどうか。
    ///
    /// APIは続きの有無を返さないため、件数が`page_size`未満なら最後とみなす。
    /// 最後のページがちょうど`page_size`件の場合は、次の空のページで終了を判定する。
    pub fn is_last(&self) -> bool {
        self.entries.is_empty() || self.entries.len() < self.page_size as usize
    }
}

/// ページ取得が最後まで完了したかどうか。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completion {
    Complete,
    /// 途中のページでエラーが発生し、それまでのエントリーのみを返した。
    Truncated { failed_page: u32, reason: String },
}

/// 全ページ分のタイムエントリー。
///
/// ページの境界で同じエントリーが重複して返されることがあり、IDの重複を許容する。
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedDataset {
    pub entries: Vec<TimeEntry>,
    /// ページごとのエントリー数。合計は`entries`の件数と等しい。
    pub page_counts: Vec<usize>,
    pub completion: Completion,
}

impl AggregatedDataset {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }

    /// IDが重複するエントリーを除外する。最初に現れたエントリーを残す。
    ///
    /// IDが空のエントリーは除外しない。除外した件数を返す。
    pub fn deduplicate(&mut self) -> usize {
        let before = self.entries.len();
        let mut seen = HashSet::new();
        self.entries
            .retain(|entry| entry.id.is_empty() || seen.insert(entry.id.clone()));
        before - self.entries.len()
    }
}

/// ユーザー1人分のレポート。
#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub user_id: String,
    pub user_name: String,
    pub total_hours: f64,
    pub billable_hours: f64,
    pub compliance: Compliance,
    /// `bucket`に現れるタスクIDと表示名の対応。
    pub task_names: BTreeMap<String, String>,
    pub bucket: UserBucket,
}

/// 期間内のユーザーごとの集計結果。
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub period: ReportPeriod,
    pub completion: Completion,
    pub pages: usize,
    pub entries: usize,
    pub duplicates_removed: usize,
    /// 全ユーザー分のプロジェクトIDごとの秒数。
    pub project_totals: BTreeMap<String, u64>,
    pub users: Vec<UserReport>,
}

impl Report {
    pub fn total_hours(&self) -> f64 {
        self.users.iter().map(|user| user.total_hours).sum()
    }

    /// 最低作業時間を満たしていないユーザー。
    pub fn flagged_users(&self) -> impl Iterator<Item = &UserReport> {
        self.users.iter().filter(|user| user.compliance.flagged)
    }
}

/// レポートAPIから全ページを取得し、集計するためのもの。
///
/// ページは1件ずつ順番に取得する。
pub struct ReportAggregator<'a, S: ReportSource> {
    source: &'a S,
    page_size: u32,
}

impl<'a, S: ReportSource> ReportAggregator<'a, S> {
    /// 新しい`ReportAggregator`を返す。
    ///
    /// # Arguments
    ///
    /// * `source` - タイムエントリーを取得するレポートAPI
    /// * `page_size` - 1ページで取得する件数
    pub fn new(source: &'a S, page_size: u32) -> Self {
        Self { source, page_size }
    }

    /// 条件に一致するタイムエントリーを全ページ分取得する。
    ///
    /// 1ページ目のエラーはそのまま返す。2ページ目以降でエラーが発生した場合は、
    /// それまでに取得したエントリーを`Completion::Truncated`として返す。
    pub async fn fetch_all(&self, query: &ReportQuery) -> Result<AggregatedDataset> {
        if self.page_size == 0 {
            return Err(ClockifyError::InvalidArgument(
                "page size must be greater than zero".to_string(),
            ));
        }
        if self.page_size > OBSERVED_PAGE_SIZE_CAP {
            warn!(
                "Page size {} exceeds the observed upstream cap of {}; pagination relies on short pages",
                self.page_size, OBSERVED_PAGE_SIZE_CAP
            );
        }

        let mut entries = Vec::new();
        let mut page_counts = Vec::new();
        let mut index = 1;
        let completion = loop {
            let page = match self.source.fetch_page(query, index, self.page_size).await {
                Ok(page_entries) => Page {
                    index,
                    page_size: self.page_size,
                    entries: page_entries,
                },
                Err(err) if index == 1 => return Err(err),
                Err(err) => {
                    warn!(
                        "Failed to fetch report page {}, returning {} entries from earlier pages: {}",
                        index,
                        entries.len(),
                        err
                    );
                    break Completion::Truncated {
                        failed_page: index,
                        reason: err.to_string(),
                    };
                }
            };

            info!("Fetched report page {} with {} entries", index, page.entries.len());
            let is_last = page.is_last();
            page_counts.push(page.entries.len());
            entries.extend(page.entries);
            if is_last {
                break Completion::Complete;
            }
            index += 1;
        };

        Ok(AggregatedDataset {
            entries,
            page_counts,
            completion,
        })
    }

    /// 全ページを取得して、ユーザーごとの集計と最低作業時間の判定を行う。
    ///
    /// # Arguments
    ///
    /// * `query` - レポートの取得条件
    /// * `policy` - 最低作業時間の設定
    /// * `labels` - ユーザー名、タスク名を解決するためのもの
    pub async fn generate(
        &self,
        query: &ReportQuery,
        policy: &CompliancePolicy,
        labels: &impl LabelResolver,
    ) -> Result<Report> {
        let mut dataset = self.fetch_all(query).await?;
        let duplicates_removed = dataset.deduplicate();
        if duplicates_removed > 0 {
            info!("Removed {} duplicated entries", duplicates_removed);
        }

        let buckets = grouping::group(&dataset.entries);
        let project_totals = grouping::project_totals(buckets.values());
        let users = buckets
            .into_iter()
            .map(|(user_id, bucket)| {
                let total_hours = bucket.total_hours();
                let task_names = bucket
                    .tasks
                    .keys()
                    .map(|task_id| (task_id.clone(), labels.task_name(task_id)))
                    .collect();
                UserReport {
                    user_name: labels.user_name(&user_id),
                    compliance: compliance::evaluate(&user_id, total_hours, &query.period, policy),
                    task_names,
                    total_hours,
                    billable_hours: bucket.billable_hours(),
                    user_id,
                    bucket,
                }
            })
            .collect();

        Ok(Report {
            period: query.period,
            pages: dataset.page_counts.len(),
            entries: dataset.entries.len(),
            completion: dataset.completion,
            duplicates_removed,
            project_totals,
            users,
        })
    }
}
