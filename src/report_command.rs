use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use crate::{
    calendar::{self, ReportPeriod},
    clockify::{ClockifyClient, WorkspaceContext},
    compliance::CompliancePolicy,
    config,
    labels::DirectoryLabels,
    models::{Task, User},
    report::{Completion, Report, ReportAggregator, ReportQuery},
};

/// 相対的なレポート期間。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKind {
    LastWeek,
    ThisWeek,
    LastMonth,
    ThisMonth,
}

/// 年と月。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

/// 年とISO週番号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

/// `report`サブコマンドの引数を表す構造体。
#[derive(Debug, clap::Args)]
pub struct ReportArgs {
    #[clap(
        long = "period",
        default_value = "last-week",
        help = "Relative period: last-week, this-week, last-month or this-month",
        parse(try_from_str = parse_period_kind),
    )]
    pub period: PeriodKind,

    #[clap(
        short = 'm',
        long = "month",
        help = "Sets a custom month in the format YYYY-MM",
        conflicts_with = "week",
        parse(try_from_str = parse_month),
    )]
    pub month: Option<YearMonth>,

    #[clap(
        short = 'w',
        long = "week",
        help = "Sets a custom ISO week in the format YYYY-Www",
        parse(try_from_str = parse_week),
    )]
    pub week: Option<IsoWeek>,

    #[clap(short = 'p', long = "project", help = "Filter by project ID (repeatable)")]
    pub projects: Vec<String>,

    #[clap(short = 'u', long = "user", help = "Filter by user ID (repeatable)")]
    pub users: Vec<String>,

    #[clap(long = "page-size", default_value = "1000", help = "Entries requested per page")]
    pub page_size: u32,

    #[clap(
        long = "minimums",
        help = "Path to the minimum weekly hours configuration",
        parse(from_os_str)
    )]
    pub minimums: Option<PathBuf>,
}

impl ReportArgs {
    /// 引数からレポートの対象期間を決める。
    ///
    /// 月、週の指定を相対的な期間の指定より優先する。
    pub fn report_period(&self) -> Result<ReportPeriod> {
        let period = match (self.month, self.week) {
            (Some(month), _) => calendar::month_range(month.year, month.month)?,
            (None, Some(week)) => calendar::week_range(week.year, week.week)?,
            (None, None) => match self.period {
                PeriodKind::LastWeek => calendar::last_week_range()?,
                PeriodKind::ThisWeek => calendar::this_week_range()?,
                PeriodKind::LastMonth => calendar::last_month_range()?,
                PeriodKind::ThisMonth => calendar::this_month_range()?,
            },
        };
        Ok(period)
    }
}

/// `report`サブコマンドの処理を行う。
pub struct ReportCommand<'a> {
    client: &'a ClockifyClient,
    context: &'a WorkspaceContext,
}

impl<'a> ReportCommand<'a> {
    /// 新しい`ReportCommand`を返す。
    ///
    /// # Arguments
    /// * `client` - Clockify APIと通信するためのクライアント
    /// * `context` - 操作対象のワークスペース
    pub fn new(client: &'a ClockifyClient, context: &'a WorkspaceContext) -> Self {
        Self { client, context }
    }

    /// 指定された期間のタイムエントリーを全件取得し、ユーザーごとに集計する。
    ///
    /// 期間が指定されていない場合は先週とする。
    pub async fn run(&self, args: ReportArgs) -> Result<Report> {
        let period = args.report_period().context("Failed to resolve report period")?;
        info!("Start at: {}, End at: {}", period.start(), period.end());

        let policy = config::load_policy(args.minimums.as_deref());
        let users = match self.client.users(self.context).await {
            Ok(users) => users,
            Err(err) => {
                warn!("Failed to retrieve workspace users, falling back to IDs: {}", err);
                Vec::new()
            }
        };
        let tasks = self.project_tasks(&args.projects).await;
        let labels = labels_for(&policy, &users).with_tasks(&tasks);

        let query = ReportQuery::new(period)
            .with_projects(args.projects)
            .with_users(args.users);
        let reports = self.client.reports(self.context);
        let report = ReportAggregator::new(&reports, args.page_size)
            .generate(&query, &policy, &labels)
            .await
            .context("Failed to generate report")?;

        if report.completion != Completion::Complete {
            warn!("Report is incomplete: {:?}", report.completion);
        }
        info!(
            "Report generated: {} entries, {} users, {:.2} hours",
            report.entries,
            report.users.len(),
            report.total_hours()
        );

        Ok(report)
    }

    /// 指定されたプロジェクトのタスクを取得する。取得できなかったプロジェクトは飛ばす。
    async fn project_tasks(&self, project_ids: &[String]) -> Vec<Task> {
        let mut tasks = Vec::new();
        for project_id in project_ids {
            match self.client.tasks(self.context, project_id).await {
                Ok(project_tasks) => tasks.extend(project_tasks),
                Err(err) => warn!(
                    "Failed to retrieve tasks of project {}, falling back to IDs: {}",
                    project_id, err
                ),
            }
        }
        tasks
    }
}

/// 設定ファイルの名前をワークスペースのユーザー名で上書きした`DirectoryLabels`を作る。
fn labels_for(policy: &CompliancePolicy, users: &[User]) -> DirectoryLabels {
    let mut labels = DirectoryLabels::new();
    policy.iter().for_each(|(user_id, minimum)| {
        if let Some(name) = &minimum.name {
            labels.insert_user(user_id.clone(), name.clone());
        }
    });
    labels.with_users(users)
}

/// 期間の種類をパースする。
fn parse_period_kind(s: &str) -> Result<PeriodKind> {
    match s {
        "last-week" => Ok(PeriodKind::LastWeek),
        "this-week" => Ok(PeriodKind::ThisWeek),
        "last-month" => Ok(PeriodKind::LastMonth),
        "this-month" => Ok(PeriodKind::ThisMonth),
        _ => bail!("Unknown period: {}", s),
    }
}

/// 月をパースする。
fn parse_month(s: &str) -> Result<YearMonth> {
    let (year, month) = s
        .split_once('-')
        .with_context(|| format!("Failed to parse month: {}", s))?;
    let year = year
        .parse::<i32>()
        .with_context(|| format!("Failed to parse year: {}", s))?;
    let month = month
        .parse::<u32>()
        .with_context(|| format!("Failed to parse month: {}", s))?;
    if !(1..=12).contains(&month) {
        bail!("Month must be between 1 and 12: {}", s);
    }

    Ok(YearMonth { year, month })
}

/// ISO週をパースする。
fn parse_week(s: &str) -> Result<IsoWeek> {
    let (year, week) = s
        .split_once("-W")
        .with_context(|| format!("Failed to parse week: {}", s))?;
    let year = year
        .parse::<i32>()
        .with_context(|| format!("Failed to parse year: {}", s))?;
    let week = week
        .parse::<u32>()
        .with_context(|| format!("Failed to parse week number: {}", s))?;
    if !(1..=53).contains(&week) {
        bail!("Week must be between 1 and 53: {}", s);
    }

    Ok(IsoWeek { year, week })
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use chrono::{SecondsFormat, TimeZone, Utc};
    use mockito::{Matcher, Server};
    use rstest::rstest;
    use serde_json::json;
    use tempfile::TempDir;

    use super::{
        parse_month, parse_period_kind, parse_week, IsoWeek, PeriodKind, ReportArgs,
        ReportCommand, YearMonth,
    };
    use crate::clockify::{ClockifyClient, WorkspaceContext};
    use crate::datetime::mock_datetime;
    use crate::transport::{Transport, TransportConfig};

    fn args() -> ReportArgs {
        ReportArgs {
            period: PeriodKind::LastWeek,
            month: None,
            week: None,
            projects: vec![],
            users: vec![],
            page_size: 1000,
            minimums: None,
        }
    }

    #[rstest]
    #[case("last-week", PeriodKind::LastWeek)]
    #[case("this-week", PeriodKind::ThisWeek)]
    #[case("last-month", PeriodKind::LastMonth)]
    #[case("this-month", PeriodKind::ThisMonth)]
    fn test_parse_period_kind(#[case] input: &str, #[case] expected: PeriodKind) {
        assert_eq!(parse_period_kind(input).unwrap(), expected);
    }

    #[rstest]
    #[case::valid("2024-03", Some(YearMonth { year: 2024, month: 3 }))]
    #[case::no_padding("2024-3", Some(YearMonth { year: 2024, month: 3 }))]
    #[case::month_out_of_range("2024-13", None)]
    #[case::no_separator("202403", None)]
    #[case::not_a_number("2024-xx", None)]
    fn test_parse_month(#[case] input: &str, #[case] expected: Option<YearMonth>) {
        assert_eq!(parse_month(input).ok(), expected);
    }

    #[rstest]
    #[case::valid("2024-W12", Some(IsoWeek { year: 2024, week: 12 }))]
    #[case::week_out_of_range("2024-W54", None)]
    #[case::no_separator("2024-12", None)]
    fn test_parse_week(#[case] input: &str, #[case] expected: Option<IsoWeek>) {
        assert_eq!(parse_week(input).ok(), expected);
    }

    /// 期間が指定されていない場合は先週になることを確認する。
    #[rstest]
    #[case::default(None, None, "2024-03-11T00:00:00Z")]
    #[case::month(Some(YearMonth { year: 2024, month: 1 }), None, "2024-01-01T00:00:00Z")]
    #[case::week(None, Some(IsoWeek { year: 2024, week: 12 }), "2024-03-18T00:00:00Z")]
    fn test_report_period(
        #[case] month: Option<YearMonth>,
        #[case] week: Option<IsoWeek>,
        #[case] expected_start: &str,
    ) {
        mock_datetime::set_mock_time(Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap());
        let args = ReportArgs {
            month,
            week,
            ..args()
        };

        let period = args.report_period().unwrap();
        mock_datetime::clear_mock_time();

        assert_eq!(
            period.start().to_rfc3339_opts(SecondsFormat::Secs, true),
            expected_start
        );
    }

    #[tokio::test]
    async fn test_report_command() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/api/v1/workspaces/w1/users")
            .with_status(403)
            .create_async()
            .await;
        let tasks = server
            .mock("GET", "/api/v1/workspaces/w1/projects/p1/tasks")
            .with_body(r#"[{"id":"t1","name":"Write docs","projectId":"p1"}]"#)
            .expect(1)
            .create_async()
            .await;
        let reports = server
            .mock("POST", "/reports/v1/workspaces/w1/reports/detailed")
            .match_body(Matcher::PartialJson(json!({
                "dateRangeStart": "2024-03-18T00:00:00.000Z",
                "projects": {"ids": ["p1"]}
            })))
            .with_body(
                json!([
                    {
                        "_id": "e1",
                        "userId": "u1",
                        "timeInterval": {
                            "start": "2024-03-18T09:00:00Z",
                            "end": "2024-03-18T11:00:00Z"
                        }
                    },
                    {"_id": "e2", "userId": "u1", "projectId": "p1", "taskId": "t1", "duration": 1800},
                    {"_id": "e3", "userId": "u1", "projectId": "p1", "taskId": "t9", "duration": 0}
                ])
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let minimums = dir.path().join("minimums.json");
        fs::write(
            &minimums,
            r#"{"u1": {"name": "John Doe", "minimum_weekly_hours": 2}}"#,
        )
        .unwrap();

        let mut config = TransportConfig::new("secret");
        config.api_url = format!("{}/api/v1", server.url());
        config.reports_url = format!("{}/reports/v1", server.url());
        config.retry_backoff = Duration::ZERO;
        let client = ClockifyClient::new(Transport::new(config).unwrap());
        let context = WorkspaceContext {
            workspace_id: "w1".to_string(),
            user_id: "u1".to_string(),
        };
        let args = ReportArgs {
            week: Some(IsoWeek { year: 2024, week: 12 }),
            projects: vec!["p1".to_string()],
            minimums: Some(minimums),
            ..args()
        };

        let report = ReportCommand::new(&client, &context).run(args).await.unwrap();

        reports.assert_async().await;
        tasks.assert_async().await;
        assert_eq!(report.users.len(), 1);
        assert_eq!(report.users[0].user_name, "John Doe");
        assert_eq!(report.users[0].bucket.total_seconds, 9000);
        assert!(report.users[0].compliance.compliant);
        let task_names = &report.users[0].task_names;
        assert_eq!(task_names.get("t1").map(String::as_str), Some("Write docs"));
        assert_eq!(task_names.get("t9").map(String::as_str), Some("Task t9"));
        assert_eq!(report.project_totals.get("p1"), Some(&1800));
    }
}
