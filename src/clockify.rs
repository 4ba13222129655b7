use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    datetime::now,
    error::{ClockifyError, Result},
    models::{Client, NewClient, NewTask, Project, Task, User, Workspace},
    report::{ReportQuery, ReportSource},
    time_entry::{NewTimeEntry, TimeEntry},
    transport::{ApiTarget, Transport},
};

/// 操作対象のワークスペースとユーザー。
///
/// 生成後は変更せず、ワークスペースを切り替える場合は新しい値を作る。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceContext {
    pub workspace_id: String,
    pub user_id: String,
}

/// Clockify APIと通信するためのクライアント。
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> clockify_report::error::Result<()> {
/// use clockify_report::{clockify::ClockifyClient, transport::{Transport, TransportConfig}};
///
/// let client = ClockifyClient::new(Transport::new(TransportConfig::new("api-key"))?);
/// let context = client.resolve_context(None).await?;
/// let projects = client.projects(&context).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClockifyClient {
    transport: Transport,
}

impl ClockifyClient {
    /// 新しい`ClockifyClient`を返す。
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    pub async fn current_user(&self) -> Result<User> {
        self.transport.get(ApiTarget::Core, "user", &[]).await
    }

    pub async fn workspaces(&self) -> Result<Vec<Workspace>> {
        self.transport.get(ApiTarget::Core, "workspaces", &[]).await
    }

    /// 現在のユーザーと操作対象のワークスペースを取得する。
    ///
    /// `workspace_id`が指定されていない場合は、最初のワークスペースを利用する。
    ///
    /// # Arguments
    ///
    /// * `workspace_id` - 操作対象のワークスペースID
    pub async fn resolve_context(&self, workspace_id: Option<String>) -> Result<WorkspaceContext> {
        let user = self.current_user().await?;
        let workspace_id = match workspace_id {
            Some(workspace_id) => workspace_id,
            None => self
                .workspaces()
                .await?
                .into_iter()
                .next()
                .map(|workspace| workspace.id)
                .ok_or_else(|| {
                    ClockifyError::InvalidArgument("no workspace available for this user".to_string())
                })?,
        };
        info!("Using workspace {} as user {}", workspace_id, user.id);

        Ok(WorkspaceContext {
            workspace_id,
            user_id: user.id,
        })
    }

    pub async fn users(&self, context: &WorkspaceContext) -> Result<Vec<User>> {
        self.transport
            .get(
                ApiTarget::Core,
                &format!("workspaces/{}/users", context.workspace_id),
                &[],
            )
            .await
    }

    pub async fn projects(&self, context: &WorkspaceContext) -> Result<Vec<Project>> {
        self.transport
            .get(
                ApiTarget::Core,
                &format!("workspaces/{}/projects", context.workspace_id),
                &[],
            )
            .await
    }

    pub async fn project(&self, context: &WorkspaceContext, project_id: &str) -> Result<Project> {
        self.transport
            .get(
                ApiTarget::Core,
                &format!("workspaces/{}/projects/{}", context.workspace_id, project_id),
                &[],
            )
            .await
    }

    pub async fn tasks(&self, context: &WorkspaceContext, project_id: &str) -> Result<Vec<Task>> {
        self.transport
            .get(
                ApiTarget::Core,
                &format!(
                    "workspaces/{}/projects/{}/tasks",
                    context.workspace_id, project_id
                ),
                &[],
            )
            .await
    }

    pub async fn create_task(
        &self,
        context: &WorkspaceContext,
        project_id: &str,
        task: &NewTask,
    ) -> Result<Task> {
        self.transport
            .post(
                ApiTarget::Core,
                &format!(
                    "workspaces/{}/projects/{}/tasks",
                    context.workspace_id, project_id
                ),
                task,
            )
            .await
    }

    pub async fn clients(&self, context: &WorkspaceContext) -> Result<Vec<Client>> {
        self.transport
            .get(
                ApiTarget::Core,
                &format!("workspaces/{}/clients", context.workspace_id),
                &[],
            )
            .await
    }

    pub async fn create_client(&self, context: &WorkspaceContext, client: &NewClient) -> Result<Client> {
        self.transport
            .post(
                ApiTarget::Core,
                &format!("workspaces/{}/clients", context.workspace_id),
                client,
            )
            .await
    }

    /// 現在のユーザーのタイムエントリーを取得する。
    pub async fn time_entries(&self, context: &WorkspaceContext) -> Result<Vec<TimeEntry>> {
        self.transport
            .get(
                ApiTarget::Core,
                &format!(
                    "workspaces/{}/user/{}/time-entries",
                    context.workspace_id, context.user_id
                ),
                &[],
            )
            .await
    }

    pub async fn add_time_entry(&self, context: &WorkspaceContext, entry: &NewTimeEntry) -> Result<TimeEntry> {
        self.transport
            .post(
                ApiTarget::Core,
                &format!("workspaces/{}/time-entries", context.workspace_id),
                entry,
            )
            .await
    }

    /// 現在時刻から計測中のタイムエントリーを開始する。
    ///
    /// # Arguments
    ///
    /// * `description` - タイムエントリーの説明
    /// * `project_id` - 紐づけるプロジェクトのID
    /// * `task_id` - 紐づけるタスクのID
    pub async fn start_timer(
        &self,
        context: &WorkspaceContext,
        description: &str,
        project_id: Option<&str>,
        task_id: Option<&str>,
    ) -> Result<TimeEntry> {
        let entry = NewTimeEntry {
            start: now(),
            end: None,
            description: description.to_string(),
            project_id: project_id.map(str::to_string),
            task_id: task_id.map(str::to_string),
            billable: false,
        };
        let started = self.add_time_entry(context, &entry).await?;
        info!("Started timer {} at {}", started.id, entry.start);
        Ok(started)
    }

    /// 現在のユーザーの計測中のタイムエントリーを現在時刻で終了する。
    ///
    /// 計測中のタイムエントリーがない場合は`ResourceNotFound`を返す。
    pub async fn stop_timer(&self, context: &WorkspaceContext) -> Result<TimeEntry> {
        let stopped: TimeEntry = self
            .transport
            .patch(
                ApiTarget::Core,
                &format!(
                    "workspaces/{}/user/{}/time-entries",
                    context.workspace_id, context.user_id
                ),
                &StopTimer { end: now() },
            )
            .await?;
        info!("Stopped timer {}", stopped.id);
        Ok(stopped)
    }

    pub async fn delete_time_entry(&self, context: &WorkspaceContext, entry_id: &str) -> Result<()> {
        self.transport
            .delete(
                ApiTarget::Core,
                &format!("workspaces/{}/time-entries/{}", context.workspace_id, entry_id),
            )
            .await
    }

    /// 指定されたワークスペースの詳細レポートAPIを返す。
    pub fn reports<'a>(&'a self, context: &'a WorkspaceContext) -> DetailedReports<'a> {
        DetailedReports {
            transport: &self.transport,
            context,
        }
    }
}

#[derive(Debug, Serialize)]
struct StopTimer {
    end: DateTime<Utc>,
}

/// 詳細レポートAPI。`ReportAggregator`からページ単位で呼び出す。
pub struct DetailedReports<'a> {
    transport: &'a Transport,
    context: &'a WorkspaceContext,
}

/// 詳細レポートAPIのリクエストボディ。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailedReportRequest<'a> {
    date_range_start: String,
    date_range_end: String,
    detailed_filter: DetailedFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    projects: Option<IdFilter<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    users: Option<IdFilter<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailedFilter {
    page: u32,
    page_size: u32,
}

#[derive(Debug, Serialize)]
struct IdFilter<'a> {
    ids: &'a [String],
    contains: &'static str,
}

impl<'a> IdFilter<'a> {
    fn from_ids(ids: &'a [String]) -> Option<Self> {
        (!ids.is_empty()).then_some(Self {
            ids,
            contains: "CONTAINS",
        })
    }
}

/// 詳細レポートAPIのレスポンス。エントリーの配列か、`timeentries`を持つオブジェクト。
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetailedReportResponse {
    Entries(Vec<TimeEntry>),
    Report {
        #[serde(default)]
        timeentries: Vec<TimeEntry>,
    },
}

impl From<DetailedReportResponse> for Vec<TimeEntry> {
    fn from(response: DetailedReportResponse) -> Self {
        match response {
            DetailedReportResponse::Entries(entries) => entries,
            DetailedReportResponse::Report { timeentries } => timeentries,
        }
    }
}

impl ReportSource for DetailedReports<'_> {
    async fn fetch_page(
        &self,
        query: &ReportQuery,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<TimeEntry>> {
        let request = DetailedReportRequest {
            date_range_start: query
                .period
                .start()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            date_range_end: query
                .period
                .end()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            detailed_filter: DetailedFilter { page, page_size },
            projects: IdFilter::from_ids(&query.project_ids),
            users: IdFilter::from_ids(&query.user_ids),
        };

        let response: DetailedReportResponse = self
            .transport
            .post(
                ApiTarget::Reports,
                &format!("workspaces/{}/reports/detailed", self.context.workspace_id),
                &request,
            )
            .await?;
        Ok(response.into())
    }
}
