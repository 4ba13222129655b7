use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// レポートAPIが返すタイムエントリー。
///
/// タイムスタンプは文字列のまま保持し、利用時にパースする。
/// 1件の不正なタイムスタンプでページ全体のデシリアライズが失敗しないようにするため。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    #[serde(alias = "_id", default)]
    pub id: String,
    pub user_id: Option<String>,
    pub project_id: Option<String>,
    pub task_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub time_interval: TimeInterval,
    /// 秒単位の経過時間。
    pub duration: Option<i64>,
    #[serde(default)]
    pub billable: bool,
}

/// タイムエントリーの開始、終了日時。終了日時がない場合は計測中。
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl TimeEntry {
    /// 計測中のタイムエントリーかどうか。
    pub fn is_running(&self) -> bool {
        self.time_interval.start.is_some() && self.time_interval.end.is_none()
    }
}

/// タイムエントリーを作成するためのリクエストボディ。
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeEntry {
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub billable: bool,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{NewTimeEntry, TimeEntry};

    #[test]
    fn test_deserialize_report_entry() {
        let entry: TimeEntry = serde_json::from_value(json!({
            "_id": "e1",
            "userId": "u1",
            "projectId": "p1",
            "taskId": null,
            "duration": 1800,
            "timeInterval": {"start": "2024-03-18T09:00:00Z", "end": null},
            "billable": true,
            "tags": []
        }))
        .unwrap();

        assert_eq!(entry.id, "e1");
        assert_eq!(entry.user_id.as_deref(), Some("u1"));
        assert_eq!(entry.task_id, None);
        assert_eq!(entry.duration, Some(1800));
        assert!(entry.billable);
        assert!(entry.is_running());
    }

    /// 省略可能なフィールドがなくてもデシリアライズできることを確認する。
    #[test]
    fn test_deserialize_minimal_entry() {
        let entry: TimeEntry = serde_json::from_value(json!({"id": "e2"})).unwrap();

        assert_eq!(entry.id, "e2");
        assert_eq!(entry.user_id, None);
        assert_eq!(entry.time_interval.start, None);
        assert!(!entry.billable);
        assert!(!entry.is_running());
    }

    #[test]
    fn test_serialize_new_time_entry() {
        let entry = NewTimeEntry {
            start: Utc.with_ymd_and_hms(2024, 3, 18, 9, 0, 0).unwrap(),
            end: None,
            description: "review".to_string(),
            project_id: Some("p1".to_string()),
            task_id: None,
            billable: false,
        };

        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "start": "2024-03-18T09:00:00Z",
                "description": "review",
                "projectId": "p1",
                "billable": false
            })
        );
    }
}
