use std::collections::HashMap;

use crate::models::{Task, User};

/// ユーザーIDやタスクIDを表示用の名前に変換するためのtrait。
///
/// 集計のキーには常にIDを使い、名前は表示にのみ利用する。
pub trait LabelResolver {
    fn user_name(&self, user_id: &str) -> String;
    fn task_name(&self, task_id: &str) -> String;
}

/// 取得済みのユーザー、タスク一覧から名前を引く`LabelResolver`。
///
/// 見つからない場合はIDの先頭8文字を使った名前を返す。
#[derive(Debug, Clone, Default)]
pub struct DirectoryLabels {
    users: HashMap<String, String>,
    tasks: HashMap<String, String>,
}

impl DirectoryLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<'a>(mut self, users: impl IntoIterator<Item = &'a User>) -> Self {
        self.users
            .extend(users.into_iter().map(|user| (user.id.clone(), user.name.clone())));
        self
    }

    pub fn with_tasks<'a>(mut self, tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        self.tasks
            .extend(tasks.into_iter().map(|task| (task.id.clone(), task.name.clone())));
        self
    }

    pub fn insert_user(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
        self.users.insert(user_id.into(), name.into());
    }
}

impl LabelResolver for DirectoryLabels {
    fn user_name(&self, user_id: &str) -> String {
        self.users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| format!("User {}", short_id(user_id)))
    }

    fn task_name(&self, task_id: &str) -> String {
        self.tasks
            .get(task_id)
            .cloned()
            .unwrap_or_else(|| format!("Task {}", short_id(task_id)))
    }
}

fn short_id(id: &str) -> &str {
    id.char_indices().nth(8).map_or(id, |(index, _)| &id[..index])
}
