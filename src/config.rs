use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::{
    compliance::CompliancePolicy,
    transport::{TransportConfig, DEFAULT_API_URL, DEFAULT_REPORTS_URL},
};

pub const POLICY_FILE_NAME: &str = "developer_minimums.json";
const APP_DIR_NAME: &str = "clockify-report";

/// 環境変数から読み込む接続設定。
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub workspace_id: Option<String>,
    pub api_url: String,
    pub reports_url: String,
}

impl Settings {
    /// 環境変数から設定を読み込む。
    ///
    /// 環境変数`CLOCKIFY_API_KEY`が設定されていない場合はエラーを返す。
    /// `CLOCKIFY_WORKSPACE_ID`、`CLOCKIFY_API_URL`、`CLOCKIFY_REPORTS_URL`は任意。
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("CLOCKIFY_API_KEY").context("CLOCKIFY_API_KEY must be set")?;

        Ok(Self {
            api_key,
            workspace_id: non_empty_var("CLOCKIFY_WORKSPACE_ID"),
            api_url: non_empty_var("CLOCKIFY_API_URL")
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            reports_url: non_empty_var("CLOCKIFY_REPORTS_URL")
                .unwrap_or_else(|| DEFAULT_REPORTS_URL.to_string()),
        })
    }

    pub fn transport_config(&self) -> TransportConfig {
        let mut config = TransportConfig::new(self.api_key.clone());
        config.api_url = self.api_url.clone();
        config.reports_url = self.reports_url.clone();
        config
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// 最低作業時間の設定ファイルを探す候補のパス。
///
/// パスが指定された場合はそのパスのみ。指定がなければカレントディレクトリ、
/// ユーザーの設定ディレクトリの順に探す。
pub fn policy_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit {
        return vec![path.to_path_buf()];
    }

    let mut candidates = vec![PathBuf::from(POLICY_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR_NAME).join(POLICY_FILE_NAME));
    }
    candidates
}

/// 最低作業時間の設定を読み込む。
///
/// 設定ファイルが見つからない場合や読み込めない場合は空の設定を返す。
/// その場合、全てのユーザーが最低作業時間を満たしているとみなされる。
pub fn load_policy(explicit: Option<&Path>) -> CompliancePolicy {
    if let Some(path) = explicit {
        return match read_policy(path) {
            Ok(policy) => {
                info!(
                    "Loaded minimum hours for {} users from {}",
                    policy.len(),
                    path.display()
                );
                policy
            }
            Err(err) => {
                warn!("{:#}, proceeding without compliance checks", err);
                CompliancePolicy::default()
            }
        };
    }

    for path in policy_candidates(None) {
        if !path.exists() {
            continue;
        }
        match read_policy(&path) {
            Ok(policy) => {
                info!(
                    "Loaded minimum hours for {} users from {}",
                    policy.len(),
                    path.display()
                );
                return policy;
            }
            Err(err) => warn!("{:#}", err),
        }
    }

    warn!("No minimum hours configuration found, proceeding without compliance checks");
    CompliancePolicy::default()
}

/// 指定されたパスから最低作業時間の設定を読み込む。
pub fn read_policy(path: &Path) -> Result<CompliancePolicy> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse minimum hours from {}", path.display()))
}

#[cfg(test)]
mod tests {
    use std::{env, fs, sync::Mutex};

    use once_cell::sync::Lazy;
    use rstest::rstest;
    use tempfile::TempDir;

    use super::{load_policy, policy_candidates, read_policy, Settings, POLICY_FILE_NAME};
    use crate::transport::DEFAULT_REPORTS_URL;

    /// 環境変数を変更するテストを直列に実行するためのロック。
    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const KEYS: [&str; 4] = [
        "CLOCKIFY_API_KEY",
        "CLOCKIFY_WORKSPACE_ID",
        "CLOCKIFY_API_URL",
        "CLOCKIFY_REPORTS_URL",
    ];

    fn clear_env() {
        KEYS.iter().for_each(|key| env::remove_var(key));
    }

    #[test]
    fn test_settings_from_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("CLOCKIFY_API_KEY", "secret");
        env::set_var("CLOCKIFY_WORKSPACE_ID", "w1");
        env::set_var("CLOCKIFY_API_URL", "http://localhost:8080/api/v1");

        let settings = Settings::from_env().unwrap();
        clear_env();

        assert_eq!(settings.api_key, "secret");
        assert_eq!(settings.workspace_id.as_deref(), Some("w1"));
        assert_eq!(settings.api_url, "http://localhost:8080/api/v1");
        assert_eq!(settings.reports_url, DEFAULT_REPORTS_URL);
        assert_eq!(settings.transport_config().api_key, "secret");
    }

    #[test]
    fn test_settings_without_api_key() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();

        let result = Settings::from_env();

        assert!(result.is_err());
    }

    #[test]
    fn test_settings_ignores_empty_workspace() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("CLOCKIFY_API_KEY", "secret");
        env::set_var("CLOCKIFY_WORKSPACE_ID", " ");

        let settings = Settings::from_env().unwrap();
        clear_env();

        assert_eq!(settings.workspace_id, None);
    }

    #[test]
    fn test_policy_candidates_order() {
        let candidates = policy_candidates(None);

        assert_eq!(candidates[0].to_str(), Some(POLICY_FILE_NAME));
        assert!(candidates
            .iter()
            .skip(1)
            .all(|path| path.ends_with(format!("clockify-report/{}", POLICY_FILE_NAME))));
    }

    /// パスが指定された場合は、他の場所を探さないことを確認する。
    #[test]
    fn test_policy_candidates_with_explicit_path() {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("minimums.json");

        assert_eq!(policy_candidates(Some(&explicit)), vec![explicit]);
    }

    #[rstest]
    #[case::malformed(Some("{not json"))]
    #[case::missing(None)]
    fn test_load_policy_does_not_fall_back_from_explicit_path(#[case] content: Option<&str>) {
        let dir = TempDir::new().unwrap();
        let explicit = dir.path().join("minimums.json");
        if let Some(content) = content {
            fs::write(&explicit, content).unwrap();
        }

        let policy = load_policy(Some(&explicit));

        assert!(policy.is_empty());
    }

    #[test]
    fn test_load_policy_from_explicit_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("minimums.json");
        fs::write(
            &path,
            r#"{"u1": {"name": "John Doe", "minimum_weekly_hours": 40}}"#,
        )
        .unwrap();

        let policy = load_policy(Some(&path));

        assert_eq!(policy.len(), 1);
        assert_eq!(policy.get("u1").unwrap().minimum_weekly_hours, 40.0);
    }

    #[test]
    fn test_read_malformed_policy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("minimums.json");
        fs::write(&path, "{not json").unwrap();

        let error = read_policy(&path).unwrap_err();

        assert!(format!("{:#}", error).contains("Failed to parse minimum hours"));
    }

    #[test]
    fn test_read_missing_policy() {
        let dir = TempDir::new().unwrap();

        assert!(read_policy(&dir.path().join("missing.json")).is_err());
    }
}
