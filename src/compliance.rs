use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::calendar::ReportPeriod;

/// ユーザーごとの週あたりの最低作業時間の設定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimumHours {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub minimum_weekly_hours: f64,
}

/// ユーザーIDと最低作業時間の対応。
///
/// 設定ファイルの形式は以下の通り。
///
/// ```json
/// {
///   "user_id_1": {"name": "John Doe", "minimum_weekly_hours": 40}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompliancePolicy {
    minimums: HashMap<String, MinimumHours>,
}

impl CompliancePolicy {
    pub fn new(minimums: HashMap<String, MinimumHours>) -> Self {
        Self { minimums }
    }

    pub fn get(&self, user_id: &str) -> Option<&MinimumHours> {
        self.minimums.get(user_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MinimumHours)> {
        self.minimums.iter()
    }

    pub fn len(&self) -> usize {
        self.minimums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.minimums.is_empty()
    }
}

/// 最低作業時間の判定結果。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Compliance {
    pub compliant: bool,
    /// 表示上、未達として目印をつけるかどうか。
    pub flagged: bool,
    /// 期間に応じて按分した最低作業時間。設定がなければ`None`。
    pub expected_hours: Option<f64>,
}

impl Compliance {
    fn exempt() -> Self {
        Self {
            compliant: true,
            flagged: false,
            expected_hours: None,
        }
    }
}

/// ユーザーの作業時間が最低作業時間を満たしているか判定する。
///
/// 週あたりの最低作業時間を期間の週数(端数を含む)で按分して比較する。
/// 設定がないユーザーや、最低作業時間が0以下のユーザーは常に満たしているとする。
///
/// # Arguments
///
/// * `user_id` - 判定するユーザーのID
/// * `actual_hours` - 期間内の作業時間
/// * `period` - レポートの対象期間
/// * `policy` - 最低作業時間の設定
pub fn evaluate(
    user_id: &str,
    actual_hours: f64,
    period: &ReportPeriod,
    policy: &CompliancePolicy,
) -> Compliance {
    let minimum = match policy.get(user_id) {
        Some(config) if config.minimum_weekly_hours > 0.0 => config.minimum_weekly_hours,
        _ => return Compliance::exempt(),
    };

    let expected = minimum * period.weeks();
    let compliant = actual_hours >= expected;
    Compliance {
        compliant,
        flagged: !compliant,
        expected_hours: Some(expected),
    }
}
