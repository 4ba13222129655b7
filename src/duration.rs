use chrono::{DateTime, FixedOffset, NaiveDateTime};
use log::debug;

use crate::time_entry::TimeEntry;

/// タイムエントリーの経過時間を秒で返す。
///
/// `duration`が設定されていればそのまま返し、なければ開始日時と終了日時の差を返す。
/// 開始、終了日時のどちらかがない場合やパースできない場合は0とする。
/// 1件の不正なエントリーでレポート全体を失敗させないため、エラーは返さない。
pub fn resolve(entry: &TimeEntry) -> u64 {
    if let Some(duration) = entry.duration.filter(|duration| *duration != 0) {
        return duration.max(0) as u64;
    }

    let (Some(start), Some(end)) = (
        entry.time_interval.start.as_deref(),
        entry.time_interval.end.as_deref(),
    ) else {
        return 0;
    };

    match (parse_timestamp(start), parse_timestamp(end)) {
        (Some(start), Some(end)) => (end - start).num_seconds().max(0) as u64,
        _ => {
            debug!(
                "Ignoring unparsable time interval of entry {}: {} - {}",
                entry.id, start, end
            );
            0
        }
    }
}

/// ISO 8601形式の日時をパースする。
///
/// `Z`と`+00:00`はどちらもUTCとして扱う。タイムゾーンがない場合はUTCとみなす。
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value).ok().or_else(|| {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc().fixed_offset())
    })
}
