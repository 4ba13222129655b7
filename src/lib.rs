//! Clockify APIのクライアントと、タイムエントリーをユーザーごとに集計するレポート機能。
//!
//! レポートはページ単位で全件取得し、重複を除いてからユーザー、曜日、週ごとに集計する。
//! 集計結果は週あたりの最低作業時間の設定と比較される。

pub mod calendar;
pub mod clockify;
pub mod compliance;
pub mod config;
pub mod datetime;
pub mod duration;
pub mod error;
pub mod grouping;
pub mod labels;
pub mod models;
pub mod report;
pub mod report_command;
pub mod time_entry;
pub mod transport;

pub use error::{ClockifyError, Result};
