use std::time::Duration;

use thiserror::Error;

/// 認証エラーの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// APIキーが不正 (401)。
    InvalidApiKey,
    /// 権限不足 (403)。
    InsufficientPermissions,
}

/// Clockify APIとの通信で発生するエラー。
///
/// HTTPステータスのエラーはリトライせず、そのまま呼び出し元に返す。
/// ネットワークエラーのみ`Transport`内でリトライした後に`Network`として返す。
#[derive(Debug, Error)]
pub enum ClockifyError {
    #[error("authentication failed: {0:?}")]
    Authentication(AuthFailure),

    #[error("resource not found: {url}")]
    ResourceNotFound { url: String },

    /// 429。`retry_after`経過後に呼び出し元がリトライする。
    #[error("rate limit exceeded, retry after {} seconds", .retry_after.as_secs())]
    RateLimit { retry_after: Duration },

    #[error("request failed after {attempts} attempts")]
    Network {
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// `Transport::close`の後に送信しようとした。
    #[error("transport is closed")]
    PoolClosed,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),
}

impl ClockifyError {
    /// 呼び出し元がリトライしても良いエラーかどうか。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClockifyError::RateLimit { .. } | ClockifyError::Network { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ClockifyError>;
