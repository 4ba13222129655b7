use std::{sync::Arc, time::Duration};

use log::{debug, warn};
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER},
    Client, Method, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Semaphore;

use crate::error::{AuthFailure, ClockifyError, Result};

pub const DEFAULT_API_URL: &str = "https://api.clockify.me/api/v1";
pub const DEFAULT_REPORTS_URL: &str = "https://reports.api.clockify.me/v1";

const API_KEY_HEADER: &str = "X-Api-Key";
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// リクエスト先のAPI。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiTarget {
    /// ワークスペース、プロジェクトなどのコアAPI。
    Core,
    /// レポートAPI。
    Reports,
}

/// `Transport`の設定値。生成後は変更できない。
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub api_key: String,
    pub api_url: String,
    pub reports_url: String,
    pub timeout: Duration,
    /// ネットワークエラー時のリトライ回数。初回の試行は含まない。
    pub max_retries: usize,
    /// 同時接続数とkeep-aliveする接続数の上限。
    pub pool_size: usize,
    pub retry_backoff: Duration,
}

impl TransportConfig {
    /// デフォルトの設定で新しい`TransportConfig`を返す。
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            reports_url: DEFAULT_REPORTS_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            pool_size: 10,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Clockify APIと通信するためのHTTPトランスポート。
///
/// 全てのリクエストにAPIキーのヘッダーを付与し、ネットワークエラーは`max_retries`回まで
/// リトライする。HTTPのエラーステータスはリトライせず`ClockifyError`に変換する。
///
/// cloneしたインスタンスはコネクションプールと同時接続数の上限を共有する。
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> clockify_report::error::Result<()> {
/// use clockify_report::transport::{ApiTarget, Transport, TransportConfig};
///
/// let transport = Transport::new(TransportConfig::new("api-key"))?;
/// let user: serde_json::Value = transport.get(ApiTarget::Core, "user", &[]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    api_key: String,
    api_url: String,
    reports_url: String,
    max_retries: usize,
    retry_backoff: Duration,
    permits: Arc<Semaphore>,
}

impl Transport {
    /// 新しい`Transport`を返す。
    pub fn new(config: TransportConfig) -> Result<Self> {
        let pool_size = config.pool_size.max(1);
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(pool_size)
            .build()
            .map_err(ClockifyError::Client)?;

        Ok(Self {
            client,
            api_key: config.api_key,
            api_url: config.api_url,
            reports_url: config.reports_url,
            max_retries: config.max_retries,
            retry_backoff: config.retry_backoff,
            permits: Arc::new(Semaphore::new(pool_size)),
        })
    }

    /// 新しいリクエストを受け付けないようにする。
    ///
    /// 送信中のリクエストはそのまま完了する。cloneした全てのインスタンスに影響する。
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// `target`と`path`からリクエスト先のURLを組み立てる。
    pub fn url(&self, target: ApiTarget, path: &str) -> String {
        let base = match target {
            ApiTarget::Core => &self.api_url,
            ApiTarget::Reports => &self.reports_url,
        };
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub async fn get<T>(&self, target: ApiTarget, path: &str, params: &[(&str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.request::<T, ()>(Method::GET, target, path, None, params)
            .await
    }

    pub async fn post<T, B>(&self, target: ApiTarget, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, target, path, Some(body), &[])
            .await
    }

    pub async fn put<T, B>(&self, target: ApiTarget, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, target, path, Some(body), &[])
            .await
    }

    pub async fn patch<T, B>(&self, target: ApiTarget, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, target, path, Some(body), &[])
            .await
    }

    /// 削除したリソースの内容は返さない。
    pub async fn delete(&self, target: ApiTarget, path: &str) -> Result<()> {
        self.request::<serde_json::Value, ()>(Method::DELETE, target, path, None, &[])
            .await
            .map(|_| ())
    }

    /// リクエストを送信し、レスポンスのJSONを`T`にデシリアライズして返す。
    ///
    /// 空のレスポンスボディは`null`として扱う。
    ///
    /// # Arguments
    ///
    /// * `method` - HTTPメソッド
    /// * `target` - リクエスト先のAPI
    /// * `path` - ベースURLからの相対パス
    /// * `body` - JSONとして送信するリクエストボディ
    /// * `params` - クエリパラメータ
    pub async fn request<T, B>(
        &self,
        method: Method,
        target: ApiTarget,
        path: &str,
        body: Option<&B>,
        params: &[(&str, String)],
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(target, path);
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| {
                ClockifyError::InvalidArgument(format!("failed to serialize request body: {}", e))
            })?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ClockifyError::PoolClosed)?;

        let attempts = self.max_retries + 1;
        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(params);
            if let Some(payload) = &payload {
                builder = builder
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone());
            }

            debug!("{} {} (attempt {}/{})", method, url, attempt, attempts);
            match builder.send().await {
                Ok(response) => break response,
                Err(err) if attempt < attempts && should_retry(&err) => {
                    warn!(
                        "Request to {} failed (attempt {}/{}): {}",
                        url, attempt, attempts, err
                    );
                    self.sleep_with_backoff(attempt).await;
                }
                Err(err) => {
                    return Err(ClockifyError::Network {
                        attempts: attempt,
                        source: err,
                    })
                }
            }
        };

        let status = response.status();
        debug!("{} {} -> {}", method, url, status);
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(&url, status, &headers, body));
        }

        let text = response
            .text()
            .await
            .map_err(|err| ClockifyError::Network {
                attempts: attempt,
                source: err,
            })?;
        decode_body(&url, &text)
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8) as u32;
        self.retry_backoff.saturating_mul(1u32 << shift)
    }

    async fn sleep_with_backoff(&self, retry_number: usize) {
        let delay = self.backoff_delay(retry_number);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// 接続エラーなど、ネットワーク層のエラーのみリトライ対象とする。
fn should_retry(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

/// エラーステータスを`ClockifyError`に変換する。
fn error_for_status(url: &str, status: StatusCode, headers: &HeaderMap, body: String) -> ClockifyError {
    match status {
        StatusCode::UNAUTHORIZED => ClockifyError::Authentication(AuthFailure::InvalidApiKey),
        StatusCode::FORBIDDEN => {
            ClockifyError::Authentication(AuthFailure::InsufficientPermissions)
        }
        StatusCode::NOT_FOUND => ClockifyError::ResourceNotFound {
            url: url.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => ClockifyError::RateLimit {
            retry_after: parse_retry_after(headers),
        },
        _ => ClockifyError::Api {
            status: status.as_u16(),
            body,
        },
    }
}

/// `Retry-After`ヘッダーを秒数として読む。読めない場合は60秒。
fn parse_retry_after(headers: &HeaderMap) -> Duration {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

fn decode_body<T: DeserializeOwned>(url: &str, text: &str) -> Result<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|source| ClockifyError::Decode {
        url: url.to_string(),
        source,
    })
}
