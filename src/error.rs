use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Authentication failed ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Unexpected non-JSON response from {0}")]
    NonJsonResponse(String),

    #[error("Malformed issue data: {0}")]
    MalformedData(String),

    #[error("Report rendering failed: {0}")]
    Render(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl Error {
    /// 再試行の対象となるエラーかどうか（5xx・タイムアウト・429）
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transient(_) | Error::RateLimited { .. } => true,
            Error::RequestFailed(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// 代替エンドポイントへのフォールバック対象かどうか（404/405/501系）
    pub fn is_endpoint_unavailable(&self) -> bool {
        match self {
            Error::NotFound(_) | Error::NonJsonResponse(_) => true,
            Error::ApiError { status, .. } => matches!(status, 404 | 405 | 501),
            _ => false,
        }
    }

    /// 致命的な認証エラーかどうか
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Unauthorized { .. })
    }

    /// ユーザー向けの対処方法
    pub fn remedy(&self) -> &'static str {
        match self {
            Error::Unauthorized { .. } => {
                "check your credentials, then run `jira-report configure` and `jira-report test`"
            }
            Error::NotFound(_) => {
                "verify the board id is correct and accessible (`jira-report add-board <id>`)"
            }
            Error::Transient(_) | Error::RequestFailed(_) => {
                "the Jira instance may be unavailable; retry later or run `jira-report test`"
            }
            Error::RateLimited { .. } => "Jira is throttling requests; wait a minute and retry",
            Error::ConfigurationMissing(_) | Error::InvalidConfiguration(_) => {
                "run `jira-report configure` or set JIRA_URL / JIRA_USER / JIRA_API_TOKEN"
            }
            Error::MalformedData(_)
            | Error::JsonParsing(_)
            | Error::NonJsonResponse(_)
            | Error::ApiError { .. } => {
                "the server returned unexpected data; check the api version with `jira-report test`"
            }
            _ => "re-run with --verbose for details",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
