use crate::error::{Error, Result};
use crate::models::{IssuePage, RapidView, SearchParams, User, XBoardData, Board};
use crate::retry::{RateLimiter, RetryPolicy, parse_retry_after};
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// ページングの安全上限
const MAX_PAGES: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "auth_method", rename_all = "snake_case")]
pub enum Auth {
    /// メールアドレス(ユーザー名) + APIトークン(パスワード)
    #[serde(alias = "apiToken", alias = "basicAuth")]
    Basic {
        #[serde(alias = "email")]
        username: String,
        api_token: String,
    },
    /// パーソナルアクセストークン
    #[serde(rename = "token", alias = "personalAccessToken")]
    Bearer {
        #[serde(alias = "personal_token")]
        token: String,
    },
}

/// REST APIのバージョン（v3: Cloud, v2: Server）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ApiVersion {
    #[serde(rename = "v2")]
    V2,
    #[default]
    #[serde(rename = "v3")]
    V3,
}

impl ApiVersion {
    pub fn number(self) -> u8 {
        match self {
            ApiVersion::V2 => 2,
            ApiVersion::V3 => 3,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "v2" | "2" => Ok(ApiVersion::V2),
            "v3" | "3" => Ok(ApiVersion::V3),
            other => Err(Error::InvalidConfiguration(format!(
                "Unknown api version '{}', expected v2 or v3",
                other
            ))),
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JiraConfig {
    pub base_url: String,
    #[serde(flatten)]
    pub auth: Auth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<ApiVersion>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl JiraConfig {
    pub fn new(base_url: impl Into<String>, auth: Auth) -> Result<Self> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();

        // Validate URL
        let _ = Url::parse(&base_url)
            .map_err(|_| Error::InvalidConfiguration("Invalid base URL".to_string()))?;

        Ok(Self {
            base_url,
            auth,
            api_version: None,
            timeout_secs: default_timeout_secs(),
        })
    }

    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.api_version = Some(version);
        self
    }

    /// 環境変数から設定を構築
    ///
    /// `JIRA_URL` は必須。`JIRA_PAT` があればBearer認証、なければ
    /// `JIRA_USER` + `JIRA_API_TOKEN` のBasic認証。`JIRA_API_VERSION` は任意。
    pub fn from_env() -> Result<Self> {
        use std::env;

        let base_url = env::var("JIRA_URL")
            .map_err(|_| Error::ConfigurationMissing("JIRA_URL not found in environment".to_string()))?;

        let auth = match env::var("JIRA_PAT") {
            Ok(token) if !token.trim().is_empty() => Auth::Bearer { token },
            _ => {
                let username = env::var("JIRA_USER")
                    .map_err(|_| Error::ConfigurationMissing("JIRA_USER not found in environment".to_string()))?;
                let api_token = env::var("JIRA_API_TOKEN")
                    .map_err(|_| Error::ConfigurationMissing("JIRA_API_TOKEN not found in environment".to_string()))?;
                Auth::Basic { username, api_token }
            }
        };

        let mut config = Self::new(base_url, auth)?;
        if let Ok(version) = env::var("JIRA_API_VERSION") {
            config.api_version = Some(ApiVersion::parse(&version)?);
        }
        Ok(config)
    }
}

/// 接続テストの結果
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected { user: String, api_version: ApiVersion },
    Unauthorized { status: u16 },
    Unreachable { reason: String },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected { .. })
    }
}

#[derive(Debug, Clone)]
pub struct JiraClient {
    pub(crate) client: Client,
    pub(crate) config: Arc<JiraConfig>,
    retry: RetryPolicy,
    limiter: RateLimiter,
}

impl JiraClient {
    pub fn new(config: JiraConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        // 認証ヘッダーを追加
        let auth_value = match &config.auth {
            Auth::Basic { username, api_token } => {
                let raw = format!("{}:{}", username, api_token);
                let encoded = base64::engine::general_purpose::STANDARD.encode(raw.as_bytes());
                format!("Basic {}", encoded)
            }
            Auth::Bearer { token } => format!("Bearer {}", token),
        };
        let mut auth_header = header::HeaderValue::from_str(&auth_value)
            .map_err(|_| Error::InvalidConfiguration("Invalid auth header".to_string()))?;
        auth_header.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth_header);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("jira-report/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: Arc::new(config),
            retry: RetryPolicy::default(),
            limiter: RateLimiter::new(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &JiraConfig {
        &self.config
    }

    /// 設定されたAPIバージョン（未設定ならv3）
    pub fn api_version(&self) -> ApiVersion {
        self.config.api_version.unwrap_or_default()
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url, endpoint)
    }

    /// 再試行と共有レート制限を適用してリクエストを送信
    async fn execute<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            self.limiter.wait_ready().await;
            debug!(%url, attempt, "sending request");

            let result = match build().send().await {
                Ok(response) => Self::check_status(url, response).await,
                Err(e) if e.is_timeout() || e.is_connect() => {
                    Err(Error::Transient(format!("{}: {}", url, e)))
                }
                Err(e) => Err(Error::RequestFailed(e)),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && self.retry.should_retry(attempt) => {
                    let delay = match &err {
                        Error::RateLimited { retry_after } => {
                            let delay = self.retry.rate_limit_delay(attempt, *retry_after);
                            self.limiter.pause_for(delay).await;
                            delay
                        }
                        _ => {
                            let delay = self.retry.delay_for_attempt(attempt);
                            tokio::time::sleep(delay).await;
                            delay
                        }
                    };
                    warn!(%url, attempt, ?delay, error = %err, "retrying request");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn check_status(url: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let code = status.as_u16();
        let message = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Unauthorized { status: code, message },
            StatusCode::NOT_FOUND => Error::NotFound(url.to_string()),
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited { retry_after },
            StatusCode::NOT_IMPLEMENTED => Error::ApiError { status: code, message },
            s if s.is_server_error() => Error::Transient(format!("{} returned {}", url, code)),
            _ => Error::ApiError { status: code, message },
        })
    }

    /// JSONとしてデコード（HTMLが返った場合はエンドポイント違いとして扱う）
    async fn decode<T>(url: &str, response: Response) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = response.text().await?;
        if body.trim_start().starts_with('<') {
            return Err(Error::NonJsonResponse(url.to_string()));
        }
        Ok(serde_json::from_str(&body)?)
    }

    pub(crate) async fn get<T>(&self, endpoint: &str, query: &[(&str, String)]) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.url(endpoint);
        let response = self
            .execute(&url, || self.client.get(&url).query(query))
            .await?;
        Self::decode(&url, response).await
    }

    pub(crate) async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        let url = self.url(endpoint);
        let response = self
            .execute(&url, || self.client.post(&url).json(body))
            .await?;
        Self::decode(&url, response).await
    }

    /// 認証済みユーザーを取得
    pub async fn get_myself(&self, version: ApiVersion) -> Result<User> {
        self.get(&format!("/rest/api/{}/myself", version.number()), &[])
            .await
    }

    /// 接続テスト（v3を試し、404やHTMLならv2にフォールバック）
    pub async fn test_connection(&self) -> ConnectionStatus {
        let mut version = ApiVersion::V3;
        let mut result = self.get_myself(version).await;

        if matches!(&result, Err(e) if e.is_endpoint_unavailable()) {
            debug!("API v3 not available, trying API v2");
            version = ApiVersion::V2;
            result = self.get_myself(version).await;
        }

        match result {
            Ok(user) => ConnectionStatus::Connected {
                user: user.label(),
                api_version: version,
            },
            Err(Error::Unauthorized { status, .. }) => ConnectionStatus::Unauthorized { status },
            Err(e) if e.is_endpoint_unavailable() => ConnectionStatus::Unreachable {
                reason: format!("no Jira REST API found at {}", self.config.base_url),
            },
            Err(e) => ConnectionStatus::Unreachable { reason: e.to_string() },
        }
    }

    /// Agile APIでボードを取得
    pub async fn get_agile_board(&self, board_id: u64) -> Result<Board> {
        self.get(&format!("/rest/agile/1.0/board/{}", board_id), &[])
            .await
    }

    /// GreenHopper APIでRapid Viewを取得
    pub async fn get_rapid_view(&self, board_id: u64) -> Result<RapidView> {
        self.get(&format!("/rest/greenhopper/1.0/rapidview/{}", board_id), &[])
            .await
    }

    /// GreenHopperのボードデータから課題キーを取得
    pub async fn get_xboard_issue_keys(&self, board_id: u64) -> Result<Vec<String>> {
        let data: XBoardData = self
            .get(
                "/rest/greenhopper/1.0/xboard/work/allData/",
                &[("rapidViewId", board_id.to_string())],
            )
            .await?;
        Ok(data.issues_data.issues.into_iter().map(|i| i.key).collect())
    }

    /// Agile APIのボード課題を1ページ取得
    pub async fn get_board_issue_page(
        &self,
        board_id: u64,
        params: &SearchParams,
        jql: Option<&str>,
    ) -> Result<IssuePage> {
        let mut query = Vec::new();
        if let Some(start_at) = params.start_at {
            query.push(("startAt", start_at.to_string()));
        }
        if let Some(max_results) = params.max_results {
            query.push(("maxResults", max_results.to_string()));
        }
        if let Some(fields) = &params.fields {
            query.push(("fields", fields.join(",")));
        }
        if let Some(expand) = &params.expand {
            query.push(("expand", expand.join(",")));
        }
        if let Some(jql) = jql {
            query.push(("jql", jql.to_string()));
        }

        self.get(&format!("/rest/agile/1.0/board/{}/issue", board_id), &query)
            .await
    }

    /// ボードの全課題（startAtでページング）
    pub async fn get_all_board_issues(
        &self,
        board_id: u64,
        params: &SearchParams,
        jql: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let page_size = params.max_results.unwrap_or(50);
        let mut all = Vec::new();
        let mut start_at = 0u32;

        for _ in 0..MAX_PAGES {
            let page_params = params.clone().start_at(start_at);
            let page = self.get_board_issue_page(board_id, &page_params, jql).await?;
            let received = page.issues.len() as u32;
            debug!(board_id, start_at, received, "fetched board issue page");
            all.extend(page.issues);

            if offset_page_is_last(received, page.max_results.unwrap_or(page_size), page.is_last) {
                break;
            }
            start_at += received;
        }

        Ok(all)
    }

    /// 検索を1ページ実行（v2/旧v3: startAt方式）
    pub async fn search_page(&self, jql: &str, params: &SearchParams) -> Result<IssuePage> {
        let mut body = serde_json::json!({
            "jql": jql
        });

        // SearchParamsの値をリクエストボディにマージ
        if let Some(start_at) = params.start_at {
            body["startAt"] = start_at.into();
        }
        if let Some(max_results) = params.max_results {
            body["maxResults"] = max_results.into();
        }
        if let Some(fields) = &params.fields {
            body["fields"] = fields.clone().into();
        }
        if let Some(expand) = &params.expand {
            body["expand"] = expand.clone().into();
        }

        self.post(&format!("/rest/api/{}/search", self.api_version().number()), &body)
            .await
    }

    /// 拡張検索を1ページ実行（v3: nextPageToken方式）
    pub async fn search_jql_page(&self, jql: &str, params: &SearchParams) -> Result<IssuePage> {
        let mut body = serde_json::json!({
            "jql": jql
        });

        if let Some(max_results) = params.max_results {
            body["maxResults"] = max_results.into();
        }
        if let Some(fields) = &params.fields {
            body["fields"] = fields.clone().into();
        }
        if let Some(expand) = &params.expand {
            body["expand"] = expand.join(",").into();
        }
        if let Some(token) = &params.next_page_token {
            body["nextPageToken"] = token.clone().into();
        }

        self.post("/rest/api/3/search/jql", &body).await
    }

    /// JQL検索の全件取得
    ///
    /// v3は `/search/jql` のトークン方式を使い、利用できない場合は
    /// `/search` のstartAt方式にフォールバックする。
    pub async fn search_all(&self, jql: &str, params: &SearchParams) -> Result<Vec<serde_json::Value>> {
        if self.api_version() == ApiVersion::V3 {
            match self.search_all_by_token(jql, params).await {
                Err(e) if e.is_endpoint_unavailable() => {
                    warn!(error = %e, "enhanced search unavailable, falling back to offset search");
                }
                other => return other,
            }
        }
        self.search_all_by_offset(jql, params).await
    }

    async fn search_all_by_offset(&self, jql: &str, params: &SearchParams) -> Result<Vec<serde_json::Value>> {
        let page_size = params.max_results.unwrap_or(50);
        let mut all = Vec::new();
        let mut start_at = 0u32;

        for _ in 0..MAX_PAGES {
            let page = self.search_page(jql, &params.clone().start_at(start_at)).await?;
            let received = page.issues.len() as u32;
            debug!(start_at, received, "fetched search page");
            all.extend(page.issues);

            if offset_page_is_last(received, page.max_results.unwrap_or(page_size), page.is_last) {
                break;
            }
            start_at += received;
        }

        Ok(all)
    }

    async fn search_all_by_token(&self, jql: &str, params: &SearchParams) -> Result<Vec<serde_json::Value>> {
        let mut all = Vec::new();
        let mut page_params = params.clone();
        page_params.next_page_token = None;

        for _ in 0..MAX_PAGES {
            let page = self.search_jql_page(jql, &page_params).await?;
            let received = page.issues.len() as u32;
            debug!(received, "fetched enhanced search page");
            all.extend(page.issues);

            // 返却件数はmaxResultsより少なくなり得るため、続きの有無はトークンで判断する
            match page.next_page_token {
                Some(token) if page.is_last != Some(true) && received > 0 => {
                    page_params.next_page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(all)
    }
}

/// startAt方式のページが最終ページかどうか
fn offset_page_is_last(received: u32, page_size: u32, is_last: Option<bool>) -> bool {
    received == 0 || received < page_size.max(1) || is_last == Some(true)
}
