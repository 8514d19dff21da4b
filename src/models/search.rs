use serde::{Deserialize, Serialize};

/// 課題取得時に要求するフィールド
pub const ISSUE_FIELDS: &[&str] = &[
    "summary",
    "description",
    "status",
    "assignee",
    "priority",
    "issuetype",
    "created",
    "updated",
    "resolutiondate",
    "components",
    "labels",
    "comment",
];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SearchParams {
    #[serde(rename = "startAt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<u32>,

    #[serde(rename = "maxResults")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expand: Option<Vec<String>>,

    #[serde(rename = "nextPageToken")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// 検索・ボード課題エンドポイント共通のページ
///
/// 課題は1件ずつ型付けするため`serde_json::Value`のまま保持する。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IssuePage {
    #[serde(rename = "startAt")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<u32>,

    #[serde(rename = "maxResults")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,

    #[serde(default)]
    pub issues: Vec<serde_json::Value>,

    #[serde(rename = "nextPageToken")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,

    #[serde(rename = "isLast")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_at(mut self, start_at: u32) -> Self {
        self.start_at = Some(start_at);
        self
    }

    pub fn max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn expand(mut self, expand: Vec<String>) -> Self {
        self.expand = Some(expand);
        self
    }

    pub fn next_page_token(mut self, token: String) -> Self {
        self.next_page_token = Some(token);
        self
    }

    /// レポート用の標準パラメータ（変更履歴とコメント付き）
    pub fn for_report(page_size: u32) -> Self {
        Self::new()
            .max_results(page_size)
            .fields(ISSUE_FIELDS.iter().map(|f| f.to_string()).collect())
            .expand(vec!["changelog".to_string()])
    }
}
