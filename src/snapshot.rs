use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::changelog_parser::{ChangelogParser, StatusTransition};
use crate::error::{Error, Result};
use crate::markup;
use crate::models::{Comment, Issue};

/// レポート生成に使う課題の読み取り専用スナップショット
#[derive(Debug, Clone, PartialEq)]
pub struct IssueSnapshot {
    pub key: String,
    pub summary: String,
    /// wikiマークアップ（ADFは変換済み）
    pub description: String,
    pub status: String,
    /// Jiraのステータスカテゴリキー（`new` / `indeterminate` / `done`）
    pub status_category: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub issue_type: Option<String>,
    pub components: Vec<String>,
    pub labels: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub resolved: Option<DateTime<Utc>>,
    /// 古い順
    pub transitions: Vec<StatusTransition>,
    /// 古い順
    pub comments: Vec<CommentSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommentSnapshot {
    pub author: String,
    pub created: DateTime<Utc>,
    /// wikiマークアップ（ADFは変換済み）
    pub body: String,
}

impl IssueSnapshot {
    pub fn from_issue(issue: Issue) -> Result<Self> {
        let key = issue.key.trim().to_string();
        if key.is_empty() {
            return Err(Error::MalformedData("issue without key".to_string()));
        }

        let fields = issue.fields;
        let transitions = match &issue.changelog {
            Some(changelog) => {
                if ChangelogParser::is_truncated(changelog) {
                    debug!(key = %key, total = changelog.total, "changelog is truncated, using returned histories only");
                }
                ChangelogParser::status_transitions(changelog)
            }
            None => Vec::new(),
        };

        let mut comments: Vec<CommentSnapshot> = fields
            .comment
            .map(|page| page.comments.into_iter().map(CommentSnapshot::from).collect())
            .unwrap_or_default();
        comments.sort_by_key(|c| c.created);

        Ok(Self {
            key,
            summary: fields.summary.trim().to_string(),
            description: fields.description.as_ref().map(markup_of).unwrap_or_default(),
            status_category: fields.status.category_key().map(str::to_string),
            status: fields.status.name,
            priority: fields.priority.map(|p| p.name),
            assignee: fields.assignee.map(|u| u.label()),
            issue_type: fields.issue_type.map(|t| t.name),
            components: fields.components.into_iter().map(|c| c.name).collect(),
            labels: fields.labels,
            created: fields.created,
            updated: fields.updated,
            resolved: fields.resolution_date,
            transitions,
            comments,
        })
    }

    /// 生のJSONから変換（キーが読めればエラーメッセージに含める）
    pub fn from_value(value: Value) -> Result<Self> {
        let key = value
            .get("key")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string();
        let issue: Issue = serde_json::from_value(value)
            .map_err(|e| Error::MalformedData(format!("{}: {}", key, e)))?;
        Self::from_issue(issue)
    }

    pub fn has_history(&self) -> bool {
        !self.transitions.is_empty()
    }

    /// 新しい順に最大n件のコメント
    pub fn recent_comments(&self, n: usize) -> impl Iterator<Item = &CommentSnapshot> {
        self.comments.iter().rev().take(n)
    }
}

impl From<Comment> for CommentSnapshot {
    fn from(comment: Comment) -> Self {
        Self {
            author: comment
                .author
                .map(|a| a.label())
                .unwrap_or_else(|| "Unknown".to_string()),
            created: comment.created,
            body: markup_of(&comment.body),
        }
    }
}

/// 文字列(v2)ならそのまま、ADF(v3)ならwikiマークアップに変換
fn markup_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) => markup::flatten_adf(value),
        other => other.to_string(),
    }
}

/// 取得した課題JSONをスナップショットに変換
///
/// 壊れたレコードは警告を出してスキップし、件数を返す。重複したキーは
/// 最初のものを残す。
pub fn snapshots_from_values(values: Vec<Value>) -> (Vec<IssueSnapshot>, usize) {
    let mut seen = HashSet::new();
    let mut snapshots = Vec::with_capacity(values.len());
    let mut skipped = 0;

    for value in values {
        match IssueSnapshot::from_value(value) {
            Ok(snapshot) => {
                if seen.insert(snapshot.key.clone()) {
                    snapshots.push(snapshot);
                }
            }
            Err(e) => {
                warn!(error = %e, "skipping malformed issue record");
                skipped += 1;
            }
        }
    }

    (snapshots, skipped)
}
