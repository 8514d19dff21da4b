use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{User, datetime};

/// `fields.comment` のページ
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(rename = "maxResults")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    /// 文字列(v2)またはADF形式のオブジェクト(v3)
    #[serde(default)]
    pub body: serde_json::Value,
    #[serde(with = "datetime")]
    pub created: DateTime<Utc>,
    #[serde(default, with = "datetime::option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_comment_page_deserialization() {
        let json_data = json!({
            "comments": [{
                "id": "1",
                "author": {"displayName": "Jane Doe"},
                "body": "Rolled out to *staging*",
                "created": "2024-01-03T09:00:00.000+0000"
            }],
            "maxResults": 1,
            "total": 1,
            "startAt": 0
        });

        let page: CommentPage = serde_json::from_value(json_data).unwrap();

        assert_eq!(page.comments.len(), 1);
        assert_eq!(page.comments[0].body, json!("Rolled out to *staging*"));
        assert!(page.comments[0].updated.is_none());
    }
}
