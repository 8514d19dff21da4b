use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CommentPage, Status, User, datetime};

/// レポートに必要な項目だけを持つ課題
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub fields: IssueFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog: Option<Changelog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueFields {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<serde_json::Value>, // 文字列(v2)またはADF形式のオブジェクト(v3)
    #[serde(rename = "issuetype")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<Named>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Named>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<User>,
    #[serde(with = "datetime")]
    pub created: DateTime<Utc>,
    #[serde(with = "datetime")]
    pub updated: DateTime<Utc>,
    #[serde(rename = "resolutiondate")]
    #[serde(default, with = "datetime::option")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub components: Vec<Named>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentPage>,
}

/// 優先度・課題タイプ・コンポーネントなど名前だけを使う参照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Changelog {
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "maxResults", default)]
    pub max_results: u32,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub histories: Vec<History>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<User>,
    #[serde(with = "datetime")]
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryItem {
    pub field: String,
    #[serde(rename = "fieldtype")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "fromString")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(rename = "toString")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_string: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_issue_deserialization() {
        let json_data = json!({
            "id": "10000",
            "key": "TEST-1",
            "self": "https://example.atlassian.net/rest/api/3/issue/10000",
            "fields": {
                "summary": "Test Issue",
                "description": "This is a test issue",
                "issuetype": {
                    "id": "1",
                    "name": "Bug",
                    "subtask": false
                },
                "priority": {
                    "id": "3",
                    "name": "Medium"
                },
                "status": {
                    "id": "1",
                    "name": "To Do",
                    "statusCategory": {
                        "id": 2,
                        "key": "new",
                        "name": "To Do",
                        "colorName": "blue-gray"
                    }
                },
                "assignee": null,
                "created": "2024-01-01T00:00:00.000+0000",
                "updated": "2024-01-02T00:00:00.000+0000",
                "components": [{"id": "1", "name": "Payments"}],
                "labels": ["customer"],
                "customfield_10001": "Custom Value"
            }
        });

        let issue: Issue = serde_json::from_value(json_data).unwrap();

        assert_eq!(issue.key, "TEST-1");
        assert_eq!(issue.fields.summary, "Test Issue");
        assert_eq!(
            issue.fields.description,
            Some(serde_json::Value::String(
                "This is a test issue".to_string()
            ))
        );
        assert_eq!(issue.fields.components[0].name, "Payments");
        assert_eq!(issue.fields.labels, vec!["customer"]);
        assert_eq!(issue.fields.priority.unwrap().name, "Medium");
        assert_eq!(issue.fields.issue_type.unwrap().name, "Bug");
        assert!(issue.fields.resolution_date.is_none());
    }

    #[test]
    fn test_issue_with_changelog_deserialization() {
        let json_data = json!({
            "key": "TEST-2",
            "fields": {
                "summary": "With history",
                "status": {"name": "Done", "statusCategory": {"key": "done"}},
                "created": "2024-01-01T00:00:00.000+0000",
                "updated": "2024-01-05T00:00:00.000+0000",
                "resolutiondate": "2024-01-05T00:00:00.000+0000"
            },
            "changelog": {
                "startAt": 0,
                "maxResults": 1,
                "total": 1,
                "histories": [{
                    "id": "100",
                    "created": "2024-01-05T00:00:00.000+0000",
                    "items": [{
                        "field": "status",
                        "fieldtype": "jira",
                        "fromString": "In Progress",
                        "toString": "Done"
                    }]
                }]
            }
        });

        let issue: Issue = serde_json::from_value(json_data).unwrap();

        let changelog = issue.changelog.unwrap();
        assert_eq!(changelog.histories.len(), 1);
        assert_eq!(changelog.histories[0].items[0].to_string.as_deref(), Some("Done"));
        assert!(issue.fields.resolution_date.is_some());
    }

    #[test]
    fn test_issue_missing_summary_is_rejected() {
        let json_data = json!({
            "key": "TEST-3",
            "fields": {
                "status": {"name": "Open"},
                "created": "2024-01-01T00:00:00.000+0000",
                "updated": "2024-01-02T00:00:00.000+0000"
            }
        });

        assert!(serde_json::from_value::<Issue>(json_data).is_err());
    }
}
