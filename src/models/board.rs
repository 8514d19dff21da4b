use serde::{Deserialize, Serialize};

/// Agile APIのボード
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Board {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default = "default_board_type")]
    pub board_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<BoardLocation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BoardLocation {
    #[serde(rename = "projectKey")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,
    #[serde(rename = "projectName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

fn default_board_type() -> String {
    "unknown".to_string()
}

impl Board {
    pub fn project_key(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.project_key.as_deref())
    }
}

/// GreenHopper API（旧Jira Server）のRapid View
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidView {
    pub id: u64,
    pub name: String,
    #[serde(rename = "sprintSupportEnabled", default)]
    pub sprint_support_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<RapidViewFilter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RapidViewFilter {
    #[serde(default)]
    pub query: String,
}

/// `xboard/work/allData` のレスポンス（課題キーのみ使用）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct XBoardData {
    #[serde(rename = "issuesData", default)]
    pub issues_data: XBoardIssues,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct XBoardIssues {
    #[serde(default)]
    pub issues: Vec<XBoardIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XBoardIssue {
    pub key: String,
    #[serde(rename = "statusName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_name: Option<String>,
}
