use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "statusCategory")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_category: Option<StatusCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCategory {
    #[serde(default)]
    pub id: Option<u32>,
    /// `new` / `indeterminate` / `done`
    pub key: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "colorName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_name: Option<String>,
}

impl Status {
    /// ステータスカテゴリのキー（未設定の場合はNone）
    pub fn category_key(&self) -> Option<&str> {
        self.status_category.as_ref().map(|c| c.key.as_str())
    }
}
