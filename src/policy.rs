//! レポートの分類・影響度評価に使う設定データ
//!
//! すべて `report_policy.json` で上書きできる。省略した項目は既定値になる。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// ステータスの進捗区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    ToDo,
    InProgress,
    Done,
}

/// ステータス名と進捗区分の対応（大文字小文字を無視した部分一致）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusMapping {
    pub in_progress: Vec<String>,
    pub done: Vec<String>,
    pub blocked: Vec<String>,
    pub blocked_labels: Vec<String>,
}

impl Default for StatusMapping {
    fn default() -> Self {
        Self {
            in_progress: strings(&["progress", "development", "active", "working"]),
            done: strings(&["done", "closed", "resolved", "complete"]),
            blocked: strings(&["blocked", "impediment", "hold", "waiting", "stuck"]),
            blocked_labels: strings(&["blocked", "flagged", "impediment"]),
        }
    }
}

impl StatusMapping {
    /// ステータス名のみから区分を判定（変更履歴の遷移先に使う）
    pub fn class_of_name(&self, status: &str) -> Option<StatusClass> {
        if contains_any(status, &self.done) {
            Some(StatusClass::Done)
        } else if contains_any(status, &self.in_progress) {
            Some(StatusClass::InProgress)
        } else {
            None
        }
    }

    /// 現在のステータスの区分（名前で判定できなければJiraのカテゴリを使う）
    pub fn current_class(&self, status: &str, category_key: Option<&str>) -> StatusClass {
        if let Some(class) = self.class_of_name(status) {
            return class;
        }
        match category_key {
            Some("done") => StatusClass::Done,
            Some("indeterminate") => StatusClass::InProgress,
            _ => StatusClass::ToDo,
        }
    }

    pub fn is_blocked_status(&self, status: &str) -> bool {
        contains_any(status, &self.blocked)
    }

    pub fn has_blocked_label(&self, labels: &[String]) -> bool {
        labels
            .iter()
            .any(|label| self.blocked_labels.iter().any(|b| b.eq_ignore_ascii_case(label.trim())))
    }
}

/// キーワードグループ（語ごとに加点し、合計は上限で打ち切る）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub name: String,
    pub terms: Vec<String>,
    pub weight: i32,
    /// 合計の絶対値の上限
    pub cap: i32,
}

impl KeywordGroup {
    fn new(name: &str, terms: &[&str], weight: i32, cap: i32) -> Self {
        Self {
            name: name.to_string(),
            terms: strings(terms),
            weight,
            cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactPolicy {
    /// 優先度名（大文字小文字無視）→ 加点
    pub priority_weights: BTreeMap<String, i32>,
    /// 課題タイプ名（大文字小文字無視）→ 加点
    pub issue_type_weights: BTreeMap<String, i32>,
    pub keyword_groups: Vec<KeywordGroup>,
    /// コンポーネントまたはラベルがこれに一致すると加点
    pub critical_components: Vec<String>,
    pub critical_component_weight: i32,
    pub stale_after_days: i64,
    pub stale_weight: i32,
    pub high_threshold: i32,
    pub medium_threshold: i32,
}

impl Default for ImpactPolicy {
    fn default() -> Self {
        let priority_weights = [
            ("highest", 3),
            ("critical", 3),
            ("blocker", 3),
            ("high", 2),
            ("medium", 1),
            ("low", 0),
            ("lowest", 0),
        ]
        .into_iter()
        .map(|(name, weight)| (name.to_string(), weight))
        .collect();

        Self {
            priority_weights,
            issue_type_weights: BTreeMap::new(),
            keyword_groups: vec![
                KeywordGroup::new(
                    "crisis",
                    &["outage", "data loss", "security", "breach", "incident", "production down"],
                    3,
                    3,
                ),
                KeywordGroup::new(
                    "customer",
                    &["customer", "revenue", "escalation", "contract"],
                    2,
                    2,
                ),
                KeywordGroup::new("minor", &["typo", "cosmetic", "minor", "nice to have"], -1, 1),
            ],
            critical_components: Vec::new(),
            critical_component_weight: 2,
            stale_after_days: 14,
            stale_weight: 1,
            high_threshold: 5,
            medium_threshold: 2,
        }
    }
}

impl ImpactPolicy {
    pub fn priority_weight(&self, priority: &str) -> i32 {
        lookup_ci(&self.priority_weights, priority).unwrap_or(0)
    }

    pub fn issue_type_weight(&self, issue_type: &str) -> i32 {
        lookup_ci(&self.issue_type_weights, issue_type).unwrap_or(0)
    }

    /// コンポーネントまたはラベルが重要指定に含まれるか
    pub fn critical_match<'a>(&self, name: &'a str) -> Option<&'a str> {
        self.critical_components
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(name.trim()))
            .then_some(name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.medium_threshold > self.high_threshold {
            return Err(Error::InvalidConfiguration(format!(
                "medium_threshold ({}) must not exceed high_threshold ({})",
                self.medium_threshold, self.high_threshold
            )));
        }
        if self.critical_component_weight < 0 {
            return Err(Error::InvalidConfiguration(format!(
                "critical_component_weight ({}) must not be negative",
                self.critical_component_weight
            )));
        }
        if self.stale_after_days < 0 {
            return Err(Error::InvalidConfiguration(
                "stale_after_days must not be negative".to_string(),
            ));
        }
        if let Some(group) = self.keyword_groups.iter().find(|g| g.cap < 0) {
            return Err(Error::InvalidConfiguration(format!(
                "keyword group '{}' has a negative cap",
                group.name
            )));
        }
        Ok(())
    }
}

/// レポート描画の既定値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    pub max_description_chars: Option<usize>,
    pub max_comments: usize,
    /// コメント1件あたりの最大文字数
    pub max_comment_chars: usize,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            max_description_chars: None,
            max_comments: 3,
            max_comment_chars: 280,
        }
    }
}

/// `report_policy.json` の内容
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPolicy {
    pub status: StatusMapping,
    pub impact: ImpactPolicy,
    pub render: RenderDefaults,
}

impl ReportPolicy {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let policy: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfiguration(format!("invalid report policy: {}", e)))?;
        policy.impact.validate()?;
        Ok(policy)
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn contains_any(haystack: &str, terms: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .any(|t| !t.is_empty() && haystack.contains(&t))
}

fn lookup_ci(map: &BTreeMap<String, i32>, name: &str) -> Option<i32> {
    let name = name.trim();
    map.iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
        .map(|(_, weight)| *weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_defaults() {
        let mapping = StatusMapping::default();

        assert_eq!(mapping.class_of_name("In Progress"), Some(StatusClass::InProgress));
        assert_eq!(mapping.class_of_name("In Development"), Some(StatusClass::InProgress));
        assert_eq!(mapping.class_of_name("Closed"), Some(StatusClass::Done));
        assert_eq!(mapping.class_of_name("To Do"), None);
        assert!(mapping.is_blocked_status("On Hold"));
        assert!(mapping.is_blocked_status("Waiting for customer"));
        assert!(!mapping.is_blocked_status("In Review"));
    }

    #[test]
    fn test_current_class_falls_back_to_category() {
        let mapping = StatusMapping::default();

        // 名前が語彙にない場合はJiraのカテゴリを使う
        assert_eq!(mapping.current_class("In Review", Some("indeterminate")), StatusClass::InProgress);
        assert_eq!(mapping.current_class("Shipped", Some("done")), StatusClass::Done);
        assert_eq!(mapping.current_class("Backlog", Some("new")), StatusClass::ToDo);
        assert_eq!(mapping.current_class("Backlog", None), StatusClass::ToDo);
    }

    #[test]
    fn test_blocked_label_is_case_insensitive() {
        let mapping = StatusMapping::default();

        assert!(mapping.has_blocked_label(&["Flagged".to_string()]));
        assert!(!mapping.has_blocked_label(&["customer".to_string()]));
    }

    #[test]
    fn test_priority_weight_lookup() {
        let policy = ImpactPolicy::default();

        assert_eq!(policy.priority_weight("Highest"), 3);
        assert_eq!(policy.priority_weight("high"), 2);
        assert_eq!(policy.priority_weight("Trivial"), 0);
    }

    #[test]
    fn test_partial_policy_json_uses_defaults() {
        // Given: 一部の項目だけを指定したJSON
        let json = r#"{
            "impact": {"critical_components": ["Payments"], "high_threshold": 6},
            "status": {"blocked": ["parked"]}
        }"#;

        // When: 読み込む
        let policy = ReportPolicy::from_json_str(json).unwrap();

        // Then: 未指定の項目は既定値のまま
        assert_eq!(policy.impact.critical_components, vec!["Payments"]);
        assert_eq!(policy.impact.high_threshold, 6);
        assert_eq!(policy.impact.medium_threshold, 2);
        assert_eq!(policy.impact.priority_weight("Highest"), 3);
        assert_eq!(policy.status.blocked, vec!["parked"]);
        assert_eq!(policy.status.done, StatusMapping::default().done);
        assert_eq!(policy.render.max_comments, 3);
        assert_eq!(policy.render.max_comment_chars, 280);
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let json = r#"{"impact": {"high_threshold": 1, "medium_threshold": 3}}"#;

        match ReportPolicy::from_json_str(json).unwrap_err() {
            Error::InvalidConfiguration(msg) => assert!(msg.contains("medium_threshold")),
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_critical_component_weight_is_rejected() {
        // 重要コンポーネント指定で点数が下がる設定は受け付けない
        let json = r#"{"impact": {"critical_components": ["Payments"], "critical_component_weight": -2}}"#;

        match ReportPolicy::from_json_str(json).unwrap_err() {
            Error::InvalidConfiguration(msg) => assert!(msg.contains("critical_component_weight")),
            other => panic!("Expected InvalidConfiguration, got {:?}", other),
        }

        let json = r#"{"impact": {"critical_components": ["Payments"], "critical_component_weight": 0}}"#;
        assert!(ReportPolicy::from_json_str(json).is_ok());
    }
}
