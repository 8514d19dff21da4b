use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::markup;
use crate::policy::{ImpactPolicy, StatusClass, StatusMapping};
use crate::snapshot::IssueSnapshot;

/// 影響度（High > Medium > Low）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn label(self) -> &'static str {
        match self {
            ImpactLevel::High => "HIGH",
            ImpactLevel::Medium => "MEDIUM",
            ImpactLevel::Low => "LOW",
        }
    }

    pub fn badge(self) -> &'static str {
        match self {
            ImpactLevel::High => "🔴",
            ImpactLevel::Medium => "🟡",
            ImpactLevel::Low => "🟢",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactRating {
    pub level: ImpactLevel,
    pub score: i32,
    /// 評価順に並んだ加点理由
    pub signals: Vec<String>,
}

impl ImpactRating {
    pub fn rationale(&self) -> String {
        if self.signals.is_empty() {
            "no impact signals".to_string()
        } else {
            self.signals.join("; ")
        }
    }
}

/// ビジネス影響度の評価器
///
/// 加点は優先度・課題タイプ・キーワード・重要コンポーネント・停滞の順で行う。
/// 結果は課題と基準時刻だけで決まる。
#[derive(Debug, Clone, Default)]
pub struct ImpactAssessor {
    policy: ImpactPolicy,
    mapping: StatusMapping,
}

impl ImpactAssessor {
    pub fn new(policy: ImpactPolicy, mapping: StatusMapping) -> Self {
        Self { policy, mapping }
    }

    pub fn assess(&self, issue: &IssueSnapshot, as_of: DateTime<Utc>) -> ImpactRating {
        let mut score = 0;
        let mut signals = Vec::new();

        if let Some(priority) = issue.priority.as_deref() {
            let weight = self.policy.priority_weight(priority);
            if weight != 0 {
                score += weight;
                signals.push(format!("priority {} ({})", priority, signed(weight)));
            }
        }

        if let Some(issue_type) = issue.issue_type.as_deref() {
            let weight = self.policy.issue_type_weight(issue_type);
            if weight != 0 {
                score += weight;
                signals.push(format!("issue type {} ({})", issue_type, signed(weight)));
            }
        }

        let text = format!(
            "{}\n{}",
            markup::normalize(&issue.summary),
            markup::normalize(&issue.description)
        )
        .to_lowercase();
        for group in &self.policy.keyword_groups {
            let matched: Vec<&str> = group
                .terms
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty() && text.contains(&t.to_lowercase()))
                .collect();
            if matched.is_empty() || group.weight == 0 {
                continue;
            }
            let raw = group.weight.saturating_mul(matched.len() as i32);
            let cap = group.cap.saturating_abs();
            let contribution = raw.clamp(-cap, cap);
            if contribution != 0 {
                score += contribution;
                signals.push(format!(
                    "{} keywords: {} ({})",
                    group.name,
                    matched.join(", "),
                    signed(contribution)
                ));
            }
        }
        score = score.max(0);

        let critical = issue
            .components
            .iter()
            .find_map(|c| self.policy.critical_match(c).map(|name| ("component", name)))
            .or_else(|| {
                issue
                    .labels
                    .iter()
                    .find_map(|l| self.policy.critical_match(l).map(|name| ("label", name)))
            });
        if let Some((kind, name)) = critical {
            let weight = self.policy.critical_component_weight;
            score += weight;
            signals.push(format!("critical {}: {} ({})", kind, name, signed(weight)));
        }

        let in_progress = self
            .mapping
            .current_class(&issue.status, issue.status_category.as_deref())
            == StatusClass::InProgress;
        let idle = as_of - issue.updated;
        if in_progress && idle > Duration::days(self.policy.stale_after_days) {
            let weight = self.policy.stale_weight;
            score += weight;
            signals.push(format!(
                "stale: no update for {} days ({})",
                idle.num_days(),
                signed(weight)
            ));
        }

        let level = if score >= self.policy.high_threshold {
            ImpactLevel::High
        } else if score >= self.policy.medium_threshold {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        };

        ImpactRating { level, score, signals }
    }
}

fn signed(weight: i32) -> String {
    format!("{:+}", weight)
}
