use serde::{Deserialize, Serialize};
use std::fmt;

use crate::policy::{StatusClass, StatusMapping};
use crate::snapshot::IssueSnapshot;
use crate::window::ReportWindow;

/// レポート上の区分（課題ごとに必ず1つ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bucket {
    Started,
    Completed,
    Blocked,
    Other,
}

impl Bucket {
    pub fn title(self) -> &'static str {
        match self {
            Bucket::Started => "Started",
            Bucket::Completed => "Completed",
            Bucket::Blocked => "Blocked / Off-track",
            Bucket::Other => "Other",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// 課題を期間内の動きで分類する
///
/// ブロック状態は期間内の完了より優先される。
#[derive(Debug, Clone, Default)]
pub struct IssueClassifier {
    mapping: StatusMapping,
}

impl IssueClassifier {
    pub fn new(mapping: StatusMapping) -> Self {
        Self { mapping }
    }

    pub fn classify(&self, issue: &IssueSnapshot, window: &ReportWindow) -> Bucket {
        if self.mapping.is_blocked_status(&issue.status) || self.mapping.has_blocked_label(&issue.labels) {
            return Bucket::Blocked;
        }

        if issue.has_history() {
            self.classify_by_history(issue, window)
        } else {
            self.classify_by_timestamps(issue, window)
        }
    }

    fn classify_by_history(&self, issue: &IssueSnapshot, window: &ReportWindow) -> Bucket {
        // 遷移先が現在のステータスならJiraのカテゴリも判定に使える
        let class_of_target = |to: &str| {
            if to.trim().eq_ignore_ascii_case(issue.status.trim()) {
                Some(self.mapping.current_class(&issue.status, issue.status_category.as_deref()))
            } else {
                self.mapping.class_of_name(to)
            }
        };
        let moved_into = |class: StatusClass| {
            issue
                .transitions
                .iter()
                .filter(|t| window.contains(t.at))
                .any(|t| class_of_target(&t.to) == Some(class))
        };

        if moved_into(StatusClass::Done) {
            Bucket::Completed
        } else if moved_into(StatusClass::InProgress) {
            Bucket::Started
        } else {
            Bucket::Other
        }
    }

    fn classify_by_timestamps(&self, issue: &IssueSnapshot, window: &ReportWindow) -> Bucket {
        match self
            .mapping
            .current_class(&issue.status, issue.status_category.as_deref())
        {
            StatusClass::Done
                if issue.resolved.is_some_and(|at| window.contains(at))
                    || window.contains(issue.updated) =>
            {
                Bucket::Completed
            }
            StatusClass::InProgress if window.contains(issue.updated) => Bucket::Started,
            _ => Bucket::Other,
        }
    }
}
