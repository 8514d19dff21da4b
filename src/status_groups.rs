use std::fmt::Write;

use crate::snapshot::IssueSnapshot;

pub const DEFAULT_DISPLAY_STATUSES: &[&str] = &["In Progress", "In Review", "Done"];
const EXTRA_STATUSES: &[&str] = &["To Do", "New", "Open"];
const OTHER_GROUP: &str = "Other";
const SUMMARY_WIDTH: usize = 60;

/// ステータス別の課題グループ
#[derive(Debug, Clone)]
pub struct StatusGroup<'a> {
    pub status: String,
    pub issues: Vec<&'a IssueSnapshot>,
}

/// 表示するステータスに一般的な未着手ステータスを加えた一覧
pub fn grouping_statuses(display: &[String]) -> Vec<String> {
    let mut statuses = display.to_vec();
    for extra in EXTRA_STATUSES {
        if !statuses.iter().any(|s| s.eq_ignore_ascii_case(extra)) {
            statuses.push(extra.to_string());
        }
    }
    statuses
}

/// 最初に一致したステータスでグループ化（大文字小文字を無視し、どちら向きの部分一致も可）
///
/// 一致しない課題は `Other` に入る。空のグループは返さない。
pub fn group_by_status<'a>(issues: &'a [IssueSnapshot], statuses: &[String]) -> Vec<StatusGroup<'a>> {
    let mut groups: Vec<StatusGroup<'a>> = statuses
        .iter()
        .map(|s| StatusGroup {
            status: s.clone(),
            issues: Vec::new(),
        })
        .chain(std::iter::once(StatusGroup {
            status: OTHER_GROUP.to_string(),
            issues: Vec::new(),
        }))
        .collect();
    let other_index = groups.len() - 1;

    for issue in issues {
        let actual = issue.status.to_lowercase();
        let index = statuses
            .iter()
            .position(|s| {
                let wanted = s.to_lowercase();
                actual.contains(&wanted) || wanted.contains(&actual)
            })
            .unwrap_or(other_index);
        groups[index].issues.push(issue);
    }

    groups.retain(|g| !g.issues.is_empty());
    groups
}

/// 端末表示用に整形
pub fn format_status_groups(board_id: u64, groups: &[StatusGroup<'_>], display: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Board Issues (ID: {})", board_id);
    let _ = writeln!(out, "{}", "=".repeat(80));

    if groups.is_empty() {
        let _ = writeln!(out, "No issues found for this board.");
        return out;
    }

    for group in groups.iter().filter(|g| display.contains(&g.status)) {
        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({} issues)", group.status.to_uppercase(), group.issues.len());
        let _ = writeln!(out, "{}", "-".repeat(60));
        for issue in &group.issues {
            let _ = writeln!(out, "  * {}: {}", issue.key, shorten(&issue.summary, SUMMARY_WIDTH));
            let _ = writeln!(
                out,
                "    {} | {} | {}",
                issue.assignee.as_deref().unwrap_or("Unassigned"),
                issue.issue_type.as_deref().unwrap_or("Unknown"),
                issue.priority.as_deref().unwrap_or("Unknown")
            );
        }
    }

    let others: Vec<&StatusGroup<'_>> = groups.iter().filter(|g| !display.contains(&g.status)).collect();
    if !others.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "OTHER STATUSES");
        let _ = writeln!(out, "{}", "-".repeat(60));
        for group in others {
            let _ = writeln!(out, "  {}: {} issues", group.status, group.issues.len());
        }
    }

    out
}

fn shorten(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(width - 3).collect::<String>())
    }
}
