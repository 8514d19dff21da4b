use crate::models::{Changelog, HistoryItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ステータス変更1件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub at: DateTime<Utc>,
    pub from: Option<String>,
    pub to: String,
    pub author: Option<String>,
}

/// JIRAのchangelogからステータス遷移を取り出すパーサー
pub struct ChangelogParser;

impl ChangelogParser {
    /// ステータス変更のみを時刻順に抽出
    ///
    /// 同一時刻の変更はchangelog内の順序を保つ。
    pub fn status_transitions(changelog: &Changelog) -> Vec<StatusTransition> {
        let mut transitions: Vec<StatusTransition> = changelog
            .histories
            .iter()
            .flat_map(|history| {
                let author = history.author.as_ref().map(|a| a.label());
                history
                    .items
                    .iter()
                    .filter(|item| Self::is_status_item(item))
                    .filter_map(move |item| {
                        let to = item.to_string.as_deref()?.trim();
                        if to.is_empty() {
                            return None;
                        }
                        Some(StatusTransition {
                            at: history.created,
                            from: item
                                .from_string
                                .as_deref()
                                .map(str::trim)
                                .filter(|s| !s.is_empty())
                                .map(str::to_string),
                            to: to.to_string(),
                            author: author.clone(),
                        })
                    })
            })
            .collect();

        // Vec::sort_by_keyは安定ソート
        transitions.sort_by_key(|t| t.at);
        transitions
    }

    /// changelogが全件を含んでいない（ページングされている）かどうか
    pub fn is_truncated(changelog: &Changelog) -> bool {
        (changelog.histories.len() as u32) < changelog.total
    }

    fn is_status_item(item: &HistoryItem) -> bool {
        item.field.eq_ignore_ascii_case("status")
    }
}
