//! 週次レポートのMarkdown生成
//!
//! 描画は純粋関数で、生成日時にはレポート期間の終了時刻を使う。

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::fmt::Write;

use crate::classifier::Bucket;
use crate::error::{Error, Result};
use crate::impact::ImpactRating;
use crate::markup;
use crate::policy::RenderDefaults;
use crate::snapshot::IssueSnapshot;
use crate::window::ReportWindow;

const EMPTY_SECTION: &str = "*No items for this period.*";

#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    /// falseの場合は影響度を評価・表示しない
    pub include_summary: bool,
    pub include_other: bool,
    pub max_description_chars: Option<usize>,
    pub max_comments: usize,
    pub max_comment_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_defaults(&RenderDefaults::default())
    }
}

impl RenderOptions {
    pub fn from_defaults(defaults: &RenderDefaults) -> Self {
        Self {
            include_summary: true,
            include_other: false,
            max_description_chars: defaults.max_description_chars,
            max_comments: defaults.max_comments,
            max_comment_chars: defaults.max_comment_chars,
        }
    }
}

/// レポートのヘッダー情報
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub board_name: String,
    pub base_url: String,
    pub window: ReportWindow,
}

/// 分類済みの課題1件
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub issue: IssueSnapshot,
    pub bucket: Bucket,
    pub rating: Option<ImpactRating>,
}

/// 評価の高い順、更新の新しい順、キーの自然順
pub fn compare_entries(a: &ReportEntry, b: &ReportEntry) -> Ordering {
    let level = |e: &ReportEntry| e.rating.as_ref().map(|r| r.level);
    level(b)
        .cmp(&level(a))
        .then_with(|| b.issue.updated.cmp(&a.issue.updated))
        .then_with(|| compare_keys(&a.issue.key, &b.issue.key))
}

/// `ABC-12` 形式のキーをプロジェクト部分と番号で比較
pub fn compare_keys(a: &str, b: &str) -> Ordering {
    fn split(key: &str) -> (&str, Option<u64>) {
        match key.rsplit_once('-') {
            Some((project, number)) => (project, number.parse().ok()),
            None => (key, None),
        }
    }

    let (pa, na) = split(a);
    let (pb, nb) = split(b);
    pa.cmp(pb)
        .then_with(|| match (na, nb) {
            (Some(x), Some(y)) => x.cmp(&y),
            // 番号付きのキーを先に並べる
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.cmp(b))
}

/// Markdownのレポートを生成
pub fn render(ctx: &ReportContext, entries: &[ReportEntry], options: &RenderOptions) -> Result<String> {
    write_report(ctx, entries, options).map_err(|e| Error::Render(e.to_string()))
}

fn write_report(
    ctx: &ReportContext,
    entries: &[ReportEntry],
    options: &RenderOptions,
) -> std::result::Result<String, std::fmt::Error> {
    let mut out = String::new();
    let window = &ctx.window;

    writeln!(out, "# Weekly Status Report")?;
    writeln!(out, "**Board:** {}  ", ctx.board_name)?;
    writeln!(
        out,
        "**Period:** {} - {}  ",
        window.start.format("%B %d, %Y"),
        window.end.format("%B %d, %Y")
    )?;
    writeln!(out, "**Generated:** {}  ", window.end.format("%Y-%m-%d %H:%M UTC"))?;
    if options.include_summary {
        writeln!(out, "*Note: Business impact ratings included for each issue.*")?;
    }
    writeln!(out)?;
    writeln!(out, "---")?;

    let mut sections = vec![
        (Bucket::Started, "Work started during the period"),
        (Bucket::Completed, "Work completed during the period"),
        (Bucket::Blocked, "Work blocked or off-track"),
    ];
    if options.include_other {
        sections.push((Bucket::Other, "Other activity on the board"));
    }

    for (bucket, caption) in sections {
        writeln!(out)?;
        writeln!(out, "## {}", bucket.title())?;
        writeln!(out, "*{}*", caption)?;
        writeln!(out)?;

        let mut items: Vec<&ReportEntry> = entries.iter().filter(|e| e.bucket == bucket).collect();
        items.sort_by(|a, b| compare_entries(a, b));

        if items.is_empty() {
            writeln!(out, "{}", EMPTY_SECTION)?;
        }
        for entry in items {
            write_entry(&mut out, ctx, entry, options)?;
        }

        writeln!(out)?;
        writeln!(out, "---")?;
    }

    writeln!(out)?;
    writeln!(out, "## Risks")?;
    writeln!(out, "*Manager assessment of any risks and mitigation steps*")?;
    writeln!(out)?;
    writeln!(out, "- **Risk 1:** [Describe risk]")?;
    writeln!(out, "  - *Mitigation:* [Describe mitigation steps]")?;
    writeln!(out, "- **Risk 2:** [Describe risk]")?;
    writeln!(out, "  - *Mitigation:* [Describe mitigation steps]")?;
    writeln!(out)?;
    writeln!(out, "---")?;
    writeln!(out)?;
    writeln!(
        out,
        "*Report generated on {} by jira-report*",
        window.end.format("%Y-%m-%d %H:%M:%S UTC")
    )?;

    Ok(out)
}

fn write_entry(
    out: &mut String,
    ctx: &ReportContext,
    entry: &ReportEntry,
    options: &RenderOptions,
) -> std::fmt::Result {
    let issue = &entry.issue;

    writeln!(
        out,
        "### [{}]({}): {}",
        issue.key,
        browse_url(&ctx.base_url, &issue.key),
        issue.summary
    )?;

    let mut meta = vec![
        format!("**Status:** {}", issue.status),
        format!("**Priority:** {}", issue.priority.as_deref().unwrap_or("None")),
        format!("**Assignee:** {}", issue.assignee.as_deref().unwrap_or("Unassigned")),
    ];
    if !issue.components.is_empty() {
        meta.push(format!("**Components:** {}", issue.components.join(", ")));
    }
    writeln!(out, "{}", meta.join(" | "))?;

    if options.include_summary {
        if let Some(rating) = &entry.rating {
            writeln!(
                out,
                "**Impact:** {} **{}** (score {}): {}",
                rating.level.badge(),
                rating.level.label(),
                rating.score,
                rating.rationale()
            )?;
        }
    }

    let description = markup::normalize(&issue.description);
    if !description.is_empty() {
        let description = match options.max_description_chars {
            Some(limit) => truncate(&description, limit),
            None => description,
        };
        writeln!(out)?;
        writeln!(out, "**Description:**")?;
        for line in description.lines() {
            if line.is_empty() {
                writeln!(out, ">")?;
            } else {
                writeln!(out, "> {}", line)?;
            }
        }
    }

    let comments: Vec<_> = issue.recent_comments(options.max_comments).collect();
    if !comments.is_empty() {
        writeln!(out)?;
        writeln!(out, "**Recent comments:**")?;
        for comment in comments {
            let body = markup::normalize(&comment.body)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(
                out,
                "- **{}** ({}): {}",
                comment.author,
                comment.created.format("%Y-%m-%d"),
                truncate(&body, options.max_comment_chars)
            )?;
        }
    }

    writeln!(out)
}

/// 課題のブラウザURL
pub fn browse_url(base_url: &str, issue_key: &str) -> String {
    format!("{}/browse/{}", base_url, urlencoding::encode(issue_key))
}

/// 文字数で切り詰め、末尾に `...` を付ける
fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit < 3 {
        return text.chars().take(limit).collect();
    }
    let kept: String = text.chars().take(limit - 3).collect();
    format!("{}...", kept.trim_end())
}

/// 既定の出力ファイル名 `Weekly_Report_<board>_<YYYY-MM-DD>.md`
pub fn default_file_name(board_name: &str, date: NaiveDate) -> String {
    let mut slug = String::new();
    for c in board_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "Board" } else { slug };
    format!("Weekly_Report_{}_{}.md", slug, date.format("%Y-%m-%d"))
}
