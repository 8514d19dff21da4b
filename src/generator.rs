use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::{Bucket, IssueClassifier};
use crate::client::JiraClient;
use crate::error::Result;
use crate::impact::ImpactAssessor;
use crate::models::Board;
use crate::policy::ReportPolicy;
use crate::report::{self, RenderOptions, ReportContext, ReportEntry};
use crate::snapshot::IssueSnapshot;
use crate::window::ReportWindow;

/// 区分ごとの件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BucketCounts {
    pub started: usize,
    pub completed: usize,
    pub blocked: usize,
    pub other: usize,
}

impl BucketCounts {
    fn add(&mut self, bucket: Bucket) {
        match bucket {
            Bucket::Started => self.started += 1,
            Bucket::Completed => self.completed += 1,
            Bucket::Blocked => self.blocked += 1,
            Bucket::Other => self.other += 1,
        }
    }
}

/// 生成済みの週次レポート
#[derive(Debug, Clone)]
pub struct WeeklyReport {
    pub board: Board,
    pub counts: BucketCounts,
    pub markdown: String,
    /// 壊れていて読み飛ばした課題レコードの数
    pub skipped: usize,
}

/// 取得 → 分類 → 評価 → 描画を行う
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    client: JiraClient,
    classifier: IssueClassifier,
    assessor: ImpactAssessor,
}

impl ReportGenerator {
    pub fn new(client: JiraClient, policy: ReportPolicy) -> Self {
        Self {
            client,
            classifier: IssueClassifier::new(policy.status.clone()),
            assessor: ImpactAssessor::new(policy.impact, policy.status),
        }
    }

    pub async fn generate(
        &self,
        board_id: u64,
        window: &ReportWindow,
        options: &RenderOptions,
    ) -> Result<WeeklyReport> {
        let board = self.resolve_board(board_id).await?;
        let fetched = self.client.fetch_issues_for_board(board_id, window).await?;
        info!(
            board_id,
            board = %board.name,
            issues = fetched.issues.len(),
            strategy = fetched.strategy,
            "generating weekly report"
        );

        let ctx = ReportContext {
            board_name: board.name.clone(),
            base_url: self.client.config().base_url.clone(),
            window: *window,
        };
        let (markdown, counts) = self.compose(&ctx, fetched.issues, options)?;

        Ok(WeeklyReport {
            board,
            counts,
            markdown,
            skipped: fetched.skipped,
        })
    }

    /// ボード名を解決（参照できない場合は `Board <id>`）
    async fn resolve_board(&self, board_id: u64) -> Result<Board> {
        match self.client.get_board(board_id).await {
            Ok(board) => Ok(board),
            Err(e) if e.is_endpoint_unavailable() => {
                warn!(board_id, error = %e, "board lookup unavailable, using placeholder name");
                Ok(Board {
                    id: board_id,
                    name: format!("Board {}", board_id),
                    board_type: "unknown".to_string(),
                    location: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// 取得済みの課題からレポートを組み立てる
    pub fn compose(
        &self,
        ctx: &ReportContext,
        issues: Vec<IssueSnapshot>,
        options: &RenderOptions,
    ) -> Result<(String, BucketCounts)> {
        let mut counts = BucketCounts::default();
        let entries: Vec<ReportEntry> = issues
            .into_iter()
            .map(|issue| {
                let bucket = self.classifier.classify(&issue, &ctx.window);
                counts.add(bucket);
                let rating = options
                    .include_summary
                    .then(|| self.assessor.assess(&issue, ctx.window.end));
                ReportEntry { issue, bucket, rating }
            })
            .filter(|entry| options.include_other || entry.bucket != Bucket::Other)
            .collect();

        let markdown = report::render(ctx, &entries, options)?;
        Ok((markdown, counts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Auth, JiraConfig};
    use crate::policy::ImpactPolicy;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 8, 12, 0, 0).unwrap()
    }

    fn generator() -> ReportGenerator {
        let config = JiraConfig::new(
            "https://jira.example.com",
            Auth::Bearer { token: "t".to_string() },
        )
        .unwrap();
        let policy = ReportPolicy {
            impact: ImpactPolicy {
                critical_components: vec!["Payments".to_string()],
                ..ImpactPolicy::default()
            },
            ..ReportPolicy::default()
        };
        ReportGenerator::new(JiraClient::new(config).unwrap(), policy)
    }

    fn ctx() -> ReportContext {
        ReportContext {
            board_name: "Payments".to_string(),
            base_url: "https://jira.example.com".to_string(),
            window: ReportWindow::ending_at(now(), 7).unwrap(),
        }
    }

    fn snapshot(key: &str, status: &str, category: &str, updated_days_ago: i64) -> IssueSnapshot {
        IssueSnapshot {
            key: key.to_string(),
            summary: format!("Work on {}", key),
            description: String::new(),
            status: status.to_string(),
            status_category: Some(category.to_string()),
            priority: Some("Medium".to_string()),
            assignee: None,
            issue_type: None,
            components: Vec::new(),
            labels: Vec::new(),
            created: now() - Duration::days(40),
            updated: now() - Duration::days(updated_days_ago),
            resolved: None,
            transitions: Vec::new(),
            comments: Vec::new(),
        }
    }

    #[test]
    fn test_compose_counts_and_excludes_other() {
        // Given: 各区分の課題
        let issues = vec![
            snapshot("PAY-1", "In Progress", "indeterminate", 1),
            snapshot("PAY-2", "Done", "done", 2),
            snapshot("PAY-3", "Blocked", "indeterminate", 30),
            snapshot("PAY-4", "To Do", "new", 20),
        ];

        // When
        let (markdown, counts) = generator()
            .compose(&ctx(), issues, &RenderOptions::default())
            .unwrap();

        // Then: 件数は全件、Otherは既定で出力されない
        assert_eq!(
            counts,
            BucketCounts { started: 1, completed: 1, blocked: 1, other: 1 }
        );
        assert!(markdown.contains("[PAY-1]"));
        assert!(markdown.contains("[PAY-2]"));
        assert!(markdown.contains("[PAY-3]"));
        assert!(!markdown.contains("[PAY-4]"));
    }

    #[test]
    fn test_compose_with_include_other() {
        let issues = vec![snapshot("PAY-4", "To Do", "new", 20)];
        let options = RenderOptions {
            include_other: true,
            ..RenderOptions::default()
        };

        let (markdown, _) = generator().compose(&ctx(), issues, &options).unwrap();

        assert!(markdown.contains("## Other"));
        assert!(markdown.contains("[PAY-4]"));
    }

    #[test]
    fn test_compose_without_summary_skips_assessment() {
        let mut issue = snapshot("PAY-5", "In Progress", "indeterminate", 1);
        issue.components = vec!["Payments".to_string()];
        let options = RenderOptions {
            include_summary: false,
            ..RenderOptions::default()
        };

        let (markdown, _) = generator().compose(&ctx(), vec![issue], &options).unwrap();

        assert!(markdown.contains("[PAY-5]"));
        assert!(!markdown.contains("**Impact:**"));
    }
}
