//! ボード情報と課題の取得
//!
//! 課題取得はAgile API → GreenHopper → プロジェクト検索の順に試す。
//! 次の方法に進むのはエンドポイントが存在しない場合（404/405/501、HTML応答）
//! だけで、認証エラーなどはその場で返す。

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::client::JiraClient;
use crate::error::{Error, Result};
use crate::models::{Board, BoardLocation, SearchParams};
use crate::snapshot::{IssueSnapshot, snapshots_from_values};
use crate::window::ReportWindow;

const PAGE_SIZE: u32 = 100;
const KEY_CHUNK_SIZE: usize = 50;

static PROJECT_IN_FILTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)project\s*(?:=|in)\s*\(?['"]*([A-Z][A-Z0-9]*)"#).expect("valid regex")
});

/// フィルタークエリからプロジェクトキーを抽出
pub fn extract_project_key(query: &str) -> Option<String> {
    PROJECT_IN_FILTER
        .captures(query)
        .map(|caps| caps[1].to_uppercase())
}

/// ボードの課題を取得する方法
#[async_trait]
pub trait BoardIssueStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, client: &JiraClient, board_id: u64, window: &ReportWindow) -> Result<Vec<Value>>;
}

/// Agile REST API
pub struct AgileBoardStrategy;

#[async_trait]
impl BoardIssueStrategy for AgileBoardStrategy {
    fn name(&self) -> &'static str {
        "agile"
    }

    async fn fetch(&self, client: &JiraClient, board_id: u64, window: &ReportWindow) -> Result<Vec<Value>> {
        let params = SearchParams::for_report(PAGE_SIZE);
        client
            .get_all_board_issues(board_id, &params, Some(&window.to_jql_condition()))
            .await
    }
}

/// GreenHopper（旧Jira Server）のボードデータからキーを取り、検索で詳細を読む
pub struct GreenHopperStrategy;

#[async_trait]
impl BoardIssueStrategy for GreenHopperStrategy {
    fn name(&self) -> &'static str {
        "greenhopper"
    }

    async fn fetch(&self, client: &JiraClient, board_id: u64, window: &ReportWindow) -> Result<Vec<Value>> {
        let keys = client.get_xboard_issue_keys(board_id).await?;
        debug!(board_id, count = keys.len(), "greenhopper returned issue keys");

        let params = SearchParams::for_report(PAGE_SIZE);
        let mut issues = Vec::new();
        for chunk in keys.chunks(KEY_CHUNK_SIZE) {
            let jql = format!("key in ({}) AND {}", chunk.join(", "), window.to_jql_condition());
            issues.extend(client.search_all(&jql, &params).await?);
        }
        Ok(issues)
    }
}

/// ボードのプロジェクトを特定してJQL検索
pub struct ProjectSearchStrategy;

#[async_trait]
impl BoardIssueStrategy for ProjectSearchStrategy {
    fn name(&self) -> &'static str {
        "project-search"
    }

    async fn fetch(&self, client: &JiraClient, board_id: u64, window: &ReportWindow) -> Result<Vec<Value>> {
        let board = client.get_board(board_id).await?;
        let project_key = board
            .project_key()
            .ok_or_else(|| Error::NotFound(format!("project for board {}", board_id)))?
            .to_string();

        let jql = format!(
            "project = \"{}\" AND {} ORDER BY updated DESC",
            project_key,
            window.to_jql_condition()
        );
        client.search_all(&jql, &SearchParams::for_report(PAGE_SIZE)).await
    }
}

/// 既定の取得順
pub fn default_strategies() -> Vec<Box<dyn BoardIssueStrategy>> {
    vec![
        Box::new(AgileBoardStrategy),
        Box::new(GreenHopperStrategy),
        Box::new(ProjectSearchStrategy),
    ]
}

/// 取得結果（壊れたレコードを除いた課題と、その件数）
#[derive(Debug, Clone)]
pub struct BoardIssues {
    pub issues: Vec<IssueSnapshot>,
    pub skipped: usize,
    pub strategy: &'static str,
}

/// 取得方法を順に試し、最初に成功した結果を返す
pub async fn fetch_with_strategies(
    client: &JiraClient,
    board_id: u64,
    window: &ReportWindow,
    strategies: &[Box<dyn BoardIssueStrategy>],
) -> Result<(Vec<Value>, &'static str)> {
    for strategy in strategies {
        match strategy.fetch(client, board_id, window).await {
            Ok(values) => {
                info!(board_id, strategy = strategy.name(), count = values.len(), "fetched board issues");
                return Ok((values, strategy.name()));
            }
            Err(e) if e.is_endpoint_unavailable() => {
                warn!(board_id, strategy = strategy.name(), error = %e, "board issue endpoint unavailable, trying next");
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::NotFound(format!("board {}", board_id)))
}

impl JiraClient {
    /// ボード情報を取得（Agile API、なければGreenHopper）
    pub async fn get_board(&self, board_id: u64) -> Result<Board> {
        match self.get_agile_board(board_id).await {
            Ok(board) => return Ok(board),
            Err(e) if e.is_endpoint_unavailable() => {
                debug!(board_id, error = %e, "agile board lookup unavailable, trying greenhopper");
            }
            Err(e) => return Err(e),
        }

        match self.get_rapid_view(board_id).await {
            Ok(view) => {
                let project_key = view.filter.as_ref().and_then(|f| extract_project_key(&f.query));
                Ok(Board {
                    id: view.id,
                    name: view.name,
                    board_type: if view.sprint_support_enabled { "scrum" } else { "kanban" }.to_string(),
                    location: project_key.map(|key| BoardLocation {
                        project_key: Some(key),
                        project_name: None,
                    }),
                })
            }
            Err(e) if e.is_endpoint_unavailable() => Err(Error::NotFound(format!("board {}", board_id))),
            Err(e) => Err(e),
        }
    }

    /// ボードの課題を期間で絞り込んで取得
    pub async fn fetch_issues_for_board(&self, board_id: u64, window: &ReportWindow) -> Result<BoardIssues> {
        let (values, strategy) = fetch_with_strategies(self, board_id, window, &default_strategies()).await?;
        let (issues, skipped) = snapshots_from_values(values);
        if skipped > 0 {
            warn!(board_id, skipped, "skipped malformed issue records");
        }
        Ok(BoardIssues { issues, skipped, strategy })
    }
}
