/// 週次レポートのエンドツーエンドテスト
///
/// モックしたJiraサーバーに対して、取得 → 分類 → 影響度評価 → Markdown生成
/// までを通しで実行します。
///
/// ```
/// cargo test --test end_to_end_tests
/// ```
use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jira_report::{
    Auth, ImpactPolicy, JiraClient, JiraConfig, RenderOptions, ReportGenerator, ReportPolicy,
    ReportWindow, RetryPolicy,
};

fn mock_client(uri: String) -> JiraClient {
    let config = JiraConfig::new(
        uri,
        Auth::Basic {
            username: "lead@example.com".to_string(),
            api_token: "mock-api-token".to_string(),
        },
    )
    .unwrap();
    JiraClient::new(config)
        .unwrap()
        .with_retry_policy(RetryPolicy::no_retry())
}

fn payments_policy() -> ReportPolicy {
    ReportPolicy {
        impact: ImpactPolicy {
            critical_components: vec!["Payments".to_string()],
            ..ImpactPolicy::default()
        },
        ..ReportPolicy::default()
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

/// 2日前に着手された最優先の課題（重要コンポーネント）
fn started_issue(now: DateTime<Utc>) -> Value {
    json!({
        "key": "PAY-101",
        "fields": {
            "summary": "Migrate settlement batch to the new ledger",
            "description": "Move the nightly job.\n\n*Owner:* [Settlement docs|https://wiki.example.com/settle]",
            "status": {"name": "In Progress", "statusCategory": {"key": "indeterminate"}},
            "priority": {"name": "Highest"},
            "issuetype": {"name": "Story"},
            "assignee": {"displayName": "Aiko Tanaka"},
            "components": [{"name": "Payments"}],
            "labels": [],
            "created": ts(now - Duration::days(10)),
            "updated": ts(now - Duration::days(2)),
            "comment": {
                "comments": [{
                    "author": {"displayName": "Ben Ortiz"},
                    "body": "Dry run finished on staging",
                    "created": ts(now - Duration::days(1))
                }]
            }
        },
        "changelog": {
            "histories": [{
                "created": ts(now - Duration::days(2)),
                "items": [{"field": "status", "fromString": "To Do", "toString": "In Progress"}]
            }]
        }
    })
}

/// 20日前から更新のない未着手の課題（履歴なし）
fn idle_issue(now: DateTime<Utc>) -> Value {
    json!({
        "key": "PAY-7",
        "fields": {
            "summary": "Tidy settlement reports",
            "status": {"name": "To Do", "statusCategory": {"key": "new"}},
            "priority": {"name": "Low"},
            "created": ts(now - Duration::days(40)),
            "updated": ts(now - Duration::days(20))
        }
    })
}

async fn mount_board(server: &MockServer, issues: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board/12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 12,
            "name": "Payments Team",
            "type": "kanban",
            "location": {"projectKey": "PAY"}
        })))
        .mount(server)
        .await;

    let total = issues.len();
    Mock::given(method("GET"))
        .and(path("/rest/agile/1.0/board/12/issue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "startAt": 0,
            "maxResults": 100,
            "total": total,
            "issues": issues
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_started_critical_issue_is_rated_high() {
    // Given: 2日前に着手された最優先・重要コンポーネントの課題
    let now = Utc::now();
    let server = MockServer::start().await;
    mount_board(&server, vec![started_issue(now)]).await;

    let generator = ReportGenerator::new(mock_client(server.uri()), payments_policy());
    let window = ReportWindow::ending_at(now, 7).unwrap();

    // When: 週次レポートを生成
    let report = generator
        .generate(12, &window, &RenderOptions::default())
        .await
        .unwrap();

    // Then: Startedに分類され、HIGHの評価と根拠が付く
    assert_eq!(report.board.name, "Payments Team");
    assert_eq!(report.counts.started, 1);
    assert_eq!(report.skipped, 0);

    let md = &report.markdown;
    let started = md.find("## Started").unwrap();
    let completed = md.find("## Completed").unwrap();
    let entry = md.find("### [PAY-101]").unwrap();
    assert!(started < entry && entry < completed);

    let impact_line = md.lines().find(|l| l.starts_with("**Impact:**")).unwrap();
    assert!(impact_line.contains("HIGH"));
    assert!(impact_line.contains("priority"));
    assert!(impact_line.contains("critical component"));

    // 説明文のwikiマークアップは除去されている
    assert!(md.contains("> Owner: Settlement docs (https://wiki.example.com/settle)"));
    assert!(md.contains("- **Ben Ortiz**"));
}

#[tokio::test]
async fn test_idle_issue_is_left_out_of_weekly_report() {
    // Given: 20日更新のないTo Doの課題と、今週着手された課題
    let now = Utc::now();
    let server = MockServer::start().await;
    mount_board(&server, vec![idle_issue(now), started_issue(now)]).await;

    let generator = ReportGenerator::new(mock_client(server.uri()), payments_policy());
    let window = ReportWindow::ending_at(now, 7).unwrap();

    // When
    let report = generator
        .generate(12, &window, &RenderOptions::default())
        .await
        .unwrap();

    // Then: Otherに分類され、既定ではレポートに現れない
    assert_eq!(report.counts.other, 1);
    assert_eq!(report.counts.started, 1);
    assert!(!report.markdown.contains("PAY-7"));
    assert!(!report.markdown.contains("## Other"));
}

#[tokio::test]
async fn test_include_other_lists_idle_issue() {
    let now = Utc::now();
    let server = MockServer::start().await;
    mount_board(&server, vec![idle_issue(now)]).await;

    let generator = ReportGenerator::new(mock_client(server.uri()), payments_policy());
    let window = ReportWindow::ending_at(now, 7).unwrap();
    let options = RenderOptions {
        include_other: true,
        ..RenderOptions::default()
    };

    let report = generator.generate(12, &window, &options).await.unwrap();

    let md = &report.markdown;
    assert!(md.find("## Other").unwrap() < md.find("[PAY-7]").unwrap());
    assert!(md.contains("*No items for this period.*"));
}

#[tokio::test]
async fn test_no_summary_report_has_no_badges() {
    // Given
    let now = Utc::now();
    let server = MockServer::start().await;
    mount_board(&server, vec![started_issue(now)]).await;

    let generator = ReportGenerator::new(mock_client(server.uri()), payments_policy());
    let window = ReportWindow::ending_at(now, 7).unwrap();
    let options = RenderOptions {
        include_summary: false,
        ..RenderOptions::default()
    };

    // When
    let report = generator.generate(12, &window, &options).await.unwrap();

    // Then: 評価の行も注記も出力されない
    assert!(report.markdown.contains("[PAY-101]"));
    assert!(!report.markdown.contains("**Impact:**"));
    assert!(!report.markdown.contains("Business impact ratings"));
    for badge in ["🔴", "🟡", "🟢"] {
        assert!(!report.markdown.contains(badge));
    }
}

#[tokio::test]
async fn test_report_is_deterministic_for_same_input() {
    let now = Utc::now();
    let server = MockServer::start().await;
    mount_board(&server, vec![idle_issue(now), started_issue(now)]).await;

    let generator = ReportGenerator::new(mock_client(server.uri()), payments_policy());
    let window = ReportWindow::ending_at(now, 7).unwrap();
    let options = RenderOptions::default();

    let first = generator.generate(12, &window, &options).await.unwrap();
    let second = generator.generate(12, &window, &options).await.unwrap();

    assert_eq!(first.markdown, second.markdown);
}
