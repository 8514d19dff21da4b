use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::client::JiraConfig;
use crate::error::{Error, Result};
use crate::models::Board;
use crate::policy::ReportPolicy;

/// 設定の保存先の抽象化トレイト
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// 接続設定と選択中のボード・プロジェクトを保存
    async fn save_settings(&mut self, settings: &Settings) -> Result<()>;

    /// 接続設定を読み込み（未設定ならNone）
    async fn load_settings(&self) -> Result<Option<Settings>>;

    /// レポートポリシーを保存
    async fn save_policy(&mut self, policy: &ReportPolicy) -> Result<()>;

    /// レポートポリシーを読み込み（ファイルがなければ既定値）
    async fn load_policy(&self) -> Result<ReportPolicy>;

    /// 設定ストアを初期化
    async fn initialize(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedProject {
    pub key: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedBoard {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub board_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_key: Option<String>,
}

impl From<&Board> for SelectedBoard {
    fn from(board: &Board) -> Self {
        Self {
            id: board.id,
            name: board.name.clone(),
            board_type: board.board_type.clone(),
            project_key: board.project_key().map(str::to_string),
        }
    }
}

/// `jira_config.json` の内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(flatten)]
    pub jira: JiraConfig,
    #[serde(default)]
    pub selected_projects: Vec<SelectedProject>,
    #[serde(default)]
    pub selected_boards: Vec<SelectedBoard>,
}

impl Settings {
    pub fn new(jira: JiraConfig) -> Self {
        Self {
            jira,
            selected_projects: Vec::new(),
            selected_boards: Vec::new(),
        }
    }

    /// ボードを追加（同じIDがあれば置き換え）。新規ならtrue
    pub fn add_board(&mut self, board: SelectedBoard) -> bool {
        if let Some(project_key) = &board.project_key {
            if !self.selected_projects.iter().any(|p| &p.key == project_key) {
                self.selected_projects.push(SelectedProject {
                    key: project_key.clone(),
                    name: String::new(),
                });
            }
        }

        match self.selected_boards.iter_mut().find(|b| b.id == board.id) {
            Some(existing) => {
                *existing = board;
                false
            }
            None => {
                self.selected_boards.push(board);
                true
            }
        }
    }

    pub fn board(&self, id: u64) -> Option<&SelectedBoard> {
        self.selected_boards.iter().find(|b| b.id == id)
    }

    pub fn board_ids(&self) -> Vec<u64> {
        self.selected_boards.iter().map(|b| b.id).collect()
    }
}

/// JSON形式のファイルベース設定ストア
pub struct FileConfigStore {
    /// 設定ディレクトリのパス
    config_dir: PathBuf,
}

impl FileConfigStore {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// デフォルトの設定ディレクトリ（`<config_dir>/jira-report`）
    pub fn default_config_dir() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::ConfigurationMissing("config directory not found".to_string()))?
            .join("jira-report");

        Ok(Self::new(config_dir))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn settings_path(&self) -> PathBuf {
        self.config_dir.join("jira_config.json")
    }

    fn policy_path(&self) -> PathBuf {
        self.config_dir.join("report_policy.json")
    }
}

/// JSONファイルに書き込み
async fn write_json_file<T>(path: &Path, data: &T) -> Result<()>
where
    T: Serialize,
{
    // 親ディレクトリを作成
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let json_data = serde_json::to_string_pretty(data)
        .map_err(|e| Error::SerializationError(format!("JSON serialization failed: {}", e)))?;

    let mut file = fs::File::create(path).await?;
    file.write_all(json_data.as_bytes()).await?;
    file.sync_all().await?;

    Ok(())
}

/// JSONファイルの中身を読み込み（存在しない・空ならNone）
async fn read_file(path: &Path) -> Result<Option<String>> {
    if !fs::try_exists(path).await? {
        return Ok(None);
    }

    let mut file = fs::File::open(path).await?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).await?;

    if contents.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(contents))
}

/// 任意のパスからレポートポリシーを読み込み（`--policy`）
pub async fn load_policy_file(path: &Path) -> Result<ReportPolicy> {
    match read_file(path).await? {
        Some(contents) => ReportPolicy::from_json_str(&contents),
        None => Err(Error::ConfigurationMissing(format!(
            "policy file {} not found or empty",
            path.display()
        ))),
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn save_settings(&mut self, settings: &Settings) -> Result<()> {
        write_json_file(&self.settings_path(), settings).await
    }

    async fn load_settings(&self) -> Result<Option<Settings>> {
        match read_file(&self.settings_path()).await? {
            Some(contents) => serde_json::from_str(&contents).map(Some).map_err(|e| {
                Error::InvalidConfiguration(format!("jira_config.json: {}", e))
            }),
            None => Ok(None),
        }
    }

    async fn save_policy(&mut self, policy: &ReportPolicy) -> Result<()> {
        write_json_file(&self.policy_path(), policy).await
    }

    async fn load_policy(&self) -> Result<ReportPolicy> {
        match read_file(&self.policy_path()).await? {
            Some(contents) => ReportPolicy::from_json_str(&contents),
            None => Ok(ReportPolicy::default()),
        }
    }

    async fn initialize(&mut self) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiVersion, Auth};
    use tempfile::TempDir;

    async fn create_test_store() -> (FileConfigStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = FileConfigStore::new(temp_dir.path());
        (store, temp_dir)
    }

    fn create_test_settings() -> Settings {
        let jira = JiraConfig::new(
            "https://test.atlassian.net",
            Auth::Basic {
                username: "test@example.com".to_string(),
                api_token: "test-token".to_string(),
            },
        )
        .unwrap()
        .with_api_version(ApiVersion::V3);
        Settings::new(jira)
    }

    #[tokio::test]
    async fn test_file_config_store_initialize() {
        // Given: 存在しないサブディレクトリ
        let temp_dir = TempDir::new().unwrap();
        let mut store = FileConfigStore::new(temp_dir.path().join("nested"));

        // When
        store.initialize().await.unwrap();

        // Then: ディレクトリが作成される
        assert!(temp_dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_settings_save_and_load() {
        // Given: ボードを選択した設定
        let (mut store, _temp_dir) = create_test_store().await;
        store.initialize().await.unwrap();
        let mut settings = create_test_settings();
        settings.add_board(SelectedBoard {
            id: 42,
            name: "Team Board".to_string(),
            board_type: "kanban".to_string(),
            project_key: Some("TEAM".to_string()),
        });

        // When: 保存して読み込む
        store.save_settings(&settings).await.unwrap();
        let loaded = store.load_settings().await.unwrap();

        // Then: 同じ内容が復元される
        assert_eq!(loaded, Some(settings));
    }

    #[tokio::test]
    async fn test_load_settings_when_missing() {
        let (store, _temp_dir) = create_test_store().await;

        assert!(store.load_settings().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_settings_file_layout() {
        // 保存形式はフラットなキー（auth_method / selected_boards）
        let (mut store, temp_dir) = create_test_store().await;
        store.save_settings(&create_test_settings()).await.unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join("jira_config.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["base_url"], "https://test.atlassian.net");
        assert_eq!(value["auth_method"], "basic");
        assert_eq!(value["username"], "test@example.com");
        assert_eq!(value["api_version"], "v3");
        assert!(value["selected_boards"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_settings_keys_are_accepted() {
        // Given: 旧形式のキー（email / personal_token）
        let (store, temp_dir) = create_test_store().await;
        std::fs::write(
            temp_dir.path().join("jira_config.json"),
            r#"{
                "base_url": "https://jira.example.com",
                "auth_method": "token",
                "personal_token": "pat-1",
                "api_version": "v2",
                "selected_boards": [{"id": 7, "name": "Ops"}]
            }"#,
        )
        .unwrap();

        // When
        let settings = store.load_settings().await.unwrap().unwrap();

        // Then
        assert_eq!(settings.jira.auth, Auth::Bearer { token: "pat-1".to_string() });
        assert_eq!(settings.jira.api_version, Some(ApiVersion::V2));
        assert_eq!(settings.board_ids(), vec![7]);
    }

    #[tokio::test]
    async fn test_corrupt_settings_is_invalid_configuration() {
        let (store, temp_dir) = create_test_store().await;
        std::fs::write(temp_dir.path().join("jira_config.json"), "{not json").unwrap();

        let err = store.load_settings().await.unwrap_err();

        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_policy_defaults_when_missing_and_round_trips() {
        let (mut store, _temp_dir) = create_test_store().await;

        assert_eq!(store.load_policy().await.unwrap(), ReportPolicy::default());

        let mut policy = ReportPolicy::default();
        policy.impact.critical_components = vec!["Payments".to_string()];
        store.save_policy(&policy).await.unwrap();

        assert_eq!(store.load_policy().await.unwrap(), policy);
    }

    #[tokio::test]
    async fn test_load_policy_file_missing() {
        let temp_dir = TempDir::new().unwrap();

        let err = load_policy_file(&temp_dir.path().join("nope.json")).await.unwrap_err();

        assert!(matches!(err, Error::ConfigurationMissing(_)));
    }

    #[test]
    fn test_add_board_replaces_existing() {
        let mut settings = create_test_settings();
        let board = SelectedBoard {
            id: 1,
            name: "Old".to_string(),
            board_type: "scrum".to_string(),
            project_key: Some("CORE".to_string()),
        };

        assert!(settings.add_board(board.clone()));
        assert!(!settings.add_board(SelectedBoard {
            name: "New".to_string(),
            ..board
        }));

        assert_eq!(settings.selected_boards.len(), 1);
        assert_eq!(settings.board(1).unwrap().name, "New");
        assert_eq!(settings.selected_projects[0].key, "CORE");
    }
}
