pub mod batch;
pub mod board;
pub mod changelog_parser;
pub mod classifier;
pub mod client;
pub mod config_store;
pub mod error;
pub mod generator;
pub mod impact;
pub mod markup;
pub mod models;
pub mod policy;
pub mod report;
pub mod retry;
pub mod snapshot;
pub mod status_groups;
pub mod window;

pub use client::{ApiVersion, Auth, ConnectionStatus, JiraClient, JiraConfig};
pub use error::{Error, Result};
pub use models::*;

// Board retrieval re-exports
pub use board::{BoardIssueStrategy, BoardIssues, default_strategies, extract_project_key};

// Report pipeline re-exports
pub use classifier::{Bucket, IssueClassifier};
pub use generator::{BucketCounts, ReportGenerator, WeeklyReport};
pub use impact::{ImpactAssessor, ImpactLevel, ImpactRating};
pub use markup::normalize;
pub use policy::{ImpactPolicy, KeywordGroup, ReportPolicy, StatusClass, StatusMapping};
pub use report::{RenderOptions, ReportContext, ReportEntry, default_file_name, render};
pub use snapshot::{CommentSnapshot, IssueSnapshot};
pub use window::ReportWindow;

// Multi-board re-exports
pub use batch::{BatchResult, BoardOutcome, run_boards};

// Config store re-exports
pub use config_store::{ConfigStore, FileConfigStore, SelectedBoard, SelectedProject, Settings};

pub use changelog_parser::{ChangelogParser, StatusTransition};
pub use retry::{RateLimiter, RetryPolicy};
