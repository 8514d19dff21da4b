//! jira-report - Weekly executive status reports from Jira boards.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use jira_report::config_store::load_policy_file;
use jira_report::status_groups::{
    DEFAULT_DISPLAY_STATUSES, format_status_groups, group_by_status, grouping_statuses,
};
use jira_report::{
    ApiVersion, Auth, ConfigStore, ConnectionStatus, Error, FileConfigStore, JiraClient,
    JiraConfig, RenderOptions, ReportGenerator, ReportPolicy, ReportWindow, SelectedBoard,
    Settings, WeeklyReport, default_file_name, run_boards,
};

#[derive(Parser)]
#[command(name = "jira-report")]
#[command(about = "Weekly executive status reports from Jira boards", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory (default: <config dir>/jira-report)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Report policy file overriding report_policy.json
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum ApiVersionArg {
    /// Jira Server / Data Center
    #[value(name = "v2", alias = "2")]
    V2,
    /// Jira Cloud
    #[value(name = "v3", alias = "3")]
    V3,
}

impl From<ApiVersionArg> for ApiVersion {
    fn from(arg: ApiVersionArg) -> Self {
        match arg {
            ApiVersionArg::V2 => ApiVersion::V2,
            ApiVersionArg::V3 => ApiVersion::V3,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Save connection settings after testing them
    Configure {
        /// Jira base URL
        #[arg(long)]
        url: String,

        /// Account email (basic auth)
        #[arg(long, requires = "token", conflicts_with = "pat")]
        email: Option<String>,

        /// API token or password (basic auth)
        #[arg(long, requires = "email")]
        token: Option<String>,

        /// Personal access token (bearer auth)
        #[arg(long, required_unless_present = "email")]
        pat: Option<String>,

        /// REST API version; detected when omitted
        #[arg(long, value_enum)]
        api_version: Option<ApiVersionArg>,
    },

    /// Test the Jira connection
    Test,

    /// Add a board by id to the selected boards
    AddBoard {
        /// Board id
        board_id: u64,
    },

    /// List selected projects and boards
    List,

    /// Generate the weekly status report
    WeeklyReport {
        /// Board id (default: first selected board)
        board_id: Option<u64>,

        /// Number of days back to analyze
        #[arg(long, default_value_t = 7)]
        days: u32,

        /// Output file (a directory with --all-boards)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip impact ratings
        #[arg(long)]
        no_summary: bool,

        /// Include issues outside the started/completed/blocked buckets
        #[arg(long)]
        include_other: bool,

        /// Truncate descriptions to N characters
        #[arg(long)]
        max_description: Option<usize>,

        /// Number of recent comments per issue
        #[arg(long)]
        comments: Option<usize>,

        /// Report on every selected board
        #[arg(long, conflicts_with = "board_id")]
        all_boards: bool,

        /// Boards processed at once (1-8)
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },

    /// Show board issues grouped by status
    BoardIssues {
        /// Board id (default: every selected board)
        board_id: Option<u64>,

        /// Statuses to show
        #[arg(long, num_args = 1.., default_values = ["In Progress", "In Review", "Done"])]
        status: Vec<String>,

        /// Number of days back to fetch
        #[arg(long, default_value_t = 30)]
        days: u32,
    },

    /// Show issues for all selected boards
    AllBoardIssues {
        /// Boards processed at once (1-8)
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Number of days back to fetch
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(EnvFilter::DEFAULT_ENV, cli.verbose))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        if let Some(err) = e.downcast_ref::<Error>() {
            eprintln!("Hint: {}", err.remedy());
        }
        std::process::exit(1);
    }
}

/// ログフィルタ（環境変数が設定されていればそちらを優先）
fn log_filter(env_var: &str, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(env_var).unwrap_or_else(|_| {
        let level = if verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        };
        EnvFilter::default().add_directive(level.into())
    })
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut store = match &cli.config_dir {
        Some(dir) => FileConfigStore::new(dir),
        None => FileConfigStore::default_config_dir()?,
    };
    debug!(config_dir = %store.config_dir().display(), "using config directory");

    match cli.command {
        Commands::Configure {
            url,
            email,
            token,
            pat,
            api_version,
        } => {
            let auth = match (email, token, pat) {
                (Some(username), Some(api_token), _) => Auth::Basic { username, api_token },
                (_, _, Some(token)) => Auth::Bearer { token },
                _ => bail!(Error::InvalidInput(
                    "either --email with --token or --pat is required".to_string()
                )),
            };
            let mut config = JiraConfig::new(url, auth)?;
            if let Some(version) = api_version {
                config = config.with_api_version(version.into());
            }

            let client = JiraClient::new(config.clone())?;
            let detected = match client.test_connection().await {
                ConnectionStatus::Connected { user, api_version } => {
                    println!("Connected as {} (REST API {})", user, api_version);
                    api_version
                }
                status => return Err(connection_error(status)),
            };
            if config.api_version.is_none() {
                config = config.with_api_version(detected);
            }

            let settings = match store.load_settings().await? {
                Some(mut existing) => {
                    existing.jira = config;
                    existing
                }
                None => Settings::new(config),
            };
            store.initialize().await?;
            store.save_settings(&settings).await?;
            println!("Saved settings to {}", store.config_dir().display());
        }

        Commands::Test => {
            let settings = load_settings(&store).await?;
            let client = JiraClient::new(settings.jira)?;
            match client.test_connection().await {
                ConnectionStatus::Connected { user, api_version } => {
                    println!("Connection successful: {} (REST API {})", user, api_version);
                }
                status => return Err(connection_error(status)),
            }
        }

        Commands::AddBoard { board_id } => {
            let mut settings = load_settings(&store).await?;
            let client = JiraClient::new(settings.jira.clone())?;
            let board = client
                .get_board(board_id)
                .await
                .with_context(|| format!("board {} not found or not accessible", board_id))?;

            let selected = SelectedBoard::from(&board);
            if settings.add_board(selected) {
                println!("Added board: {} (ID: {})", board.name, board.id);
            } else {
                println!("Updated board: {} (ID: {})", board.name, board.id);
            }
            store.initialize().await?;
            store.save_settings(&settings).await?;
        }

        Commands::List => {
            let settings = load_settings(&store).await?;
            print_selection(&settings);
        }

        Commands::WeeklyReport {
            board_id,
            days,
            output,
            no_summary,
            include_other,
            max_description,
            comments,
            all_boards,
            concurrency,
        } => {
            let settings = load_settings(&store).await?;
            let policy = load_policy(&store, cli.policy.as_deref()).await?;
            let window = ReportWindow::last_days(days)?;

            let mut options = RenderOptions::from_defaults(&policy.render);
            options.include_summary = !no_summary;
            options.include_other = include_other;
            if max_description.is_some() {
                options.max_description_chars = max_description;
            }
            if let Some(n) = comments {
                options.max_comments = n;
            }

            let client = JiraClient::new(settings.jira.clone())?;
            let generator = ReportGenerator::new(client, policy);

            if all_boards {
                let board_ids = settings.board_ids();
                if board_ids.is_empty() {
                    bail!(Error::ConfigurationMissing("no boards selected".to_string()));
                }
                let out_dir = output.unwrap_or_else(|| PathBuf::from("."));

                let batch = run_boards(board_ids, concurrency, |id| {
                    let generator = generator.clone();
                    let options = options.clone();
                    let out_dir = out_dir.clone();
                    async move {
                        let report = generator.generate(id, &window, &options).await?;
                        let path = out_dir.join(default_file_name(&report.board.name, window.end.date_naive()));
                        write_report(&path, &report).await?;
                        Ok(path)
                    }
                })
                .await;

                for outcome in &batch.outcomes {
                    if let Ok(path) = &outcome.result {
                        println!("Board {}: {}", outcome.board_id, path.display());
                    }
                }
                println!("{}", batch.summary());
                if batch.has_failures() {
                    bail!("{}", batch.summary());
                }
            } else {
                let board_id = resolve_board_id(board_id, &settings)?;
                println!(
                    "Generating weekly report for board {} (last {} days: {})",
                    board_id,
                    window.days(),
                    window.describe()
                );

                let report = generator.generate(board_id, &window, &options).await?;
                println!(
                    "Started: {}, Completed: {}, Blocked: {}, Other: {}",
                    report.counts.started,
                    report.counts.completed,
                    report.counts.blocked,
                    report.counts.other
                );

                let path = output.unwrap_or_else(|| {
                    PathBuf::from(default_file_name(&report.board.name, window.end.date_naive()))
                });
                write_report(&path, &report).await?;
                println!("Report written to {}", path.display());
            }
        }

        Commands::BoardIssues {
            board_id,
            status,
            days,
        } => {
            let settings = load_settings(&store).await?;
            let client = JiraClient::new(settings.jira.clone())?;
            let window = ReportWindow::last_days(days)?;

            let board_ids = match board_id {
                Some(id) => vec![id],
                None if settings.selected_boards.is_empty() => {
                    bail!(Error::ConfigurationMissing(
                        "no boards selected; run `jira-report add-board <id>` or pass a board id"
                            .to_string()
                    ))
                }
                None => settings.board_ids(),
            };

            for id in board_ids {
                println!("{}", board_listing(&client, id, &window, &status).await?);
            }
        }

        Commands::AllBoardIssues { concurrency, days } => {
            let settings = load_settings(&store).await?;
            if settings.selected_boards.is_empty() {
                bail!(Error::ConfigurationMissing("no boards selected".to_string()));
            }
            let client = JiraClient::new(settings.jira.clone())?;
            let window = ReportWindow::last_days(days)?;
            let display: Vec<String> = DEFAULT_DISPLAY_STATUSES.iter().map(|s| s.to_string()).collect();

            let batch = run_boards(settings.board_ids(), concurrency, |id| {
                let client = client.clone();
                let display = display.clone();
                async move { board_listing(&client, id, &window, &display).await }
            })
            .await;

            for outcome in &batch.outcomes {
                let name = settings
                    .board(outcome.board_id)
                    .map(|b| b.name.as_str())
                    .unwrap_or("Unknown");
                println!("\n{} (ID: {})", name, outcome.board_id);
                match &outcome.result {
                    Ok(text) => println!("{}", text),
                    Err(e) => println!("  failed: {}", e),
                }
                println!("{}", "=".repeat(80));
            }
            println!("{}", batch.summary());
            if batch.has_failures() {
                bail!("{}", batch.summary());
            }
        }
    }

    Ok(())
}

/// 保存済みの設定、なければ環境変数から
async fn load_settings(store: &FileConfigStore) -> anyhow::Result<Settings> {
    if let Some(settings) = store.load_settings().await? {
        return Ok(settings);
    }
    debug!("no saved settings, falling back to environment");
    let jira = JiraConfig::from_env()?;
    Ok(Settings::new(jira))
}

async fn load_policy(store: &FileConfigStore, path: Option<&Path>) -> anyhow::Result<ReportPolicy> {
    let policy = match path {
        Some(path) => load_policy_file(path)
            .await
            .with_context(|| format!("loading policy {}", path.display()))?,
        None => store.load_policy().await?,
    };
    Ok(policy)
}

fn resolve_board_id(board_id: Option<u64>, settings: &Settings) -> anyhow::Result<u64> {
    if let Some(id) = board_id {
        return Ok(id);
    }
    match settings.selected_boards.first() {
        Some(board) => {
            info!(board_id = board.id, board = %board.name, "using first selected board");
            println!("Using selected board: {} (ID: {})", board.name, board.id);
            Ok(board.id)
        }
        None => bail!(Error::ConfigurationMissing(
            "no boards selected and no board id provided".to_string()
        )),
    }
}

fn connection_error(status: ConnectionStatus) -> anyhow::Error {
    match status {
        ConnectionStatus::Unauthorized { status } => Error::Unauthorized {
            status,
            message: "Jira rejected the credentials".to_string(),
        }
        .into(),
        ConnectionStatus::Unreachable { reason } => Error::Transient(reason).into(),
        ConnectionStatus::Connected { .. } => anyhow::anyhow!("unexpected connection status"),
    }
}

async fn write_report(path: &Path, report: &WeeklyReport) -> jira_report::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &report.markdown).await?;
    if report.skipped > 0 {
        warn!(board_id = report.board.id, skipped = report.skipped, "some issues were skipped");
    }
    Ok(())
}

async fn board_listing(
    client: &JiraClient,
    board_id: u64,
    window: &ReportWindow,
    display: &[String],
) -> jira_report::Result<String> {
    let fetched = client.fetch_issues_for_board(board_id, window).await?;
    let statuses = grouping_statuses(display);
    let groups = group_by_status(&fetched.issues, &statuses);
    Ok(format_status_groups(board_id, &groups, display))
}

fn print_selection(settings: &Settings) {
    println!("Jira: {}", settings.jira.base_url);
    if let Some(version) = settings.jira.api_version {
        println!("REST API: {}", version);
    }

    println!("\nSelected projects ({}):", settings.selected_projects.len());
    for project in &settings.selected_projects {
        if project.name.is_empty() {
            println!("  - {}", project.key);
        } else {
            println!("  - {} ({})", project.key, project.name);
        }
    }

    println!("\nSelected boards ({}):", settings.selected_boards.len());
    for board in &settings.selected_boards {
        println!(
            "  - {} (ID: {}, {}, project: {})",
            board.name,
            board.id,
            board.board_type,
            board.project_key.as_deref().unwrap_or("N/A")
        );
    }
}
