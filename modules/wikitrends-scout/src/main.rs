use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use wikitrends_common::file_config::load_config;
use wikitrends_common::{AppConfig, FileConfig, Topic};
use wikitrends_scout::{App, TopicRegistry};

#[derive(Parser)]
#[command(name = "wikitrends", about = "Track how Wikipedia articles change over time")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, global = true, default_value = "./config/wikitrends.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape every due topic (or only the named ones)
    Scrape {
        #[arg(long = "topic", value_name = "NAME")]
        topics: Vec<String>,
    },
    /// Process landed partitions that have no up-to-date output
    Process {
        /// Also process today's partitions, which may still receive records
        #[arg(long)]
        include_open: bool,
    },
    /// Manage the tracked topics
    Topics {
        #[command(subcommand)]
        action: TopicsAction,
    },
}

#[derive(Subcommand)]
enum TopicsAction {
    List,
    Add { name: String, locator: String },
    Remove { name: String },
    /// Point a topic at a new article title or URL
    Set { name: String, locator: String },
}

/// Exit code for a run where some topic or partition failed.
const EXIT_PARTIAL: u8 = 1;
/// Exit code for config, topics-file or state-file problems.
const EXIT_SETUP: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = match setup(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Setup failed");
            return ExitCode::from(EXIT_SETUP);
        }
    };

    match run(cli.command, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_PARTIAL),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Run aborted");
            ExitCode::from(EXIT_SETUP)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("wikitrends=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// File config (defaults if the file is absent) with env overrides applied.
fn setup(config_path: &Path) -> Result<FileConfig> {
    let mut config = if config_path.exists() {
        info!(config = %config_path.display(), "Loading config");
        load_config(config_path)?
    } else {
        warn!(config = %config_path.display(), "Config file not found, using defaults");
        FileConfig::default()
    };
    AppConfig::from_env().apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// `Ok(false)` when the run completed but some item failed.
async fn run(command: Command, config: FileConfig) -> Result<bool> {
    match command {
        Command::Scrape { topics } => {
            let app = App::open(config).await.context("Failed to open stores")?;
            let stats = app.scrape(&topics, Utc::now()).await?;
            info!("Scrape complete. {stats}");
            println!("{stats}");
            Ok(stats.is_success())
        }
        Command::Process { include_open } => {
            let app = App::open(config).await.context("Failed to open stores")?;
            let stats = app.process(Utc::now(), include_open).await?;
            info!("Processing complete. {stats}");
            println!("{stats}");
            Ok(stats.is_success())
        }
        Command::Topics { action } => {
            manage_topics(&config.storage.topics_file, action).await?;
            Ok(true)
        }
    }
}

async fn manage_topics(path: &Path, action: TopicsAction) -> Result<()> {
    let mut registry = TopicRegistry::load(path)
        .await
        .with_context(|| format!("Failed to load topics from {}", path.display()))?;

    match action {
        TopicsAction::List => {
            for topic in registry.list() {
                println!("{}\t{}\t{}", topic.name, topic.source_locator, topic.added_at.to_rfc3339());
            }
            return Ok(());
        }
        TopicsAction::Add { name, locator } => {
            registry.add(Topic::new(name.clone(), locator, Utc::now()))?;
            info!(topic = name.as_str(), "Topic added");
        }
        TopicsAction::Remove { name } => {
            registry.remove(&name)?;
            info!(topic = name.as_str(), "Topic removed");
        }
        TopicsAction::Set { name, locator } => {
            registry.update_locator(&name, locator)?;
            info!(topic = name.as_str(), "Topic locator updated");
        }
    }

    registry
        .save(path)
        .await
        .with_context(|| format!("Failed to save topics to {}", path.display()))
}
