//! dirsync - Identity directory sync
//!
//! Pulls users and groups from the identity API into the local SQLite
//! directory store.
//!
//! # Commands
//!
//! - `users` - Full user sync
//! - `refresh` - Incremental refresh of recently changed users
//! - `user` - Refresh one member from its remote record
//! - `groups` - Group import
//! - `run` - Run the group and user jobs, optionally keep running them
//! - `filter` / `source` - Manage group filters and member sources
//! - `init` - Write the default settings file

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use log::{error, info, warn};

use directory::config::SETTINGS_FILE;
use directory::storage::{DirectoryStore, SqliteDirectoryStore};
use directory::sync::{
    JobDescriptor, JobKind, JobReport, JobRunner, QueueScheduler, SyncContext, refresh_user,
};
use directory::{ApiCredentials, FieldPath, GroupFilter, OktaClient, ResponseCache, SyncConfig};

/// Default database filename in the dirsync config directory
const DB_FILE: &str = "directory.sqlite";

/// Longest sleep between checks of the job queue in watch mode
const MAX_IDLE: Duration = Duration::from_secs(60);

/// Sync users and groups from an identity directory
#[derive(Parser)]
#[command(name = "dirsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the settings file (defaults to ~/.config/dirsync/dirsync.json)
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Path to the SQLite database
    #[arg(global = true, long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull every user and reconcile the local members
    Users,

    /// Update members changed remotely within the lookback window
    Refresh,

    /// Refresh one member from the remote user with this id
    User { remote_id: String },

    /// Import remote groups matching the group filters
    Groups,

    /// Run the group and full user sync once
    Run {
        /// Keep running whatever the jobs schedule next
        #[arg(short, long)]
        watch: bool,
    },

    /// Manage group import filters
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },

    /// Manage the groups whose members feed the user sync
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Write the default settings file
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum FilterAction {
    /// Import groups whose value at PATH equals VALUE
    Add { path: String, value: String },
    /// List configured filters
    List,
}

#[derive(Subcommand)]
enum SourceAction {
    /// Add a remote group id as a member source
    Add { group_id: String },
    /// List member sources
    List,
}

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // Bootstrap config directory
    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        return init_settings(cli.config.as_deref(), force);
    }

    let settings = match &cli.config {
        Some(path) => SyncConfig::from_file(path)?,
        None => SyncConfig::load()?,
    };
    let store = open_store(cli.db)?;

    match cli.command {
        Commands::Users => run_once(&settings, &store, JobKind::FullUserSync),
        Commands::Refresh => run_once(&settings, &store, JobKind::IncrementalUserSync),
        Commands::Groups => run_once(&settings, &store, JobKind::GroupSync),
        Commands::User { remote_id } => refresh_one(&settings, &store, &remote_id),
        Commands::Run { watch } => run_jobs(&settings, &store, watch),
        Commands::Filter { action } => manage_filters(&store, action),
        Commands::Source { action } => manage_sources(&store, action),
        Commands::Init { .. } => Ok(()),
    }
}

fn open_store(db: Option<PathBuf>) -> Result<SqliteDirectoryStore> {
    let path = match db {
        Some(path) => path,
        None => config::config_path(DB_FILE).context("Could not determine config directory")?,
    };
    info!("Using database {}", path.display());
    SqliteDirectoryStore::new(&path)
}

fn load_client() -> Result<OktaClient> {
    match ApiCredentials::load() {
        Ok(creds) => Ok(OktaClient::new(&creds)),
        Err(e) => {
            if let Some(path) = ApiCredentials::default_credentials_path() {
                warn!(
                    "To configure API access, either:\n\
                     1. Place your API credentials at: {}\n\
                     2. Or set environment variables: DIRSYNC_API_URL and DIRSYNC_API_TOKEN",
                    path.display()
                );
            }
            Err(e).context("API credentials not found")
        }
    }
}

fn run_once(settings: &SyncConfig, store: &dyn DirectoryStore, kind: JobKind) -> Result<()> {
    let client = load_client()?;
    let cache = ResponseCache::new();
    let scheduler = QueueScheduler::new();
    let runner = JobRunner::new(SyncContext::new(&client, &cache, store, settings), &scheduler);

    let report = runner.run(&JobDescriptor::new(kind))?;
    print_report(&report);
    Ok(())
}

fn refresh_one(settings: &SyncConfig, store: &dyn DirectoryStore, remote_id: &str) -> Result<()> {
    let client = load_client()?;
    let cache = ResponseCache::new();
    let stats = refresh_user(&SyncContext::new(&client, &cache, store, settings), remote_id)?;

    println!("Updated {} users.", stats.updated);
    for failure in &stats.failures {
        println!("{} batch failed: {}", failure.kind, failure.message);
    }
    Ok(())
}

fn run_jobs(settings: &SyncConfig, store: &dyn DirectoryStore, watch: bool) -> Result<()> {
    let client = load_client()?;
    let cache = ResponseCache::new();
    let scheduler = QueueScheduler::new();
    let runner = JobRunner::new(SyncContext::new(&client, &cache, store, settings), &scheduler);

    for kind in [JobKind::GroupSync, JobKind::FullUserSync] {
        // A failed job is logged by the runner and retried on its next run
        if let Ok(report) = runner.run(&JobDescriptor::new(kind)) {
            print_report(&report);
        }
    }

    if !watch {
        return Ok(());
    }

    loop {
        while let Some(job) = scheduler.pop_due() {
            if let Ok(report) = runner.run(&job) {
                print_report(&report);
            }
            cache.purge_expired();
        }

        let idle = scheduler
            .next_due_at()
            .and_then(|due| (due - Utc::now()).to_std().ok())
            .unwrap_or(MAX_IDLE)
            .min(MAX_IDLE);
        thread::sleep(idle);
    }
}

fn print_report(report: &JobReport) {
    for message in &report.messages {
        println!("{}: {message}", report.job);
    }
    for failure in &report.failures {
        println!(
            "{}: {} batch of {} members failed: {}",
            report.job, failure.kind, failure.key_count, failure.message
        );
    }
}

fn manage_filters(store: &dyn DirectoryStore, action: FilterAction) -> Result<()> {
    match action {
        FilterAction::Add { path, value } => {
            let path = FieldPath::parse(&path)
                .with_context(|| format!("Invalid filter path {path:?}"))?;
            store.add_group_filter(GroupFilter::new(path, value))?;
        }
        FilterAction::List => {
            let filters = store.group_filters()?;
            if filters.is_empty() {
                println!("No group filters; every group is imported");
            }
            for filter in filters {
                println!("{} = {}", filter.path, filter.expected_value);
            }
        }
    }
    Ok(())
}

fn manage_sources(store: &dyn DirectoryStore, action: SourceAction) -> Result<()> {
    match action {
        SourceAction::Add { group_id } => {
            if group_id.trim().is_empty() {
                bail!("Group id must not be empty");
            }
            store.add_member_source(group_id.trim())?;
        }
        SourceAction::List => {
            let sources = store.member_sources()?;
            if sources.is_empty() {
                println!("No member sources; all users are synced");
            }
            for source in sources {
                println!("{source}");
            }
        }
    }
    Ok(())
}

fn init_settings(target: Option<&Path>, force: bool) -> Result<()> {
    let exists = match target {
        Some(path) => path.exists(),
        None => config::config_exists(SETTINGS_FILE),
    };
    if exists && !force {
        bail!("Settings file already exists; pass --force to overwrite it");
    }

    let settings = SyncConfig::default();
    let path = match target {
        Some(path) => {
            config::save_json_file(path, &settings)?;
            path.to_path_buf()
        }
        None => config::save_json(SETTINGS_FILE, &settings)?,
    };
    println!("Wrote default settings to {}", path.display());
    Ok(())
}
