//! Job execution and rescheduling

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{error, info};

use super::batch::WriteFailure;
use super::groups::{GroupSyncStats, sync_groups};
use super::schedule::{JobDescriptor, JobKind, Scheduler};
use super::users::{RefreshStats, UserSyncStats, refresh_users, refresh_watermark, sync_users};
use crate::config::SyncConfig;
use crate::okta::{PaginatingFetcher, RemoteClient, ResponseCache};
use crate::storage::DirectoryStore;

/// Collaborators shared by the sync jobs
#[derive(Clone, Copy)]
pub struct SyncContext<'a> {
    pub client: &'a dyn RemoteClient,
    pub cache: &'a ResponseCache,
    pub store: &'a dyn DirectoryStore,
    pub config: &'a SyncConfig,
}

impl<'a> SyncContext<'a> {
    pub fn new(
        client: &'a dyn RemoteClient,
        cache: &'a ResponseCache,
        store: &'a dyn DirectoryStore,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            client,
            cache,
            store,
            config,
        }
    }

    /// A fetcher using the configured cache lifetimes and page error policy
    pub fn fetcher(&self) -> PaginatingFetcher<'a> {
        PaginatingFetcher::new(self.client, self.cache, self.config.cache_ttl)
            .with_page_error_policy(self.config.on_page_error)
    }
}

/// Job specific statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStats {
    Users(UserSyncStats),
    Refresh(RefreshStats),
    Groups(GroupSyncStats),
}

/// Outcome of one job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: JobKind,
    pub started_at: DateTime<Utc>,
    /// Operator facing summary lines
    pub messages: Vec<String>,
    pub stats: JobStats,
    pub failures: Vec<WriteFailure>,
}

impl JobReport {
    fn new(job: JobKind, started_at: DateTime<Utc>, stats: JobStats, unique_field: &str) -> Self {
        let (messages, failures) = match &stats {
            JobStats::Users(s) => {
                let mut messages = vec![format!(
                    "Added {} users, updated {} users and deleted {} users.",
                    s.inserted, s.updated, s.deleted
                )];
                if s.skipped > 0 {
                    messages.push(format!(
                        "Skipped {} users without a {unique_field} value.",
                        s.skipped
                    ));
                }
                if s.deletes_withheld > 0 {
                    messages.push(format!(
                        "Withheld {} deletes because the remote snapshot was incomplete.",
                        s.deletes_withheld
                    ));
                }
                (messages, s.failures.clone())
            }
            JobStats::Refresh(s) => (
                vec![format!("Updated {} users.", s.updated)],
                s.failures.clone(),
            ),
            JobStats::Groups(s) => {
                let mut messages = vec![format!("Created {} groups", s.created)];
                if s.removed > 0 {
                    messages.push(format!("Deleted {} groups", s.removed));
                }
                if !s.failures.is_empty() {
                    messages.push(format!("Failed {} group writes", s.failures.len()));
                }
                (messages, s.failures.clone())
            }
        };

        Self {
            job,
            started_at,
            messages,
            stats,
            failures,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Runs jobs and queues whatever should run after them
pub struct JobRunner<'a> {
    ctx: SyncContext<'a>,
    scheduler: &'a dyn Scheduler,
    clock: Clock,
}

impl<'a> JobRunner<'a> {
    pub fn new(ctx: SyncContext<'a>, scheduler: &'a dyn Scheduler) -> Self {
        Self {
            ctx,
            scheduler,
            clock: Box::new(Utc::now),
        }
    }

    /// Builder method to set the time source used for watermarks
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Run a job, then reschedule it and queue its follow-up jobs.
    ///
    /// Rescheduling happens whether or not the job succeeded, so a failed
    /// run is retried on the job's normal interval.
    pub fn run(&self, job: &JobDescriptor) -> Result<JobReport> {
        info!("Starting job: {}", job.kind.title());
        let result = self.execute(job.kind);

        match &result {
            Ok(report) => {
                for message in &report.messages {
                    info!("[{}] {message}", job.kind);
                }
            }
            Err(e) => error!("Job {} failed: {e:#}", job.kind),
        }

        self.schedule_next(job.kind);
        result
    }

    fn execute(&self, kind: JobKind) -> Result<JobReport> {
        let started_at = (self.clock)();
        let stats = match kind {
            JobKind::FullUserSync => JobStats::Users(sync_users(&self.ctx)?),
            JobKind::IncrementalUserSync => {
                let since = refresh_watermark(self.ctx.config, started_at);
                JobStats::Refresh(refresh_users(&self.ctx, since)?)
            }
            JobKind::GroupSync => JobStats::Groups(sync_groups(&self.ctx)?),
        };
        let unique_field = self.ctx.config.field_mapping.unique_field();
        Ok(JobReport::new(kind, started_at, stats, unique_field))
    }

    fn schedule_next(&self, kind: JobKind) {
        let config = self.ctx.config;
        let next = std::iter::once((kind, config.reschedule_delay(kind))).chain(
            config
                .follow_ups_for(kind)
                .map(|follow_up| (follow_up.job, follow_up.delay())),
        );

        for (job, delay) in next {
            if let Err(e) = self.scheduler.schedule_after(JobDescriptor::new(job), delay) {
                error!("Failed to schedule {job}: {e:#}");
            }
        }
    }
}
