//! Job kinds and the "run later" scheduler seam
//!
//! Jobs never queue themselves. Each run tells a [`Scheduler`] which job
//! should run next and after what delay; how the queue is kept is up to the
//! scheduler.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// The sync jobs that can be scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    FullUserSync,
    IncrementalUserSync,
    GroupSync,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullUserSync => "full_user_sync",
            Self::IncrementalUserSync => "incremental_user_sync",
            Self::GroupSync => "group_sync",
        }
    }

    /// Human readable job title
    pub fn title(&self) -> &'static str {
        match self {
            Self::FullUserSync => "Sync all users from the identity directory",
            Self::IncrementalUserSync => "Refresh recently changed users",
            Self::GroupSync => "Sync groups from the identity directory",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to run one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    pub kind: JobKind,
}

impl JobDescriptor {
    pub fn new(kind: JobKind) -> Self {
        Self { kind }
    }
}

/// Accepts "run this job after a delay" requests
pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, job: JobDescriptor, delay: Duration) -> Result<()>;
}

/// A queued job and when it becomes due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledJob {
    pub job: JobDescriptor,
    pub due_at: DateTime<Utc>,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// In-process due-time queue.
///
/// Holds at most one entry per job kind: scheduling a kind that is already
/// queued keeps whichever due time is earlier, so self-rescheduling jobs and
/// follow-up jobs cannot pile up duplicate runs.
pub struct QueueScheduler {
    queue: Mutex<Vec<ScheduledJob>>,
    clock: Clock,
}

impl QueueScheduler {
    /// Create an empty queue using the system clock
    pub fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    /// Create an empty queue with a custom time source
    pub fn with_clock(clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        Self {
            queue: Mutex::new(Vec::new()),
            clock: Box::new(clock),
        }
    }

    /// Remove and return the earliest job that is due now
    pub fn pop_due(&self) -> Option<JobDescriptor> {
        let now = (self.clock)();
        let mut queue = self.queue.lock().ok()?;
        let index = queue
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due_at <= now)
            .min_by_key(|(_, entry)| entry.due_at)
            .map(|(i, _)| i)?;
        Some(queue.remove(index).job)
    }

    /// Due time of the earliest queued job
    pub fn next_due_at(&self) -> Option<DateTime<Utc>> {
        let queue = self.queue.lock().ok()?;
        queue.iter().map(|entry| entry.due_at).min()
    }

    /// Queued jobs ordered by due time
    pub fn pending(&self) -> Vec<ScheduledJob> {
        let Ok(queue) = self.queue.lock() else {
            return Vec::new();
        };
        let mut pending = queue.clone();
        pending.sort_by_key(|entry| entry.due_at);
        pending
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for QueueScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for QueueScheduler {
    fn schedule_after(&self, job: JobDescriptor, delay: Duration) -> Result<()> {
        let now = (self.clock)();
        let due_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let kind = job.kind;
        let mut queue = self
            .queue
            .lock()
            .map_err(|_| anyhow!("scheduler queue lock poisoned"))?;

        match queue.iter_mut().find(|entry| entry.job.kind == job.kind) {
            Some(existing) => {
                if due_at < existing.due_at {
                    existing.due_at = due_at;
                }
            }
            None => queue.push(ScheduledJob { job, due_at }),
        }

        debug!("Scheduled {kind} for {}", due_at.to_rfc3339());
        Ok(())
    }
}
