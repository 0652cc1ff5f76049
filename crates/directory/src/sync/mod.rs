//! Sync engine for reconciling the remote directory with local storage
//!
//! Every job is idempotent: re-running it after a failure converges on the
//! same local state.

mod batch;
mod filter;
mod groups;
mod job;
mod reconcile;
mod schedule;
mod users;

pub use batch::{
    BatchWriter, DeleteBatch, InsertBatch, UpdateBatch, WriteFailure, WriteKind, WriteReport,
};
pub use filter::matches;
pub use groups::{GroupPlan, GroupSyncPolicy, GroupSyncStats, sync_groups};
pub use job::{JobReport, JobRunner, JobStats, SyncContext};
pub use reconcile::{MemberMerge, SyncCategories, categorize};
pub use schedule::{JobDescriptor, JobKind, QueueScheduler, ScheduledJob, Scheduler};
pub use users::{
    RefreshStats, UserSyncStats, refresh_user, refresh_users, refresh_watermark, sync_users,
};
