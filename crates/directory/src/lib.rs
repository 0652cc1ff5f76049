//! Directory crate - Identity directory synchronization
//!
//! This crate keeps a local member and group store in line with a remote
//! identity directory. It provides:
//! - Domain models (RemoteRecord, FieldPath, FieldMapping, LocalGroup)
//! - Identity API client, cursor pagination and a short-TTL page cache
//! - Storage trait abstractions with in-memory and SQLite backends
//! - Reconciliation and batched bulk-write planning
//! - Full, incremental and group sync jobs with a pluggable scheduler

pub mod config;
pub mod models;
pub mod okta;
pub mod storage;
pub mod sync;

pub use config::{ApiCredentials, CacheTtls, ConfigError, FollowUpJob, SyncConfig};
pub use models::{
    FieldMapping, FieldPath, FieldPathError, FieldValues, GroupFilter, LocalGroup, MappingError,
    Member, RemoteRecord,
};
pub use okta::{
    FetchError, FetchOutcome, ListQuery, OktaClient, PageErrorPolicy, PaginatingFetcher,
    RemoteClient, ResponseCache, api::RawResponse,
};
pub use storage::{DirectoryStore, InMemoryDirectoryStore, SqliteDirectoryStore};
pub use sync::{
    // Sync execution
    JobReport, JobRunner, JobStats, SyncContext, refresh_user, refresh_users, sync_groups,
    sync_users,
    // Scheduling
    JobDescriptor, JobKind, QueueScheduler, Scheduler,
    // Reconciliation and batching
    BatchWriter, GroupSyncPolicy, SyncCategories, categorize,
};
