//! User sync jobs
//!
//! The full sync pulls a complete snapshot and reconciles it against every
//! remote-origin member. The incremental refresh only pulls users changed
//! since a watermark and updates the members it can address by remote id;
//! it never inserts or deletes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};

use super::batch::{BatchWriter, WriteFailure, WriteReport};
use super::job::SyncContext;
use super::reconcile::{MemberMerge, categorize};
use crate::config::SyncConfig;
use crate::models::RemoteRecord;
use crate::okta::{ListQuery, user_endpoint};

/// Statistics from a full user sync
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UserSyncStats {
    /// Remote records in the snapshot, after duplicate removal
    pub fetched: usize,
    /// Pages read across every walk
    pub pages: usize,
    /// Whether every walk reached its last page
    pub complete: bool,
    /// Group members dropped because an earlier group already had their e-mail
    pub duplicates_dropped: usize,
    /// Records without a usable identity value
    pub skipped: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Deletes not applied because the snapshot was incomplete
    pub deletes_withheld: usize,
    pub failures: Vec<WriteFailure>,
    pub duration_ms: u64,
}

/// Statistics from an incremental refresh
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshStats {
    pub fetched: usize,
    pub complete: bool,
    /// Records without a remote id
    pub skipped: usize,
    /// Members matched by the update batches
    pub updated: usize,
    pub failures: Vec<WriteFailure>,
    pub duration_ms: u64,
}

/// Pull the full user snapshot and reconcile it with the local members.
///
/// Members of the configured member-source groups are merged, keeping the
/// first record per e-mail address. Without member sources every user with
/// one of the configured statuses is pulled instead.
///
/// An empty snapshot is not reconciled, and an incomplete one does not
/// delete anything unless `delete_on_partial_snapshot` is set.
pub fn sync_users(ctx: &SyncContext<'_>) -> Result<UserSyncStats> {
    let start = std::time::Instant::now();
    let config = ctx.config;
    let mapping = &config.field_mapping;
    let fetcher = ctx.fetcher();
    let mut stats = UserSyncStats {
        complete: true,
        ..UserSyncStats::default()
    };

    // 1. Pull the snapshot
    let sources = ctx.store.member_sources()?;
    let records = if sources.is_empty() {
        let outcome = fetcher.fetch_all(&ListQuery::users(&config.statuses_to_sync), config.page_limit)?;
        stats.pages = outcome.pages;
        stats.complete = outcome.is_complete();
        outcome.records
    } else {
        let mut merge = MemberMerge::new();
        for group_id in &sources {
            let outcome = fetcher.fetch_all(&ListQuery::group_members(group_id), config.page_limit)?;
            stats.pages += outcome.pages;
            stats.complete &= outcome.is_complete();
            merge.extend(outcome.records);
        }
        stats.duplicates_dropped = merge.dropped();
        merge.into_records()
    };
    stats.fetched = records.len();

    if records.is_empty() {
        info!("Remote user snapshot is empty, skipping reconciliation");
        stats.duration_ms = start.elapsed().as_millis() as u64;
        return Ok(stats);
    }

    // 2. Classify against the local members
    let local_keys = ctx.store.remote_member_keys(mapping.unique_field())?;
    let categories = categorize(records, local_keys, mapping);
    stats.skipped = categories.skipped;

    // 3. Plan bounded writes
    let writer = BatchWriter::from_config(config);
    let inserts = writer.plan_inserts(&categories.insert, mapping);
    let updates = writer.plan_updates(&categories.update, mapping);
    let delete = if stats.complete || config.delete_on_partial_snapshot {
        writer.plan_deletes(&categories.delete, mapping.unique_field())
    } else {
        if !categories.delete.is_empty() {
            warn!(
                "Remote snapshot is incomplete, withholding {} deletes",
                categories.delete.len()
            );
        }
        stats.deletes_withheld = categories.delete.len();
        None
    };

    // 4. Apply; a failed batch does not stop the others
    let mut report = WriteReport::default();
    writer.apply_inserts(ctx.store, &inserts, &mut report);
    writer.apply_updates(ctx.store, &updates, &mut report);
    writer.apply_delete(ctx.store, delete.as_ref(), &mut report);

    stats.inserted = report.inserted;
    stats.updated = report.updated;
    stats.deleted = report.deleted;
    stats.failures = report.failures;

    if stats.deleted > config.delete_warning_threshold {
        warn!("The full user sync has deleted {} users", stats.deleted);
    }

    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

/// Update members changed remotely after `since`.
///
/// Members are addressed by the configured remote id field and only
/// non-empty mapped values are written.
pub fn refresh_users(ctx: &SyncContext<'_>, since: DateTime<Utc>) -> Result<RefreshStats> {
    let start = std::time::Instant::now();
    let config = ctx.config;

    let query = ListQuery::users_updated_since(&config.statuses_to_sync, since);
    let outcome = ctx.fetcher().fetch_all(&query, config.page_limit)?;

    let mut stats = RefreshStats {
        complete: outcome.is_complete(),
        ..RefreshStats::default()
    };
    apply_refresh(ctx, &outcome.records, &mut stats);

    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

/// Update the one member matching `remote_id` from its current remote record.
///
/// The user is fetched directly, bypassing the page cache. Only non-empty
/// mapped values are written; a member that does not exist locally is left
/// alone.
pub fn refresh_user(ctx: &SyncContext<'_>, remote_id: &str) -> Result<RefreshStats> {
    let start = std::time::Instant::now();
    let record = ctx.fetcher().fetch_record(&user_endpoint(remote_id))?;

    let mut stats = RefreshStats {
        complete: true,
        ..RefreshStats::default()
    };
    apply_refresh(ctx, std::slice::from_ref(&record), &mut stats);
    if stats.updated == 0 && stats.failures.is_empty() {
        info!("No local member has remote id {remote_id}");
    }

    stats.duration_ms = start.elapsed().as_millis() as u64;
    Ok(stats)
}

/// Write refreshed records to the members addressed by the remote id field
fn apply_refresh(ctx: &SyncContext<'_>, records: &[RemoteRecord], stats: &mut RefreshStats) {
    let config = ctx.config;
    let mapping = &config.field_mapping;

    stats.fetched = records.len();
    stats.skipped = records
        .iter()
        .filter(|record| mapping.key_of(record, &config.remote_id_field).is_none())
        .count();

    let writer = BatchWriter::from_config(config);
    let updates = writer.plan_refresh(records, mapping, &config.remote_id_field);

    let mut report = WriteReport::default();
    writer.apply_updates(ctx.store, &updates, &mut report);
    stats.updated = report.updated;
    stats.failures = report.failures;
}

/// Watermark for an incremental refresh starting at `now`
pub fn refresh_watermark(config: &SyncConfig, now: DateTime<Utc>) -> DateTime<Utc> {
    chrono::Duration::from_std(config.incremental_lookback())
        .ok()
        .and_then(|lookback| now.checked_sub_signed(lookback))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
