//! Remote group import
//!
//! Groups are insert-only: a remote group is materialized once and never
//! updated afterwards. Local remote-origin groups whose id no longer appears
//! remotely are removed.

use anyhow::Result;
use log::{debug, error, info, warn};
use std::collections::BTreeSet;

use super::batch::{WriteFailure, WriteKind};
use super::filter::matches;
use super::job::SyncContext;
use crate::models::{FieldPath, GroupFilter, LocalGroup, RemoteRecord};
use crate::okta::ListQuery;
use crate::storage::DirectoryStore;

/// Changes one group sync would make
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupPlan {
    pub create: Vec<LocalGroup>,
    /// Remote ids of local groups to delete
    pub remove: BTreeSet<String>,
    /// Remote groups rejected by the import filters
    pub filtered_out: usize,
    /// Remote groups that already exist locally
    pub existing: usize,
    /// Remote groups without an id
    pub missing_id: usize,
}

/// Statistics from a group sync
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GroupSyncStats {
    pub fetched: usize,
    pub created: usize,
    pub removed: usize,
    pub filtered_out: usize,
    pub existing: usize,
    /// Group writes the store rejected
    pub failures: Vec<WriteFailure>,
}

/// Decides which remote groups exist locally
#[derive(Debug, Clone)]
pub struct GroupSyncPolicy {
    filters: Vec<GroupFilter>,
    remove_vanished: bool,
}

impl GroupSyncPolicy {
    pub fn new(filters: Vec<GroupFilter>) -> Self {
        Self {
            filters,
            remove_vanished: true,
        }
    }

    /// Builder method to enable or disable removal of vanished groups
    pub fn with_removal(mut self, enabled: bool) -> Self {
        self.remove_vanished = enabled;
        self
    }

    pub fn filters(&self) -> &[GroupFilter] {
        &self.filters
    }

    /// Whether the import filters admit this group
    pub fn admits(&self, group: &RemoteRecord) -> bool {
        matches(group, &self.filters)
    }

    /// Compute the creates and removals for a remote group list.
    ///
    /// Every remote id counts as present, including groups the filters
    /// reject. Nothing is removed when the remote list holds no ids, so a
    /// failed or empty fetch cannot wipe the local groups.
    pub fn plan(&self, remote: &[RemoteRecord], local_ids: &BTreeSet<String>) -> GroupPlan {
        let mut plan = GroupPlan::default();
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for group in remote {
            let Some(id) = group.id() else {
                plan.missing_id += 1;
                continue;
            };
            let first_sighting = seen.insert(id.clone());

            if !self.admits(group) {
                plan.filtered_out += 1;
                continue;
            }
            if local_ids.contains(&id) || !first_sighting {
                plan.existing += 1;
                continue;
            }

            plan.create.push(LocalGroup::from_remote(id, group_name(group)));
        }

        if self.remove_vanished && !seen.is_empty() {
            plan.remove = local_ids.difference(&seen).cloned().collect();
        }

        plan
    }

    /// Create a local group for one remote group.
    ///
    /// Returns `false` without writing when the group is rejected by the
    /// filters, has no id, or already exists locally.
    pub fn import_group(&self, store: &dyn DirectoryStore, group: &RemoteRecord) -> Result<bool> {
        let Some(id) = group.id() else {
            return Ok(false);
        };
        if !self.admits(group) || store.has_remote_group(&id)? {
            return Ok(false);
        }

        store.create_group(LocalGroup::from_remote(id, group_name(group)))?;
        Ok(true)
    }

    /// Apply a remote group list to the store.
    ///
    /// A rejected create or removal is logged and recorded in the stats;
    /// the remaining writes still run.
    pub fn sync(&self, store: &dyn DirectoryStore, remote: &[RemoteRecord]) -> Result<GroupSyncStats> {
        let local_ids = store.remote_group_ids()?;
        let plan = self.plan(remote, &local_ids);

        let mut stats = GroupSyncStats {
            fetched: remote.len(),
            filtered_out: plan.filtered_out,
            existing: plan.existing,
            ..GroupSyncStats::default()
        };

        for group in plan.create {
            let remote_id = group.remote_id.clone();
            match store.create_group(group) {
                Ok(()) => {
                    debug!("Created group {remote_id}");
                    stats.created += 1;
                }
                Err(e) => {
                    error!("Failed to create group {remote_id}: {e:#}");
                    stats.failures.push(WriteFailure {
                        kind: WriteKind::Insert,
                        key_count: 1,
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        if !plan.remove.is_empty() {
            match store.delete_groups(&plan.remove) {
                Ok(removed) => {
                    stats.removed = removed;
                    info!("Removed {removed} groups no longer present remotely");
                }
                Err(e) => {
                    error!("Failed to remove {} vanished groups: {e:#}", plan.remove.len());
                    stats.failures.push(WriteFailure {
                        kind: WriteKind::Delete,
                        key_count: plan.remove.len(),
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        Ok(stats)
    }
}

impl Default for GroupSyncPolicy {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Pull every remote group and apply the stored import filters.
///
/// Vanished groups are only removed when the group walk completed, unless
/// `delete_on_partial_snapshot` is set.
pub fn sync_groups(ctx: &SyncContext<'_>) -> Result<GroupSyncStats> {
    let outcome = ctx
        .fetcher()
        .fetch_all(&ListQuery::Groups, ctx.config.page_limit)?;

    let complete = outcome.is_complete();
    if !complete {
        warn!(
            "Group list is incomplete after {} pages, not removing vanished groups",
            outcome.pages
        );
    }

    GroupSyncPolicy::new(ctx.store.group_filters()?)
        .with_removal(complete || ctx.config.delete_on_partial_snapshot)
        .sync(ctx.store, &outcome.records)
}

/// Remote group display name, empty when absent
fn group_name(group: &RemoteRecord) -> String {
    group
        .resolve(&FieldPath::Nested("profile".to_string(), "name".to_string()))
        .unwrap_or_default()
}
