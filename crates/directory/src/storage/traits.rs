//! Storage trait definitions

use anyhow::Result;
use std::collections::BTreeSet;

use crate::models::{GroupFilter, LocalGroup, Member};
use crate::sync::{DeleteBatch, InsertBatch, UpdateBatch};

/// Trait for local directory storage
///
/// Members are stored as field/value maps. Bulk writes arrive as batches
/// that were already sized by the sync layer; each batch is applied
/// atomically.
pub trait DirectoryStore: Send + Sync {
    /// Non-empty values of `field` over all remote-origin members
    fn remote_member_keys(&self, field: &str) -> Result<Vec<String>>;

    /// Insert one remote-origin member per row; returns rows inserted
    fn insert_members(&self, batch: &InsertBatch) -> Result<usize>;

    /// Apply a conditional update; returns the number of members matched
    fn update_members(&self, batch: &UpdateBatch) -> Result<usize>;

    /// Delete remote-origin members matching any key; returns members removed
    fn delete_members(&self, batch: &DeleteBatch) -> Result<usize>;

    /// First member (local or remote) whose `field` equals `value`
    fn find_member(&self, field: &str, value: &str) -> Result<Option<Member>>;

    /// Count all members, local and remote
    fn count_members(&self) -> Result<usize>;

    /// Insert a member created outside the sync
    fn add_local_member(&self, member: Member) -> Result<()>;

    /// Remote ids of all remote-origin groups
    fn remote_group_ids(&self) -> Result<BTreeSet<String>>;

    /// Check whether a group with this remote id exists
    fn has_remote_group(&self, remote_id: &str) -> Result<bool>;

    /// Create a remote-origin group
    fn create_group(&self, group: LocalGroup) -> Result<()>;

    /// Delete remote-origin groups by remote id; returns groups removed
    fn delete_groups(&self, remote_ids: &BTreeSet<String>) -> Result<usize>;

    /// List groups ordered by remote id
    fn list_groups(&self) -> Result<Vec<LocalGroup>>;

    /// Group import filters in the order they were added
    fn group_filters(&self) -> Result<Vec<GroupFilter>>;

    fn add_group_filter(&self, filter: GroupFilter) -> Result<()>;

    /// Remote group ids whose members feed the user sync
    fn member_sources(&self) -> Result<Vec<String>>;

    /// Add a member source; adding an existing source is a no-op
    fn add_member_source(&self, group_id: &str) -> Result<()>;

    /// Clear all data (for testing)
    fn clear(&self) -> Result<()>;
}
