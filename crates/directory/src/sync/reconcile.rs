//! Remote snapshot reconciliation
//!
//! A full snapshot of remote users is classified against the identity
//! values of the local remote-origin members: unseen identities are
//! inserted, known identities are updated, and local identities missing
//! from the snapshot are deleted.

use log::debug;
use std::collections::{BTreeSet, HashSet};

use crate::models::{FieldMapping, FieldPath, RemoteRecord};

/// Output of one reconciliation pass
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SyncCategories {
    pub insert: Vec<RemoteRecord>,
    pub update: Vec<RemoteRecord>,
    /// Identity values of local members absent from the snapshot
    pub delete: BTreeSet<String>,
    /// Remote records without a usable identity value
    pub skipped: usize,
    /// Remote records whose identity was already seen earlier in the snapshot
    pub duplicates: usize,
}

impl SyncCategories {
    pub fn is_empty(&self) -> bool {
        self.insert.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Partition a remote snapshot into insert, update and delete sets.
///
/// Identity values are compared exactly. A record with an empty or
/// unresolvable identity is counted as skipped and placed nowhere; a record
/// repeating an identity already placed is counted as a duplicate, so no
/// identity ends up in two categories.
pub fn categorize(
    remote: impl IntoIterator<Item = RemoteRecord>,
    local_keys: impl IntoIterator<Item = String>,
    mapping: &FieldMapping,
) -> SyncCategories {
    let mut remaining: BTreeSet<String> = local_keys.into_iter().collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut categories = SyncCategories::default();

    for record in remote {
        let Some(identity) = mapping.identity_of(&record) else {
            debug!(
                "Skipping remote record {} without a {} value",
                record.id().unwrap_or_default(),
                mapping.unique_field()
            );
            categories.skipped += 1;
            continue;
        };

        if !seen.insert(identity.clone()) {
            debug!("Dropping repeated remote identity {identity}");
            categories.duplicates += 1;
            continue;
        }

        if remaining.remove(&identity) {
            categories.update.push(record);
        } else {
            categories.insert.push(record);
        }
    }

    categories.delete = remaining;
    categories
}

/// Aggregates several group member pulls, keeping the first record seen
/// for each e-mail address.
///
/// Addresses are compared case-insensitively. Records without an address
/// are always kept and left for the reconciler to skip.
pub struct MemberMerge {
    email_path: FieldPath,
    seen: HashSet<String>,
    records: Vec<RemoteRecord>,
    dropped: usize,
}

impl MemberMerge {
    pub fn new() -> Self {
        Self {
            email_path: FieldPath::Nested("profile".to_string(), "email".to_string()),
            seen: HashSet::new(),
            records: Vec::new(),
            dropped: 0,
        }
    }

    /// Add one group's members
    pub fn extend(&mut self, records: impl IntoIterator<Item = RemoteRecord>) {
        for record in records {
            let email = record
                .resolve(&self.email_path)
                .map(|email| email.to_lowercase())
                .filter(|email| !email.is_empty());

            match email {
                Some(email) if !self.seen.insert(email.clone()) => {
                    debug!("Dropping duplicate group member {email}");
                    self.dropped += 1;
                }
                _ => self.records.push(record),
            }
        }
    }

    /// Number of records dropped as duplicates so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<RemoteRecord> {
        self.records
    }
}

impl Default for MemberMerge {
    fn default() -> Self {
        Self::new()
    }
}
