//! In-memory storage implementation
//!
//! Used by tests and dry runs. Members live in a vector in insertion order;
//! every other collection is a small map behind its own lock.

use anyhow::{Result, anyhow};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::DirectoryStore;
use crate::models::{GroupFilter, LocalGroup, Member};
use crate::sync::{DeleteBatch, InsertBatch, UpdateBatch};

/// In-memory implementation of DirectoryStore
pub struct InMemoryDirectoryStore {
    members: RwLock<Vec<Member>>,
    groups: RwLock<BTreeMap<String, LocalGroup>>,
    filters: RwLock<Vec<GroupFilter>>,
    sources: RwLock<Vec<String>>,
}

impl InMemoryDirectoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            members: RwLock::new(Vec::new()),
            groups: RwLock::new(BTreeMap::new()),
            filters: RwLock::new(Vec::new()),
            sources: RwLock::new(Vec::new()),
        }
    }

    /// Snapshot of every member in insertion order
    pub fn members(&self) -> Result<Vec<Member>> {
        Ok(read(&self.members)?.clone())
    }
}

impl Default for InMemoryDirectoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("directory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("directory store lock poisoned"))
}

fn matches_key(member: &Member, field: &str, key: &str) -> bool {
    member.is_remote && member.get(field) == Some(key)
}

impl DirectoryStore for InMemoryDirectoryStore {
    fn remote_member_keys(&self, field: &str) -> Result<Vec<String>> {
        let members = read(&self.members)?;
        Ok(members
            .iter()
            .filter(|m| m.is_remote)
            .filter_map(|m| m.get(field))
            .filter(|value| !value.is_empty())
            .map(String::from)
            .collect())
    }

    fn insert_members(&self, batch: &InsertBatch) -> Result<usize> {
        let mut members = write(&self.members)?;
        members.extend(batch.rows.iter().cloned().map(Member::remote));
        Ok(batch.rows.len())
    }

    fn update_members(&self, batch: &UpdateBatch) -> Result<usize> {
        let mut members = write(&self.members)?;

        // Resolve targets before writing, so a batch that rewrites the key
        // field still reaches every member it names
        let targets: Vec<(usize, &str)> = batch
            .keys
            .iter()
            .flat_map(|key| {
                members
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| matches_key(m, &batch.key_field, key))
                    .map(move |(i, _)| (i, key.as_str()))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (index, key) in &targets {
            for (field, values) in &batch.fields {
                if let Some(value) = values.get(*key) {
                    members[*index].fields.insert(field.clone(), value.clone());
                }
            }
        }

        Ok(targets.len())
    }

    fn delete_members(&self, batch: &DeleteBatch) -> Result<usize> {
        let mut members = write(&self.members)?;
        let before = members.len();
        members.retain(|m| {
            !batch
                .keys
                .iter()
                .any(|key| matches_key(m, &batch.key_field, key))
        });
        Ok(before - members.len())
    }

    fn find_member(&self, field: &str, value: &str) -> Result<Option<Member>> {
        let members = read(&self.members)?;
        Ok(members.iter().find(|m| m.get(field) == Some(value)).cloned())
    }

    fn count_members(&self) -> Result<usize> {
        Ok(read(&self.members)?.len())
    }

    fn add_local_member(&self, member: Member) -> Result<()> {
        write(&self.members)?.push(Member {
            is_remote: false,
            ..member
        });
        Ok(())
    }

    fn remote_group_ids(&self) -> Result<BTreeSet<String>> {
        Ok(read(&self.groups)?.keys().cloned().collect())
    }

    fn has_remote_group(&self, remote_id: &str) -> Result<bool> {
        Ok(read(&self.groups)?.contains_key(remote_id))
    }

    fn create_group(&self, group: LocalGroup) -> Result<()> {
        let mut groups = write(&self.groups)?;
        if groups.contains_key(&group.remote_id) {
            return Err(anyhow!("group {} already exists", group.remote_id));
        }
        groups.insert(group.remote_id.clone(), group);
        Ok(())
    }

    fn delete_groups(&self, remote_ids: &BTreeSet<String>) -> Result<usize> {
        let mut groups = write(&self.groups)?;
        let before = groups.len();
        groups.retain(|id, _| !remote_ids.contains(id));
        Ok(before - groups.len())
    }

    fn list_groups(&self) -> Result<Vec<LocalGroup>> {
        Ok(read(&self.groups)?.values().cloned().collect())
    }

    fn group_filters(&self) -> Result<Vec<GroupFilter>> {
        Ok(read(&self.filters)?.clone())
    }

    fn add_group_filter(&self, filter: GroupFilter) -> Result<()> {
        write(&self.filters)?.push(filter);
        Ok(())
    }

    fn member_sources(&self) -> Result<Vec<String>> {
        Ok(read(&self.sources)?.clone())
    }

    fn add_member_source(&self, group_id: &str) -> Result<()> {
        let mut sources = write(&self.sources)?;
        if !sources.iter().any(|s| s == group_id) {
            sources.push(group_id.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        write(&self.members)?.clear();
        write(&self.groups)?.clear();
        write(&self.filters)?.clear();
        write(&self.sources)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValues;
    use std::collections::BTreeMap;

    fn values(pairs: &[(&str, &str)]) -> FieldValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn seeded_store() -> InMemoryDirectoryStore {
        let store = InMemoryDirectoryStore::new();
        store
            .insert_members(&InsertBatch {
                rows: vec![
                    values(&[("Email", "a@test.com"), ("FirstName", "A"), ("OktaID", "1")]),
                    values(&[("Email", "b@test.com"), ("FirstName", "B"), ("OktaID", "2")]),
                ],
            })
            .unwrap();
        store
            .add_local_member(Member::local(values(&[("Email", "local@test.com")])))
            .unwrap();
        store
    }

    #[test]
    fn test_remote_keys_exclude_local_members() {
        let store = seeded_store();
        let keys = store.remote_member_keys("Email").unwrap();
        assert_eq!(keys, vec!["a@test.com", "b@test.com"]);
        assert_eq!(store.count_members().unwrap(), 3);
    }

    #[test]
    fn test_update_only_touches_named_fields() {
        let store = seeded_store();
        let mut fields = BTreeMap::new();
        fields.insert(
            "FirstName".to_string(),
            BTreeMap::from([("a@test.com".to_string(), "Alice".to_string())]),
        );
        let batch = UpdateBatch {
            key_field: "Email".to_string(),
            keys: vec!["a@test.com".to_string(), "b@test.com".to_string()],
            fields,
        };

        assert_eq!(store.update_members(&batch).unwrap(), 2);
        let a = store.find_member("Email", "a@test.com").unwrap().unwrap();
        let b = store.find_member("Email", "b@test.com").unwrap().unwrap();
        assert_eq!(a.get("FirstName"), Some("Alice"));
        assert_eq!(b.get("FirstName"), Some("B"));
    }

    #[test]
    fn test_update_can_rewrite_key_field() {
        let store = seeded_store();
        let batch = UpdateBatch {
            key_field: "OktaID".to_string(),
            keys: vec!["1".to_string()],
            fields: BTreeMap::from([(
                "Email".to_string(),
                BTreeMap::from([("1".to_string(), "renamed@test.com".to_string())]),
            )]),
        };
        assert_eq!(store.update_members(&batch).unwrap(), 1);
        assert!(store.find_member("Email", "renamed@test.com").unwrap().is_some());
    }

    #[test]
    fn test_delete_spares_local_members() {
        let store = seeded_store();
        let batch = DeleteBatch {
            key_field: "Email".to_string(),
            keys: ["a@test.com", "local@test.com"]
                .into_iter()
                .map(String::from)
                .collect(),
        };

        assert_eq!(store.delete_members(&batch).unwrap(), 1);
        assert!(store.find_member("Email", "local@test.com").unwrap().is_some());
        assert!(store.find_member("Email", "a@test.com").unwrap().is_none());
    }

    #[test]
    fn test_groups_and_sources() {
        let store = InMemoryDirectoryStore::new();
        store.create_group(LocalGroup::from_remote("g2", "Two")).unwrap();
        store.create_group(LocalGroup::from_remote("g1", "")).unwrap();
        assert!(store.create_group(LocalGroup::from_remote("g1", "again")).is_err());

        let groups = store.list_groups().unwrap();
        assert_eq!(groups[0].title, "g1");
        assert_eq!(groups[1].title, "Two");

        let removed = store
            .delete_groups(&BTreeSet::from(["g2".to_string()]))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!store.has_remote_group("g2").unwrap());

        store.add_member_source("g1").unwrap();
        store.add_member_source("g1").unwrap();
        assert_eq!(store.member_sources().unwrap(), vec!["g1"]);
    }
}
