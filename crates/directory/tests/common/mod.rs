//! Shared test doubles for the directory integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use directory::okta::api::RawResponse;
use directory::{FetchError, RemoteClient, RemoteRecord};
use serde_json::{Value, json};

/// Serves canned pages per endpoint path, linking each page to the next
/// with a `Link` header, and records every request it receives.
///
/// Page `n > 0` is addressed by the cursor `page-n`.
pub struct ScriptedClient {
    routes: HashMap<String, Vec<Vec<Value>>>,
    records: HashMap<String, Value>,
    failing: HashSet<(String, usize)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            records: HashMap::new(),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Serve `pages` for requests to `path` (e.g. `users`, `groups/00g1/users`)
    pub fn with_pages(mut self, path: &str, pages: Vec<Vec<Value>>) -> Self {
        self.routes.insert(path.to_string(), pages);
        self
    }

    /// Serve a single record object for requests to `path` (e.g. `users/00u1`)
    pub fn with_record(mut self, path: &str, record: Value) -> Self {
        self.records.insert(path.to_string(), record);
        self
    }

    /// Answer page `index` of `path` with a 500
    pub fn failing_page(mut self, path: &str, index: usize) -> Self {
        self.failing.insert((path.to_string(), index));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl RemoteClient for ScriptedClient {
    fn get(&self, endpoint: &str) -> Result<RawResponse, FetchError> {
        self.calls.lock().unwrap().push(endpoint.to_string());

        let (path, query) = endpoint.split_once('?').unwrap_or((endpoint, ""));
        if let Some(record) = self.records.get(path) {
            return Ok(RawResponse::ok(serde_json::to_vec(record).unwrap()));
        }

        let after = url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "after")
            .map(|(_, value)| value.into_owned());
        let index = match after {
            None => 0,
            Some(cursor) => cursor
                .strip_prefix("page-")
                .and_then(|n| n.parse().ok())
                .unwrap_or(usize::MAX),
        };

        if self.failing.contains(&(path.to_string(), index)) {
            return Ok(RawResponse::status(500));
        }
        let Some(page) = self.routes.get(path).and_then(|pages| pages.get(index)) else {
            return Ok(RawResponse::status(404));
        };

        let body = serde_json::to_vec(&Value::Array(page.clone())).unwrap();
        let mut response = RawResponse::ok(body).with_header(
            "Link",
            format!("<https://acme.okta.com/api/v1/{endpoint}>; rel=\"self\""),
        );
        if index + 1 < self.routes[path].len() {
            response = response.with_header(
                "Link",
                format!(
                    "<https://acme.okta.com/api/v1/{path}?after=page-{}&limit=100>; rel=\"next\"",
                    index + 1
                ),
            );
        }
        Ok(response)
    }
}

/// A remote user as the identity API returns it
pub fn user(id: &str, email: &str) -> Value {
    json!({
        "id": id,
        "status": "ACTIVE",
        "lastUpdated": "2017-06-07T02:35:15.000Z",
        "profile": {
            "firstName": format!("first-{id}"),
            "lastName": format!("last-{id}"),
            "email": email,
            "login": email
        }
    })
}

/// A remote group as the identity API returns it
pub fn group(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "type": "OKTA_GROUP",
        "profile": {"name": name, "description": ""}
    })
}

/// `count` users split into pages of `per_page`
pub fn paged_users(count: usize, per_page: usize) -> Vec<Vec<Value>> {
    let users: Vec<Value> = (0..count)
        .map(|n| user(&format!("00u{n}"), &format!("user{n}@test.com")))
        .collect();
    users.chunks(per_page).map(|chunk| chunk.to_vec()).collect()
}

pub fn ids(records: &[RemoteRecord]) -> Vec<String> {
    records.iter().filter_map(|r| r.id()).collect()
}

/// Wraps the in-memory store, recording write batch sizes and rejecting
/// any batch that touches a poisoned key
pub struct RecordingStore {
    inner: directory::InMemoryDirectoryStore,
    poisoned: Option<String>,
    reject_group_removal: bool,
    pub insert_sizes: Mutex<Vec<usize>>,
    pub update_sizes: Mutex<Vec<usize>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: directory::InMemoryDirectoryStore::new(),
            poisoned: None,
            reject_group_removal: false,
            insert_sizes: Mutex::new(Vec::new()),
            update_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Reject every batch that contains `email`
    pub fn rejecting(mut self, email: &str) -> Self {
        self.poisoned = Some(email.to_string());
        self
    }

    /// Reject every group removal
    pub fn rejecting_group_removal(mut self) -> Self {
        self.reject_group_removal = true;
        self
    }

    pub fn inner(&self) -> &directory::InMemoryDirectoryStore {
        &self.inner
    }

    fn is_poisoned<'a>(&self, mut values: impl Iterator<Item = &'a str>) -> bool {
        self.poisoned
            .as_deref()
            .is_some_and(|poisoned| values.any(|v| v == poisoned))
    }
}

mod recording_impl {
    use super::RecordingStore;
    use anyhow::{Result, bail};
    use directory::storage::DirectoryStore;
    use directory::sync::{DeleteBatch, InsertBatch, UpdateBatch};
    use directory::{GroupFilter, LocalGroup, Member};
    use std::collections::BTreeSet;

    impl DirectoryStore for RecordingStore {
        fn remote_member_keys(&self, field: &str) -> Result<Vec<String>> {
            self.inner.remote_member_keys(field)
        }

        fn insert_members(&self, batch: &InsertBatch) -> Result<usize> {
            self.insert_sizes.lock().unwrap().push(batch.rows.len());
            let emails = batch
                .rows
                .iter()
                .filter_map(|row| row.get("Email").map(String::as_str));
            if self.is_poisoned(emails) {
                bail!("constraint violation");
            }
            self.inner.insert_members(batch)
        }

        fn update_members(&self, batch: &UpdateBatch) -> Result<usize> {
            self.update_sizes.lock().unwrap().push(batch.keys.len());
            if self.is_poisoned(batch.keys.iter().map(String::as_str)) {
                bail!("constraint violation");
            }
            self.inner.update_members(batch)
        }

        fn delete_members(&self, batch: &DeleteBatch) -> Result<usize> {
            self.inner.delete_members(batch)
        }

        fn find_member(&self, field: &str, value: &str) -> Result<Option<Member>> {
            self.inner.find_member(field, value)
        }

        fn count_members(&self) -> Result<usize> {
            self.inner.count_members()
        }

        fn add_local_member(&self, member: Member) -> Result<()> {
            self.inner.add_local_member(member)
        }

        fn remote_group_ids(&self) -> Result<BTreeSet<String>> {
            self.inner.remote_group_ids()
        }

        fn has_remote_group(&self, remote_id: &str) -> Result<bool> {
            self.inner.has_remote_group(remote_id)
        }

        fn create_group(&self, group: LocalGroup) -> Result<()> {
            self.inner.create_group(group)
        }

        fn delete_groups(&self, remote_ids: &BTreeSet<String>) -> Result<usize> {
            if self.reject_group_removal {
                bail!("database is locked");
            }
            self.inner.delete_groups(remote_ids)
        }

        fn list_groups(&self) -> Result<Vec<LocalGroup>> {
            self.inner.list_groups()
        }

        fn group_filters(&self) -> Result<Vec<GroupFilter>> {
            self.inner.group_filters()
        }

        fn add_group_filter(&self, filter: GroupFilter) -> Result<()> {
            self.inner.add_group_filter(filter)
        }

        fn member_sources(&self) -> Result<Vec<String>> {
            self.inner.member_sources()
        }

        fn add_member_source(&self, group_id: &str) -> Result<()> {
            self.inner.add_member_source(group_id)
        }

        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
    }
}
