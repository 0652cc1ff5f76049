//! Size-bounded bulk write planning
//!
//! Writing one member at a time does not scale to a directory of tens of
//! thousands of users. Inserts are chunked into multi-row batches; updates
//! are chunked and consolidated into one conditional assignment per field
//! (field -> {key -> new value}) which the store applies set-wise.

use log::error;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::SyncConfig;
use crate::models::{FieldMapping, FieldValues, RemoteRecord};
use crate::storage::DirectoryStore;

/// Rows for one bulk insert
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InsertBatch {
    pub rows: Vec<FieldValues>,
}

/// One set-based conditional update.
///
/// For every field, `fields[field][key]` is the new value for the member
/// whose `key_field` equals `key`. A member missing from a field's map keeps
/// its current value for that field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateBatch {
    pub key_field: String,
    /// Keys of the members touched by this batch, in record order
    pub keys: Vec<String>,
    pub fields: BTreeMap<String, BTreeMap<String, String>>,
}

impl UpdateBatch {
    /// New value of `field` for the member keyed `key`, if it changes
    pub fn value_for(&self, field: &str, key: &str) -> Option<&str> {
        self.fields.get(field)?.get(key).map(String::as_str)
    }
}

/// A disjunctive delete: remove every remote-origin member whose
/// `key_field` is one of `keys`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeleteBatch {
    pub key_field: String,
    pub keys: BTreeSet<String>,
}

/// Kinds of bulk write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for WriteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// A batch the store rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub kind: WriteKind,
    /// Number of member keys in the rejected batch
    pub key_count: usize,
    pub message: String,
}

/// Outcome of applying a set of batches
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WriteReport {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failures: Vec<WriteFailure>,
}

impl WriteReport {
    fn record_failure(&mut self, kind: WriteKind, key_count: usize, err: &anyhow::Error) {
        error!("Failed to apply {kind} batch of {key_count} members: {err:#}");
        self.failures.push(WriteFailure {
            kind,
            key_count,
            message: format!("{err:#}"),
        });
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Plans and applies bounded bulk writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWriter {
    insert_batch_size: usize,
    update_batch_size: usize,
}

impl BatchWriter {
    /// Create a writer with the given ceilings; zero is treated as one
    pub fn new(insert_batch_size: usize, update_batch_size: usize) -> Self {
        Self {
            insert_batch_size: insert_batch_size.max(1),
            update_batch_size: update_batch_size.max(1),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.insert_batch_size, config.update_batch_size)
    }

    /// Split records into insert batches of at most `insert_batch_size` rows
    pub fn plan_inserts(&self, records: &[RemoteRecord], mapping: &FieldMapping) -> Vec<InsertBatch> {
        records
            .chunks(self.insert_batch_size)
            .map(|chunk| InsertBatch {
                rows: chunk.iter().map(|record| mapping.values_for(record)).collect(),
            })
            .collect()
    }

    /// Split records into update batches keyed on the unique identity field.
    ///
    /// Every resolvable mapped value is written, including empty strings, so
    /// a value cleared remotely is cleared locally too.
    pub fn plan_updates(&self, records: &[RemoteRecord], mapping: &FieldMapping) -> Vec<UpdateBatch> {
        self.plan_keyed_updates(records, mapping, mapping.unique_field(), false)
    }

    /// Split records into update batches keyed on `key_field`, skipping empty values.
    ///
    /// Used for incremental refreshes, where an empty remote value is not
    /// trusted to overwrite local data.
    pub fn plan_refresh(
        &self,
        records: &[RemoteRecord],
        mapping: &FieldMapping,
        key_field: &str,
    ) -> Vec<UpdateBatch> {
        self.plan_keyed_updates(records, mapping, key_field, true)
    }

    fn plan_keyed_updates(
        &self,
        records: &[RemoteRecord],
        mapping: &FieldMapping,
        key_field: &str,
        skip_empty: bool,
    ) -> Vec<UpdateBatch> {
        let keyed: Vec<(String, &RemoteRecord)> = records
            .iter()
            .filter_map(|record| mapping.key_of(record, key_field).map(|key| (key, record)))
            .collect();

        keyed
            .chunks(self.update_batch_size)
            .map(|chunk| {
                let mut batch = UpdateBatch {
                    key_field: key_field.to_string(),
                    ..UpdateBatch::default()
                };

                for (key, _) in chunk {
                    if !batch.keys.contains(key) {
                        batch.keys.push(key.clone());
                    }
                }

                for (field, path) in mapping.iter() {
                    let assignments: BTreeMap<String, String> = chunk
                        .iter()
                        .filter_map(|(key, record)| {
                            record
                                .resolve(path)
                                .filter(|value| !(skip_empty && value.is_empty()))
                                .map(|value| (key.clone(), value))
                        })
                        .collect();

                    if !assignments.is_empty() {
                        batch.fields.insert(field.to_string(), assignments);
                    }
                }

                batch
            })
            .collect()
    }

    /// A single delete for all keys, or `None` when there is nothing to delete
    pub fn plan_deletes(&self, keys: &BTreeSet<String>, key_field: &str) -> Option<DeleteBatch> {
        if keys.is_empty() {
            return None;
        }
        Some(DeleteBatch {
            key_field: key_field.to_string(),
            keys: keys.clone(),
        })
    }

    /// Apply insert batches; a rejected batch does not stop the rest
    pub fn apply_inserts(
        &self,
        store: &dyn DirectoryStore,
        batches: &[InsertBatch],
        report: &mut WriteReport,
    ) {
        for batch in batches {
            match store.insert_members(batch) {
                Ok(count) => report.inserted += count,
                Err(e) => report.record_failure(WriteKind::Insert, batch.rows.len(), &e),
            }
        }
    }

    /// Apply update batches; a rejected batch does not stop the rest
    pub fn apply_updates(
        &self,
        store: &dyn DirectoryStore,
        batches: &[UpdateBatch],
        report: &mut WriteReport,
    ) {
        for batch in batches {
            match store.update_members(batch) {
                Ok(count) => report.updated += count,
                Err(e) => report.record_failure(WriteKind::Update, batch.keys.len(), &e),
            }
        }
    }

    /// Apply a delete batch, if any
    pub fn apply_delete(
        &self,
        store: &dyn DirectoryStore,
        batch: Option<&DeleteBatch>,
        report: &mut WriteReport,
    ) {
        let Some(batch) = batch else {
            return;
        };
        match store.delete_members(batch) {
            Ok(count) => report.deleted += count,
            Err(e) => report.record_failure(WriteKind::Delete, batch.keys.len(), &e),
        }
    }
}

impl Default for BatchWriter {
    fn default() -> Self {
        Self::new(500, 300)
    }
}
