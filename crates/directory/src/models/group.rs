//! Local groups and group import filters

use serde::{Deserialize, Serialize};

use super::record::FieldPath;

/// A locally stored group that was created from a remote directory group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGroup {
    /// Remote group id, unique among remote-origin groups
    pub remote_id: String,
    /// Remote group name (may be empty)
    pub remote_name: String,
    /// Display title; the remote name, or the id when the name is empty
    pub title: String,
}

impl LocalGroup {
    /// Create a local group from a remote id and name
    pub fn from_remote(remote_id: impl Into<String>, remote_name: impl Into<String>) -> Self {
        let remote_id = remote_id.into();
        let remote_name = remote_name.into();
        let title = if remote_name.is_empty() {
            remote_id.clone()
        } else {
            remote_name.clone()
        };

        Self {
            remote_id,
            remote_name,
            title,
        }
    }
}

/// An operator-defined rule for importing remote groups.
///
/// A group is imported when the value at `path` equals `expected_value`
/// exactly. Several filters combine with OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupFilter {
    pub path: FieldPath,
    pub expected_value: String,
}

impl GroupFilter {
    pub fn new(path: FieldPath, expected_value: impl Into<String>) -> Self {
        Self {
            path,
            expected_value: expected_value.into(),
        }
    }
}
