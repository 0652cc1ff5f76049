//! Local directory members

use serde::{Deserialize, Serialize};

use super::mapping::FieldValues;

/// A member of the local directory.
///
/// Only remote-origin members are ever matched, updated or deleted by a
/// sync; members created locally are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Member {
    /// Whether this member was created from the remote directory
    pub is_remote: bool,
    pub fields: FieldValues,
}

impl Member {
    /// A member created from the remote directory
    pub fn remote(fields: FieldValues) -> Self {
        Self {
            is_remote: true,
            fields,
        }
    }

    /// A member created locally
    pub fn local(fields: FieldValues) -> Self {
        Self {
            is_remote: false,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}
