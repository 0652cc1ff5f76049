//! Group import filter matching

use crate::models::{GroupFilter, RemoteRecord};

/// Whether a remote group passes the import filters.
///
/// No filters means every group is imported. Otherwise the group is
/// imported when the value at any filter's path equals that filter's
/// expected value exactly. A path that does not resolve never matches.
pub fn matches(group: &RemoteRecord, filters: &[GroupFilter]) -> bool {
    if filters.is_empty() {
        return true;
    }

    filters
        .iter()
        .any(|filter| group.resolve(&filter.path).as_deref() == Some(filter.expected_value.as_str()))
}
