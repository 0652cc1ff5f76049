//! List endpoints and filter expressions

use chrono::{DateTime, Utc};

/// The kinds of list operations the identity API offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Users,
    Groups,
    GroupMembers,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
            Self::GroupMembers => "group-members",
        }
    }
}

/// A logical list query, walked page by page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListQuery {
    /// `GET users`, optionally filtered by status and last update time
    Users {
        statuses: Vec<String>,
        last_updated: Option<DateTime<Utc>>,
    },
    /// `GET groups`
    Groups,
    /// `GET groups/<id>/users`
    GroupMembers { group_id: String },
}

impl ListQuery {
    /// All users with one of the given statuses
    pub fn users(statuses: &[String]) -> Self {
        Self::Users {
            statuses: statuses.to_vec(),
            last_updated: None,
        }
    }

    /// Users with one of the given statuses updated after `since`
    pub fn users_updated_since(statuses: &[String], since: DateTime<Utc>) -> Self {
        Self::Users {
            statuses: statuses.to_vec(),
            last_updated: Some(since),
        }
    }

    pub fn group_members(group_id: impl Into<String>) -> Self {
        Self::GroupMembers {
            group_id: group_id.into(),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Users { .. } => OperationKind::Users,
            Self::Groups => OperationKind::Groups,
            Self::GroupMembers { .. } => OperationKind::GroupMembers,
        }
    }

    /// Parameters beyond limit and cursor that select the result set
    pub fn filters(&self) -> Vec<String> {
        match self {
            Self::Users { statuses, .. } => statuses.clone(),
            Self::Groups => Vec::new(),
            Self::GroupMembers { group_id } => vec![group_id.clone()],
        }
    }

    /// Lower bound on `lastUpdated`, for incremental queries
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Users { last_updated, .. } => *last_updated,
            _ => None,
        }
    }

    /// Endpoint path and query string for one page
    pub fn endpoint(&self, limit: usize, after: Option<&str>) -> String {
        let after_param = after
            .filter(|cursor| !cursor.is_empty())
            .map(|cursor| format!("&after={}", urlencoding::encode(cursor)))
            .unwrap_or_default();

        match self {
            Self::Users {
                statuses,
                last_updated,
            } => {
                let filter_param = users_filter(statuses, *last_updated)
                    .map(|expr| format!("&filter={}", urlencoding::encode(&expr)))
                    .unwrap_or_default();
                format!("users?limit={limit}{filter_param}{after_param}")
            }
            Self::Groups => format!("groups?limit={limit}{after_param}"),
            Self::GroupMembers { group_id } => format!(
                "groups/{}/users?limit={limit}{after_param}",
                urlencoding::encode(group_id)
            ),
        }
    }
}

/// Endpoint of a single user, `GET users/<id>`
pub fn user_endpoint(remote_id: &str) -> String {
    format!("users/{}", urlencoding::encode(remote_id))
}

/// Format a watermark the way the API filter syntax expects
pub fn format_watermark(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S.000Z").to_string()
}

/// Build the unencoded filter expression for a users query.
///
/// Statuses combine as `status eq "A" or status eq "B"`. With a watermark
/// the disjunction is parenthesized and ANDed with `lastUpdated gt "<ts>"`.
fn users_filter(statuses: &[String], last_updated: Option<DateTime<Utc>>) -> Option<String> {
    let status_expr = statuses
        .iter()
        .map(|status| format!("status eq \"{status}\""))
        .collect::<Vec<_>>()
        .join(" or ");

    match (status_expr.is_empty(), last_updated) {
        (true, None) => None,
        (false, None) => Some(status_expr),
        (true, Some(ts)) => Some(format!("lastUpdated gt \"{}\"", format_watermark(ts))),
        (false, Some(ts)) => Some(format!(
            "({status_expr}) and lastUpdated gt \"{}\"",
            format_watermark(ts)
        )),
    }
}
