//! Identity API integration
//!
//! This module provides:
//! - The `RemoteClient` seam and its `ureq` implementation
//! - Endpoint and filter construction for list queries
//! - `Link` header cursor extraction
//! - A short-TTL page cache and the paginating fetcher built on it

mod cache;
mod client;
mod fetcher;
mod link;
mod query;

pub use cache::{CacheEntry, ResponseCache, fingerprint};
pub use client::{FetchError, OktaClient, RemoteClient};
pub use fetcher::{FetchOutcome, PageErrorPolicy, PaginatingFetcher};
pub use link::next_cursor;
pub use query::{ListQuery, OperationKind, format_watermark, user_endpoint};

/// Identity API response types
pub mod api {
    use crate::models::RemoteRecord;

    /// Raw HTTP response as seen by the fetcher
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct RawResponse {
        pub status: u16,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl RawResponse {
        /// A 200 response with the given body and no headers
        pub fn ok(body: impl Into<Vec<u8>>) -> Self {
            Self {
                status: 200,
                headers: Vec::new(),
                body: body.into(),
            }
        }

        /// A response with the given status and an empty body
        pub fn status(status: u16) -> Self {
            Self {
                status,
                headers: Vec::new(),
                body: Vec::new(),
            }
        }

        /// Builder method to append a header
        pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.headers.push((name.into(), value.into()));
            self
        }

        /// All values of a header, matched case-insensitively
        pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
            self.headers
                .iter()
                .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str())
        }
    }

    /// One decoded page of a list query
    #[derive(Debug, Clone, PartialEq, Default)]
    pub struct PageResult {
        pub records: Vec<RemoteRecord>,
        /// Cursor for the following page; `None` on the last page
        pub next_cursor: Option<String>,
    }
}
