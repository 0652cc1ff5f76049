//! Cursor-walking pagination over list queries

use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use super::api::{PageResult, RawResponse};
use super::cache::{ResponseCache, fingerprint};
use super::client::{FetchError, RemoteClient};
use super::link::next_cursor;
use super::query::ListQuery;
use crate::config::CacheTtls;
use crate::models::RemoteRecord;

/// What a walk does when one page fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageErrorPolicy {
    /// Stop the walk and return the records gathered so far
    #[default]
    PartialResult,
    /// Stop the walk and return the error
    Abort,
}

/// Records gathered by one walk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchOutcome {
    pub records: Vec<RemoteRecord>,
    /// Number of pages that were successfully retrieved
    pub pages: usize,
    /// The page failure that ended the walk early, if any
    pub interrupted: Option<FetchError>,
}

impl FetchOutcome {
    /// Whether the walk reached the last page.
    ///
    /// An incomplete outcome only proves the records it holds exist; it says
    /// nothing about records on the pages that were never read.
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

/// Walks a list query to exhaustion, one cached page at a time
pub struct PaginatingFetcher<'a> {
    client: &'a dyn RemoteClient,
    cache: &'a ResponseCache,
    ttls: CacheTtls,
    on_page_error: PageErrorPolicy,
}

impl<'a> PaginatingFetcher<'a> {
    pub fn new(client: &'a dyn RemoteClient, cache: &'a ResponseCache, ttls: CacheTtls) -> Self {
        Self {
            client,
            cache,
            ttls,
            on_page_error: PageErrorPolicy::default(),
        }
    }

    /// Builder method to set the page error policy
    pub fn with_page_error_policy(mut self, policy: PageErrorPolicy) -> Self {
        self.on_page_error = policy;
        self
    }

    /// Fetch every page of `query`, `limit` records per page.
    ///
    /// The walk is forward-only: a cursor that was already followed ends it.
    /// An empty page that still links to a next page is followed.
    pub fn fetch_all(&self, query: &ListQuery, limit: usize) -> Result<FetchOutcome, FetchError> {
        let mut outcome = FetchOutcome::default();
        let mut cursor: Option<String> = None;
        let mut visited: HashSet<String> = HashSet::new();

        loop {
            let page = match self.fetch_page(query, limit, cursor.as_deref()) {
                Ok(page) => page,
                Err(e) => match self.on_page_error {
                    PageErrorPolicy::PartialResult => {
                        warn!(
                            "Stopping {} walk after {} pages with {} records: {}",
                            query.kind().as_str(),
                            outcome.pages,
                            outcome.records.len(),
                            e
                        );
                        outcome.interrupted = Some(e);
                        return Ok(outcome);
                    }
                    PageErrorPolicy::Abort => return Err(e),
                },
            };

            outcome.pages += 1;
            outcome.records.extend(page.records);

            match page.next_cursor {
                Some(next) if visited.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!(
                        "Cursor {next} was already followed in this {} walk, stopping",
                        query.kind().as_str()
                    );
                    break;
                }
                None => break,
            }
        }

        debug!(
            "Fetched {} {} records in {} pages",
            outcome.records.len(),
            query.kind().as_str(),
            outcome.pages
        );
        Ok(outcome)
    }

    /// Fetch one record by endpoint, bypassing the page cache
    pub fn fetch_record(&self, endpoint: &str) -> Result<RemoteRecord, FetchError> {
        let result = self
            .client
            .get(endpoint)
            .and_then(|response| decode_record(endpoint, response));
        if let Err(e) = &result {
            error!("Error fetching from the identity API: {e}");
        }
        result
    }

    /// Fetch and decode one page, going through the response cache
    pub fn fetch_page(
        &self,
        query: &ListQuery,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<PageResult, FetchError> {
        let key = fingerprint(
            query.kind(),
            limit,
            cursor,
            &query.filters(),
            query.watermark(),
        );
        let ttl = self.ttls.for_kind(query.kind());

        self.cache.get_or_fetch(&key, ttl, || {
            let endpoint = query.endpoint(limit, cursor);
            let result = self
                .client
                .get(&endpoint)
                .and_then(|response| decode_page(&endpoint, response));
            if let Err(e) = &result {
                error!("Error fetching from the identity API: {e}");
            }
            result
        })
    }
}

/// Decode a raw response into a page of records
fn decode_page(endpoint: &str, response: RawResponse) -> Result<PageResult, FetchError> {
    if response.status != 200 {
        return Err(FetchError::Status {
            endpoint: endpoint.to_string(),
            status: response.status,
        });
    }

    let decoded: Value =
        serde_json::from_slice(&response.body).map_err(|e| FetchError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        })?;

    let Value::Array(items) = decoded else {
        return Err(FetchError::Decode {
            endpoint: endpoint.to_string(),
            message: "expected a JSON array of records".to_string(),
        });
    };

    Ok(PageResult {
        records: items.into_iter().map(RemoteRecord::new).collect(),
        next_cursor: next_cursor(response.header_values("link")),
    })
}

/// Decode a raw response holding a single record object
fn decode_record(endpoint: &str, response: RawResponse) -> Result<RemoteRecord, FetchError> {
    if response.status != 200 {
        return Err(FetchError::Status {
            endpoint: endpoint.to_string(),
            status: response.status,
        });
    }

    match serde_json::from_slice(&response.body) {
        Ok(value @ Value::Object(_)) => Ok(RemoteRecord::new(value)),
        Ok(_) => Err(FetchError::Decode {
            endpoint: endpoint.to_string(),
            message: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(FetchError::Decode {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        }),
    }
}
