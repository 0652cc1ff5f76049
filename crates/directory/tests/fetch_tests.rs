//! Pagination and page cache behavior against a scripted identity API

mod common;

use common::{ScriptedClient, ids, paged_users, user};
use directory::CacheTtls;
use directory::okta::{FetchError, ListQuery, PageErrorPolicy, PaginatingFetcher, ResponseCache};

fn statuses() -> Vec<String> {
    vec!["ACTIVE".to_string()]
}

#[test]
fn test_walk_returns_every_page_in_order() {
    let client = ScriptedClient::new().with_pages("users", paged_users(10, 3));
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());

    let outcome = fetcher.fetch_all(&ListQuery::users(&statuses()), 3).unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.pages, 4);
    let expected: Vec<String> = (0..10).map(|n| format!("00u{n}")).collect();
    assert_eq!(ids(&outcome.records), expected);
    assert_eq!(client.call_count(), 4);
}

#[test]
fn test_limit_and_cursor_are_forwarded() {
    let client = ScriptedClient::new().with_pages("groups", vec![vec![], vec![]]);
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());

    fetcher.fetch_all(&ListQuery::Groups, 250).unwrap();

    assert_eq!(
        client.calls(),
        vec!["groups?limit=250", "groups?limit=250&after=page-1"]
    );
}

#[test]
fn test_empty_intermediate_page_is_followed() {
    let client = ScriptedClient::new().with_pages(
        "groups/00g1/users",
        vec![
            vec![user("1", "a@test.com")],
            vec![],
            vec![user("2", "b@test.com")],
        ],
    );
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());

    let outcome = fetcher
        .fetch_all(&ListQuery::group_members("00g1"), 100)
        .unwrap();
    assert_eq!(ids(&outcome.records), vec!["1", "2"]);
}

#[test]
fn test_second_walk_is_served_from_cache() {
    let client = ScriptedClient::new().with_pages("users", paged_users(5, 2));
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());
    let query = ListQuery::users(&statuses());

    let first = fetcher.fetch_all(&query, 2).unwrap();
    let calls_after_first = client.call_count();
    let second = fetcher.fetch_all(&query, 2).unwrap();

    assert_eq!(calls_after_first, 3);
    assert_eq!(client.call_count(), 3);
    assert_eq!(first, second);
}

#[test]
fn test_different_limit_misses_cache() {
    let client = ScriptedClient::new().with_pages("users", paged_users(2, 2));
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());
    let query = ListQuery::users(&statuses());

    fetcher.fetch_all(&query, 2).unwrap();
    fetcher.fetch_all(&query, 50).unwrap();
    assert_eq!(client.call_count(), 2);
}

#[test]
fn test_failed_page_returns_partial_result() {
    let client = ScriptedClient::new()
        .with_pages("users", paged_users(9, 3))
        .failing_page("users", 2);
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());

    let outcome = fetcher.fetch_all(&ListQuery::users(&statuses()), 3).unwrap();

    assert!(!outcome.is_complete());
    assert_eq!(outcome.pages, 2);
    assert_eq!(outcome.records.len(), 6);
    assert!(matches!(
        outcome.interrupted,
        Some(FetchError::Status { status: 500, .. })
    ));
}

#[test]
fn test_failed_page_is_not_cached() {
    let client = ScriptedClient::new()
        .with_pages("users", paged_users(4, 2))
        .failing_page("users", 1);
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());
    let query = ListQuery::users(&statuses());

    fetcher.fetch_all(&query, 2).unwrap();
    fetcher.fetch_all(&query, 2).unwrap();

    // first page cached, failing page requested on both walks
    assert_eq!(client.call_count(), 3);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_abort_policy_returns_error() {
    let client = ScriptedClient::new()
        .with_pages("users", paged_users(9, 3))
        .failing_page("users", 1);
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default())
        .with_page_error_policy(PageErrorPolicy::Abort);

    let err = fetcher
        .fetch_all(&ListQuery::users(&statuses()), 3)
        .unwrap_err();
    assert_eq!(err.endpoint(), "users?limit=3&filter=status%20eq%20%22ACTIVE%22&after=page-1");
}

#[test]
fn test_missing_route_stops_walk() {
    let client = ScriptedClient::new().with_pages("groups", vec![]);
    let cache = ResponseCache::new();
    let fetcher = PaginatingFetcher::new(&client, &cache, CacheTtls::default());

    // no pages scripted: the client answers 404
    let outcome = fetcher.fetch_all(&ListQuery::Groups, 100).unwrap();
    assert!(outcome.records.is_empty());
    assert!(!outcome.is_complete());
}
