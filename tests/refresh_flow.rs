//! Integration tests for the refresh engine: due listing, fetch +
//! reconciliation through the service surface, probing, and the batch
//! failure-reporting asymmetry.
//!
//! Remote feeds are mocked with wiremock; each test gets its own in-memory
//! SQLite database.

use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use roost::storage::Database;
use roost::{Config, Error, NewCollection, Service};

const THREE_ITEM_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
  <title>Mock Feed</title>
  <description>Three items</description>
  <item><title>One</title><link>https://example.com/1</link><description>first</description></item>
  <item><title>Two</title><link>https://example.com/2</link><description>second</description></item>
  <item><title>Three</title><link>https://example.com/3</link><description>third</description></item>
</channel></rss>"#;

async fn test_service() -> Service {
    let db = Database::open(":memory:").await.unwrap();
    Service::new(db, reqwest::Client::new(), Config::default())
}

fn titled(title: &str) -> NewCollection {
    NewCollection {
        title: title.to_string(),
        ..Default::default()
    }
}

fn feed(title: &str, url: &str, parent_id: Option<i64>) -> NewCollection {
    NewCollection {
        title: title.to_string(),
        url: Some(url.to_string()),
        parent_id,
        refresh_interval: Some(60),
        ..Default::default()
    }
}

async fn mock_feed_server(body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(&server)
        .await;
    server
}

// ============================================================================
// Refresh One / Subtree
// ============================================================================

#[tokio::test]
async fn test_refresh_one_populates_subtree_unread_counts() {
    // create root A (no url) -> child B with a feed -> refreshOne(B) with 3
    // items -> A.unread == 3, B.unread == 3, B.date_updated set
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    let a = service.create_collection(1, titled("A")).await.unwrap();
    let b = service
        .create_collection(1, feed("B", &format!("{}/feed", server.uri()), Some(a.id)))
        .await
        .unwrap();

    let before = chrono::Utc::now().timestamp();
    let outcome = service.refresh_one(1, b.id).await.unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.refreshed, vec![b.id]);
    assert_eq!(outcome.new_items, 3);

    let tree = service.list_tree(1).await.unwrap();
    let a_node = tree.iter().find(|n| n.collection.id == a.id).unwrap();
    let b_node = tree.iter().find(|n| n.collection.id == b.id).unwrap();
    assert_eq!(a_node.unread_count, 3, "parent aggregates child unread items");
    assert_eq!(b_node.unread_count, 3);
    assert!(b_node.collection.date_updated.unwrap() >= before);
    assert!(a_node.collection.date_updated.is_none());
}

#[tokio::test]
async fn test_refresh_subtree_targets_only_feeds_below_root() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    let root = service.create_collection(1, titled("Root")).await.unwrap();
    let inner = service
        .create_collection(1, feed("Inner", &format!("{}/a", server.uri()), Some(root.id)))
        .await
        .unwrap();
    let outside = service
        .create_collection(1, feed("Outside", &format!("{}/b", server.uri()), None))
        .await
        .unwrap();

    let outcome = service.refresh_subtree(1, root.id).await.unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.refreshed, vec![inner.id]);

    let outside_after = service
        .list_tree(1)
        .await
        .unwrap()
        .into_iter()
        .find(|n| n.collection.id == outside.id)
        .unwrap();
    assert!(outside_after.collection.date_updated.is_none());
}

#[tokio::test]
async fn test_refresh_twice_never_duplicates_items() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    let c = service
        .create_collection(1, feed("Feed", &format!("{}/feed", server.uri()), None))
        .await
        .unwrap();

    service.refresh_one(1, c.id).await.unwrap();
    let items = service.list_items(1, c.id).await.unwrap();
    assert_eq!(items.len(), 3);

    // mark one read, then re-fetch the unchanged feed
    service
        .set_item_read(1, c.id, items[0].id, Some(123))
        .await
        .unwrap();

    let outcome = service.refresh_one(1, c.id).await.unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.new_items, 0);

    let items_after = service.list_items(1, c.id).await.unwrap();
    assert_eq!(items_after.len(), 3, "same item count after re-fetch");
    let read: Vec<_> = items_after.iter().filter(|i| i.date_read.is_some()).collect();
    assert_eq!(read.len(), 1, "read state preserved");
    assert_eq!(read[0].date_read, Some(123));
}

// ============================================================================
// Batch Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_all_partial_failure_reports_batch_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/good"))
        .respond_with(ResponseTemplate::new(200).set_body_string(THREE_ITEM_RSS))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/bad"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let service = test_service().await;
    let good = service
        .create_collection(1, feed("Good", &format!("{}/good", server.uri()), None))
        .await
        .unwrap();
    let bad = service
        .create_collection(1, feed("Bad", &format!("{}/bad", server.uri()), None))
        .await
        .unwrap();

    let outcome = service.refresh_all(1).await.unwrap();
    assert!(!outcome.all_succeeded(), "one failure fails the whole batch");
    assert_eq!(outcome.refreshed, vec![good.id]);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].collection_id, bad.id);

    // success is per-collection durable despite the batch-level failure
    let tree = service.list_tree(1).await.unwrap();
    let good_node = tree.iter().find(|n| n.collection.id == good.id).unwrap();
    let bad_node = tree.iter().find(|n| n.collection.id == bad.id).unwrap();
    assert!(good_node.collection.date_updated.is_some());
    assert!(bad_node.collection.date_updated.is_none());
    assert_eq!(good_node.unread_count, 3);
}

#[tokio::test]
async fn test_refresh_all_skips_collections_without_urls() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    service.create_collection(1, titled("Plain folder")).await.unwrap();
    let with_feed = service
        .create_collection(1, feed("Feed", &format!("{}/feed", server.uri()), None))
        .await
        .unwrap();

    let outcome = service.refresh_all(1).await.unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.refreshed, vec![with_feed.id]);
}

// ============================================================================
// Due Listing
// ============================================================================

#[tokio::test]
async fn test_list_due_only_returns_stale_feeds() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    service.create_collection(1, titled("No url")).await.unwrap();
    let never_refreshed = service
        .create_collection(1, feed("Never", &format!("{}/a", server.uri()), None))
        .await
        .unwrap();
    let refreshed = service
        .create_collection(1, feed("Done", &format!("{}/b", server.uri()), None))
        .await
        .unwrap();
    service.refresh_one(1, refreshed.id).await.unwrap();

    let due = service.list_due(1).await.unwrap();
    let due_ids: Vec<i64> = due.iter().map(|c| c.id).collect();
    assert_eq!(due_ids, vec![never_refreshed.id]);
    assert!(due.iter().all(|c| c.url.is_some()));
}

#[tokio::test]
async fn test_mark_subtree_read_zeroes_unread_counts() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    let root = service.create_collection(1, titled("Root")).await.unwrap();
    let child = service
        .create_collection(1, feed("Child", &format!("{}/feed", server.uri()), Some(root.id)))
        .await
        .unwrap();
    service.refresh_one(1, child.id).await.unwrap();

    let affected = service
        .mark_subtree_read(1, root.id, chrono::Utc::now().timestamp())
        .await
        .unwrap();
    assert!(affected.contains(&root.id));
    assert!(affected.contains(&child.id));

    let tree = service.list_tree(1).await.unwrap();
    assert!(tree.iter().all(|n| n.unread_count == 0));
    let items = service.list_items(1, child.id).await.unwrap();
    assert!(items.iter().all(|i| i.date_read.is_some()));
}

// ============================================================================
// Probe
// ============================================================================

#[tokio::test]
async fn test_probe_returns_metadata_without_persisting() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    let info = service
        .probe_feed(1, &format!("{}/feed", server.uri()))
        .await
        .unwrap();
    assert_eq!(info.title, "Mock Feed");
    assert_eq!(info.description.as_deref(), Some("Three items"));

    assert!(service.list_tree(1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_probe_duplicate_url_conflicts() {
    let server = mock_feed_server(THREE_ITEM_RSS).await;
    let service = test_service().await;

    let url = format!("{}/feed", server.uri());
    service.create_collection(1, feed("Existing", &url, None)).await.unwrap();

    let err = service.probe_feed(1, &url).await.unwrap_err();
    assert!(matches!(err, Error::DuplicateFeed));

    // another owner may probe the same feed
    assert!(service.probe_feed(2, &url).await.is_ok());
}

#[tokio::test]
async fn test_probe_invalid_feed_is_fetch_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not a feed</html>"))
        .mount(&server)
        .await;

    let service = test_service().await;
    let err = service
        .probe_feed(1, &format!("{}/page", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));
}

#[tokio::test]
async fn test_probe_unreachable_feed_is_fetch_error() {
    let service = test_service().await;
    let err = service.probe_feed(1, "http://127.0.0.1:1/feed").await.unwrap_err();
    assert!(matches!(err, Error::Fetch(_)));
}
