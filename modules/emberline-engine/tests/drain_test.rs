//! Drain loop: raw posts become processed posts with resolved content.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use emberline_common::{Content, Post};
use emberline_engine::drain::{drain_raw_posts, ContentExtractor};
use emberline_store::{MemoryStore, TrendStore};

const UNIVERSE: &str = "testville";

/// Resolves everything to a bare record; fails on urls containing "broken".
struct StubExtractor;

#[async_trait]
impl ContentExtractor for StubExtractor {
    async fn extract(&self, url: &str) -> anyhow::Result<Content> {
        if url.contains("broken") {
            anyhow::bail!("fetch failed for {url}");
        }
        Ok(Content::bare(url))
    }
}

fn raw(id: &str, url: &str) -> Post {
    Post {
        id: id.to_string(),
        author_id: "someone".to_string(),
        content_url: url.to_string(),
        created: Utc::now() - Duration::minutes(2),
        text: String::new(),
    }
}

#[tokio::test]
async fn drains_queue_and_saves_both_sides() {
    let store = MemoryStore::new();
    store
        .enqueue_raw_post(UNIVERSE, &raw("1", "https://t.test/a/"))
        .await
        .unwrap();
    store
        .enqueue_raw_post(UNIVERSE, &raw("2", "https://t.test/b"))
        .await
        .unwrap();

    let consumed = drain_raw_posts(&store, &StubExtractor, UNIVERSE, 10)
        .await
        .unwrap();

    assert_eq!(consumed, 2);
    assert_eq!(store.raw_len(UNIVERSE), 0);
    // The post was repointed at the canonical (trimmed) url.
    let content = store
        .get_content_batch(UNIVERSE, &["https://t.test/a".to_string()])
        .await
        .unwrap();
    assert_eq!(content.len(), 1);
}

#[tokio::test]
async fn extraction_failure_drops_the_post_and_continues() {
    let store = MemoryStore::new();
    store
        .enqueue_raw_post(UNIVERSE, &raw("1", "https://t.test/broken"))
        .await
        .unwrap();
    store
        .enqueue_raw_post(UNIVERSE, &raw("2", "https://t.test/fine"))
        .await
        .unwrap();

    let consumed = drain_raw_posts(&store, &StubExtractor, UNIVERSE, 10)
        .await
        .unwrap();

    // Both raw posts were consumed; only the good one was saved.
    assert_eq!(consumed, 2);
    assert_eq!(store.raw_len(UNIVERSE), 0);
    let content = store
        .get_content_batch(UNIVERSE, &["https://t.test/fine".to_string()])
        .await
        .unwrap();
    assert_eq!(content.len(), 1);
    let missing = store
        .get_content_batch(UNIVERSE, &["https://t.test/broken".to_string()])
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn batch_limit_caps_one_pass() {
    let store = MemoryStore::new();
    for i in 0..5 {
        store
            .enqueue_raw_post(UNIVERSE, &raw(&format!("{i}"), "https://t.test/x"))
            .await
            .unwrap();
    }

    let consumed = drain_raw_posts(&store, &StubExtractor, UNIVERSE, 3)
        .await
        .unwrap();

    assert_eq!(consumed, 3);
    assert_eq!(store.raw_len(UNIVERSE), 2);
}
