//! CandidateAggregator behavior against the in-memory store.

use chrono::{Duration, Utc};

use emberline_common::{Author, Content, EmberlineError, Post};
use emberline_engine::trending::{find_top_links, TrendingOptions};
use emberline_store::{MemoryStore, TrendStore};

const UNIVERSE: &str = "testville";

fn post(id: &str, author: &str, url: &str, minutes_ago: i64) -> Post {
    Post {
        id: id.to_string(),
        author_id: author.to_string(),
        content_url: url.to_string(),
        created: Utc::now() - Duration::minutes(minutes_ago),
        text: format!("check this out {url}"),
    }
}

async fn seed_author(store: &MemoryStore, id: &str, weight: f64) {
    store
        .save_author(
            UNIVERSE,
            &Author {
                id: id.to_string(),
                handle: format!("@{id}"),
                weight,
            },
        )
        .await
        .unwrap();
}

async fn seed_link(store: &MemoryStore, url: &str, posts: &[Post]) {
    store
        .save_content(UNIVERSE, &Content::bare(url))
        .await
        .unwrap();
    for p in posts {
        store.save_post(UNIVERSE, p).await.unwrap();
    }
}

fn opts() -> TrendingOptions {
    TrendingOptions {
        quantity: 10,
        window_hours: 24,
        decay: false,
        cache_results: false,
        ..TrendingOptions::default()
    }
}

#[tokio::test]
async fn links_sorted_descending_with_contiguous_ranks() {
    let store = MemoryStore::new();
    seed_author(&store, "heavy", 10.0).await;
    seed_author(&store, "mid", 2.0).await;
    seed_author(&store, "light", 0.1).await;

    seed_link(
        &store,
        "https://t.test/small",
        &[
            post("1", "light", "https://t.test/small", 30),
            post("2", "light", "https://t.test/small", 20),
        ],
    )
    .await;
    seed_link(
        &store,
        "https://t.test/big",
        &[
            post("3", "heavy", "https://t.test/big", 25),
            post("4", "mid", "https://t.test/big", 15),
        ],
    )
    .await;
    seed_link(
        &store,
        "https://t.test/medium",
        &[
            post("5", "mid", "https://t.test/medium", 40),
            post("6", "light", "https://t.test/medium", 35),
        ],
    )
    .await;

    let links = find_top_links(&store, UNIVERSE, &opts()).await.unwrap();

    assert_eq!(links.len(), 3);
    assert_eq!(links[0].url, "https://t.test/big");
    assert_eq!(links[1].url, "https://t.test/medium");
    assert_eq!(links[2].url, "https://t.test/small");
    for pair in links.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    let ranks: Vec<usize> = links.iter().map(|l| l.rank).collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    assert!(links[0].content.is_some());
    assert!(!links[0].first_shared.is_empty());
}

#[tokio::test]
async fn links_seen_before_the_window_are_excluded() {
    let store = MemoryStore::new();
    seed_author(&store, "a", 1.0).await;
    seed_author(&store, "b", 1.0).await;

    seed_link(
        &store,
        "https://t.test/fresh",
        &[
            post("1", "a", "https://t.test/fresh", 60),
            post("2", "b", "https://t.test/fresh", 30),
        ],
    )
    .await;
    // Circulating well before the window started: permanently popular.
    seed_link(
        &store,
        "https://t.test/evergreen",
        &[
            post("3", "a", "https://t.test/evergreen", 25 * 60),
            post("4", "a", "https://t.test/evergreen", 90),
            post("5", "b", "https://t.test/evergreen", 45),
        ],
    )
    .await;

    let links = find_top_links(&store, UNIVERSE, &opts()).await.unwrap();

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "https://t.test/fresh");
}

#[tokio::test]
async fn single_post_links_never_qualify() {
    let store = MemoryStore::new();
    seed_author(&store, "a", 5.0).await;
    seed_link(
        &store,
        "https://t.test/once",
        &[post("1", "a", "https://t.test/once", 10)],
    )
    .await;

    let err = find_top_links(&store, UNIVERSE, &opts()).await.unwrap_err();
    assert!(matches!(err, EmberlineError::NoCandidates));
}

#[tokio::test]
async fn empty_window_is_no_candidates() {
    let store = MemoryStore::new();
    let err = find_top_links(&store, UNIVERSE, &opts()).await.unwrap_err();
    assert!(matches!(err, EmberlineError::NoCandidates));
}

#[tokio::test]
async fn unresolved_content_is_dropped_without_rank_holes() {
    let store = MemoryStore::new();
    seed_author(&store, "big", 10.0).await;
    seed_author(&store, "small", 0.5).await;

    // Highest-scoring link has no content record (deleted or never saved).
    for p in [
        post("1", "big", "https://t.test/ghost", 20),
        post("2", "small", "https://t.test/ghost", 10),
    ] {
        store.save_post(UNIVERSE, &p).await.unwrap();
    }
    seed_link(
        &store,
        "https://t.test/real",
        &[
            post("3", "small", "https://t.test/real", 15),
            post("4", "big", "https://t.test/real", 5),
        ],
    )
    .await;

    let links = find_top_links(&store, UNIVERSE, &opts()).await.unwrap();

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].url, "https://t.test/real");
    assert_eq!(links[0].rank, 1);
}

#[tokio::test]
async fn ranked_snapshot_lands_in_the_score_cache() {
    let store = MemoryStore::new();
    seed_author(&store, "a", 3.0).await;
    seed_author(&store, "b", 3.0).await;
    seed_link(
        &store,
        "https://t.test/cached",
        &[
            post("1", "a", "https://t.test/cached", 12),
            post("2", "b", "https://t.test/cached", 6),
        ],
    )
    .await;

    let mut with_cache = opts();
    with_cache.cache_results = true;
    with_cache.window_hours = 4;
    find_top_links(&store, UNIVERSE, &with_cache).await.unwrap();

    let entries = store.cached_entries(UNIVERSE);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].window_hours, 4);
    assert_eq!(entries[0].results.len(), 1);

    // Read-only probes leave the cache alone.
    find_top_links(&store, UNIVERSE, &opts()).await.unwrap();
    assert_eq!(store.cached_entries(UNIVERSE).len(), 1);
}
