//! In-memory [`TrendStore`] for tests. No cluster required.
//!
//! Versioned raw posts get incrementing sequence numbers; the
//! [`MemoryStore::bump_raw_version`] hook stands in for a concurrent
//! consumer touching the queue between a read and a delete.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use emberline_common::{
    Author, Content, EmberlineError, LinkBucket, Post, RawPost, ScoreCacheEntry, ScoreStats,
    ScoredLink, SearchDocument, TopContentEntry, VersionToken, EARLIEST_POSTS_PER_LINK,
    MIN_POSTS_PER_LINK,
};

use crate::store::TrendStore;

type Result<T> = std::result::Result<T, EmberlineError>;

#[derive(Default)]
struct Inner {
    posts: Vec<Post>,
    raw: Vec<(Post, VersionToken)>,
    next_seq: i64,
    content: HashMap<String, Content>,
    authors: HashMap<String, Author>,
    cache: Vec<ScoreCacheEntry>,
    top: HashMap<String, TopContentEntry>,
    forced_conflicts: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    universes: Mutex<HashMap<String, Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, universe: &str, f: impl FnOnce(&mut Inner) -> T) -> T {
        let mut map = self.universes.lock().expect("memory store mutex poisoned");
        f(map.entry(universe.to_string()).or_default())
    }

    /// Simulate a concurrent consumer: advance the version of a queued raw
    /// post so the next conditional delete with a stale token conflicts.
    pub fn bump_raw_version(&self, universe: &str, id: &str) {
        self.with(universe, |inner| {
            inner.next_seq += 1;
            let seq = inner.next_seq;
            if let Some((_, v)) = inner.raw.iter_mut().find(|(p, _)| p.id == id) {
                v.seq_no = seq;
            }
        });
    }

    /// Make the next `n` conditional deletes fail with a version conflict
    /// no matter the token, as if a rival consumer kept winning the race.
    pub fn inject_conflicts(&self, universe: &str, n: usize) {
        self.with(universe, |inner| inner.forced_conflicts += n);
    }

    /// Remaining queue depth (test assertions).
    pub fn raw_len(&self, universe: &str) -> usize {
        self.with(universe, |inner| inner.raw.len())
    }

    /// Cached snapshots for a universe (test assertions).
    pub fn cached_entries(&self, universe: &str) -> Vec<ScoreCacheEntry> {
        self.with(universe, |inner| inner.cache.clone())
    }

    /// Ledger size (test assertions).
    pub fn top_content_len(&self, universe: &str) -> usize {
        self.with(universe, |inner| inner.top.len())
    }
}

#[async_trait]
impl TrendStore for MemoryStore {
    async fn aggregate_link_candidates(
        &self,
        universe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LinkBucket>> {
        self.with(universe, |inner| {
            let mut order: Vec<String> = Vec::new();
            let mut grouped: HashMap<String, Vec<Post>> = HashMap::new();
            for post in &inner.posts {
                if post.created < start || post.created > end {
                    continue;
                }
                if !grouped.contains_key(&post.content_url) {
                    order.push(post.content_url.clone());
                }
                grouped
                    .entry(post.content_url.clone())
                    .or_default()
                    .push(post.clone());
            }

            let mut buckets: Vec<LinkBucket> = order
                .into_iter()
                .filter_map(|url| {
                    let mut posts = grouped.remove(&url)?;
                    if (posts.len() as u64) < MIN_POSTS_PER_LINK {
                        return None;
                    }
                    let post_count = posts.len() as u64;
                    let mut sharer_ids = Vec::new();
                    for p in &posts {
                        if !sharer_ids.contains(&p.author_id) {
                            sharer_ids.push(p.author_id.clone());
                        }
                    }
                    posts.sort_by_key(|p| p.created);
                    posts.truncate(EARLIEST_POSTS_PER_LINK);
                    Some(LinkBucket {
                        url,
                        post_count,
                        sharer_ids,
                        earliest_posts: posts,
                    })
                })
                .collect();

            // Descending post count, first-seen order on ties (stable sort).
            buckets.sort_by(|a, b| b.post_count.cmp(&a.post_count));
            buckets.truncate(limit);
            Ok(buckets)
        })
    }

    async fn urls_seen_before(
        &self,
        universe: &str,
        urls: &[String],
        cutoff: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        self.with(universe, |inner| {
            let wanted: HashSet<&String> = urls.iter().collect();
            Ok(inner
                .posts
                .iter()
                .filter(|p| p.created <= cutoff && wanted.contains(&p.content_url))
                .map(|p| p.content_url.clone())
                .collect())
        })
    }

    async fn get_content_batch(&self, universe: &str, urls: &[String]) -> Result<Vec<Content>> {
        self.with(universe, |inner| {
            Ok(urls
                .iter()
                .filter_map(|u| inner.content.get(u).cloned())
                .collect())
        })
    }

    async fn author_weights(&self, universe: &str, ids: &[String]) -> Result<HashMap<String, f64>> {
        self.with(universe, |inner| {
            Ok(ids
                .iter()
                .filter_map(|id| inner.authors.get(id).map(|a| (a.id.clone(), a.weight)))
                .collect())
        })
    }

    async fn peek_raw_post(
        &self,
        universe: &str,
        exclude: &HashSet<String>,
    ) -> Result<Option<RawPost>> {
        self.with(universe, |inner| {
            Ok(inner
                .raw
                .iter()
                .find(|(p, _)| !exclude.contains(&p.id))
                .map(|(p, v)| RawPost {
                    post: p.clone(),
                    version: *v,
                }))
        })
    }

    async fn delete_raw_post(&self, universe: &str, id: &str, version: VersionToken) -> Result<()> {
        self.with(universe, |inner| {
            if inner.forced_conflicts > 0 {
                inner.forced_conflicts -= 1;
                return Err(EmberlineError::VersionConflict(id.to_string()));
            }
            let pos = inner.raw.iter().position(|(p, _)| p.id == id);
            match pos {
                None => Err(EmberlineError::NotFound(id.to_string())),
                Some(i) if inner.raw[i].1 != version => {
                    Err(EmberlineError::VersionConflict(id.to_string()))
                }
                Some(i) => {
                    inner.raw.remove(i);
                    Ok(())
                }
            }
        })
    }

    async fn enqueue_raw_post(&self, universe: &str, post: &Post) -> Result<()> {
        self.with(universe, |inner| {
            inner.next_seq += 1;
            let token = VersionToken {
                seq_no: inner.next_seq,
                primary_term: 1,
            };
            inner.raw.push((post.clone(), token));
            Ok(())
        })
    }

    async fn save_post(&self, universe: &str, post: &Post) -> Result<()> {
        self.with(universe, |inner| {
            inner.posts.retain(|p| p.id != post.id);
            inner.posts.push(post.clone());
            Ok(())
        })
    }

    async fn save_content(&self, universe: &str, content: &Content) -> Result<()> {
        self.with(universe, |inner| {
            inner.content.insert(content.url.clone(), content.clone());
            Ok(())
        })
    }

    async fn save_author(&self, universe: &str, author: &Author) -> Result<()> {
        self.with(universe, |inner| {
            inner.authors.insert(author.id.clone(), author.clone());
            Ok(())
        })
    }

    async fn delete_author(&self, universe: &str, id: &str) -> Result<()> {
        self.with(universe, |inner| match inner.authors.remove(id) {
            Some(_) => Ok(()),
            None => Err(EmberlineError::NotFound(id.to_string())),
        })
    }

    async fn cache_results(
        &self,
        universe: &str,
        window_hours: u32,
        results: &[ScoredLink],
    ) -> Result<()> {
        self.with(universe, |inner| {
            inner.cache.push(ScoreCacheEntry {
                cached_at: Utc::now(),
                window_hours,
                results: results.to_vec(),
            });
            Ok(())
        })
    }

    async fn score_stats(&self, universe: &str, window_hours: u32) -> Result<ScoreStats> {
        self.with(universe, |inner| {
            let scores: Vec<f64> = inner
                .cache
                .iter()
                .filter(|e| e.window_hours == window_hours)
                .flat_map(|e| e.results.iter().map(|r| r.score))
                .collect();
            if scores.is_empty() {
                return Ok(ScoreStats::default());
            }
            let n = scores.len() as f64;
            let mean = scores.iter().sum::<f64>() / n;
            // Population variance, matching the store's extended stats.
            let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            Ok(ScoreStats {
                mean: Some(mean),
                std_deviation: variance.sqrt(),
                count: scores.len() as u64,
            })
        })
    }

    async fn is_top_content(&self, universe: &str, url: &str) -> Result<bool> {
        self.with(universe, |inner| Ok(inner.top.contains_key(url)))
    }

    async fn promote_top_content(&self, universe: &str, entry: &TopContentEntry) -> Result<()> {
        self.with(universe, |inner| {
            inner.top.insert(entry.link.url.clone(), entry.clone());
            Ok(())
        })
    }

    async fn recent_top_content(
        &self,
        universe: &str,
        quantity: usize,
    ) -> Result<Vec<TopContentEntry>> {
        self.with(universe, |inner| {
            let mut entries: Vec<TopContentEntry> = inner.top.values().cloned().collect();
            entries.sort_by(|a, b| b.promoted_at.cmp(&a.promoted_at));
            entries.truncate(quantity);
            Ok(entries)
        })
    }

    async fn search_documents(
        &self,
        universe: &str,
        term: &str,
        quantity: usize,
    ) -> Result<Vec<SearchDocument>> {
        // Naive relevance: content hits before post hits, insertion order
        // within each. Good enough for exercising the merge.
        self.with(universe, |inner| {
            let needle = term.to_lowercase();
            let mut docs: Vec<SearchDocument> = inner
                .content
                .values()
                .filter(|c| {
                    c.title.to_lowercase().contains(&needle)
                        || c.description.to_lowercase().contains(&needle)
                        || c.tags.iter().any(|t| t.to_lowercase().contains(&needle))
                })
                .cloned()
                .map(SearchDocument::Content)
                .collect();
            docs.extend(
                inner
                    .posts
                    .iter()
                    .filter(|p| p.text.to_lowercase().contains(&needle))
                    .cloned()
                    .map(SearchDocument::Post),
            );
            docs.truncate(quantity);
            Ok(docs)
        })
    }

    async fn top_providers(&self, universe: &str, limit: usize) -> Result<Vec<String>> {
        self.with(universe, |inner| {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for c in inner.content.values() {
                if !c.provider.is_empty() {
                    *counts.entry(c.provider.as_str()).or_default() += 1;
                }
            }
            let mut providers: Vec<(&str, usize)> = counts.into_iter().collect();
            providers.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
            providers.truncate(limit);
            Ok(providers.into_iter().map(|(p, _)| p.to_string()).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str, author: &str, url: &str, minute: u32) -> Post {
        Post {
            id: id.to_string(),
            author_id: author.to_string(),
            content_url: url.to_string(),
            created: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
            text: format!("sharing {url}"),
        }
    }

    #[tokio::test]
    async fn aggregation_skips_single_post_links_and_orders_by_count() {
        let store = MemoryStore::new();
        for p in [
            post("1", "a", "https://x.test/one", 1),
            post("2", "b", "https://x.test/one", 2),
            post("3", "a", "https://x.test/two", 3),
            post("4", "b", "https://x.test/two", 4),
            post("5", "c", "https://x.test/two", 5),
            post("6", "c", "https://x.test/lonely", 6),
        ] {
            store.save_post("u", &p).await.unwrap();
        }
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();
        let buckets = store
            .aggregate_link_candidates("u", start, end, 10)
            .await
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].url, "https://x.test/two");
        assert_eq!(buckets[0].post_count, 3);
        assert_eq!(buckets[0].sharer_ids, vec!["a", "b", "c"]);
        assert_eq!(buckets[1].url, "https://x.test/one");
    }

    #[tokio::test]
    async fn conditional_delete_distinguishes_missing_from_conflict() {
        let store = MemoryStore::new();
        let p = post("42", "a", "https://x.test/q", 0);
        store.enqueue_raw_post("u", &p).await.unwrap();

        let raw = store
            .peek_raw_post("u", &HashSet::new())
            .await
            .unwrap()
            .unwrap();
        store.bump_raw_version("u", "42");
        let err = store
            .delete_raw_post("u", "42", raw.version)
            .await
            .unwrap_err();
        assert!(matches!(err, EmberlineError::VersionConflict(_)));

        let fresh = store
            .peek_raw_post("u", &HashSet::new())
            .await
            .unwrap()
            .unwrap();
        store.delete_raw_post("u", "42", fresh.version).await.unwrap();
        let err = store
            .delete_raw_post("u", "42", fresh.version)
            .await
            .unwrap_err();
        assert!(matches!(err, EmberlineError::NotFound(_)));
    }

    #[tokio::test]
    async fn score_stats_undefined_without_history() {
        let store = MemoryStore::new();
        let stats = store.score_stats("u", 4).await.unwrap();
        assert!(stats.mean.is_none());
        assert_eq!(stats.count, 0);
    }

    #[tokio::test]
    async fn recent_top_content_is_newest_first() {
        let store = MemoryStore::new();
        for (url, secs_ago) in [("https://x.test/old", 300), ("https://x.test/new", 10)] {
            let entry = TopContentEntry {
                promoted_at: Utc::now() - chrono::Duration::seconds(secs_ago),
                link: ScoredLink {
                    url: url.to_string(),
                    score: 1.0,
                    explanation: vec![],
                    sharer_ids: vec![],
                    posts: vec![],
                    first_shared: String::new(),
                    rank: 1,
                    content: None,
                },
            };
            store.promote_top_content("u", &entry).await.unwrap();
        }
        let recent = store.recent_top_content("u", 1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].link.url, "https://x.test/new");
    }

    #[tokio::test]
    async fn top_providers_rank_by_content_count() {
        let store = MemoryStore::new();
        for url in [
            "https://often.test/a",
            "https://often.test/b",
            "https://rare.test/c",
        ] {
            store.save_content("u", &Content::bare(url)).await.unwrap();
        }
        let providers = store.top_providers("u", 10).await.unwrap();
        assert_eq!(providers, vec!["often.test", "rare.test"]);
    }

    #[tokio::test]
    async fn universes_are_isolated() {
        let store = MemoryStore::new();
        store
            .save_author("u1", &Author {
                id: "a".into(),
                handle: "a".into(),
                weight: 5.0,
            })
            .await
            .unwrap();
        let weights = store.author_weights("u2", &["a".to_string()]).await.unwrap();
        assert!(weights.is_empty());
    }
}
