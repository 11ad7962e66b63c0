//! The document-store seam.
//!
//! Everything the ranking engine needs from persistence, as one narrow
//! async trait. Implemented by [`crate::EsStore`] (production,
//! Elasticsearch) and [`crate::MemoryStore`] (tests, no cluster required).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use emberline_common::{
    Author, Content, EmberlineError, LinkBucket, Post, RawPost, ScoreStats, ScoredLink,
    SearchDocument, TopContentEntry, VersionToken,
};

type Result<T> = std::result::Result<T, EmberlineError>;

/// Store operations for one or more universes. Every method takes the
/// universe first and never shares state across universes.
#[async_trait]
pub trait TrendStore: Send + Sync {
    // --- Candidate selection ---

    /// Group posts created in `[start, end]` by shared url. Buckets need at
    /// least two posts, carry their distinct sharer ids and their earliest
    /// posts ascending by creation time, and arrive in descending
    /// post-count order, at most `limit` of them.
    async fn aggregate_link_candidates(
        &self,
        universe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LinkBucket>>;

    /// Which of `urls` were already referenced by a post created at or
    /// before `cutoff`. Scans a bounded number of rows.
    async fn urls_seen_before(
        &self,
        universe: &str,
        urls: &[String],
        cutoff: DateTime<Utc>,
    ) -> Result<HashSet<String>>;

    /// Batched content lookup. Missing urls are silently dropped.
    async fn get_content_batch(&self, universe: &str, urls: &[String]) -> Result<Vec<Content>>;

    /// Batched influence lookup. Authors no longer tracked are absent from
    /// the returned map.
    async fn author_weights(&self, universe: &str, ids: &[String]) -> Result<HashMap<String, f64>>;

    // --- Raw-post queue ---

    /// Read one raw post (any one), skipping ids in `exclude`, together
    /// with its current version token. `None` when the queue is empty.
    async fn peek_raw_post(
        &self,
        universe: &str,
        exclude: &HashSet<String>,
    ) -> Result<Option<RawPost>>;

    /// Delete a raw post only if its version still matches. Fails with
    /// `NotFound` when it is already gone and `VersionConflict` when it
    /// changed since the read.
    async fn delete_raw_post(&self, universe: &str, id: &str, version: VersionToken) -> Result<()>;

    async fn enqueue_raw_post(&self, universe: &str, post: &Post) -> Result<()>;

    // --- Processed posts, content, authors ---

    async fn save_post(&self, universe: &str, post: &Post) -> Result<()>;

    /// Upsert by canonical url; re-extraction is idempotent.
    async fn save_content(&self, universe: &str, content: &Content) -> Result<()>;

    async fn save_author(&self, universe: &str, author: &Author) -> Result<()>;

    async fn delete_author(&self, universe: &str, id: &str) -> Result<()>;

    // --- Score cache and breakout ledger ---

    /// Append one ranking snapshot under its window bucket.
    async fn cache_results(
        &self,
        universe: &str,
        window_hours: u32,
        results: &[ScoredLink],
    ) -> Result<()>;

    /// Mean and standard deviation of cached scores in the same
    /// `window_hours` bucket. `mean` is None with no history.
    async fn score_stats(&self, universe: &str, window_hours: u32) -> Result<ScoreStats>;

    async fn is_top_content(&self, universe: &str, url: &str) -> Result<bool>;

    /// Upsert keyed by url; promoting twice leaves exactly one entry.
    async fn promote_top_content(&self, universe: &str, entry: &TopContentEntry) -> Result<()>;

    /// Most recently promoted entries, newest first.
    async fn recent_top_content(&self, universe: &str, quantity: usize)
        -> Result<Vec<TopContentEntry>>;

    // --- Search ---

    /// Combined full-text search over content and posts, tagged hits in
    /// the store's relevance order. Relevance ranking itself is the
    /// store's business, not ours.
    async fn search_documents(
        &self,
        universe: &str,
        term: &str,
        quantity: usize,
    ) -> Result<Vec<SearchDocument>>;

    /// All providers (domains) in descending popularity order.
    async fn top_providers(&self, universe: &str, limit: usize) -> Result<Vec<String>>;
}
