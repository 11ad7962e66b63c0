//! Candidate selection and ranking for the trending list.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use emberline_common::{EmberlineError, ScoredLink};
use emberline_store::TrendStore;

use crate::score::score_link;

#[derive(Debug, Clone)]
pub struct TrendingOptions {
    /// How many links to return.
    pub quantity: usize,
    /// Lookback bucket; also drives the hourly decay factor.
    pub window_hours: u32,
    /// Explicit window bounds. Default: `[end - window_hours, now]`.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Down-weight links by hours since their first share.
    pub decay: bool,
    /// Append the ranked snapshot to the score cache (feeds the breakout
    /// baseline). Read-only probes turn this off.
    pub cache_results: bool,
}

impl Default for TrendingOptions {
    fn default() -> Self {
        Self {
            quantity: 20,
            window_hours: 24,
            start: None,
            end: None,
            decay: true,
            cache_results: true,
        }
    }
}

impl TrendingOptions {
    fn window(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.end.unwrap_or_else(Utc::now);
        let start = self
            .start
            .unwrap_or_else(|| end - Duration::hours(i64::from(self.window_hours)));
        (start, end)
    }

    /// Exclusion and re-sort can drop candidates, so over-fetch. Decay
    /// reshuffles harder than plain influence, hence the bigger factor.
    fn fetch_limit(&self) -> usize {
        if self.decay {
            self.quantity * 5
        } else {
            self.quantity * 2
        }
    }
}

/// The most popular links shared in a universe over a time window,
/// influence-weighted, ranked, with full content records attached.
///
/// Fails with [`EmberlineError::NoCandidates`] when the window produces
/// nothing — callers surface that as an empty result, not a failure.
pub async fn find_top_links<S: TrendStore + ?Sized>(
    store: &S,
    universe: &str,
    opts: &TrendingOptions,
) -> Result<Vec<ScoredLink>, EmberlineError> {
    let (start, end) = opts.window();
    let now = Utc::now();

    let buckets = store
        .aggregate_link_candidates(universe, start, end, opts.fetch_limit())
        .await?;
    if buckets.is_empty() {
        return Err(EmberlineError::NoCandidates);
    }

    // Links already circulating before the window are not newly trending;
    // without this check permanently-popular links crowd out fresh ones.
    let urls: Vec<String> = buckets.iter().map(|b| b.url.clone()).collect();
    let seen_before = store.urls_seen_before(universe, &urls, start).await?;
    let mut buckets: Vec<_> = buckets
        .into_iter()
        .filter(|b| !seen_before.contains(&b.url))
        .collect();
    if buckets.is_empty() {
        return Err(EmberlineError::NoCandidates);
    }

    // One batched weight lookup for every sharer across all candidates.
    let all_sharers: Vec<String> = buckets
        .iter()
        .flat_map(|b| b.sharer_ids.iter().cloned())
        .collect();
    let weights = store.author_weights(universe, &all_sharers).await?;

    let mut scored: Vec<(f64, Vec<String>)> = Vec::with_capacity(buckets.len());
    for bucket in &buckets {
        let first = bucket.earliest_posts.first().map(|p| p.created);
        scored.push(score_link(
            &bucket.sharer_ids,
            &weights,
            first,
            opts.decay,
            opts.window_hours,
            now,
        ));
    }

    // Stable sort: ties keep the store's bucket order.
    let mut order: Vec<usize> = (0..buckets.len()).collect();
    order.sort_by(|&a, &b| {
        scored[b]
            .0
            .partial_cmp(&scored[a].0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order.truncate(opts.quantity);

    // Resolve content for the survivors; urls that no longer resolve are
    // dropped without failing the call.
    let top_urls: Vec<String> = order.iter().map(|&i| buckets[i].url.clone()).collect();
    let mut content: std::collections::HashMap<String, _> = store
        .get_content_batch(universe, &top_urls)
        .await?
        .into_iter()
        .map(|c| (c.url.clone(), c))
        .collect();

    let mut links = Vec::with_capacity(order.len());
    for &i in &order {
        let bucket = &mut buckets[i];
        let Some(resolved) = content.remove(&bucket.url) else {
            debug!(universe, url = bucket.url.as_str(), "dropping unresolved candidate");
            continue;
        };
        let (score, explanation) = scored[i].clone();
        let first_shared = bucket
            .earliest_posts
            .first()
            .map(|p| emberline_common::since_now(p.created, now))
            .unwrap_or_default();
        links.push(ScoredLink {
            url: bucket.url.clone(),
            score,
            explanation,
            sharer_ids: std::mem::take(&mut bucket.sharer_ids),
            posts: std::mem::take(&mut bucket.earliest_posts),
            first_shared,
            rank: links.len() + 1,
            content: Some(resolved),
        });
    }

    debug!(
        universe,
        window_hours = opts.window_hours,
        candidates = buckets.len(),
        returned = links.len(),
        "ranked trending links"
    );

    if opts.cache_results && !links.is_empty() {
        store
            .cache_results(universe, opts.window_hours, &links)
            .await?;
    }

    Ok(links)
}
