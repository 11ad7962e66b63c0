//! Breakout detection: statistically exceptional links promoted to the
//! top-content ledger.

use chrono::Utc;
use tracing::{debug, info};

use emberline_common::{EmberlineError, ScoredLink, TopContentEntry};
use emberline_store::TrendStore;

use crate::trending::{find_top_links, TrendingOptions};

/// Find at most one link whose score breaks out of recent norms: at least
/// two standard deviations above the mean of cached scores in the same
/// window bucket, and not already in the ledger.
///
/// Returns `None` when the window has no candidates or no baseline exists
/// yet. Callers run this on a schedule; one breakout per call is the
/// contract even when several qualify.
pub async fn find_breakout_link<S: TrendStore + ?Sized>(
    store: &S,
    universe: &str,
    window_hours: u32,
    quantity: usize,
) -> Result<Option<ScoredLink>, EmberlineError> {
    let opts = TrendingOptions {
        quantity,
        window_hours,
        // Read-only probe: the ledger upsert is this path's only write.
        cache_results: false,
        ..TrendingOptions::default()
    };
    let links = match find_top_links(store, universe, &opts).await {
        Ok(links) => links,
        Err(EmberlineError::NoCandidates) => return Ok(None),
        Err(e) => return Err(e),
    };

    let stats = store.score_stats(universe, window_hours).await?;
    let Some(mean) = stats.mean else {
        debug!(universe, window_hours, "no score history yet, no breakout");
        return Ok(None);
    };
    let cutoff = mean + 2.0 * stats.std_deviation;

    for link in links {
        if link.score < cutoff {
            // Ranked descending: nothing after this can qualify either.
            break;
        }
        if store.is_top_content(universe, &link.url).await? {
            continue;
        }
        info!(
            universe,
            url = link.url.as_str(),
            score = link.score,
            cutoff,
            "breakout link found"
        );
        return Ok(Some(link));
    }
    Ok(None)
}

/// Add a breakout link to the top-content ledger. Keyed by url, so
/// promoting the same link twice leaves exactly one entry.
pub async fn promote<S: TrendStore + ?Sized>(
    store: &S,
    universe: &str,
    link: &ScoredLink,
) -> Result<(), EmberlineError> {
    let entry = TopContentEntry {
        promoted_at: Utc::now(),
        link: link.clone(),
    };
    store.promote_top_content(universe, &entry).await
}
