//! Drain loop: raw posts in, scorable records out.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::{debug, warn};

use emberline_common::{Content, EmberlineError};
use emberline_store::TrendStore;

use crate::dequeue::dequeue;

/// External content-extraction collaborator. Resolving a url to canonical
/// metadata lives outside this crate; the engine only needs the result.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> anyhow::Result<Content>;
}

/// Dequeue up to `limit` raw posts, resolve their content, and save both
/// sides as processed records. Returns how many posts were consumed.
///
/// Extraction failures drop the post with a warning: by then the raw post
/// is already deleted, and the queue's at-most-once contract applies.
pub async fn drain_raw_posts<S, X>(
    store: &S,
    extractor: &X,
    universe: &str,
    limit: usize,
) -> Result<usize, EmberlineError>
where
    S: TrendStore + ?Sized,
    X: ContentExtractor + ?Sized,
{
    let mut consumed = 0;

    while consumed < limit {
        let Some(mut post) = dequeue(store, universe, HashSet::new()).await? else {
            break;
        };
        consumed += 1;

        match extractor.extract(&post.content_url).await {
            Ok(content) => {
                // Content upsert is idempotent by url; repoint the post at
                // the canonical url so shares of shortened links converge.
                post.content_url = content.url.clone();
                store.save_content(universe, &content).await?;
                store.save_post(universe, &post).await?;
                debug!(
                    universe,
                    id = post.id.as_str(),
                    url = post.content_url.as_str(),
                    "processed raw post"
                );
            }
            Err(e) => {
                warn!(
                    universe,
                    id = post.id.as_str(),
                    url = post.content_url.as_str(),
                    error = %e,
                    "extraction failed, dropping post"
                );
            }
        }
    }

    Ok(consumed)
}
