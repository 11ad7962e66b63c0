//! Safe take-and-remove over the raw-post queue.
//!
//! Multiple consumers run this concurrently against the same store with no
//! in-process locking; mutual exclusion is the store's conditional delete.
//! The retry loop is explicit and bounded, and every version conflict
//! shrinks the visible candidate set, so progress is guaranteed up to
//! queue depth.
//!
//! Delivery is at-most-once: a crash between the delete succeeding and the
//! caller recording the post loses it. That trade-off is intentional; a
//! crash-safe variant would need a visibility timeout or write-ahead
//! marker, which is a different protocol.

use std::collections::HashSet;

use tracing::{debug, info};

use emberline_common::{EmberlineError, Post};
use emberline_store::TrendStore;

/// Retry ceiling for one dequeue call. Only a pathological conflict storm
/// gets near it; exceeding it is surfaced as a retryable failure.
pub const MAX_ATTEMPTS: usize = 64;

/// Take one raw post off the queue, or `None` when it is empty (ignoring
/// ids in `exclude`).
pub async fn dequeue<S: TrendStore + ?Sized>(
    store: &S,
    universe: &str,
    exclude: HashSet<String>,
) -> Result<Option<Post>, EmberlineError> {
    let mut exclude = exclude;

    for _ in 0..MAX_ATTEMPTS {
        let raw = match store.peek_raw_post(universe, &exclude).await? {
            Some(raw) => raw,
            None => return Ok(None),
        };

        match store
            .delete_raw_post(universe, &raw.post.id, raw.version)
            .await
        {
            Ok(()) => {
                debug!(universe, id = raw.post.id.as_str(), "dequeued raw post");
                return Ok(Some(raw.post));
            }
            Err(EmberlineError::NotFound(id)) => {
                // Another consumer already removed it. Not an error.
                info!(universe, id = id.as_str(), "raw post already gone, retrying");
            }
            Err(EmberlineError::VersionConflict(id)) => {
                info!(universe, id = id.as_str(), "version conflict, skipping raw post");
                exclude.insert(id);
            }
            Err(e) => return Err(e),
        }
    }

    Err(EmberlineError::RetriesExhausted(MAX_ATTEMPTS))
}
