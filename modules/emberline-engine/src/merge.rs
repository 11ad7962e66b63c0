//! Reconciliation of combined search results.
//!
//! A combined search returns content records and posts as one flat list in
//! relevance order. This folds them into content-with-nested-posts (or
//! bare post) records in a single forward pass with lookahead: later
//! documents can be pulled forward into an earlier match, so final order
//! follows the first occurrence of each surviving record.

use chrono::{DateTime, Utc};

use emberline_common::{
    since_now, Content, EmberlineError, MergedItem, MergedKind, Post, SearchDocument,
};
use emberline_store::TrendStore;

/// Search posts and content for a term and reconcile the combined hits.
pub async fn search_items<S: TrendStore + ?Sized>(
    store: &S,
    universe: &str,
    term: &str,
    quantity: usize,
) -> Result<Vec<MergedItem>, EmberlineError> {
    let docs = store.search_documents(universe, term, quantity).await?;
    Ok(merge(&docs, Utc::now()))
}

/// Merge tagged search hits into display records with 1-based ranks.
pub fn merge(docs: &[SearchDocument], now: DateTime<Utc>) -> Vec<MergedItem> {
    let mut consumed = vec![false; docs.len()];
    let mut items: Vec<MergedItem> = Vec::new();

    for i in 0..docs.len() {
        if consumed[i] {
            continue;
        }
        consumed[i] = true;

        match &docs[i] {
            SearchDocument::Content(content) => {
                // Pull forward every later, unconsumed post for this url.
                let mut posts = Vec::new();
                for j in i + 1..docs.len() {
                    if consumed[j] {
                        continue;
                    }
                    if let SearchDocument::Post(post) = &docs[j] {
                        if post.content_url == content.url {
                            consumed[j] = true;
                            posts.push(post.clone());
                        }
                    }
                }
                items.push(item(MergedKind::Content, Some(content.clone()), posts, now));
            }
            SearchDocument::Post(post) => {
                // A post not claimed by an earlier content record: pull its
                // content forward if it appears later, else emit the post
                // bare under a synthetic record.
                let mut matched: Option<Content> = None;
                for j in i + 1..docs.len() {
                    if consumed[j] {
                        continue;
                    }
                    if let SearchDocument::Content(content) = &docs[j] {
                        if content.url == post.content_url {
                            consumed[j] = true;
                            matched = Some(content.clone());
                            break;
                        }
                    }
                }
                let kind = if matched.is_some() {
                    MergedKind::Content
                } else {
                    MergedKind::Post
                };
                items.push(item(kind, matched, vec![post.clone()], now));
            }
        }
    }

    for (idx, it) in items.iter_mut().enumerate() {
        it.rank = idx + 1;
    }
    items
}

fn item(
    kind: MergedKind,
    content: Option<Content>,
    posts: Vec<Post>,
    now: DateTime<Utc>,
) -> MergedItem {
    let url = match (&content, posts.first()) {
        (Some(c), _) => c.url.clone(),
        (None, Some(p)) => p.content_url.clone(),
        (None, None) => String::new(),
    };
    let first_shared = posts
        .iter()
        .map(|p| p.created)
        .min()
        .map(|t| since_now(t, now));
    MergedItem {
        kind,
        url,
        content,
        posts,
        rank: 0,
        first_shared,
    }
}
