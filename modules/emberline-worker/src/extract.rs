//! Fallback content extraction.
//!
//! Real metadata extraction (title, description, images) is an external
//! service. This extractor only canonicalizes the url and derives the
//! provider, which is enough to make a shared link scorable.

use async_trait::async_trait;
use url::Url;

use emberline_common::Content;
use emberline_engine::ContentExtractor;

pub struct BareExtractor;

#[async_trait]
impl ContentExtractor for BareExtractor {
    async fn extract(&self, url: &str) -> anyhow::Result<Content> {
        let mut parsed = Url::parse(url)?;
        parsed.set_fragment(None);
        Ok(Content::bare(parsed.as_str()))
    }
}
