//! Elasticsearch-backed [`TrendStore`].
//!
//! Index-per-concern layout under a per-universe prefix:
//! `{universe}_posts`, `{universe}_raw_posts`, `{universe}_content`,
//! `{universe}_authors`, `{universe}_results_cache`,
//! `{universe}_top_content`. Index creation and mappings are operated
//! outside this crate.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use elasticsearch::{
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    DeleteParts, Elasticsearch, ExistsParts, IndexParts, MgetParts, SearchParts,
};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use emberline_common::{
    Author, Content, EmberlineError, LinkBucket, Post, RawPost, ScoreCacheEntry, ScoreStats,
    ScoredLink, SearchDocument, TopContentEntry, VersionToken, EARLIEST_POSTS_PER_LINK,
    MIN_POSTS_PER_LINK, PRE_WINDOW_SCAN_LIMIT, SHARER_TERMS_LIMIT,
};

use crate::store::TrendStore;

type Result<T> = std::result::Result<T, EmberlineError>;

#[derive(Clone)]
pub struct EsStore {
    client: Elasticsearch,
}

impl EsStore {
    /// Connect to a single Elasticsearch node.
    pub fn connect(endpoint: &str) -> Result<Self> {
        let parsed = Url::parse(endpoint)
            .map_err(|e| EmberlineError::Config(format!("bad elasticsearch url: {e}")))?;
        let pool = SingleNodeConnectionPool::new(parsed);
        let transport = TransportBuilder::new(pool)
            .build()
            .map_err(|e| EmberlineError::Config(format!("elasticsearch transport: {e}")))?;
        Ok(Self {
            client: Elasticsearch::new(transport),
        })
    }

    fn posts_index(universe: &str) -> String {
        format!("{universe}_posts")
    }
    fn raw_posts_index(universe: &str) -> String {
        format!("{universe}_raw_posts")
    }
    fn content_index(universe: &str) -> String {
        format!("{universe}_content")
    }
    fn authors_index(universe: &str) -> String {
        format!("{universe}_authors")
    }
    fn results_cache_index(universe: &str) -> String {
        format!("{universe}_results_cache")
    }
    fn top_content_index(universe: &str) -> String {
        format!("{universe}_top_content")
    }

    async fn search(&self, index: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status_code();
        if !status.is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "search on {index} returned {status}"
            )));
        }
        response.json().await.map_err(transport)
    }

    async fn index_doc<B: serde::Serialize>(&self, index: &str, id: &str, body: &B) -> Result<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status_code();
        if !status.is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "index into {index} returned {status}"
            )));
        }
        Ok(())
    }
}

fn transport(e: elasticsearch::Error) -> EmberlineError {
    EmberlineError::StoreUnavailable(e.to_string())
}

/// Interpret an exists (HEAD) status. Only a definite 404 means absent;
/// a degraded store must surface as an error, not as an empty ledger.
fn exists_from_status(status: u16, index: &str) -> Result<bool> {
    match status {
        200..=299 => Ok(true),
        404 => Ok(false),
        s => Err(EmberlineError::StoreUnavailable(format!(
            "exists on {index} returned {s}"
        ))),
    }
}

/// Pull `_source` documents out of a search response body.
fn sources<T: serde::de::DeserializeOwned>(body: &Value) -> Vec<T> {
    body["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|h| serde_json::from_value(h["_source"].clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl TrendStore for EsStore {
    async fn aggregate_link_candidates(
        &self,
        universe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LinkBucket>> {
        let body = json!({
            "size": 0,
            "aggregations": {
                "recent_posts": {
                    "filter": {
                        "range": {
                            "created": { "gte": start.to_rfc3339(), "lte": end.to_rfc3339() }
                        }
                    },
                    "aggregations": {
                        "links": {
                            "terms": {
                                "field": "content_url",
                                "order": { "_count": "desc" },
                                // Over-fetched by the caller; exclusion and
                                // re-sort may drop buckets later.
                                "size": limit,
                                "min_doc_count": MIN_POSTS_PER_LINK
                            },
                            "aggregations": {
                                "sharers": {
                                    "terms": { "field": "author_id", "size": SHARER_TERMS_LIMIT }
                                },
                                "first_posts": {
                                    "top_hits": {
                                        "size": EARLIEST_POSTS_PER_LINK,
                                        "sort": [{ "created": { "order": "asc" } }]
                                    }
                                }
                            }
                        }
                    }
                }
            }
        });

        let res = self.search(&Self::posts_index(universe), body).await?;
        let empty = vec![];
        let buckets = res["aggregations"]["recent_posts"]["links"]["buckets"]
            .as_array()
            .unwrap_or(&empty);

        let mut out = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let url = match bucket["key"].as_str() {
                Some(u) => u.to_string(),
                None => continue,
            };
            let sharer_ids = bucket["sharers"]["buckets"]
                .as_array()
                .map(|bs| {
                    bs.iter()
                        .filter_map(|b| b["key"].as_str().map(String::from))
                        .collect()
                })
                .unwrap_or_default();
            let earliest_posts: Vec<Post> = bucket["first_posts"]["hits"]["hits"]
                .as_array()
                .map(|hits| {
                    hits.iter()
                        .filter_map(|h| serde_json::from_value(h["_source"].clone()).ok())
                        .collect()
                })
                .unwrap_or_default();
            out.push(LinkBucket {
                url,
                post_count: bucket["doc_count"].as_u64().unwrap_or(0),
                sharer_ids,
                earliest_posts,
            });
        }
        debug!(universe, buckets = out.len(), "aggregated link candidates");
        Ok(out)
    }

    async fn urls_seen_before(
        &self,
        universe: &str,
        urls: &[String],
        cutoff: DateTime<Utc>,
    ) -> Result<HashSet<String>> {
        let body = json!({
            "size": PRE_WINDOW_SCAN_LIMIT,
            "_source": ["content_url"],
            "query": {
                "bool": {
                    "filter": [
                        { "terms": { "content_url": urls } },
                        { "range": { "created": { "lte": cutoff.to_rfc3339() } } }
                    ]
                }
            }
        });
        let res = self.search(&Self::posts_index(universe), body).await?;
        let seen = res["hits"]["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| h["_source"]["content_url"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(seen)
    }

    async fn get_content_batch(&self, universe: &str, urls: &[String]) -> Result<Vec<Content>> {
        if urls.is_empty() {
            return Ok(vec![]);
        }
        let index = Self::content_index(universe);
        let response = self
            .client
            .mget(MgetParts::Index(&index))
            .body(json!({ "ids": urls }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status_code().is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "mget on {index} returned {}",
                response.status_code()
            )));
        }
        let res: Value = response.json().await.map_err(transport)?;
        let found = res["docs"]
            .as_array()
            .map(|docs| {
                docs.iter()
                    .filter(|d| d["found"].as_bool().unwrap_or(false))
                    .filter_map(|d| serde_json::from_value(d["_source"].clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(found)
    }

    async fn author_weights(&self, universe: &str, ids: &[String]) -> Result<HashMap<String, f64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let unique: Vec<&String> = {
            let mut seen = HashSet::new();
            ids.iter().filter(|id| seen.insert(id.as_str())).collect()
        };
        let index = Self::authors_index(universe);
        let response = self
            .client
            .mget(MgetParts::Index(&index))
            .body(json!({ "ids": unique }))
            .send()
            .await
            .map_err(transport)?;
        if !response.status_code().is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "mget on {index} returned {}",
                response.status_code()
            )));
        }
        let res: Value = response.json().await.map_err(transport)?;
        let mut weights = HashMap::new();
        if let Some(docs) = res["docs"].as_array() {
            for doc in docs {
                if !doc["found"].as_bool().unwrap_or(false) {
                    continue;
                }
                if let Ok(author) = serde_json::from_value::<Author>(doc["_source"].clone()) {
                    weights.insert(author.id, author.weight);
                }
            }
        }
        Ok(weights)
    }

    async fn peek_raw_post(
        &self,
        universe: &str,
        exclude: &HashSet<String>,
    ) -> Result<Option<RawPost>> {
        let query = if exclude.is_empty() {
            json!({ "match_all": {} })
        } else {
            json!({
                "bool": {
                    "must_not": { "ids": { "values": exclude.iter().collect::<Vec<_>>() } }
                }
            })
        };
        let body = json!({
            "size": 1,
            "seq_no_primary_term": true,
            "query": query
        });
        let res = self.search(&Self::raw_posts_index(universe), body).await?;
        let hit = match res["hits"]["hits"].as_array().and_then(|h| h.first()) {
            Some(hit) => hit,
            None => return Ok(None),
        };
        let post: Post = serde_json::from_value(hit["_source"].clone()).map_err(|e| {
            EmberlineError::StoreUnavailable(format!("malformed raw post document: {e}"))
        })?;
        let version = VersionToken {
            seq_no: hit["_seq_no"].as_i64().unwrap_or(0),
            primary_term: hit["_primary_term"].as_i64().unwrap_or(0),
        };
        Ok(Some(RawPost { post, version }))
    }

    async fn delete_raw_post(&self, universe: &str, id: &str, version: VersionToken) -> Result<()> {
        let index = Self::raw_posts_index(universe);
        let response = self
            .client
            .delete(DeleteParts::IndexId(&index, id))
            .if_seq_no(version.seq_no)
            .if_primary_term(version.primary_term)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status_code();
        match status.as_u16() {
            404 => Err(EmberlineError::NotFound(id.to_string())),
            409 => Err(EmberlineError::VersionConflict(id.to_string())),
            s if status.is_success() => {
                debug!(universe, id, status = s, "deleted raw post");
                Ok(())
            }
            _ => Err(EmberlineError::StoreUnavailable(format!(
                "delete on {index} returned {status}"
            ))),
        }
    }

    async fn enqueue_raw_post(&self, universe: &str, post: &Post) -> Result<()> {
        self.index_doc(&Self::raw_posts_index(universe), &post.id, post)
            .await
    }

    async fn save_post(&self, universe: &str, post: &Post) -> Result<()> {
        self.index_doc(&Self::posts_index(universe), &post.id, post)
            .await
    }

    async fn save_content(&self, universe: &str, content: &Content) -> Result<()> {
        self.index_doc(&Self::content_index(universe), &content.url, content)
            .await
    }

    async fn save_author(&self, universe: &str, author: &Author) -> Result<()> {
        self.index_doc(&Self::authors_index(universe), &author.id, author)
            .await
    }

    async fn delete_author(&self, universe: &str, id: &str) -> Result<()> {
        let index = Self::authors_index(universe);
        let response = self
            .client
            .delete(DeleteParts::IndexId(&index, id))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status_code();
        if status.as_u16() == 404 {
            return Err(EmberlineError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "delete on {index} returned {status}"
            )));
        }
        Ok(())
    }

    async fn cache_results(
        &self,
        universe: &str,
        window_hours: u32,
        results: &[ScoredLink],
    ) -> Result<()> {
        let entry = ScoreCacheEntry {
            cached_at: Utc::now(),
            window_hours,
            results: results.to_vec(),
        };
        let index = Self::results_cache_index(universe);
        // Append-only: let the store assign the id.
        let response = self
            .client
            .index(IndexParts::Index(&index))
            .body(&entry)
            .send()
            .await
            .map_err(transport)?;
        if !response.status_code().is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "index into {index} returned {}",
                response.status_code()
            )));
        }
        Ok(())
    }

    async fn score_stats(&self, universe: &str, window_hours: u32) -> Result<ScoreStats> {
        let body = json!({
            "size": 0,
            "aggregations": {
                "fresh_queries": {
                    "filter": { "term": { "window_hours": window_hours } },
                    "aggregations": {
                        "scores": { "extended_stats": { "field": "results.score" } }
                    }
                }
            }
        });
        let res = self
            .search(&Self::results_cache_index(universe), body)
            .await?;
        let scores = &res["aggregations"]["fresh_queries"]["scores"];
        Ok(ScoreStats {
            mean: scores["avg"].as_f64(),
            std_deviation: scores["std_deviation"].as_f64().unwrap_or(0.0),
            count: scores["count"].as_u64().unwrap_or(0),
        })
    }

    async fn is_top_content(&self, universe: &str, url: &str) -> Result<bool> {
        let index = Self::top_content_index(universe);
        let response = self
            .client
            .exists(ExistsParts::IndexId(&index, url))
            .send()
            .await
            .map_err(transport)?;
        exists_from_status(response.status_code().as_u16(), &index)
    }

    async fn promote_top_content(&self, universe: &str, entry: &TopContentEntry) -> Result<()> {
        self.index_doc(&Self::top_content_index(universe), &entry.link.url, entry)
            .await
    }

    async fn recent_top_content(
        &self,
        universe: &str,
        quantity: usize,
    ) -> Result<Vec<TopContentEntry>> {
        let body = json!({
            "size": quantity,
            "sort": [{ "promoted_at": { "order": "desc" } }]
        });
        let res = self.search(&Self::top_content_index(universe), body).await?;
        Ok(sources(&res))
    }

    async fn search_documents(
        &self,
        universe: &str,
        term: &str,
        quantity: usize,
    ) -> Result<Vec<SearchDocument>> {
        let content_index = Self::content_index(universe);
        let posts_index = Self::posts_index(universe);
        let body = json!({
            "size": quantity,
            "query": {
                "query_string": {
                    "query": term,
                    "fields": ["title", "description", "text", "tags"]
                }
            }
        });
        let response = self
            .client
            .search(SearchParts::Index(&[
                content_index.as_str(),
                posts_index.as_str(),
            ]))
            .body(body)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status_code();
        if !status.is_success() {
            return Err(EmberlineError::StoreUnavailable(format!(
                "combined search returned {status}"
            )));
        }
        let res: Value = response.json().await.map_err(transport)?;

        let mut docs = Vec::new();
        if let Some(hits) = res["hits"]["hits"].as_array() {
            for hit in hits {
                let source = hit["_source"].clone();
                let doc = if hit["_index"].as_str() == Some(content_index.as_str()) {
                    serde_json::from_value(source).map(SearchDocument::Content)
                } else {
                    serde_json::from_value(source).map(SearchDocument::Post)
                };
                if let Ok(doc) = doc {
                    docs.push(doc);
                }
            }
        }
        Ok(docs)
    }

    async fn top_providers(&self, universe: &str, limit: usize) -> Result<Vec<String>> {
        let body = json!({
            "size": 0,
            "aggregations": {
                "providers": {
                    "terms": { "field": "provider", "size": limit }
                }
            }
        });
        let res = self.search(&Self::content_index(universe), body).await?;
        let providers = res["aggregations"]["providers"]["buckets"]
            .as_array()
            .map(|bs| {
                bs.iter()
                    .filter_map(|b| b["key"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(providers)
    }
}
