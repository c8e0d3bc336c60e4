//! Embedding-backed article index.
//!
//! [`EmbeddingIndex`] pairs an embedding backend with a vector store and
//! exposes the retrieval operations the rest of the crate uses: add an
//! article, search by free-text query, fetch, delete, count. Retrieval is
//! an enhancement, not a dependency: if the store cannot be reached at
//! startup the index goes into a disabled state and every operation
//! degrades quietly (`false`, empty results, `None`, zero) instead of
//! erroring. The same [`Embedder`] handle is used at index time and query
//! time so both sides live in one embedding space.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::llm::Embedder;
use crate::summarize::SummaryType;

/// Liveness attempts made before the index gives up and disables itself.
pub const CONNECT_ATTEMPTS: u32 = 3;
/// First retry delay; doubles after every failed attempt.
pub const CONNECT_BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Default number of neighbors returned by [`EmbeddingIndex::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// Results scoring below this similarity are dropped.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Article body beyond this many characters is not embedded.
const DOCUMENT_CONTENT_CHARS: usize = 5000;
/// The stored metadata keeps at most this much of the summary.
const METADATA_SUMMARY_CHARS: usize = 1000;
/// Length of the summary excerpt attached to each search hit.
const EXCERPT_CHARS: usize = 200;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("vector store returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("malformed vector store response: {0}")]
    Malformed(String),
}

/// Flat metadata stored next to each vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocMetadata {
    pub article_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub summary_type: String,
    #[serde(default)]
    pub summary: String,
}

/// One neighbor from a similarity query, in the store's distance order.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub id: String,
    pub document: String,
    pub metadata: DocMetadata,
    pub distance: f32,
}

/// A document fetched back out of the store by id.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: String,
    pub document: String,
    pub metadata: DocMetadata,
}

/// The operations the index needs from a vector store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Cheap liveness probe.
    async fn heartbeat(&self) -> Result<(), StoreError>;

    /// Insert or fully replace the document under `id`.
    async fn upsert(
        &self,
        id: &str,
        vector: &[f32],
        document: &str,
        metadata: &DocMetadata,
    ) -> Result<(), StoreError>;

    /// Nearest neighbors of `vector`, closest first.
    async fn query(&self, vector: &[f32], limit: usize) -> Result<Vec<QueryHit>, StoreError>;

    async fn fetch(&self, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

/// One search result, ready for rendering.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub article_id: u64,
    pub title: String,
    pub url: String,
    /// At most 200 characters of the stored summary.
    pub excerpt: String,
    /// Similarity in `[0, 1]`, rounded to three decimals.
    pub score: f32,
    pub summary_type: String,
}

/// Fields stored alongside an article's vector.
#[derive(Debug, Clone, Copy)]
pub struct ArticleMeta<'a> {
    pub title: &'a str,
    pub url: &'a str,
    pub summary_type: SummaryType,
}

pub struct EmbeddingIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    threshold: f32,
    enabled: bool,
}

impl EmbeddingIndex {
    /// Probe the store and build the index. Never fails: after
    /// [`CONNECT_ATTEMPTS`] failed probes the index comes back disabled
    /// and every operation degrades instead of erroring.
    pub async fn connect(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self::connect_with_backoff(
            embedder,
            store,
            DEFAULT_SIMILARITY_THRESHOLD,
            CONNECT_BACKOFF_BASE,
        )
        .await
    }

    /// [`connect`](Self::connect) with the similarity threshold and the
    /// first retry delay spelled out.
    pub async fn connect_with_backoff(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        threshold: f32,
        backoff_base: Duration,
    ) -> Self {
        let mut enabled = false;
        for attempt in 0..CONNECT_ATTEMPTS {
            match store.heartbeat().await {
                Ok(()) => {
                    info!("vector store reachable");
                    enabled = true;
                    break;
                }
                Err(err) if attempt + 1 < CONNECT_ATTEMPTS => {
                    let delay = backoff_base * 2u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "vector store unreachable, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    error!(error = %err, "vector store unreachable, retrieval disabled");
                }
            }
        }
        Self {
            embedder,
            store,
            threshold,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Embed and upsert one article. Returns whether the article made it
    /// into the store; failures are logged, never raised.
    pub async fn add_article(
        &self,
        article_id: u64,
        text: &str,
        summary: &str,
        meta: ArticleMeta<'_>,
    ) -> bool {
        if !self.enabled {
            debug!(article_id, "index disabled, article not indexed");
            return false;
        }
        let document = document_text(meta.title, summary, text);
        let vector = match self.embedder.embed(&document).await {
            Ok(vector) => vector,
            Err(err) => {
                error!(article_id, error = %err, "embedding failed");
                return false;
            }
        };
        let metadata = DocMetadata {
            article_id,
            title: meta.title.to_string(),
            url: meta.url.to_string(),
            summary_type: meta.summary_type.as_str().to_string(),
            summary: truncate_chars(summary, METADATA_SUMMARY_CHARS),
        };
        match self
            .store
            .upsert(&doc_id(article_id), &vector, &document, &metadata)
            .await
        {
            Ok(()) => {
                info!(article_id, "article indexed");
                true
            }
            Err(err) => {
                error!(article_id, error = %err, "index upsert failed");
                false
            }
        }
    }

    /// Similarity search over indexed articles. Results keep the store's
    /// nearest-first order; anything scoring below the threshold is
    /// dropped. Empty on any failure or while disabled.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        if !self.enabled {
            debug!("index disabled, search returns nothing");
            return Vec::new();
        }
        let vector = match self.embedder.embed(query).await {
            Ok(vector) => vector,
            Err(err) => {
                error!(error = %err, "query embedding failed");
                return Vec::new();
            }
        };
        let hits = match self.store.query(&vector, limit).await {
            Ok(hits) => hits,
            Err(err) => {
                error!(error = %err, "vector query failed");
                return Vec::new();
            }
        };
        let results: Vec<SearchHit> = hits
            .into_iter()
            .filter_map(|hit| {
                let score = 1.0 - hit.distance;
                if score < self.threshold {
                    return None;
                }
                Some(SearchHit {
                    article_id: hit.metadata.article_id,
                    title: hit.metadata.title,
                    url: hit.metadata.url,
                    excerpt: excerpt(&hit.metadata.summary),
                    score: round3(score),
                    summary_type: hit.metadata.summary_type,
                })
            })
            .collect();
        info!(query, count = results.len(), "search complete");
        results
    }

    /// Fetch one indexed document back out by article id.
    pub async fn fetch_article(&self, article_id: u64) -> Option<StoredDocument> {
        if !self.enabled {
            return None;
        }
        match self.store.fetch(&doc_id(article_id)).await {
            Ok(found) => found,
            Err(err) => {
                error!(article_id, error = %err, "index fetch failed");
                None
            }
        }
    }

    /// Remove one article from the store. Returns whether the delete went
    /// through.
    pub async fn delete_article(&self, article_id: u64) -> bool {
        if !self.enabled {
            return false;
        }
        match self.store.delete(&doc_id(article_id)).await {
            Ok(()) => {
                info!(article_id, "article removed from index");
                true
            }
            Err(err) => {
                error!(article_id, error = %err, "index delete failed");
                false
            }
        }
    }

    /// Number of indexed documents; zero while disabled or on failure.
    pub async fn count(&self) -> usize {
        if !self.enabled {
            return 0;
        }
        match self.store.count().await {
            Ok(count) => count,
            Err(err) => {
                error!(error = %err, "index count failed");
                0
            }
        }
    }
}

fn doc_id(article_id: u64) -> String {
    format!("article_{article_id}")
}

/// Text that actually gets embedded: title and summary up front so they
/// dominate the vector, body capped to keep the payload bounded.
fn document_text(title: &str, summary: &str, text: &str) -> String {
    let content = truncate_chars(text, DOCUMENT_CONTENT_CHARS);
    format!("Title: {title}\n\nSummary: {summary}\n\nContent: {content}")
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn excerpt(summary: &str) -> String {
    let mut excerpt = truncate_chars(summary, EXCERPT_CHARS);
    excerpt.push_str("...");
    excerpt
}

fn round3(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    struct FakeEmbedder {
        calls: AtomicUsize,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0.1, 0.2, 0.3])
        }
    }

    /// Store fake: fails the first `heartbeat_failures` probes, keeps
    /// upserts in a map keyed by id, answers queries from a script.
    struct FakeStore {
        heartbeat_failures: usize,
        heartbeats: AtomicUsize,
        data_calls: AtomicUsize,
        docs: Mutex<HashMap<String, (String, DocMetadata)>>,
        query_script: Vec<QueryHit>,
    }

    impl FakeStore {
        fn healthy() -> Self {
            Self::failing_first(0)
        }

        fn failing_first(heartbeat_failures: usize) -> Self {
            Self {
                heartbeat_failures,
                heartbeats: AtomicUsize::new(0),
                data_calls: AtomicUsize::new(0),
                docs: Mutex::new(HashMap::new()),
                query_script: Vec::new(),
            }
        }

        fn with_hits(hits: Vec<QueryHit>) -> Self {
            Self {
                query_script: hits,
                ..Self::healthy()
            }
        }

        fn unavailable() -> StoreError {
            StoreError::Api {
                status: 503,
                message: "unavailable".to_string(),
            }
        }
    }

    #[async_trait]
    impl VectorStore for FakeStore {
        async fn heartbeat(&self) -> Result<(), StoreError> {
            let seen = self.heartbeats.fetch_add(1, Ordering::SeqCst);
            if seen < self.heartbeat_failures {
                Err(Self::unavailable())
            } else {
                Ok(())
            }
        }

        async fn upsert(
            &self,
            id: &str,
            _vector: &[f32],
            document: &str,
            metadata: &DocMetadata,
        ) -> Result<(), StoreError> {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            self.docs
                .lock()
                .unwrap()
                .insert(id.to_string(), (document.to_string(), metadata.clone()));
            Ok(())
        }

        async fn query(&self, _vector: &[f32], limit: usize) -> Result<Vec<QueryHit>, StoreError> {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.query_script.iter().take(limit).cloned().collect())
        }

        async fn fetch(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.docs.lock().unwrap().get(id).map(|(document, metadata)| {
                StoredDocument {
                    id: id.to_string(),
                    document: document.clone(),
                    metadata: metadata.clone(),
                }
            }))
        }

        async fn delete(&self, id: &str) -> Result<(), StoreError> {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            self.docs.lock().unwrap().remove(id);
            Ok(())
        }

        async fn count(&self) -> Result<usize, StoreError> {
            self.data_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.docs.lock().unwrap().len())
        }
    }

    async fn quick_connect(store: Arc<FakeStore>) -> EmbeddingIndex {
        EmbeddingIndex::connect_with_backoff(
            Arc::new(FakeEmbedder::new()),
            store,
            DEFAULT_SIMILARITY_THRESHOLD,
            Duration::from_millis(1),
        )
        .await
    }

    fn meta() -> ArticleMeta<'static> {
        ArticleMeta {
            title: "Rust in Production",
            url: "https://example.com/rust",
            summary_type: SummaryType::Comprehensive,
        }
    }

    fn hit(id: u64, distance: f32, summary: &str) -> QueryHit {
        QueryHit {
            id: format!("article_{id}"),
            document: String::new(),
            metadata: DocMetadata {
                article_id: id,
                title: format!("Article {id}"),
                url: format!("https://example.com/{id}"),
                summary_type: "comprehensive".to_string(),
                summary: summary.to_string(),
            },
            distance,
        }
    }

    #[tokio::test]
    async fn first_successful_probe_stops_retrying() {
        let store = Arc::new(FakeStore::healthy());
        let index = quick_connect(store.clone()).await;
        assert!(index.is_enabled());
        assert_eq!(store.heartbeats.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_retries_until_a_probe_succeeds() {
        let store = Arc::new(FakeStore::failing_first(2));
        let index = quick_connect(store.clone()).await;
        assert!(index.is_enabled());
        assert_eq!(store.heartbeats.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn connect_gives_up_after_three_probes() {
        let store = Arc::new(FakeStore::failing_first(10));
        let index = quick_connect(store.clone()).await;
        assert!(!index.is_enabled());
        assert_eq!(store.heartbeats.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_delay_doubles_between_probes() {
        let store = Arc::new(FakeStore::failing_first(10));
        let start = Instant::now();
        EmbeddingIndex::connect_with_backoff(
            Arc::new(FakeEmbedder::new()),
            store,
            DEFAULT_SIMILARITY_THRESHOLD,
            Duration::from_millis(20),
        )
        .await;
        // 20ms after the first failure, 40ms after the second.
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn disabled_index_degrades_every_operation() {
        let store = Arc::new(FakeStore::failing_first(10));
        let index = quick_connect(store.clone()).await;
        assert!(!index.is_enabled());

        assert!(!index.add_article(1, "text", "summary", meta()).await);
        assert!(index.search("anything", DEFAULT_SEARCH_LIMIT).await.is_empty());
        assert!(index.fetch_article(1).await.is_none());
        assert!(!index.delete_article(1).await);
        assert_eq!(index.count().await, 0);
        assert_eq!(
            store.data_calls.load(Ordering::SeqCst),
            0,
            "disabled index never touches the store"
        );
    }

    #[tokio::test]
    async fn add_article_builds_document_and_bounded_metadata() {
        let store = Arc::new(FakeStore::healthy());
        let index = quick_connect(store.clone()).await;

        let text = "x".repeat(6000);
        let summary = "s".repeat(1500);
        assert!(index.add_article(7, &text, &summary, meta()).await);

        let docs = store.docs.lock().unwrap();
        let (document, metadata) = docs.get("article_7").expect("doc under article_7");
        assert!(document.starts_with("Title: Rust in Production\n\nSummary: "));
        let content = document.split("Content: ").nth(1).unwrap();
        assert_eq!(content.len(), 5000, "body capped before embedding");
        assert_eq!(metadata.summary.len(), 1000);
        assert_eq!(metadata.article_id, 7);
        assert_eq!(metadata.summary_type, "comprehensive");
    }

    #[tokio::test]
    async fn upserting_the_same_article_twice_keeps_one_document() {
        let store = Arc::new(FakeStore::healthy());
        let index = quick_connect(store.clone()).await;

        assert!(index.add_article(3, "text", "summary", meta()).await);
        assert!(index.add_article(3, "text", "summary", meta()).await);
        assert_eq!(index.count().await, 1);
    }

    #[tokio::test]
    async fn search_drops_low_scores_and_keeps_store_order() {
        let store = Arc::new(FakeStore::with_hits(vec![
            hit(1, 0.2, "closest"),
            hit(2, 0.5, "middle"),
            hit(3, 0.9, "far away"),
        ]));
        let index = quick_connect(store).await;

        let results = index.search("rust", DEFAULT_SEARCH_LIMIT).await;
        let ids: Vec<u64> = results.iter().map(|hit| hit.article_id).collect();
        assert_eq!(ids, vec![1, 2], "0.1 similarity is below the threshold");
        assert_eq!(results[0].score, 0.8);
        assert_eq!(results[1].score, 0.5);
    }

    #[tokio::test]
    async fn search_scores_are_rounded_to_three_decimals() {
        let store = Arc::new(FakeStore::with_hits(vec![hit(1, 0.123_456, "s")]));
        let index = quick_connect(store).await;
        let results = index.search("q", 1).await;
        assert_eq!(results[0].score, 0.877);
    }

    #[tokio::test]
    async fn search_excerpt_is_bounded() {
        let store = Arc::new(FakeStore::with_hits(vec![hit(1, 0.1, &"a".repeat(300))]));
        let index = quick_connect(store).await;
        let results = index.search("q", 1).await;
        assert_eq!(results[0].excerpt.len(), 203);
        assert!(results[0].excerpt.ends_with("..."));
    }

    #[tokio::test]
    async fn indexing_and_search_share_one_embedder() {
        let embedder = Arc::new(FakeEmbedder::new());
        let index = EmbeddingIndex::connect_with_backoff(
            embedder.clone(),
            Arc::new(FakeStore::healthy()),
            DEFAULT_SIMILARITY_THRESHOLD,
            Duration::from_millis(1),
        )
        .await;

        index.add_article(1, "text", "summary", meta()).await;
        index.search("query", 5).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_returns_what_was_upserted() {
        let store = Arc::new(FakeStore::healthy());
        let index = quick_connect(store).await;

        index.add_article(9, "body text", "the summary", meta()).await;
        let doc = index.fetch_article(9).await.expect("indexed document");
        assert_eq!(doc.id, "article_9");
        assert_eq!(doc.metadata.url, "https://example.com/rust");
        assert!(index.fetch_article(404).await.is_none());
    }

    #[tokio::test]
    async fn store_failures_degrade_instead_of_erroring() {
        struct BrokenStore;

        #[async_trait]
        impl VectorStore for BrokenStore {
            async fn heartbeat(&self) -> Result<(), StoreError> {
                Ok(())
            }
            async fn upsert(
                &self,
                _id: &str,
                _vector: &[f32],
                _document: &str,
                _metadata: &DocMetadata,
            ) -> Result<(), StoreError> {
                Err(FakeStore::unavailable())
            }
            async fn query(
                &self,
                _vector: &[f32],
                _limit: usize,
            ) -> Result<Vec<QueryHit>, StoreError> {
                Err(FakeStore::unavailable())
            }
            async fn fetch(&self, _id: &str) -> Result<Option<StoredDocument>, StoreError> {
                Err(FakeStore::unavailable())
            }
            async fn delete(&self, _id: &str) -> Result<(), StoreError> {
                Err(FakeStore::unavailable())
            }
            async fn count(&self) -> Result<usize, StoreError> {
                Err(FakeStore::unavailable())
            }
        }

        let index = EmbeddingIndex::connect_with_backoff(
            Arc::new(FakeEmbedder::new()),
            Arc::new(BrokenStore),
            DEFAULT_SIMILARITY_THRESHOLD,
            Duration::from_millis(1),
        )
        .await;
        assert!(index.is_enabled());

        assert!(!index.add_article(1, "text", "summary", meta()).await);
        assert!(index.search("q", 5).await.is_empty());
        assert!(index.fetch_article(1).await.is_none());
        assert!(!index.delete_article(1).await);
        assert_eq!(index.count().await, 0);
    }
}
